//! cmdscale: Classical multidimensional scaling (principal coordinate analysis).
//! Input: pairwise dissimilarities among n items, as a square matrix or as the condensed
//! upper triangle. Square input with a unit diagonal is read as similarities.
//! Pipeline:
//! 1) Validate and normalise the input (similarity s → sqrt(1 - s))
//! 2) Build B = -0.5 * J * (D ∘ D) * J   (double-centering)
//! 3) Symmetric eig of (B + Bᵀ)/2: full (nalgebra) when p = n, top-p Lanczos when p < n
//! 4) Sort eigenpairs ↓, keep eigenvalues above max|λ| · eps^(3/4)
//! 5) Coordinates = V_kept * sqrt(Λ_kept)
//! 6) Flip each axis so its largest-magnitude coordinate is positive
//!
//! ```
//! use ndarray::array;
//!
//! let d = array![[0.0, 3.0, 4.0], [3.0, 0.0, 5.0], [4.0, 5.0, 0.0]];
//! let emb = cmdscale::cmdscale(&d, None).unwrap();
//! assert_eq!(emb.dimension(), 2);
//! ```

mod eigen;
mod embedding;
mod error;
mod gram;
mod input;

use log::{debug, warn};
use ndarray::{s, Array1, Array2};

use crate::eigen::{EigenSolver, SolverLimits};

pub use crate::error::{CmdsError, Result};
pub use crate::input::{condensed, euclidean_distances, squareform, triangular_order, Dissimilarities};

/// Result of classical scaling.
#[derive(Clone, Debug)]
pub struct Embedding {
    /// Item coordinates Y = V_kept * sqrt(Λ_kept); an n × 1 zero matrix when no
    /// eigenvalue is positive.
    pub coordinates: Array2<f64>,        // (n, d)
    /// Every eigenvalue computed (p of them), sorted descending, non-positive ones included.
    pub eigenvalues: Array1<f64>,        // length p
    /// Retained eigenvalues over their sum.
    pub proportion_explained: Array1<f64>, // length d
    dimension: usize,
}

impl Embedding {
    /// Number of retained axes d (eigenvalues strictly above the positivity threshold).
    /// May be smaller than the requested p.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of embedded items n (rows of `coordinates`).
    pub fn n_items(&self) -> usize {
        self.coordinates.nrows()
    }

    /// The eigenvalues that produced coordinate columns.
    pub fn retained(&self) -> &[f64] {
        self.eigenvalues
            .as_slice()
            .map_or(&[][..], |vals| &vals[..self.dimension])
    }

    /// Goodness of fit of the retained axes, as
    /// (Σ retained / Σ |λ|, Σ retained / Σ max(λ, 0)) over the computed eigenvalues.
    pub fn goodness_of_fit(&self) -> (f64, f64) {
        let kept: f64 = self.retained().iter().sum();
        let abs_sum: f64 = self.eigenvalues.iter().map(|v| v.abs()).sum();
        let pos_sum: f64 = self.eigenvalues.iter().map(|v| v.max(0.0)).sum();
        let ratio = |den: f64| if den > 0.0 { kept / den } else { 0.0 };
        (ratio(abs_sum), ratio(pos_sum))
    }

    /// Pairwise Euclidean distances between the embedded items.
    pub fn distances(&self) -> Array2<f64> {
        euclidean_distances(self.coordinates.view())
    }
}

/// Options for classical scaling.
#[derive(Clone, Copy, Debug)]
pub struct CmdscaleOptions {
    /// Requested number of axes p, in [1, n]. `None` computes all n eigenpairs.
    pub dimensions: Option<usize>,
    /// Iteration cap for the dense symmetric eigensolver; 0 iterates until convergence.
    pub max_sweeps: usize,
    /// Largest Krylov basis for the truncated (p < n) solver; `None` allows n.
    pub max_krylov_dim: Option<usize>,
    /// Seed of the truncated solver's start vector.
    pub seed: u64,
}

impl Default for CmdscaleOptions {
    fn default() -> Self {
        Self {
            dimensions: None,
            max_sweeps: 0,
            max_krylov_dim: None,
            seed: 0x5eed,
        }
    }
}

impl CmdscaleOptions {
    /// Default options asking for the top `p` axes.
    pub fn with_dimensions(p: usize) -> Self {
        Self {
            dimensions: Some(p),
            ..Self::default()
        }
    }
}

/// Classical scaling with default options.
///
/// * `dist`: n×n dissimilarity (or similarity) matrix, or its condensed upper triangle.
/// * `p`: number of axes to compute, `None` for all n.
///
/// # Errors
/// See [`cmdscale_with`].
pub fn cmdscale<'a>(dist: impl Into<Dissimilarities<'a>>, p: Option<usize>) -> Result<Embedding> {
    let opts = CmdscaleOptions {
        dimensions: p,
        ..CmdscaleOptions::default()
    };
    cmdscale_with(dist, &opts)
}

/// Classical scaling.
///
/// # Errors
/// * `InvalidShape` / `InvalidCondensedLength` - input is neither square nor of triangular length
/// * `InvalidDissimilarity` - negative, non-finite or asymmetric entries
/// * `InvalidDissimilarityOrSimilarity` - diagonal is neither ≈0 nor ≈1 (with entries < 1)
/// * `InvalidDimensionRequest` - `opts.dimensions` outside [1, n]
/// * `EigenDecomposition` - the eigensolver did not converge within its limits
/// * `EigenvalueOverflow` - dissimilarities so large that B's eigenvalues exceed `f64::MAX`
pub fn cmdscale_with<'a>(dist: impl Into<Dissimilarities<'a>>, opts: &CmdscaleOptions) -> Result<Embedding> {
    let d = input::normalize(dist.into())?;
    let n = d.nrows();

    let p = opts.dimensions.unwrap_or(n);
    if p == 0 || p > n {
        return Err(CmdsError::InvalidDimensionRequest { requested: p, n });
    }

    let centred = gram::build_gram(&d);

    let solver = if p == n {
        EigenSolver::Full
    } else {
        EigenSolver::TopLargestAlgebraic(p)
    };
    debug!("scaling {} items, p = {}, solver {:?}", n, p, solver);
    let limits = SolverLimits {
        max_sweeps: opts.max_sweeps,
        max_krylov_dim: opts.max_krylov_dim,
        seed: opts.seed,
    };
    let mut pairs = eigen::decompose(&centred.b, solver, &limits)?;

    let scale = centred.scale;
    pairs.values.mapv_inplace(|v| v * scale * scale);
    if pairs.values.iter().any(|v| !v.is_finite()) {
        let max_dissimilarity = d.iter().fold(0.0_f64, |acc, x| acc.max(x.abs()));
        return Err(CmdsError::EigenvalueOverflow { max_dissimilarity });
    }

    let selection = embedding::select(pairs);
    let dim = selection.kept;
    if dim < p && p < n {
        warn!("only {} of {} requested axes have positive eigenvalues", dim, p);
    }

    let mut coordinates = embedding::build_coordinates(&selection, n);
    embedding::normalize_signs(&mut coordinates);

    let kept = selection.values.slice(s![..dim]);
    let total = kept.sum();
    let proportion_explained = if total > 0.0 {
        kept.mapv(|v| v / total)
    } else {
        Array1::zeros(dim)
    };

    Ok(Embedding {
        coordinates,
        eigenvalues: selection.values,
        proportion_explained,
        dimension: dim,
    })
}
