//! Symmetric eigensolvers behind a single call site.
//!
//! * `Full`: dense `nalgebra::SymmetricEigen` on the whole matrix.
//! * `TopLargestAlgebraic(k)`: block Lanczos with full reorthogonalisation; Rayleigh-Ritz on
//!   the projected matrix picks the `k` algebraically largest Ritz pairs.
//!
//! Both act on the symmetrised matrix `(B + Bᵀ) / 2`, so eigenvalues are real.

use log::{debug, trace};
use nalgebra as na;
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cmp::Ordering;

use crate::error::{CmdsError, Result};

/// Which eigenpairs to compute.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum EigenSolver {
    Full,
    TopLargestAlgebraic(usize),
}

/// Iteration caps and seeding shared by both solvers.
#[derive(Clone, Copy, Debug)]
pub(crate) struct SolverLimits {
    /// Passed to `SymmetricEigen::try_new`; 0 means no cap.
    pub max_sweeps: usize,
    /// Largest Krylov basis the truncated solver may build; `None` means n.
    pub max_krylov_dim: Option<usize>,
    pub seed: u64,
}

/// Eigenvalues and eigenvectors (columns of `vectors`, `n × values.len()`).
#[derive(Clone, Debug)]
pub(crate) struct EigenPairs {
    pub values: Array1<f64>,
    pub vectors: Array2<f64>,
}

/// Symmetrise `b` and run the requested solver.
pub(crate) fn decompose(b: &Array2<f64>, solver: EigenSolver, limits: &SolverLimits) -> Result<EigenPairs> {
    let mut sym = b.clone();
    symmetrize_inplace(&mut sym);

    match solver {
        EigenSolver::Full => full_eigh(&sym, limits.max_sweeps),
        EigenSolver::TopLargestAlgebraic(k) => lanczos_top(&sym, k, limits),
    }
}

/// Replace `a` by `(a + aᵀ) / 2`.
fn symmetrize_inplace(a: &mut Array2<f64>) {
    let n = a.nrows();
    for i in 0..n {
        for j in (i + 1)..n {
            let s = 0.5 * (a[[i, j]] + a[[j, i]]);
            a[[i, j]] = s;
            a[[j, i]] = s;
        }
    }
}

fn full_eigh(mat: &Array2<f64>, max_sweeps: usize) -> Result<EigenPairs> {
    let n = mat.nrows();
    let dm = na::DMatrix::<f64>::from_fn(n, n, |r, c| mat[[r, c]]);

    let se = na::SymmetricEigen::try_new(dm, f64::EPSILON, max_sweeps).ok_or(
        CmdsError::EigenDecomposition {
            requested: n,
            converged: 0,
        },
    )?;

    let values = Array1::from_iter(se.eigenvalues.iter().copied());
    let ev = se.eigenvectors;
    let vectors = Array2::from_shape_fn((n, n), |(r, c)| ev[(r, c)]);
    debug!("full eigendecomposition of {}x{} done", n, n);
    Ok(EigenPairs { values, vectors })
}

/// Draw a unit vector orthogonal to `basis`, or `None` if the basis already spans
/// (numerically) the whole space.
fn fresh_direction(basis: &[Array1<f64>], n: usize, rng: &mut StdRng) -> Option<Array1<f64>> {
    if basis.len() >= n {
        return None;
    }
    for _ in 0..8 {
        let mut v = Array1::from_iter((0..n).map(|_| rng.random_range(-1.0_f64..1.0)));
        let start = v.dot(&v).sqrt();
        orthogonalize(&mut v, basis);
        let norm = v.dot(&v).sqrt();
        if norm > 1e-8 * start {
            return Some(v / norm);
        }
    }
    None
}

/// Two passes of classical Gram-Schmidt against `basis`.
fn orthogonalize(w: &mut Array1<f64>, basis: &[Array1<f64>]) {
    for _ in 0..2 {
        for q in basis {
            let c = w.dot(q);
            w.scaled_add(-c, q);
        }
    }
}

/// Stack basis vectors as the columns of an `n × m` matrix.
fn stack_columns(vectors: &[Array1<f64>], n: usize) -> Array2<f64> {
    Array2::from_shape_fn((n, vectors.len()), |(r, c)| vectors[c][r])
}

/// Rayleigh-Ritz on H = Qᵀ A Q: the `k` largest Ritz values and, as columns, the
/// matching coefficient vectors.
fn top_ritz(q: &Array2<f64>, aq: &Array2<f64>, k: usize, max_sweeps: usize) -> Option<(Vec<f64>, Array2<f64>)> {
    let m = q.ncols();
    let h = q.t().dot(aq);
    let hs = na::DMatrix::<f64>::from_fn(m, m, |r, c| 0.5 * (h[[r, c]] + h[[c, r]]));
    let se = na::SymmetricEigen::try_new(hs, f64::EPSILON, max_sweeps)?;

    let mut idx: Vec<usize> = (0..m).collect();
    idx.sort_by(|&i, &j| {
        se.eigenvalues[j]
            .partial_cmp(&se.eigenvalues[i])
            .unwrap_or(Ordering::Equal)
    });
    idx.truncate(k);
    let values = idx.iter().map(|&i| se.eigenvalues[i]).collect();
    let coeffs = Array2::from_shape_fn((m, k), |(r, c)| se.eigenvectors[(r, idx[c])]);
    Some((values, coeffs))
}

/// Block Lanczos with full reorthogonalisation and block size `k`.
///
/// A block of `k` start vectors carries every eigenvalue of multiplicity up to `k`, so
/// repeated top eigenvalues are not collapsed into one. Ritz pairs come from the full
/// projection Qᵀ A Q and converge when `‖A y - θ y‖ ≤ eps^(3/4) · ‖A‖_F`.
fn lanczos_top(a: &Array2<f64>, k: usize, limits: &SolverLimits) -> Result<EigenPairs> {
    let n = a.nrows();
    let max_dim = limits.max_krylov_dim.unwrap_or(n).min(n);

    let anorm = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let conv_tol = anorm.max(f64::MIN_POSITIVE) * f64::EPSILON.powf(0.75);
    let breakdown_tol = 10.0 * anorm * f64::EPSILON * (n as f64).sqrt();

    let not_converged = |converged: usize| CmdsError::EigenDecomposition {
        requested: k,
        converged,
    };

    let mut rng = StdRng::seed_from_u64(limits.seed);
    let mut basis: Vec<Array1<f64>> = Vec::with_capacity(max_dim);
    // A q for every basis vector q, in the same order
    let mut images: Vec<Array1<f64>> = Vec::with_capacity(max_dim);
    let mut converged = 0usize;

    while basis.len() < k.min(max_dim) {
        match fresh_direction(&basis, n, &mut rng) {
            Some(v) => basis.push(v),
            None => return Err(not_converged(0)),
        }
    }
    let mut block_start = 0usize;

    loop {
        for j in images.len()..basis.len() {
            images.push(a.dot(&basis[j]));
        }
        let m = basis.len();

        if m >= k {
            let q = stack_columns(&basis, n);
            let aq = stack_columns(&images, n);
            let (theta, coeffs) = top_ritz(&q, &aq, k, limits.max_sweeps).ok_or(not_converged(0))?;
            let y = q.dot(&coeffs);
            let ay = aq.dot(&coeffs);

            converged = theta
                .iter()
                .enumerate()
                .filter(|&(i, t)| {
                    let r = &ay.column(i) - &(&y.column(i) * *t);
                    r.dot(&r).sqrt() <= conv_tol
                })
                .count();
            trace!("block lanczos at dimension {}: {} of {} Ritz pairs converged", m, converged, k);

            if converged == k {
                debug!("lanczos converged on {} eigenpairs with a {}-dimensional basis", k, m);
                return Ok(EigenPairs {
                    values: Array1::from(theta),
                    vectors: y,
                });
            }
        }

        if m >= max_dim {
            break;
        }

        // next block: A applied to the previous block, orthogonalised against the basis
        let block_end = basis.len();
        for j in block_start..block_end {
            if basis.len() >= max_dim {
                break;
            }
            let mut w = images[j].clone();
            orthogonalize(&mut w, &basis);
            let norm = w.dot(&w).sqrt();
            if norm > breakdown_tol {
                basis.push(w / norm);
            } else if let Some(v) = fresh_direction(&basis, n, &mut rng) {
                // invariant subspace reached along this direction
                basis.push(v);
            }
        }
        if basis.len() == block_end {
            break;
        }
        block_start = block_end;
    }

    debug!(
        "lanczos stopped at a {}-dimensional basis with {} of {} eigenpairs converged",
        basis.len(),
        converged,
        k
    );
    Err(not_converged(converged))
}
