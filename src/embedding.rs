//! From eigenpairs to coordinates: ordering, dimension selection, scaling and the
//! column sign convention.

use log::trace;
use ndarray::{s, Array1, Array2, Axis};
use std::cmp::Ordering;

use crate::eigen::EigenPairs;

/// Eigenpairs sorted by descending eigenvalue; the first `kept` are retained.
#[derive(Clone, Debug)]
pub(crate) struct Selection {
    pub values: Array1<f64>,
    pub vectors: Array2<f64>,
    pub kept: usize,
}

/// Positivity threshold `max|e| · eps^(3/4)` for a set of eigenvalues.
pub(crate) fn positivity_threshold(values: &Array1<f64>) -> f64 {
    let max_abs = values.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
    max_abs * f64::EPSILON.powf(0.75)
}

/// Sort eigenpairs in descending order and count those strictly above the
/// positivity threshold. Ties keep the solver's order.
pub(crate) fn select(pairs: EigenPairs) -> Selection {
    let EigenPairs { values, vectors } = pairs;
    let mut idx: Vec<usize> = (0..values.len()).collect();
    idx.sort_by(|&i, &j| values[j].partial_cmp(&values[i]).unwrap_or(Ordering::Equal));

    let sorted = Array1::from_iter(idx.iter().map(|&i| values[i]));
    let vectors = vectors.select(Axis(1), &idx);

    let tau = positivity_threshold(&sorted);
    // sorted descending, so the retained set is a prefix
    let kept = sorted.iter().take_while(|&&v| v > tau).count();
    trace!("{} of {} eigenvalues above {:e}", kept, sorted.len(), tau);

    Selection {
        values: sorted,
        vectors,
        kept,
    }
}

/// Y = V[:, ..kept] · diag(sqrt(e[..kept])); an `n × 1` zero matrix when nothing is kept.
pub(crate) fn build_coordinates(selection: &Selection, n: usize) -> Array2<f64> {
    let d = selection.kept;
    if d == 0 {
        return Array2::zeros((n, 1));
    }

    let mut coords = selection.vectors.slice(s![.., ..d]).to_owned();
    for (mut col, e) in coords.axis_iter_mut(Axis(1)).zip(selection.values.iter()) {
        col *= e.sqrt();
    }
    coords
}

/// Flip each column so that its largest-magnitude entry is non-negative.
///
/// The first row wins on exact magnitude ties; an all-zero column is left unchanged.
pub(crate) fn normalize_signs(coords: &mut Array2<f64>) {
    for mut col in coords.axis_iter_mut(Axis(1)) {
        let mut best = 0usize;
        let mut best_abs = f64::NEG_INFINITY;
        for (i, v) in col.iter().enumerate() {
            if v.abs() > best_abs {
                best = i;
                best_abs = v.abs();
            }
        }
        if !col.is_empty() && col[best] < 0.0 {
            col.mapv_inplace(|v| -v);
        }
    }
}
