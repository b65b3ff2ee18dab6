//! Input forms and validation.
//!
//! A dissimilarity set arrives either as a full `n × n` matrix or as the condensed
//! strict upper triangle `[d01, d02, .., d0(n-1), d12, ..]`. Both are normalised into an
//! owned, validated dissimilarity matrix before any numeric work starts.

use log::{debug, trace};
use ndarray::parallel::prelude::*;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

use crate::error::{CmdsError, Result};

/// Borrowed dissimilarities, in either of the two accepted layouts.
#[derive(Clone, Copy, Debug)]
pub enum Dissimilarities<'a> {
    /// Strict upper triangle in row-major pair order, length n*(n-1)/2.
    Condensed(ArrayView1<'a, f64>),
    /// Full square matrix, dissimilarity or similarity form.
    Square(ArrayView2<'a, f64>),
}

impl<'a> From<ArrayView1<'a, f64>> for Dissimilarities<'a> {
    fn from(v: ArrayView1<'a, f64>) -> Self {
        Dissimilarities::Condensed(v)
    }
}

impl<'a> From<&'a Array1<f64>> for Dissimilarities<'a> {
    fn from(v: &'a Array1<f64>) -> Self {
        Dissimilarities::Condensed(v.view())
    }
}

impl<'a> From<&'a [f64]> for Dissimilarities<'a> {
    fn from(v: &'a [f64]) -> Self {
        Dissimilarities::Condensed(ArrayView1::from(v))
    }
}

impl<'a> From<&'a Vec<f64>> for Dissimilarities<'a> {
    fn from(v: &'a Vec<f64>) -> Self {
        Dissimilarities::Condensed(ArrayView1::from(v.as_slice()))
    }
}

impl<'a> From<ArrayView2<'a, f64>> for Dissimilarities<'a> {
    fn from(m: ArrayView2<'a, f64>) -> Self {
        Dissimilarities::Square(m)
    }
}

impl<'a> From<&'a Array2<f64>> for Dissimilarities<'a> {
    fn from(m: &'a Array2<f64>) -> Self {
        Dissimilarities::Square(m.view())
    }
}

/// Spacing between `|x|` and the next representable f64.
///
/// For `x == 0` this is the smallest positive subnormal, so tolerances built on it stay
/// strictly positive for an all-zero matrix.
pub(crate) fn eps_of(x: f64) -> f64 {
    let a = x.abs();
    if a == 0.0 {
        return f64::from_bits(1);
    }
    f64::from_bits(a.to_bits() + 1) - a
}

/// Relative tolerance `10 · eps(max|D|)` used for symmetry and diagonal checks.
pub(crate) fn matrix_tolerance(max_abs: f64) -> f64 {
    10.0 * eps_of(max_abs)
}

/// Number of items `n` such that `n * (n - 1) / 2 == len`.
///
/// A length of zero maps to the single-item case `n = 1`.
pub fn triangular_order(len: usize) -> Option<usize> {
    let guess = ((1.0 + (1.0 + 8.0 * len as f64).sqrt()) / 2.0).round() as usize;
    // the float guess can be off by one for very large lengths
    (guess.saturating_sub(1)..=guess + 1)
        .filter(|&n| n >= 1)
        .find(|&n| n.checked_mul(n - 1).map(|m| m / 2) == Some(len))
}

/// Expand a condensed dissimilarity vector into a symmetric matrix with zero diagonal.
pub fn squareform(condensed: ArrayView1<f64>) -> Result<Array2<f64>> {
    let len = condensed.len();
    let n = triangular_order(len).ok_or(CmdsError::InvalidCondensedLength { len })?;

    let mut square = Array2::<f64>::zeros((n, n));
    let mut k = 0usize;
    for i in 0..n {
        for j in (i + 1)..n {
            let d = condensed[k];
            square[[i, j]] = d;
            square[[j, i]] = d;
            k += 1;
        }
    }
    Ok(square)
}

/// Compress a square dissimilarity matrix into its condensed upper triangle.
///
/// The matrix must be square, symmetric and carry a zero diagonal (within the
/// relative tolerance used by the validator).
pub fn condensed(square: ArrayView2<f64>) -> Result<Array1<f64>> {
    let (rows, cols) = square.dim();
    if rows != cols || rows == 0 {
        return Err(CmdsError::InvalidShape { rows, cols });
    }
    let n = rows;
    let del = matrix_tolerance(max_abs(&square));

    if let Some(i) = (0..n).find(|&i| square[[i, i]].abs() >= del) {
        return Err(CmdsError::dissimilarity(format!(
            "diagonal entry ({i},{i}) = {} is not zero",
            square[[i, i]]
        )));
    }
    check_symmetric(&square, del)?;

    let mut out = Vec::with_capacity(n * (n - 1) / 2);
    for i in 0..n {
        for j in (i + 1)..n {
            out.push(square[[i, j]]);
        }
    }
    Ok(Array1::from(out))
}

/// Pairwise Euclidean distances between the rows of `points` (`n × k` → `n × n`).
pub fn euclidean_distances(points: ArrayView2<f64>) -> Array2<f64> {
    let n = points.nrows();
    let mut dist = Array2::<f64>::zeros((n, n));

    dist.axis_iter_mut(Axis(0))
        .into_par_iter()
        .enumerate()
        .for_each(|(i, mut row)| {
            let pi = points.row(i);
            for j in 0..n {
                if i == j {
                    continue;
                }
                let pj = points.row(j);
                let sq: f64 = pi.iter().zip(pj.iter()).map(|(a, b)| (a - b) * (a - b)).sum();
                row[j] = sq.sqrt();
            }
        });
    dist
}

/// Validate the raw input and return an owned dissimilarity matrix.
///
/// Similarity matrices (unit diagonal, entries below `1 + del`) are converted with
/// `d = sqrt(max(1 - s, 0))`. Condensed input is always read as dissimilarities.
pub(crate) fn normalize(input: Dissimilarities<'_>) -> Result<Array2<f64>> {
    match input {
        Dissimilarities::Condensed(v) => {
            let len = v.len();
            triangular_order(len).ok_or(CmdsError::InvalidCondensedLength { len })?;
            if let Some((k, x)) = v.iter().enumerate().find(|(_, x)| !x.is_finite()) {
                return Err(CmdsError::dissimilarity(format!(
                    "condensed entry {k} is not finite ({x})"
                )));
            }
            if let Some((k, x)) = v.iter().enumerate().find(|(_, x)| **x < 0.0) {
                return Err(CmdsError::dissimilarity(format!(
                    "condensed entry {k} is negative ({x})"
                )));
            }
            trace!("expanding condensed input of length {}", len);
            squareform(v)
        }
        Dissimilarities::Square(m) => normalize_square(m),
    }
}

fn normalize_square(m: ArrayView2<f64>) -> Result<Array2<f64>> {
    let (rows, cols) = m.dim();
    if rows != cols || rows == 0 {
        return Err(CmdsError::InvalidShape { rows, cols });
    }
    let n = rows;

    if let Some(((i, j), x)) = m.indexed_iter().find(|(_, x)| !x.is_finite()) {
        return Err(CmdsError::dissimilarity(format!(
            "entry ({i},{j}) is not finite ({x})"
        )));
    }
    if let Some(((i, j), x)) = m.indexed_iter().find(|(_, x)| **x < 0.0) {
        return Err(CmdsError::dissimilarity(format!(
            "entry ({i},{j}) is negative ({x})"
        )));
    }

    let del = matrix_tolerance(max_abs(&m));
    check_symmetric(&m, del)?;

    let diag = m.diag();
    if diag.iter().all(|x| x.abs() < del) {
        debug!("{}x{} input read as dissimilarities (del = {:e})", n, n, del);
        return Ok(m.to_owned());
    }

    let unit_diagonal = diag.iter().all(|x| (x - 1.0).abs() < del);
    if unit_diagonal && m.iter().all(|x| *x < 1.0 + del) {
        debug!("{}x{} input read as similarities, applying sqrt(1 - s)", n, n);
        return Ok(m.mapv(|s| (1.0 - s).max(0.0).sqrt()));
    }

    Err(CmdsError::InvalidDissimilarityOrSimilarity)
}

fn max_abs(m: &ArrayView2<f64>) -> f64 {
    m.iter().fold(0.0_f64, |acc, x| acc.max(x.abs()))
}

fn check_symmetric(m: &ArrayView2<f64>, del: f64) -> Result<()> {
    let n = m.nrows();
    for i in 0..n {
        for j in (i + 1)..n {
            if (m[[i, j]] - m[[j, i]]).abs() > del {
                return Err(CmdsError::dissimilarity(format!(
                    "matrix is not symmetric at ({i},{j}): {} vs {}",
                    m[[i, j]],
                    m[[j, i]]
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{array, Array1};

    #[test]
    fn triangular_lengths() {
        assert_eq!(triangular_order(0), Some(1));
        assert_eq!(triangular_order(1), Some(2));
        assert_eq!(triangular_order(3), Some(3));
        assert_eq!(triangular_order(6), Some(4));
        assert_eq!(triangular_order(4950), Some(100));
        assert_eq!(triangular_order(2), None);
        assert_eq!(triangular_order(5), None);
    }

    #[test]
    fn squareform_row_major_pairs() {
        let v = array![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let m = squareform(v.view()).unwrap();
        let expected = array![
            [0.0, 1.0, 2.0, 3.0],
            [1.0, 0.0, 4.0, 5.0],
            [2.0, 4.0, 0.0, 6.0],
            [3.0, 5.0, 6.0, 0.0],
        ];
        assert_eq!(m, expected);
        assert_eq!(condensed(m.view()).unwrap(), v);
    }

    #[test]
    fn condensed_rejects_nonzero_diagonal() {
        let m = array![[1.0, 0.5], [0.5, 1.0]];
        assert!(matches!(
            condensed(m.view()),
            Err(CmdsError::InvalidDissimilarity { .. })
        ));
    }

    #[test]
    fn eps_matches_float_spacing() {
        assert_eq!(eps_of(1.0), f64::EPSILON);
        assert_eq!(eps_of(-1.0), f64::EPSILON);
        assert_eq!(eps_of(2.0), 2.0 * f64::EPSILON);
        assert!(eps_of(0.0) > 0.0);
    }

    #[test]
    fn condensed_vector_rejections() {
        let bad_len = Array1::from(vec![1.0, 2.0]);
        let err = normalize((&bad_len).into()).unwrap_err();
        assert_eq!(err, CmdsError::InvalidCondensedLength { len: 2 });
        assert!(err.is_invalid_shape());

        let negative = Array1::from(vec![1.0, -2.0, 3.0]);
        assert!(matches!(
            normalize((&negative).into()),
            Err(CmdsError::InvalidDissimilarity { .. })
        ));

        let nan = Array1::from(vec![1.0, f64::NAN, 3.0]);
        assert!(matches!(
            normalize((&nan).into()),
            Err(CmdsError::InvalidDissimilarity { .. })
        ));
    }

    #[test]
    fn square_shape_rejections() {
        let rect = Array2::<f64>::zeros((2, 3));
        assert_eq!(
            normalize((&rect).into()).unwrap_err(),
            CmdsError::InvalidShape { rows: 2, cols: 3 }
        );
        let empty = Array2::<f64>::zeros((0, 0));
        assert!(normalize((&empty).into()).unwrap_err().is_invalid_shape());
    }

    #[test]
    fn asymmetric_and_negative_matrices() {
        let asym = array![[0.0, 1.0], [1.5, 0.0]];
        assert!(matches!(
            normalize((&asym).into()),
            Err(CmdsError::InvalidDissimilarity { .. })
        ));
        let neg = array![[0.0, -1.0], [-1.0, 0.0]];
        assert!(matches!(
            normalize((&neg).into()),
            Err(CmdsError::InvalidDissimilarity { .. })
        ));
    }

    #[test]
    fn roundoff_asymmetry_is_tolerated() {
        let m = array![[0.0, 3.0], [3.0 + 4.0 * f64::EPSILON, 0.0]];
        let d = normalize((&m).into()).unwrap();
        assert_eq!(d, m);
    }

    #[test]
    fn similarity_is_converted() {
        let s = array![[1.0, 0.75, 0.0], [0.75, 1.0, 0.36], [0.0, 0.36, 1.0]];
        let d = normalize((&s).into()).unwrap();
        assert_relative_eq!(d[[0, 1]], 0.5, epsilon = 1e-15);
        assert_relative_eq!(d[[1, 2]], 0.8, epsilon = 1e-15);
        assert_relative_eq!(d[[0, 2]], 1.0, epsilon = 1e-15);
        assert!(d.diag().iter().all(|x| *x == 0.0));
    }

    #[test]
    fn ambiguous_diagonal_is_an_error() {
        let m = array![[0.5, 0.2], [0.2, 0.5]];
        assert_eq!(
            normalize((&m).into()).unwrap_err(),
            CmdsError::InvalidDissimilarityOrSimilarity
        );
        // unit diagonal but an off-diagonal entry above one
        let m = array![[1.0, 2.0], [2.0, 1.0]];
        assert_eq!(
            normalize((&m).into()).unwrap_err(),
            CmdsError::InvalidDissimilarityOrSimilarity
        );
    }

    #[test]
    fn zero_matrix_is_a_dissimilarity() {
        let z = Array2::<f64>::zeros((4, 4));
        assert_eq!(normalize((&z).into()).unwrap(), z);
    }

    #[test]
    fn distances_of_a_right_triangle() {
        let pts = array![[0.0, 0.0], [3.0, 0.0], [0.0, 4.0]];
        let d = euclidean_distances(pts.view());
        assert_relative_eq!(d[[0, 1]], 3.0);
        assert_relative_eq!(d[[0, 2]], 4.0);
        assert_relative_eq!(d[[1, 2]], 5.0);
        assert_eq!(d[[2, 2]], 0.0);
    }
}
