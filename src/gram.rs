//! Double centering of squared dissimilarities.
//!
//! B = -0.5 * P (D ∘ D) P with P = I - J/n, evaluated through row, column and grand
//! means of E = -0.5 * (D ∘ D) so P is never formed:
//!
//! ```text
//! B[i][j] = E[i][j] - rowmean(E)[i] - colmean(E)[j] + mean(E)
//! ```
//!
//! D is divided by a power of two near max|D| before squaring, so dissimilarities above
//! sqrt(f64::MAX) do not overflow. Eigenvalues of the true B are those of the scaled one
//! times `scale²`; the division and that product are exact.

use log::trace;
use ndarray::parallel::prelude::*;
use ndarray::{Array1, Array2, Axis};

/// Gram matrix of `D / scale`.
#[derive(Clone, Debug)]
pub(crate) struct Gram {
    pub b: Array2<f64>,
    /// Power of two the dissimilarities were divided by.
    pub scale: f64,
}

/// Largest power of two not above `max_abs`; 1 for zero or subnormal input.
pub(crate) fn power_of_two_scale(max_abs: f64) -> f64 {
    if max_abs.is_finite() && max_abs >= f64::MIN_POSITIVE {
        // keep the exponent bits, clear the mantissa
        f64::from_bits(max_abs.to_bits() & 0x7ff0_0000_0000_0000)
    } else {
        1.0
    }
}

/// Build the symmetric Gram ("B") matrix of a validated `n × n` dissimilarity matrix.
pub(crate) fn build_gram(dist: &Array2<f64>) -> Gram {
    let n = dist.nrows();
    debug_assert_eq!(n, dist.ncols());

    let max_abs = dist.iter().fold(0.0_f64, |acc, x| acc.max(x.abs()));
    let scale = power_of_two_scale(max_abs);

    let mut b = Array2::<f64>::zeros((n, n));
    let (row_means, col_means, grand_mean) = half_squared_means(dist, scale, &mut b);
    trace!("double centering {}x{} (scale {:e}, grand mean {:e})", n, n, scale, grand_mean);

    center_inplace(&row_means, &col_means, grand_mean, &mut b);
    Gram { b, scale }
}

/// Write E = -0.5 * (D/scale ∘ D/scale) into `out`; return its row means (length n,
/// indexed by i), column means (length n, indexed by j) and grand mean.
fn half_squared_means(dist: &Array2<f64>, scale: f64, out: &mut Array2<f64>) -> (Array1<f64>, Array1<f64>, f64) {
    let n = dist.nrows();
    let nf = n as f64;

    let row_sums: Vec<f64> = out
        .axis_iter_mut(Axis(0))
        .into_par_iter()
        .enumerate()
        .map(|(i, mut row)| {
            let di = dist.row(i);
            let mut sum = 0.0;
            for j in 0..n {
                let d = di[j] / scale;
                let e = -0.5 * d * d;
                row[j] = e;
                sum += e;
            }
            sum
        })
        .collect();

    let col_sums = out.sum_axis(Axis(0));
    let grand_mean = row_sums.iter().sum::<f64>() / nf / nf;
    let row_means = Array1::from_iter(row_sums.into_iter().map(|s| s / nf));
    let col_means = col_sums / nf;
    (row_means, col_means, grand_mean)
}

/// B[i][j] = E[i][j] - row_means[i] - col_means[j] + grand_mean, in place, by rows.
fn center_inplace(
    row_means: &Array1<f64>,
    col_means: &Array1<f64>,
    grand_mean: f64,
    centered: &mut Array2<f64>,
) {
    let n = centered.ncols();
    centered
        .axis_iter_mut(Axis(0))
        .into_par_iter()
        .enumerate()
        .for_each(|(i, mut row)| {
            let shift = grand_mean - row_means[i];
            for j in 0..n {
                row[j] += shift - col_means[j];
            }
        });
}
