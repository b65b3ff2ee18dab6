use thiserror::Error;

/// Errors raised by the scaling pipeline.
///
/// Every variant is detected before any partial result is produced; callers never
/// receive coordinates alongside an error.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CmdsError {
    /// Matrix input that is empty or not square.
    #[error("invalid shape: expected a non-empty square matrix, got {rows}x{cols}")]
    InvalidShape { rows: usize, cols: usize },
    /// Condensed input whose length is not n*(n-1)/2 for any integer n.
    #[error("invalid shape: condensed length {len} is not a triangular number n*(n-1)/2")]
    InvalidCondensedLength { len: usize },
    #[error("invalid dissimilarity input: {reason}")]
    InvalidDissimilarity { reason: String },
    #[error("matrix diagonal matches neither a dissimilarity (zeros) nor a similarity (ones) matrix")]
    InvalidDissimilarityOrSimilarity,
    #[error("invalid dimension request: p = {requested} must lie in [1, {n}]")]
    InvalidDimensionRequest { requested: usize, n: usize },
    #[error("eigendecomposition did not converge: {converged} of {requested} eigenpairs")]
    EigenDecomposition { requested: usize, converged: usize },
    /// Eigenvalues of B scale with the square of the dissimilarities and left the f64 range.
    #[error("eigenvalues overflow f64 for dissimilarities up to {max_dissimilarity:e}")]
    EigenvalueOverflow { max_dissimilarity: f64 },
}

impl CmdsError {
    /// True for both shape failures (square matrix and condensed vector).
    pub fn is_invalid_shape(&self) -> bool {
        matches!(
            self,
            CmdsError::InvalidShape { .. } | CmdsError::InvalidCondensedLength { .. }
        )
    }

    /// True for both numerical failures of the eigen step (non-convergence and overflow).
    pub fn is_eigen_failure(&self) -> bool {
        matches!(
            self,
            CmdsError::EigenDecomposition { .. } | CmdsError::EigenvalueOverflow { .. }
        )
    }

    pub(crate) fn dissimilarity(reason: impl Into<String>) -> Self {
        CmdsError::InvalidDissimilarity {
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CmdsError>;
