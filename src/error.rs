//! Error types for the graph-marginals library
//!
//! This module provides the main error and result types used throughout the library.
//! All errors use the `thiserror` crate for automatic trait implementations.

use crate::core::Key;
use thiserror::Error;

/// Main result type used throughout the graph-marginals library
pub type MarginalsResult<T> = Result<T, MarginalsError>;

/// Main error type for the graph-marginals library
#[derive(Debug, Clone, Error)]
pub enum MarginalsError {
    /// Noise model dimension does not match the factor's right-hand side
    #[error("invalid noise model: right-hand side has {rhs_dim} rows but noise model has dimension {noise_dim}")]
    InvalidNoiseModel { rhs_dim: usize, noise_dim: usize },

    /// A variable block has a different row count than the right-hand side
    #[error("invalid matrix block: expected {expected} rows, got {actual}")]
    InvalidMatrixBlock { expected: usize, actual: usize },

    /// Invalid input parameters
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A queried variable key is not part of the system
    #[error("variable key {0} not found")]
    KeyNotFound(Key),

    /// Cholesky elimination encountered an indefinite matrix
    #[error("matrix is not positive definite; use QR factorization for rank-deficient systems")]
    NotPositiveDefinite,

    /// Matrix inversion failed, typically for under-constrained variables
    #[error("information matrix is singular and cannot be inverted")]
    SingularMatrix,

    /// Linearization of the nonlinear graph failed
    #[error("linearization failed: {0}")]
    Linearization(String),
}
