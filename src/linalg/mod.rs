//! Dense linear algebra kernels used by the elimination machinery
//!
//! The elimination steps operate on small dense blocks, so the kernels here
//! are hand-written dense routines on top of nalgebra:
//! - Semidefinite-tolerant Cholesky factorization
//! - Triangular substitution that tolerates zero-information pivots

pub mod cholesky;

pub use cholesky::{cholesky_semidefinite, forward_substitute_transposed};
