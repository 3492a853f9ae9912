//! Core types shared across the graph-marginals library
//!
//! This module contains the variable key type, the key formatting hook used by
//! all diagnostic printing, and the linearization point that associates each
//! variable with its tangent-space value.

pub mod values;

pub use values::LinearizationPoint;

use crate::error::MarginalsResult;
use crate::linear::GaussianFactorGraph;

/// Unique identifier for a variable (pose, landmark, ...) in a factor graph.
///
/// Keys are opaque to the engine; their total order is used only for
/// reproducible elimination orderings and printing.
pub type Key = u64;

/// Caller-supplied scheme for rendering keys in diagnostic output.
pub type KeyFormatter<'a> = &'a dyn Fn(Key) -> String;

/// Default key rendering: `x0`, `x1`, ...
pub fn default_key_formatter(key: Key) -> String {
    format!("x{key}")
}

/// Seam to the nonlinear collaborator: anything that can be linearized around
/// a solution into a Gaussian factor graph.
///
/// The marginals engine calls this exactly once at construction; failures are
/// propagated verbatim as [`crate::MarginalsError::Linearization`].
pub trait Linearizable {
    fn linearize(&self, point: &LinearizationPoint) -> MarginalsResult<GaussianFactorGraph>;
}
