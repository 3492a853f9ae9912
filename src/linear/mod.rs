//! Linear (Gaussian) factor representation
//!
//! This module contains the block-structured linear factor produced by
//! linearization, its diagonal noise model, and the Gaussian factor graph
//! the elimination machinery consumes:
//! - Diagonal noise models and residual whitening
//! - Jacobian factors stored as variable-keyed column blocks plus RHS
//! - Factor graph aggregation with elimination and information-matrix services

pub mod factor;
pub mod graph;
pub mod noise;

pub use factor::JacobianFactor;
pub use graph::GaussianFactorGraph;
pub use noise::DiagonalNoise;
