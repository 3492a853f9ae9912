//! Integration tests for the marginals engine
//!
//! Exercises the full query surface on small pose-chain and landmark systems:
//! information/covariance duality, joint query ordering, independence
//! structure, and the failure modes for unknown keys and malformed factors.

// Allow expect() in test code
#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]

use nalgebra::{DMatrix, DVector};

use graph_marginals::core::{Key, Linearizable, LinearizationPoint};
use graph_marginals::linear::{DiagonalNoise, GaussianFactorGraph, JacobianFactor};
use graph_marginals::{Factorization, Marginals, MarginalsError};

fn prior(key: Key, dim: usize, sigma: f64) -> JacobianFactor {
    let noise = DiagonalNoise::isotropic(dim, sigma).unwrap();
    JacobianFactor::from_terms(
        vec![(key, DMatrix::identity(dim, dim))],
        &DVector::zeros(dim),
        Some(noise),
    )
    .unwrap()
}

fn between(a: Key, b: Key, dim: usize, sigma: f64) -> JacobianFactor {
    let noise = DiagonalNoise::isotropic(dim, sigma).unwrap();
    JacobianFactor::from_terms(
        vec![
            (a, -DMatrix::<f64>::identity(dim, dim)),
            (b, DMatrix::<f64>::identity(dim, dim)),
        ],
        &DVector::zeros(dim),
        Some(noise),
    )
    .unwrap()
}

fn zero_solution(keys: &[Key], dim: usize) -> LinearizationPoint {
    keys.iter().map(|&k| (k, DVector::zeros(dim))).collect()
}

/// A pose chain with a prior on the first pose: x0 - x1 - ... - x{n-1}.
fn chain_engine(dim: usize, n: usize, factorization: Factorization) -> Marginals {
    let mut graph = GaussianFactorGraph::new();
    graph.add(prior(0, dim, 1.0));
    for i in 1..n {
        graph.add(between(i as Key - 1, i as Key, dim, 1.0));
    }
    let keys: Vec<Key> = (0..n as Key).collect();
    Marginals::from_linear(graph, zero_solution(&keys, dim), factorization).unwrap()
}

#[test]
fn single_variable_covariance_inverts_information() {
    for factorization in [Factorization::Cholesky, Factorization::Qr] {
        let mut graph = GaussianFactorGraph::new();
        graph.add(prior(0, 4, 0.5));
        let marginals =
            Marginals::from_linear(graph, zero_solution(&[0], 4), factorization).unwrap();

        let info = marginals.marginal_information(0).unwrap();
        let cov = marginals.marginal_covariance(0).unwrap();

        assert_eq!(cov.nrows(), 4);
        assert_eq!(cov.ncols(), 4);
        // sigma = 0.5: info = 4 I, cov = 0.25 I
        assert!((info.clone() - DMatrix::identity(4, 4) * 4.0).amax() < 1e-9);
        assert!((cov.clone() * info - DMatrix::identity(4, 4)).amax() < 1e-9);
    }
}

#[test]
fn pairwise_joint_is_order_independent() {
    let marginals = chain_engine(3, 4, Factorization::Cholesky);

    let forward = marginals.joint_marginal_information(&[1, 3]).unwrap();
    let reversed = marginals.joint_marginal_information(&[3, 1]).unwrap();

    // Same numeric blocks, reordered consistently with the requested order.
    for &a in &[1, 3] {
        for &b in &[1, 3] {
            let lhs = forward.at(a, b).unwrap();
            let rhs = reversed.at(a, b).unwrap();
            assert!((lhs - rhs).amax() < 1e-9);
        }
    }
    // The assembled matrices follow the requested key order.
    assert_eq!(forward.keys(), &[1, 3]);
    assert_eq!(reversed.keys(), &[3, 1]);
}

#[test]
fn independent_variables_give_block_diagonal_joint() {
    // Three variables with no shared factors: joint information over all
    // three is block-diagonal and equals the stacked single marginals.
    let mut graph = GaussianFactorGraph::new();
    graph.add(prior(0, 2, 1.0));
    graph.add(prior(1, 2, 0.5));
    graph.add(prior(2, 2, 2.0));
    let marginals =
        Marginals::from_linear(graph, zero_solution(&[0, 1, 2], 2), Factorization::Qr).unwrap();

    let joint = marginals.joint_marginal_information(&[0, 1, 2]).unwrap();
    assert_eq!(joint.full().nrows(), 6);

    for &a in &[0, 1, 2] {
        for &b in &[0, 1, 2] {
            let block = joint.at(a, b).unwrap();
            if a == b {
                let single = marginals.marginal_information(a).unwrap();
                assert!((block - single).amax() < 1e-9);
            } else {
                assert!(block.amax() < 1e-9);
            }
        }
    }
}

#[test]
fn joint_covariance_roundtrips_to_information() {
    let marginals = chain_engine(2, 5, Factorization::Cholesky);
    let variables: &[Key] = &[0, 2, 4];

    let info = marginals.joint_marginal_information(variables).unwrap();
    let cov = marginals.joint_marginal_covariance(variables).unwrap();

    let reinverted = cov.full().clone().try_inverse().unwrap();
    assert!((reinverted - info.full()).amax() < 1e-8);
}

#[test]
fn unknown_keys_fail_for_all_query_shapes() {
    let marginals = chain_engine(2, 3, Factorization::Qr);

    assert!(matches!(
        marginals.marginal_information(9),
        Err(MarginalsError::KeyNotFound(9))
    ));
    assert!(matches!(
        marginals.marginal_covariance(9),
        Err(MarginalsError::KeyNotFound(9))
    ));
    assert!(matches!(
        marginals.joint_marginal_information(&[9]),
        Err(MarginalsError::KeyNotFound(9))
    ));
    assert!(matches!(
        marginals.joint_marginal_information(&[0, 9]),
        Err(MarginalsError::KeyNotFound(9))
    ));
    assert!(matches!(
        marginals.joint_marginal_information(&[0, 1, 9]),
        Err(MarginalsError::KeyNotFound(9))
    ));
}

#[test]
fn noise_model_mismatch_reports_both_sizes() {
    let noise = DiagonalNoise::isotropic(4, 1.0).unwrap();
    let result = JacobianFactor::from_terms(
        vec![(0, DMatrix::identity(5, 2))],
        &DVector::zeros(5),
        Some(noise),
    );
    match result {
        Err(MarginalsError::InvalidNoiseModel { rhs_dim: 5, noise_dim: 4 }) => {}
        other => panic!("expected InvalidNoiseModel(5, 4), got {other:?}"),
    }
}

#[test]
fn pair_query_agrees_across_factorizations() {
    // Cross-check: the Bayes-tree pairwise shortcut under both strategies
    // must agree with the general >2 path that includes the same pair.
    let qr = chain_engine(3, 5, Factorization::Qr);
    let cholesky = chain_engine(3, 5, Factorization::Cholesky);

    let pair_qr = qr.joint_marginal_information(&[1, 4]).unwrap();
    let pair_chol = cholesky.joint_marginal_information(&[1, 4]).unwrap();
    assert!((pair_qr.full() - pair_chol.full()).amax() < 1e-8);

    // Embed the pair in a 3-variable query (general re-elimination path) and
    // compare the joint covariance blocks on the shared pair.
    let triple = qr.joint_marginal_covariance(&[1, 3, 4]).unwrap();
    let pair_cov = qr.joint_marginal_covariance(&[1, 4]).unwrap();
    // Marginalizing a covariance is just dropping rows/columns, so the pair
    // blocks must match between the two query paths.
    for &a in &[1, 4] {
        for &b in &[1, 4] {
            let from_triple = triple.at(a, b).unwrap();
            let from_pair = pair_cov.at(a, b).unwrap();
            assert!((from_triple - from_pair).amax() < 1e-8);
        }
    }
}

#[test]
fn loop_closure_reduces_uncertainty() {
    // Chain of 4 poses; adding a loop closure between x0 and x3 must shrink
    // the variance of the last pose.
    let dim = 3;
    let keys: Vec<Key> = (0..4).collect();

    let mut open = GaussianFactorGraph::new();
    open.add(prior(0, dim, 0.1));
    for i in 1..4 {
        open.add(between(i - 1, i, dim, 0.5));
    }
    let without = Marginals::from_linear(
        open.clone(),
        zero_solution(&keys, dim),
        Factorization::Cholesky,
    )
    .unwrap();

    let mut closed = open;
    closed.add(between(0, 3, dim, 0.5));
    let with =
        Marginals::from_linear(closed, zero_solution(&keys, dim), Factorization::Cholesky)
            .unwrap();

    let var_without = without.marginal_covariance(3).unwrap()[(0, 0)];
    let var_with = with.marginal_covariance(3).unwrap()[(0, 0)];
    assert!(var_with < var_without);
}

/// A trivial nonlinear collaborator whose linearization is a fixed graph.
struct PrebuiltGraph {
    graph: GaussianFactorGraph,
    fail: bool,
}

impl Linearizable for PrebuiltGraph {
    fn linearize(&self, _point: &LinearizationPoint) -> Result<GaussianFactorGraph, MarginalsError> {
        if self.fail {
            Err(MarginalsError::Linearization(
                "jacobian evaluation diverged".to_string(),
            ))
        } else {
            Ok(self.graph.clone())
        }
    }
}

#[test]
fn construction_through_linearization_seam() {
    let mut graph = GaussianFactorGraph::new();
    graph.add(prior(0, 2, 1.0));
    let solution = zero_solution(&[0], 2);

    let ok = PrebuiltGraph { graph: graph.clone(), fail: false };
    let marginals = Marginals::new(&ok, &solution, Factorization::Cholesky).unwrap();
    assert!(marginals.marginal_covariance(0).is_ok());

    let failing = PrebuiltGraph { graph, fail: true };
    assert!(matches!(
        Marginals::new(&failing, &solution, Factorization::Cholesky),
        Err(MarginalsError::Linearization(_))
    ));
}
