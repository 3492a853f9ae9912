//! Marginal covariance and information queries over a factored linear system
//!
//! The engine linearizes a nonlinear factor graph around its solution exactly
//! once, eliminates the result into a Bayes tree, and answers marginal queries
//! from that structure. Query cost depends on the number of requested
//! variables: single variables and pairs use tree shortcuts, larger joints pay
//! for a constrained re-elimination of the stored graph.

use std::collections::HashMap;

use nalgebra::DMatrix;
use tracing::debug;

use crate::core::{Key, KeyFormatter, Linearizable, LinearizationPoint};
use crate::elimination::{BayesTree, Factorization};
use crate::error::{MarginalsError, MarginalsResult};
use crate::linear::GaussianFactorGraph;

/// Marginal query engine over a converged factor graph solution.
///
/// Built once per `(graph, solution, factorization)` triple and read-only
/// afterwards; queries never mutate state visible across calls, and results
/// carry no references back into the engine.
pub struct Marginals {
    graph: GaussianFactorGraph,
    solution: LinearizationPoint,
    factorization: Factorization,
    bayes_tree: BayesTree,
}

impl Marginals {
    /// Linearize `graph` around `solution` and eliminate the result.
    ///
    /// Linearization happens exactly once; a failure there is the only
    /// nonlinear construction failure mode and is propagated verbatim.
    pub fn new(
        graph: &dyn Linearizable,
        solution: &LinearizationPoint,
        factorization: Factorization,
    ) -> MarginalsResult<Self> {
        let linear = graph.linearize(solution)?;
        Self::from_linear(linear, solution.clone(), factorization)
    }

    /// Build the engine directly from an already-linear system.
    pub fn from_linear(
        graph: GaussianFactorGraph,
        solution: LinearizationPoint,
        factorization: Factorization,
    ) -> MarginalsResult<Self> {
        let bayes_tree = graph.eliminate_full(factorization)?;
        debug!(
            factors = graph.len(),
            variables = solution.len(),
            cliques = bayes_tree.num_cliques(),
            "eliminated factor graph for marginal queries"
        );
        Ok(Self {
            graph,
            solution,
            factorization,
            bayes_tree,
        })
    }

    pub fn factorization(&self) -> Factorization {
        self.factorization
    }

    /// The information matrix of a single variable's marginal.
    pub fn marginal_information(&self, variable: Key) -> MarginalsResult<DMatrix<f64>> {
        let marginal = self
            .bayes_tree
            .marginal_factor(variable, self.factorization)?;
        Ok(marginal.information_matrix())
    }

    /// The covariance matrix of a single variable's marginal.
    ///
    /// Fails with [`MarginalsError::SingularMatrix`] for under-constrained
    /// variables whose information matrix cannot be inverted.
    pub fn marginal_covariance(&self, variable: Key) -> MarginalsResult<DMatrix<f64>> {
        self.marginal_information(variable)?
            .try_inverse()
            .ok_or(MarginalsError::SingularMatrix)
    }

    /// The joint information matrix over an ordered list of distinct keys.
    pub fn joint_marginal_information(
        &self,
        variables: &[Key],
    ) -> MarginalsResult<JointMarginal> {
        validate_query_keys(variables)?;

        if variables.len() == 1 {
            let info = self.marginal_information(variables[0])?;
            let dims = vec![info.nrows()];
            return JointMarginal::new(variables.to_vec(), dims, info);
        }

        // Pairs have a structural shortcut in the Bayes tree; larger sets
        // re-eliminate the stored graph with the requested variables kept.
        let joint_graph = if variables.len() == 2 {
            self.bayes_tree
                .joint_factor_graph(variables[0], variables[1], self.factorization)?
        } else {
            self.graph.eliminate_marginal(variables, self.factorization)?
        };

        let augmented = joint_graph.augmented_information_matrix(variables)?;
        let n = augmented.nrows() - 1;
        let info = augmented.view((0, 0), (n, n)).into_owned();

        let dims = variables
            .iter()
            .map(|&key| self.solution.dim_of(key))
            .collect::<MarginalsResult<Vec<usize>>>()?;

        JointMarginal::new(variables.to_vec(), dims, info)
    }

    /// The joint covariance over an ordered list of distinct keys.
    ///
    /// The inversion is over the entire joint matrix, not per block:
    /// cross-covariances require the full inverse.
    pub fn joint_marginal_covariance(
        &self,
        variables: &[Key],
    ) -> MarginalsResult<JointMarginal> {
        let mut joint = self.joint_marginal_information(variables)?;
        joint.invert_in_place()?;
        Ok(joint)
    }

    /// Diagnostic dump of the stored graph, solution, and Bayes tree.
    pub fn print(&self, prefix: &str, formatter: KeyFormatter) {
        self.graph.print(&format!("{prefix}Graph: "), formatter);
        self.solution
            .print(&format!("{prefix}Solution: "), formatter);
        self.bayes_tree
            .print(&format!("{prefix}Bayes Tree: "), formatter);
    }
}

fn validate_query_keys(variables: &[Key]) -> MarginalsResult<()> {
    if variables.is_empty() {
        return Err(MarginalsError::InvalidInput(
            "joint marginal query requires at least one variable key".to_string(),
        ));
    }
    for (i, key) in variables.iter().enumerate() {
        if variables[..i].contains(key) {
            return Err(MarginalsError::InvalidInput(format!(
                "duplicate variable key {key} in joint marginal query"
            )));
        }
    }
    Ok(())
}

/// A block-addressable symmetric matrix over an ordered list of variables.
///
/// Either an information matrix or a covariance matrix; the two flavors are
/// structurally identical and differ only by whole-matrix inversion.
#[derive(Debug, Clone)]
pub struct JointMarginal {
    keys: Vec<Key>,
    dims: Vec<usize>,
    offsets: HashMap<Key, (usize, usize)>,
    matrix: DMatrix<f64>,
}

impl JointMarginal {
    fn new(keys: Vec<Key>, dims: Vec<usize>, matrix: DMatrix<f64>) -> MarginalsResult<Self> {
        let total: usize = dims.iter().sum();
        if keys.len() != dims.len() || matrix.nrows() != total || matrix.ncols() != total {
            return Err(MarginalsError::InvalidInput(format!(
                "joint marginal dimensions are inconsistent: {} keys, {} dims summing \
                 to {total}, {}x{} matrix",
                keys.len(),
                dims.len(),
                matrix.nrows(),
                matrix.ncols()
            )));
        }

        let mut offsets = HashMap::with_capacity(keys.len());
        let mut start = 0;
        for (&key, &dim) in keys.iter().zip(&dims) {
            offsets.insert(key, (start, dim));
            start += dim;
        }

        Ok(Self {
            keys,
            dims,
            offsets,
            matrix,
        })
    }

    /// Requested variable keys, in query order.
    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    /// Per-variable dimensions, parallel to `keys`.
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// The whole assembled matrix.
    pub fn full(&self) -> &DMatrix<f64> {
        &self.matrix
    }

    /// The sub-block at the rows owned by `row_key` and the columns owned by
    /// `col_key`, independent of the keys' positions in the query order.
    pub fn at(&self, row_key: Key, col_key: Key) -> MarginalsResult<DMatrix<f64>> {
        let &(row_start, row_dim) = self
            .offsets
            .get(&row_key)
            .ok_or(MarginalsError::KeyNotFound(row_key))?;
        let &(col_start, col_dim) = self
            .offsets
            .get(&col_key)
            .ok_or(MarginalsError::KeyNotFound(col_key))?;
        Ok(self
            .matrix
            .view((row_start, col_start), (row_dim, col_dim))
            .into_owned())
    }

    /// One-time whole-matrix inversion converting between information and
    /// covariance form.
    pub(crate) fn invert_in_place(&mut self) -> MarginalsResult<()> {
        let inverted = self
            .matrix
            .clone()
            .try_inverse()
            .ok_or(MarginalsError::SingularMatrix)?;
        self.matrix = inverted;
        Ok(())
    }

    /// Diagnostic dump with a caller-supplied key naming scheme.
    pub fn print(&self, prefix: &str, formatter: KeyFormatter) {
        let names: Vec<String> = self.keys.iter().map(|&k| formatter(k)).collect();
        println!(
            "{prefix}Joint marginal on keys [{}]; use `at` to query matrix blocks.",
            names.join(", ")
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linear::JacobianFactor;
    use nalgebra::DVector;

    fn prior(key: Key, dim: usize) -> JacobianFactor {
        JacobianFactor::from_terms(
            vec![(key, DMatrix::identity(dim, dim))],
            &DVector::zeros(dim),
            None,
        )
        .unwrap()
    }

    fn between(a: Key, b: Key, dim: usize) -> JacobianFactor {
        JacobianFactor::from_terms(
            vec![
                (a, -DMatrix::<f64>::identity(dim, dim)),
                (b, DMatrix::<f64>::identity(dim, dim)),
            ],
            &DVector::zeros(dim),
            None,
        )
        .unwrap()
    }

    fn chain_engine(dim: usize, n: usize, factorization: Factorization) -> Marginals {
        let mut graph = GaussianFactorGraph::new();
        graph.add(prior(0, dim));
        for i in 1..n {
            graph.add(between(i as Key - 1, i as Key, dim));
        }
        let solution: LinearizationPoint = (0..n as Key)
            .map(|k| (k, DVector::zeros(dim)))
            .collect();
        Marginals::from_linear(graph, solution, factorization).unwrap()
    }

    #[test]
    fn test_two_pose_chain_closed_form() {
        // H = [[2I, -I], [-I, I]]: cov(x0) = I, cov(x1) = 2I.
        let marginals = chain_engine(3, 2, Factorization::Cholesky);

        let cov0 = marginals.marginal_covariance(0).unwrap();
        let cov1 = marginals.marginal_covariance(1).unwrap();
        assert!((cov0 - DMatrix::identity(3, 3)).amax() < 1e-9);
        assert!((cov1 - DMatrix::identity(3, 3) * 2.0).amax() < 1e-9);
    }

    #[test]
    fn test_pair_shortcut_matches_general_path() {
        let marginals = chain_engine(2, 4, Factorization::Qr);

        // Shortcut path: Bayes tree pairwise joint.
        let shortcut = marginals.joint_marginal_information(&[1, 3]).unwrap();

        // General path: constrained re-elimination of the full stored graph.
        let joint_graph = marginals
            .graph
            .eliminate_marginal(&[1, 3], marginals.factorization)
            .unwrap();
        let augmented = joint_graph.augmented_information_matrix(&[1, 3]).unwrap();
        let n = augmented.nrows() - 1;
        let general = augmented.view((0, 0), (n, n)).into_owned();

        assert!((shortcut.full() - general).amax() < 1e-9);
    }

    #[test]
    fn test_query_validation() {
        let marginals = chain_engine(2, 3, Factorization::Qr);
        assert!(matches!(
            marginals.joint_marginal_information(&[]),
            Err(MarginalsError::InvalidInput(_))
        ));
        assert!(matches!(
            marginals.joint_marginal_information(&[1, 1]),
            Err(MarginalsError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_singular_information_surfaces() {
        // No prior anywhere: the system has a gauge freedom, so marginal
        // information is singular and covariance must fail, not return NaN.
        let mut graph = GaussianFactorGraph::new();
        graph.add(between(0, 1, 2));
        let solution: LinearizationPoint =
            [(0, DVector::zeros(2)), (1, DVector::zeros(2))].into_iter().collect();
        let marginals =
            Marginals::from_linear(graph, solution, Factorization::Qr).unwrap();

        assert!(matches!(
            marginals.marginal_covariance(1),
            Err(MarginalsError::SingularMatrix)
        ));
    }

    #[test]
    fn test_joint_block_access_offsets() {
        let marginals = chain_engine(2, 3, Factorization::Cholesky);
        let joint = marginals.joint_marginal_covariance(&[2, 0]).unwrap();

        assert_eq!(joint.keys(), &[2, 0]);
        assert_eq!(joint.dims(), &[2, 2]);
        assert_eq!(joint.full().nrows(), 4);

        let block = joint.at(0, 2).unwrap();
        let transposed = joint.at(2, 0).unwrap();
        assert!((block - transposed.transpose()).amax() < 1e-9);
        assert!(matches!(joint.at(0, 7), Err(MarginalsError::KeyNotFound(7))));
    }
}
