//! Tree-structured factorization of an eliminated Gaussian factor graph
//!
//! Full elimination yields one conditional per variable; linking each
//! conditional to the clique of its earliest-eliminated separator variable
//! produces the elimination tree. The tree supports marginal extraction
//! without re-eliminating the whole graph: the product of the conditionals on
//! a clique's path to the root is the exact joint density over the path's
//! frontal variables, so queries only ever re-eliminate those small subsets.

use std::collections::{BTreeSet, HashMap};

use crate::core::{Key, KeyFormatter};
use crate::error::{MarginalsError, MarginalsResult};
use crate::linear::{GaussianFactorGraph, JacobianFactor};

use super::{eliminate_sequential, Factorization, GaussianConditional};

#[derive(Debug, Clone)]
struct Clique {
    conditional: GaussianConditional,
    parent: Option<usize>,
}

/// The factored form of a fully eliminated linear system.
///
/// Immutable once built; queries perform transient re-elimination of path
/// conditionals but never alter the tree.
#[derive(Debug, Clone)]
pub struct BayesTree {
    // Cliques stored in elimination order; parents always come later.
    cliques: Vec<Clique>,
    index: HashMap<Key, usize>,
}

impl BayesTree {
    /// Eliminate every variable of `graph` in `ordering` and assemble the tree.
    pub fn eliminate(
        graph: &GaussianFactorGraph,
        ordering: &[Key],
        strategy: Factorization,
    ) -> MarginalsResult<Self> {
        let (conditionals, _) =
            eliminate_sequential(graph.factors().to_vec(), ordering, strategy)?;

        let index: HashMap<Key, usize> = conditionals
            .iter()
            .enumerate()
            .map(|(i, c)| (c.frontal(), i))
            .collect();

        let cliques = conditionals
            .into_iter()
            .map(|conditional| {
                // Parent: the clique of the separator variable eliminated first.
                let parent = conditional
                    .separator()
                    .iter()
                    .filter_map(|key| index.get(key).copied())
                    .min();
                Clique { conditional, parent }
            })
            .collect();

        Ok(Self { cliques, index })
    }

    pub fn num_cliques(&self) -> usize {
        self.cliques.len()
    }

    pub fn contains(&self, key: Key) -> bool {
        self.index.contains_key(&key)
    }

    /// The marginal factor of a single variable, extracted by re-eliminating
    /// only the conditionals on the variable's path to the root.
    pub fn marginal_factor(
        &self,
        key: Key,
        strategy: Factorization,
    ) -> MarginalsResult<JacobianFactor> {
        let clique = *self
            .index
            .get(&key)
            .ok_or(MarginalsError::KeyNotFound(key))?;

        let path = self.path_to_root(clique);
        let factors = self.path_factors(&path);
        let ordering: Vec<Key> = path
            .iter()
            .map(|&i| self.cliques[i].conditional.frontal())
            .filter(|&frontal| frontal != key)
            .collect();

        let (_, remaining) = eliminate_sequential(factors, &ordering, strategy)?;
        merge_single_variable_factors(key, &remaining)
    }

    /// The joint factor graph over exactly two variables, extracted from the
    /// union of their paths to the root. This is the structural shortcut for
    /// pairwise queries; larger joints require constrained re-elimination of
    /// the full graph.
    pub fn joint_factor_graph(
        &self,
        key_a: Key,
        key_b: Key,
        strategy: Factorization,
    ) -> MarginalsResult<GaussianFactorGraph> {
        if key_a == key_b {
            return Err(MarginalsError::InvalidInput(format!(
                "joint query requires two distinct keys, got {key_a} twice"
            )));
        }
        let clique_a = *self
            .index
            .get(&key_a)
            .ok_or(MarginalsError::KeyNotFound(key_a))?;
        let clique_b = *self
            .index
            .get(&key_b)
            .ok_or(MarginalsError::KeyNotFound(key_b))?;

        let mut union: BTreeSet<usize> = self.path_to_root(clique_a).into_iter().collect();
        union.extend(self.path_to_root(clique_b));
        let path: Vec<usize> = union.into_iter().collect();

        let factors = self.path_factors(&path);
        let ordering: Vec<Key> = path
            .iter()
            .map(|&i| self.cliques[i].conditional.frontal())
            .filter(|&frontal| frontal != key_a && frontal != key_b)
            .collect();

        let (_, remaining) = eliminate_sequential(factors, &ordering, strategy)?;
        let mut joint = GaussianFactorGraph::new();
        for factor in remaining {
            joint.add(factor);
        }
        Ok(joint)
    }

    /// Diagnostic dump with a caller-supplied key naming scheme.
    pub fn print(&self, prefix: &str, formatter: KeyFormatter) {
        println!("{prefix}BayesTree with {} cliques:", self.cliques.len());
        for (i, clique) in self.cliques.iter().enumerate() {
            let separator: Vec<String> = clique
                .conditional
                .separator()
                .iter()
                .map(|&k| formatter(k))
                .collect();
            let parent = match clique.parent {
                Some(p) => formatter(self.cliques[p].conditional.frontal()),
                None => "-".to_string(),
            };
            println!(
                "  clique {i}: P({} | {}), parent: {parent}",
                formatter(self.cliques[i].conditional.frontal()),
                separator.join(", ")
            );
        }
    }

    /// Clique indices from `start` up to the root, in elimination order.
    fn path_to_root(&self, start: usize) -> Vec<usize> {
        let mut path = vec![start];
        let mut current = start;
        while let Some(parent) = self.cliques[current].parent {
            path.push(parent);
            current = parent;
        }
        path
    }

    fn path_factors(&self, path: &[usize]) -> Vec<JacobianFactor> {
        path.iter()
            .map(|&i| self.cliques[i].conditional.as_factor().clone())
            .collect()
    }
}

/// Stack the rows of factors that all involve exactly one variable.
fn merge_single_variable_factors(
    key: Key,
    factors: &[JacobianFactor],
) -> MarginalsResult<JacobianFactor> {
    let parts: Vec<&JacobianFactor> = factors
        .iter()
        .filter(|f| f.keys().len() == 1 && f.keys()[0] == key)
        .collect();
    if parts.is_empty() {
        return Err(MarginalsError::KeyNotFound(key));
    }

    let dim = parts[0].dim_of(key).unwrap_or(0);
    let rows: usize = parts.iter().map(|f| f.rows()).sum();
    let mut block = nalgebra::DMatrix::zeros(rows, dim);
    let mut rhs = nalgebra::DMatrix::zeros(rows, 1);
    let mut row = 0;
    for part in parts {
        let augmented = part.whitened_augmented_matrix();
        block
            .view_mut((row, 0), (part.rows(), dim))
            .copy_from(&augmented.view((0, 0), (part.rows(), dim)));
        rhs.view_mut((row, 0), (part.rows(), 1))
            .copy_from(&augmented.view((0, dim), (part.rows(), 1)));
        row += part.rows();
    }

    JacobianFactor::from_blocks(vec![key], vec![block, rhs], None)
}
