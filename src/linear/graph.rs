//! Gaussian factor graph: the linearized least-squares system

use std::collections::BTreeSet;

use nalgebra::DMatrix;

use crate::core::{Key, KeyFormatter};
use crate::elimination::{eliminate_sequential, BayesTree, Factorization};
use crate::error::{MarginalsError, MarginalsResult};
use crate::linear::JacobianFactor;

/// An ordered collection of linear factors over a universe of variable keys.
///
/// Factor order matters only for reproducibility and printing, not semantics.
#[derive(Debug, Clone, Default)]
pub struct GaussianFactorGraph {
    factors: Vec<JacobianFactor>,
}

impl GaussianFactorGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, factor: JacobianFactor) {
        self.factors.push(factor);
    }

    pub fn factors(&self) -> &[JacobianFactor] {
        &self.factors
    }

    pub fn iter(&self) -> impl Iterator<Item = &JacobianFactor> {
        self.factors.iter()
    }

    pub fn len(&self) -> usize {
        self.factors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }

    /// All variable keys referenced by any factor, in ascending order.
    pub fn keys(&self) -> Vec<Key> {
        let set: BTreeSet<Key> = self
            .factors
            .iter()
            .flat_map(|f| f.keys().iter().copied())
            .collect();
        set.into_iter().collect()
    }

    /// Full multifrontal elimination into a Bayes tree, in ascending key order.
    pub fn eliminate_full(&self, strategy: Factorization) -> MarginalsResult<BayesTree> {
        let ordering = self.keys();
        BayesTree::eliminate(self, &ordering, strategy)
    }

    /// Eliminate everything except `keep`, returning the marginal factor
    /// graph over exactly those variables.
    ///
    /// Every key in `keep` must be part of the graph; unknown keys fail with
    /// [`MarginalsError::KeyNotFound`].
    pub fn eliminate_marginal(
        &self,
        keep: &[Key],
        strategy: Factorization,
    ) -> MarginalsResult<GaussianFactorGraph> {
        let all = self.keys();
        for &key in keep {
            if !all.contains(&key) {
                return Err(MarginalsError::KeyNotFound(key));
            }
        }
        let ordering: Vec<Key> = all.into_iter().filter(|k| !keep.contains(k)).collect();

        let (_, remaining) = eliminate_sequential(self.factors.clone(), &ordering, strategy)?;
        let mut marginal = GaussianFactorGraph::new();
        for factor in remaining {
            marginal.add(factor);
        }
        Ok(marginal)
    }

    /// The augmented information matrix `[Jᵀ J, Jᵀ b; bᵀ J, bᵀ b]` with
    /// variable blocks laid out in `ordering`.
    ///
    /// The top-left block is the information matrix over the ordered
    /// variables; the final row/column encode the residual term. Every factor
    /// key must appear in `ordering`.
    pub fn augmented_information_matrix(
        &self,
        ordering: &[Key],
    ) -> MarginalsResult<DMatrix<f64>> {
        // Per-key dimensions, discovered from the factor blocks.
        let mut dims = Vec::with_capacity(ordering.len());
        for &key in ordering {
            let dim = self
                .factors
                .iter()
                .find_map(|f| f.dim_of(key))
                .ok_or(MarginalsError::KeyNotFound(key))?;
            dims.push(dim);
        }
        let mut offsets = Vec::with_capacity(ordering.len());
        let mut total = 0;
        for &dim in &dims {
            offsets.push(total);
            total += dim;
        }

        let mut augmented = DMatrix::zeros(total + 1, total + 1);
        for factor in &self.factors {
            let whitened = factor.whitened_augmented_matrix();
            let local = whitened.transpose() * &whitened;

            // Map each local block range (variables plus trailing RHS) to its
            // global offset, then scatter all block pairs.
            let mut ranges = Vec::with_capacity(factor.keys().len() + 1);
            let mut col = 0;
            for &key in factor.keys() {
                let width = factor.dim_of(key).unwrap_or(0);
                let position = ordering
                    .iter()
                    .position(|&k| k == key)
                    .ok_or(MarginalsError::KeyNotFound(key))?;
                ranges.push((col, width, offsets[position]));
                col += width;
            }
            ranges.push((col, 1, total));

            for &(local_i, len_i, global_i) in &ranges {
                for &(local_j, len_j, global_j) in &ranges {
                    for i in 0..len_i {
                        for j in 0..len_j {
                            augmented[(global_i + i, global_j + j)] +=
                                local[(local_i + i, local_j + j)];
                        }
                    }
                }
            }
        }
        Ok(augmented)
    }

    /// Diagnostic dump with a caller-supplied key naming scheme.
    pub fn print(&self, prefix: &str, formatter: KeyFormatter) {
        println!("{prefix}GaussianFactorGraph with {} factors:", self.factors.len());
        for (i, factor) in self.factors.iter().enumerate() {
            factor.print(&format!("  factor {i}: "), formatter);
        }
    }
}

impl FromIterator<JacobianFactor> for GaussianFactorGraph {
    fn from_iter<I: IntoIterator<Item = JacobianFactor>>(iter: I) -> Self {
        Self {
            factors: iter.into_iter().collect(),
        }
    }
}
