//! Linearization point: the converged solution the marginals are evaluated at

use std::collections::BTreeMap;

use nalgebra::DVector;

use crate::core::{Key, KeyFormatter};
use crate::error::{MarginalsError, MarginalsResult};

/// The solution values a nonlinear graph was linearized around.
///
/// The marginals engine keeps a copy to look up per-variable tangent-space
/// dimensions when assembling joint results. Stored in key order so that
/// printing is reproducible.
#[derive(Debug, Clone, Default)]
pub struct LinearizationPoint {
    values: BTreeMap<Key, DVector<f64>>,
}

impl LinearizationPoint {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the value for a variable.
    pub fn insert(&mut self, key: Key, value: DVector<f64>) {
        self.values.insert(key, value);
    }

    pub fn get(&self, key: Key) -> Option<&DVector<f64>> {
        self.values.get(&key)
    }

    pub fn contains(&self, key: Key) -> bool {
        self.values.contains_key(&key)
    }

    /// Tangent-space dimension of a variable.
    pub fn dim_of(&self, key: Key) -> MarginalsResult<usize> {
        self.values
            .get(&key)
            .map(|v| v.len())
            .ok_or(MarginalsError::KeyNotFound(key))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = Key> + '_ {
        self.values.keys().copied()
    }

    /// Diagnostic dump with a caller-supplied key naming scheme.
    pub fn print(&self, prefix: &str, formatter: KeyFormatter) {
        println!("{prefix}LinearizationPoint with {} values:", self.values.len());
        for (key, value) in &self.values {
            println!("  {} (dim {}): {}", formatter(*key), value.len(), value.transpose());
        }
    }
}

impl FromIterator<(Key, DVector<f64>)> for LinearizationPoint {
    fn from_iter<I: IntoIterator<Item = (Key, DVector<f64>)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}
