//! Block-structured linear factor
//!
//! A `JacobianFactor` represents the linear equation
//! `A1*x1 + A2*x2 + ... = b`, optionally whitened by a diagonal noise model.
//! The storage is one dense column block per variable key followed by a
//! trailing single-column block holding the right-hand side.

use nalgebra::{DMatrix, DVector};

use crate::core::{Key, KeyFormatter};
use crate::error::{MarginalsError, MarginalsResult};
use crate::linear::noise::DiagonalNoise;

/// A linear factor stored as variable-keyed column blocks plus RHS.
///
/// Invariants enforced at construction:
/// - `keys.len() + 1 == blocks.len()`
/// - every block shares the same row count
/// - the trailing block has exactly one column (the RHS)
/// - if a noise model is present, its dimension equals the row count
#[derive(Debug, Clone)]
pub struct JacobianFactor {
    keys: Vec<Key>,
    blocks: Vec<DMatrix<f64>>,
    noise: Option<DiagonalNoise>,
}

impl JacobianFactor {
    /// Construct from ordered `(key, matrix)` terms, an RHS vector, and an
    /// optional noise model.
    pub fn from_terms(
        terms: Vec<(Key, DMatrix<f64>)>,
        b: &DVector<f64>,
        noise: Option<DiagonalNoise>,
    ) -> MarginalsResult<Self> {
        if terms.is_empty() {
            return Err(MarginalsError::InvalidInput(
                "a linear factor must involve at least one variable".to_string(),
            ));
        }
        if let Some(model) = &noise {
            if model.dim() != b.len() {
                return Err(MarginalsError::InvalidNoiseModel {
                    rhs_dim: b.len(),
                    noise_dim: model.dim(),
                });
            }
        }

        let mut keys = Vec::with_capacity(terms.len());
        let mut blocks = Vec::with_capacity(terms.len() + 1);
        for (key, matrix) in terms {
            if matrix.nrows() != b.len() {
                return Err(MarginalsError::InvalidMatrixBlock {
                    expected: b.len(),
                    actual: matrix.nrows(),
                });
            }
            if keys.contains(&key) {
                return Err(MarginalsError::InvalidInput(format!(
                    "duplicate variable key {key} in factor terms"
                )));
            }
            keys.push(key);
            blocks.push(matrix);
        }
        blocks.push(DMatrix::from_column_slice(b.len(), 1, b.as_slice()));

        Ok(Self { keys, blocks, noise })
    }

    /// Construct from a pre-assembled block sequence: one block per key plus
    /// the trailing single-column RHS block.
    pub fn from_blocks(
        keys: Vec<Key>,
        blocks: Vec<DMatrix<f64>>,
        noise: Option<DiagonalNoise>,
    ) -> MarginalsResult<Self> {
        if keys.len() + 1 != blocks.len() {
            return Err(MarginalsError::InvalidInput(format!(
                "number of keys plus one for the RHS block must equal the number \
                 of matrix blocks, got {} keys and {} blocks",
                keys.len(),
                blocks.len()
            )));
        }
        let rows = blocks[0].nrows();
        if blocks.iter().any(|block| block.nrows() != rows) {
            return Err(MarginalsError::InvalidInput(
                "all matrix blocks must share the same row count".to_string(),
            ));
        }
        if blocks[blocks.len() - 1].ncols() != 1 {
            return Err(MarginalsError::InvalidInput(format!(
                "the trailing block must be the single-column RHS vector, got {} columns",
                blocks[blocks.len() - 1].ncols()
            )));
        }
        if let Some(model) = &noise {
            if model.dim() != rows {
                return Err(MarginalsError::InvalidNoiseModel {
                    rhs_dim: rows,
                    noise_dim: model.dim(),
                });
            }
        }
        for (i, key) in keys.iter().enumerate() {
            if keys[..i].contains(key) {
                return Err(MarginalsError::InvalidInput(format!(
                    "duplicate variable key {key} in factor keys"
                )));
            }
        }

        Ok(Self { keys, blocks, noise })
    }

    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    pub fn involves(&self, key: Key) -> bool {
        self.keys.contains(&key)
    }

    /// Residual row count.
    pub fn rows(&self) -> usize {
        self.blocks[0].nrows()
    }

    /// Total variable columns, excluding the RHS.
    pub fn cols(&self) -> usize {
        self.blocks[..self.keys.len()]
            .iter()
            .map(DMatrix::ncols)
            .sum()
    }

    /// The column block of a variable, if the factor involves it.
    pub fn block(&self, key: Key) -> Option<&DMatrix<f64>> {
        self.keys
            .iter()
            .position(|&k| k == key)
            .map(|i| &self.blocks[i])
    }

    /// Column dimension of a variable, if the factor involves it.
    pub fn dim_of(&self, key: Key) -> Option<usize> {
        self.block(key).map(DMatrix::ncols)
    }

    /// The right-hand side vector.
    pub fn rhs(&self) -> DVector<f64> {
        DVector::from_column_slice(self.blocks[self.keys.len()].as_slice())
    }

    pub fn noise(&self) -> Option<&DiagonalNoise> {
        self.noise.as_ref()
    }

    /// The assembled `[A | b]` matrix, blocks in key order.
    pub fn augmented_matrix(&self) -> DMatrix<f64> {
        let rows = self.rows();
        let mut matrix = DMatrix::zeros(rows, self.cols() + 1);
        let mut col = 0;
        for block in &self.blocks {
            matrix
                .view_mut((0, col), (rows, block.ncols()))
                .copy_from(block);
            col += block.ncols();
        }
        matrix
    }

    /// The assembled `[A | b]` matrix with the noise model applied.
    pub fn whitened_augmented_matrix(&self) -> DMatrix<f64> {
        let mut matrix = self.augmented_matrix();
        if let Some(model) = &self.noise {
            model.whiten_in_place(&mut matrix);
        }
        matrix
    }

    /// The information matrix `Aᵀ A` of the whitened system, RHS excluded.
    pub fn information_matrix(&self) -> DMatrix<f64> {
        let augmented = self.whitened_augmented_matrix();
        let a = augmented.columns(0, self.cols());
        a.transpose() * a
    }

    /// Diagnostic dump with a caller-supplied key naming scheme.
    pub fn print(&self, prefix: &str, formatter: KeyFormatter) {
        let names: Vec<String> = self.keys.iter().map(|&k| formatter(k)).collect();
        println!(
            "{prefix}JacobianFactor on [{}], {} rows, noise: {}",
            names.join(", "),
            self.rows(),
            if self.noise.is_some() { "diagonal" } else { "unit" }
        );
        println!("{}", self.augmented_matrix());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::dvector;

    #[test]
    fn test_from_terms_assembles_blocks() {
        let a0 = DMatrix::<f64>::identity(2, 2);
        let a1 = DMatrix::from_element(2, 3, 0.5);
        let b = dvector![1.0, 2.0];
        let factor = JacobianFactor::from_terms(vec![(0, a0), (1, a1)], &b, None).unwrap();

        assert_eq!(factor.keys(), &[0, 1]);
        assert_eq!(factor.rows(), 2);
        assert_eq!(factor.cols(), 5);
        assert_eq!(factor.dim_of(1), Some(3));
        assert_eq!(factor.rhs(), b);
    }

    #[test]
    fn test_noise_dimension_mismatch_reports_sizes() {
        let a0 = DMatrix::<f64>::identity(5, 2);
        let b = DVector::zeros(5);
        let noise = DiagonalNoise::isotropic(4, 1.0).unwrap();
        match JacobianFactor::from_terms(vec![(0, a0)], &b, Some(noise)) {
            Err(MarginalsError::InvalidNoiseModel { rhs_dim: 5, noise_dim: 4 }) => {}
            other => panic!("expected InvalidNoiseModel(5, 4), got {other:?}"),
        }
    }

    #[test]
    fn test_block_row_mismatch_reports_sizes() {
        let a0 = DMatrix::<f64>::identity(3, 3);
        let b = DVector::zeros(2);
        match JacobianFactor::from_terms(vec![(0, a0)], &b, None) {
            Err(MarginalsError::InvalidMatrixBlock { expected: 2, actual: 3 }) => {}
            other => panic!("expected InvalidMatrixBlock(2, 3), got {other:?}"),
        }
    }

    #[test]
    fn test_from_blocks_key_count_check() {
        let blocks = vec![DMatrix::<f64>::identity(2, 2), DMatrix::zeros(2, 1)];
        let result = JacobianFactor::from_blocks(vec![0, 1], blocks, None);
        assert!(matches!(result, Err(MarginalsError::InvalidInput(_))));
    }

    #[test]
    fn test_from_blocks_trailing_rhs_check() {
        let blocks = vec![DMatrix::<f64>::identity(2, 2), DMatrix::zeros(2, 2)];
        let result = JacobianFactor::from_blocks(vec![0], blocks, None);
        assert!(matches!(result, Err(MarginalsError::InvalidInput(_))));
    }

    #[test]
    fn test_information_matrix_whitens() {
        // A = I, sigma = 0.5 per row: info = A' W A = 4 I
        let a0 = DMatrix::<f64>::identity(2, 2);
        let b = DVector::zeros(2);
        let noise = DiagonalNoise::isotropic(2, 0.5).unwrap();
        let factor = JacobianFactor::from_terms(vec![(0, a0)], &b, Some(noise)).unwrap();

        let info = factor.information_matrix();
        assert!((info - DMatrix::identity(2, 2) * 4.0).amax() < 1e-12);
    }
}
