//! Diagonal Gaussian noise models

use nalgebra::{DMatrix, DVector};

use crate::error::{MarginalsError, MarginalsResult};

/// Diagonal Gaussian noise model: independent per-row standard deviations.
///
/// Whitening scales each residual row by `1/sigma` so that downstream
/// elimination can treat all rows as unit-variance.
#[derive(Debug, Clone, PartialEq)]
pub struct DiagonalNoise {
    sigmas: DVector<f64>,
}

impl DiagonalNoise {
    /// Build from per-row standard deviations. All sigmas must be positive.
    pub fn from_sigmas(sigmas: DVector<f64>) -> MarginalsResult<Self> {
        if sigmas.iter().any(|&s| s <= 0.0 || !s.is_finite()) {
            return Err(MarginalsError::InvalidInput(
                "noise model sigmas must be positive and finite".to_string(),
            ));
        }
        Ok(Self { sigmas })
    }

    /// Build from per-row variances.
    pub fn from_variances(variances: DVector<f64>) -> MarginalsResult<Self> {
        Self::from_sigmas(variances.map(f64::sqrt))
    }

    /// Isotropic model: `dim` rows sharing one standard deviation.
    pub fn isotropic(dim: usize, sigma: f64) -> MarginalsResult<Self> {
        Self::from_sigmas(DVector::from_element(dim, sigma))
    }

    /// Number of residual rows this model applies to.
    pub fn dim(&self) -> usize {
        self.sigmas.len()
    }

    pub fn sigmas(&self) -> &DVector<f64> {
        &self.sigmas
    }

    /// Scale each row of `matrix` by the inverse standard deviation.
    ///
    /// The caller guarantees `matrix.nrows() == self.dim()`; factor
    /// construction enforces this.
    pub fn whiten_in_place(&self, matrix: &mut DMatrix<f64>) {
        debug_assert_eq!(matrix.nrows(), self.dim());
        for (i, sigma) in self.sigmas.iter().enumerate() {
            let mut row = matrix.row_mut(i);
            row /= *sigma;
        }
    }
}
