//! Semidefinite-tolerant Cholesky factorization
//!
//! Elimination of a variable whose involved factors carry no information about
//! part of the separator produces a positive *semi*definite normal-equation
//! matrix. A textbook Cholesky fails there, so this routine zeroes pivots
//! within tolerance of zero and only rejects genuinely negative ones.

use nalgebra::{DMatrix, DVector};

use crate::error::{MarginalsError, MarginalsResult};

/// Pivots above this (relative) threshold are factored normally.
const POSITIVE_PIVOT_TOL: f64 = 1e-12;

/// Pivots below minus this (relative) threshold mean the matrix is indefinite.
const NEGATIVE_PIVOT_TOL: f64 = 1e-9;

/// Upper-triangular Cholesky factor `R` with `Rᵀ R = matrix`.
///
/// `matrix` must be square and symmetric positive semidefinite; only its upper
/// triangle is read. Semidefinite directions produce all-zero rows in `R`. A
/// pivot below `-tol` fails with [`MarginalsError::NotPositiveDefinite`].
pub fn cholesky_semidefinite(matrix: &DMatrix<f64>) -> MarginalsResult<DMatrix<f64>> {
    let n = matrix.nrows();
    if matrix.ncols() != n {
        return Err(MarginalsError::InvalidInput(format!(
            "Cholesky factorization requires a square matrix, got {}x{}",
            matrix.nrows(),
            matrix.ncols()
        )));
    }

    // Relative pivot tolerances, guarded against all-zero matrices.
    let scale = matrix.diagonal().amax().max(1.0);

    let mut r = DMatrix::zeros(n, n);
    for j in 0..n {
        let mut pivot = matrix[(j, j)];
        for k in 0..j {
            pivot -= r[(k, j)] * r[(k, j)];
        }

        if pivot > POSITIVE_PIVOT_TOL * scale {
            let rjj = pivot.sqrt();
            r[(j, j)] = rjj;
            for i in (j + 1)..n {
                let mut v = matrix[(j, i)];
                for k in 0..j {
                    v -= r[(k, j)] * r[(k, i)];
                }
                r[(j, i)] = v / rjj;
            }
        } else if pivot < -NEGATIVE_PIVOT_TOL * scale {
            return Err(MarginalsError::NotPositiveDefinite);
        }
        // Pivot within tolerance of zero: semidefinite direction, row stays zero.
    }
    Ok(r)
}

/// Solve `Rᵀ y = rhs` for upper-triangular `R`.
///
/// Zero pivots correspond to zero-information rows; the matching solution
/// entries are set to zero.
pub fn forward_substitute_transposed(r: &DMatrix<f64>, rhs: &DVector<f64>) -> DVector<f64> {
    let n = r.nrows();
    debug_assert_eq!(rhs.len(), n);

    let mut y = DVector::zeros(n);
    for i in 0..n {
        if r[(i, i)] == 0.0 {
            continue;
        }
        let mut v = rhs[i];
        for k in 0..i {
            v -= r[(k, i)] * y[k];
        }
        y[i] = v / r[(i, i)];
    }
    y
}
