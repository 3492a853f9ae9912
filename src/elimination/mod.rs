//! Variable elimination for Gaussian factor graphs
//!
//! Elimination removes variables one at a time from a linear system. Each step
//! gathers the factors involving the frontal variable, stacks their whitened
//! rows, reduces the stack to square-root form `[R | y]` with the selected
//! factorization strategy, and splits the rows into a conditional over the
//! frontal variable and a marginal factor over the separator.

pub mod bayes_tree;

pub use bayes_tree::BayesTree;

use nalgebra::{DMatrix, DVector};

use crate::core::{Key, KeyFormatter};
use crate::error::{MarginalsError, MarginalsResult};
use crate::linalg::{cholesky_semidefinite, forward_substitute_transposed};
use crate::linear::JacobianFactor;

/// Numerical strategy used for every elimination step.
///
/// Selected once at engine construction and threaded through every call:
/// `Cholesky` is faster but assumes a positive (semi)definite system, `Qr` is
/// slower but robust to rank-deficient or poorly scaled problems.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Factorization {
    Cholesky,
    Qr,
}

/// The conditional density `P(frontal | separator)` produced by one
/// elimination step, stored as upper-triangular rows `[R | S | d]`.
#[derive(Debug, Clone)]
pub struct GaussianConditional {
    frontal: Key,
    frontal_dim: usize,
    factor: JacobianFactor,
}

impl GaussianConditional {
    pub fn frontal(&self) -> Key {
        self.frontal
    }

    pub fn frontal_dim(&self) -> usize {
        self.frontal_dim
    }

    /// Separator keys, i.e. every key but the frontal one.
    pub fn separator(&self) -> &[Key] {
        &self.factor.keys()[1..]
    }

    /// The conditional viewed as a plain linear factor over all its keys.
    pub fn as_factor(&self) -> &JacobianFactor {
        &self.factor
    }

    pub fn print(&self, prefix: &str, formatter: KeyFormatter) {
        let separator: Vec<String> = self.separator().iter().map(|&k| formatter(k)).collect();
        println!(
            "{prefix}GaussianConditional P({} | {})",
            formatter(self.frontal),
            separator.join(", ")
        );
    }
}

/// Eliminate `ordering` from `factors` one variable at a time.
///
/// Returns the conditionals in elimination order together with the factors
/// left over once every ordering variable is gone (the marginal system on the
/// remaining variables).
pub fn eliminate_sequential(
    factors: Vec<JacobianFactor>,
    ordering: &[Key],
    strategy: Factorization,
) -> MarginalsResult<(Vec<GaussianConditional>, Vec<JacobianFactor>)> {
    let mut work = factors;
    let mut conditionals = Vec::with_capacity(ordering.len());

    for &frontal in ordering {
        let (involved, rest): (Vec<_>, Vec<_>) =
            work.into_iter().partition(|f| f.involves(frontal));
        if involved.is_empty() {
            return Err(MarginalsError::InvalidInput(format!(
                "variable key {frontal} has no factors left to eliminate"
            )));
        }

        let (conditional, marginal) = eliminate_one(&involved, frontal, strategy)?;
        conditionals.push(conditional);

        work = rest;
        if let Some(marginal) = marginal {
            work.push(marginal);
        }
    }

    Ok((conditionals, work))
}

/// Eliminate a single frontal variable from the factors that involve it.
fn eliminate_one(
    involved: &[JacobianFactor],
    frontal: Key,
    strategy: Factorization,
) -> MarginalsResult<(GaussianConditional, Option<JacobianFactor>)> {
    // Column layout: frontal blocks first, then separator keys in first-seen
    // order, then the RHS column.
    let mut keys = vec![frontal];
    let mut dims = vec![frontal_dim(involved, frontal)?];
    for factor in involved {
        for &key in factor.keys() {
            if key == frontal || keys.contains(&key) {
                continue;
            }
            keys.push(key);
            dims.push(factor.dim_of(key).unwrap_or(0));
        }
    }
    for factor in involved {
        for (i, &key) in keys.iter().enumerate() {
            if let Some(dim) = factor.dim_of(key) {
                if dim != dims[i] {
                    return Err(MarginalsError::InvalidInput(format!(
                        "variable key {key} has inconsistent dimensions across factors \
                         ({} vs {dim})",
                        dims[i]
                    )));
                }
            }
        }
    }

    let mut offsets = Vec::with_capacity(keys.len());
    let mut total = 0;
    for &dim in &dims {
        offsets.push(total);
        total += dim;
    }
    let n = total;
    let d = dims[0];
    let m: usize = involved.iter().map(JacobianFactor::rows).sum();

    // Stack the whitened augmented rows of all involved factors.
    let mut stacked = DMatrix::zeros(m, n + 1);
    let mut row = 0;
    for factor in involved {
        let augmented = factor.whitened_augmented_matrix();
        let rows = factor.rows();
        let mut col = 0;
        for &key in factor.keys() {
            let width = factor.dim_of(key).unwrap_or(0);
            let position = keys.iter().position(|&k| k == key).unwrap_or(0);
            stacked
                .view_mut((row, offsets[position]), (rows, width))
                .copy_from(&augmented.view((0, col), (rows, width)));
            col += width;
        }
        stacked
            .view_mut((row, n), (rows, 1))
            .copy_from(&augmented.view((0, col), (rows, 1)));
        row += rows;
    }

    let (r, y) = reduce_to_square_root(&stacked, n, strategy)?;

    // Conditional P(frontal | separator): the first `d` rows.
    let conditional_blocks = split_blocks(&r, &y, &offsets, &dims, 0, d, 0);
    let conditional_factor = JacobianFactor::from_blocks(keys.clone(), conditional_blocks, None)?;
    let conditional = GaussianConditional {
        frontal,
        frontal_dim: d,
        factor: conditional_factor,
    };

    // Marginal factor on the separator: the remaining rows, frontal columns
    // dropped (they are zero below the triangle).
    let marginal = if n > d {
        let blocks = split_blocks(&r, &y, &offsets, &dims, 1, n - d, d);
        Some(JacobianFactor::from_blocks(keys[1..].to_vec(), blocks, None)?)
    } else {
        None
    };

    Ok((conditional, marginal))
}

/// Reduce stacked whitened rows `[A | b]` to square-root form: an upper
/// triangular `R` (n x n) and RHS vector `y` with `RᵀR = AᵀA`, `Rᵀy = Aᵀb`.
fn reduce_to_square_root(
    stacked: &DMatrix<f64>,
    n: usize,
    strategy: Factorization,
) -> MarginalsResult<(DMatrix<f64>, DVector<f64>)> {
    match strategy {
        Factorization::Qr => {
            let reduced = stacked.clone().qr().r();
            let mut r = DMatrix::zeros(n, n);
            let mut y = DVector::zeros(n);
            let rows = reduced.nrows().min(n);
            for i in 0..rows {
                y[i] = reduced[(i, n)];
                for j in i..n {
                    r[(i, j)] = reduced[(i, j)];
                }
            }
            Ok((r, y))
        }
        Factorization::Cholesky => {
            let a = stacked.columns(0, n);
            let b = stacked.column(n);
            let hessian = a.transpose() * a;
            let eta = a.transpose() * b;
            let r = cholesky_semidefinite(&hessian)?;
            let y = forward_substitute_transposed(&r, &eta);
            Ok((r, y))
        }
    }
}

/// Slice `rows_len` rows of `[R | y]` starting at row `row_start` into
/// per-variable blocks for keys `key_start..`, plus the trailing RHS block.
fn split_blocks(
    r: &DMatrix<f64>,
    y: &DVector<f64>,
    offsets: &[usize],
    dims: &[usize],
    key_start: usize,
    rows_len: usize,
    row_start: usize,
) -> Vec<DMatrix<f64>> {
    let mut blocks = Vec::with_capacity(dims.len() - key_start + 1);
    for i in key_start..dims.len() {
        blocks.push(r.view((row_start, offsets[i]), (rows_len, dims[i])).into_owned());
    }
    let mut rhs = DMatrix::zeros(rows_len, 1);
    for i in 0..rows_len {
        rhs[(i, 0)] = y[row_start + i];
    }
    blocks.push(rhs);
    blocks
}

fn frontal_dim(involved: &[JacobianFactor], frontal: Key) -> MarginalsResult<usize> {
    involved
        .iter()
        .find_map(|f| f.dim_of(frontal))
        .ok_or(MarginalsError::KeyNotFound(frontal))
}
