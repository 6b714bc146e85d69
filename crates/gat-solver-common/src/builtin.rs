//! The built-in direct solver used when no external LU plugin is
//! configured, or when the named library is missing a required symbol
//! (§6: "the core reverts to the built-in superLU path").
//!
//! Feeder-scale Jacobians (a few thousand buses at most, three phases
//! each) are small enough that a densified LU with partial pivoting is a
//! reasonable stand-in for a true sparse factorization; the distinction
//! that matters to callers is the `LuBackend` interface, not the
//! internal algorithm.

use crate::backend::{CsrMatrix, LuBackend, LuWorkspace};
use crate::error::LuError;

#[derive(Debug, Default)]
pub struct BuiltinLuBackend;

impl BuiltinLuBackend {
    pub fn new() -> Self {
        Self
    }
}

impl LuBackend for BuiltinLuBackend {
    fn name(&self) -> &str {
        "built-in"
    }

    fn alloc(&self, rows: usize, cols: usize, nnz: usize) -> Result<Box<dyn LuWorkspace>, LuError> {
        let _ = nnz;
        Ok(Box::new(DenseLuWorkspace { rows, cols }))
    }
}

struct DenseLuWorkspace {
    rows: usize,
    cols: usize,
}

impl LuWorkspace for DenseLuWorkspace {
    fn solve(&mut self, a: &CsrMatrix, b: &[f64]) -> Result<Vec<f64>, LuError> {
        let (rows, cols) = (a.rows(), a.cols());
        if rows != self.rows || cols != self.cols || rows != cols {
            return Err(LuError::DimensionMismatch {
                rows,
                cols,
                rhs_len: b.len(),
            });
        }
        if b.len() != rows {
            return Err(LuError::DimensionMismatch {
                rows,
                cols,
                rhs_len: b.len(),
            });
        }

        let mut dense = vec![vec![0.0f64; cols]; rows];
        for (row_idx, row) in a.outer_iterator().enumerate() {
            for (col, value) in row.iter() {
                dense[row_idx][col] += *value;
            }
        }

        solve_dense_partial_pivot(&mut dense, b)
    }
}

/// Gaussian elimination with partial pivoting over a dense `n x n` system,
/// augmented with the right-hand side. Used by the built-in backend and
/// directly by anything that already has a dense Jacobian in hand.
pub fn solve_dense_partial_pivot(a: &mut [Vec<f64>], b: &[f64]) -> Result<Vec<f64>, LuError> {
    let n = a.len();
    let mut rhs = b.to_vec();

    for k in 0..n {
        let mut pivot_row = k;
        let mut pivot_val = a[k][k].abs();
        for (r, row) in a.iter().enumerate().skip(k + 1) {
            if row[k].abs() > pivot_val {
                pivot_val = row[k].abs();
                pivot_row = r;
            }
        }
        if pivot_val < 1e-14 {
            return Err(LuError::Singular { row: k });
        }
        if pivot_row != k {
            a.swap(k, pivot_row);
            rhs.swap(k, pivot_row);
        }

        for i in (k + 1)..n {
            let factor = a[i][k] / a[k][k];
            if factor == 0.0 {
                continue;
            }
            for j in k..n {
                a[i][j] -= factor * a[k][j];
            }
            rhs[i] -= factor * rhs[k];
        }
    }

    let mut x = vec![0.0f64; n];
    for i in (0..n).rev() {
        let mut sum = rhs[i];
        for j in (i + 1)..n {
            sum -= a[i][j] * x[j];
        }
        x[i] = sum / a[i][i];
    }
    Ok(x)
}
