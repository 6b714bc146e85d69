//! The `LuBackend` abstraction: a sparse real-valued direct solver used by
//! `gat-solver-nr` to factorize and solve the Newton-Raphson Jacobian.
//!
//! A backend is selected once per run (§6 "Plug-in LU solver ABI") and is
//! reused across iterations: [`LuWorkspace::solve`] is called once per
//! Newton step, and the caller decides whether to refactorize (when
//! `NR_admit_change` is set) or re-solve against the last factorization.

use crate::error::LuError;
use sprs::CsMat;

/// A sparse real matrix in compressed-sparse-row form, the wire format the
/// external ABI and the built-in fallback both consume.
pub type CsrMatrix = CsMat<f64>;

/// A factory for [`LuWorkspace`] instances sized for a particular sparsity
/// pattern. Mirrors `LU_init`/`LU_alloc` of the C ABI.
pub trait LuBackend: Send + Sync {
    /// Name reported in logs (the library's basename, or "built-in").
    fn name(&self) -> &str;

    /// Allocate a workspace for a matrix of the given shape and nonzero
    /// count. Mirrors `LU_alloc(handle, rows, cols, nnz)`.
    fn alloc(&self, rows: usize, cols: usize, nnz: usize) -> Result<Box<dyn LuWorkspace>, LuError>;
}

/// A factorization workspace bound to one matrix shape. Reused across
/// Newton-Raphson iterations so repeated solves against the same sparsity
/// pattern don't re-allocate.
pub trait LuWorkspace: Send {
    /// Factorize `a` and solve `a * x = b`, returning `x`. Mirrors
    /// `LU_solve(handle, workspace, A_csr, b, x)`.
    fn solve(&mut self, a: &CsrMatrix, b: &[f64]) -> Result<Vec<f64>, LuError>;
}
