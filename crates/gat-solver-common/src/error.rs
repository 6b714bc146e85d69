//! Errors raised while loading or driving an LU backend.

use thiserror::Error;

/// Errors from [`crate::backend::LuBackend`] and its implementations.
#[derive(Debug, Error)]
pub enum LuError {
    /// The coefficient matrix was structurally singular (zero pivot).
    #[error("singular matrix: zero pivot at row {row}")]
    Singular { row: usize },

    /// Dimension mismatch between the matrix and the right-hand side.
    #[error("dimension mismatch: matrix is {rows}x{cols}, rhs has {rhs_len} entries")]
    DimensionMismatch {
        rows: usize,
        cols: usize,
        rhs_len: usize,
    },

    /// The external shared library could not be opened.
    #[error("failed to load LU backend library {path}: {source}")]
    LibraryLoad {
        path: String,
        #[source]
        source: libloading::Error,
    },

    /// One of the four required ABI symbols was missing from the library.
    #[error("LU backend library {path} is missing symbol {symbol}")]
    MissingSymbol { path: String, symbol: &'static str },

    /// The external backend's `LU_init` call returned a null handle.
    #[error("LU backend {path} failed to initialize")]
    InitFailed { path: String },

    /// The external backend's `LU_solve` call returned a nonzero status.
    #[error("LU backend {path} reported solve status {status}")]
    ExternalSolveFailed { path: String, status: i32 },
}
