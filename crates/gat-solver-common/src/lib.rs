//! Pluggable LU backend for the distribution power-flow engine.
//!
//! Newton-Raphson (`gat-solver-nr`) needs to factorize and solve a sparse
//! real-valued Jacobian once per iteration. §6 of the external-interfaces
//! contract lets the host swap in an external LU implementation — a
//! shared library exposing four C symbols — without the rest of the
//! engine knowing the difference. This crate owns:
//!
//! - [`backend::LuBackend`] / [`backend::LuWorkspace`] — the Rust-side
//!   trait both the built-in and external implementations satisfy.
//! - [`builtin`] — a dense, partial-pivoted fallback always available.
//! - [`abi`] — the `dlopen`-based loader for an external `LU_init` /
//!   `LU_alloc` / `LU_solve` / `LU_destroy` library.
//!
//! [`select_backend`] is the entry point: given an optional library path,
//! it tries to load it and falls back to the built-in solver on any
//! failure, logging why.

pub mod abi;
pub mod backend;
pub mod builtin;
pub mod error;

pub use backend::{CsrMatrix, LuBackend, LuWorkspace};
pub use error::LuError;

use std::path::Path;
use std::sync::Arc;
use tracing::warn;

/// Load the LU backend named by `library_path`, falling back to the
/// built-in solver if no path is given or loading fails (§6).
pub fn select_backend(library_path: Option<&Path>) -> Arc<dyn LuBackend> {
    if let Some(path) = library_path {
        match abi::ExternalLuBackend::load(path) {
            Ok(backend) => return Arc::new(backend),
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "external LU backend unavailable, reverting to built-in solver"
                );
            }
        }
    }
    Arc::new(builtin::BuiltinLuBackend::new())
}
