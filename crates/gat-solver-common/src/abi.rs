//! The external plug-in ABI (§6): four C-callable symbols a shared
//! library can expose to replace the built-in LU backend.
//!
//! ```c
//! void *LU_init(const void *callbacks);
//! void *LU_alloc(void *handle, int rows, int cols, int nnz);
//! int   LU_solve(void *handle, void *workspace, const CsrView *a,
//!                const double *b, double *x);
//! void  LU_destroy(void *handle);
//! ```
//!
//! `LU_init` is called once per process with a null callbacks pointer (no
//! host callback is defined by this ABI today — the parameter exists so a
//! future allocator/logging hook can be added without breaking the
//! symbol signature). If the library is missing, or any of the four
//! symbols is absent, [`ExternalLuBackend::load`] returns an error and
//! the caller is expected to fall back to [`crate::builtin::BuiltinLuBackend`].

use crate::backend::{CsrMatrix, LuBackend, LuWorkspace};
use crate::error::LuError;
use libloading::{Library, Symbol};
use std::ffi::c_void;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// C layout of a sparse matrix view, handed to `LU_solve` by reference.
#[repr(C)]
struct CsrView {
    rows: i32,
    cols: i32,
    nnz: i32,
    row_ptr: *const i32,
    col_ind: *const i32,
    values: *const f64,
}

type LuInitFn = unsafe extern "C" fn(*const c_void) -> *mut c_void;
type LuAllocFn = unsafe extern "C" fn(*mut c_void, i32, i32, i32) -> *mut c_void;
type LuSolveFn =
    unsafe extern "C" fn(*mut c_void, *mut c_void, *const CsrView, *const f64, *mut f64) -> i32;
type LuDestroyFn = unsafe extern "C" fn(*mut c_void);

const REQUIRED_SYMBOLS: [&str; 4] = ["LU_init", "LU_alloc", "LU_solve", "LU_destroy"];

struct ExternalHandle {
    library: Library,
    handle: *mut c_void,
}

// The library and handle are only ever touched through the ABI's own
// functions, which the vendor contract requires to be safe to call from
// any thread holding the handle.
unsafe impl Send for ExternalHandle {}
unsafe impl Sync for ExternalHandle {}

impl Drop for ExternalHandle {
    fn drop(&mut self) {
        unsafe {
            if let Ok(destroy) = self.library.get::<LuDestroyFn>(b"LU_destroy\0") {
                destroy(self.handle);
            }
        }
    }
}

/// An LU backend backed by a `dlopen`ed shared library implementing the
/// four-symbol ABI above.
pub struct ExternalLuBackend {
    path: String,
    inner: Arc<ExternalHandle>,
}

impl ExternalLuBackend {
    /// Load `path` and verify all four ABI symbols are present, per §6:
    /// "when the named library is absent or any symbol is missing, the
    /// core reverts to the built-in superLU path."
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LuError> {
        let path_str = path.as_ref().display().to_string();
        let library = unsafe { Library::new(path.as_ref()) }.map_err(|source| LuError::LibraryLoad {
            path: path_str.clone(),
            source,
        })?;

        for symbol in REQUIRED_SYMBOLS {
            let name = format!("{symbol}\0");
            let found: Result<Symbol<'_, *mut c_void>, _> =
                unsafe { library.get(name.as_bytes()) };
            if found.is_err() {
                return Err(LuError::MissingSymbol {
                    path: path_str,
                    symbol,
                });
            }
        }

        let init: Symbol<'_, LuInitFn> = unsafe { library.get(b"LU_init\0") }.expect("checked above");
        let handle = unsafe { init(std::ptr::null()) };
        if handle.is_null() {
            return Err(LuError::InitFailed { path: path_str });
        }

        debug!(backend = %path_str, "loaded external LU backend");
        Ok(Self {
            path: path_str,
            inner: Arc::new(ExternalHandle { library, handle }),
        })
    }
}

impl LuBackend for ExternalLuBackend {
    fn name(&self) -> &str {
        &self.path
    }

    fn alloc(&self, rows: usize, cols: usize, nnz: usize) -> Result<Box<dyn LuWorkspace>, LuError> {
        let alloc: Symbol<'_, LuAllocFn> = unsafe { self.inner.library.get(b"LU_alloc\0") }
            .map_err(|_| LuError::MissingSymbol {
                path: self.path.clone(),
                symbol: "LU_alloc",
            })?;
        let workspace = unsafe {
            alloc(
                self.inner.handle,
                rows as i32,
                cols as i32,
                nnz as i32,
            )
        };
        if workspace.is_null() {
            warn!(backend = %self.path, "LU_alloc returned null, reverting is the caller's responsibility");
        }
        Ok(Box::new(ExternalWorkspace {
            inner: self.inner.clone(),
            path: self.path.clone(),
            workspace,
            rows,
            cols,
        }))
    }
}

struct ExternalWorkspace {
    inner: Arc<ExternalHandle>,
    path: String,
    workspace: *mut c_void,
    rows: usize,
    cols: usize,
}

unsafe impl Send for ExternalWorkspace {}

impl LuWorkspace for ExternalWorkspace {
    fn solve(&mut self, a: &CsrMatrix, b: &[f64]) -> Result<Vec<f64>, LuError> {
        if a.rows() != self.rows || a.cols() != self.cols || b.len() != self.rows {
            return Err(LuError::DimensionMismatch {
                rows: a.rows(),
                cols: a.cols(),
                rhs_len: b.len(),
            });
        }
        let solve: Symbol<'_, LuSolveFn> = unsafe { self.inner.library.get(b"LU_solve\0") }
            .map_err(|_| LuError::MissingSymbol {
                path: self.path.clone(),
                symbol: "LU_solve",
            })?;

        let mut row_ptr: Vec<i32> = Vec::with_capacity(self.rows + 1);
        let mut col_ind: Vec<i32> = Vec::new();
        let mut data: Vec<f64> = Vec::new();
        row_ptr.push(0);
        for row in a.outer_iterator() {
            for (col, value) in row.iter() {
                col_ind.push(col as i32);
                data.push(*value);
            }
            row_ptr.push(col_ind.len() as i32);
        }
        let view = CsrView {
            rows: self.rows as i32,
            cols: self.cols as i32,
            nnz: data.len() as i32,
            row_ptr: row_ptr.as_ptr(),
            col_ind: col_ind.as_ptr(),
            values: data.as_ptr(),
        };
        let mut x = vec![0.0f64; self.rows];
        let status = unsafe {
            solve(
                self.inner.handle,
                self.workspace,
                &view as *const CsrView,
                b.as_ptr(),
                x.as_mut_ptr(),
            )
        };
        if status != 0 {
            return Err(LuError::ExternalSolveFailed {
                path: self.path.clone(),
                status,
            });
        }
        Ok(x)
    }
}
