//! The `solve_nr` entry point (§4.7): iterate the rectangular
//! current-mismatch formulation to convergence and write `V` back onto
//! every [`NrBus`].
//!
//! For each non-swing active phase `k` (a degree of freedom, or "dof"),
//! Kirchhoff's current law gives the mismatch
//!
//! ```text
//! F_k(V) = (Y_nn * V_n + Y_ns * V_s)_k - conj(S_k) / conj(V_k) = 0
//! ```
//!
//! split into real and imaginary parts, Newton-solved in rectangular
//! (Vr, Vi) coordinates so every partial derivative is a closed-form
//! rational function (no trig). The Jacobian is rebuilt every iteration
//! (voltages move); the Y-bus itself is only rebuilt when `admit_change`
//! is set, mirroring `NR_admit_change` (§4.7).

use crate::types::{NrBranch, NrBus, NrConfig, NrStatus};
use crate::ybus::YBus;
use gat_solver_common::{select_backend, LuBackend};
use num_complex::Complex64;
use sprs::TriMat;
use std::sync::Arc;
use tracing::{debug, warn};

/// Cache of the reduced Y-bus, kept across calls so `solve` can skip
/// reassembly when the topology hasn't changed.
pub struct YBusCache {
    ybus: Option<YBus>,
}

impl Default for YBusCache {
    fn default() -> Self {
        Self { ybus: None }
    }
}

impl YBusCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn invalidate(&mut self) {
        self.ybus = None;
    }
}

/// Run Newton-Raphson to convergence (or to the iteration cap) and write
/// the resulting voltages back onto `buses`.
///
/// `admit_change` mirrors the `NR_admit_change` flag: when true (or on
/// the first call), the Y-bus is rebuilt from `branches`; otherwise the
/// cached assembly from `cache` is reused.
pub fn solve(
    buses: &mut [NrBus],
    branches: &[NrBranch],
    config: &NrConfig,
    admit_change: bool,
    cache: &mut YBusCache,
) -> NrStatus {
    if admit_change || cache.ybus.is_none() {
        cache.ybus = Some(YBus::build(buses, branches));
    }
    let ybus = cache.ybus.as_ref().expect("just assembled");
    let backend = select_backend(config.lu_library_path.as_deref().map(std::path::Path::new));
    solve_with_backend(buses, ybus, config, backend.as_ref())
}

fn solve_with_backend(
    buses: &mut [NrBus],
    ybus: &YBus,
    config: &NrConfig,
    backend: &dyn LuBackend,
) -> NrStatus {
    let n = ybus.dofs.ndof;
    if n == 0 {
        return NrStatus::Converged { iterations: 0 };
    }

    // dof -> (bus slot, phase), for reading/writing V and S.
    let mut dof_owner = vec![(0usize, 0usize); n];
    for (slot, bus) in buses.iter().enumerate() {
        if bus.is_swing {
            continue;
        }
        for phase in bus.phases.iter_electrical() {
            if let Some(row) = ybus.dofs.get(bus.index, phase) {
                dof_owner[row] = (slot, phase);
            }
        }
    }

    let mut v: Vec<Complex64> = dof_owner.iter().map(|&(slot, ph)| buses[slot].v[ph]).collect();
    let s: Vec<Complex64> = dof_owner.iter().map(|&(slot, ph)| buses[slot].s_spec[ph]).collect();

    let y_rows: Vec<Vec<(usize, Complex64)>> = ybus
        .y_nn
        .outer_iterator()
        .map(|row| row.iter().map(|(c, v)| (c, *v)).collect())
        .collect();

    for iter in 0..config.max_iterations {
        let mismatch = compute_mismatch(&y_rows, &ybus.swing_injection, &s, &v);
        let max_mismatch = mismatch.iter().fold(0.0f64, |m, x| m.max(x.abs()));
        if max_mismatch < config.tolerance {
            for (row, &(slot, ph)) in dof_owner.iter().enumerate() {
                buses[slot].v[ph] = v[row];
            }
            debug!(iterations = iter, "NR converged");
            return NrStatus::Converged { iterations: iter };
        }

        let jacobian = build_jacobian(&y_rows, &s, &v);
        let rhs: Vec<f64> = (0..2 * n)
            .map(|i| {
                if i % 2 == 0 {
                    -mismatch[i / 2].re
                } else {
                    -mismatch[i / 2].im
                }
            })
            .collect();

        let mut workspace = match backend.alloc(2 * n, 2 * n, jacobian.nnz()) {
            Ok(ws) => ws,
            Err(err) => {
                warn!(%err, "failed to allocate LU workspace");
                return NrStatus::Singular;
            }
        };
        let delta = match workspace.solve(&jacobian, &rhs) {
            Ok(x) => x,
            Err(_) => return NrStatus::Singular,
        };

        for (row, value) in v.iter_mut().enumerate() {
            *value += Complex64::new(delta[2 * row], delta[2 * row + 1]);
        }
    }

    NrStatus::Converging
}

fn compute_mismatch(
    y_rows: &[Vec<(usize, Complex64)>],
    swing_injection: &[Complex64],
    s: &[Complex64],
    v: &[Complex64],
) -> Vec<Complex64> {
    let n = v.len();
    let mut f = swing_injection.to_vec();
    for (row, entries) in y_rows.iter().enumerate() {
        for &(col, y) in entries {
            f[row] += y * v[col];
        }
    }
    for k in 0..n {
        f[k] -= s[k].conj() / v[k].conj();
    }
    f
}

/// Build the `2n x 2n` real Jacobian of the rectangular mismatch system.
fn build_jacobian(
    y_rows: &[Vec<(usize, Complex64)>],
    s: &[Complex64],
    v: &[Complex64],
) -> sprs::CsMat<f64> {
    let n = v.len();
    let mut tri = TriMat::new((2 * n, 2 * n));

    for (row, entries) in y_rows.iter().enumerate() {
        for &(col, y) in entries {
            // dRe(F_row)/dVr_col = Re(y); dRe(F_row)/dVi_col = -Im(y)
            // dIm(F_row)/dVr_col = Im(y); dIm(F_row)/dVi_col = Re(y)
            tri.add_triplet(2 * row, 2 * col, y.re);
            tri.add_triplet(2 * row, 2 * col + 1, -y.im);
            tri.add_triplet(2 * row + 1, 2 * col, y.im);
            tri.add_triplet(2 * row + 1, 2 * col + 1, y.re);
        }
    }

    for k in 0..n {
        let (p, q) = (s[k].re, s[k].im);
        let (a, b) = (v[k].re, v[k].im);
        let d = a * a + b * b;
        if d < 1e-18 {
            continue;
        }
        let n_r = p * a + q * b;
        let n_i = p * b - q * a;

        let d_re_da = -(p * d - 2.0 * a * n_r) / (d * d);
        let d_re_db = -(q * d - 2.0 * b * n_r) / (d * d);
        let d_im_da = (q * d + 2.0 * a * n_i) / (d * d);
        let d_im_db = -(p * d - 2.0 * b * n_i) / (d * d);

        tri.add_triplet(2 * k, 2 * k, d_re_da);
        tri.add_triplet(2 * k, 2 * k + 1, d_re_db);
        tri.add_triplet(2 * k + 1, 2 * k, d_im_da);
        tri.add_triplet(2 * k + 1, 2 * k + 1, d_im_db);
    }

    tri.to_csr()
}
