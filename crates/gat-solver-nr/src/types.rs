//! Flat input/output tables for the `solve` entry point (§4.7).

use gat_core::units::Volts;
use gat_core::PhaseSet;
use num_complex::Complex64;

/// One row of the flat bus table. `v` is written in place by [`crate::solve`]
/// on success.
#[derive(Debug, Clone)]
pub struct NrBus {
    /// Index into the caller's bus array; also this bus's row in `v`.
    pub index: usize,
    pub phases: PhaseSet,
    /// True for exactly one bus per island: the angle/magnitude reference.
    pub is_swing: bool,
    /// Per-phase line-to-neutral voltage (A, B, C order); unused entries
    /// for absent phases are ignored.
    pub v: [Complex64; 3],
    /// Per-phase specified complex power injection in VA (generation
    /// positive, load negative), accumulated during NR cycle A.
    pub s_spec: [Complex64; 3],
    /// Fixed shunt admittance (capacitors, etc.), added to the bus's
    /// diagonal Y-bus block.
    pub y_shunt: [Complex64; 3],
}

impl NrBus {
    pub fn new(index: usize, phases: PhaseSet, nominal: Volts) -> Self {
        let v0 = Complex64::new(nominal.value(), 0.0);
        Self {
            index,
            phases,
            is_swing: false,
            v: [v0, v0, v0],
            s_spec: [Complex64::new(0.0, 0.0); 3],
            y_shunt: [Complex64::new(0.0, 0.0); 3],
        }
    }

    pub fn swing(index: usize, phases: PhaseSet, v: [Complex64; 3]) -> Self {
        let mut bus = Self::new(index, phases, Volts(v[0].norm().max(1.0)));
        bus.is_swing = true;
        bus.v = v;
        bus
    }
}

/// One row of the flat branch table: the three-phase series admittance
/// between two buses, assembled into the Y-bus by [`crate::ybus::YBus::build`].
#[derive(Debug, Clone)]
pub struct NrBranch {
    pub from: usize,
    pub to: usize,
    pub phases: PhaseSet,
    /// Series admittance (the inverse of the branch's `Z_abc`, or its ABCD
    /// `Y_abc` block for a general two-port).
    pub y_series: gat_core::linalg::Matrix3,
}

/// Disposition of a `solve` call (§4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NrStatus {
    /// Converged in this many iterations; `v` on every [`NrBus`] is final.
    Converged { iterations: usize },
    /// Iteration cap reached without convergence; caller re-requests the
    /// same timestep (soft failure).
    Converging,
    /// The reduced Y-bus was structurally singular.
    Singular,
}

/// Tuning knobs for [`crate::solve`].
#[derive(Debug, Clone)]
pub struct NrConfig {
    pub tolerance: f64,
    pub max_iterations: usize,
    /// Path to a dynamically-loaded LU backend implementing the four
    /// `gat-solver-common` ABI symbols; `None` selects the built-in
    /// dense/sparse fallback.
    pub lu_library_path: Option<String>,
}

impl Default for NrConfig {
    fn default() -> Self {
        Self {
            tolerance: 1e-6,
            max_iterations: 30,
            lu_library_path: None,
        }
    }
}
