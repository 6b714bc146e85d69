//! Solve-time configuration (§5), in the builder style of
//! `AcPowerFlowSolver` (`power_flow/ac_pf.rs`): a plain `Default` struct
//! plus `with_*` chainable setters rather than a derive-heavy options
//! builder crate.

use gat_core::units::{Hertz, OhmMeters};

/// Which solver to run a topology through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverKind {
    Fbs,
    Gs,
    Nr,
}

/// Top-level configuration for one power-flow solve (§5).
#[derive(Debug, Clone)]
pub struct SolveConfig {
    pub solver: SolverKind,
    /// Convergence tolerance floor; a node's own `maximum_voltage_error`
    /// still wins when tighter (§4.5/§4.6's per-node tolerance).
    pub tolerance: f64,
    pub max_iterations: usize,
    /// Gauss-Seidel's successive-over-relaxation factor (§4.6).
    pub gs_acceleration: f64,
    /// Whether line-matrix builders compute shunt capacitance (§4.3).
    pub use_line_capacitance: bool,
    pub frequency: Hertz,
    pub earth_resistivity: OhmMeters,
    /// Path to an external LU backend shared library (§6's plug-in LU
    /// solver ABI); `None` uses the NR solver's built-in fallback. Ignored
    /// by FBS/GS, which never factor a Jacobian.
    pub lu_library_path: Option<String>,
}

impl Default for SolveConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl SolveConfig {
    pub fn new() -> Self {
        Self {
            solver: SolverKind::Fbs,
            tolerance: 1e-6,
            max_iterations: 100,
            gs_acceleration: 1.6,
            use_line_capacitance: true,
            frequency: Hertz(60.0),
            earth_resistivity: OhmMeters(100.0),
            lu_library_path: None,
        }
    }

    pub fn with_solver(mut self, solver: SolverKind) -> Self {
        self.solver = solver;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_gs_acceleration(mut self, acceleration: f64) -> Self {
        self.gs_acceleration = acceleration;
        self
    }

    pub fn with_line_capacitance(mut self, enabled: bool) -> Self {
        self.use_line_capacitance = enabled;
        self
    }

    pub fn with_frequency(mut self, frequency: Hertz) -> Self {
        self.frequency = frequency;
        self
    }

    pub fn with_earth_resistivity(mut self, earth_resistivity: OhmMeters) -> Self {
        self.earth_resistivity = earth_resistivity;
        self
    }

    pub fn with_lu_library_path(mut self, path: impl Into<String>) -> Self {
        self.lu_library_path = Some(path.into());
        self
    }
}

/// Configuration for running the fault/reliability state machine across a
/// topology (§4.8, §6's reliability dump).
#[derive(Debug, Clone)]
pub struct FaultRunnerConfig {
    /// Seed for the "X"-wildcard phase sampler; fixed so a reliability run
    /// is reproducible (§5).
    pub rng_seed: u64,
    /// Number of Monte-Carlo fault trials to run per feeder section.
    pub trials_per_section: usize,
    pub solve: SolveConfig,
}

impl Default for FaultRunnerConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl FaultRunnerConfig {
    pub fn new() -> Self {
        Self {
            rng_seed: 0,
            trials_per_section: 1,
            solve: SolveConfig::new(),
        }
    }

    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = seed;
        self
    }

    pub fn with_trials_per_section(mut self, trials: usize) -> Self {
        self.trials_per_section = trials;
        self
    }

    pub fn with_solve_config(mut self, solve: SolveConfig) -> Self {
        self.solve = solve;
        self
    }
}
