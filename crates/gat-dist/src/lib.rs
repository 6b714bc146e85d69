//! # gat-dist: three-phase unbalanced distribution-feeder power flow
//!
//! The distribution-specific core: line-matrix construction (Carson's
//! equations, Kersting's potential-coefficient capacitance, concentric-
//! neutral/tape-shield Kron reduction), transformer/regulator ABCD models,
//! three solvers (Forward-Back Sweep, Gauss-Seidel, Newton-Raphson), and the
//! fault/reliability state machine that drives them.
//!
//! ## Modules
//!
//! - [`conductor`] - overhead/underground/triplex conductor and line-spacing records
//! - [`linemat`] - Carson/Kersting line-matrix builder producing Z_abc/Y_abc/ABCD
//! - [`transformer`] - WYE-WYE/DELTA-DELTA/DELTA-GROUNDED-WYE/split-phase ABCD models
//! - [`topology`] - the node/branch data model and [`topology::PowerflowGraph`]
//! - [`fbs`] - Forward-Back Sweep for radial topologies
//! - [`gs`] - Gauss-Seidel with acceleration and zero-length-line absorption
//! - [`nr`] - the core-side table construction around `gat_solver_nr`
//! - [`fault`] - the fault taxonomy, induction/clearing, and fault-current computation
//! - [`config`] - solve-time and fault-runner configuration
//! - [`adapters`] - topology and reliability JSON export
//!
//! ## Example
//!
//! ```
//! use gat_dist::topology::{Branch, BranchKind, BranchStatus, BusType, Node, PowerflowGraph};
//! use gat_dist::fbs::{self, FbsConfig};
//! use gat_core::linalg::Matrix3;
//! use gat_core::units::Volts;
//! use gat_core::PhaseSet;
//! use num_complex::Complex64;
//!
//! let mut graph = PowerflowGraph::new();
//! let swing = graph.add_node(Node::new("swing", PhaseSet::ABC, BusType::Swing, Volts(7200.0)));
//! let mut load = Node::new("bus-2", PhaseSet::ABC, BusType::Pq, Volts(7200.0));
//! for p in 0..3 {
//!     load.s[p] = Complex64::new(-50_000.0, -20_000.0);
//! }
//! let load = graph.add_node(load);
//!
//! let mut z = Matrix3::ZERO;
//! for i in 0..3 {
//!     z.set(i, i, Complex64::new(0.3, 1.0));
//! }
//! graph.add_branch(Branch {
//!     id: "line-1".into(),
//!     from: swing,
//!     to: load,
//!     kind: BranchKind::Overhead,
//!     status: BranchStatus::Closed,
//!     phases: PhaseSet::ABC,
//!     orig_phases: PhaseSet::ABC,
//!     fault_phases: PhaseSet::NONE,
//!     a: Matrix3::identity(),
//!     b: z,
//!     c: Matrix3::ZERO,
//!     d: Matrix3::identity(),
//!     y_from: Matrix3::ZERO,
//!     y_to: Matrix3::ZERO,
//!     y_s_from: Matrix3::ZERO,
//!     y_s_to: Matrix3::ZERO,
//!     v_ratio: 1.0,
//!     length_ft: 2000.0,
//!     tn: [Complex64::new(-0.5, 0.0); 2],
//!     protect_locations: [None; 3],
//!     current_from: [Complex64::new(0.0, 0.0); 3],
//!     current_to: [Complex64::new(0.0, 0.0); 3],
//!     mean_repair_time_s: 0.0,
//!     reclose_attempts: 0,
//!     fault_locked: PhaseSet::NONE,
//! }).unwrap();
//!
//! let status = fbs::solve(&mut graph, &FbsConfig::default()).unwrap();
//! assert!(matches!(status, fbs::FbsStatus::Converged { .. }));
//! ```

pub mod adapters;
pub mod conductor;
pub mod config;
pub mod fault;
pub mod fbs;
pub mod gs;
pub mod linemat;
pub mod nr;
pub mod topology;
pub mod transformer;

pub use config::{FaultRunnerConfig, SolveConfig, SolverKind};
pub use topology::PowerflowGraph;
