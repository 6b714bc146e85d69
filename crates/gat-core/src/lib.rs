//! # gat-core: shared primitives for the distribution power-flow engine
//!
//! Complex/matrix primitives, unit-safe newtypes, the phase bitset, and the
//! error/diagnostic types shared by every other crate in the workspace
//! (`gat-solver-common`, `gat-solver-nr`, `gat-dist`). Nothing in this crate
//! is specific to any one solver — it's the vocabulary the rest of the
//! workspace is written in.
//!
//! ## Modules
//!
//! - [`error`] - the workspace-wide [`error::PowerflowError`] enum
//! - [`diagnostics`] - non-fatal warning accumulation during a solve
//! - [`units`] - compile-time unit safety (feet, ohms/mile, hertz, ...)
//! - [`phase`] - the A/B/C/N/D/S phase bit set
//! - [`linalg`] - 3x3 and 7x7 complex/real linear algebra

pub mod diagnostics;
pub mod error;
pub mod linalg;
pub mod phase;
pub mod units;

pub use diagnostics::{DiagnosticIssue, Diagnostics, Severity};
pub use error::{PowerflowError, PowerflowResult};
pub use phase::{PhaseSet, PhaseSetError};
pub use units::{Degrees, Feet, Hertz, OhmMeters, OhmsPerMile, PerUnit, Radians, Volts};
