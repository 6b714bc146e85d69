//! The workspace-wide error type for the distribution power-flow engine.
//!
//! Every public operation in the engine returns [`PowerflowResult`]. The
//! variants mirror the five error kinds and their disposition policy:
//! `ConfigurationError` and `TopologyError` abort initialization and are
//! fatal; `NumericalError` and `HardwareViolation` are warnings the caller
//! may log and continue past (a sanitized value still flows through the
//! solve); `ConvergenceFailure` is retryable at the caller's discretion.
//!
//! # Example
//!
//! ```
//! use gat_core::error::{PowerflowError, PowerflowResult};
//!
//! fn build_line() -> PowerflowResult<()> {
//!     Err(PowerflowError::configuration("line-7", "missing conductor for phase C"))
//! }
//! ```

use thiserror::Error;

/// Unified error type for the power-flow engine.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PowerflowError {
    /// Missing conductor for a declared phase, a phase mismatch between a
    /// node and an incident branch, a non-positive nominal voltage, a
    /// negative mean-repair time. Aborts initialization of the offending
    /// object.
    #[error("configuration error in {object}: {detail}")]
    ConfigurationError { object: String, detail: String },

    /// A Kron reduction produced a zero pivot, an image distance was
    /// zero, or a 7x7 fault LU was singular. The offending quantity is
    /// named along with the remediation applied (zeroed, defaulted,
    /// rounded); the solve continues with the sanitized value.
    #[error("numerical warning in {object} ({quantity}): {remediation}")]
    NumericalError {
        object: String,
        quantity: String,
        remediation: String,
    },

    /// The iteration cap was reached. Soft failure: the caller
    /// re-requests the same timestep until a host-level global
    /// iteration limit is also exceeded.
    #[error("convergence failure after {iterations} iterations (max |delta V| = {max_delta:e})")]
    ConvergenceFailure { iterations: usize, max_delta: f64 },

    /// More than one SWING bus, a "grandchild" configuration in GS, or a
    /// branch whose endpoints are not nodes. Fatal.
    #[error("topology error: {0}")]
    TopologyError(String),

    /// Negative real resistance in Z_abc after construction. Warning
    /// only; the solver proceeds.
    #[error("hardware violation in {object}: {detail}")]
    HardwareViolation { object: String, detail: String },
}

impl PowerflowError {
    /// True for the two error kinds that are recoverable warnings rather
    /// than aborts (§7 propagation policy).
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            PowerflowError::NumericalError { .. } | PowerflowError::HardwareViolation { .. }
        )
    }

    pub fn configuration(object: impl Into<String>, detail: impl Into<String>) -> Self {
        PowerflowError::ConfigurationError {
            object: object.into(),
            detail: detail.into(),
        }
    }

    pub fn numerical(
        object: impl Into<String>,
        quantity: impl Into<String>,
        remediation: impl Into<String>,
    ) -> Self {
        PowerflowError::NumericalError {
            object: object.into(),
            quantity: quantity.into(),
            remediation: remediation.into(),
        }
    }

    pub fn hardware(object: impl Into<String>, detail: impl Into<String>) -> Self {
        PowerflowError::HardwareViolation {
            object: object.into(),
            detail: detail.into(),
        }
    }
}

/// Convenience alias for results using [`PowerflowError`].
pub type PowerflowResult<T> = Result<T, PowerflowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warning_kinds_are_flagged() {
        let numerical = PowerflowError::numerical("line-7", "shunt capacitance", "zeroed");
        let hardware = PowerflowError::hardware("line-7", "negative resistance in z_aa");
        let config = PowerflowError::configuration("bus-3", "non-positive nominal voltage");
        assert!(numerical.is_warning());
        assert!(hardware.is_warning());
        assert!(!config.is_warning());
    }

    #[test]
    fn messages_name_object_and_quantity() {
        let err = PowerflowError::numerical("line-7", "shunt capacitance", "zeroed");
        let msg = err.to_string();
        assert!(msg.contains("line-7"));
        assert!(msg.contains("shunt capacitance"));
        assert!(msg.contains("zeroed"));
    }
}
