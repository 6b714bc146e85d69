//! Collecting and reporting non-fatal solver warnings.
//!
//! Per §7's propagation policy, `NumericalError` and `HardwareViolation`
//! are warnings: the solve sanitizes the offending quantity and keeps
//! going. [`Diagnostics`] accumulates those warnings across a solve so the
//! caller can inspect what was defaulted, zeroed, or rounded after the
//! fact, instead of printing and forgetting them.
//!
//! # Example
//!
//! ```
//! use gat_core::diagnostics::Diagnostics;
//! use gat_core::error::PowerflowError;
//!
//! let mut diag = Diagnostics::new();
//! diag.record(&PowerflowError::numerical("line-7", "shunt capacitance", "zeroed"));
//! assert_eq!(diag.warning_count(), 1);
//! ```

use crate::error::PowerflowError;
use serde::Serialize;

/// Severity level for diagnostic issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Unusual but the operation continued (e.g. a defaulted or zeroed value).
    Warning,
    /// Could not complete element/operation.
    Error,
}

/// A single diagnostic issue encountered during a solve.
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticIssue {
    pub severity: Severity,
    /// Category for grouping (e.g. "kron-reduction", "fault-lu", "hardware").
    pub category: String,
    /// Human-readable description naming the object and quantity.
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
}

impl DiagnosticIssue {
    pub fn new(severity: Severity, category: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity,
            category: category.into(),
            message: message.into(),
            entity: None,
        }
    }

    pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = Some(entity.into());
        self
    }
}

impl std::fmt::Display for DiagnosticIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let severity = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(f, "[{}:{}] {}", severity, self.category, self.message)?;
        if let Some(entity) = &self.entity {
            write!(f, " ({})", entity)?;
        }
        Ok(())
    }
}

/// Collection of diagnostic issues accumulated during a solve.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<DiagnosticIssue>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, issue: DiagnosticIssue) {
        self.issues.push(issue);
    }

    /// Record a [`PowerflowError`] as a diagnostic. Warning-kind errors
    /// (`NumericalError`, `HardwareViolation`) become `Severity::Warning`
    /// issues; any other kind becomes `Severity::Error` (useful for
    /// recording the context around a fatal abort before propagating it).
    pub fn record(&mut self, err: &PowerflowError) {
        let severity = if err.is_warning() {
            Severity::Warning
        } else {
            Severity::Error
        };
        let (category, entity) = match err {
            PowerflowError::NumericalError { object, quantity, .. } => {
                (quantity.clone(), Some(object.clone()))
            }
            PowerflowError::HardwareViolation { object, .. } => {
                ("hardware".to_string(), Some(object.clone()))
            }
            PowerflowError::ConfigurationError { object, .. } => {
                ("configuration".to_string(), Some(object.clone()))
            }
            PowerflowError::TopologyError(_) => ("topology".to_string(), None),
            PowerflowError::ConvergenceFailure { .. } => ("convergence".to_string(), None),
        };
        let mut issue = DiagnosticIssue::new(severity, category, err.to_string());
        if let Some(entity) = entity {
            issue = issue.with_entity(entity);
        }
        self.add(issue);
    }

    pub fn warning_count(&self) -> usize {
        self.issues.iter().filter(|i| i.severity == Severity::Warning).count()
    }

    pub fn error_count(&self) -> usize {
        self.issues.iter().filter(|i| i.severity == Severity::Error).count()
    }

    pub fn has_issues(&self) -> bool {
        !self.issues.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        self.issues.iter().any(|i| i.severity == Severity::Error)
    }

    pub fn has_warnings(&self) -> bool {
        self.issues.iter().any(|i| i.severity == Severity::Warning)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &DiagnosticIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Warning)
    }

    pub fn merge(&mut self, other: Diagnostics) {
        self.issues.extend(other.issues);
    }

    pub fn clear(&mut self) {
        self.issues.clear();
    }

    pub fn summary(&self) -> String {
        let warnings = self.warning_count();
        let errors = self.error_count();
        match (warnings, errors) {
            (0, 0) => "No issues".to_string(),
            (w, 0) => format!("{} warning{}", w, if w == 1 { "" } else { "s" }),
            (0, e) => format!("{} error{}", e, if e == 1 { "" } else { "s" }),
            (w, e) => format!(
                "{} warning{}, {} error{}",
                w,
                if w == 1 { "" } else { "s" },
                e,
                if e == 1 { "" } else { "s" }
            ),
        }
    }
}

impl std::fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Diagnostics: {}", self.summary())?;
        for issue in &self.issues {
            writeln!(f, "  {}", issue)?;
        }
        Ok(())
    }
}
