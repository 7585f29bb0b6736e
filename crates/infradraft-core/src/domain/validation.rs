//! Functional validation results and policy findings.

use serde::{Deserialize, Serialize};

/// Outcome of a deterministic validator run.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ValidationResult {
    pub passed: bool,
    /// Ordered, human-readable error list; empty when `passed`.
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn pass() -> Self {
        Self {
            passed: true,
            errors: Vec::new(),
        }
    }

    /// Build a result from an error list: no errors means pass.
    pub fn from_errors(errors: Vec<String>) -> Self {
        Self {
            passed: errors.is_empty(),
            errors,
        }
    }
}

/// Policy finding severity. Only `Error` blocks auto-approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn is_blocking(self) -> bool {
        matches!(self, Self::Error)
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// A single rule-engine finding, separate from functional validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyViolation {
    /// Rule identifier, e.g. `docker-unpinned-image`.
    pub rule: String,
    pub message: String,
    pub severity: Severity,
}

impl PolicyViolation {
    pub fn new(rule: impl Into<String>, message: impl Into<String>, severity: Severity) -> Self {
        Self {
            rule: rule.into(),
            message: message.into(),
            severity,
        }
    }
}

/// Whether any finding blocks auto-approval.
pub fn has_blocking(violations: &[PolicyViolation]) -> bool {
    violations.iter().any(|v| v.severity.is_blocking())
}
