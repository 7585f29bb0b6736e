//! Bounded validate → fix → revalidate loop.
//!
//! This module provides:
//! - the synchronous [`Validator`] and [`Fixer`] capabilities
//! - [`repair_until_valid`], which never makes more than `max_retries`
//!   validator calls
//! - the tool-free [`StructuralValidator`] and [`FenceStrippingFixer`]

use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::artifacts::{has_file_blocks, split_artifact_files};
use crate::domain::{StageKind, ValidationResult};
use crate::generation::strip_code_fence;

/// Deterministic pass/fail check. Must be a pure function of `content`.
pub trait Validator: Send + Sync {
    fn validate(&self, content: &str) -> ValidationResult;
}

/// Produces a new content version from the current one and its errors.
pub trait Fixer: Send + Sync {
    fn fix(&self, content: &str, errors: &[String]) -> Result<String, FixError>;
}

/// Builds the validator for one stage.
pub type ValidatorFactory = Arc<dyn Fn(StageKind) -> Arc<dyn Validator> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FixError {
    #[error("no mechanical fix applies: {0}")]
    NoMechanicalFix(String),

    #[error("fixer failed: {0}")]
    Failed(String),
}

/// Bounded repair policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairPolicy {
    /// Maximum validator calls per loop.
    pub max_retries: u32,
}

impl Default for RepairPolicy {
    fn default() -> Self {
        Self { max_retries: 3 }
    }
}

/// How a repair loop ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum RepairOutcome {
    /// The content validated, possibly after fixes.
    Valid,
    /// Retries ran out; the content is the last fixer output and unverified.
    Exhausted,
    /// The fixer raised; the content is the last version before the failure.
    FixerFailed { reason: String },
}

/// Full record of one repair loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairReport {
    pub content: String,
    pub outcome: RepairOutcome,
    pub fixes_applied: u32,
    pub validator_calls: u32,
    /// Errors from the most recent failed validation.
    pub last_errors: Vec<String>,
}

impl RepairReport {
    pub fn is_valid(&self) -> bool {
        self.outcome == RepairOutcome::Valid
    }

    /// Whether callers must surface non-convergence.
    pub fn unresolved(&self) -> bool {
        !self.is_valid()
    }
}

/// Run the bounded repair loop.
///
/// Each iteration validates the current content and, on failure, asks the
/// fixer for a new version. The output of the final fix is returned without
/// another validation, so the validator is called at most `max_retries`
/// times. A fixer error ends the loop early with the content unchanged.
pub fn repair_until_valid(
    content: &str,
    validator: &dyn Validator,
    fixer: &dyn Fixer,
    policy: RepairPolicy,
) -> RepairReport {
    let mut current = content.to_string();
    let mut fixes_applied = 0u32;
    let mut validator_calls = 0u32;
    let mut last_errors = Vec::new();

    for attempt in 1..=policy.max_retries {
        validator_calls += 1;
        let result = validator.validate(&current);
        if result.passed {
            debug!(attempt, fixes_applied, "content validated");
            return RepairReport {
                content: current,
                outcome: RepairOutcome::Valid,
                fixes_applied,
                validator_calls,
                last_errors: Vec::new(),
            };
        }

        last_errors = result.errors;
        match fixer.fix(&current, &last_errors) {
            Ok(next) => {
                fixes_applied += 1;
                current = next;
            }
            Err(err) => {
                warn!(attempt, error = %err, "fixer failed; keeping last content");
                return RepairReport {
                    content: current,
                    outcome: RepairOutcome::FixerFailed {
                        reason: err.to_string(),
                    },
                    fixes_applied,
                    validator_calls,
                    last_errors,
                };
            }
        }
    }

    warn!(
        max_retries = policy.max_retries,
        fixes_applied, "repair retries exhausted"
    );
    RepairReport {
        content: current,
        outcome: RepairOutcome::Exhausted,
        fixes_applied,
        validator_calls,
        last_errors,
    }
}

// ---------------------------------------------------------------------------
// Built-in validator
// ---------------------------------------------------------------------------

/// Tool-free structural checks per stage.
#[derive(Debug, Clone, Copy)]
pub struct StructuralValidator {
    stage: StageKind,
}

impl StructuralValidator {
    pub fn new(stage: StageKind) -> Self {
        Self { stage }
    }

    pub fn factory() -> ValidatorFactory {
        Arc::new(|stage| Arc::new(StructuralValidator::new(stage)) as Arc<dyn Validator>)
    }
}

fn has_line_starting(content: &str, prefix: &str) -> bool {
    content.lines().any(|l| l.trim_start().starts_with(prefix))
}

impl StructuralValidator {
    fn structural_errors(&self, content: &str) -> Vec<String> {
        let mut errors = Vec::new();
        if content.contains("```") {
            errors.push("leftover markdown code fence".to_string());
        }
        match self.stage {
            StageKind::Dockerfile => {
                let has_from = content
                    .lines()
                    .any(|l| l.trim_start().to_ascii_uppercase().starts_with("FROM "));
                if !has_from {
                    errors.push("Dockerfile has no FROM instruction".to_string());
                }
            }
            StageKind::Kubernetes | StageKind::Observability => {
                if !has_line_starting(content, "apiVersion:") {
                    errors.push("manifest has no apiVersion".to_string());
                }
                if self.stage == StageKind::Kubernetes && !has_line_starting(content, "kind:") {
                    errors.push("manifest has no kind".to_string());
                }
            }
            StageKind::Cicd => {
                if !has_line_starting(content, "jobs:") {
                    errors.push("workflow has no jobs".to_string());
                }
            }
            StageKind::Compose => {
                if !has_line_starting(content, "services:") {
                    errors.push("compose file has no services".to_string());
                }
            }
        }
        errors
    }
}

impl Validator for StructuralValidator {
    fn validate(&self, content: &str) -> ValidationResult {
        if content.trim().is_empty() {
            return ValidationResult::from_errors(vec!["content is empty".to_string()]);
        }
        // Multi-file drafts are checked on their file bodies; the fences
        // around each body are part of the format.
        if has_file_blocks(content) {
            return match split_artifact_files(content, self.stage.default_path()) {
                Ok(files) => {
                    let bodies: Vec<&str> = files.values().map(String::as_str).collect();
                    ValidationResult::from_errors(self.structural_errors(&bodies.join("\n")))
                }
                Err(err) => ValidationResult::from_errors(vec![err.to_string()]),
            };
        }
        ValidationResult::from_errors(self.structural_errors(content))
    }
}

// ---------------------------------------------------------------------------
// Built-in fixer
// ---------------------------------------------------------------------------

/// Repairs mechanical damage: code fences and chatty prose before the first
/// directive line.
#[derive(Debug, Clone, Copy, Default)]
pub struct FenceStrippingFixer;

fn is_directive(line: &str) -> bool {
    static YAML_KEY: OnceLock<Regex> = OnceLock::new();
    let yaml_key =
        YAML_KEY.get_or_init(|| Regex::new(r"^[A-Za-z_][\w.-]*:").expect("key pattern is valid"));
    let trimmed = line.trim_start();
    let upper = trimmed.to_ascii_uppercase();
    upper.starts_with("FROM ")
        || upper.starts_with("ARG ")
        || trimmed.starts_with('#')
        || trimmed.starts_with("---")
        || trimmed.starts_with("FILENAME:")
        || yaml_key.is_match(trimmed)
}

impl Fixer for FenceStrippingFixer {
    fn fix(&self, content: &str, errors: &[String]) -> Result<String, FixError> {
        let unfenced = if has_file_blocks(content) {
            content.to_string()
        } else {
            strip_code_fence(content)
        };
        let fixed = match unfenced.lines().position(is_directive) {
            Some(start) => unfenced.lines().skip(start).collect::<Vec<_>>().join("\n"),
            None => unfenced,
        };
        if fixed.trim().is_empty() || fixed.trim() == content.trim() {
            return Err(FixError::NoMechanicalFix(errors.join("; ")));
        }
        Ok(fixed)
    }
}
