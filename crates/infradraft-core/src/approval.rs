//! Human review gate: proposals, responses and accumulated feedback.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::confidence::RecommendedAction;
use crate::domain::{Decision, PolicyViolation, StageKind};
use crate::sanitize::sanitize_feedback;

#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    /// The operator (or a test) cancelled the pending wait.
    #[error("review aborted by operator")]
    Aborted,

    #[error("prompt I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Everything the reviewer sees for one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedProposal {
    pub stage: StageKind,
    pub cycle: u32,
    pub max_cycles: u32,
    pub producer_id: String,
    pub content: String,
    pub reasoning: String,
    pub violations: Vec<PolicyViolation>,
    pub confidence: f64,
    pub action: RecommendedAction,
    /// Errors left over when repair did not converge.
    pub unresolved_errors: Vec<String>,
}

impl fmt::Display for RenderedProposal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "--- {} | review cycle {}/{} ---",
            self.stage.display_name(),
            self.cycle,
            self.max_cycles
        )?;
        writeln!(
            f,
            "confidence {:.1} ({}) | draft from {}",
            self.confidence, self.action, self.producer_id
        )?;
        if !self.reasoning.is_empty() {
            writeln!(f, "\nReasoning:\n{}", self.reasoning)?;
        }
        if !self.violations.is_empty() {
            writeln!(f, "\nPolicy findings:")?;
            for v in &self.violations {
                writeln!(f, "  [{}] {}: {}", v.severity, v.rule, v.message)?;
            }
        }
        if !self.unresolved_errors.is_empty() {
            writeln!(f, "\nUnresolved validation errors:")?;
            for e in &self.unresolved_errors {
                writeln!(f, "  - {e}")?;
            }
        }
        writeln!(f, "\nProposed content:\n{}", self.content)
    }
}

/// A reviewer's answer. `feedback` is raw and sanitized by the gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HumanResponse {
    pub decision: Decision,
    pub feedback: String,
}

impl HumanResponse {
    pub fn approve() -> Self {
        Self {
            decision: Decision::Approve,
            feedback: String::new(),
        }
    }

    pub fn refine(feedback: impl Into<String>) -> Self {
        Self {
            decision: Decision::Refine,
            feedback: feedback.into(),
        }
    }

    pub fn reject() -> Self {
        Self {
            decision: Decision::Reject,
            feedback: String::new(),
        }
    }
}

/// Blocking wait for a human decision. No timeout; cancellation is
/// reported as [`PromptError::Aborted`].
#[async_trait]
pub trait HumanPrompt: Send + Sync {
    async fn ask(&self, proposal: &RenderedProposal) -> Result<HumanResponse, PromptError>;
}

/// Mandatory constraints accumulated from `refine` feedback within a stage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedbackConstraints {
    items: Vec<String>,
}

impl FeedbackConstraints {
    /// Sanitize and keep `raw`. Returns the stored text, or `None` when
    /// nothing survives sanitation.
    pub fn push(&mut self, raw: &str) -> Option<&str> {
        let clean = sanitize_feedback(raw);
        if clean.is_empty() {
            return None;
        }
        self.items.push(clean);
        self.items.last().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Severity;

    fn proposal() -> RenderedProposal {
        RenderedProposal {
            stage: StageKind::Dockerfile,
            cycle: 2,
            max_cycles: 3,
            producer_id: "groq".into(),
            content: "FROM alpine:3.19".into(),
            reasoning: "small base".into(),
            violations: vec![PolicyViolation::new(
                "docker-root-user",
                "No USER instruction found.",
                Severity::Error,
            )],
            confidence: 72.0,
            action: RecommendedAction::RecommendReview,
            unresolved_errors: vec![],
        }
    }

    #[test]
    fn test_render_lists_findings_and_cycle() {
        let text = proposal().to_string();
        assert!(text.contains("review cycle 2/3"));
        assert!(text.contains("[error] docker-root-user"));
        assert!(text.contains("confidence 72.0 (recommend_review)"));
        assert!(text.ends_with("FROM alpine:3.19\n"));
    }

    #[test]
    fn test_constraints_accumulate_sanitized() {
        let mut c = FeedbackConstraints::default();
        assert_eq!(c.push("add a healthcheck; rm -rf"), Some("add a healthcheck rm -rf"));
        assert_eq!(c.push("   "), None);
        c.push("use port 8080");
        assert_eq!(c.as_slice().len(), 2);
    }
}
