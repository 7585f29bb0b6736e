//! Confidence scoring and action routing.
//!
//! Confidence is distinct from the selection score: it adds generator
//! agreement and a repair penalty, and it decides whether the human gate may
//! be skipped.

use serde::{Deserialize, Serialize};

use crate::domain::{has_blocking, CandidateMetrics, PolicyViolation};
use crate::repair::RepairReport;

pub const SECURITY_WEIGHT: f64 = 0.4;
pub const BEST_PRACTICE_WEIGHT: f64 = 0.3;
pub const AGREEMENT_WEIGHT: f64 = 20.0;
pub const REPAIR_PENALTY: f64 = 10.0;

/// Action recommended for a confidence level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendedAction {
    /// Below 40.
    ManualIntervention,
    /// 40 to below 70.
    RecommendDraft,
    /// 70 to below 90.
    RecommendReview,
    /// 90 and above; the only tier that may skip the human gate.
    RecommendAutoApprove,
}

impl RecommendedAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ManualIntervention => "manual_intervention",
            Self::RecommendDraft => "recommend_draft",
            Self::RecommendReview => "recommend_review",
            Self::RecommendAutoApprove => "recommend_auto_approve",
        }
    }

    pub fn requires_human_gate(self) -> bool {
        !matches!(self, Self::RecommendAutoApprove)
    }
}

impl std::fmt::Display for RecommendedAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Routed decision for one evaluated candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionResult {
    pub confidence_score: f64,
    pub action: RecommendedAction,
    pub reason: String,
    pub requires_human_gate: bool,
}

impl DecisionResult {
    /// Force the human gate. An auto-approve recommendation drops to review.
    pub fn require_human_gate(mut self, reason: impl Into<String>) -> Self {
        if !self.requires_human_gate {
            self.action = RecommendedAction::RecommendReview;
            self.reason = reason.into();
        }
        self.requires_human_gate = true;
        self
    }
}

/// `0.4·sec + 0.3·bp + 20·agreement − 10·repairs`, clamped to `[0, 100]`.
pub fn compute_confidence(
    metrics: CandidateMetrics,
    agreement_ratio: f64,
    repair_attempts: u32,
) -> f64 {
    let agreement = agreement_ratio.clamp(0.0, 1.0);
    let raw = SECURITY_WEIGHT * f64::from(metrics.security_score)
        + BEST_PRACTICE_WEIGHT * f64::from(metrics.best_practice_score)
        + AGREEMENT_WEIGHT * agreement
        - REPAIR_PENALTY * f64::from(repair_attempts);
    raw.clamp(0.0, 100.0)
}

/// Table lookup from confidence to action. Lower bounds are inclusive.
pub fn route_action(confidence: f64) -> DecisionResult {
    let (action, reason) = if confidence >= 90.0 {
        (
            RecommendedAction::RecommendAutoApprove,
            "high confidence; safe to apply",
        )
    } else if confidence >= 70.0 {
        (
            RecommendedAction::RecommendReview,
            "good confidence; review recommended",
        )
    } else if confidence >= 40.0 {
        (
            RecommendedAction::RecommendDraft,
            "moderate confidence; treat as a draft",
        )
    } else {
        (
            RecommendedAction::ManualIntervention,
            "low confidence; manual intervention required",
        )
    };
    DecisionResult {
        confidence_score: confidence,
        action,
        reason: reason.to_string(),
        requires_human_gate: action.requires_human_gate(),
    }
}

/// Route a candidate, applying the overrides on top of the table lookup.
///
/// Unresolved repair forces `manual_intervention`. `Error` policy findings
/// take away auto-approval but otherwise keep the routed tier.
pub fn assess(
    metrics: CandidateMetrics,
    agreement_ratio: f64,
    repair: &RepairReport,
    violations: &[PolicyViolation],
) -> DecisionResult {
    let confidence = compute_confidence(metrics, agreement_ratio, repair.fixes_applied);
    let mut result = route_action(confidence);

    if repair.unresolved() {
        result.action = RecommendedAction::ManualIntervention;
        result.requires_human_gate = true;
        result.reason = format!(
            "repair did not converge after {} fix(es); content may be invalid",
            repair.fixes_applied
        );
    } else if has_blocking(violations) {
        result = result.require_human_gate("ERROR-severity policy findings block auto-approval");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Severity;
    use crate::repair::RepairOutcome;

    #[test]
    fn test_require_human_gate_downgrades_auto_tier_only() {
        let forced = route_action(95.0).require_human_gate("canned draft");
        assert_eq!(forced.action, RecommendedAction::RecommendReview);
        assert!(forced.requires_human_gate);
        assert_eq!(forced.reason, "canned draft");

        let draft = route_action(50.0);
        let kept = draft.clone().require_human_gate("canned draft");
        assert_eq!(kept, draft);
    }

    fn report(outcome: RepairOutcome, fixes: u32) -> RepairReport {
        RepairReport {
            content: String::new(),
            outcome,
            fixes_applied: fixes,
            validator_calls: fixes + 1,
            last_errors: Vec::new(),
        }
    }

    #[test]
    fn test_confidence_formula() {
        let m = CandidateMetrics::new(100, 100, 0, 0);
        assert_eq!(compute_confidence(m, 1.0, 0), 90.0);
        assert_eq!(compute_confidence(m, 1.0, 1), 80.0);
        assert_eq!(compute_confidence(CandidateMetrics::default(), 0.0, 3), 0.0);
    }

    #[test]
    fn test_scenario_confidence_55_is_draft() {
        let d = route_action(55.0);
        assert_eq!(d.action, RecommendedAction::RecommendDraft);
        assert_eq!(d.action.as_str(), "recommend_draft");
        assert!(d.requires_human_gate);
    }

    #[test]
    fn test_boundaries_are_inclusive_on_lower_tier() {
        assert_eq!(route_action(90.0).action, RecommendedAction::RecommendAutoApprove);
        assert_eq!(route_action(89.9).action, RecommendedAction::RecommendReview);
        assert_eq!(route_action(70.0).action, RecommendedAction::RecommendReview);
        assert_eq!(route_action(40.0).action, RecommendedAction::RecommendDraft);
        assert_eq!(route_action(39.9).action, RecommendedAction::ManualIntervention);
        assert!(!route_action(100.0).requires_human_gate);
    }

    #[test]
    fn test_unresolved_repair_forces_manual_intervention() {
        let m = CandidateMetrics::new(100, 100, 0, 0);
        let exhausted = assess(m, 1.0, &report(RepairOutcome::Exhausted, 0), &[]);
        assert_eq!(exhausted.action, RecommendedAction::ManualIntervention);
        assert!(exhausted.requires_human_gate);

        let failed = RepairOutcome::FixerFailed {
            reason: "boom".into(),
        };
        assert_eq!(
            assess(m, 1.0, &report(failed, 0), &[]).action,
            RecommendedAction::ManualIntervention
        );
    }

    #[test]
    fn test_blocking_policy_removes_auto_approval() {
        let m = CandidateMetrics::new(100, 100, 0, 0);
        let errors = vec![PolicyViolation::new("r", "m", Severity::Error)];
        let d = assess(m, 1.0, &report(RepairOutcome::Valid, 0), &errors);
        assert_eq!(d.action, RecommendedAction::RecommendReview);
        assert!(d.requires_human_gate);

        let warnings = vec![PolicyViolation::new("r", "m", Severity::Warning)];
        let d = assess(m, 1.0, &report(RepairOutcome::Valid, 0), &warnings);
        assert_eq!(d.action, RecommendedAction::RecommendAutoApprove);
    }
}
