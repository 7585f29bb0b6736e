//! Candidate grading and winner selection.

use std::sync::Arc;

use tracing::debug;

use crate::domain::{Candidate, CandidateMetrics, ScoreCard, Severity, StageKind};
use crate::policy::PolicyEngine;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvaluationError {
    #[error("no non-empty candidates to evaluate")]
    NoCandidates,
}

/// The winning candidate of a batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Selection<'a> {
    /// Index of the winner in the evaluated slice.
    pub index: usize,
    pub candidate: &'a Candidate,
    pub score: ScoreCard,
}

/// Select the highest-scoring non-empty candidate.
///
/// Ties keep the earliest index, so the result only depends on the input
/// order.
pub fn evaluate(candidates: &[Candidate]) -> Result<Selection<'_>, EvaluationError> {
    let mut best: Option<Selection<'_>> = None;
    for (index, candidate) in candidates.iter().enumerate() {
        if candidate.is_empty() {
            continue;
        }
        let score = candidate.score_card();
        debug!(producer = candidate.producer_id(), score = score.total, "candidate scored");
        if best.map_or(true, |b| score.total > b.score.total) {
            best = Some(Selection {
                index,
                candidate,
                score,
            });
        }
    }
    best.ok_or(EvaluationError::NoCandidates)
}

/// Derives candidate metrics from content using policy findings and size.
#[derive(Clone)]
pub struct Grader {
    policy: Arc<dyn PolicyEngine>,
}

impl Grader {
    const ERROR_SECURITY_PENALTY: u32 = 20;
    const WARNING_SECURITY_PENALTY: u32 = 5;
    const WARNING_PRACTICE_PENALTY: u32 = 12;
    const INFO_PRACTICE_PENALTY: u32 = 4;

    pub fn new(policy: Arc<dyn PolicyEngine>) -> Self {
        Self { policy }
    }

    /// Grade one draft. Pure in `content` and `stage`.
    pub fn grade(&self, producer_id: &str, content: &str, stage: StageKind) -> Candidate {
        let findings = self.policy.check(content, stage);
        let count = |sev: Severity| findings.iter().filter(|f| f.severity == sev).count() as u32;
        let (errors, warnings, infos) = (
            count(Severity::Error),
            count(Severity::Warning),
            count(Severity::Info),
        );

        let security = 100u32.saturating_sub(
            errors * Self::ERROR_SECURITY_PENALTY + warnings * Self::WARNING_SECURITY_PENALTY,
        );
        let best_practice = 100u32.saturating_sub(
            warnings * Self::WARNING_PRACTICE_PENALTY + infos * Self::INFO_PRACTICE_PENALTY,
        );
        let metrics = CandidateMetrics::new(
            security,
            best_practice,
            complexity_of(content),
            performance_of(content, stage),
        );

        let violations = findings
            .into_iter()
            .filter(|f| f.severity.is_blocking())
            .map(|f| f.rule)
            .collect();
        Candidate::new(content, producer_id, metrics, violations)
    }
}

/// Half a point per non-blank line, capped at 100.
fn complexity_of(content: &str) -> u32 {
    let lines = content.lines().filter(|l| !l.trim().is_empty()).count() as u32;
    (lines / 2).min(100)
}

fn performance_of(content: &str, stage: StageKind) -> u32 {
    let lower = content.to_ascii_lowercase();
    match stage {
        StageKind::Dockerfile => {
            let stages = lower
                .lines()
                .filter(|l| l.trim_start().starts_with("from "))
                .count();
            let mut score = 60;
            if stages > 1 {
                score += 20;
            }
            if ["alpine", "slim", "distroless"].iter().any(|t| lower.contains(t)) {
                score += 20;
            }
            score
        }
        StageKind::Kubernetes => {
            if lower.contains("limits:") {
                90
            } else {
                60
            }
        }
        _ => 75,
    }
}
