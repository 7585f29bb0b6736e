//! Candidate drafts and their derived score card.

use serde::{Deserialize, Serialize};

/// Self-declared or graded quality metrics, each in `0..=100`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateMetrics {
    pub security_score: u8,
    pub best_practice_score: u8,
    pub complexity_score: u8,
    pub performance_score: u8,
}

impl CandidateMetrics {
    /// Build metrics, clamping every value to `0..=100`.
    pub fn new(security: u32, best_practice: u32, complexity: u32, performance: u32) -> Self {
        let clamp = |v: u32| v.min(100) as u8;
        Self {
            security_score: clamp(security),
            best_practice_score: clamp(best_practice),
            complexity_score: clamp(complexity),
            performance_score: clamp(performance),
        }
    }
}

/// One generator's proposed artifact.
///
/// Fields are private so a candidate cannot change after it was graded;
/// its [`ScoreCard`] is therefore always consistent with its contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    content: String,
    producer_id: String,
    metrics: CandidateMetrics,
    violations: Vec<String>,
}

impl Candidate {
    pub fn new(
        content: impl Into<String>,
        producer_id: impl Into<String>,
        metrics: CandidateMetrics,
        violations: Vec<String>,
    ) -> Self {
        Self {
            content: content.into(),
            producer_id: producer_id.into(),
            metrics,
            violations,
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn producer_id(&self) -> &str {
        &self.producer_id
    }

    pub fn metrics(&self) -> CandidateMetrics {
        self.metrics
    }

    pub fn violations(&self) -> &[String] {
        &self.violations
    }

    /// Whether the draft carries any content at all.
    pub fn is_empty(&self) -> bool {
        self.content.trim().is_empty()
    }

    /// Consume the candidate, keeping only the content.
    pub fn into_content(self) -> String {
        self.content
    }

    /// Selection score for this candidate.
    pub fn score_card(&self) -> ScoreCard {
        ScoreCard::compute(self)
    }
}

/// Weighted selection score in `[0, 100]`, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreCard {
    pub total: f64,
}

impl ScoreCard {
    pub const SECURITY_WEIGHT: f64 = 0.4;
    pub const BEST_PRACTICE_WEIGHT: f64 = 0.3;
    pub const SIMPLICITY_WEIGHT: f64 = 0.2;
    pub const PERFORMANCE_WEIGHT: f64 = 0.1;
    pub const VIOLATION_PENALTY: f64 = 15.0;

    /// `0.4·sec + 0.3·bp + 0.2·(100 − cx) + 0.1·perf − 15·violations`, clamped
    /// to `[0, 100]` and rounded to one decimal.
    pub fn compute(candidate: &Candidate) -> Self {
        let m = candidate.metrics;
        let simplicity = 100.0 - f64::from(m.complexity_score);
        let raw = Self::SECURITY_WEIGHT * f64::from(m.security_score)
            + Self::BEST_PRACTICE_WEIGHT * f64::from(m.best_practice_score)
            + Self::SIMPLICITY_WEIGHT * simplicity
            + Self::PERFORMANCE_WEIGHT * f64::from(m.performance_score)
            - Self::VIOLATION_PENALTY * candidate.violations.len() as f64;
        let clamped = raw.clamp(0.0, 100.0);
        Self {
            total: (clamped * 10.0).round() / 10.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(sec: u32, bp: u32, cx: u32, perf: u32, violations: usize) -> Candidate {
        Candidate::new(
            "FROM rust:1.75",
            "gen-a",
            CandidateMetrics::new(sec, bp, cx, perf),
            (0..violations).map(|i| format!("rule-{i}")).collect(),
        )
    }

    #[test]
    fn test_score_matches_weighted_formula() {
        let c = candidate(95, 92, 10, 80, 0);
        assert_eq!(c.score_card().total, 91.6);
    }

    #[test]
    fn test_score_is_deterministic() {
        let c = candidate(63, 71, 44, 12, 1);
        assert_eq!(c.score_card(), c.score_card());
    }

    #[test]
    fn test_violations_clamp_to_zero() {
        let c = candidate(10, 10, 90, 0, 5);
        assert_eq!(c.score_card().total, 0.0);
    }

    #[test]
    fn test_metrics_clamp_to_hundred() {
        let m = CandidateMetrics::new(250, 100, 101, 7);
        assert_eq!(m.security_score, 100);
        assert_eq!(m.complexity_score, 100);
        assert_eq!(m.performance_score, 7);
    }

    #[test]
    fn test_is_empty_ignores_whitespace() {
        let c = Candidate::new("  \n", "gen-b", CandidateMetrics::default(), vec![]);
        assert!(c.is_empty());
    }
}
