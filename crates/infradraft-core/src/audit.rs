//! Append-only decision ledger for one run.
//!
//! Every decision event and generation attempt is appended in order. At run
//! end the ledger is written to `<dir>/<run_id>.json` with a SHA-256 sidecar
//! `<dir>/<run_id>.digest`, and can be read back with integrity checking.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::domain::{Decision, InfraError, Result, StageKind};

/// Free-text fields are cut to this many characters.
pub const MAX_TEXT_CHARS: usize = 500;

fn truncate(text: &str) -> String {
    text.chars().take(MAX_TEXT_CHARS).collect()
}

/// One review-gate decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionEntry {
    pub timestamp: DateTime<Utc>,
    pub run_id: String,
    pub stage: StageKind,
    pub decision: Decision,
    pub reasoning: String,
    pub user_feedback: String,
    pub cycle: u32,
    pub drafts_count: usize,
}

/// One generator call; observability only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationEntry {
    pub timestamp: DateTime<Utc>,
    pub run_id: String,
    pub stage: StageKind,
    pub model: String,
    pub success: bool,
    pub latency_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A stage that ended in failure rather than a decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureEntry {
    pub timestamp: DateTime<Utc>,
    pub run_id: String,
    pub stage: StageKind,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent {
    Decision(DecisionEntry),
    Generation(GenerationEntry),
    Failure(FailureEntry),
}

impl AuditEvent {
    pub fn as_decision(&self) -> Option<&DecisionEntry> {
        match self {
            Self::Decision(d) => Some(d),
            _ => None,
        }
    }
}

/// Counts of decision events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditSummary {
    pub approved: usize,
    pub refined: usize,
    pub rejected: usize,
}

impl AuditSummary {
    pub fn from_events(events: &[AuditEvent]) -> Self {
        events
            .iter()
            .filter_map(AuditEvent::as_decision)
            .fold(Self::default(), |mut s, d| {
                match d.decision {
                    Decision::Approve => s.approved += 1,
                    Decision::Refine => s.refined += 1,
                    Decision::Reject => s.rejected += 1,
                }
                s
            })
    }

    pub fn total_decisions(&self) -> usize {
        self.approved + self.refined + self.rejected
    }
}

impl fmt::Display for AuditSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Approved: {} | Rejected: {} | Refined: {}",
            self.approved, self.rejected, self.refined
        )
    }
}

/// Persisted form of a run's ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub total_decisions: usize,
    pub entries: Vec<AuditEvent>,
}

impl AuditRecord {
    pub fn summary(&self) -> AuditSummary {
        AuditSummary::from_events(&self.entries)
    }
}

/// In-memory, single-writer ledger.
#[derive(Debug, Clone)]
pub struct AuditLog {
    run_id: String,
    started_at: DateTime<Utc>,
    entries: Vec<AuditEvent>,
}

impl AuditLog {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            started_at: Utc::now(),
            entries: Vec::new(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn entries(&self) -> &[AuditEvent] {
        &self.entries
    }

    pub fn record_decision(
        &mut self,
        stage: StageKind,
        decision: Decision,
        cycle: u32,
        drafts_count: usize,
        reasoning: &str,
        user_feedback: &str,
    ) {
        info!(stage = %stage, decision = %decision, cycle, "audit decision");
        self.entries.push(AuditEvent::Decision(DecisionEntry {
            timestamp: Utc::now(),
            run_id: self.run_id.clone(),
            stage,
            decision,
            reasoning: truncate(reasoning),
            user_feedback: truncate(user_feedback),
            cycle,
            drafts_count,
        }));
    }

    pub fn record_generation(
        &mut self,
        stage: StageKind,
        model: &str,
        success: bool,
        latency_ms: u64,
        error: Option<&str>,
    ) {
        self.entries.push(AuditEvent::Generation(GenerationEntry {
            timestamp: Utc::now(),
            run_id: self.run_id.clone(),
            stage,
            model: model.to_string(),
            success,
            latency_ms,
            error: error.map(truncate),
        }));
    }

    pub fn record_failure(&mut self, stage: StageKind, reason: &str) {
        self.entries.push(AuditEvent::Failure(FailureEntry {
            timestamp: Utc::now(),
            run_id: self.run_id.clone(),
            stage,
            reason: truncate(reason),
        }));
    }

    /// Decision entries for one stage, in order.
    pub fn decisions_for(&self, stage: StageKind) -> impl Iterator<Item = &DecisionEntry> {
        self.entries
            .iter()
            .filter_map(AuditEvent::as_decision)
            .filter(move |d| d.stage == stage)
    }

    pub fn summary(&self) -> AuditSummary {
        AuditSummary::from_events(&self.entries)
    }

    /// Snapshot the ledger, stamping `completed_at` now.
    pub fn to_record(&self) -> AuditRecord {
        AuditRecord {
            run_id: self.run_id.clone(),
            started_at: self.started_at,
            completed_at: Utc::now(),
            total_decisions: self.summary().total_decisions(),
            entries: self.entries.clone(),
        }
    }

    /// Persist `<dir>/<run_id>.json` and `<dir>/<run_id>.digest`.
    pub fn save(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("{}.json", self.run_id));
        let json = serde_json::to_vec_pretty(&self.to_record())?;

        std::fs::write(&path, &json)?;
        std::fs::write(digest_path(&path), content_digest(&json))?;

        info!(
            run_id = %self.run_id,
            entries = self.entries.len(),
            path = %path.display(),
            "audit log saved"
        );
        Ok(path)
    }
}

fn content_digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn digest_path(audit_file: &Path) -> PathBuf {
    audit_file.with_extension("digest")
}

/// Read an audit file, verifying it against its digest sidecar.
pub fn read_audit_file(path: &Path) -> Result<AuditRecord> {
    let json = std::fs::read(path)?;
    let expected = std::fs::read_to_string(digest_path(path))?;
    let actual = content_digest(&json);
    if expected.trim() != actual {
        return Err(InfraError::DigestMismatch {
            expected: expected.trim().to_string(),
            actual,
        });
    }
    Ok(serde_json::from_slice(&json)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_ignores_generation_events() {
        let mut log = AuditLog::new("run1");
        log.record_generation(StageKind::Dockerfile, "gemini", true, 120, None);
        log.record_decision(StageKind::Dockerfile, Decision::Refine, 1, 3, "r", "fb");
        log.record_decision(StageKind::Dockerfile, Decision::Approve, 2, 3, "r", "");
        log.record_decision(StageKind::Compose, Decision::Reject, 1, 2, "r", "");
        log.record_failure(StageKind::Kubernetes, "all generators failed");

        let s = log.summary();
        assert_eq!((s.approved, s.refined, s.rejected), (1, 1, 1));
        assert_eq!(s.total_decisions(), 3);
        assert_eq!(log.decisions_for(StageKind::Dockerfile).count(), 2);
    }

    #[test]
    fn test_text_fields_truncated_at_fixed_offset() {
        let mut log = AuditLog::new("run1");
        let long = "é".repeat(700);
        log.record_decision(StageKind::Cicd, Decision::Reject, 1, 1, &long, &long);
        let entry = log.decisions_for(StageKind::Cicd).next().unwrap();
        assert_eq!(entry.reasoning.chars().count(), MAX_TEXT_CHARS);
        assert_eq!(entry.user_feedback, "é".repeat(MAX_TEXT_CHARS));
    }

    #[test]
    fn test_save_and_verify() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = AuditLog::new("abcd1234");
        log.record_decision(StageKind::Dockerfile, Decision::Approve, 1, 3, "ok", "");
        let path = log.save(dir.path()).unwrap();
        assert_eq!(path, dir.path().join("abcd1234.json"));

        let record = read_audit_file(&path).unwrap();
        assert_eq!(record.run_id, "abcd1234");
        assert_eq!(record.total_decisions, 1);
        assert_eq!(record.entries, log.entries());
    }

    #[test]
    fn test_tampered_file_fails_verification() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = AuditLog::new("tamper01");
        log.record_decision(StageKind::Dockerfile, Decision::Reject, 1, 3, "no", "");
        let path = log.save(dir.path()).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        std::fs::write(&path, text.replace("reject", "approve")).unwrap();
        assert!(matches!(
            read_audit_file(&path),
            Err(InfraError::DigestMismatch { .. })
        ));
    }

    #[test]
    fn test_event_tag_in_json() {
        let mut log = AuditLog::new("r");
        log.record_generation(StageKind::Compose, "groq", false, 5, Some("timeout"));
        let json = serde_json::to_value(log.entries()).unwrap();
        assert_eq!(json[0]["event"], "generation");
        assert_eq!(json[0]["error"], "timeout");
    }
}
