//! Structured lifecycle events for runs and stages.
//!
//! Events are emitted at `info!` level with an `event` field so they can be
//! filtered out of JSON logs.

use tracing::{info, warn};

use crate::domain::{Decision, StageKind};

/// Span for one stage invocation. Attach it to the stage future with
/// [`tracing::Instrument`] so it survives across `.await` points.
pub fn stage_span(run_id: &str, stage: StageKind) -> tracing::Span {
    tracing::info_span!("infradraft.stage", run_id = %run_id, stage = %stage)
}

pub fn emit_run_started(run_id: &str, project: &str, stages: usize) {
    info!(event = "run.started", run_id = %run_id, project = %project, stages = stages);
}

pub fn emit_run_finished(run_id: &str, duration_ms: u64, approved: usize, rejected: usize) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        approved = approved,
        rejected = rejected,
    );
}

pub fn emit_stage_generated(stage: StageKind, cycle: u32, drafts: usize, generators: usize) {
    info!(
        event = "stage.generated",
        stage = %stage,
        cycle = cycle,
        drafts = drafts,
        generators = generators,
    );
}

pub fn emit_stage_decided(stage: StageKind, cycle: u32, decision: Decision, confidence: f64) {
    info!(
        event = "stage.decided",
        stage = %stage,
        cycle = cycle,
        decision = %decision,
        confidence = confidence,
    );
}

pub fn emit_stage_published(stage: StageKind, mode: &str, files: usize) {
    info!(event = "stage.published", stage = %stage, mode = %mode, files = files);
}

pub fn emit_stage_failed(stage: StageKind, error: &dyn std::fmt::Display) {
    warn!(event = "stage.failed", stage = %stage, error = %error);
}
