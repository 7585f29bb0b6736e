//! Per-stage orchestration: generate → score → repair → decide → approve →
//! publish, with every transition written to the audit log first.
//!
//! Stages run strictly one after another; the generator fan-out inside a
//! round is the only concurrent region.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{info, Instrument};

use crate::approval::{FeedbackConstraints, HumanPrompt, PromptError, RenderedProposal};
use crate::artifacts::split_artifact_files;
use crate::audit::AuditLog;
use crate::confidence::{assess, DecisionResult};
use crate::context::{render_generation_context, ProjectContext, RunContext};
use crate::domain::{Decision, InfraError, PolicyViolation, StageKind, StageResult, StageSelector};
use crate::generation::{build_generators, run_generators_parallel, Generator};
use crate::memory::LongTermMemory;
use crate::obs::{
    emit_run_finished, emit_run_started, emit_stage_decided, emit_stage_failed,
    emit_stage_generated, emit_stage_published, stage_span,
};
use crate::policy::{BuiltinPolicyEngine, PolicyEngine};
use crate::publish::{PublishError, PublishMetadata, Publisher};
use crate::repair::{
    repair_until_valid, FenceStrippingFixer, Fixer, RepairPolicy, StructuralValidator,
    ValidatorFactory,
};
use crate::sanitize::sanitize_feedback;
use crate::scoring::{evaluate, EvaluationError, Grader};

/// Stage-level failures. Everything below this level is absorbed into
/// scores, confidence or the audit trail.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error("all {generators} generators failed for stage {stage}: {}", errors.join("; "))]
    AllGeneratorsFailed {
        stage: StageKind,
        generators: usize,
        errors: Vec<String>,
    },

    #[error("evaluation failed: {0}")]
    Evaluation(#[from] EvaluationError),

    #[error("approved content is not publishable: {0}")]
    Artifact(#[source] InfraError),

    #[error("publish failed: {0}")]
    Publish(#[from] PublishError),

    #[error("review prompt failed: {0}")]
    Prompt(#[source] PromptError),

    #[error("audit log could not be saved: {0}")]
    Audit(#[source] InfraError),
}

/// Outcome of a whole run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub results: Vec<StageResult>,
    /// Stages that failed, with the reason shown to the operator.
    pub failures: Vec<(StageKind, String)>,
    pub audit_path: PathBuf,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Everything one evaluation round produced for the reviewer.
#[derive(Debug, Clone)]
struct Round {
    producer_id: String,
    content: String,
    reasoning: String,
    violations: Vec<PolicyViolation>,
    decision: DecisionResult,
    drafts: usize,
    unresolved_errors: Vec<String>,
}

impl Round {
    fn proposal(&self, stage: StageKind, cycle: u32, max_cycles: u32) -> RenderedProposal {
        RenderedProposal {
            stage,
            cycle,
            max_cycles,
            producer_id: self.producer_id.clone(),
            content: self.content.clone(),
            reasoning: self.reasoning.clone(),
            violations: self.violations.clone(),
            confidence: self.decision.confidence_score,
            action: self.decision.action,
            unresolved_errors: self.unresolved_errors.clone(),
        }
    }
}

/// Builder for [`StagePipeline`]. Only the prompt has no default.
pub struct PipelineBuilder {
    ctx: RunContext,
    project_root: PathBuf,
    prompt: Arc<dyn HumanPrompt>,
    generators: Option<Vec<Arc<dyn Generator>>>,
    policy: Option<Arc<dyn PolicyEngine>>,
    validators: Option<ValidatorFactory>,
    fixer: Option<Arc<dyn Fixer>>,
    publisher: Option<Publisher>,
}

impl PipelineBuilder {
    pub fn generators(mut self, generators: Vec<Arc<dyn Generator>>) -> Self {
        self.generators = Some(generators);
        self
    }

    pub fn policy(mut self, policy: Arc<dyn PolicyEngine>) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn validators(mut self, validators: ValidatorFactory) -> Self {
        self.validators = Some(validators);
        self
    }

    pub fn fixer(mut self, fixer: Arc<dyn Fixer>) -> Self {
        self.fixer = Some(fixer);
        self
    }

    pub fn publisher(mut self, publisher: Publisher) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn build(self) -> Result<StagePipeline, InfraError> {
        if !self.project_root.is_dir() {
            return Err(InfraError::ProjectNotFound(
                self.project_root.display().to_string(),
            ));
        }
        let config = &self.ctx.config;
        let project = ProjectContext::load(&self.project_root)?;
        let generators = self
            .generators
            .unwrap_or_else(|| build_generators(&config.generators));
        if generators.is_empty() {
            return Err(InfraError::InvalidConfig(
                "at least one generator is required".to_string(),
            ));
        }
        let policy = self
            .policy
            .unwrap_or_else(|| Arc::new(BuiltinPolicyEngine::default()));
        let publisher = self
            .publisher
            .unwrap_or_else(|| Publisher::from_config(&config.publish, &self.project_root));
        let memory = config
            .memory_enabled
            .then(|| LongTermMemory::open(&self.project_root));

        let stub_ids = generators
            .iter()
            .filter(|g| g.is_stub())
            .map(|g| g.id().to_string())
            .collect();

        Ok(StagePipeline {
            audit: AuditLog::new(&self.ctx.run_id),
            grader: Grader::new(policy.clone()),
            policy,
            validators: self.validators.unwrap_or_else(StructuralValidator::factory),
            fixer: self.fixer.unwrap_or_else(|| Arc::new(FenceStrippingFixer)),
            prompt: self.prompt,
            generators,
            stub_ids,
            publisher,
            memory,
            project,
            project_root: self.project_root,
            ctx: self.ctx,
        })
    }
}

/// Drives stages for one run and owns the run's audit log.
pub struct StagePipeline {
    ctx: RunContext,
    project_root: PathBuf,
    project: ProjectContext,
    generators: Vec<Arc<dyn Generator>>,
    /// Producer ids of stub generators in the roster.
    stub_ids: HashSet<String>,
    grader: Grader,
    policy: Arc<dyn PolicyEngine>,
    validators: ValidatorFactory,
    fixer: Arc<dyn Fixer>,
    prompt: Arc<dyn HumanPrompt>,
    publisher: Publisher,
    audit: AuditLog,
    memory: Option<LongTermMemory>,
}

impl StagePipeline {
    pub fn builder(
        ctx: RunContext,
        project_root: impl Into<PathBuf>,
        prompt: Arc<dyn HumanPrompt>,
    ) -> PipelineBuilder {
        PipelineBuilder {
            ctx,
            project_root: project_root.into(),
            prompt,
            generators: None,
            policy: None,
            validators: None,
            fixer: None,
            publisher: None,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.ctx.run_id
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    pub fn memory(&self) -> Option<&LongTermMemory> {
        self.memory.as_ref()
    }

    /// Run the selected stages in order, then save the audit log.
    ///
    /// A failed stage is recorded and the run moves on to the next stage.
    pub async fn run_stages(&mut self, selector: StageSelector) -> Result<RunReport, StageError> {
        let span = self.ctx.span.clone();
        async move {
            let started = Instant::now();
            let stages = selector.stages();
            emit_run_started(
                &self.ctx.run_id,
                &self.project.project_name,
                stages.len(),
            );

            let mut results = Vec::new();
            let mut failures = Vec::new();
            for stage in stages {
                match self.run_stage(stage).await {
                    Ok(result) => results.push(result),
                    Err(err) => failures.push((stage, err.to_string())),
                }
            }

            let audit_path = self
                .audit
                .save(&self.ctx.config.audit_dir)
                .map_err(StageError::Audit)?;
            let approved = results.iter().filter(|r| r.approved()).count();
            emit_run_finished(
                &self.ctx.run_id,
                started.elapsed().as_millis() as u64,
                approved,
                results.len() - approved,
            );

            Ok::<_, StageError>(RunReport {
                run_id: self.ctx.run_id.clone(),
                results,
                failures,
                audit_path,
            })
        }
        .instrument(span)
        .await
    }

    /// Run one stage to a terminal result.
    ///
    /// Failures are written to the audit log before they are returned.
    pub async fn run_stage(&mut self, stage: StageKind) -> Result<StageResult, StageError> {
        let span = stage_span(&self.ctx.run_id, stage);
        let result = self.negotiate(stage).instrument(span).await;
        if let Err(err) = &result {
            self.audit.record_failure(stage, &err.to_string());
            emit_stage_failed(stage, err);
        }
        result
    }

    async fn negotiate(&mut self, stage: StageKind) -> Result<StageResult, StageError> {
        let config = self.ctx.config.clone();
        let max_cycles = config.max_review_cycles;
        let mut constraints = FeedbackConstraints::default();
        let mut last_round: Option<Round> = None;

        for cycle in 1..=max_cycles {
            let round = self.evaluate_round(stage, cycle, &constraints).await?;
            let confidence = round.decision.confidence_score;

            // Auto-approval is only offered before a human has engaged.
            if cycle == 1 && config.auto_approve && !round.decision.requires_human_gate {
                self.audit.record_decision(
                    stage,
                    Decision::Approve,
                    cycle,
                    round.drafts,
                    &round.reasoning,
                    "auto-approved",
                );
                emit_stage_decided(stage, cycle, Decision::Approve, confidence);
                return self.approve(stage, cycle, round).await;
            }

            let proposal = round.proposal(stage, cycle, max_cycles);
            let response = match self.prompt.ask(&proposal).await {
                Ok(response) => response,
                Err(PromptError::Aborted) => {
                    self.audit.record_decision(
                        stage,
                        Decision::Reject,
                        cycle,
                        round.drafts,
                        &round.reasoning,
                        "review aborted",
                    );
                    emit_stage_decided(stage, cycle, Decision::Reject, confidence);
                    return Ok(rejected(stage, cycle, round));
                }
                Err(err) => return Err(StageError::Prompt(err)),
            };

            match response.decision {
                Decision::Approve => {
                    self.audit.record_decision(
                        stage,
                        Decision::Approve,
                        cycle,
                        round.drafts,
                        &round.reasoning,
                        &sanitize_feedback(&response.feedback),
                    );
                    emit_stage_decided(stage, cycle, Decision::Approve, confidence);
                    return self.approve(stage, cycle, round).await;
                }
                Decision::Reject => {
                    self.audit.record_decision(
                        stage,
                        Decision::Reject,
                        cycle,
                        round.drafts,
                        &round.reasoning,
                        &sanitize_feedback(&response.feedback),
                    );
                    emit_stage_decided(stage, cycle, Decision::Reject, confidence);
                    return Ok(rejected(stage, cycle, round));
                }
                Decision::Refine => {
                    let feedback = constraints
                        .push(&response.feedback)
                        .unwrap_or_default()
                        .to_string();
                    self.audit.record_decision(
                        stage,
                        Decision::Refine,
                        cycle,
                        round.drafts,
                        &round.reasoning,
                        &feedback,
                    );
                    emit_stage_decided(stage, cycle, Decision::Refine, confidence);
                    last_round = Some(round);
                }
            }
        }

        // Every cycle ended in refine.
        let reason = format!("no approval after {max_cycles} review cycles");
        info!(stage = %stage, "{reason}");
        let drafts = last_round.as_ref().map_or(0, |r| r.drafts);
        self.audit
            .record_decision(stage, Decision::Reject, max_cycles, drafts, &reason, "");
        let mut result = match last_round {
            Some(round) => rejected(stage, max_cycles, round),
            None => StageResult {
                stage_name: stage.key().to_string(),
                status: Decision::Reject,
                content: String::new(),
                reasoning: String::new(),
                policy_violations: Vec::new(),
                cycles: max_cycles.max(1),
                published_via: None,
            },
        };
        result.reasoning = reason;
        Ok(result)
    }

    async fn evaluate_round(
        &mut self,
        stage: StageKind,
        cycle: u32,
        constraints: &FeedbackConstraints,
    ) -> Result<Round, StageError> {
        let config = self.ctx.config.clone();
        let context = render_generation_context(stage, &self.project, constraints.as_slice());
        let batch =
            run_generators_parallel(&self.generators, &context, config.generator_timeout()).await;

        for draft in &batch.drafts {
            self.audit.record_generation(
                stage,
                &draft.producer_id,
                draft.succeeded() && !draft.is_empty(),
                draft.latency_ms,
                draft.error.as_deref(),
            );
        }
        emit_stage_generated(stage, cycle, batch.non_empty_count(), batch.generator_count());

        if batch.all_failed() {
            return Err(StageError::AllGeneratorsFailed {
                stage,
                generators: batch.generator_count(),
                errors: batch
                    .drafts
                    .iter()
                    .map(|d| {
                        let why = d.error.as_deref().unwrap_or("empty output");
                        format!("{}: {why}", d.producer_id)
                    })
                    .collect(),
            });
        }

        let candidates: Vec<_> = batch
            .non_empty()
            .map(|d| self.grader.grade(&d.producer_id, &d.content, stage))
            .collect();
        let selection = evaluate(&candidates)?;
        let winner = selection.candidate;

        let validator = (self.validators)(stage);
        let repair = repair_until_valid(
            winner.content(),
            validator.as_ref(),
            self.fixer.as_ref(),
            RepairPolicy {
                max_retries: config.repair_max_retries,
            },
        );
        let violations = self.policy.check(&repair.content, stage);
        let agreement = batch.agreement_ratio(config.agreement_min_chars);
        // Confidence describes the content that is shown and published.
        let metrics = if repair.content == winner.content() {
            winner.metrics()
        } else {
            self.grader
                .grade(winner.producer_id(), &repair.content, stage)
                .metrics()
        };
        let mut decision = assess(metrics, agreement, &repair, &violations);
        if self.stub_ids.contains(winner.producer_id()) {
            decision = decision.require_human_gate(
                "draft is canned stub content; no model generator is configured",
            );
        }

        let mut reasoning = format!(
            "Selected draft from {} (score {:.1}, {} of {} drafts usable, agreement {:.2}). Confidence {:.1}: {}.",
            winner.producer_id(),
            selection.score.total,
            batch.non_empty_count(),
            batch.generator_count(),
            agreement,
            decision.confidence_score,
            decision.reason,
        );
        if repair.fixes_applied > 0 {
            reasoning.push_str(&format!(
                " {} automatic fix(es) applied.",
                repair.fixes_applied
            ));
        }
        if !violations.is_empty() {
            reasoning.push_str(&format!(" {} policy finding(s).", violations.len()));
        }

        Ok(Round {
            producer_id: winner.producer_id().to_string(),
            unresolved_errors: if repair.unresolved() {
                repair.last_errors.clone()
            } else {
                Vec::new()
            },
            content: repair.content,
            reasoning,
            violations,
            decision,
            drafts: batch.non_empty_count(),
        })
    }

    async fn approve(
        &mut self,
        stage: StageKind,
        cycle: u32,
        round: Round,
    ) -> Result<StageResult, StageError> {
        let files =
            split_artifact_files(&round.content, stage.default_path()).map_err(StageError::Artifact)?;
        let metadata = PublishMetadata {
            run_id: self.ctx.run_id.clone(),
            stage,
            reasoning: round.reasoning.clone(),
        };
        let outcome = self.publisher.publish(&files, &metadata).await?;
        emit_stage_published(stage, outcome.mode.as_str(), files.len());

        if let Some(memory) = self.memory.as_mut() {
            memory.store_decision(stage, Decision::Approve, &round.reasoning, &round.content);
        }

        Ok(StageResult {
            stage_name: stage.key().to_string(),
            status: Decision::Approve,
            content: round.content,
            reasoning: round.reasoning,
            policy_violations: round.violations,
            cycles: cycle,
            published_via: Some(outcome.mode.as_str().to_string()),
        })
    }
}

fn rejected(stage: StageKind, cycle: u32, round: Round) -> StageResult {
    StageResult {
        stage_name: stage.key().to_string(),
        status: Decision::Reject,
        content: String::new(),
        reasoning: round.reasoning,
        policy_violations: round.violations,
        cycles: cycle,
        published_via: None,
    }
}
