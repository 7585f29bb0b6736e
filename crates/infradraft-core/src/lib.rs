//! infradraft core library
//!
//! Multi-candidate infrastructure artifact generation: concurrent draft
//! generators, deterministic scoring and selection, bounded repair,
//! confidence routing, a bounded human review gate, publish with local
//! fallback, and an append-only audit trail.

pub mod approval;
pub mod artifacts;
pub mod audit;
pub mod confidence;
pub mod config;
pub mod context;
pub mod domain;
pub mod fakes;
pub mod generation;
pub mod memory;
pub mod obs;
pub mod pipeline;
pub mod policy;
pub mod publish;
pub mod repair;
pub mod sanitize;
pub mod scoring;
pub mod telemetry;

pub use approval::{FeedbackConstraints, HumanPrompt, HumanResponse, PromptError, RenderedProposal};
pub use artifacts::{split_artifact_files, ArtifactFiles};
pub use audit::{read_audit_file, AuditEvent, AuditLog, AuditRecord, AuditSummary, DecisionEntry};
pub use confidence::{assess, compute_confidence, route_action, DecisionResult, RecommendedAction};
pub use config::{GeneratorSpec, PipelineConfig, PublishConfig};
pub use context::{render_generation_context, ProjectContext, RunContext};
pub use domain::{
    has_blocking, Candidate, CandidateMetrics, Decision, InfraError, PolicyViolation, Result,
    ScoreCard, Severity, StageKind, StageResult, StageSelector, ValidationResult,
};
pub use generation::{
    build_generators, parse_model_output, parse_or_plain, run_generators_parallel,
    GenerationBatch, GenerationError, Generator, HttpGenerator, StubGenerator,
};
pub use memory::LongTermMemory;
pub use pipeline::{PipelineBuilder, RunReport, StageError, StagePipeline};
pub use policy::{BuiltinPolicyEngine, PolicyEngine, PolicyRule, PolicyRuleSet};
pub use publish::{
    GitHubChannel, PublishChannel, PublishError, PublishMetadata, PublishMode, PublishOutcome,
    Publisher,
};
pub use repair::{
    repair_until_valid, FenceStrippingFixer, FixError, Fixer, RepairOutcome, RepairPolicy,
    RepairReport, StructuralValidator, Validator,
};
pub use sanitize::sanitize_feedback;
pub use scoring::{evaluate, EvaluationError, Grader, Selection};
pub use telemetry::{init_tracing, level_for};

/// infradraft version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
