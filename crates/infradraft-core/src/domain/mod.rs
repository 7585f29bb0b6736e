//! Domain models for infradraft.
//!
//! Canonical definitions for the core entities:
//! - `Candidate`: one generator's draft plus its quality metrics
//! - `StageKind` / `StageResult`: the artifact stages and their terminal outcome
//! - `ValidationResult` / `PolicyViolation`: functional and policy findings

pub mod candidate;
pub mod error;
pub mod stage;
pub mod validation;

pub use candidate::{Candidate, CandidateMetrics, ScoreCard};
pub use error::{InfraError, Result};
pub use stage::{Decision, StageKind, StageResult, StageSelector};
pub use validation::{has_blocking, PolicyViolation, Severity, ValidationResult};
