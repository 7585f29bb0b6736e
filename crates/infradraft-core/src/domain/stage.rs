//! Artifact stages, human decisions and terminal stage outcomes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::InfraError;
use super::validation::PolicyViolation;

/// One artifact-generation unit of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Dockerfile,
    Compose,
    Kubernetes,
    Cicd,
    Observability,
}

impl StageKind {
    /// All stages, in the order `all` runs them.
    pub const ALL: [StageKind; 5] = [
        StageKind::Dockerfile,
        StageKind::Compose,
        StageKind::Kubernetes,
        StageKind::Cicd,
        StageKind::Observability,
    ];

    /// Stable key used in audit entries, branch names and policy lookup.
    pub fn key(self) -> &'static str {
        match self {
            Self::Dockerfile => "dockerfile",
            Self::Compose => "compose",
            Self::Kubernetes => "kubernetes",
            Self::Cicd => "cicd",
            Self::Observability => "observability",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Dockerfile => "Dockerfile",
            Self::Compose => "Docker Compose",
            Self::Kubernetes => "Kubernetes Manifests",
            Self::Cicd => "CI/CD Pipeline",
            Self::Observability => "Observability",
        }
    }

    /// Path, relative to the project root, the artifact is published to.
    pub fn default_path(self) -> &'static str {
        match self {
            Self::Dockerfile => "Dockerfile",
            Self::Compose => "docker-compose.yml",
            Self::Kubernetes => "k8s/manifest.yaml",
            Self::Cicd => ".github/workflows/main.yml",
            Self::Observability => "monitoring/Chart.yaml",
        }
    }

    /// Instruction line placed at the top of the generation context.
    pub fn instruction(self) -> &'static str {
        match self {
            Self::Dockerfile => {
                "Write a production Dockerfile for this project: pinned base image, non-root USER, HEALTHCHECK."
            }
            Self::Compose => {
                "Write a docker-compose file for this project and its backing services."
            }
            Self::Kubernetes => {
                "Write Kubernetes manifests (Deployment and Service) with resource limits and readiness probes."
            }
            Self::Cicd => {
                "Write a GitHub Actions CI/CD workflow that builds and tests this project with pinned actions."
            }
            Self::Observability => {
                "Write a Helm chart wiring observability (metrics and logs) for this project."
            }
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for StageKind {
    type Err = InfraError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dockerfile" | "docker" => Ok(Self::Dockerfile),
            "compose" | "docker-compose" => Ok(Self::Compose),
            "kubernetes" | "k8s" => Ok(Self::Kubernetes),
            "cicd" | "ci/cd" | "ci" => Ok(Self::Cicd),
            "observability" | "helm" => Ok(Self::Observability),
            other => Err(InfraError::UnknownStage(other.to_string())),
        }
    }
}

/// CLI stage selector: one stage by name, or `all`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageSelector {
    All,
    One(StageKind),
}

impl StageSelector {
    pub fn stages(self) -> Vec<StageKind> {
        match self {
            Self::All => StageKind::ALL.to_vec(),
            Self::One(kind) => vec![kind],
        }
    }
}

impl FromStr for StageSelector {
    type Err = InfraError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }
        s.parse().map(Self::One)
    }
}

/// Human (or auto-approval) decision at the review gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Refine,
    Reject,
}

impl Decision {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Refine => "refine",
            Self::Reject => "reject",
        }
    }

    /// `Refine` loops back into generation; the others end the stage.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Refine)
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal outcome of one stage invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    pub stage_name: String,
    pub status: Decision,
    /// Final approved content (empty when rejected).
    pub content: String,
    pub reasoning: String,
    pub policy_violations: Vec<PolicyViolation>,
    /// Number of review cycles used, always `>= 1`.
    pub cycles: u32,
    /// `remote_pr`, `local_fallback` or `local`; `None` when not published.
    pub published_via: Option<String>,
}

impl StageResult {
    pub fn approved(&self) -> bool {
        self.status == Decision::Approve
    }
}
