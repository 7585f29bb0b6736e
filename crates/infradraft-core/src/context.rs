//! Run-scoped context and project facts.
//!
//! [`RunContext`] is handed to every component constructor instead of a
//! process-wide correlation id: it carries the run id, the configuration and
//! the run's tracing span.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::domain::{Result, StageKind};

/// Project context file written by the (external) code analysis step.
pub const CONTEXT_FILE: &str = ".devops_context.json";

/// Explicit per-run context.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: String,
    pub config: Arc<PipelineConfig>,
    pub span: tracing::Span,
}

impl RunContext {
    /// Create a context with a fresh 8-hex-char run id.
    pub fn new(config: PipelineConfig) -> Self {
        let run_id = Uuid::new_v4().simple().to_string()[..8].to_string();
        Self::with_run_id(run_id, config)
    }

    pub fn with_run_id(run_id: impl Into<String>, config: PipelineConfig) -> Self {
        let run_id = run_id.into();
        let span = tracing::info_span!("infradraft.run", run_id = %run_id);
        Self {
            run_id,
            config: Arc::new(config),
            span,
        }
    }
}

/// Facts about the target project, as produced by code analysis.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectContext {
    pub project_name: String,
    pub language: String,
    pub frameworks: Vec<String>,
    pub dependencies: Vec<String>,
    pub ports: Vec<String>,
    pub env_vars: Vec<String>,
    pub raw_context_summary: String,
}

impl ProjectContext {
    /// Load `<project>/.devops_context.json`, or derive a minimal context
    /// from the directory name when the file is absent.
    pub fn load(project: &Path) -> Result<Self> {
        let path = project.join(CONTEXT_FILE);
        let mut ctx = if path.exists() {
            let data = std::fs::read_to_string(&path)?;
            serde_json::from_str::<ProjectContext>(&data)?
        } else {
            tracing::debug!(path = %path.display(), "no project context file; using defaults");
            ProjectContext::default()
        };

        if ctx.project_name.trim().is_empty() {
            ctx.project_name = project
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "project".to_string());
        }
        ctx.language = match ctx.language.trim() {
            "" => "unknown".to_string(),
            lang => lang.to_ascii_lowercase(),
        };
        Ok(ctx)
    }
}

/// Build the context blob handed to every generator of a stage.
///
/// Feedback constraints are appended in the order they were given; all of
/// them stay mandatory for later rounds.
pub fn render_generation_context(
    stage: StageKind,
    project: &ProjectContext,
    constraints: &[String],
) -> String {
    let facts = serde_json::to_string_pretty(project).unwrap_or_default();
    let mut out = format!(
        "STAGE: {}\nTITLE: {}\nTASK: {}\n\nPROJECT CONTEXT:\n{}\n",
        stage.key(),
        stage.display_name(),
        stage.instruction(),
        facts
    );
    for (i, constraint) in constraints.iter().enumerate() {
        out.push_str(&format!(
            "\nUSER FEEDBACK {} (MUST ADDRESS): {}\n",
            i + 1,
            constraint
        ));
    }
    out
}

/// Recover the stage from a rendered generation context.
pub fn stage_from_context(context: &str) -> Option<StageKind> {
    context
        .lines()
        .find_map(|line| line.strip_prefix("STAGE: "))
        .and_then(|key| key.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_id_is_short_hex() {
        let ctx = RunContext::new(PipelineConfig::default());
        assert_eq!(ctx.run_id.len(), 8);
        assert!(ctx.run_id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_load_without_file_uses_dir_name() {
        let dir = tempfile::tempdir().unwrap();
        let project = dir.path().join("shop-api");
        std::fs::create_dir_all(&project).unwrap();
        let ctx = ProjectContext::load(&project).unwrap();
        assert_eq!(ctx.project_name, "shop-api");
        assert_eq!(ctx.language, "unknown");
    }

    #[test]
    fn test_load_normalizes_language() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONTEXT_FILE),
            r#"{"project_name":"api","language":" Python ","ports":["8000"]}"#,
        )
        .unwrap();
        let ctx = ProjectContext::load(dir.path()).unwrap();
        assert_eq!(ctx.language, "python");
        assert_eq!(ctx.ports, vec!["8000".to_string()]);
    }

    #[test]
    fn test_render_includes_all_constraints() {
        let project = ProjectContext {
            project_name: "api".into(),
            ..Default::default()
        };
        let text = render_generation_context(
            StageKind::Kubernetes,
            &project,
            &["use namespace shop".into(), "two replicas".into()],
        );
        assert!(text.contains("Kubernetes"));
        assert!(text.contains("USER FEEDBACK 1 (MUST ADDRESS): use namespace shop"));
        assert!(text.contains("USER FEEDBACK 2 (MUST ADDRESS): two replicas"));
        assert_eq!(stage_from_context(&text), Some(StageKind::Kubernetes));
    }
}
