//! Pipeline configuration.
//!
//! Every value has a default and can be overridden from the environment via
//! [`PipelineConfig::from_env`]. The CLI layers its flags on top.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::{InfraError, Result};

/// One configured draft generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratorSpec {
    /// Producer id recorded on candidates and in the audit log.
    pub id: String,
    /// Completion endpoint; `None` selects the stub generator.
    pub endpoint: Option<String>,
    /// Model name sent to the endpoint.
    pub model: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
}

impl GeneratorSpec {
    pub fn new(id: &str, model: &str, api_key_env: &str) -> Self {
        Self {
            id: id.to_string(),
            endpoint: None,
            model: model.to_string(),
            api_key_env: api_key_env.to_string(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Default roster of three independent generators.
    pub fn default_roster() -> Vec<Self> {
        let endpoint = |id: &str| {
            std::env::var(format!("INFRADRAFT_{}_ENDPOINT", id.to_ascii_uppercase())).ok()
        };
        [
            ("gemini", "gemini-1.5-pro", "GEMINI_API_KEY"),
            ("groq", "llama-3.1-70b-versatile", "GROQ_API_KEY"),
            ("nvidia", "meta/llama-3.1-405b-instruct", "NVIDIA_API_KEY"),
        ]
        .into_iter()
        .map(|(id, model, key)| {
            let mut spec = Self::new(id, model, key);
            spec.endpoint = endpoint(id);
            spec
        })
        .collect()
    }
}

/// Remote publish channel settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishConfig {
    pub github_token: Option<String>,
    /// `owner/repo`.
    pub github_repo: Option<String>,
    pub base_branch: String,
    pub api_base: String,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            github_token: None,
            github_repo: None,
            base_branch: "main".to_string(),
            api_base: "https://api.github.com".to_string(),
        }
    }
}

impl PublishConfig {
    pub fn from_env() -> Self {
        let non_empty = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());
        Self {
            github_token: non_empty("GITHUB_TOKEN"),
            github_repo: non_empty("GITHUB_REPO"),
            base_branch: non_empty("GITHUB_BASE_BRANCH").unwrap_or_else(|| "main".to_string()),
            api_base: non_empty("GITHUB_API_BASE")
                .unwrap_or_else(|| "https://api.github.com".to_string()),
        }
    }

    /// Remote publishing is enabled only when both token and repo are set.
    pub fn remote_enabled(&self) -> bool {
        self.github_token.is_some() && self.github_repo.is_some()
    }
}

/// Full pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Wall-clock bound for one generation batch.
    pub generator_timeout_secs: u64,
    /// Review cycles per stage before the stage is rejected.
    pub max_review_cycles: u32,
    /// Validator calls allowed per repair loop.
    pub repair_max_retries: u32,
    /// Output longer than this many chars counts toward agreement.
    pub agreement_min_chars: usize,
    pub audit_dir: PathBuf,
    /// Allow confidence >= 90 stages to skip the human gate. Off unless
    /// opted into.
    pub auto_approve: bool,
    /// Record approved stages in the project's long-term memory file.
    pub memory_enabled: bool,
    pub generators: Vec<GeneratorSpec>,
    pub publish: PublishConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            generator_timeout_secs: 120,
            max_review_cycles: 3,
            repair_max_retries: 3,
            agreement_min_chars: 100,
            audit_dir: PathBuf::from("audit_logs"),
            auto_approve: false,
            memory_enabled: true,
            generators: GeneratorSpec::default_roster(),
            publish: PublishConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Read overrides from `INFRADRAFT_*` and `GITHUB_*` variables.
    pub fn from_env() -> Result<Self> {
        let mut config = Self {
            publish: PublishConfig::from_env(),
            ..Self::default()
        };

        if let Some(v) = env_parse::<u64>("INFRADRAFT_GENERATOR_TIMEOUT_SECS")? {
            config.generator_timeout_secs = v;
        }
        if let Some(v) = env_parse::<u32>("INFRADRAFT_MAX_REVIEW_CYCLES")? {
            config.max_review_cycles = v;
        }
        if let Some(v) = env_parse::<u32>("INFRADRAFT_REPAIR_MAX_RETRIES")? {
            config.repair_max_retries = v;
        }
        if let Some(v) = env_parse::<bool>("INFRADRAFT_AUTO_APPROVE")? {
            config.auto_approve = v;
        }
        if let Some(v) = env_parse::<bool>("INFRADRAFT_MEMORY")? {
            config.memory_enabled = v;
        }
        if let Ok(dir) = std::env::var("INFRADRAFT_AUDIT_DIR") {
            config.audit_dir = PathBuf::from(dir);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn generator_timeout(&self) -> Duration {
        Duration::from_secs(self.generator_timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.generators.is_empty() {
            return Err(InfraError::InvalidConfig(
                "at least one generator is required".to_string(),
            ));
        }
        if self.max_review_cycles == 0 {
            return Err(InfraError::InvalidConfig(
                "max_review_cycles must be >= 1".to_string(),
            ));
        }
        if self.generator_timeout_secs == 0 {
            return Err(InfraError::InvalidConfig(
                "generator_timeout_secs must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| InfraError::InvalidConfig(format!("{key}={raw} is not valid"))),
        Err(_) => Ok(None),
    }
}
