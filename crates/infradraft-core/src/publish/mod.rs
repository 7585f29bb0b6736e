//! Publishing approved artifacts.
//!
//! The [`Publisher`] tries its primary [`PublishChannel`] first. Any primary
//! failure, including one part-way through a multi-file commit, triggers a
//! local write of *every* file so remote and local views never split.

pub mod github;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::artifacts::{check_relative_path, ArtifactFiles};
use crate::config::PublishConfig;
use crate::domain::StageKind;

pub use github::GitHubChannel;

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("primary channel failed: {0}")]
    Primary(String),

    #[error("local fallback failed after primary error ({primary}): {source}")]
    FallbackFailed {
        primary: String,
        #[source]
        source: Box<PublishError>,
    },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("io error writing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("refusing to write outside the project root: {0}")]
    UnsafePath(String),
}

/// Context attached to a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishMetadata {
    pub run_id: String,
    pub stage: StageKind,
    pub reasoning: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishReceipt {
    pub url: String,
}

/// Remote publish channel: branch, multi-file commit, merge request.
///
/// Commits are not atomic across files; an error from any file fails the
/// whole commit.
#[async_trait]
pub trait PublishChannel: Send + Sync {
    fn name(&self) -> &str;

    async fn commit(
        &self,
        files: &ArtifactFiles,
        metadata: &PublishMetadata,
    ) -> Result<PublishReceipt, PublishError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishMode {
    /// Committed through the primary channel.
    RemotePr,
    /// Primary failed; all files written locally.
    LocalFallback,
    /// No primary configured; all files written locally.
    Local,
}

impl PublishMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RemotePr => "remote_pr",
            Self::LocalFallback => "local_fallback",
            Self::Local => "local",
        }
    }
}

impl std::fmt::Display for PublishMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishOutcome {
    pub mode: PublishMode,
    pub url: Option<String>,
    /// Files written locally; empty for `remote_pr`.
    pub paths: Vec<PathBuf>,
    /// Primary channel error that caused a fallback.
    pub primary_error: Option<String>,
}

/// Primary channel with mandatory local fallback.
#[derive(Clone)]
pub struct Publisher {
    primary: Option<Arc<dyn PublishChannel>>,
    root: PathBuf,
}

impl Publisher {
    /// Local-only publisher writing under `root`.
    pub fn local(root: impl Into<PathBuf>) -> Self {
        Self {
            primary: None,
            root: root.into(),
        }
    }

    pub fn with_primary(mut self, channel: Arc<dyn PublishChannel>) -> Self {
        self.primary = Some(channel);
        self
    }

    /// GitHub when token and repo are configured, else local only.
    pub fn from_config(config: &PublishConfig, root: impl Into<PathBuf>) -> Self {
        let publisher = Self::local(root);
        match GitHubChannel::from_config(config) {
            Some(Ok(channel)) => {
                info!(repo = %channel.repo(), "publishing through pull requests");
                publisher.with_primary(Arc::new(channel))
            }
            Some(Err(err)) => {
                warn!(error = %err, "GitHub client unavailable; publishing locally");
                publisher
            }
            None => {
                info!("GITHUB_TOKEN/GITHUB_REPO not set; publishing locally");
                publisher
            }
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn publish(
        &self,
        files: &ArtifactFiles,
        metadata: &PublishMetadata,
    ) -> Result<PublishOutcome, PublishError> {
        let Some(primary) = &self.primary else {
            let paths = write_local(&self.root, files).await?;
            return Ok(PublishOutcome {
                mode: PublishMode::Local,
                url: None,
                paths,
                primary_error: None,
            });
        };

        match primary.commit(files, metadata).await {
            Ok(receipt) => {
                info!(channel = primary.name(), url = %receipt.url, "published remotely");
                Ok(PublishOutcome {
                    mode: PublishMode::RemotePr,
                    url: Some(receipt.url),
                    paths: Vec::new(),
                    primary_error: None,
                })
            }
            Err(err) => {
                let primary_error = err.to_string();
                warn!(
                    channel = primary.name(),
                    error = %primary_error,
                    "primary publish failed; writing all files locally"
                );
                match write_local(&self.root, files).await {
                    Ok(paths) => Ok(PublishOutcome {
                        mode: PublishMode::LocalFallback,
                        url: None,
                        paths,
                        primary_error: Some(primary_error),
                    }),
                    Err(local) => {
                        error!(error = %local, "local fallback failed");
                        Err(PublishError::FallbackFailed {
                            primary: primary_error,
                            source: Box::new(local),
                        })
                    }
                }
            }
        }
    }
}

async fn write_local(root: &Path, files: &ArtifactFiles) -> Result<Vec<PathBuf>, PublishError> {
    for path in files.keys() {
        check_relative_path(path).map_err(|_| PublishError::UnsafePath(path.clone()))?;
    }

    let mut written = Vec::with_capacity(files.len());
    for (relative, content) in files {
        let full = root.join(relative);
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| PublishError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        tokio::fs::write(&full, content)
            .await
            .map_err(|source| PublishError::Io {
                path: full.clone(),
                source,
            })?;
        info!(path = %full.display(), "wrote file locally");
        written.push(full);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files() -> ArtifactFiles {
        ArtifactFiles::from([
            ("Dockerfile".to_string(), "FROM alpine:3.19\n".to_string()),
            ("k8s/app.yaml".to_string(), "kind: Service\n".to_string()),
        ])
    }

    fn metadata() -> PublishMetadata {
        PublishMetadata {
            run_id: "abcd1234".into(),
            stage: StageKind::Dockerfile,
            reasoning: String::new(),
        }
    }

    #[tokio::test]
    async fn test_local_publish_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = Publisher::local(dir.path())
            .publish(&files(), &metadata())
            .await
            .unwrap();
        assert_eq!(outcome.mode, PublishMode::Local);
        assert_eq!(outcome.paths.len(), 2);
        let written = std::fs::read_to_string(dir.path().join("k8s/app.yaml")).unwrap();
        assert_eq!(written, "kind: Service\n");
    }

    #[tokio::test]
    async fn test_unsafe_path_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let bad = ArtifactFiles::from([("../escape".to_string(), "x".to_string())]);
        let err = Publisher::local(dir.path())
            .publish(&bad, &metadata())
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::UnsafePath(_)));
    }

    #[test]
    fn test_mode_names() {
        assert_eq!(PublishMode::LocalFallback.as_str(), "local_fallback");
        assert_eq!(PublishMode::RemotePr.to_string(), "remote_pr");
    }
}
