//! GitHub pull-request publish channel.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use reqwest::{header, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use super::{PublishChannel, PublishError, PublishMetadata, PublishReceipt};
use crate::artifacts::ArtifactFiles;
use crate::config::PublishConfig;

const REASONING_LIMIT: usize = 1000;

#[derive(Debug, Deserialize)]
struct RefObject {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct RefResponse {
    object: RefObject,
}

#[derive(Debug, Deserialize)]
struct ContentResponse {
    sha: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PullResponse {
    html_url: String,
}

/// Branch + per-file commit + pull request over the GitHub REST API.
pub struct GitHubChannel {
    client: reqwest::Client,
    api_base: String,
    repo: String,
    base_branch: String,
}

impl GitHubChannel {
    pub fn new(
        api_base: &str,
        repo: &str,
        token: &str,
        base_branch: &str,
    ) -> Result<Self, PublishError> {
        let mut headers = header::HeaderMap::new();
        let auth = header::HeaderValue::from_str(&format!("token {token}"))
            .map_err(|e| PublishError::Primary(format!("invalid token header: {e}")))?;
        headers.insert(header::AUTHORIZATION, auth);
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/vnd.github.v3+json"),
        );
        headers.insert(
            "X-GitHub-Api-Version",
            header::HeaderValue::from_static("2022-11-28"),
        );

        let client = reqwest::Client::builder()
            .user_agent(concat!("infradraft/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .timeout(Duration::from_secs(15))
            .build()?;

        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            repo: repo.to_string(),
            base_branch: base_branch.to_string(),
        })
    }

    /// `None` when token or repo is missing.
    pub fn from_config(config: &PublishConfig) -> Option<Result<Self, PublishError>> {
        let (token, repo) = (config.github_token.as_ref()?, config.github_repo.as_ref()?);
        Some(Self::new(&config.api_base, repo, token, &config.base_branch))
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }

    fn url(&self, path: &str) -> String {
        format!("{}/repos/{}/{}", self.api_base, self.repo, path)
    }

    async fn base_sha(&self) -> Result<String, PublishError> {
        let resp = self
            .client
            .get(self.url(&format!("git/ref/heads/{}", self.base_branch)))
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.json::<RefResponse>().await?.object.sha)
    }

    async fn create_branch(&self, branch: &str, sha: &str) -> Result<(), PublishError> {
        let resp = self
            .client
            .post(self.url("git/refs"))
            .json(&json!({ "ref": format!("refs/heads/{branch}"), "sha": sha }))
            .send()
            .await?;
        if resp.status() == StatusCode::UNPROCESSABLE_ENTITY {
            warn!(branch, "branch already exists; reusing");
            return Ok(());
        }
        resp.error_for_status()?;
        Ok(())
    }

    async fn put_file(
        &self,
        branch: &str,
        path: &str,
        content: &str,
        metadata: &PublishMetadata,
    ) -> Result<(), PublishError> {
        let url = self.url(&format!("contents/{path}"));
        let existing = self
            .client
            .get(&url)
            .query(&[("ref", branch)])
            .send()
            .await?;
        let sha = if existing.status().is_success() {
            existing.json::<ContentResponse>().await?.sha
        } else {
            None
        };

        let mut body = json!({
            "message": format!("[{}] generated by infradraft (run:{})", metadata.stage, metadata.run_id),
            "content": base64::engine::general_purpose::STANDARD.encode(content),
            "branch": branch,
        });
        if let Some(sha) = sha {
            body["sha"] = json!(sha);
        }
        self.client
            .put(&url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        info!(path, branch, "committed file");
        Ok(())
    }

    async fn open_pull(
        &self,
        branch: &str,
        files: &ArtifactFiles,
        metadata: &PublishMetadata,
    ) -> Result<String, PublishError> {
        let body = pull_body(files, metadata);
        let resp = self
            .client
            .post(self.url("pulls"))
            .json(&json!({
                "title": format!("[infradraft] {} (run:{})", metadata.stage.display_name(), metadata.run_id),
                "head": branch,
                "base": self.base_branch,
                "body": body,
            }))
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.json::<PullResponse>().await?.html_url)
    }
}

pub fn branch_name(metadata: &PublishMetadata) -> String {
    format!("infradraft/{}/{}", metadata.run_id, metadata.stage.key())
}

fn pull_body(files: &ArtifactFiles, metadata: &PublishMetadata) -> String {
    let listing: Vec<String> = files.keys().map(|f| format!("- `{f}`")).collect();
    let reasoning = if metadata.reasoning.is_empty() {
        "N/A".to_string()
    } else {
        metadata.reasoning.chars().take(REASONING_LIMIT).collect()
    };
    format!(
        "## infradraft: {}\n\n**Run ID:** `{}`\n**Generated at:** {}\n\n### Files\n{}\n\n### Reasoning\n{}\n",
        metadata.stage.display_name(),
        metadata.run_id,
        chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC"),
        listing.join("\n"),
        reasoning,
    )
}

#[async_trait]
impl PublishChannel for GitHubChannel {
    fn name(&self) -> &str {
        "github"
    }

    async fn commit(
        &self,
        files: &ArtifactFiles,
        metadata: &PublishMetadata,
    ) -> Result<PublishReceipt, PublishError> {
        let branch = branch_name(metadata);
        let sha = self.base_sha().await?;
        self.create_branch(&branch, &sha).await?;
        for (path, content) in files {
            self.put_file(&branch, path, content, metadata).await?;
        }
        let url = self.open_pull(&branch, files, metadata).await?;
        info!(url = %url, "pull request opened");
        Ok(PublishReceipt { url })
    }
}
