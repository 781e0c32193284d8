//! GitHub HTTP client
//!
//! Thin REST client for the four pull-request operations the pipeline needs.
//! Errors carry enough structure for the caller to distinguish transient
//! transport failures (worth a queue retry) from permanent rejections.

use super::{CheckStatus, GithubContext, PullRequest};
use crate::util::deadline::Deadline;
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// GitHub caps status descriptions; longer ones are rejected with a 422.
const MAX_STATUS_DESC_LEN: usize = 140;

#[derive(Debug, Clone, Error)]
pub enum ClientError {
    #[error("github api error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,

    #[error("can't decode response: {0}")]
    Decode(String),
}

impl ClientError {
    /// Transient failures are recoverable; the queue should retry the job.
    /// Auth errors, missing objects and validation rejections are not.
    pub fn is_recoverable(&self) -> bool {
        match self {
            ClientError::Network(_) | ClientError::Timeout => true,
            ClientError::Api { status, .. } => *status >= 500,
            ClientError::Decode(_) => false,
        }
    }
}

pub fn is_recoverable(err: &ClientError) -> bool {
    err.is_recoverable()
}

/// One inline review comment, anchored by its position in the unified diff.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ReviewComment {
    pub path: String,
    pub position: u32,
    pub body: String,
}

#[async_trait]
pub trait Client: Send + Sync {
    async fn get_pull_request(
        &self,
        deadline: &Deadline,
        ctx: &GithubContext,
    ) -> Result<PullRequest, ClientError>;

    async fn get_pull_request_patch(
        &self,
        deadline: &Deadline,
        ctx: &GithubContext,
    ) -> Result<String, ClientError>;

    /// Places inline comments on the PR at the given head commit.
    async fn post_review(
        &self,
        deadline: &Deadline,
        ctx: &GithubContext,
        sha: &str,
        comments: &[ReviewComment],
    ) -> Result<(), ClientError>;

    /// `details_url` is attached only when non-empty; callers pass it empty
    /// for `pending` and when no web root is configured.
    async fn set_commit_status(
        &self,
        deadline: &Deadline,
        ctx: &GithubContext,
        sha: &str,
        status: CheckStatus,
        description: &str,
        details_url: &str,
    ) -> Result<(), ClientError>;
}

/// REST client against `https://api.github.com` (or a test override).
pub struct GithubClient {
    base_url: String,
    status_context: String,
    http: reqwest::Client,
}

impl GithubClient {
    pub fn new(base_url: impl Into<String>, status_context: impl Into<String>) -> Self {
        Self::with_timeout(
            base_url,
            status_context,
            Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        )
    }

    pub fn with_timeout(
        base_url: impl Into<String>,
        status_context: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("prcheck/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            status_context: status_context.into(),
            http,
        }
    }

    fn pull_url(&self, ctx: &GithubContext) -> String {
        format!(
            "{}/repos/{}/{}/pulls/{}",
            self.base_url, ctx.repo.owner, ctx.repo.name, ctx.pull_request_number
        )
    }

    fn map_transport(err: reqwest::Error) -> ClientError {
        if err.is_timeout() {
            ClientError::Timeout
        } else {
            ClientError::Network(err.to_string())
        }
    }

    async fn check_status_code(resp: reqwest::Response) -> Result<reqwest::Response, ClientError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let message = resp.text().await.unwrap_or_default();
        Err(ClientError::Api {
            status: status.as_u16(),
            message,
        })
    }

    async fn send(
        &self,
        deadline: &Deadline,
        req: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, ClientError> {
        let resp = deadline
            .bound(req.send())
            .await
            .map_err(|_| ClientError::Timeout)?
            .map_err(Self::map_transport)?;
        Self::check_status_code(resp).await
    }
}

#[async_trait]
impl Client for GithubClient {
    async fn get_pull_request(
        &self,
        deadline: &Deadline,
        ctx: &GithubContext,
    ) -> Result<PullRequest, ClientError> {
        let url = self.pull_url(ctx);
        debug!(%url, "fetching pull request");

        let resp = self
            .send(
                deadline,
                self.http
                    .get(&url)
                    .header("Authorization", format!("token {}", ctx.access_token))
                    .header("Accept", "application/vnd.github.v3+json"),
            )
            .await?;

        resp.json::<PullRequest>()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))
    }

    async fn get_pull_request_patch(
        &self,
        deadline: &Deadline,
        ctx: &GithubContext,
    ) -> Result<String, ClientError> {
        let url = self.pull_url(ctx);
        debug!(%url, "fetching pull request patch");

        let resp = self
            .send(
                deadline,
                self.http
                    .get(&url)
                    .header("Authorization", format!("token {}", ctx.access_token))
                    .header("Accept", "application/vnd.github.v3.patch"),
            )
            .await?;

        resp.text().await.map_err(Self::map_transport)
    }

    async fn post_review(
        &self,
        deadline: &Deadline,
        ctx: &GithubContext,
        sha: &str,
        comments: &[ReviewComment],
    ) -> Result<(), ClientError> {
        if comments.is_empty() {
            return Ok(());
        }

        let url = format!("{}/reviews", self.pull_url(ctx));
        let body = serde_json::json!({
            "commit_id": sha,
            "event": "COMMENT",
            "comments": comments,
        });

        self.send(
            deadline,
            self.http
                .post(&url)
                .header("Authorization", format!("token {}", ctx.access_token))
                .header("Accept", "application/vnd.github.v3+json")
                .json(&body),
        )
        .await?;
        Ok(())
    }

    async fn set_commit_status(
        &self,
        deadline: &Deadline,
        ctx: &GithubContext,
        sha: &str,
        status: CheckStatus,
        description: &str,
        details_url: &str,
    ) -> Result<(), ClientError> {
        let url = format!(
            "{}/repos/{}/{}/statuses/{}",
            self.base_url, ctx.repo.owner, ctx.repo.name, sha
        );

        let description: String = description.chars().take(MAX_STATUS_DESC_LEN).collect();

        let mut body = serde_json::json!({
            "state": status,
            "description": description,
            "context": self.status_context,
        });
        if !details_url.is_empty() {
            body["target_url"] = serde_json::Value::String(details_url.to_string());
        }

        self.send(
            deadline,
            self.http
                .post(&url)
                .header("Authorization", format!("token {}", ctx.access_token))
                .header("Accept", "application/vnd.github.v3+json")
                .json(&body),
        )
        .await?;
        Ok(())
    }
}
