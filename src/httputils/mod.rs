//! Minimal JSON HTTP seam
//!
//! The state store talks to a remote API through this trait so tests can
//! substitute an in-memory double. Transport errors bubble unmodified.

pub mod mock;

pub use mock::MockHttpClient;

use crate::util::deadline::Deadline;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum HttpError {
    #[error("unable to make {method} http request {url}: {detail}")]
    Request {
        method: &'static str,
        url: String,
        detail: String,
    },

    #[error("got error code from {url}: {status}")]
    Status { url: String, status: u16 },

    #[error("can't read json body from {url}: {detail}")]
    Decode { url: String, detail: String },
}

#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn get_json(&self, deadline: &Deadline, url: &str)
        -> Result<serde_json::Value, HttpError>;

    async fn put_json(
        &self,
        deadline: &Deadline,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<(), HttpError>;
}

/// [`HttpClient`] backed by a pooled reqwest client.
pub struct ReqwestHttpClient {
    http: reqwest::Client,
}

impl ReqwestHttpClient {
    pub fn new(timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("prcheck/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("Failed to build HTTP client");
        Self { http }
    }
}

impl Default for ReqwestHttpClient {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn get_json(
        &self,
        deadline: &Deadline,
        url: &str,
    ) -> Result<serde_json::Value, HttpError> {
        let resp = deadline
            .bound(self.http.get(url).send())
            .await
            .map_err(|e| HttpError::Request {
                method: "GET",
                url: url.to_string(),
                detail: e.to_string(),
            })?
            .map_err(|e| HttpError::Request {
                method: "GET",
                url: url.to_string(),
                detail: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(HttpError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        resp.json().await.map_err(|e| HttpError::Decode {
            url: url.to_string(),
            detail: e.to_string(),
        })
    }

    async fn put_json(
        &self,
        deadline: &Deadline,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<(), HttpError> {
        let resp = deadline
            .bound(self.http.put(url).json(body).send())
            .await
            .map_err(|e| HttpError::Request {
                method: "PUT",
                url: url.to_string(),
                detail: e.to_string(),
            })?
            .map_err(|e| HttpError::Request {
                method: "PUT",
                url: url.to_string(),
                detail: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(HttpError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        Ok(())
    }
}
