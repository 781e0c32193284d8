//! Configuration management for the analysis worker
//!
//! Settings are loaded from environment variables with sensible defaults.
//! Configuration covers the state-store API, the details-link web root,
//! the GitHub endpoint and the worker's concurrency.
//!
//! # Environment Variables
//!
//! - `API_URL`: base URL of the state-store API (required)
//! - `WEB_ROOT`: base URL used to build commit-status details links - default: ""
//! - `GITHUB_API_URL`: GitHub API endpoint - default: "https://api.github.com"
//! - `PRCHECK_STATUS_CONTEXT`: commit-status context name - default: "prcheck"
//! - `PRCHECK_CONCURRENCY`: queue consumers in one process - default: "1"
//! - `PRCHECK_LOG_LEVEL`: logging level - default: "info"
//! - `PRCHECK_REQUEST_TIMEOUT`: HTTP timeout in seconds - default: "30"

use std::env;
use thiserror::Error;

const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";
const DEFAULT_STATUS_CONTEXT: &str = "prcheck";
const DEFAULT_CONCURRENCY: usize = 1;
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// State-store API URL not set
    #[error("state-store API URL not set. Please set the API_URL environment variable")]
    MissingApiUrl,

    /// Invalid endpoint URL format
    #[error("invalid endpoint URL: {0}")]
    InvalidEndpoint(String),

    /// Failed to parse a configuration value
    #[error("failed to parse {field}: {error}")]
    ParseError { field: String, error: String },
}

/// Main configuration for one worker process
///
/// Constructed with [`WorkerConfig::from_env`], which reads every setting
/// from the environment with fallback defaults. Read-only after init.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Base URL of the state-store API
    pub api_url: String,

    /// Base URL for commit-status details links; empty means no link
    pub web_root: String,

    /// GitHub API endpoint
    pub github_api_url: String,

    /// Context string attached to commit statuses
    pub status_context: String,

    /// Number of queue consumers in this process
    pub concurrency: usize,

    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,

    /// HTTP request timeout in seconds
    pub request_timeout_secs: u64,
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let concurrency = match env::var("PRCHECK_CONCURRENCY") {
            Ok(v) => v.parse::<usize>().map_err(|e| ConfigError::ParseError {
                field: "PRCHECK_CONCURRENCY".to_string(),
                error: e.to_string(),
            })?,
            Err(_) => DEFAULT_CONCURRENCY,
        };

        let request_timeout_secs = match env::var("PRCHECK_REQUEST_TIMEOUT") {
            Ok(v) => v.parse::<u64>().map_err(|e| ConfigError::ParseError {
                field: "PRCHECK_REQUEST_TIMEOUT".to_string(),
                error: e.to_string(),
            })?,
            Err(_) => DEFAULT_REQUEST_TIMEOUT_SECS,
        };

        Ok(Self {
            api_url: env::var("API_URL").unwrap_or_default(),
            web_root: env::var("WEB_ROOT").unwrap_or_default(),
            github_api_url: env::var("GITHUB_API_URL")
                .unwrap_or_else(|_| DEFAULT_GITHUB_API_URL.to_string()),
            status_context: env::var("PRCHECK_STATUS_CONTEXT")
                .unwrap_or_else(|_| DEFAULT_STATUS_CONTEXT.to_string()),
            concurrency,
            log_level: env::var("PRCHECK_LOG_LEVEL").unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string()),
            request_timeout_secs,
        })
    }

    /// Validates the configuration, returning the first problem found
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_url.is_empty() {
            return Err(ConfigError::MissingApiUrl);
        }
        if !self.api_url.starts_with("http://") && !self.api_url.starts_with("https://") {
            return Err(ConfigError::InvalidEndpoint(self.api_url.clone()));
        }
        if !self.github_api_url.starts_with("http://") && !self.github_api_url.starts_with("https://")
        {
            return Err(ConfigError::InvalidEndpoint(self.github_api_url.clone()));
        }
        Ok(())
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            api_url: String::new(),
            web_root: String::new(),
            github_api_url: DEFAULT_GITHUB_API_URL.to_string(),
            status_context: DEFAULT_STATUS_CONTEXT.to_string(),
            concurrency: DEFAULT_CONCURRENCY,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}
