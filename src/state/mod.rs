//! Persisted analysis state
//!
//! One [`State`] record exists per analysis GUID. It is created upstream at
//! enqueue time with status `sent_to_queue`, advanced to `processing` on the
//! first pipeline touch, and written exactly once more with a terminal
//! `processed/<check-status>` before the pipeline returns.

pub mod api_storage;
pub mod mock;

pub use api_storage::{ApiStorage, Storage};
pub use mock::MockStorage;

use crate::github::CheckStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const STATUS_SENT_TO_QUEUE: &str = "sent_to_queue";
pub const STATUS_PROCESSING: &str = "processing";

/// Terminal status encoding: `processed/` plus the lowercase check status.
pub fn processed_status(status: CheckStatus) -> String {
    format!("processed/{status}")
}

/// Wall-clock duration of one pipeline stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Timing {
    pub name: String,
    pub duration_ms: u64,
}

impl Timing {
    pub fn new(name: impl Into<String>, duration: Duration) -> Self {
        Self {
            name: name.into(),
            duration_ms: duration.as_millis() as u64,
        }
    }
}

/// A user-visible warning attached to one stage. Text must already be
/// redacted when constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Warning {
    pub tag: String,
    pub text: String,
}

/// What the worker itself contributes to the result document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct WorkerRes {
    #[serde(default)]
    pub timings: Vec<Timing>,
    #[serde(default)]
    pub warnings: Vec<Warning>,
    #[serde(default)]
    pub error: String,
}

/// Versioned result document stored with the analysis state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AnalysisResultDoc {
    pub version: u32,
    /// Raw analyzer report; opaque to the worker.
    #[serde(default)]
    pub lint_res: serde_json::Value,
    pub worker_res: WorkerRes,
}

/// The persisted record for one analysis attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct State {
    pub status: String,
    #[serde(default)]
    pub reported_issues_count: u64,
    #[serde(default)]
    pub result_json: Option<AnalysisResultDoc>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl State {
    pub fn is_terminal(&self) -> bool {
        self.status.starts_with("processed/")
    }
}
