//! Analyzer contract
//!
//! The static analyzer is an external subprocess; the pipeline only needs
//! the list of issues it found (and only the *count* influences the check
//! status). Everything else in its report is carried opaquely into the
//! result document.

pub mod golangci;
pub mod mock;

pub use golangci::GolangciLintRunner;
pub use mock::MockRunner;

use crate::analyze::errors::AnalyzeError;
use crate::executors::Executor;
use crate::util::deadline::Deadline;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One finding, positioned inside the PR's unified diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub from_linter: String,
    pub text: String,
    pub file: String,
    pub line_number: u32,
    /// Position within the staged patch; findings outside the diff have none
    /// and can't be commented inline.
    #[serde(default)]
    pub hunk_pos: Option<u32>,
}

/// A configured linter to run.
#[derive(Debug, Clone)]
pub struct Linter {
    pub name: String,
    /// Relative path (from the project workdir) of the staged patch.
    pub patch_path: String,
}

/// Everything the analyzer produced for one run.
#[derive(Debug, Clone, Default)]
pub struct AnalysisReport {
    pub issues: Vec<Issue>,
    /// Raw analyzer report, stored verbatim in the result document.
    pub raw: serde_json::Value,
}

#[async_trait]
pub trait Runner: Send + Sync {
    async fn run(
        &self,
        deadline: &Deadline,
        linters: &[Linter],
        exec: &dyn Executor,
    ) -> Result<AnalysisReport, AnalyzeError>;
}
