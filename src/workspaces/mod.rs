//! Workspace provisioning
//!
//! A provisioner turns a fetched repository into a ready-to-analyze build
//! environment: a derived executor rooted in the project directory with the
//! right environment, plus a structured log of the preparation steps whose
//! failures the pipeline surfaces as public warnings.
//!
//! Two interchangeable strategies exist. [`GoWorkspace`] prepares the
//! environment in-process; [`EnvBuildWorkspace`] delegates to the external
//! `goenvbuild` tool. Selection is per repository via the `new_pr_prepare`
//! experiment.

pub mod envbuild;
pub mod golang;
pub mod mock;

pub use envbuild::EnvBuildWorkspace;
pub use golang::GoWorkspace;
pub use mock::MockProvisioner;

use crate::executors::{ExecError, Executor};
use crate::fetchers::{FetchError, Repo};
use crate::util::deadline::Deadline;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One step of a provisioning group; a non-empty `error` becomes a public
/// warning on the analysis.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogStep {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogGroup {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub steps: Vec<LogStep>,
}

/// Tree of preparation steps, grouped by phase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredLog {
    #[serde(default)]
    pub groups: Vec<LogGroup>,
}

impl StructuredLog {
    /// Yields `(group name, step description, step error)` for every step
    /// that recorded an error.
    pub fn step_errors(&self) -> impl Iterator<Item = (&str, &str, &str)> {
        self.groups.iter().flat_map(|group| {
            group
                .steps
                .iter()
                .filter(|step| !step.error.is_empty())
                .map(move |step| {
                    (
                        group.name.as_str(),
                        step.description.as_str(),
                        step.error.as_str(),
                    )
                })
        })
    }
}

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The build-environment tool reported an internal failure.
    #[error("build environment setup failed: {0}")]
    Build(String),

    #[error("can't decode build environment result: {0}")]
    Decode(String),

    #[error(transparent)]
    Subprocess(#[from] ExecError),
}

/// A ready-to-run environment handed back to the pipeline.
pub struct Provisioned {
    /// Derived executor rooted at the project directory.
    pub exec: Box<dyn Executor>,
    pub log: StructuredLog,
}

impl std::fmt::Debug for Provisioned {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provisioned")
            .field("exec", &"<dyn Executor>")
            .field("log", &self.log)
            .finish()
    }
}

#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Fetches `repo` and prepares a build environment on top of `base`.
    ///
    /// `project_path_parts` joined form the canonical project path (e.g.
    /// `["github.com", "owner", "name"]`).
    async fn setup(
        &self,
        deadline: &Deadline,
        repo: &Repo,
        base: &dyn Executor,
        project_path_parts: &[&str],
    ) -> Result<Provisioned, ProvisionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_errors_walks_tree() {
        let log = StructuredLog {
            groups: vec![
                LogGroup {
                    name: "clone".to_string(),
                    steps: vec![LogStep {
                        description: "git fetch".to_string(),
                        error: String::new(),
                    }],
                },
                LogGroup {
                    name: "dependencies".to_string(),
                    steps: vec![
                        LogStep {
                            description: "go mod download".to_string(),
                            error: "module x: checksum mismatch".to_string(),
                        },
                        LogStep {
                            description: "vendor check".to_string(),
                            error: "vendor dir inconsistent".to_string(),
                        },
                    ],
                },
            ],
        };

        let errors: Vec<_> = log.step_errors().collect();
        assert_eq!(
            errors,
            vec![
                ("dependencies", "go mod download", "module x: checksum mismatch"),
                ("dependencies", "vendor check", "vendor dir inconsistent"),
            ]
        );
    }

    #[test]
    fn test_empty_log_has_no_step_errors() {
        assert_eq!(StructuredLog::default().step_errors().count(), 0);
    }
}
