//! Sandboxed command execution
//!
//! An [`Executor`] bundles a working directory, environment overrides and a
//! command runner. Executors are *derivable*: `with_env` and `with_work_dir`
//! return an independent copy, so a provisioner can hand the pipeline an
//! executor pointing into the prepared project without mutating the one the
//! pipeline owns for cleanup.

pub mod mock;
pub mod temp_dir;

pub use mock::MockExecutor;
pub use temp_dir::TempDirExecutor;

use crate::util::deadline::Deadline;
use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("can't spawn {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} failed with code {code:?}: {stderr}")]
    Failed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("{command} timed out")]
    TimedOut { command: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A capability for running commands inside one job's sandbox.
///
/// Implementations must be cheap to derive; mutations on a derived executor
/// are never visible in the parent.
#[async_trait]
pub trait Executor: Send + Sync {
    /// The directory commands run in.
    fn work_dir(&self) -> &Path;

    /// Runs a command to completion and returns its stdout.
    ///
    /// The deadline bounds the subprocess: on expiry the child is killed and
    /// `ExecError::TimedOut` is returned.
    async fn run(&self, deadline: &Deadline, name: &str, args: &[&str])
        -> Result<String, ExecError>;

    /// Copies an absolute `src` to `dst` resolved relative to the work dir.
    async fn copy_file(&self, deadline: &Deadline, dst: &str, src: &Path) -> Result<(), ExecError>;

    /// Returns a derived executor with one more env override (last write wins).
    fn with_env(&self, key: &str, value: &str) -> Box<dyn Executor>;

    /// Returns a derived executor rooted at `path`.
    fn with_work_dir(&self, path: &Path) -> Box<dyn Executor>;

    /// Releases the sandbox. Idempotent; errors are logged, not returned.
    fn clean(&self);
}
