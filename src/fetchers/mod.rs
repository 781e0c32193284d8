//! Repository fetching
//!
//! Turns a `{clone URL, ref}` pair into a checked-out working tree inside an
//! executor's sandbox.

pub mod git;
pub mod mock;

pub use git::GitFetcher;
pub use mock::MockFetcher;

use crate::executors::{ExecError, Executor};
use crate::util::deadline::Deadline;
use async_trait::async_trait;
use thiserror::Error;

/// What to fetch and where it canonically lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repo {
    /// Non-empty clone URL, possibly carrying an access token.
    pub clone_url: String,
    /// Head ref of the pull request.
    pub ref_name: String,
    /// Canonical import path, e.g. `github.com/owner/name`.
    pub full_path: String,
}

#[derive(Debug, Error)]
pub enum FetchError {
    /// The remote rejected us: missing repository, deleted branch, bad auth.
    #[error("can't fetch {url} at {ref_name}: {detail}")]
    NoBranchOrRepo {
        url: String,
        ref_name: String,
        detail: String,
    },

    #[error("clone failed: {0}")]
    Subprocess(#[from] ExecError),
}

#[async_trait]
pub trait RepoFetcher: Send + Sync {
    /// Fetches `repo` into the executor's working directory.
    async fn fetch(
        &self,
        deadline: &Deadline,
        repo: &Repo,
        exec: &dyn Executor,
    ) -> Result<(), FetchError>;
}
