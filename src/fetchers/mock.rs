use super::{FetchError, Repo, RepoFetcher};
use crate::executors::Executor;
use crate::util::deadline::Deadline;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

/// Test double for [`RepoFetcher`]: records requested repos, optionally fails.
#[derive(Default)]
pub struct MockFetcher {
    fetched: Arc<Mutex<Vec<Repo>>>,
    fail_with: Mutex<Option<String>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_with(self, detail: impl Into<String>) -> Self {
        *self.fail_with.lock().unwrap() = Some(detail.into());
        self
    }

    pub fn fetched(&self) -> Vec<Repo> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl RepoFetcher for MockFetcher {
    async fn fetch(
        &self,
        _deadline: &Deadline,
        repo: &Repo,
        _exec: &dyn Executor,
    ) -> Result<(), FetchError> {
        if let Some(detail) = self.fail_with.lock().unwrap().clone() {
            return Err(FetchError::NoBranchOrRepo {
                url: repo.full_path.clone(),
                ref_name: repo.ref_name.clone(),
                detail,
            });
        }
        self.fetched.lock().unwrap().push(repo.clone());
        Ok(())
    }
}
