use super::{FetchError, Repo, RepoFetcher};
use crate::executors::{ExecError, Executor};
use crate::util::deadline::Deadline;
use async_trait::async_trait;
use tracing::{debug, info};

/// Stderr fragments that mean the repo or ref is gone, not that the network
/// hiccuped.
const FATAL_FRAGMENTS: &[&str] = &[
    "repository not found",
    "could not read username",
    "remote branch",
    "authentication failed",
    "access denied",
];

/// Fetches repositories with the `git` binary.
///
/// Tries a cheap shallow clone of the head ref first; if the ref is not a
/// branch head (e.g. a tag or a force-pushed branch) falls back to a full
/// clone plus checkout.
#[derive(Debug, Default)]
pub struct GitFetcher;

impl GitFetcher {
    pub fn new() -> Self {
        Self
    }

    fn is_fatal(stderr: &str) -> bool {
        let lower = stderr.to_lowercase();
        FATAL_FRAGMENTS.iter().any(|f| lower.contains(f))
    }
}

#[async_trait]
impl RepoFetcher for GitFetcher {
    async fn fetch(
        &self,
        deadline: &Deadline,
        repo: &Repo,
        exec: &dyn Executor,
    ) -> Result<(), FetchError> {
        info!(repo = %repo.full_path, ref_name = %repo.ref_name, "cloning repository");

        let shallow = exec
            .run(
                deadline,
                "git",
                &[
                    "clone",
                    "--depth",
                    "1",
                    "--branch",
                    &repo.ref_name,
                    &repo.clone_url,
                    ".",
                ],
            )
            .await;

        let stderr = match shallow {
            Ok(_) => return Ok(()),
            Err(ExecError::Failed { stderr, .. }) => stderr,
            Err(e) => return Err(e.into()),
        };

        if Self::is_fatal(&stderr) {
            return Err(FetchError::NoBranchOrRepo {
                url: repo.full_path.clone(),
                ref_name: repo.ref_name.clone(),
                detail: stderr,
            });
        }

        debug!(ref_name = %repo.ref_name, "shallow clone failed, retrying full clone");
        exec.run(deadline, "git", &["clone", &repo.clone_url, "."])
            .await?;
        exec.run(deadline, "git", &["checkout", &repo.ref_name])
            .await
            .map_err(|e| match e {
                ExecError::Failed { stderr, .. } => FetchError::NoBranchOrRepo {
                    url: repo.full_path.clone(),
                    ref_name: repo.ref_name.clone(),
                    detail: stderr,
                },
                other => other.into(),
            })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executors::mock::{MockExecutor, MockRunResult};
    use std::time::Duration;

    fn test_repo() -> Repo {
        Repo {
            clone_url: "https://github.com/owner/name.git".to_string(),
            ref_name: "feature-branch".to_string(),
            full_path: "github.com/owner/name".to_string(),
        }
    }

    #[tokio::test]
    async fn test_shallow_clone_of_head_ref() {
        let exec = MockExecutor::new("/sandbox");
        let deadline = Deadline::after(Duration::from_secs(5));

        GitFetcher::new()
            .fetch(&deadline, &test_repo(), &exec)
            .await
            .unwrap();

        let commands = exec.commands();
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].name, "git");
        assert_eq!(
            commands[0].args,
            vec![
                "clone",
                "--depth",
                "1",
                "--branch",
                "feature-branch",
                "https://github.com/owner/name.git",
                "."
            ]
        );
    }

    #[tokio::test]
    async fn test_falls_back_to_full_clone() {
        let exec = MockExecutor::new("/sandbox");
        exec.add_response(MockRunResult::Fail {
            code: 128,
            stderr: "fatal: dumb http transport does not support shallow capabilities".to_string(),
        });
        let deadline = Deadline::after(Duration::from_secs(5));

        GitFetcher::new()
            .fetch(&deadline, &test_repo(), &exec)
            .await
            .unwrap();

        let commands = exec.commands();
        assert_eq!(commands.len(), 3);
        assert_eq!(commands[1].args[0], "clone");
        assert_eq!(commands[2].args, vec!["checkout", "feature-branch"]);
    }

    #[tokio::test]
    async fn test_missing_repo_is_fatal() {
        let exec = MockExecutor::new("/sandbox");
        exec.add_response(MockRunResult::Fail {
            code: 128,
            stderr: "remote: Repository not found.".to_string(),
        });
        let deadline = Deadline::after(Duration::from_secs(5));

        let err = GitFetcher::new()
            .fetch(&deadline, &test_repo(), &exec)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::NoBranchOrRepo { .. }));
        // No fallback clone was attempted.
        assert_eq!(exec.commands().len(), 1);
    }
}
