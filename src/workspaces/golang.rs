use super::{LogGroup, LogStep, Provisioned, ProvisionError, Provisioner, StructuredLog};
use crate::executors::{ExecError, Executor};
use crate::fetchers::{Repo, RepoFetcher};
use crate::util::deadline::Deadline;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

/// In-process provisioner building a GOPATH-style layout.
///
/// The repo is cloned into `<sandbox>/src/<project path>`; dependencies are
/// ensured with the `go` toolchain. Dependency failures are not fatal - the
/// analyzer can often still produce useful results - so they are recorded as
/// structured-log step errors and surfaced as public warnings.
pub struct GoWorkspace {
    fetcher: Arc<dyn RepoFetcher>,
}

impl GoWorkspace {
    pub fn new(fetcher: Arc<dyn RepoFetcher>) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl Provisioner for GoWorkspace {
    async fn setup(
        &self,
        deadline: &Deadline,
        repo: &Repo,
        base: &dyn Executor,
        project_path_parts: &[&str],
    ) -> Result<Provisioned, ProvisionError> {
        let gopath = base.work_dir().to_path_buf();
        let mut project_dir = gopath.join("src");
        for part in project_path_parts {
            project_dir = project_dir.join(part);
        }

        tokio::fs::create_dir_all(&project_dir).await.map_err(ExecError::Io)?;
        info!(project = %project_dir.display(), "preparing go workspace");

        let project_exec = base
            .with_work_dir(&project_dir)
            .with_env("GOPATH", &gopath.to_string_lossy())
            .with_env("GO111MODULE", "on");

        self.fetcher.fetch(deadline, repo, project_exec.as_ref()).await?;

        let mut log = StructuredLog::default();
        let mut deps_step = LogStep {
            description: "ensure dependencies".to_string(),
            error: String::new(),
        };

        match project_exec.run(deadline, "go", &["mod", "download"]).await {
            Ok(_) => {}
            Err(ExecError::Failed { stderr, .. }) => {
                warn!(error = %stderr, "dependency download failed, continuing");
                deps_step.error = stderr;
            }
            Err(e) => {
                warn!(error = %e, "dependency download failed, continuing");
                deps_step.error = e.to_string();
            }
        }

        log.groups.push(LogGroup {
            name: "dependencies".to_string(),
            steps: vec![deps_step],
        });

        Ok(Provisioned {
            exec: project_exec,
            log,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executors::mock::{MockExecutor, MockRunResult};
    use crate::executors::TempDirExecutor;
    use crate::fetchers::MockFetcher;
    use std::time::Duration;

    fn test_repo() -> Repo {
        Repo {
            clone_url: "https://github.com/owner/name.git".to_string(),
            ref_name: "main".to_string(),
            full_path: "github.com/owner/name".to_string(),
        }
    }

    #[tokio::test]
    async fn test_setup_builds_gopath_layout() {
        // A real sandbox so create_dir_all has somewhere to work.
        let base = TempDirExecutor::new("ws-test").unwrap();
        let sandbox = base.sandbox().to_path_buf();
        let recorder = MockExecutor::new(&sandbox);
        let fetcher = Arc::new(MockFetcher::new());

        let ws = GoWorkspace::new(Arc::clone(&fetcher) as Arc<_>);
        let deadline = Deadline::after(Duration::from_secs(5));
        let provisioned = ws
            .setup(
                &deadline,
                &test_repo(),
                &recorder,
                &["github.com", "owner", "name"],
            )
            .await
            .unwrap();

        let project_dir = sandbox.join("src/github.com/owner/name");
        assert!(project_dir.exists());
        assert_eq!(provisioned.exec.work_dir(), project_dir.as_path());
        assert_eq!(fetcher.fetched(), vec![test_repo()]);

        let commands = recorder.commands();
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].name, "go");
        assert_eq!(commands[0].args, vec!["mod", "download"]);
        assert!(commands[0]
            .env
            .contains(&("GOPATH".to_string(), sandbox.to_string_lossy().to_string())));
        assert!(commands[0]
            .env
            .contains(&("GO111MODULE".to_string(), "on".to_string())));

        // No dependency problems: the log carries an empty step error.
        assert_eq!(provisioned.log.step_errors().count(), 0);
        base.clean();
    }

    #[tokio::test]
    async fn test_dependency_failure_becomes_log_step() {
        let base = TempDirExecutor::new("ws-test").unwrap();
        let recorder = MockExecutor::new(base.sandbox());
        recorder.add_response(MockRunResult::Fail {
            code: 1,
            stderr: "go: module example.com/x: not found".to_string(),
        });

        let ws = GoWorkspace::new(Arc::new(MockFetcher::new()));
        let deadline = Deadline::after(Duration::from_secs(5));
        let provisioned = ws
            .setup(
                &deadline,
                &test_repo(),
                &recorder,
                &["github.com", "owner", "name"],
            )
            .await
            .unwrap();

        let errors: Vec<_> = provisioned.log.step_errors().collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].0, "dependencies");
        assert!(errors[0].2.contains("not found"));
        base.clean();
    }

    #[tokio::test]
    async fn test_fetch_failure_is_fatal() {
        let base = TempDirExecutor::new("ws-test").unwrap();
        let recorder = MockExecutor::new(base.sandbox());

        let ws = GoWorkspace::new(Arc::new(MockFetcher::new().fail_with("gone")));
        let deadline = Deadline::after(Duration::from_secs(5));
        let err = ws
            .setup(
                &deadline,
                &test_repo(),
                &recorder,
                &["github.com", "owner", "name"],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::Fetch(_)));
        base.clean();
    }
}
