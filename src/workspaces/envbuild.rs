use super::{Provisioned, ProvisionError, Provisioner, StructuredLog};
use crate::executors::Executor;
use crate::fetchers::{Repo, RepoFetcher};
use crate::util::deadline::Deadline;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Stdout document of the external build tool.
#[derive(Debug, Deserialize)]
struct EnvBuildResult {
    #[serde(default)]
    workdir: String,
    #[serde(default)]
    environment: std::collections::BTreeMap<String, String>,
    #[serde(default)]
    log: StructuredLog,
    #[serde(default)]
    error: String,
}

/// Provisioner delegating environment preparation to `goenvbuild`.
///
/// The tool receives the project path via `REPO`, emits a single JSON
/// document on stdout and is trusted to lay out the workdir itself. A
/// non-empty `error` field (or a non-zero exit) is a terminal provisioning
/// failure.
pub struct EnvBuildWorkspace {
    fetcher: Arc<dyn RepoFetcher>,
}

impl EnvBuildWorkspace {
    pub fn new(fetcher: Arc<dyn RepoFetcher>) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl Provisioner for EnvBuildWorkspace {
    async fn setup(
        &self,
        deadline: &Deadline,
        repo: &Repo,
        base: &dyn Executor,
        project_path_parts: &[&str],
    ) -> Result<Provisioned, ProvisionError> {
        self.fetcher.fetch(deadline, repo, base).await?;

        let project_path = project_path_parts.join("/");
        info!(project = %project_path, "running goenvbuild");

        let exec = base
            .with_env("REPO", &project_path)
            .with_env("FORMAT_JSON", "1");
        let out = exec.run(deadline, "goenvbuild", &[]).await?;

        let result: EnvBuildResult =
            serde_json::from_str(&out).map_err(|e| ProvisionError::Decode(e.to_string()))?;
        debug!(workdir = %result.workdir, steps = result.log.groups.len(), "goenvbuild finished");

        if !result.error.is_empty() {
            return Err(ProvisionError::Build(result.error));
        }

        let mut ready = base.with_work_dir(Path::new(&result.workdir));
        for (k, v) in &result.environment {
            ready = ready.with_env(k, v);
        }

        Ok(Provisioned {
            exec: ready,
            log: result.log,
        })
    }
}
