//! Pipeline driver
//!
//! [`GithubProcessor::process`] runs one job through the stages in order:
//! fetch PR, set pending status, provision the workspace, stage the patch,
//! refresh queue timing, run the analyzer, post the review, finalize. Once a
//! job is past the PR fetch, finalization always writes a terminal state
//! record and then a terminal commit status - in that order, on a fresh
//! non-cancellable deadline - regardless of failures or panics in between.

use super::collector::{build_secrets, escape_error_text, ResultCollector, SecretMap};
use super::errors::{
    panic_message, AnalyzeError, INTERNAL_ERROR_MESSAGE, NO_GO_FILES_ERR, NO_GO_FILES_MESSAGE,
    PANIC_MARKER,
};
use crate::config::WorkerConfig;
use crate::executors::{Executor, TempDirExecutor};
use crate::experiments::{EnvExperimentChecker, ExperimentChecker};
use crate::fetchers::{GitFetcher, Repo, RepoFetcher};
use crate::github::client::Client;
use crate::github::{CheckStatus, GithubClient, GithubContext, PullRequest};
use crate::httputils::ReqwestHttpClient;
use crate::linters::{AnalysisReport, GolangciLintRunner, Linter, Runner};
use crate::reporters::{GithubReviewer, Reporter};
use crate::state::api_storage::{ApiStorage, Storage};
use crate::state::{
    processed_status, AnalysisResultDoc, State, WorkerRes, STATUS_PROCESSING, STATUS_SENT_TO_QUEUE,
};
use crate::util::deadline::Deadline;
use crate::workspaces::{EnvBuildWorkspace, GoWorkspace, Provisioner};
use anyhow::{anyhow, Context as _};
use chrono::Utc;
use futures_util::FutureExt;
use std::backtrace::Backtrace;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Where the analyzer expects the staged patch, relative to the project
/// workdir (one level up, still inside the sandbox).
const PATCH_PATH: &str = "../changes.patch";

const PENDING_DESCRIPTION: &str = "Reviewing your Pull Request...";

pub const EXPERIMENT_NEW_PR_PREPARE: &str = "new_pr_prepare";
pub const EXPERIMENT_LINTER_NAME_IN_COMMENT: &str = "include_linter_name_in_comment";

/// Collaborator overrides for [`GithubProcessor::new`]. Unset slots are
/// populated with the production implementations at construction and frozen.
#[derive(Default)]
pub struct ProcessorConfig {
    pub client: Option<Arc<dyn Client>>,
    pub state: Option<Arc<dyn Storage>>,
    pub repo_fetcher: Option<Arc<dyn RepoFetcher>>,
    pub provisioner: Option<Arc<dyn Provisioner>>,
    pub runner: Option<Arc<dyn Runner>>,
    pub reporter: Option<Arc<dyn Reporter>>,
    pub linters: Option<Vec<Linter>>,
    pub exec: Option<Box<dyn Executor>>,
    pub experiments: Option<Arc<dyn ExperimentChecker>>,
}

/// Builds processors for queue jobs with production defaults.
pub struct ProcessorFactory {
    worker_config: WorkerConfig,
}

impl ProcessorFactory {
    pub fn new(worker_config: WorkerConfig) -> Self {
        Self { worker_config }
    }

    pub fn build_processor(
        &self,
        ctx: GithubContext,
        analysis_guid: String,
    ) -> anyhow::Result<GithubProcessor> {
        GithubProcessor::new(ctx, analysis_guid, ProcessorConfig::default(), &self.worker_config)
    }
}

pub struct GithubProcessor {
    ctx: GithubContext,
    analysis_guid: String,
    web_root: String,

    client: Arc<dyn Client>,
    state: Arc<dyn Storage>,
    provisioner: Arc<dyn Provisioner>,
    runner: Arc<dyn Runner>,
    reporter: Arc<dyn Reporter>,
    linters: Vec<Linter>,

    /// Base sandbox executor; owned for the job's lifetime and cleaned on
    /// every exit path.
    exec: Box<dyn Executor>,

    collector: ResultCollector,
    workspace_secrets: Vec<(String, String)>,
}

fn status_for_issues(count: usize) -> (CheckStatus, String) {
    match count {
        0 => (CheckStatus::Success, "No issues found!".to_string()),
        1 => (CheckStatus::Failure, "1 issue found".to_string()),
        n => (CheckStatus::Failure, format!("{n} issues found")),
    }
}

impl GithubProcessor {
    pub fn new(
        ctx: GithubContext,
        analysis_guid: String,
        cfg: ProcessorConfig,
        worker_config: &WorkerConfig,
    ) -> anyhow::Result<Self> {
        let experiments: Arc<dyn ExperimentChecker> = cfg
            .experiments
            .unwrap_or_else(|| Arc::new(EnvExperimentChecker::new()));

        let client: Arc<dyn Client> = match cfg.client {
            Some(client) => client,
            None => Arc::new(GithubClient::new(
                worker_config.github_api_url.clone(),
                worker_config.status_context.clone(),
            )),
        };

        let exec: Box<dyn Executor> = match cfg.exec {
            Some(exec) => exec,
            None => Box::new(TempDirExecutor::new("analyze").context("can't make executor")?),
        };

        let repo_fetcher: Arc<dyn RepoFetcher> = cfg
            .repo_fetcher
            .unwrap_or_else(|| Arc::new(GitFetcher::new()));

        let provisioner: Arc<dyn Provisioner> = match cfg.provisioner {
            Some(provisioner) => provisioner,
            None => {
                let repo_path = format!("{}", ctx.repo);
                if experiments.is_active_for_analysis(EXPERIMENT_NEW_PR_PREPARE, &repo_path, false)
                {
                    Arc::new(EnvBuildWorkspace::new(Arc::clone(&repo_fetcher)))
                        as Arc<dyn Provisioner>
                } else {
                    Arc::new(GoWorkspace::new(Arc::clone(&repo_fetcher)))
                }
            }
        };

        let reporter: Arc<dyn Reporter> = match cfg.reporter {
            Some(reporter) => reporter,
            None => {
                let repo_path = format!("{}", ctx.repo);
                let include_linter_name = experiments.is_active_for_analysis(
                    EXPERIMENT_LINTER_NAME_IN_COMMENT,
                    &repo_path,
                    false,
                );
                Arc::new(GithubReviewer::new(Arc::clone(&client), include_linter_name))
            }
        };

        let state: Arc<dyn Storage> = match cfg.state {
            Some(state) => state,
            None => Arc::new(ApiStorage::new(
                worker_config.api_url.clone(),
                Arc::new(ReqwestHttpClient::default()),
            )),
        };

        let runner: Arc<dyn Runner> = cfg
            .runner
            .unwrap_or_else(|| Arc::new(GolangciLintRunner::new()));

        let linters = cfg.linters.unwrap_or_else(|| {
            vec![Linter {
                name: "golangci-lint".to_string(),
                patch_path: PATCH_PATH.to_string(),
            }]
        });

        // The sandbox root is the GOPATH; paths under it leak into analyzer
        // output and read better as $GOPATH than as hidden.
        let workspace_secrets = vec![(
            exec.work_dir().to_string_lossy().into_owned(),
            "$GOPATH".to_string(),
        )];

        Ok(Self {
            ctx,
            analysis_guid,
            web_root: worker_config.web_root.clone(),
            client,
            state,
            provisioner,
            runner,
            reporter,
            linters,
            exec,
            collector: ResultCollector::new(),
            workspace_secrets,
        })
    }

    /// Runs the whole pipeline for one job. The returned error signals the
    /// queue whether to retry ([`AnalyzeError::is_recoverable`]).
    pub async fn process(&mut self, deadline: &Deadline) -> Result<(), AnalyzeError> {
        let result = self.process_inner(deadline).await;
        self.exec.clean();
        result
    }

    async fn process_inner(&mut self, deadline: &Deadline) -> Result<(), AnalyzeError> {
        // Stage 1: fetch the pull request. Failures here happen before any
        // state was touched, so they return without finalization.
        let pr = match self.client.get_pull_request(deadline, &self.ctx).await {
            Ok(pr) => pr,
            Err(e) if e.is_recoverable() => {
                return Err(AnalyzeError::recoverable(anyhow!(
                    "can't get pull request: {e}"
                )))
            }
            Err(e) => return Err(AnalyzeError::Other(anyhow!("can't get pull request: {e}"))),
        };
        info!(pr = pr.number, state = %pr.state, sha = %pr.head.sha, "got pull request");

        // Stage 2: pending status, best-effort.
        self.set_commit_status(deadline, &pr, CheckStatus::Pending, PENDING_DESCRIPTION)
            .await;

        self.process_with_guaranteed_status(deadline, &pr).await
    }

    /// Stages 3-9 under the guaranteed-status post-condition.
    async fn process_with_guaranteed_status(
        &mut self,
        deadline: &Deadline,
        pr: &PullRequest,
    ) -> Result<(), AnalyzeError> {
        let work_res = AssertUnwindSafe(self.work(deadline, pr)).catch_unwind().await;
        let work_res: Result<AnalysisReport, AnalyzeError> = match work_res {
            Ok(res) => res,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                Err(AnalyzeError::internal(
                    INTERNAL_ERROR_MESSAGE,
                    format!(
                        "{PANIC_MARKER}: {message}, {}",
                        Backtrace::force_capture()
                    ),
                ))
            }
        };
        info!(timings = ?self.collector.timings(), "stage timings");

        // Durable commitments: never aborted by the job deadline.
        let finalize = Deadline::none();

        let mut report = None;
        let (status, status_desc, public_error, ret) = match work_res {
            Ok(res) => {
                let (status, desc) = status_for_issues(res.issues.len());
                report = Some(res);
                (status, desc, String::new(), Ok(()))
            }
            Err(AnalyzeError::Ignored {
                status,
                status_desc,
                is_recoverable,
            }) => {
                // The warning was already published; no public error.
                let ret = if is_recoverable {
                    Err(AnalyzeError::Ignored {
                        status,
                        status_desc: status_desc.clone(),
                        is_recoverable,
                    })
                } else {
                    Ok(())
                };
                (status, status_desc, String::new(), ret)
            }
            Err(AnalyzeError::Internal { public, private }) => {
                if private.contains(NO_GO_FILES_ERR) {
                    let desc = NO_GO_FILES_MESSAGE.to_string();
                    (CheckStatus::Success, desc.clone(), desc, Ok(()))
                } else {
                    warn!(private = %private, "internal error during analysis");
                    let desc = self.escape(&public);
                    (CheckStatus::Error, desc.clone(), desc, Ok(()))
                }
            }
            Err(AnalyzeError::BadInput { public }) => {
                let public = self.escape(&public);
                warn!(error = %public, "PR analysis bad input error");
                (
                    CheckStatus::Error,
                    "can't analyze".to_string(),
                    public,
                    Ok(()),
                )
            }
            Err(other) => {
                warn!(error = %other, "unclassified analysis error");
                (
                    CheckStatus::Error,
                    INTERNAL_ERROR_MESSAGE.to_string(),
                    INTERNAL_ERROR_MESSAGE.to_string(),
                    Err(other),
                )
            }
        };

        // State before status: a user opening the details link from the
        // check must never reach a record older than the status they saw.
        self.update_analysis_state(&finalize, report.as_ref(), status, &public_error)
            .await;
        self.set_commit_status(&finalize, pr, status, &status_desc)
            .await;

        ret
    }

    /// Stages 3-8. Every error keeps its variant so classification can see
    /// it; panics are trapped by the caller.
    async fn work(
        &mut self,
        deadline: &Deadline,
        pr: &PullRequest,
    ) -> Result<AnalysisReport, AnalyzeError> {
        let pr_state = pr.effective_state();
        if pr_state == "MERGED" || pr_state == "CLOSED" {
            // The head branch may already be deleted; analysis would only
            // produce noise.
            warn!(state = %pr_state, "pull request is not open, skipping analysis");
            self.collector.public_warn(
                "process",
                &format!("Pull Request is already {pr_state}, skip analysis"),
            );
            return Err(AnalyzeError::Ignored {
                status: CheckStatus::Success,
                status_desc: format!("Pull Request is already {}", pr_state.to_lowercase()),
                is_recoverable: false,
            });
        }

        // Stage 3: provision the workspace.
        let repo = self.repo_for(pr);
        let owner = self.ctx.repo.owner.clone();
        let name = self.ctx.repo.name.clone();
        let parts = ["github.com", owner.as_str(), name.as_str()];

        let t0 = Instant::now();
        let provisioned = self
            .provisioner
            .setup(deadline, &repo, self.exec.as_ref(), &parts)
            .await;
        self.collector.add_timing_from("Prepare repo", t0);

        let provisioned = provisioned.map_err(|e| {
            AnalyzeError::internal(
                "can't set up build environment",
                format!("can't set up build environment: {e}"),
            )
        })?;
        for (group, description, error) in provisioned.log.step_errors() {
            let text = self.escape(&format!("{group}: {description}: {error}"));
            self.collector.public_warn("prepare repo", &text);
        }
        let work_exec = provisioned.exec;

        // Stage 4: fetch the patch; same transport classification as the PR
        // fetch, but a permanent rejection here is terminal to the job.
        let patch = match self.client.get_pull_request_patch(deadline, &self.ctx).await {
            Ok(patch) => patch,
            Err(e) if e.is_recoverable() => {
                return Err(AnalyzeError::recoverable(anyhow!("can't get patch: {e}")))
            }
            Err(e) => {
                return Err(AnalyzeError::internal(
                    "can't get pull request patch",
                    format!("can't get patch: {e}"),
                ))
            }
        };

        // Stage 5: stage the patch where the analyzer looks for it.
        self.store_patch(deadline, work_exec.as_ref(), &patch).await?;

        // Stage 6: queue timing refresh; errors are logged, not fatal.
        self.refresh_queue_timing(deadline).await;

        // Stage 7: run the analyzer.
        let t0 = Instant::now();
        let res = self
            .runner
            .run(deadline, &self.linters, work_exec.as_ref())
            .await;
        self.collector.add_timing_from("Analysis", t0);
        let report = res?;

        if report.issues.is_empty() {
            info!("linters found no issues");
        } else {
            info!(count = report.issues.len(), "linters found issues");
        }

        // Stage 8: post the review.
        if let Err(e) = self
            .reporter
            .report(deadline, &self.ctx, &pr.head.sha, &report.issues)
            .await
        {
            return Err(AnalyzeError::internal(
                "can't send pull request comments to github",
                format!("can't send pull request comments to github: {e}"),
            ));
        }

        Ok(report)
    }

    fn repo_for(&self, pr: &PullRequest) -> Repo {
        let head_url = pr
            .head
            .repo
            .as_ref()
            .map(|r| r.clone_url.clone())
            .unwrap_or_else(|| {
                format!(
                    "https://github.com/{}/{}.git",
                    self.ctx.repo.owner, self.ctx.repo.name
                )
            });
        Repo {
            clone_url: self.ctx.clone_url(&head_url),
            ref_name: pr.head.ref_name.clone(),
            full_path: self.ctx.repo.full_path(),
        }
    }

    async fn store_patch(
        &self,
        deadline: &Deadline,
        exec: &dyn Executor,
        patch: &str,
    ) -> Result<(), AnalyzeError> {
        let tmp = tempfile::NamedTempFile::new().map_err(|e| {
            AnalyzeError::internal("can't store patch", format!("can't create temp file: {e}"))
        })?;
        tokio::fs::write(tmp.path(), patch).await.map_err(|e| {
            AnalyzeError::internal("can't store patch", format!("can't write patch: {e}"))
        })?;
        exec.copy_file(deadline, PATCH_PATH, tmp.path())
            .await
            .map_err(|e| {
                AnalyzeError::internal("can't store patch", format!("can't copy patch file: {e}"))
            })
    }

    async fn refresh_queue_timing(&mut self, deadline: &Deadline) {
        let current = self
            .state
            .get_state(
                deadline,
                &self.ctx.repo.owner,
                &self.ctx.repo.name,
                &self.analysis_guid,
            )
            .await;

        let mut current = match current {
            Ok(state) => state,
            Err(e) => {
                warn!(error = %e, "can't get current state");
                return;
            }
        };
        if current.status != STATUS_SENT_TO_QUEUE {
            return;
        }

        if let Some(created_at) = current.created_at {
            let in_queue = Utc::now()
                .signed_duration_since(created_at)
                .to_std()
                .unwrap_or_default();
            self.collector.add_timing("In Queue", in_queue);
        }

        current.status = STATUS_PROCESSING.to_string();
        if let Err(e) = self
            .state
            .update_state(
                deadline,
                &self.ctx.repo.owner,
                &self.ctx.repo.name,
                &self.analysis_guid,
                &current,
            )
            .await
        {
            warn!(error = %e, analysis = %self.analysis_guid, "can't advance state to processing");
        }
    }

    async fn update_analysis_state(
        &self,
        deadline: &Deadline,
        report: Option<&AnalysisReport>,
        status: CheckStatus,
        public_error: &str,
    ) {
        let state = State {
            status: processed_status(status),
            reported_issues_count: report.map(|r| r.issues.len() as u64).unwrap_or(0),
            result_json: Some(AnalysisResultDoc {
                version: 1,
                lint_res: report.map(|r| r.raw.clone()).unwrap_or(serde_json::Value::Null),
                worker_res: WorkerRes {
                    timings: self.collector.timings().to_vec(),
                    warnings: self.collector.warnings().to_vec(),
                    error: public_error.to_string(),
                },
            }),
            created_at: None,
        };

        if let Err(e) = self
            .state
            .update_state(
                deadline,
                &self.ctx.repo.owner,
                &self.ctx.repo.name,
                &self.analysis_guid,
                &state,
            )
            .await
        {
            warn!(error = %e, analysis = %self.analysis_guid, status = %state.status,
                "can't save terminal analysis state");
        }
    }

    async fn set_commit_status(
        &mut self,
        deadline: &Deadline,
        pr: &PullRequest,
        status: CheckStatus,
        description: &str,
    ) {
        let details_url = if status.is_terminal() && !self.web_root.is_empty() {
            format!(
                "{}/r/github.com/{}/{}/pulls/{}",
                self.web_root, self.ctx.repo.owner, self.ctx.repo.name, pr.number
            )
        } else {
            String::new()
        };

        if let Err(e) = self
            .client
            .set_commit_status(deadline, &self.ctx, &pr.head.sha, status, description, &details_url)
            .await
        {
            self.collector
                .public_warn("github", "Can't set github commit status");
            warn!(error = %e, %status, "can't set github commit status");
        }
    }

    fn escape(&self, text: &str) -> String {
        escape_error_text(text, &self.secrets())
    }

    fn secrets(&self) -> SecretMap {
        build_secrets(
            &self.ctx.access_token,
            &self.analysis_guid,
            &self.workspace_secrets,
        )
    }
}
