use super::{AnalysisReport, Issue, Linter, Runner};
use crate::analyze::errors::{AnalyzeError, NO_GO_FILES_ERR};
use crate::executors::{ExecError, Executor};
use crate::util::deadline::Deadline;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
struct LintOutput {
    #[serde(rename = "Issues", default)]
    issues: Option<Vec<LintIssue>>,
    #[serde(rename = "Report", default)]
    report: Option<LintReport>,
}

#[derive(Debug, Deserialize)]
struct LintIssue {
    #[serde(rename = "FromLinter", default)]
    from_linter: String,
    #[serde(rename = "Text", default)]
    text: String,
    #[serde(rename = "Pos", default)]
    pos: Option<LintPos>,
    #[serde(rename = "HunkPos", default)]
    hunk_pos: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct LintPos {
    #[serde(rename = "Filename", default)]
    filename: String,
    #[serde(rename = "Line", default)]
    line: u32,
}

#[derive(Debug, Default, Deserialize)]
struct LintReport {
    #[serde(rename = "Error", default)]
    error: String,
}

/// Runs the analyzer binary against the staged patch and decodes its JSON
/// report.
#[derive(Debug, Default)]
pub struct GolangciLintRunner;

impl GolangciLintRunner {
    pub fn new() -> Self {
        Self
    }

    fn decode(stdout: &str) -> Result<AnalysisReport, AnalyzeError> {
        let raw: serde_json::Value = serde_json::from_str(stdout).map_err(|e| {
            AnalyzeError::internal(
                "can't read analyzer output",
                format!("can't decode analyzer json: {e}"),
            )
        })?;

        let out: LintOutput = serde_json::from_value(raw.clone()).map_err(|e| {
            AnalyzeError::internal(
                "can't read analyzer output",
                format!("unexpected analyzer json shape: {e}"),
            )
        })?;

        if let Some(report) = &out.report {
            if report.error.to_lowercase().contains(NO_GO_FILES_ERR) {
                return Err(AnalyzeError::internal(
                    "analyzer failed",
                    format!("analyzer reported: {}", report.error),
                ));
            }
        }

        let issues = out
            .issues
            .unwrap_or_default()
            .into_iter()
            .map(|i| {
                let pos = i.pos.unwrap_or_default();
                Issue {
                    from_linter: i.from_linter,
                    text: i.text,
                    file: pos.filename,
                    line_number: pos.line,
                    hunk_pos: i.hunk_pos,
                }
            })
            .collect();

        Ok(AnalysisReport { issues, raw })
    }
}

#[async_trait]
impl Runner for GolangciLintRunner {
    async fn run(
        &self,
        deadline: &Deadline,
        linters: &[Linter],
        exec: &dyn Executor,
    ) -> Result<AnalysisReport, AnalyzeError> {
        let mut report = AnalysisReport::default();

        for linter in linters {
            info!(linter = %linter.name, "running linter");
            let patch_arg = format!("--new-from-patch={}", linter.patch_path);
            let res = exec
                .run(
                    deadline,
                    &linter.name,
                    &[
                        "run",
                        "--out-format=json",
                        "--issues-exit-code=0",
                        &patch_arg,
                        "./...",
                    ],
                )
                .await;

            let stdout = match res {
                Ok(stdout) => stdout,
                Err(ExecError::Failed { stderr, .. }) => {
                    if stderr.to_lowercase().contains(NO_GO_FILES_ERR) {
                        return Err(AnalyzeError::internal(
                            "analyzer failed",
                            format!("{}: {stderr}", linter.name),
                        ));
                    }
                    return Err(AnalyzeError::BadInput {
                        public: format!(
                            "can't run {}: {}",
                            linter.name,
                            stderr.lines().next().unwrap_or("unknown failure")
                        ),
                    });
                }
                Err(e) => {
                    return Err(AnalyzeError::internal(
                        "can't run analyzer",
                        format!("{}: {e}", linter.name),
                    ))
                }
            };

            let mut one = Self::decode(&stdout)?;
            debug!(linter = %linter.name, issues = one.issues.len(), "linter finished");
            report.issues.append(&mut one.issues);
            report.raw = one.raw;
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executors::mock::{MockExecutor, MockRunResult};
    use std::time::Duration;

    fn linters() -> Vec<Linter> {
        vec![Linter {
            name: "golangci-lint".to_string(),
            patch_path: "../changes.patch".to_string(),
        }]
    }

    #[tokio::test]
    async fn test_decodes_issues() {
        let exec = MockExecutor::new("/project");
        exec.add_response(MockRunResult::Ok(
            serde_json::json!({
                "Issues": [
                    {
                        "FromLinter": "govet",
                        "Text": "printf: wrong argument count",
                        "Pos": {"Filename": "main.go", "Line": 10},
                        "HunkPos": 3
                    }
                ],
                "Report": {}
            })
            .to_string(),
        ));

        let deadline = Deadline::after(Duration::from_secs(5));
        let report = GolangciLintRunner::new()
            .run(&deadline, &linters(), &exec)
            .await
            .unwrap();

        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].from_linter, "govet");
        assert_eq!(report.issues[0].file, "main.go");
        assert_eq!(report.issues[0].hunk_pos, Some(3));

        let commands = exec.commands();
        assert!(commands[0]
            .args
            .contains(&"--new-from-patch=../changes.patch".to_string()));
    }

    #[tokio::test]
    async fn test_no_go_files_becomes_internal_with_sentinel() {
        let exec = MockExecutor::new("/project");
        exec.add_response(MockRunResult::Fail {
            code: 5,
            stderr: "level=error msg=\"no go files to analyze\"".to_string(),
        });

        let deadline = Deadline::after(Duration::from_secs(5));
        let err = GolangciLintRunner::new()
            .run(&deadline, &linters(), &exec)
            .await
            .unwrap_err();

        match err {
            AnalyzeError::Internal { private, .. } => {
                assert!(private.contains(NO_GO_FILES_ERR));
            }
            other => panic!("expected Internal, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_analyzer_crash_is_bad_input() {
        let exec = MockExecutor::new("/project");
        exec.add_response(MockRunResult::Fail {
            code: 3,
            stderr: "can't load packages: syntax error".to_string(),
        });

        let deadline = Deadline::after(Duration::from_secs(5));
        let err = GolangciLintRunner::new()
            .run(&deadline, &linters(), &exec)
            .await
            .unwrap_err();
        assert!(matches!(err, AnalyzeError::BadInput { .. }));
    }
}
