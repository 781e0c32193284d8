use super::{ExecError, Executor};
use crate::util::deadline::Deadline;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::OnceLock;
use tokio::process::Command;
use tracing::{debug, warn};

/// Canonicalized system temp root, computed once per process.
///
/// Symlinks are resolved up front (on macOS `/tmp` is a symlink) so every
/// path handed to subprocesses is canonical.
fn tmp_root() -> &'static Path {
    static ROOT: OnceLock<PathBuf> = OnceLock::new();
    ROOT.get_or_init(|| {
        let dir = std::env::temp_dir();
        dir.canonicalize().unwrap_or(dir)
    })
}

/// An [`Executor`] owning a unique sandbox directory under the temp root.
///
/// Derived copies share the sandbox; `clean` always removes the sandbox
/// root, regardless of where the derived work dir points.
pub struct TempDirExecutor {
    sandbox: PathBuf,
    work_dir: PathBuf,
    env: Vec<(String, String)>,
}

impl TempDirExecutor {
    /// Creates a fresh sandbox directory tagged with `tag`.
    pub fn new(tag: &str) -> Result<Self, ExecError> {
        let dir = tempfile::Builder::new()
            .prefix(&format!("prcheck.{tag}."))
            .tempdir_in(tmp_root())?;
        // Take ownership of the path: cleanup is explicit via clean(), not drop.
        let sandbox = dir.keep();
        debug!(sandbox = %sandbox.display(), "created executor sandbox");

        Ok(Self {
            work_dir: sandbox.clone(),
            sandbox,
            env: Vec::new(),
        })
    }

    /// The sandbox root this executor (and all its derivatives) will clean.
    pub fn sandbox(&self) -> &Path {
        &self.sandbox
    }

    pub fn env(&self) -> &[(String, String)] {
        &self.env
    }

    fn derive(&self) -> Self {
        Self {
            sandbox: self.sandbox.clone(),
            work_dir: self.work_dir.clone(),
            env: self.env.clone(),
        }
    }
}

#[async_trait]
impl Executor for TempDirExecutor {
    fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    async fn run(
        &self,
        deadline: &Deadline,
        name: &str,
        args: &[&str],
    ) -> Result<String, ExecError> {
        let mut cmd = Command::new(name);
        cmd.args(args)
            .current_dir(&self.work_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(Stdio::null())
            .kill_on_drop(true);
        for (k, v) in &self.env {
            cmd.env(k, v);
        }

        debug!(command = name, ?args, work_dir = %self.work_dir.display(), "running command");

        let output = deadline
            .bound(cmd.output())
            .await
            .map_err(|_| ExecError::TimedOut {
                command: name.to_string(),
            })?
            .map_err(|source| ExecError::Spawn {
                command: name.to_string(),
                source,
            })?;

        if !output.status.success() {
            return Err(ExecError::Failed {
                command: name.to_string(),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn copy_file(&self, deadline: &Deadline, dst: &str, src: &Path) -> Result<(), ExecError> {
        let dst = self.work_dir.join(dst);
        deadline
            .bound(tokio::fs::copy(src, &dst))
            .await
            .map_err(|_| ExecError::TimedOut {
                command: format!("copy {}", dst.display()),
            })??;
        Ok(())
    }

    fn with_env(&self, key: &str, value: &str) -> Box<dyn Executor> {
        let mut copy = self.derive();
        copy.env.push((key.to_string(), value.to_string()));
        Box::new(copy)
    }

    fn with_work_dir(&self, path: &Path) -> Box<dyn Executor> {
        let mut copy = self.derive();
        copy.work_dir = path.to_path_buf();
        Box::new(copy)
    }

    fn clean(&self) {
        match std::fs::remove_dir_all(&self.sandbox) {
            Ok(()) => debug!(sandbox = %self.sandbox.display(), "removed executor sandbox"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(sandbox = %self.sandbox.display(), error = %e, "can't remove sandbox")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_sandbox_is_created_under_canonical_root() {
        let exec = TempDirExecutor::new("test").unwrap();
        assert!(exec.sandbox().exists());
        assert!(exec.sandbox().starts_with(tmp_root()));
        exec.clean();
    }

    #[test]
    fn test_clean_is_idempotent() {
        let exec = TempDirExecutor::new("test").unwrap();
        exec.clean();
        assert!(!exec.sandbox().exists());
        exec.clean();
    }

    #[test]
    fn test_derived_env_not_visible_in_parent() {
        let base = TempDirExecutor::new("test").unwrap();
        let derived = base.with_env("K", "v").with_env("K", "v2");

        assert!(base.env().is_empty());
        // Last write wins on the derivative.
        let derived = derived.with_env("OTHER", "x");
        assert_eq!(derived.work_dir(), base.work_dir());
        base.clean();
    }

    #[test]
    fn test_with_work_dir_keeps_sandbox_for_clean() {
        let base = TempDirExecutor::new("test").unwrap();
        let project = base.sandbox().join("src/project");
        std::fs::create_dir_all(&project).unwrap();

        let derived = base.with_work_dir(&project);
        assert_eq!(derived.work_dir(), project.as_path());

        derived.clean();
        assert!(!base.sandbox().exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_captures_stdout() {
        let exec = TempDirExecutor::new("test").unwrap();
        let deadline = Deadline::after(Duration::from_secs(10));

        let out = exec.run(&deadline, "echo", &["hello"]).await.unwrap();
        assert_eq!(out.trim(), "hello");
        exec.clean();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_reports_failure_with_stderr() {
        let exec = TempDirExecutor::new("test").unwrap();
        let deadline = Deadline::after(Duration::from_secs(10));

        let err = exec
            .run(&deadline, "sh", &["-c", "echo boom >&2; exit 3"])
            .await
            .unwrap_err();
        match err {
            ExecError::Failed { code, stderr, .. } => {
                assert_eq!(code, Some(3));
                assert!(stderr.contains("boom"));
            }
            other => panic!("expected Failed, got {other:?}"),
        }
        exec.clean();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_respects_env_overrides() {
        let exec = TempDirExecutor::new("test").unwrap();
        let exec = exec.with_env("PRCHECK_TEST_VAL", "first");
        let exec = exec.with_env("PRCHECK_TEST_VAL", "second");
        let deadline = Deadline::after(Duration::from_secs(10));

        let out = exec
            .run(&deadline, "sh", &["-c", "echo $PRCHECK_TEST_VAL"])
            .await
            .unwrap();
        assert_eq!(out.trim(), "second");
        exec.clean();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_times_out() {
        let exec = TempDirExecutor::new("test").unwrap();
        let deadline = Deadline::after(Duration::from_millis(50));

        let err = exec.run(&deadline, "sleep", &["5"]).await.unwrap_err();
        assert!(matches!(err, ExecError::TimedOut { .. }));
        exec.clean();
    }

    #[tokio::test]
    async fn test_copy_file_relative_to_work_dir() {
        let exec = TempDirExecutor::new("test").unwrap();
        let deadline = Deadline::after(Duration::from_secs(10));

        let src = exec.sandbox().join("input.txt");
        std::fs::write(&src, "patch contents").unwrap();

        exec.copy_file(&deadline, "copied.txt", &src).await.unwrap();
        let copied = std::fs::read_to_string(exec.sandbox().join("copied.txt")).unwrap();
        assert_eq!(copied, "patch contents");
        exec.clean();
    }
}
