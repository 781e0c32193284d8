use super::{ExecError, Executor};
use crate::util::deadline::Deadline;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Scripted response for one `run` call, consumed in order.
#[derive(Debug, Clone)]
pub enum MockRunResult {
    Ok(String),
    Fail { code: i32, stderr: String },
}

/// One recorded `run` invocation, including the derived env and work dir it
/// was issued under.
#[derive(Debug, Clone)]
pub struct RecordedCommand {
    pub name: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub work_dir: PathBuf,
}

/// Test double for [`Executor`]: records commands, replays scripted results.
///
/// Derived copies (and `clone`s) share the recording buffers, so assertions
/// made on the original see everything its derivatives did.
#[derive(Clone)]
pub struct MockExecutor {
    work_dir: PathBuf,
    env: Vec<(String, String)>,
    commands: Arc<Mutex<Vec<RecordedCommand>>>,
    responses: Arc<Mutex<VecDeque<MockRunResult>>>,
    copies: Arc<Mutex<Vec<(String, PathBuf)>>>,
    clean_count: Arc<AtomicUsize>,
}

impl MockExecutor {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
            env: Vec::new(),
            commands: Arc::new(Mutex::new(Vec::new())),
            responses: Arc::new(Mutex::new(VecDeque::new())),
            copies: Arc::new(Mutex::new(Vec::new())),
            clean_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn add_response(&self, response: MockRunResult) {
        self.responses.lock().unwrap().push_back(response);
    }

    pub fn commands(&self) -> Vec<RecordedCommand> {
        self.commands.lock().unwrap().clone()
    }

    pub fn copies(&self) -> Vec<(String, PathBuf)> {
        self.copies.lock().unwrap().clone()
    }

    pub fn clean_count(&self) -> usize {
        self.clean_count.load(Ordering::SeqCst)
    }

    pub fn env(&self) -> &[(String, String)] {
        &self.env
    }

    fn derive(&self) -> Self {
        Self {
            work_dir: self.work_dir.clone(),
            env: self.env.clone(),
            commands: Arc::clone(&self.commands),
            responses: Arc::clone(&self.responses),
            copies: Arc::clone(&self.copies),
            clean_count: Arc::clone(&self.clean_count),
        }
    }
}

#[async_trait]
impl Executor for MockExecutor {
    fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    async fn run(
        &self,
        _deadline: &Deadline,
        name: &str,
        args: &[&str],
    ) -> Result<String, ExecError> {
        self.commands.lock().unwrap().push(RecordedCommand {
            name: name.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            env: self.env.clone(),
            work_dir: self.work_dir.clone(),
        });

        let scripted = self.responses.lock().unwrap().pop_front();
        match scripted {
            None => Ok(String::new()),
            Some(MockRunResult::Ok(stdout)) => Ok(stdout),
            Some(MockRunResult::Fail { code, stderr }) => Err(ExecError::Failed {
                command: name.to_string(),
                code: Some(code),
                stderr,
            }),
        }
    }

    async fn copy_file(
        &self,
        _deadline: &Deadline,
        dst: &str,
        src: &Path,
    ) -> Result<(), ExecError> {
        self.copies
            .lock()
            .unwrap()
            .push((dst.to_string(), src.to_path_buf()));
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
        self.clean_count.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_records_commands_across_derivatives() {
        let base = MockExecutor::new("/sandbox");
        let derived = base.with_env("GOPATH", "/sandbox").with_work_dir(Path::new("/sandbox/src"));

        let deadline = Deadline::after(Duration::from_secs(1));
        derived.run(&deadline, "go", &["mod", "download"]).await.unwrap();

        let commands = base.commands();
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].name, "go");
        assert_eq!(commands[0].env, vec![("GOPATH".to_string(), "/sandbox".to_string())]);
        assert_eq!(commands[0].work_dir, PathBuf::from("/sandbox/src"));
    }

    #[tokio::test]
    async fn test_scripted_failure() {
        let exec = MockExecutor::new("/sandbox");
        exec.add_response(MockRunResult::Fail {
            code: 1,
            stderr: "fatal: not a repository".to_string(),
        });

        let deadline = Deadline::after(Duration::from_secs(1));
        let err = exec.run(&deadline, "git", &["clone"]).await.unwrap_err();
        assert!(matches!(err, ExecError::Failed { .. }));
    }
}
