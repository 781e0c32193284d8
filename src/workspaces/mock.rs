use super::{Provisioned, ProvisionError, Provisioner, StructuredLog};
use crate::executors::{Executor, MockExecutor};
use crate::fetchers::Repo;
use crate::util::deadline::Deadline;
use async_trait::async_trait;
use std::sync::Mutex;

/// Test double for [`Provisioner`]. Hands out clones of one recording
/// executor so tests can inspect what ran in the "provisioned" workspace.
pub struct MockProvisioner {
    exec: MockExecutor,
    log: Mutex<StructuredLog>,
    fail_with: Mutex<Option<String>>,
}

impl MockProvisioner {
    pub fn new(work_dir: impl Into<std::path::PathBuf>) -> Self {
        Self::returning(MockExecutor::new(work_dir.into()))
    }

    pub fn returning(exec: MockExecutor) -> Self {
        Self {
            exec,
            log: Mutex::new(StructuredLog::default()),
            fail_with: Mutex::new(None),
        }
    }

    pub fn with_log(self, log: StructuredLog) -> Self {
        *self.log.lock().unwrap() = log;
        self
    }

    pub fn fail_with(self, detail: impl Into<String>) -> Self {
        *self.fail_with.lock().unwrap() = Some(detail.into());
        self
    }

    /// The executor every `setup` call clones; shares recording buffers
    /// with the handed-out copies.
    pub fn exec(&self) -> &MockExecutor {
        &self.exec
    }
}

#[async_trait]
impl Provisioner for MockProvisioner {
    async fn setup(
        &self,
        _deadline: &Deadline,
        _repo: &Repo,
        _base: &dyn Executor,
        _project_path_parts: &[&str],
    ) -> Result<Provisioned, ProvisionError> {
        if let Some(detail) = self.fail_with.lock().unwrap().clone() {
            return Err(ProvisionError::Build(detail));
        }
        Ok(Provisioned {
            exec: Box::new(self.exec.clone()),
            log: self.log.lock().unwrap().clone(),
        })
    }
}
