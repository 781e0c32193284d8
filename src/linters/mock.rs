use super::{AnalysisReport, Linter, Runner};
use crate::analyze::errors::AnalyzeError;
use crate::executors::Executor;
use crate::util::deadline::Deadline;
use async_trait::async_trait;
use std::sync::Mutex;

enum MockBehavior {
    Report(AnalysisReport),
    Error(Box<dyn Fn() -> AnalyzeError + Send + Sync>),
    Panic(String),
}

/// Test double for [`Runner`]: returns a scripted report, a scripted error,
/// or panics on demand (for panic-boundary tests).
pub struct MockRunner {
    behavior: Mutex<MockBehavior>,
}

impl MockRunner {
    pub fn with_report(report: AnalysisReport) -> Self {
        Self {
            behavior: Mutex::new(MockBehavior::Report(report)),
        }
    }

    pub fn with_error(make: impl Fn() -> AnalyzeError + Send + Sync + 'static) -> Self {
        Self {
            behavior: Mutex::new(MockBehavior::Error(Box::new(make))),
        }
    }

    pub fn panicking(message: impl Into<String>) -> Self {
        Self {
            behavior: Mutex::new(MockBehavior::Panic(message.into())),
        }
    }
}

#[async_trait]
impl Runner for MockRunner {
    async fn run(
        &self,
        _deadline: &Deadline,
        _linters: &[Linter],
        _exec: &dyn Executor,
    ) -> Result<AnalysisReport, AnalyzeError> {
        let behavior = self.behavior.lock().unwrap();
        match &*behavior {
            MockBehavior::Report(report) => Ok(report.clone()),
            MockBehavior::Error(make) => Err(make()),
            MockBehavior::Panic(message) => panic!("{}", message.clone()),
        }
    }
}
