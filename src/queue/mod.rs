//! Queue-facing task handling
//!
//! The worker registers two named task handlers - `analyze` (legacy) and
//! `analyzeV2` (adds the analysis GUID) - with a transport-agnostic
//! registry. Both are panic-safe: a panic anywhere inside a handler becomes
//! a returned error carrying the panic payload and a backtrace, never a
//! crashed consumer.

use crate::analyze::errors::{panic_message, AnalyzeError};
use crate::analyze::processor::ProcessorFactory;
use crate::github::{GithubContext, GithubRepo};
use crate::util::deadline::Deadline;
use anyhow::{anyhow, Context as _};
use async_trait::async_trait;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use std::backtrace::Backtrace;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::{error, info, info_span, warn, Instrument};

/// Every job gets this long from receipt; finalization is exempt.
pub const ANALYSIS_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// One queued task: a registered handler name plus its JSON payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskMessage {
    pub name: String,
    pub payload: serde_json::Value,
}

/// Payload of the `analyze` / `analyzeV2` tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeTask {
    pub repo_owner: String,
    pub repo_name: String,
    pub github_access_token: String,
    pub pull_request_number: u64,
    pub api_request_id: String,
    pub user_id: u64,
    /// Absent on the legacy `analyze` signature.
    #[serde(default)]
    pub analysis_guid: String,
}

type HandlerFn =
    Arc<dyn Fn(serde_json::Value) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

fn panic_error(payload: &(dyn std::any::Any + Send)) -> anyhow::Error {
    anyhow!(
        "panic recovered: {}, {}",
        panic_message(payload),
        Backtrace::force_capture()
    )
}

/// Named task handlers. Registration wraps every handler in a panic
/// boundary covering both the synchronous call and the returned future.
#[derive(Default)]
pub struct Registry {
    handlers: HashMap<String, HandlerFn>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F, Fut>(&mut self, name: &str, handler: F)
    where
        F: Fn(serde_json::Value) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let wrapped: HandlerFn = Arc::new(move |payload| {
            let handler = Arc::clone(&handler);
            async move {
                let fut = match std::panic::catch_unwind(AssertUnwindSafe(|| handler(payload))) {
                    Ok(fut) => fut,
                    Err(payload) => return Err(panic_error(payload.as_ref())),
                };
                match AssertUnwindSafe(fut).catch_unwind().await {
                    Ok(res) => res,
                    Err(payload) => Err(panic_error(payload.as_ref())),
                }
            }
            .boxed()
        });
        self.handlers.insert(name.to_string(), wrapped);
    }

    pub fn task_names(&self) -> Vec<&str> {
        self.handlers.keys().map(String::as_str).collect()
    }

    pub async fn dispatch(&self, message: TaskMessage) -> anyhow::Result<()> {
        let handler = self
            .handlers
            .get(&message.name)
            .ok_or_else(|| anyhow!("unknown task: {}", message.name))?;
        handler(message.payload).await
    }
}

async fn run_analysis(factory: Arc<ProcessorFactory>, task: AnalyzeTask) -> anyhow::Result<()> {
    let span = info_span!(
        "analyze",
        repo = %format!("{}/{}", task.repo_owner, task.repo_name),
        pr = task.pull_request_number,
        analysis = %task.analysis_guid,
        request_id = %task.api_request_id,
        user_id = task.user_id,
    );

    async move {
        let ctx = GithubContext {
            repo: GithubRepo::new(task.repo_owner.clone(), task.repo_name.clone()),
            access_token: task.github_access_token.clone(),
            pull_request_number: task.pull_request_number,
        };

        let mut processor = factory
            .build_processor(ctx, task.analysis_guid.clone())
            .context("can't build processor")?;

        let deadline = Deadline::after(ANALYSIS_TIMEOUT);
        processor
            .process(&deadline)
            .await
            .map_err(anyhow::Error::new)
    }
    .instrument(span)
    .await
}

/// Registers the `analyze` and `analyzeV2` handlers.
pub fn register_tasks(registry: &mut Registry, factory: Arc<ProcessorFactory>) {
    let legacy = Arc::clone(&factory);
    registry.register("analyze", move |payload| {
        let factory = Arc::clone(&legacy);
        async move {
            let task: AnalyzeTask =
                serde_json::from_value(payload).context("can't decode analyze payload")?;
            run_analysis(factory, task).await
        }
    });

    registry.register("analyzeV2", move |payload| {
        let factory = Arc::clone(&factory);
        async move {
            let task: AnalyzeTask =
                serde_json::from_value(payload).context("can't decode analyzeV2 payload")?;
            run_analysis(factory, task).await
        }
    });
}

/// Source of tasks. The concrete broker lives outside this crate; tests and
/// the binary feed a channel.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Returns the next task, or `None` once the queue is closed.
    async fn dequeue(&self) -> Option<TaskMessage>;
}

pub struct ChannelTransport {
    rx: Mutex<mpsc::Receiver<TaskMessage>>,
}

pub fn channel(capacity: usize) -> (mpsc::Sender<TaskMessage>, ChannelTransport) {
    let (tx, rx) = mpsc::channel(capacity);
    (tx, ChannelTransport { rx: Mutex::new(rx) })
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn dequeue(&self) -> Option<TaskMessage> {
        self.rx.lock().await.recv().await
    }
}

/// Pulls tasks with a fixed number of consumers (default one) until the
/// transport closes. Each job runs on one consumer from start to finish.
pub struct Worker {
    transport: Arc<dyn Transport>,
    registry: Arc<Registry>,
    concurrency: usize,
}

impl Worker {
    pub fn new(transport: Arc<dyn Transport>, registry: Arc<Registry>, concurrency: usize) -> Self {
        Self {
            transport,
            registry,
            concurrency: concurrency.max(1),
        }
    }

    pub async fn launch(&self) -> anyhow::Result<()> {
        info!(consumers = self.concurrency, "launching worker");

        let mut handles = Vec::with_capacity(self.concurrency);
        for consumer in 0..self.concurrency {
            let transport = Arc::clone(&self.transport);
            let registry = Arc::clone(&self.registry);
            handles.push(tokio::spawn(async move {
                while let Some(message) = transport.dequeue().await {
                    let name = message.name.clone();
                    match registry.dispatch(message).await {
                        Ok(()) => info!(task = %name, consumer, "task finished"),
                        Err(e) => {
                            let retriable = e
                                .downcast_ref::<AnalyzeError>()
                                .map(AnalyzeError::is_recoverable)
                                .unwrap_or(false);
                            if retriable {
                                warn!(task = %name, consumer, error = %format!("{e:#}"),
                                    "task failed, queue will retry");
                            } else {
                                error!(task = %name, consumer, error = %format!("{e:#}"),
                                    "task failed");
                            }
                        }
                    }
                }
            }));
        }

        for handle in handles {
            handle.await.context("consumer crashed")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_dispatch_runs_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = Registry::new();
        let counter = Arc::clone(&calls);
        registry.register("noop", move |_payload| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        registry
            .dispatch(TaskMessage {
                name: "noop".to_string(),
                payload: serde_json::Value::Null,
            })
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_task_is_an_error() {
        let registry = Registry::new();
        let err = registry
            .dispatch(TaskMessage {
                name: "missing".to_string(),
                payload: serde_json::Value::Null,
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unknown task"));
    }

    async fn exploding_handler(_payload: serde_json::Value) -> anyhow::Result<()> {
        panic!("handler blew up");
    }

    #[tokio::test]
    async fn test_panicking_handler_returns_error() {
        let mut registry = Registry::new();
        registry.register("explode", exploding_handler);

        let err = registry
            .dispatch(TaskMessage {
                name: "explode".to_string(),
                payload: serde_json::Value::Null,
            })
            .await
            .unwrap_err();
        let text = format!("{err:#}");
        assert!(text.contains("panic recovered"));
        assert!(text.contains("handler blew up"));
    }

    #[tokio::test]
    async fn test_worker_drains_channel() {
        let processed = Arc::new(AtomicUsize::new(0));
        let mut registry = Registry::new();
        let counter = Arc::clone(&processed);
        registry.register("count", move |_payload| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        let (tx, transport) = channel(8);
        for _ in 0..3 {
            tx.send(TaskMessage {
                name: "count".to_string(),
                payload: serde_json::Value::Null,
            })
            .await
            .unwrap();
        }
        drop(tx);

        let worker = Worker::new(Arc::new(transport), Arc::new(registry), 2);
        worker.launch().await.unwrap();
        assert_eq!(processed.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_legacy_payload_defaults_analysis_guid() {
        let task: AnalyzeTask = serde_json::from_value(serde_json::json!({
            "repo_owner": "owner",
            "repo_name": "name",
            "github_access_token": "t",
            "pull_request_number": 3,
            "api_request_id": "req-1",
            "user_id": 9
        }))
        .unwrap();
        assert!(task.analysis_guid.is_empty());
    }

    #[test]
    fn test_register_tasks_exposes_both_signatures() {
        let mut registry = Registry::new();
        let factory = Arc::new(ProcessorFactory::new(crate::config::WorkerConfig::default()));
        register_tasks(&mut registry, factory);

        let mut names = registry.task_names();
        names.sort_unstable();
        assert_eq!(names, vec!["analyze", "analyzeV2"]);
    }
}
