pub mod analyze;
pub mod config;
pub mod executors;
pub mod experiments;
pub mod fetchers;
pub mod github;
pub mod httputils;
pub mod linters;
pub mod queue;
pub mod reporters;
pub mod state;
pub mod util;
pub mod workspaces;

pub use analyze::errors::AnalyzeError;
pub use analyze::processor::{GithubProcessor, ProcessorConfig, ProcessorFactory};
pub use analyze::ResultCollector;
pub use config::{ConfigError, WorkerConfig};
pub use executors::{Executor, TempDirExecutor};
pub use fetchers::{GitFetcher, Repo, RepoFetcher};
pub use github::client::{Client, GithubClient};
pub use github::{CheckStatus, GithubContext, PullRequest};
pub use linters::{Issue, Linter, Runner};
pub use queue::{Registry, TaskMessage, Worker};
pub use state::api_storage::{ApiStorage, Storage};
pub use state::State;
pub use util::deadline::Deadline;
pub use workspaces::{Provisioner, StructuredLog};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_exists() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_name_is_prcheck() {
        assert_eq!(NAME, "prcheck");
    }
}
