//! The per-pull-request analysis pipeline
//!
//! [`processor::GithubProcessor`] drives one job through a strictly ordered
//! sequence of stages and guarantees that every job which got past fetching
//! its pull request terminates in exactly one terminal state record and one
//! terminal commit status, no matter which stage failed or panicked.

pub mod collector;
pub mod errors;
pub mod processor;

pub use collector::{build_secrets, escape_error_text, ResultCollector, SecretMap};
pub use errors::AnalyzeError;
pub use processor::{GithubProcessor, ProcessorConfig, ProcessorFactory};
