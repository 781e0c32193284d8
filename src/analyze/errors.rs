//! Analysis error taxonomy
//!
//! Stage failures are carried as a small closed set of variants; the
//! pipeline driver classifies them into terminal outcomes with an explicit
//! match, never exception-style control flow.

use crate::github::CheckStatus;
use std::any::Any;
use thiserror::Error;

pub const INTERNAL_ERROR_MESSAGE: &str = "Internal error";

/// Sentinel substring in an internal error's private description that
/// downgrades the outcome to success.
pub const NO_GO_FILES_ERR: &str = "no go files to analyze";
pub const NO_GO_FILES_MESSAGE: &str = "No Go files to analyze";

/// Marker stored in the private description of panic-derived errors.
pub const PANIC_MARKER: &str = "worker panic-ed";

#[derive(Debug, Error)]
pub enum AnalyzeError {
    /// Transient transport failure; the queue should retry the job.
    #[error("recoverable error: {0}")]
    Recoverable(anyhow::Error),

    /// Unexpected condition with a user-safe public description and a
    /// diagnostic private one.
    #[error("{public}")]
    Internal { public: String, private: String },

    /// The repository or PR is malformed in a way analysis can't fix.
    #[error("{public}")]
    BadInput { public: String },

    /// A known terminal non-error (e.g. the PR is already merged). Carries
    /// the status to report and whether the queue should retry anyway.
    #[error("{status_desc}")]
    Ignored {
        status: CheckStatus,
        status_desc: String,
        is_recoverable: bool,
    },

    /// Anything unclassified; treated as an internal error.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AnalyzeError {
    pub fn internal(public: impl Into<String>, private: impl Into<String>) -> Self {
        Self::Internal {
            public: public.into(),
            private: private.into(),
        }
    }

    pub fn recoverable(err: impl Into<anyhow::Error>) -> Self {
        Self::Recoverable(err.into())
    }

    /// Whether the queue should re-deliver the job.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Recoverable(_) => true,
            Self::Ignored { is_recoverable, .. } => *is_recoverable,
            _ => false,
        }
    }
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
