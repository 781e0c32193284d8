//! Job deadlines
//!
//! A [`Deadline`] is passed explicitly through every stage of the analysis
//! pipeline. Stage I/O is bounded by the remaining budget; finalization runs
//! with [`Deadline::none`] so that terminal state and status writes cannot be
//! aborted by an expiring job.

use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("deadline exceeded after {0:?}")]
pub struct DeadlineExceeded(pub Duration);

/// A point in time after which pipeline I/O must give up.
///
/// Copyable so it can be handed to every collaborator without ceremony.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Option<Instant>,
    budget: Duration,
}

impl Deadline {
    /// A deadline expiring `budget` from now.
    pub fn after(budget: Duration) -> Self {
        Self {
            at: Some(Instant::now() + budget),
            budget,
        }
    }

    /// A deadline that never expires. Used for durable finalization writes.
    pub fn none() -> Self {
        Self {
            at: None,
            budget: Duration::ZERO,
        }
    }

    pub fn is_unbounded(&self) -> bool {
        self.at.is_none()
    }

    /// Time left before expiry. Unbounded deadlines report a full day so the
    /// value can still seed per-request timeouts.
    pub fn remaining(&self) -> Duration {
        match self.at {
            Some(at) => at.saturating_duration_since(Instant::now()),
            None => Duration::from_secs(24 * 60 * 60),
        }
    }

    /// Runs `fut` to completion unless the deadline expires first.
    ///
    /// Expiry drops the future, which kills any `kill_on_drop` subprocess
    /// tied to it.
    pub async fn bound<F, T>(&self, fut: F) -> Result<T, DeadlineExceeded>
    where
        F: std::future::Future<Output = T>,
    {
        match self.at {
            None => Ok(fut.await),
            Some(_) => tokio::time::timeout(self.remaining(), fut)
                .await
                .map_err(|_| DeadlineExceeded(self.budget)),
        }
    }
}
