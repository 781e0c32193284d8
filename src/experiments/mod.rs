//! Gradual-rollout experiments
//!
//! An experiment gates optional behavior per repository: an explicit repo
//! allow-list plus a deterministic percentage rollout, both configured via
//! environment variables:
//!
//! - `EXPERIMENT_<NAME>_REPOS`: comma-separated `owner/name` list
//! - `EXPERIMENT_<NAME>_PERCENT`: 0-100 rollout bucket
//!
//! The percentage bucket is keyed on a stable hash of the repo path so a
//! repository's assignment never flaps between jobs.

use sha2::{Digest, Sha256};
use std::env;
use tracing::debug;

pub trait ExperimentChecker: Send + Sync {
    fn is_active_for_analysis(&self, name: &str, repo: &str, default_on: bool) -> bool;
}

#[derive(Debug, Default)]
pub struct EnvExperimentChecker;

impl EnvExperimentChecker {
    pub fn new() -> Self {
        Self
    }

    fn env_key(name: &str, suffix: &str) -> String {
        format!("EXPERIMENT_{}_{}", name.to_uppercase(), suffix)
    }

    fn repo_bucket(repo: &str) -> u64 {
        let digest = Sha256::digest(repo.to_lowercase().as_bytes());
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        u64::from_be_bytes(prefix) % 100
    }
}

impl ExperimentChecker for EnvExperimentChecker {
    fn is_active_for_analysis(&self, name: &str, repo: &str, default_on: bool) -> bool {
        if let Ok(repos) = env::var(Self::env_key(name, "REPOS")) {
            let listed = repos
                .split(',')
                .map(str::trim)
                .any(|r| r.eq_ignore_ascii_case(repo));
            if listed {
                debug!(experiment = name, repo, "active via repo list");
                return true;
            }
        }

        if let Ok(percent) = env::var(Self::env_key(name, "PERCENT")) {
            if let Ok(percent) = percent.parse::<u64>() {
                let active = Self::repo_bucket(repo) < percent;
                debug!(experiment = name, repo, percent, active, "percent rollout");
                return active;
            }
        }

        default_on
    }
}

/// Fixed-answer checker for tests and local runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticExperimentChecker {
    pub active: bool,
}

impl ExperimentChecker for StaticExperimentChecker {
    fn is_active_for_analysis(&self, _name: &str, _repo: &str, _default_on: bool) -> bool {
        self.active
    }
}
