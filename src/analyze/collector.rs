//! Per-job result accumulation and secret redaction
//!
//! The collector owns three ordered accumulators scoped to one job: stage
//! timings, public warnings, and (built on demand) the secret map used to
//! redact every piece of text that can become user-visible.

use crate::state::{Timing, Warning};
use std::time::{Duration, Instant};

const HIDDEN: &str = "{hidden}";

/// Minimum length for a process env value to enter the secret map. Shorter
/// values would redact half the alphabet.
const MIN_SECRET_LEN: usize = 6;

/// Ordered `(secret, replacement)` pairs, longest secrets first so nested
/// secrets don't leave fragments behind.
pub type SecretMap = Vec<(String, String)>;

#[derive(Debug, Default)]
pub struct ResultCollector {
    timings: Vec<Timing>,
    warnings: Vec<Warning>,
}

impl ResultCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Measures wall-clock time around `f` and appends it as `name`.
    pub fn track_timing<T>(&mut self, name: &str, f: impl FnOnce() -> T) -> T {
        let started = Instant::now();
        let out = f();
        self.add_timing(name, started.elapsed());
        out
    }

    /// Appends a timing covering `t0` until now. Used around async stages,
    /// where a closure can't span the await.
    pub fn add_timing_from(&mut self, name: &str, t0: Instant) {
        self.add_timing(name, t0.elapsed());
    }

    pub fn add_timing(&mut self, name: &str, duration: Duration) {
        self.timings.push(Timing::new(name, duration));
    }

    /// Appends a user-visible warning. `text` must already be redacted.
    pub fn public_warn(&mut self, tag: &str, text: &str) {
        self.warnings.push(Warning {
            tag: tag.to_string(),
            text: text.to_string(),
        });
    }

    pub fn timings(&self) -> &[Timing] {
        &self.timings
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }
}

/// Replaces every secret occurrence in `text` with its replacement.
pub fn escape_error_text(text: &str, secrets: &SecretMap) -> String {
    let mut out = text.to_string();
    for (secret, replacement) in secrets {
        out = out.replace(secret, replacement);
    }
    out
}

/// Builds the redaction dictionary for one job.
///
/// Sources: the hosting access credential, the analysis id, caller-provided
/// workspace secrets (e.g. the GOPATH, replaced by `$GOPATH` instead of
/// hidden), and every process environment value of length >= 6.
pub fn build_secrets(
    access_token: &str,
    analysis_guid: &str,
    workspace: &[(String, String)],
) -> SecretMap {
    let mut secrets: SecretMap = Vec::new();

    if !access_token.is_empty() {
        secrets.push((access_token.to_string(), HIDDEN.to_string()));
    }
    if !analysis_guid.is_empty() {
        secrets.push((analysis_guid.to_string(), HIDDEN.to_string()));
    }
    for (value, replacement) in workspace {
        if !value.is_empty() {
            secrets.push((value.clone(), replacement.clone()));
        }
    }

    for (_, value) in std::env::vars() {
        if value.len() >= MIN_SECRET_LEN {
            secrets.push((value, HIDDEN.to_string()));
        }
    }

    // Longest first: a secret embedded in a longer one must not survive as
    // a fragment.
    secrets.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
    secrets.dedup();
    secrets
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_timing_measures_wall_clock() {
        let mut collector = ResultCollector::new();
        let out = collector.track_timing("Analysis", || {
            std::thread::sleep(Duration::from_millis(25));
            "done"
        });
        assert_eq!(out, "done");

        let timings = collector.timings();
        assert_eq!(timings.len(), 1);
        assert_eq!(timings[0].name, "Analysis");
        assert!(timings[0].duration_ms >= 25);
    }

    #[test]
    fn test_timings_append_in_order() {
        let mut collector = ResultCollector::new();
        collector.add_timing("Clone", Duration::from_millis(1));
        collector.add_timing_from("Deps", Instant::now());
        collector.add_timing("Analysis", Duration::from_millis(3));

        let names: Vec<_> = collector.timings().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Clone", "Deps", "Analysis"]);
    }

    #[test]
    fn test_public_warn_appends() {
        let mut collector = ResultCollector::new();
        collector.public_warn("prepare repo", "first");
        collector.public_warn("github", "second");

        let warnings = collector.warnings();
        assert_eq!(warnings.len(), 2);
        assert_eq!(warnings[0].tag, "prepare repo");
        assert_eq!(warnings[1].text, "second");
    }

    #[test]
    fn test_escape_replaces_every_occurrence() {
        let secrets = vec![("tok-secret".to_string(), "{hidden}".to_string())];
        let out = escape_error_text("clone https://tok-secret@x failed: tok-secret bad", &secrets);
        assert_eq!(out, "clone https://{hidden}@x failed: {hidden} bad");
    }

    #[test]
    fn test_longer_secrets_replaced_first() {
        let secrets = build_secrets("tok", "tok-123456", &[]);
        let out = escape_error_text("auth tok-123456 with tok", &secrets);
        assert!(!out.contains("tok-123456"));
        assert!(!out.contains("tok "));
    }

    #[test]
    fn test_workspace_secret_replacement() {
        let workspace = vec![("/tmp/prcheck.analyze.x".to_string(), "$GOPATH".to_string())];
        let secrets = build_secrets("", "", &workspace);
        let out = escape_error_text("can't write /tmp/prcheck.analyze.x/src/main.go", &secrets);
        assert_eq!(out, "can't write $GOPATH/src/main.go");
    }

    #[test]
    fn test_env_values_enter_secret_map() {
        std::env::set_var("PRCHECK_COLLECTOR_TEST_SECRET", "super-secret-value");
        let secrets = build_secrets("", "", &[]);
        let out = escape_error_text("leaked super-secret-value here", &secrets);
        assert_eq!(out, "leaked {hidden} here");
        std::env::remove_var("PRCHECK_COLLECTOR_TEST_SECRET");
    }

    #[test]
    fn test_short_env_values_are_not_redacted() {
        std::env::set_var("PRCHECK_COLLECTOR_TEST_SHORT", "abc");
        let secrets = build_secrets("", "", &[]);
        let out = escape_error_text("abc stays", &secrets);
        assert_eq!(out, "abc stays");
        std::env::remove_var("PRCHECK_COLLECTOR_TEST_SHORT");
    }

    #[test]
    fn test_empty_credentials_are_skipped() {
        let secrets = build_secrets("", "", &[]);
        assert!(secrets.iter().all(|(secret, _)| !secret.is_empty()));
    }
}
