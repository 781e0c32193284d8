//! Reporting findings back to the pull request
//!
//! The reviewer turns analyzer issues into inline review comments at the PR
//! head commit. Issues that can't be anchored in the diff are dropped here
//! rather than rejected by the hosting provider.

use crate::github::client::{Client, ReviewComment};
use crate::github::GithubContext;
use crate::linters::Issue;
use crate::util::deadline::Deadline;
use anyhow::{Context as _, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

#[async_trait]
pub trait Reporter: Send + Sync {
    async fn report(
        &self,
        deadline: &Deadline,
        ctx: &GithubContext,
        sha: &str,
        issues: &[Issue],
    ) -> Result<()>;
}

/// Posts one review with an inline comment per issue.
pub struct GithubReviewer {
    client: Arc<dyn Client>,
    /// When set, comments lead with the linter that produced them.
    include_linter_name: bool,
}

impl GithubReviewer {
    pub fn new(client: Arc<dyn Client>, include_linter_name: bool) -> Self {
        Self {
            client,
            include_linter_name,
        }
    }

    fn comment_body(&self, issue: &Issue) -> String {
        if self.include_linter_name && !issue.from_linter.is_empty() {
            format!("{}: {}", issue.from_linter, issue.text)
        } else {
            issue.text.clone()
        }
    }
}

#[async_trait]
impl Reporter for GithubReviewer {
    async fn report(
        &self,
        deadline: &Deadline,
        ctx: &GithubContext,
        sha: &str,
        issues: &[Issue],
    ) -> Result<()> {
        let comments: Vec<ReviewComment> = issues
            .iter()
            .filter_map(|issue| {
                let position = issue.hunk_pos?;
                Some(ReviewComment {
                    path: issue.file.clone(),
                    position,
                    body: self.comment_body(issue),
                })
            })
            .collect();

        if comments.len() < issues.len() {
            debug!(
                dropped = issues.len() - comments.len(),
                "issues without a diff position won't be commented inline"
            );
        }

        if comments.is_empty() {
            return Ok(());
        }

        info!(count = comments.len(), %sha, "posting review comments");
        self.client
            .post_review(deadline, ctx, sha, &comments)
            .await
            .context("can't post review")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::{GithubRepo, MockClient};
    use std::time::Duration;

    fn ctx() -> GithubContext {
        GithubContext {
            repo: GithubRepo::new("owner", "name"),
            access_token: "t".to_string(),
            pull_request_number: 1,
        }
    }

    fn issue(text: &str, hunk_pos: Option<u32>) -> Issue {
        Issue {
            from_linter: "govet".to_string(),
            text: text.to_string(),
            file: "main.go".to_string(),
            line_number: 10,
            hunk_pos,
        }
    }

    #[tokio::test]
    async fn test_posts_comment_per_issue() {
        let client = Arc::new(MockClient::new());
        let reviewer = GithubReviewer::new(Arc::clone(&client) as Arc<_>, false);
        let deadline = Deadline::after(Duration::from_secs(5));

        reviewer
            .report(
                &deadline,
                &ctx(),
                "abc123",
                &[issue("first", Some(1)), issue("second", Some(7))],
            )
            .await
            .unwrap();

        let reviews = client.reviews();
        assert_eq!(reviews.len(), 1);
        assert_eq!(reviews[0].sha, "abc123");
        assert_eq!(reviews[0].comments.len(), 2);
        assert_eq!(reviews[0].comments[0].body, "first");
        assert_eq!(reviews[0].comments[1].position, 7);
    }

    #[tokio::test]
    async fn test_linter_name_prefix_experiment() {
        let client = Arc::new(MockClient::new());
        let reviewer = GithubReviewer::new(Arc::clone(&client) as Arc<_>, true);
        let deadline = Deadline::after(Duration::from_secs(5));

        reviewer
            .report(&deadline, &ctx(), "abc123", &[issue("shadowed var", Some(2))])
            .await
            .unwrap();

        assert_eq!(client.reviews()[0].comments[0].body, "govet: shadowed var");
    }

    #[tokio::test]
    async fn test_skips_issues_outside_the_diff() {
        let client = Arc::new(MockClient::new());
        let reviewer = GithubReviewer::new(Arc::clone(&client) as Arc<_>, false);
        let deadline = Deadline::after(Duration::from_secs(5));

        reviewer
            .report(
                &deadline,
                &ctx(),
                "abc123",
                &[issue("inline", Some(4)), issue("outside diff", None)],
            )
            .await
            .unwrap();

        assert_eq!(client.reviews()[0].comments.len(), 1);
        assert_eq!(client.reviews()[0].comments[0].body, "inline");
    }

    #[tokio::test]
    async fn test_no_commentable_issues_posts_nothing() {
        let client = Arc::new(MockClient::new());
        let reviewer = GithubReviewer::new(Arc::clone(&client) as Arc<_>, false);
        let deadline = Deadline::after(Duration::from_secs(5));

        reviewer
            .report(&deadline, &ctx(), "abc123", &[issue("outside", None)])
            .await
            .unwrap();
        assert!(client.reviews().is_empty());
    }
}
