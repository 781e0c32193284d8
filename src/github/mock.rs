use super::client::{Client, ClientError, ReviewComment};
use super::{CheckStatus, GithubContext, PullRequest};
use crate::util::deadline::Deadline;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

/// One recorded `set_commit_status` call.
#[derive(Debug, Clone)]
pub struct RecordedStatus {
    pub sha: String,
    pub status: CheckStatus,
    pub description: String,
    pub details_url: String,
}

/// One recorded `post_review` call.
#[derive(Debug, Clone)]
pub struct RecordedReview {
    pub sha: String,
    pub comments: Vec<ReviewComment>,
}

/// Test double for [`Client`] with scripted responses and recorded writes.
///
/// An optional shared call log receives an entry per operation, letting
/// tests assert cross-collaborator ordering (state write before status
/// write).
#[derive(Default)]
pub struct MockClient {
    pull_request: Mutex<Option<Result<PullRequest, ClientError>>>,
    patch: Mutex<Option<Result<String, ClientError>>>,
    review_error: Mutex<Option<ClientError>>,
    status_error: Mutex<Option<ClientError>>,
    statuses: Arc<Mutex<Vec<RecordedStatus>>>,
    reviews: Arc<Mutex<Vec<RecordedReview>>>,
    call_log: Option<Arc<Mutex<Vec<String>>>>,
}

impl MockClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_call_log(mut self, log: Arc<Mutex<Vec<String>>>) -> Self {
        self.call_log = Some(log);
        self
    }

    pub fn respond_pull_request(&self, pr: PullRequest) {
        *self.pull_request.lock().unwrap() = Some(Ok(pr));
    }

    pub fn fail_pull_request(&self, err: ClientError) {
        *self.pull_request.lock().unwrap() = Some(Err(err));
    }

    pub fn respond_patch(&self, patch: impl Into<String>) {
        *self.patch.lock().unwrap() = Some(Ok(patch.into()));
    }

    pub fn fail_patch(&self, err: ClientError) {
        *self.patch.lock().unwrap() = Some(Err(err));
    }

    pub fn fail_review(&self, err: ClientError) {
        *self.review_error.lock().unwrap() = Some(err);
    }

    pub fn fail_status(&self, err: ClientError) {
        *self.status_error.lock().unwrap() = Some(err);
    }

    pub fn statuses(&self) -> Vec<RecordedStatus> {
        self.statuses.lock().unwrap().clone()
    }

    pub fn reviews(&self) -> Vec<RecordedReview> {
        self.reviews.lock().unwrap().clone()
    }

    fn log(&self, entry: impl Into<String>) {
        if let Some(log) = &self.call_log {
            log.lock().unwrap().push(entry.into());
        }
    }
}

#[async_trait]
impl Client for MockClient {
    async fn get_pull_request(
        &self,
        _deadline: &Deadline,
        _ctx: &GithubContext,
    ) -> Result<PullRequest, ClientError> {
        self.log("get_pull_request");
        self.pull_request
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| {
                Err(ClientError::Api {
                    status: 404,
                    message: "no scripted pull request".to_string(),
                })
            })
    }

    async fn get_pull_request_patch(
        &self,
        _deadline: &Deadline,
        _ctx: &GithubContext,
    ) -> Result<String, ClientError> {
        self.log("get_pull_request_patch");
        self.patch.lock().unwrap().clone().unwrap_or(Ok(String::new()))
    }

    async fn post_review(
        &self,
        _deadline: &Deadline,
        _ctx: &GithubContext,
        sha: &str,
        comments: &[ReviewComment],
    ) -> Result<(), ClientError> {
        self.log("post_review");
        if let Some(err) = self.review_error.lock().unwrap().clone() {
            return Err(err);
        }
        self.reviews.lock().unwrap().push(RecordedReview {
            sha: sha.to_string(),
            comments: comments.to_vec(),
        });
        Ok(())
    }

    async fn set_commit_status(
        &self,
        _deadline: &Deadline,
        _ctx: &GithubContext,
        sha: &str,
        status: CheckStatus,
        description: &str,
        details_url: &str,
    ) -> Result<(), ClientError> {
        self.log(format!("set_commit_status:{status}"));
        if let Some(err) = self.status_error.lock().unwrap().clone() {
            return Err(err);
        }
        self.statuses.lock().unwrap().push(RecordedStatus {
            sha: sha.to_string(),
            status,
            description: description.to_string(),
            details_url: details_url.to_string(),
        });
        Ok(())
    }
}
