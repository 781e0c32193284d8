use super::State;
use crate::httputils::{HttpClient, HttpError};
use crate::util::deadline::Deadline;
use async_trait::async_trait;
use std::sync::Arc;

/// Durable key/value persistence of per-analysis state.
///
/// Keys are `(owner, name, analysis id)` triples; writes are serial per
/// analysis id because one worker owns the job for its lifetime.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn get_state(
        &self,
        deadline: &Deadline,
        owner: &str,
        name: &str,
        analysis_id: &str,
    ) -> Result<State, HttpError>;

    async fn update_state(
        &self,
        deadline: &Deadline,
        owner: &str,
        name: &str,
        analysis_id: &str,
        state: &State,
    ) -> Result<(), HttpError>;
}

/// [`Storage`] over the remote state-store API. No local caching; every call
/// is a round trip.
pub struct ApiStorage {
    host: String,
    client: Arc<dyn HttpClient>,
}

impl ApiStorage {
    pub fn new(host: impl Into<String>, client: Arc<dyn HttpClient>) -> Self {
        Self {
            host: host.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    fn analysis_url(&self, owner: &str, name: &str, analysis_id: &str) -> String {
        format!(
            "{}/v1/repos/github.com/{}/{}/repoanalyzes/{}",
            self.host, owner, name, analysis_id
        )
    }
}

#[async_trait]
impl Storage for ApiStorage {
    async fn get_state(
        &self,
        deadline: &Deadline,
        owner: &str,
        name: &str,
        analysis_id: &str,
    ) -> Result<State, HttpError> {
        let url = self.analysis_url(owner, name, analysis_id);
        let doc = self.client.get_json(deadline, &url).await?;
        serde_json::from_value(doc).map_err(|e| HttpError::Decode {
            url,
            detail: e.to_string(),
        })
    }

    async fn update_state(
        &self,
        deadline: &Deadline,
        owner: &str,
        name: &str,
        analysis_id: &str,
        state: &State,
    ) -> Result<(), HttpError> {
        let url = self.analysis_url(owner, name, analysis_id);
        let body = serde_json::to_value(state).map_err(|e| HttpError::Decode {
            url: url.clone(),
            detail: e.to_string(),
        })?;
        self.client.put_json(deadline, &url, &body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::httputils::MockHttpClient;
    use crate::state::{processed_status, STATUS_SENT_TO_QUEUE};
    use crate::github::CheckStatus;
    use std::time::Duration;

    const URL: &str =
        "https://api.example.com/v1/repos/github.com/owner/name/repoanalyzes/guid-1";

    #[test]
    fn test_analysis_url_format() {
        let storage = ApiStorage::new(
            "https://api.example.com/",
            Arc::new(MockHttpClient::new()),
        );
        assert_eq!(storage.analysis_url("owner", "name", "guid-1"), URL);
    }

    #[tokio::test]
    async fn test_get_state_decodes_record() {
        let http = Arc::new(MockHttpClient::new());
        http.serve(URL, serde_json::json!({"status": STATUS_SENT_TO_QUEUE}));

        let storage = ApiStorage::new("https://api.example.com", http);
        let deadline = Deadline::after(Duration::from_secs(5));
        let state = storage
            .get_state(&deadline, "owner", "name", "guid-1")
            .await
            .unwrap();
        assert_eq!(state.status, STATUS_SENT_TO_QUEUE);
    }

    #[tokio::test]
    async fn test_update_state_puts_json() {
        let http = Arc::new(MockHttpClient::new());
        let storage = ApiStorage::new("https://api.example.com", Arc::clone(&http) as Arc<_>);

        let state = State {
            status: processed_status(CheckStatus::Success),
            reported_issues_count: 0,
            result_json: None,
            created_at: None,
        };
        let deadline = Deadline::after(Duration::from_secs(5));
        storage
            .update_state(&deadline, "owner", "name", "guid-1", &state)
            .await
            .unwrap();

        let puts = http.puts();
        assert_eq!(puts.len(), 1);
        assert_eq!(puts[0].0, URL);
        assert_eq!(puts[0].1["status"], "processed/success");
    }

    #[tokio::test]
    async fn test_transport_errors_bubble() {
        let http = Arc::new(MockHttpClient::new());
        http.fail_with(HttpError::Status {
            url: URL.to_string(),
            status: 503,
        });

        let storage = ApiStorage::new("https://api.example.com", http);
        let deadline = Deadline::after(Duration::from_secs(5));
        let err = storage
            .get_state(&deadline, "owner", "name", "guid-1")
            .await
            .unwrap_err();
        assert!(matches!(err, HttpError::Status { status: 503, .. }));
    }
}
