use super::{HttpClient, HttpError};
use crate::util::deadline::Deadline;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// In-memory [`HttpClient`]: GET serves scripted documents, PUT records them.
#[derive(Default)]
pub struct MockHttpClient {
    documents: Mutex<HashMap<String, serde_json::Value>>,
    puts: Arc<Mutex<Vec<(String, serde_json::Value)>>>,
    fail_with: Mutex<Option<HttpError>>,
}

impl MockHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(&self, url: impl Into<String>, doc: serde_json::Value) {
        self.documents.lock().unwrap().insert(url.into(), doc);
    }

    pub fn fail_with(&self, err: HttpError) {
        *self.fail_with.lock().unwrap() = Some(err);
    }

    pub fn puts(&self) -> Vec<(String, serde_json::Value)> {
        self.puts.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn get_json(
        &self,
        _deadline: &Deadline,
        url: &str,
    ) -> Result<serde_json::Value, HttpError> {
        if let Some(err) = self.fail_with.lock().unwrap().clone() {
            return Err(err);
        }
        self.documents
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| HttpError::Status {
                url: url.to_string(),
                status: 404,
            })
    }

    async fn put_json(
        &self,
        _deadline: &Deadline,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<(), HttpError> {
        if let Some(err) = self.fail_with.lock().unwrap().clone() {
            return Err(err);
        }
        self.puts
            .lock()
            .unwrap()
            .push((url.to_string(), body.clone()));
        Ok(())
    }
}
