use super::api_storage::Storage;
use super::State;
use crate::httputils::HttpError;
use crate::util::deadline::Deadline;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

/// In-memory [`Storage`] double: scripted reads, recorded writes.
#[derive(Default)]
pub struct MockStorage {
    current: Mutex<Option<State>>,
    get_error: Mutex<Option<HttpError>>,
    update_error: Mutex<Option<HttpError>>,
    updates: Arc<Mutex<Vec<State>>>,
    call_log: Option<Arc<Mutex<Vec<String>>>>,
}

impl MockStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_call_log(mut self, log: Arc<Mutex<Vec<String>>>) -> Self {
        self.call_log = Some(log);
        self
    }

    pub fn set_current(&self, state: State) {
        *self.current.lock().unwrap() = Some(state);
    }

    pub fn fail_get(&self, err: HttpError) {
        *self.get_error.lock().unwrap() = Some(err);
    }

    pub fn fail_update(&self, err: HttpError) {
        *self.update_error.lock().unwrap() = Some(err);
    }

    pub fn updates(&self) -> Vec<State> {
        self.updates.lock().unwrap().clone()
    }

    fn log(&self, entry: impl Into<String>) {
        if let Some(log) = &self.call_log {
            log.lock().unwrap().push(entry.into());
        }
    }
}

#[async_trait]
impl Storage for MockStorage {
    async fn get_state(
        &self,
        _deadline: &Deadline,
        _owner: &str,
        _name: &str,
        analysis_id: &str,
    ) -> Result<State, HttpError> {
        self.log("get_state");
        if let Some(err) = self.get_error.lock().unwrap().clone() {
            return Err(err);
        }
        self.current
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| HttpError::Status {
                url: format!("mock://repoanalyzes/{analysis_id}"),
                status: 404,
            })
    }

    async fn update_state(
        &self,
        _deadline: &Deadline,
        _owner: &str,
        _name: &str,
        _analysis_id: &str,
        state: &State,
    ) -> Result<(), HttpError> {
        self.log(format!("update_state:{}", state.status));
        if let Some(err) = self.update_error.lock().unwrap().clone() {
            return Err(err);
        }
        *self.current.lock().unwrap() = Some(state.clone());
        self.updates.lock().unwrap().push(state.clone());
        Ok(())
    }
}
