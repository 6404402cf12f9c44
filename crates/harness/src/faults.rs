use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use annolog_storage::{Method, RestRequest, RestResponse, SqliteBackend, StoreError, Transport};

#[derive(Debug, Clone)]
struct Fault {
    method: Method,
    path_prefix: String,
    status: u16,
    /// `None` fails forever.
    remaining: Option<usize>,
}

/// Transport in front of a [`SqliteBackend`] that can be told to reject
/// requests. Rejected requests never reach the backend.
pub struct FaultyTransport {
    backend: Arc<SqliteBackend>,
    faults: Mutex<Vec<Fault>>,
    sent: Mutex<Vec<RestRequest>>,
}

impl FaultyTransport {
    pub fn new(backend: Arc<SqliteBackend>) -> Self {
        Self {
            backend,
            faults: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Reject every `method` request whose path starts with `path_prefix`.
    pub fn fail(&self, method: Method, path_prefix: &str, status: u16) {
        self.push(method, path_prefix, status, None);
    }

    /// Reject the next `times` matching requests, then let them through.
    pub fn fail_times(&self, method: Method, path_prefix: &str, status: u16, times: usize) {
        self.push(method, path_prefix, status, Some(times));
    }

    pub fn heal(&self) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.clear();
        }
    }

    /// Everything that was sent, rejected requests included.
    pub fn sent(&self) -> Vec<RestRequest> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    fn push(&self, method: Method, path_prefix: &str, status: u16, remaining: Option<usize>) {
        if remaining == Some(0) {
            return;
        }
        if let Ok(mut faults) = self.faults.lock() {
            faults.push(Fault {
                method,
                path_prefix: path_prefix.to_string(),
                status,
                remaining,
            });
        }
    }

    fn injected(&self, request: &RestRequest) -> Result<Option<u16>, StoreError> {
        let mut faults = self
            .faults
            .lock()
            .map_err(|_| StoreError::Transport("fault table poisoned".into()))?;
        let Some(index) = faults
            .iter()
            .position(|f| f.method == request.method && request.path.starts_with(&f.path_prefix))
        else {
            return Ok(None);
        };
        let status = faults[index].status;
        if let Some(remaining) = faults[index].remaining.as_mut() {
            *remaining -= 1;
            if *remaining == 0 {
                faults.remove(index);
            }
        }
        Ok(Some(status))
    }
}

#[async_trait]
impl Transport for FaultyTransport {
    async fn send(&self, request: RestRequest) -> Result<RestResponse, StoreError> {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(request.clone());
        }
        // let sibling requests of a group interleave
        tokio::task::yield_now().await;

        if let Some(status) = self.injected(&request)? {
            debug!(method = %request.method, path = %request.path, status, "injected failure");
            return Ok(RestResponse::new(
                status,
                json!({ "message": format!("injected failure for {}", request.path) }),
            ));
        }
        self.backend.send(request).await
    }
}
