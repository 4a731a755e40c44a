use std::time::Duration;

use serde_json::json;

use crate::coordination::Registration;
use crate::error::{AgentError, Result};
use crate::pane::PaneId;

const HOOK_TIMEOUT: Duration = Duration::from_secs(2);

/// Client for the coordination server's internal endpoints, used from hook
/// processes and `run`.
#[derive(Debug, Clone)]
pub struct CoordinatorClient {
    base_url: String,
    http: reqwest::Client,
}

impl CoordinatorClient {
    pub fn new(port: u16) -> Result<Self> {
        Self::with_timeout(port, HOOK_TIMEOUT)
    }

    pub fn with_timeout(port: u16, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: format!("http://127.0.0.1:{port}"),
            http,
        })
    }

    /// Tell the server `pane` finished a turn.
    pub async fn idle(&self, pane: PaneId) -> Result<()> {
        self.post("/idle", &json!({ "pane_id": pane })).await
    }

    pub async fn register(&self, registration: &Registration) -> Result<()> {
        self.post("/register", &serde_json::to_value(registration)?)
            .await
    }

    async fn post(&self, path: &str, body: &serde_json::Value) -> Result<()> {
        let response = self
            .http
            .post(format!("{}{path}", self.base_url))
            .json(body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AgentError::Server {
                reason: format!("POST {path} returned {status}: {text}"),
            });
        }
        Ok(())
    }
}
