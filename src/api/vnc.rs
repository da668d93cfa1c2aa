//! Remote desktop endpoints

use reqwest::Method;
use serde_json::Value;

use super::transport::{ApiError, Transport};
use super::types::{Screenshot, VncStatus};

/// `/vnc/...`
#[derive(Debug, Clone)]
pub struct VncApi {
    transport: Transport,
}

impl VncApi {
    pub fn new(transport: Transport) -> Self {
        Self { transport }
    }

    pub async fn status(&self) -> Result<VncStatus, ApiError> {
        self.transport.get("/vnc/status").await
    }

    /// Ask the backend to launch the desktop services; returns before they are up
    pub async fn start(&self) -> Result<Value, ApiError> {
        self.transport.post_empty("/vnc/start").await
    }

    pub async fn stop(&self) -> Result<Value, ApiError> {
        self.transport.post_empty("/vnc/stop").await
    }

    pub async fn restart(&self) -> Result<Value, ApiError> {
        self.transport.post_empty("/vnc/restart").await
    }

    pub async fn screenshot(&self) -> Result<Screenshot, ApiError> {
        self.transport.get("/vnc/screenshot").await
    }

    /// Send one input action (`click`, `type`, `key`) with its parameters
    pub async fn interact(&self, action: &str, payload: &Value) -> Result<Value, ApiError> {
        self.transport
            .request_with_query(Method::POST, "/vnc/interact", &[("action", action)], Some(payload))
            .await
    }
}
