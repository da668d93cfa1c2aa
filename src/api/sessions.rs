//! Session endpoints

use super::stream::{self, Subscription};
use super::transport::{ApiError, Transport};
use super::types::{CreateSessionRequest, Message, RecordId, Session, SessionConfig, StatusReport};

/// `/sessions/...`
#[derive(Debug, Clone)]
pub struct SessionsApi {
    transport: Transport,
}

impl SessionsApi {
    pub fn new(transport: Transport) -> Self {
        Self { transport }
    }

    /// Start a new agent run
    pub async fn create(
        &self,
        initial_prompt: &str,
        provider: &str,
        config: SessionConfig,
    ) -> Result<Session, ApiError> {
        let request = CreateSessionRequest {
            initial_prompt: initial_prompt.to_string(),
            provider: provider.to_string(),
            config,
        };
        self.transport.post("/sessions/", &request).await
    }

    pub async fn list(&self, skip: u32, limit: u32) -> Result<Vec<Session>, ApiError> {
        let skip = skip.to_string();
        let limit = limit.to_string();
        self.transport
            .get_with_query("/sessions/", &[("skip", skip.as_str()), ("limit", limit.as_str())])
            .await
    }

    pub async fn get(&self, id: &RecordId) -> Result<Session, ApiError> {
        self.transport.get(&format!("/sessions/{}", id)).await
    }

    pub async fn messages(&self, id: &RecordId) -> Result<Vec<Message>, ApiError> {
        self.transport.get(&format!("/sessions/{}/messages", id)).await
    }

    pub async fn status(&self, id: &RecordId) -> Result<StatusReport, ApiError> {
        self.transport.get(&format!("/sessions/{}/status", id)).await
    }

    /// Subscribe to the session's push channel
    pub fn open_stream(&self, id: &RecordId) -> Subscription {
        stream::open(&self.transport, &format!("/sessions/{}/stream", id))
    }
}
