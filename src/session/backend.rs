//! Backend seam used by the coordinator and the stores

use async_trait::async_trait;

use crate::api::{
    ApiClient, ApiError, Message, NewMessage, RecordId, Session, SessionConfig, StatusReport,
    Subscription,
};

/// Everything the live-update side needs from the server
#[async_trait]
pub trait SessionBackend: Send + Sync {
    /// Create a new session
    async fn create_session(
        &self,
        initial_prompt: &str,
        provider: &str,
        config: SessionConfig,
    ) -> Result<Session, ApiError>;

    /// List sessions, paged
    async fn list_sessions(&self, skip: u32, limit: u32) -> Result<Vec<Session>, ApiError>;

    async fn get_session(&self, id: &RecordId) -> Result<Session, ApiError>;

    /// Full transcript of a session
    async fn session_messages(&self, id: &RecordId) -> Result<Vec<Message>, ApiError>;

    async fn session_status(&self, id: &RecordId) -> Result<StatusReport, ApiError>;

    /// Open the session's push channel
    async fn open_stream(&self, id: &RecordId) -> Result<Subscription, ApiError>;

    /// Post a message into a session
    async fn create_message(&self, message: &NewMessage) -> Result<Message, ApiError>;
}

#[async_trait]
impl SessionBackend for ApiClient {
    async fn create_session(
        &self,
        initial_prompt: &str,
        provider: &str,
        config: SessionConfig,
    ) -> Result<Session, ApiError> {
        self.sessions.create(initial_prompt, provider, config).await
    }

    async fn list_sessions(&self, skip: u32, limit: u32) -> Result<Vec<Session>, ApiError> {
        self.sessions.list(skip, limit).await
    }

    async fn get_session(&self, id: &RecordId) -> Result<Session, ApiError> {
        self.sessions.get(id).await
    }

    async fn session_messages(&self, id: &RecordId) -> Result<Vec<Message>, ApiError> {
        self.sessions.messages(id).await
    }

    async fn session_status(&self, id: &RecordId) -> Result<StatusReport, ApiError> {
        self.sessions.status(id).await
    }

    async fn open_stream(&self, id: &RecordId) -> Result<Subscription, ApiError> {
        Ok(self.sessions.open_stream(id))
    }

    async fn create_message(&self, message: &NewMessage) -> Result<Message, ApiError> {
        self.messages.create(message).await
    }
}
