//! HTTP API client for the control panel backend

pub mod messages;
pub mod sessions;
pub mod stream;
pub mod transport;
pub mod types;
pub mod vnc;

use std::time::Duration;

use tracing::{debug, info};

pub use messages::MessagesApi;
pub use sessions::SessionsApi;
pub use stream::{SseDecoder, StreamEvent, Subscription};
pub use transport::{ApiError, Transport, TransportOptions};
pub use types::*;
pub use vnc::VncApi;

/// Default backend address
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// All endpoint groups over one shared transport
#[derive(Debug, Clone)]
pub struct ApiClient {
    transport: Transport,
    pub sessions: SessionsApi,
    pub messages: MessagesApi,
    pub vnc: VncApi,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_transport(Transport::new(base_url))
    }

    pub fn with_transport(transport: Transport) -> Self {
        Self {
            sessions: SessionsApi::new(transport.clone()),
            messages: MessagesApi::new(transport.clone()),
            vnc: VncApi::new(transport.clone()),
            transport,
        }
    }

    pub fn base_url(&self) -> &str {
        self.transport.base_url()
    }

    pub async fn health(&self) -> Result<Health, ApiError> {
        self.transport.get("/").await
    }

    /// Session and its transcript, fetched concurrently
    pub async fn session_with_messages(
        &self,
        id: &RecordId,
    ) -> Result<(Session, Vec<Message>), ApiError> {
        tokio::try_join!(self.sessions.get(id), self.messages.list_by_session(id))
    }

    /// Poll once a second until the session is terminal, then fetch its transcript
    pub async fn wait_for_completion(
        &self,
        id: &RecordId,
        max_wait: Duration,
    ) -> Result<(Session, Vec<Message>), ApiError> {
        let started = tokio::time::Instant::now();

        while started.elapsed() < max_wait {
            let session = self.sessions.get(id).await?;
            debug!("Session {} is {}", id, session.status);

            if session.status.is_terminal() {
                let messages = self.messages.list_by_session(id).await?;
                info!("Session {} finished as {}", id, session.status);
                return Ok((session, messages));
            }

            tokio::time::sleep(Duration::from_secs(1)).await;
        }

        Err(ApiError::Timeout(max_wait))
    }
}

impl Default for ApiClient {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}
