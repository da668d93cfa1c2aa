//! Message endpoints

use super::transport::{ApiError, Transport};
use super::types::{Message, NewMessage, RecordId};

/// `/messages/...`
#[derive(Debug, Clone)]
pub struct MessagesApi {
    transport: Transport,
}

impl MessagesApi {
    pub fn new(transport: Transport) -> Self {
        Self { transport }
    }

    pub async fn create(&self, message: &NewMessage) -> Result<Message, ApiError> {
        self.transport.post("/messages/", message).await
    }

    pub async fn list_by_session(&self, session_id: &RecordId) -> Result<Vec<Message>, ApiError> {
        self.transport
            .get(&format!("/messages/session/{}", session_id))
            .await
    }
}
