//! Transcript store for the session being followed

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{error, info, warn};

use super::{StoreError, StoreStatus};
use crate::api::{Message, NewMessage, RecordId, Role, Session, SessionConfig, StatusReport};
use crate::session::{LiveUpdateCoordinator, SessionBackend, SessionSnapshot, UpdateStrategy};

/// Derived views over the coordinator's transcript, plus user actions
pub struct MessagesStore {
    coordinator: Arc<LiveUpdateCoordinator>,
    backend: Arc<dyn SessionBackend>,
    status: Mutex<StoreStatus>,
}

impl MessagesStore {
    pub fn new(coordinator: Arc<LiveUpdateCoordinator>, backend: Arc<dyn SessionBackend>) -> Self {
        Self {
            coordinator,
            backend,
            status: Mutex::new(StoreStatus::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreStatus> {
        self.status.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn coordinator(&self) -> &Arc<LiveUpdateCoordinator> {
        &self.coordinator
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.coordinator.snapshot()
    }

    pub fn is_loading(&self) -> bool {
        self.lock().loading
    }

    pub fn error(&self) -> Option<String> {
        self.lock().error.clone()
    }

    pub fn clear_error(&self) {
        self.lock().error = None;
    }

    pub fn current_session(&self) -> Option<Session> {
        self.snapshot().session
    }

    pub fn session_status(&self) -> Option<StatusReport> {
        self.snapshot().status
    }

    pub fn messages(&self) -> Vec<Message> {
        self.snapshot().messages
    }

    pub fn messages_by_role(&self, role: Role) -> Vec<Message> {
        self.messages()
            .into_iter()
            .filter(|m| m.role == role)
            .collect()
    }

    pub fn assistant_messages(&self) -> Vec<Message> {
        self.messages_by_role(Role::Assistant)
    }

    pub fn user_messages(&self) -> Vec<Message> {
        self.messages_by_role(Role::User)
    }

    pub fn tool_messages(&self) -> Vec<Message> {
        self.messages_by_role(Role::Tool)
    }

    pub fn has_messages(&self) -> bool {
        !self.snapshot().messages.is_empty()
    }

    pub fn last_message(&self) -> Option<Message> {
        self.snapshot().messages.pop()
    }

    pub fn has_screenshots(&self) -> bool {
        self.snapshot().messages.iter().any(Message::has_image)
    }

    /// Most recent message carrying a screenshot
    pub fn latest_screenshot(&self) -> Option<Message> {
        self.snapshot()
            .messages
            .into_iter()
            .rev()
            .find(Message::has_image)
    }

    pub fn has_new_messages(&self) -> bool {
        self.snapshot().has_new_messages()
    }

    pub fn is_session_active(&self) -> bool {
        self.snapshot().is_session_active()
    }

    pub fn is_polling(&self) -> bool {
        self.snapshot().is_polling()
    }

    pub fn is_streaming(&self) -> bool {
        self.snapshot().is_streaming()
    }

    fn finish<T>(&self, result: &Result<T, StoreError>) {
        self.lock().end(result);
        if let Err(e) = result {
            error!("Messages store action failed: {}", e);
        }
    }

    /// Create a session and follow it with `strategy`
    pub async fn start_new_session(
        &self,
        initial_prompt: &str,
        provider: &str,
        config: SessionConfig,
        strategy: UpdateStrategy,
    ) -> Result<Session, StoreError> {
        self.lock().begin();
        let result = self
            .coordinator
            .start_session(initial_prompt, provider, config, strategy)
            .await
            .map_err(StoreError::from);
        self.finish(&result);
        if let Ok(session) = &result {
            info!("Session started: {}", session.id);
        }
        result
    }

    pub async fn load_existing_session(
        &self,
        id: &RecordId,
        strategy: UpdateStrategy,
    ) -> Result<Session, StoreError> {
        self.lock().begin();
        let result = self
            .coordinator
            .load_existing_session(id, strategy)
            .await
            .map_err(StoreError::from);
        self.finish(&result);
        result
    }

    /// Manual refresh; failures land in the error slot only
    pub async fn refresh_messages(&self) {
        if self.coordinator.session_id().is_none() {
            warn!("No current session to refresh");
            return;
        }

        let result = self
            .coordinator
            .refresh()
            .await
            .map_err(StoreError::from);
        match &result {
            Ok(()) => self.lock().error = None,
            Err(e) => {
                error!("Failed to refresh messages: {}", e);
                self.lock().error = Some(e.to_string());
            }
        }
    }

    /// Post a user turn to the current session and show it
    pub async fn send_message(&self, text: &str) -> Result<Message, StoreError> {
        self.lock().begin();
        let result = match self.coordinator.session_id() {
            Some(session_id) => self
                .backend
                .create_message(&NewMessage::user_text(session_id, text))
                .await
                .map_err(StoreError::from),
            None => Err(StoreError::NoSession),
        };
        self.finish(&result);

        let message = result?;
        self.coordinator.append_message(message.clone());
        Ok(message)
    }

    pub fn stop_updates(&self) {
        self.coordinator.stop();
    }

    pub fn clear_session(&self) {
        self.coordinator.clear_session();
        self.lock().error = None;
    }
}
