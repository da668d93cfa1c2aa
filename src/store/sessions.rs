//! Session list store

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, error};

use super::StoreStatus;
use crate::api::{ApiError, RecordId, Session, SessionConfig};
use crate::session::SessionBackend;

#[derive(Debug, Default)]
struct SessionsState {
    sessions: Vec<Session>,
    current: Option<Session>,
    status: StoreStatus,
}

/// Known sessions and the one currently selected
pub struct SessionsStore {
    backend: Arc<dyn SessionBackend>,
    state: Mutex<SessionsState>,
}

impl SessionsStore {
    pub fn new(backend: Arc<dyn SessionBackend>) -> Self {
        Self {
            backend,
            state: Mutex::new(SessionsState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionsState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn track<T>(
        &self,
        action: impl Future<Output = Result<T, ApiError>>,
    ) -> Result<T, ApiError> {
        self.lock().status.begin();
        let result = action.await;
        self.lock().status.end(&result);
        if let Err(e) = &result {
            error!("Session store action failed: {}", e);
        }
        result
    }

    pub fn sessions(&self) -> Vec<Session> {
        self.lock().sessions.clone()
    }

    pub fn current_session(&self) -> Option<Session> {
        self.lock().current.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.lock().status.loading
    }

    pub fn error(&self) -> Option<String> {
        self.lock().status.error.clone()
    }

    /// Newest first; sessions without a timestamp go last
    pub fn sorted_sessions(&self) -> Vec<Session> {
        let mut sessions = self.sessions();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        sessions
    }

    pub fn session_count(&self) -> usize {
        self.lock().sessions.len()
    }

    pub async fn fetch_sessions(&self, skip: u32, limit: u32) -> Result<Vec<Session>, ApiError> {
        let sessions = self
            .track(self.backend.list_sessions(skip, limit))
            .await?;
        debug!("Fetched {} sessions", sessions.len());
        self.lock().sessions = sessions.clone();
        Ok(sessions)
    }

    /// Reload with the default page
    pub async fn refresh_sessions(&self) -> Result<Vec<Session>, ApiError> {
        self.fetch_sessions(0, 100).await
    }

    /// Fetch one session; the list and selection are left alone
    pub async fn fetch_session(&self, id: &RecordId) -> Result<Session, ApiError> {
        self.track(self.backend.get_session(id)).await
    }

    /// Create a session, put it at the front of the list and select it
    pub async fn create_session(
        &self,
        initial_prompt: &str,
        provider: &str,
    ) -> Result<Session, ApiError> {
        let session = self
            .track(
                self.backend
                    .create_session(initial_prompt, provider, SessionConfig::default()),
            )
            .await?;

        let mut state = self.lock();
        state.sessions.insert(0, session.clone());
        state.current = Some(session.clone());
        Ok(session)
    }

    pub fn set_current_session(&self, session: Option<Session>) {
        self.lock().current = session;
    }

    pub fn clear_error(&self) {
        self.lock().status.error = None;
    }
}
