// Shared fakes for the integration tests
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use agent_console::api::{
    ApiError, Message, MessageContent, NewMessage, RecordId, Role, Session, SessionConfig,
    SessionStatus, StatusReport, StreamEvent, Subscription,
};
use agent_console::session::SessionBackend;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tokio::sync::mpsc;

pub fn session(id: &str, status: SessionStatus) -> Session {
    Session {
        id: RecordId::new(id),
        initial_prompt: "list files".to_string(),
        provider: "bedrock".to_string(),
        status,
        created_at: None,
    }
}

pub fn session_at(id: &str, day: u32) -> Session {
    Session {
        created_at: Some(Utc.with_ymd_and_hms(2024, 5, day, 12, 0, 0).unwrap()),
        ..session(id, SessionStatus::Completed)
    }
}

pub fn message(id: &str, role: Role, text: &str) -> Message {
    Message {
        id: RecordId::new(id),
        session_id: RecordId::new("s1"),
        role,
        content: MessageContent::text(text),
        base64_image: None,
        created_at: None,
        is_streaming: false,
    }
}

pub fn failure() -> ApiError {
    ApiError::Timeout(Duration::from_secs(30))
}

/// Scripted backend. Queued responses are handed out in order; once a queue
/// runs dry the last successful answer is repeated.
pub struct FakeBackend {
    session: Mutex<Session>,
    listed: Mutex<Vec<Session>>,
    messages: Mutex<VecDeque<Result<Vec<Message>, ApiError>>>,
    last_messages: Mutex<Vec<Message>>,
    statuses: Mutex<VecDeque<SessionStatus>>,
    last_status: Mutex<SessionStatus>,
    streams: Mutex<VecDeque<mpsc::Receiver<StreamEvent>>>,
    pub posted: Mutex<Vec<NewMessage>>,
    pub fail_create: AtomicBool,
    pub fail_list: AtomicBool,
    pub message_calls: AtomicUsize,
    pub status_calls: AtomicUsize,
    pub stream_calls: AtomicUsize,
    pub create_calls: AtomicUsize,
}

impl FakeBackend {
    pub fn new(session: Session) -> Arc<Self> {
        let status = session.status;
        Arc::new(Self {
            session: Mutex::new(session),
            listed: Mutex::new(Vec::new()),
            messages: Mutex::new(VecDeque::new()),
            last_messages: Mutex::new(Vec::new()),
            statuses: Mutex::new(VecDeque::new()),
            last_status: Mutex::new(status),
            streams: Mutex::new(VecDeque::new()),
            posted: Mutex::new(Vec::new()),
            fail_create: AtomicBool::new(false),
            fail_list: AtomicBool::new(false),
            message_calls: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
            stream_calls: AtomicUsize::new(0),
            create_calls: AtomicUsize::new(0),
        })
    }

    pub fn push_messages(&self, messages: Vec<Message>) {
        self.messages.lock().unwrap().push_back(Ok(messages));
    }

    pub fn push_messages_error(&self) {
        self.messages.lock().unwrap().push_back(Err(failure()));
    }

    pub fn push_status(&self, status: SessionStatus) {
        self.statuses.lock().unwrap().push_back(status);
    }

    pub fn set_listed(&self, sessions: Vec<Session>) {
        *self.listed.lock().unwrap() = sessions;
    }

    /// Queue a push channel; the returned sender drives it
    pub fn push_stream(&self) -> mpsc::Sender<StreamEvent> {
        let (tx, rx) = mpsc::channel(64);
        self.streams.lock().unwrap().push_back(rx);
        tx
    }

    pub fn message_calls(&self) -> usize {
        self.message_calls.load(Ordering::SeqCst)
    }

    pub fn stream_calls(&self) -> usize {
        self.stream_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionBackend for FakeBackend {
    async fn create_session(
        &self,
        initial_prompt: &str,
        provider: &str,
        _config: SessionConfig,
    ) -> Result<Session, ApiError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(failure());
        }
        let mut session = self.session.lock().unwrap().clone();
        session.initial_prompt = initial_prompt.to_string();
        session.provider = provider.to_string();
        Ok(session)
    }

    async fn list_sessions(&self, _skip: u32, _limit: u32) -> Result<Vec<Session>, ApiError> {
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(failure());
        }
        Ok(self.listed.lock().unwrap().clone())
    }

    async fn get_session(&self, _id: &RecordId) -> Result<Session, ApiError> {
        Ok(self.session.lock().unwrap().clone())
    }

    async fn session_messages(&self, _id: &RecordId) -> Result<Vec<Message>, ApiError> {
        self.message_calls.fetch_add(1, Ordering::SeqCst);
        match self.messages.lock().unwrap().pop_front() {
            Some(Ok(messages)) => {
                *self.last_messages.lock().unwrap() = messages.clone();
                Ok(messages)
            }
            Some(Err(e)) => Err(e),
            None => Ok(self.last_messages.lock().unwrap().clone()),
        }
    }

    async fn session_status(&self, _id: &RecordId) -> Result<StatusReport, ApiError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let mut last = self.last_status.lock().unwrap();
        if let Some(next) = self.statuses.lock().unwrap().pop_front() {
            *last = next;
        }
        Ok(StatusReport::new(*last))
    }

    async fn open_stream(&self, _id: &RecordId) -> Result<Subscription, ApiError> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        let rx = match self.streams.lock().unwrap().pop_front() {
            Some(rx) => rx,
            // Nothing scripted: a channel that is already closed
            None => mpsc::channel(1).1,
        };
        Ok(Subscription::from_receiver(rx))
    }

    async fn create_message(&self, message: &NewMessage) -> Result<Message, ApiError> {
        let mut posted = self.posted.lock().unwrap();
        posted.push(message.clone());
        Ok(Message {
            id: RecordId::new(format!("m{}", posted.len())),
            session_id: message.session_id.clone(),
            role: message.role,
            content: message.content.clone(),
            base64_image: None,
            created_at: None,
            is_streaming: false,
        })
    }
}
