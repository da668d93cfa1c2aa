//! Live-update coordinator
//!
//! Owns the current session, its transcript and its status, and keeps them
//! fresh with either the push channel or a fixed-interval poll. Every spawned
//! driver carries the epoch it was started under; effects are only applied
//! while that epoch is still current, so anything scheduled before a stop is
//! inert after it.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::accumulator::{parse_frame, Accumulator, StreamFrame};
use super::backend::SessionBackend;
use crate::api::{
    ApiError, Message, MessageContent, RecordId, Role, Session, SessionConfig, SessionStatus,
    StatusReport, StreamEvent, Subscription,
};

/// How a session is kept up to date
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStrategy {
    /// Server-sent events
    Stream,
    /// Fixed-interval fetch of messages and status
    Poll,
}

impl UpdateStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateStrategy::Stream => "stream",
            UpdateStrategy::Poll => "poll",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "stream" | "sse" => Some(UpdateStrategy::Stream),
            "poll" | "polling" => Some(UpdateStrategy::Poll),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdatePhase {
    #[default]
    Idle,
    Starting,
    Active,
    Terminating,
}

impl UpdatePhase {
    /// Updates are scheduled and may still take effect
    pub fn is_live(&self) -> bool {
        matches!(self, UpdatePhase::Starting | UpdatePhase::Active)
    }
}

/// What has been observed so far; only ever moves forward within a session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cursor {
    pub message_count: usize,
    pub status: Option<SessionStatus>,
}

/// Fixed timings for both strategies
#[derive(Debug, Clone)]
pub struct UpdateSettings {
    pub poll_interval: Duration,
    /// Wait before opening the push channel so the server side is ready
    pub settle_delay: Duration,
    pub reconnect_backoff: Duration,
    /// Hard limit on one push subscription, counted from when it starts
    pub stream_ceiling: Duration,
    pub max_reconnects: u32,
}

impl Default for UpdateSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            settle_delay: Duration::from_secs(1),
            reconnect_backoff: Duration::from_secs(2),
            stream_ceiling: Duration::from_secs(60),
            max_reconnects: 1,
        }
    }
}

/// Read-only view published after every change
#[derive(Debug, Clone, Default)]
pub struct SessionSnapshot {
    pub session: Option<Session>,
    pub messages: Vec<Message>,
    pub status: Option<StatusReport>,
    pub phase: UpdatePhase,
    pub strategy: Option<UpdateStrategy>,
    /// Push channel is open
    pub connected: bool,
    pub cursor: Cursor,
    pub last_error: Option<String>,
}

impl SessionSnapshot {
    pub fn is_polling(&self) -> bool {
        self.phase.is_live() && self.strategy == Some(UpdateStrategy::Poll)
    }

    pub fn is_streaming(&self) -> bool {
        self.phase.is_live() && self.strategy == Some(UpdateStrategy::Stream)
    }

    /// Status is `running` or `processing`
    pub fn is_session_active(&self) -> bool {
        self.status
            .as_ref()
            .map(|s| s.status.is_active())
            .unwrap_or(false)
    }

    /// More messages on display than the cursor has accounted for
    pub fn has_new_messages(&self) -> bool {
        self.messages.len() > self.cursor.message_count
    }
}

#[derive(Default)]
struct State {
    session: Option<Session>,
    messages: Vec<Message>,
    status: Option<StatusReport>,
    phase: UpdatePhase,
    strategy: Option<UpdateStrategy>,
    connected: bool,
    cursor: Cursor,
    accumulator: Option<Accumulator>,
    last_error: Option<String>,
    epoch: u64,
    driver: Option<JoinHandle<()>>,
}

impl State {
    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session: self.session.clone(),
            messages: self.messages.clone(),
            status: self.status.clone(),
            phase: self.phase,
            strategy: self.strategy,
            connected: self.connected,
            cursor: self.cursor,
            last_error: self.last_error.clone(),
        }
    }

    fn reset(&mut self) {
        self.session = None;
        self.messages.clear();
        self.status = None;
        self.strategy = None;
        self.connected = false;
        self.cursor = Cursor::default();
        self.accumulator = None;
        self.last_error = None;
    }

    fn session_id(&self) -> Option<RecordId> {
        self.session.as_ref().map(|s| s.id.clone())
    }

    /// Take in one full fetch. The list is swapped only when it grew.
    fn merge(&mut self, fetched: Vec<Message>, status: StatusReport) {
        let previous = self.cursor.message_count;
        if fetched.len() > previous {
            debug!("Found {} new messages", fetched.len() - previous);
            let persisted = fetched[previous..]
                .iter()
                .any(|m| m.role == Role::Assistant);
            self.cursor.message_count = fetched.len();
            self.messages = fetched;

            if let Some(acc) = self.accumulator.as_mut().filter(|a| a.is_displayed()) {
                if persisted {
                    // The server copy replaces the provisional entry; later text starts a new turn
                    debug!("Streamed turn {} saved on the server", acc.id());
                    *acc = Accumulator::new(acc.session_id().clone());
                } else {
                    self.messages.push(acc.snapshot());
                }
            }
        }

        self.observe_status(status);
    }

    /// Record a status report. A terminal status is never walked back.
    fn observe_status(&mut self, status: StatusReport) -> bool {
        let settled = self.cursor.status.map(|s| s.is_terminal()).unwrap_or(false);
        if settled && !status.status.is_terminal() {
            debug!("Ignoring status {} after a terminal one", status.status);
            return true;
        }

        let terminal = status.status.is_terminal();
        self.cursor.status = Some(status.status);
        if let Some(session) = self.session.as_mut() {
            session.status = status.status;
        }
        self.status = Some(status);
        terminal
    }

    fn apply_fragment(&mut self, text: Option<&str>) {
        let Some(acc) = self.accumulator.as_mut() else {
            return;
        };
        if !acc.is_displayed() {
            self.messages.push(acc.display());
            debug!("Added streaming message to display");
        }
        if let Some(text) = text {
            acc.append(text);
            acc.sync_into(&mut self.messages);
        }
    }

    /// Cancel the current activation; returns the driver so the caller can abort it
    fn begin_halt(&mut self) -> Option<JoinHandle<()>> {
        self.epoch += 1;
        if self.phase.is_live() {
            self.phase = UpdatePhase::Terminating;
        }
        self.driver.take()
    }

    fn finish_halt(&mut self) {
        self.connected = false;
        if let Some(acc) = self.accumulator.take() {
            acc.finalize_in(&mut self.messages);
        }
        self.phase = UpdatePhase::Idle;
    }

    /// Halt from inside the running driver, which is about to return
    fn halt_from_driver(&mut self) {
        // Dropping the handle detaches it; the driver exits on its own.
        drop(self.begin_halt());
        self.finish_halt();
    }
}

struct Shared {
    state: Mutex<State>,
    tx: watch::Sender<SessionSnapshot>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn read<R>(&self, f: impl FnOnce(&State) -> R) -> R {
        f(&self.lock())
    }

    /// Mutate and publish
    fn update<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        let mut state = self.lock();
        let result = f(&mut state);
        self.tx.send_replace(state.snapshot());
        result
    }

    /// Mutate and publish only if `epoch` is still the live activation
    fn update_if_current<R>(&self, epoch: u64, f: impl FnOnce(&mut State) -> R) -> Option<R> {
        let mut state = self.lock();
        if state.epoch != epoch || !state.phase.is_live() {
            return None;
        }
        let result = f(&mut state);
        self.tx.send_replace(state.snapshot());
        Some(result)
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.read(|st| st.epoch == epoch && st.phase.is_live())
    }
}

/// Keeps the displayed state of one session in step with the server
pub struct LiveUpdateCoordinator {
    backend: Arc<dyn SessionBackend>,
    settings: UpdateSettings,
    shared: Arc<Shared>,
}

impl LiveUpdateCoordinator {
    pub fn new(backend: Arc<dyn SessionBackend>) -> Self {
        Self::with_settings(backend, UpdateSettings::default())
    }

    pub fn with_settings(backend: Arc<dyn SessionBackend>, settings: UpdateSettings) -> Self {
        let (tx, _) = watch::channel(SessionSnapshot::default());
        Self {
            backend,
            settings,
            shared: Arc::new(Shared {
                state: Mutex::new(State::default()),
                tx,
            }),
        }
    }

    pub fn settings(&self) -> &UpdateSettings {
        &self.settings
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.shared.read(State::snapshot)
    }

    /// Change feed of snapshots
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.shared.tx.subscribe()
    }

    pub fn session_id(&self) -> Option<RecordId> {
        self.shared.read(State::session_id)
    }

    /// Create a session on the server and start following it
    pub async fn start_session(
        &self,
        initial_prompt: &str,
        provider: &str,
        config: SessionConfig,
        strategy: UpdateStrategy,
    ) -> Result<Session, ApiError> {
        info!("Starting new session ({})", strategy.as_str());

        let session = match self
            .backend
            .create_session(initial_prompt, provider, config)
            .await
        {
            Ok(s) => s,
            Err(e) => {
                error!("Failed to start session: {}", e);
                self.record_error(&e);
                return Err(e);
            }
        };

        info!("Session created: {}", session.id);

        self.stop();
        self.shared.update(|st| {
            st.reset();
            st.cursor.status = Some(session.status);
            if strategy == UpdateStrategy::Stream {
                st.messages.push(Message {
                    id: RecordId::new(format!("local-{}", uuid::Uuid::new_v4())),
                    session_id: session.id.clone(),
                    role: Role::User,
                    content: MessageContent::text(initial_prompt),
                    base64_image: None,
                    created_at: Some(Utc::now()),
                    is_streaming: false,
                });
            }
            st.session = Some(session.clone());
        });

        self.start_updates(strategy);
        Ok(session)
    }

    /// Load a session that already exists; follow it only while it is active
    pub async fn load_existing_session(
        &self,
        id: &RecordId,
        strategy: UpdateStrategy,
    ) -> Result<Session, ApiError> {
        info!("Loading existing session: {}", id);

        let fetched = tokio::try_join!(
            self.backend.get_session(id),
            self.backend.session_messages(id),
            self.backend.session_status(id),
        );
        let (session, messages, status) = match fetched {
            Ok(f) => f,
            Err(e) => {
                error!("Error loading existing session {}: {}", id, e);
                self.record_error(&e);
                return Err(e);
            }
        };

        let active = status.status.is_active();
        self.stop();
        self.shared.update(|st| {
            st.reset();
            st.cursor = Cursor {
                message_count: messages.len(),
                status: Some(status.status),
            };
            st.messages = messages;
            st.status = Some(status);
            st.session = Some(session.clone());
        });

        if active {
            self.start_updates(strategy);
        }
        Ok(session)
    }

    /// Begin following the current session
    ///
    /// Returns `false` without doing anything when updates are already
    /// running or there is no session.
    pub fn start_updates(&self, strategy: UpdateStrategy) -> bool {
        let started = self.shared.update(|st| {
            if st.phase != UpdatePhase::Idle {
                return None;
            }
            let session_id = st.session_id()?;
            st.epoch += 1;
            st.phase = UpdatePhase::Starting;
            st.strategy = Some(strategy);
            if strategy == UpdateStrategy::Stream {
                st.accumulator = Some(Accumulator::new(session_id.clone()));
            }
            Some((st.epoch, session_id))
        });

        let Some((epoch, session_id)) = started else {
            debug!("Updates already running or no session; ignoring start");
            return false;
        };

        info!(
            "Starting {} updates for session {}",
            strategy.as_str(),
            session_id
        );

        let shared = self.shared.clone();
        let backend = self.backend.clone();
        let settings = self.settings.clone();
        let driver = match strategy {
            UpdateStrategy::Poll => {
                tokio::spawn(run_poll(shared, backend, settings, session_id, epoch))
            }
            UpdateStrategy::Stream => {
                tokio::spawn(run_stream(shared, backend, settings, session_id, epoch))
            }
        };

        self.shared.update(|st| {
            if st.epoch == epoch {
                st.driver = Some(driver);
            } else {
                driver.abort();
            }
        });
        true
    }

    /// Stop following the session. Safe to call at any time.
    pub fn stop(&self) {
        let driver = self.shared.update(State::begin_halt);
        if let Some(driver) = driver {
            driver.abort();
        }
        self.shared.update(State::finish_halt);
        debug!("Stopped updates");
    }

    /// Fetch messages and status once, outside the poll timer
    pub async fn refresh(&self) -> Result<(), ApiError> {
        let Some(session_id) = self.session_id() else {
            warn!("No current session to refresh");
            return Ok(());
        };

        debug!("Manual refresh for session: {}", session_id);
        match fetch(self.backend.as_ref(), &session_id).await {
            Ok((messages, status)) => {
                self.shared.update(|st| {
                    if st.session_id().as_ref() == Some(&session_id) {
                        st.merge(messages, status);
                        st.last_error = None;
                    }
                });
                Ok(())
            }
            Err(e) => {
                error!("Error refreshing session {}: {}", session_id, e);
                self.record_error(&e);
                Err(e)
            }
        }
    }

    /// Append a message created locally, such as one the user just sent
    pub fn append_message(&self, message: Message) {
        self.shared.update(|st| st.messages.push(message));
    }

    /// Stop updates and forget the session
    pub fn clear_session(&self) {
        self.stop();
        self.shared.update(State::reset);
        debug!("Cleared session state");
    }

    fn record_error(&self, err: &ApiError) {
        let message = err.to_string();
        self.shared.update(|st| st.last_error = Some(message));
    }
}

impl Drop for LiveUpdateCoordinator {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn fetch(
    backend: &dyn SessionBackend,
    session_id: &RecordId,
) -> Result<(Vec<Message>, StatusReport), ApiError> {
    tokio::try_join!(
        backend.session_messages(session_id),
        backend.session_status(session_id)
    )
}

async fn run_poll(
    shared: Arc<Shared>,
    backend: Arc<dyn SessionBackend>,
    settings: UpdateSettings,
    session_id: RecordId,
    epoch: u64,
) {
    if shared
        .update_if_current(epoch, |st| st.phase = UpdatePhase::Active)
        .is_none()
    {
        return;
    }

    // First tick completes immediately
    let mut ticker = tokio::time::interval(settings.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if !shared.is_current(epoch) {
            return;
        }

        match fetch(backend.as_ref(), &session_id).await {
            Ok((messages, status)) => {
                let finished = shared.update_if_current(epoch, |st| {
                    st.merge(messages, status);
                    let terminal = st.cursor.status.map(|s| s.is_terminal()).unwrap_or(false);
                    if terminal {
                        st.halt_from_driver();
                    }
                    terminal
                });
                match finished {
                    Some(false) => {}
                    Some(true) => {
                        info!("Session {} finished, stopping polling", session_id);
                        return;
                    }
                    None => return,
                }
            }
            // Polling carries on after a failed tick
            Err(e) => warn!("Error polling session {}: {}", session_id, e),
        }
    }
}

enum Pump {
    /// The activation is over
    Done,
    /// The channel failed; reconnect may follow
    Failed(String),
}

async fn run_stream(
    shared: Arc<Shared>,
    backend: Arc<dyn SessionBackend>,
    settings: UpdateSettings,
    session_id: RecordId,
    epoch: u64,
) {
    tokio::time::sleep(settings.settle_delay).await;
    if shared
        .update_if_current(epoch, |st| st.phase = UpdatePhase::Active)
        .is_none()
    {
        return;
    }

    let deadline = Instant::now() + settings.stream_ceiling;
    let mut reconnects = 0u32;

    loop {
        let outcome = match backend.open_stream(&session_id).await {
            Ok(mut subscription) => {
                let outcome = pump(&shared, epoch, &mut subscription, deadline).await;
                subscription.close();
                outcome
            }
            Err(e) => Pump::Failed(e.to_string()),
        };

        let reason = match outcome {
            Pump::Done => return,
            Pump::Failed(reason) => reason,
        };

        // A channel that closes after the run ended is not a failure.
        if let Ok(status) = backend.session_status(&session_id).await {
            let finished = shared.update_if_current(epoch, |st| {
                let terminal = st.observe_status(status);
                if terminal {
                    st.halt_from_driver();
                }
                terminal
            });
            if finished != Some(false) {
                info!("Session {} finished, closing stream", session_id);
                return;
            }
        }

        let retry = shared.update_if_current(epoch, |st| {
            st.connected = false;
            st.last_error = Some(format!("Streaming connection error: {}", reason));
            if reconnects < settings.max_reconnects {
                true
            } else {
                st.halt_from_driver();
                false
            }
        });
        if retry != Some(true) {
            error!("Stream for session {} failed: {}", session_id, reason);
            return;
        }

        reconnects += 1;
        warn!(
            "Stream for session {} failed ({}), reconnecting in {:?}",
            session_id, reason, settings.reconnect_backoff
        );

        tokio::select! {
            _ = tokio::time::sleep(settings.reconnect_backoff) => {}
            _ = tokio::time::sleep_until(deadline) => {
                info!("Stream for session {} reached its time limit", session_id);
                shared.update_if_current(epoch, State::halt_from_driver);
                return;
            }
        }
        if !shared.is_current(epoch) {
            return;
        }
    }
}

async fn pump(
    shared: &Shared,
    epoch: u64,
    subscription: &mut Subscription,
    deadline: Instant,
) -> Pump {
    loop {
        let event = tokio::select! {
            event = subscription.next() => event,
            _ = tokio::time::sleep_until(deadline) => {
                info!("Stream reached its time limit");
                shared.update_if_current(epoch, State::halt_from_driver);
                return Pump::Done;
            }
        };

        let Some(event) = event else {
            return Pump::Failed("stream closed".to_string());
        };

        match event {
            StreamEvent::Open => {
                debug!("Streaming connection opened");
                if shared
                    .update_if_current(epoch, |st| st.connected = true)
                    .is_none()
                {
                    return Pump::Done;
                }
            }
            StreamEvent::Data(raw) => match parse_frame(&raw) {
                Ok(StreamFrame::Ping) => {}
                Ok(StreamFrame::Fragment { text, .. }) => {
                    if shared
                        .update_if_current(epoch, |st| st.apply_fragment(text.as_deref()))
                        .is_none()
                    {
                        return Pump::Done;
                    }
                }
                Ok(StreamFrame::Error(message)) => {
                    error!("Stream error: {}", message);
                    shared.update_if_current(epoch, |st| {
                        st.last_error = Some(message);
                        st.halt_from_driver();
                    });
                    return Pump::Done;
                }
                Ok(StreamFrame::Ignored(kind)) => {
                    debug!("Ignoring stream frame of type {:?}", kind);
                }
                Err(e) => {
                    warn!("Dropping malformed stream payload {:?}: {}", raw, e);
                }
            },
            StreamEvent::Error(reason) => return Pump::Failed(reason),
        }
    }
}
