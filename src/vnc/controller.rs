//! Remote desktop connection and input control

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, error, info};

use super::events::{EventEmitter, ListenerId};
use crate::api::{ApiClient, ApiError, Screenshot, VncStatus};

/// Backend calls the remote desktop controller relies on
#[async_trait]
pub trait RemoteDesktopApi: Send + Sync {
    async fn status(&self) -> Result<VncStatus, ApiError>;

    /// Request the desktop services; they come up asynchronously
    async fn start(&self) -> Result<(), ApiError>;

    async fn screenshot(&self) -> Result<Screenshot, ApiError>;

    async fn interact(&self, action: &str, payload: Value) -> Result<Value, ApiError>;
}

#[async_trait]
impl RemoteDesktopApi for ApiClient {
    async fn status(&self) -> Result<VncStatus, ApiError> {
        self.vnc.status().await
    }

    async fn start(&self) -> Result<(), ApiError> {
        self.vnc.start().await.map(|_| ())
    }

    async fn screenshot(&self) -> Result<Screenshot, ApiError> {
        self.vnc.screenshot().await
    }

    async fn interact(&self, action: &str, payload: Value) -> Result<Value, ApiError> {
        self.vnc.interact(action, &payload).await
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RemoteDesktopError {
    #[error("Not connected to VNC")]
    NotConnected,

    #[error("Invalid viewer URL: {0}")]
    InvalidUrl(String),

    #[error(transparent)]
    Api(#[from] ApiError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Notifications sent to listeners
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteDesktopEvent {
    Connecting,
    Connected(VncStatus),
    Error(String),
    Disconnected,
}

#[derive(Debug, Clone)]
pub struct RemoteDesktopSettings {
    /// Where the browser viewer is served
    pub host: String,
    pub port: u16,
    /// Wait between requesting a start and checking again
    pub settle_delay: Duration,
}

impl Default for RemoteDesktopSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8080,
            settle_delay: Duration::from_secs(3),
        }
    }
}

/// Query parameters for the noVNC viewer page
#[derive(Debug, Clone)]
pub struct ViewerOptions {
    pub autoconnect: bool,
    pub resize: String,
    pub quality: u8,
    pub compression: u8,
    pub show_dot: bool,
    pub view_only: bool,
}

impl Default for ViewerOptions {
    fn default() -> Self {
        Self {
            autoconnect: true,
            resize: "scale".to_string(),
            quality: 6,
            compression: 6,
            show_dot: false,
            view_only: false,
        }
    }
}

/// Snapshot of the controller's connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    pub error: Option<String>,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Default)]
struct Inner {
    state: ConnectionState,
    error: Option<String>,
}

/// Remote desktop of the agent sandbox
pub struct RemoteDesktop {
    api: Arc<dyn RemoteDesktopApi>,
    settings: RemoteDesktopSettings,
    inner: Mutex<Inner>,
    events: EventEmitter<RemoteDesktopEvent>,
}

impl RemoteDesktop {
    pub fn new(api: Arc<dyn RemoteDesktopApi>) -> Self {
        Self::with_settings(api, RemoteDesktopSettings::default())
    }

    pub fn with_settings(api: Arc<dyn RemoteDesktopApi>, settings: RemoteDesktopSettings) -> Self {
        Self {
            api,
            settings,
            inner: Mutex::new(Inner::default()),
            events: EventEmitter::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn subscribe(
        &self,
        listener: impl Fn(&RemoteDesktopEvent) + Send + Sync + 'static,
    ) -> ListenerId {
        self.events.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.events.unsubscribe(id)
    }

    pub fn state(&self) -> ConnectionState {
        self.lock().state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn status(&self) -> ConnectionStatus {
        let inner = self.lock();
        ConnectionStatus {
            state: inner.state,
            error: inner.error.clone(),
            host: self.settings.host.clone(),
            port: self.settings.port,
        }
    }

    /// Make sure the desktop services are up
    ///
    /// Starts them at most once if they are down. Resolves to whether the
    /// controller ended up connected.
    pub async fn connect(&self) -> bool {
        {
            let mut inner = self.lock();
            match inner.state {
                ConnectionState::Connected => return true,
                ConnectionState::Connecting => return false,
                ConnectionState::Disconnected => {}
            }
            inner.state = ConnectionState::Connecting;
            inner.error = None;
        }
        self.events.emit(&RemoteDesktopEvent::Connecting);

        let outcome = self.bring_up().await;

        let event = {
            let mut inner = self.lock();
            if inner.state != ConnectionState::Connecting {
                debug!("Connect finished after disconnect; ignoring");
                return false;
            }
            match outcome {
                Ok(status) => {
                    inner.state = ConnectionState::Connected;
                    RemoteDesktopEvent::Connected(status)
                }
                Err(reason) => {
                    let message = format!(
                        "Failed to connect to VNC server at {}:{}: {}",
                        self.settings.host, self.settings.port, reason
                    );
                    inner.state = ConnectionState::Disconnected;
                    inner.error = Some(message.clone());
                    RemoteDesktopEvent::Error(message)
                }
            }
        };

        let connected = matches!(event, RemoteDesktopEvent::Connected(_));
        match &event {
            RemoteDesktopEvent::Error(message) => error!("{}", message),
            _ => info!(
                "Connected to VNC at {}:{}",
                self.settings.host, self.settings.port
            ),
        }
        self.events.emit(&event);
        connected
    }

    async fn bring_up(&self) -> Result<VncStatus, String> {
        let status = self.api.status().await.map_err(|e| e.to_string())?;
        if status.is_running {
            return Ok(status);
        }

        info!("VNC services not running, starting them");
        self.api.start().await.map_err(|e| e.to_string())?;
        tokio::time::sleep(self.settings.settle_delay).await;

        let status = self.api.status().await.map_err(|e| e.to_string())?;
        if status.is_running {
            Ok(status)
        } else {
            Err(status
                .error
                .unwrap_or_else(|| "VNC services failed to start".to_string()))
        }
    }

    /// Drop the connection; the remote services keep running
    pub fn disconnect(&self) {
        {
            let mut inner = self.lock();
            if inner.state == ConnectionState::Disconnected {
                return;
            }
            inner.state = ConnectionState::Disconnected;
        }
        info!("Disconnected from VNC");
        self.events.emit(&RemoteDesktopEvent::Disconnected);
    }

    fn ensure_connected(&self) -> Result<(), RemoteDesktopError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(RemoteDesktopError::NotConnected)
        }
    }

    async fn interact(&self, action: &str, payload: Value) -> Result<Value, RemoteDesktopError> {
        self.ensure_connected()?;
        debug!("VNC {} {}", action, payload);
        Ok(self.api.interact(action, payload).await?)
    }

    pub async fn click(&self, x: i32, y: i32) -> Result<Value, RemoteDesktopError> {
        self.interact("click", json!({ "x": x, "y": y, "button": 1 }))
            .await
    }

    pub async fn right_click(&self, x: i32, y: i32) -> Result<Value, RemoteDesktopError> {
        self.interact("click", json!({ "x": x, "y": y, "button": 3 }))
            .await
    }

    pub async fn double_click(&self, x: i32, y: i32) -> Result<Value, RemoteDesktopError> {
        self.click(x, y).await?;
        self.click(x, y).await
    }

    pub async fn type_text(&self, text: &str) -> Result<Value, RemoteDesktopError> {
        self.interact("type", json!({ "text": text })).await
    }

    /// Send a key or chord, e.g. `Return` or `ctrl+c`
    pub async fn key(&self, key: &str) -> Result<Value, RemoteDesktopError> {
        self.interact("key", json!({ "key": key })).await
    }

    pub async fn screenshot(&self) -> Result<Screenshot, RemoteDesktopError> {
        self.ensure_connected()?;
        Ok(self.api.screenshot().await?)
    }

    /// Viewer page URL for embedding
    pub fn viewer_url(&self, options: &ViewerOptions) -> Result<String, RemoteDesktopError> {
        let mut url = reqwest::Url::parse(&format!(
            "http://{}:{}/vnc.html",
            self.settings.host, self.settings.port
        ))
        .map_err(|e| RemoteDesktopError::InvalidUrl(e.to_string()))?;

        url.query_pairs_mut()
            .append_pair("autoconnect", &options.autoconnect.to_string())
            .append_pair("resize", &options.resize)
            .append_pair("quality", &options.quality.to_string())
            .append_pair("compression", &options.compression.to_string())
            .append_pair("show_dot", &options.show_dot.to_string())
            .append_pair("view_only", &options.view_only.to_string());

        Ok(url.to_string())
    }
}
