// Tests for the remote desktop controller

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use agent_console::api::{ApiError, Screenshot, VncStatus};
use agent_console::vnc::{
    ConnectionState, EventEmitter, RemoteDesktop, RemoteDesktopApi, RemoteDesktopError,
    RemoteDesktopEvent, RemoteDesktopSettings, ViewerOptions,
};
use async_trait::async_trait;
use serde_json::{json, Value};

/// Scripted desktop services; the last running flag repeats once the script runs out
struct FakeDesktop {
    running: Mutex<VecDeque<bool>>,
    last: Mutex<bool>,
    error: Option<String>,
    starts: AtomicUsize,
    interactions: Mutex<Vec<(String, Value)>>,
}

impl FakeDesktop {
    fn new(running: &[bool]) -> Arc<Self> {
        Self::failing(running, None)
    }

    fn failing(running: &[bool], error: Option<&str>) -> Arc<Self> {
        Arc::new(Self {
            running: Mutex::new(running.iter().copied().collect()),
            last: Mutex::new(false),
            error: error.map(str::to_string),
            starts: AtomicUsize::new(0),
            interactions: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl RemoteDesktopApi for FakeDesktop {
    async fn status(&self) -> Result<VncStatus, ApiError> {
        let mut last = self.last.lock().unwrap();
        if let Some(next) = self.running.lock().unwrap().pop_front() {
            *last = next;
        }
        Ok(VncStatus {
            is_running: *last,
            error: self.error.clone(),
            ..VncStatus::default()
        })
    }

    async fn start(&self) -> Result<(), ApiError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn screenshot(&self) -> Result<Screenshot, ApiError> {
        Ok(serde_json::from_value(json!({
            "screenshot": "data:image/png;base64,iVBORw0KGgo=",
            "timestamp": "2024-05-01T12:00:00"
        }))
        .unwrap())
    }

    async fn interact(&self, action: &str, payload: Value) -> Result<Value, ApiError> {
        self.interactions
            .lock()
            .unwrap()
            .push((action.to_string(), payload));
        Ok(json!({ "status": "ok" }))
    }
}

fn record_events(desktop: &RemoteDesktop) -> Arc<Mutex<Vec<RemoteDesktopEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    desktop.subscribe(move |event| sink.lock().unwrap().push(event.clone()));
    events
}

#[tokio::test(start_paused = true)]
async fn test_connect_when_already_running() {
    let api = FakeDesktop::new(&[true]);
    let desktop = RemoteDesktop::new(api.clone());
    let events = record_events(&desktop);

    assert!(desktop.connect().await);
    assert_eq!(desktop.state(), ConnectionState::Connected);
    assert_eq!(api.starts.load(Ordering::SeqCst), 0);

    let events = events.lock().unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0], RemoteDesktopEvent::Connecting);
    assert!(matches!(events[1], RemoteDesktopEvent::Connected(_)));
}

#[tokio::test(start_paused = true)]
async fn test_connect_starts_services_once() {
    let api = FakeDesktop::new(&[false, true]);
    let desktop = RemoteDesktop::new(api.clone());

    assert!(desktop.connect().await);
    assert_eq!(api.starts.load(Ordering::SeqCst), 1);
    assert!(desktop.is_connected());

    // Already connected: no more calls
    assert!(desktop.connect().await);
    assert_eq!(api.starts.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_connect_gives_up_after_one_start() {
    let api = FakeDesktop::new(&[false, false]);
    let desktop = RemoteDesktop::new(api.clone());
    let events = record_events(&desktop);

    assert!(!desktop.connect().await);
    assert_eq!(api.starts.load(Ordering::SeqCst), 1);

    let status = desktop.status();
    assert_eq!(status.state, ConnectionState::Disconnected);
    assert_eq!(
        status.error.as_deref(),
        Some("Failed to connect to VNC server at localhost:8080: VNC services failed to start")
    );

    let errors = events
        .lock()
        .unwrap()
        .iter()
        .filter(|e| matches!(e, RemoteDesktopEvent::Error(_)))
        .count();
    assert_eq!(errors, 1);
}

#[tokio::test(start_paused = true)]
async fn test_connect_reports_service_error() {
    let api = FakeDesktop::failing(&[false, false], Some("Xvfb crashed"));
    let desktop = RemoteDesktop::with_settings(
        api,
        RemoteDesktopSettings {
            host: "sandbox".to_string(),
            port: 6080,
            ..RemoteDesktopSettings::default()
        },
    );

    assert!(!desktop.connect().await);
    assert_eq!(
        desktop.status().error.as_deref(),
        Some("Failed to connect to VNC server at sandbox:6080: Xvfb crashed")
    );
}

#[tokio::test]
async fn test_interactions_require_connection() {
    let api = FakeDesktop::new(&[true]);
    let desktop = RemoteDesktop::new(api.clone());

    assert!(matches!(
        desktop.click(1, 2).await,
        Err(RemoteDesktopError::NotConnected)
    ));
    assert!(matches!(
        desktop.type_text("ls").await,
        Err(RemoteDesktopError::NotConnected)
    ));
    assert!(matches!(
        desktop.screenshot().await,
        Err(RemoteDesktopError::NotConnected)
    ));
    assert!(api.interactions.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_interactions_when_connected() {
    let api = FakeDesktop::new(&[true]);
    let desktop = RemoteDesktop::new(api.clone());
    assert!(desktop.connect().await);

    desktop.click(10, 20).await.unwrap();
    desktop.right_click(5, 5).await.unwrap();
    desktop.double_click(7, 8).await.unwrap();
    desktop.type_text("ls -la").await.unwrap();
    desktop.key("Return").await.unwrap();

    let interactions = api.interactions.lock().unwrap();
    assert_eq!(
        *interactions,
        vec![
            ("click".to_string(), json!({ "x": 10, "y": 20, "button": 1 })),
            ("click".to_string(), json!({ "x": 5, "y": 5, "button": 3 })),
            ("click".to_string(), json!({ "x": 7, "y": 8, "button": 1 })),
            ("click".to_string(), json!({ "x": 7, "y": 8, "button": 1 })),
            ("type".to_string(), json!({ "text": "ls -la" })),
            ("key".to_string(), json!({ "key": "Return" })),
        ]
    );
}

#[tokio::test]
async fn test_screenshot_decodes() {
    let api = FakeDesktop::new(&[true]);
    let desktop = RemoteDesktop::new(api);
    assert!(desktop.connect().await);

    let screenshot = desktop.screenshot().await.unwrap();
    let bytes = screenshot.decode().unwrap();
    assert_eq!(&bytes[..4], &[0x89, b'P', b'N', b'G']);
}

#[tokio::test]
async fn test_disconnect_emits_once() {
    let api = FakeDesktop::new(&[true]);
    let desktop = RemoteDesktop::new(api);
    let events = record_events(&desktop);

    desktop.disconnect();
    assert!(events.lock().unwrap().is_empty());

    assert!(desktop.connect().await);
    desktop.disconnect();
    desktop.disconnect();

    let events = events.lock().unwrap();
    assert_eq!(events.last(), Some(&RemoteDesktopEvent::Disconnected));
    assert_eq!(
        events
            .iter()
            .filter(|e| **e == RemoteDesktopEvent::Disconnected)
            .count(),
        1
    );
    assert_eq!(desktop.state(), ConnectionState::Disconnected);
}

#[test]
fn test_panicking_listener_does_not_block_others() {
    let emitter: EventEmitter<u32> = EventEmitter::new();
    let seen = Arc::new(Mutex::new(Vec::new()));

    emitter.subscribe(|_| panic!("listener failure"));
    let sink = seen.clone();
    emitter.subscribe(move |n| sink.lock().unwrap().push(*n));

    emitter.emit(&1);
    emitter.emit(&2);
    assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
}

#[test]
fn test_unsubscribe() {
    let emitter: EventEmitter<u32> = EventEmitter::new();
    let seen = Arc::new(AtomicUsize::new(0));

    let sink = seen.clone();
    let id = emitter.subscribe(move |_| {
        sink.fetch_add(1, Ordering::SeqCst);
    });
    emitter.emit(&1);

    assert!(emitter.unsubscribe(id));
    assert!(!emitter.unsubscribe(id));
    assert_eq!(emitter.listener_count(), 0);

    emitter.emit(&2);
    assert_eq!(seen.load(Ordering::SeqCst), 1);
}

#[test]
fn test_viewer_url() {
    let desktop = RemoteDesktop::new(FakeDesktop::new(&[]));

    let url = desktop.viewer_url(&ViewerOptions::default()).unwrap();
    assert_eq!(
        url,
        "http://localhost:8080/vnc.html?autoconnect=true&resize=scale&quality=6&compression=6&show_dot=false&view_only=false"
    );

    let view_only = desktop
        .viewer_url(&ViewerOptions {
            view_only: true,
            ..ViewerOptions::default()
        })
        .unwrap();
    assert!(view_only.ends_with("view_only=true"));
}
