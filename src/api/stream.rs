//! Server-sent event subscription

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::transport::Transport;

/// What a subscription reports to its owner
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// The server accepted the request and the channel is live
    Open,
    /// One `data:` payload
    Data(String),
    /// The channel failed or was closed by the server
    Error(String),
}

/// Handle to one open push channel
///
/// Dropping or closing the handle tears down the reader task.
pub struct Subscription {
    rx: mpsc::Receiver<StreamEvent>,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Wrap an event channel fed by something other than HTTP
    pub fn from_receiver(rx: mpsc::Receiver<StreamEvent>) -> Self {
        Self { rx, task: None }
    }

    /// Next event; `None` once the channel is gone
    pub async fn next(&mut self) -> Option<StreamEvent> {
        self.rx.recv().await
    }

    pub fn close(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.rx.close();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.close();
    }
}

/// Open `path` as an event stream and forward its frames
pub(crate) fn open(transport: &Transport, path: &str) -> Subscription {
    let (tx, rx) = mpsc::channel(64);
    let url = transport.url(path);
    let request = transport
        .client()
        .get(&url)
        .header(reqwest::header::ACCEPT, "text/event-stream");

    let task = tokio::spawn(async move {
        debug!("Opening event stream {}", url);

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                let _ = tx.send(StreamEvent::Error(e.to_string())).await;
                return;
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let err = super::ApiError::from_response(status, &body);
            let _ = tx.send(StreamEvent::Error(err.to_string())).await;
            return;
        }

        if tx.send(StreamEvent::Open).await.is_err() {
            return;
        }

        let mut bytes = response.bytes_stream();
        let mut decoder = SseDecoder::default();

        while let Some(chunk) = bytes.next().await {
            match chunk {
                Ok(chunk) => {
                    for data in decoder.push(&chunk) {
                        if tx.send(StreamEvent::Data(data)).await.is_err() {
                            return;
                        }
                    }
                }
                Err(e) => {
                    warn!("Event stream read failed: {}", e);
                    let _ = tx.send(StreamEvent::Error(e.to_string())).await;
                    return;
                }
            }
        }

        let _ = tx
            .send(StreamEvent::Error("stream closed by server".to_string()))
            .await;
    });

    Subscription {
        rx,
        task: Some(task),
    }
}

/// Incremental `text/event-stream` decoder
///
/// Feed raw chunks in; complete event payloads come out. Only the `data`
/// field is kept; comments and other fields are skipped.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line);

            if line.is_empty() {
                if !self.data.is_empty() {
                    events.push(self.data.join("\n"));
                    self.data.clear();
                }
                continue;
            }
            if line.starts_with(':') {
                continue;
            }

            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (&*line, ""),
            };
            if field == "data" {
                self.data.push(value.to_string());
            }
        }

        events
    }
}
