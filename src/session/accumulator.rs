//! Push-channel payload parsing and the streaming accumulator

use chrono::Utc;
use serde_json::Value;

use crate::api::{Message, MessageContent, RecordId, Role};

/// One decoded push-channel payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamFrame {
    /// Keep-alive; carries nothing
    Ping,
    /// Text produced by the agent or one of its tools
    Fragment { role: Role, text: Option<String> },
    /// The server gave up on the run
    Error(String),
    /// Well-formed but of a type this client does not handle
    Ignored(String),
}

/// Decode a raw `data:` payload
///
/// `ping` and `timeout` literals are keep-alives. Anything else must be a
/// JSON object with a `type` field.
pub fn parse_frame(raw: &str) -> Result<StreamFrame, serde_json::Error> {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("ping") || trimmed.eq_ignore_ascii_case("timeout") {
        return Ok(StreamFrame::Ping);
    }

    let value: Value = serde_json::from_str(trimmed)?;
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    Ok(match kind.as_str() {
        "ping" => StreamFrame::Ping,
        "assistant" | "tool" => StreamFrame::Fragment {
            role: Role::from_str(&kind),
            text: value.get("content").and_then(extract_text),
        },
        "error" => StreamFrame::Error(
            value
                .get("message")
                .or_else(|| value.get("content"))
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .unwrap_or_else(|| "stream reported an error".to_string()),
        ),
        _ => StreamFrame::Ignored(kind),
    })
}

/// Pull displayable text out of a fragment's `content`
///
/// Shapes, first match wins:
/// 1. `{"content": [{"type": "text", "text": ...}, ...]}`, text items concatenated
/// 2. `{"text": ...}`
/// 3. a bare string
pub fn extract_text(content: &Value) -> Option<String> {
    if let Some(items) = content.get("content").and_then(Value::as_array) {
        return Some(
            items
                .iter()
                .filter(|item| item.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|item| item.get("text").and_then(Value::as_str))
                .collect(),
        );
    }
    if let Some(text) = content.get("text").and_then(Value::as_str) {
        return Some(text.to_string());
    }
    content.as_str().map(str::to_string)
}

/// The provisional assistant turn being built from stream fragments
#[derive(Debug, Clone)]
pub struct Accumulator {
    message: Message,
    buffer: String,
    displayed: bool,
}

impl Accumulator {
    pub fn new(session_id: RecordId) -> Self {
        Self {
            message: Message {
                id: RecordId::new(format!("stream-{}", uuid::Uuid::new_v4())),
                session_id,
                role: Role::Assistant,
                content: MessageContent::text(""),
                base64_image: None,
                created_at: Some(Utc::now()),
                is_streaming: true,
            },
            buffer: String::new(),
            displayed: false,
        }
    }

    pub fn id(&self) -> &RecordId {
        &self.message.id
    }

    pub fn session_id(&self) -> &RecordId {
        &self.message.session_id
    }

    pub fn text(&self) -> &str {
        &self.buffer
    }

    /// Whether the entry has been put into the display list
    pub fn is_displayed(&self) -> bool {
        self.displayed
    }

    /// Entry to push into the display list on first content
    pub fn display(&mut self) -> Message {
        self.displayed = true;
        self.snapshot()
    }

    pub fn append(&mut self, fragment: &str) {
        self.buffer.push_str(fragment);
    }

    /// Current state as a display entry
    pub fn snapshot(&self) -> Message {
        let mut message = self.message.clone();
        message.content.text = Some(self.buffer.clone());
        message
    }

    /// Copy the buffer into the matching display entry
    pub fn sync_into(&self, messages: &mut [Message]) {
        if let Some(entry) = messages.iter_mut().rev().find(|m| m.id == self.message.id) {
            entry.content.text = Some(self.buffer.clone());
        }
    }

    /// Mark the matching display entry as final
    pub fn finalize_in(&self, messages: &mut [Message]) {
        if let Some(entry) = messages.iter_mut().rev().find(|m| m.id == self.message.id) {
            entry.content.text = Some(self.buffer.clone());
            entry.is_streaming = false;
        }
    }
}
