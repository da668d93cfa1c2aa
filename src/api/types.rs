//! Wire types shared by the resource clients

use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Identifier of a backend record (session or message)
///
/// The backend hands out integer ids, but callers treat them as opaque.
/// Both JSON numbers and strings are accepted on the way in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for RecordId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<i64> for RecordId {
    fn from(n: i64) -> Self {
        Self(n.to_string())
    }
}

impl Serialize for RecordId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0.parse::<i64>() {
            Ok(n) => serializer.serialize_i64(n),
            Err(_) => serializer.serialize_str(&self.0),
        }
    }
}

impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Int(i64),
            Text(String),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Int(n) => RecordId(n.to_string()),
            Raw::Text(s) => RecordId(s),
        })
    }
}

/// Lifecycle status of an agent session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Queued,
    Running,
    Processing,
    Completed,
    Error,
    #[serde(other)]
    Unknown,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Queued => "queued",
            SessionStatus::Running => "running",
            SessionStatus::Processing => "processing",
            SessionStatus::Completed => "completed",
            SessionStatus::Error => "error",
            SessionStatus::Unknown => "unknown",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "queued" => SessionStatus::Queued,
            "running" => SessionStatus::Running,
            "processing" => SessionStatus::Processing,
            "completed" => SessionStatus::Completed,
            "error" => SessionStatus::Error,
            _ => SessionStatus::Unknown,
        }
    }

    /// No further updates will arrive once a session reaches this status
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Error)
    }

    /// The agent is still working
    pub fn is_active(&self) -> bool {
        matches!(self, SessionStatus::Running | SessionStatus::Processing)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One agent run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: RecordId,
    #[serde(default)]
    pub initial_prompt: String,
    #[serde(default)]
    pub provider: String,
    #[serde(default = "default_status")]
    pub status: SessionStatus,
    #[serde(default, with = "timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}

fn default_status() -> SessionStatus {
    SessionStatus::Queued
}

/// Response of `GET /sessions/{id}/status`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub status: SessionStatus,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl StatusReport {
    pub fn new(status: SessionStatus) -> Self {
        Self {
            status,
            extra: serde_json::Map::new(),
        }
    }
}

/// Optional knobs sent along with a new session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt_suffix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking_budget: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub only_n_most_recent_images: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_version: Option<String>,
}

/// Body of `POST /sessions/`
#[derive(Debug, Serialize)]
pub struct CreateSessionRequest {
    pub initial_prompt: String,
    pub provider: String,
    #[serde(flatten)]
    pub config: SessionConfig,
}

/// Who produced a transcript turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
    #[serde(other)]
    Other,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
            Role::Other => "other",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "user" => Role::User,
            "assistant" => Role::Assistant,
            "tool" => Role::Tool,
            _ => Role::Other,
        }
    }
}

/// Message body; `text` is the displayable part, anything else is kept as-is
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl MessageContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            extra: serde_json::Map::new(),
        }
    }

    pub fn as_text(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }
}

/// One transcript turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: RecordId,
    pub session_id: RecordId,
    pub role: Role,
    #[serde(default)]
    pub content: MessageContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base64_image: Option<String>,
    #[serde(default, with = "timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    /// Set on the provisional entry built from a live stream
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_streaming: bool,
}

impl Message {
    /// Whether this turn carries a screenshot
    pub fn has_image(&self) -> bool {
        self.base64_image.is_some() || self.content.extra.contains_key("base64_image")
    }
}

/// Body of `POST /messages/`
#[derive(Debug, Clone, Serialize)]
pub struct NewMessage {
    pub session_id: RecordId,
    pub role: Role,
    pub content: MessageContent,
}

impl NewMessage {
    pub fn user_text(session_id: RecordId, text: impl Into<String>) -> Self {
        Self {
            session_id,
            role: Role::User,
            content: MessageContent::text(text),
        }
    }
}

/// Response of `GET /`
#[derive(Debug, Clone, Deserialize)]
pub struct Health {
    #[serde(default)]
    pub message: String,
}

/// Remote desktop service status
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VncStatus {
    #[serde(alias = "running")]
    pub is_running: bool,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub pid: Option<u32>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Response of `GET /vnc/screenshot`
#[derive(Debug, Clone, Deserialize)]
pub struct Screenshot {
    /// `data:image/png;base64,...` or bare base64
    pub screenshot: String,
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl Screenshot {
    /// Raw image bytes
    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        use base64::Engine;

        let payload = match self.screenshot.split_once(";base64,") {
            Some((_, data)) => data,
            None => self.screenshot.as_str(),
        };
        base64::engine::general_purpose::STANDARD.decode(payload.trim())
    }
}

/// Lenient timestamp (de)serialization: RFC 3339, or naive ISO-8601 read as UTC
pub(crate) mod timestamp {
    use super::*;

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(dt) => serializer.serialize_str(&dt.to_rfc3339()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        Ok(raw.as_deref().and_then(parse))
    }

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
            .ok()
            .map(|naive| naive.and_utc())
    }
}
