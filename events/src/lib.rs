//! Wire model and codec for the agent event stream.
//!
//! The agent runtime answers a message with a server-sent event stream: one
//! JSON object per event, each on a `data: ` line and terminated by a blank
//! line. [`sse::SseDecoder`] recovers the JSON payloads from raw byte chunks
//! and [`decode_event`] turns each payload into a typed [`StreamEvent`].
//!
//! Progress percentages are normalized here, at the boundary, onto a 0–100
//! scale. Everything downstream of this crate sees only that scale.

pub mod phase;
pub mod sse;

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use phase::Phase;
pub use sse::SseDecoder;

/// Error returned by [`decode_event`] and [`SseDecoder`].
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The payload is not valid JSON or a field has the wrong shape.
    #[error("malformed event json: {0}")]
    Json(#[from] serde_json::Error),
    /// The `type` field names an event this client doesn't know.
    #[error("unknown event type: {0}")]
    UnknownType(String),
    /// The object carries no `type` field.
    #[error("event has no type")]
    MissingType,
    /// A stream line was not valid UTF-8.
    #[error("event line is not utf-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    /// A `data:` field with nothing in it.
    #[error("empty event payload")]
    Empty,
}

/// Scale used by the server for `status_update.progress`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProgressScale {
    /// `0.0..=1.0`.
    #[default]
    Fraction,
    /// `0.0..=100.0`.
    Percent,
}

impl ProgressScale {
    /// Convert a wire value to a percentage in `[0, 100]`.
    #[must_use]
    pub fn to_percent(self, raw: f64) -> f64 {
        let pct = match self {
            Self::Fraction => raw * 100.0,
            Self::Percent => raw,
        };
        if pct.is_nan() { 0.0 } else { pct.clamp(0.0, 100.0) }
    }

    /// Convert a percentage back to the wire scale.
    #[must_use]
    pub fn from_percent(self, pct: f64) -> f64 {
        match self {
            Self::Fraction => pct / 100.0,
            Self::Percent => pct,
        }
    }
}

/// Returned when a progress scale name is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown progress scale {0:?} (expected \"fraction\" or \"percent\")")]
pub struct UnknownScale(pub String);

impl FromStr for ProgressScale {
    type Err = UnknownScale;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fraction" => Ok(Self::Fraction),
            "percent" => Ok(Self::Percent),
            other => Err(UnknownScale(other.to_owned())),
        }
    }
}

/// `{current, total}` step counter attached to some status updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub current: u32,
    pub total: u32,
}

/// Payload of a `status_update` event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusUpdate {
    /// Raw phase name; see [`StatusUpdate::phase`].
    pub phase: Option<String>,
    /// Normalized to `[0, 100]`.
    pub percentage: Option<f64>,
    pub message: Option<String>,
    pub step: Option<Step>,
    /// File being written during `tool_use`.
    pub filename: Option<String>,
}

impl StatusUpdate {
    /// The phase, if the server sent one this client knows.
    #[must_use]
    pub fn phase(&self) -> Option<Phase> {
        self.phase.as_deref().and_then(Phase::parse)
    }
}

/// What an event says happened.
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    MessageStart,
    MessageDelta { content: String },
    /// Some servers repeat the full content on completion.
    MessageComplete { content: Option<String> },
    StatusUpdate(StatusUpdate),
    Error { error: Option<String> },
}

impl EventKind {
    /// The wire `type` value.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::MessageStart => "message_start",
            Self::MessageDelta { .. } => "message_delta",
            Self::MessageComplete { .. } => "message_complete",
            Self::StatusUpdate(_) => "status_update",
            Self::Error { .. } => "error",
        }
    }

    /// Whether this event ends the assistant turn.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::MessageComplete { .. } | Self::Error { .. })
    }
}

/// One decoded event from the stream.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEvent {
    pub session_id: Option<String>,
    pub message_id: Option<String>,
    pub kind: EventKind,
}

impl StreamEvent {
    /// An event with no session or message id.
    #[must_use]
    pub fn new(kind: EventKind) -> Self {
        Self { session_id: None, message_id: None, kind }
    }

    #[must_use]
    pub fn delta(content: impl Into<String>) -> Self {
        Self::new(EventKind::MessageDelta { content: content.into() })
    }

    #[must_use]
    pub fn status(phase: Phase, percentage: f64, message: impl Into<String>) -> Self {
        Self::new(EventKind::StatusUpdate(StatusUpdate {
            phase: Some(phase.as_str().to_owned()),
            percentage: Some(percentage),
            message: Some(message.into()),
            ..Default::default()
        }))
    }

    #[must_use]
    pub fn complete() -> Self {
        Self::new(EventKind::MessageComplete { content: None })
    }

    #[must_use]
    pub fn error(error: impl Into<String>) -> Self {
        Self::new(EventKind::Error { error: Some(error.into()) })
    }

    #[must_use]
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

/// Loose view of every field any event type may carry.
#[derive(Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    kind: Option<String>,
    session_id: Option<String>,
    message_id: Option<String>,
    content: Option<String>,
    phase: Option<String>,
    progress: Option<f64>,
    message: Option<Value>,
    step: Option<Step>,
    filename: Option<String>,
    error: Option<String>,
}

/// Decode one JSON payload into a typed event.
///
/// # Errors
///
/// Returns [`CodecError::Empty`] for a blank payload, [`CodecError::Json`]
/// for malformed JSON, and [`CodecError::MissingType`] /
/// [`CodecError::UnknownType`] when the `type` field is absent or unknown.
pub fn decode_event(payload: &str, scale: ProgressScale) -> Result<StreamEvent, CodecError> {
    if payload.trim().is_empty() {
        return Err(CodecError::Empty);
    }
    let raw: RawEvent = serde_json::from_str(payload)?;
    let type_name = raw.kind.ok_or(CodecError::MissingType)?;

    let kind = match type_name.as_str() {
        "message_start" => EventKind::MessageStart,
        "message_delta" => EventKind::MessageDelta { content: raw.content.unwrap_or_default() },
        "message_complete" => EventKind::MessageComplete { content: raw.content },
        "status_update" => EventKind::StatusUpdate(StatusUpdate {
            phase: raw.phase,
            percentage: raw.progress.map(|p| scale.to_percent(p)),
            // Some servers put a whole message object here; only text is a status.
            message: raw.message.and_then(|m| m.as_str().map(str::to_owned)),
            step: raw.step,
            filename: raw.filename,
        }),
        "error" => EventKind::Error { error: raw.error },
        _ => return Err(CodecError::UnknownType(type_name)),
    };

    Ok(StreamEvent { session_id: raw.session_id, message_id: raw.message_id, kind })
}

/// Encode an event as one SSE frame: `data: {json}\n\n`.
#[must_use]
pub fn encode_event(event: &StreamEvent, scale: ProgressScale) -> String {
    let mut obj = Map::new();
    obj.insert("type".into(), Value::from(event.kind.type_name()));
    if let Some(id) = &event.session_id {
        obj.insert("session_id".into(), Value::from(id.as_str()));
    }
    if let Some(id) = &event.message_id {
        obj.insert("message_id".into(), Value::from(id.as_str()));
    }

    match &event.kind {
        EventKind::MessageStart => {}
        EventKind::MessageDelta { content } => {
            obj.insert("content".into(), Value::from(content.as_str()));
        }
        EventKind::MessageComplete { content } => {
            if let Some(content) = content {
                obj.insert("content".into(), Value::from(content.as_str()));
            }
        }
        EventKind::StatusUpdate(update) => {
            if let Some(phase) = &update.phase {
                obj.insert("phase".into(), Value::from(phase.as_str()));
            }
            if let Some(pct) = update.percentage {
                obj.insert("progress".into(), Value::from(scale.from_percent(pct)));
            }
            if let Some(message) = &update.message {
                obj.insert("message".into(), Value::from(message.as_str()));
            }
            if let Some(step) = update.step {
                obj.insert("step".into(), serde_json::json!({"current": step.current, "total": step.total}));
            }
            if let Some(filename) = &update.filename {
                obj.insert("filename".into(), Value::from(filename.as_str()));
            }
        }
        EventKind::Error { error } => {
            if let Some(error) = error {
                obj.insert("error".into(), Value::from(error.as_str()));
            }
        }
    }

    format!("data: {}\n\n", Value::Object(obj))
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
