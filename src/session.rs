//! Conversation state for one agent session.
//!
//! DESIGN
//! ======
//! `Session` folds decoded stream events into an ordered message list. At
//! most one assistant message is open (streaming) at a time; it is tracked
//! by index so every event lands on the same message until a terminal
//! transition closes the turn. After that, stream events are refused with
//! [`SessionError::Terminal`] until the next [`Session::begin_turn`], so a
//! local stop always wins over late server events. An event naming any
//! message other than the open one is refused the same way, so a stream from
//! an earlier turn cannot land in (or rename) the current placeholder.
//!
//! `SessionRegistry` is an explicit map owned by the caller. Each entry
//! carries a [`StreamHandle`] that whoever issues stops holds a clone of.
//! Every turn gets a fresh handle; the previous one is left stopped.
//!
//! ERROR HANDLING
//! ==============
//! `apply` never panics and never half-applies an event: a rejected event
//! leaves the session unchanged. Callers log the error and move on.

use std::collections::HashMap;
use std::sync::Arc;

use events::{EventKind, Phase, Step, StreamEvent};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use uuid::Uuid;

/// Shown when an error event carries no text.
pub const GENERIC_STREAM_ERROR: &str = "Failed to get response";

// =============================================================================
// MESSAGES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Pending,
    Streaming,
    Complete,
    Error,
}

impl MessageStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }
}

/// Live progress of a streaming assistant message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    /// Raw phase name as sent by the server.
    pub phase: String,
    /// `[0, 100]`, never decreasing within one message.
    pub percentage: f64,
    pub status_text: String,
    pub step: Option<Step>,
    pub start_time_ms: i64,
    pub filename: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub status: MessageStatus,
    pub progress: Option<Progress>,
    pub timestamp_ms: i64,
}

impl Message {
    fn new(role: Role, content: String, status: MessageStatus, now_ms: i64) -> Self {
        Self { id: Uuid::new_v4().to_string(), role, content, status, progress: None, timestamp_ms: now_ms }
    }
}

// =============================================================================
// ERRORS / OUTCOMES
// =============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SessionError {
    #[error("stale progress {incoming} below current {current}")]
    StaleUpdate { current: f64, incoming: f64 },
    #[error("event addressed to {target}, not this session")]
    UnknownTarget { target: String },
    #[error("turn already finished")]
    Terminal,
    #[error("no open assistant message")]
    NoOpenMessage,
}

/// What an accepted event did.
#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    /// A new assistant message opened, or the placeholder was confirmed.
    Started { message_id: String },
    Progressed,
    Appended,
    Completed,
    Failed,
}

// =============================================================================
// SESSION
// =============================================================================

#[derive(Debug, Clone)]
pub struct Session {
    id: String,
    messages: Vec<Message>,
    /// Index of the streaming assistant message.
    open: Option<usize>,
    /// The open message id came from the server.
    open_bound: bool,
    /// Set by any terminal transition; cleared by `begin_turn`.
    turn_closed: bool,
    stop_deadline_ms: Option<i64>,
}

impl Session {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            messages: Vec::new(),
            open: None,
            open_bound: false,
            turn_closed: false,
            stop_deadline_ms: None,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// The streaming assistant message, if any.
    #[must_use]
    pub fn open_message(&self) -> Option<&Message> {
        self.open.and_then(|i| self.messages.get(i))
    }

    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.open.is_some()
    }

    #[must_use]
    pub fn latest_assistant(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.role == Role::Assistant)
    }

    #[must_use]
    pub fn stop_deadline_ms(&self) -> Option<i64> {
        self.stop_deadline_ms
    }

    /// Append the user's message and an empty streaming assistant placeholder.
    ///
    /// A turn still open is closed as complete first; its stream is
    /// superseded. Returns the placeholder id.
    pub fn begin_turn(&mut self, user_text: &str, now_ms: i64) -> String {
        self.close_open(MessageStatus::Complete, None);
        self.messages.push(Message::new(Role::User, user_text.to_owned(), MessageStatus::Complete, now_ms));
        let placeholder = Message::new(Role::Assistant, String::new(), MessageStatus::Streaming, now_ms);
        let id = placeholder.id.clone();
        self.messages.push(placeholder);
        self.open = Some(self.messages.len() - 1);
        self.open_bound = false;
        self.turn_closed = false;
        self.stop_deadline_ms = None;
        id
    }

    /// Replace the conversation with stored history.
    ///
    /// Refused (returns false) while a turn is streaming. Loaded messages are
    /// all terminal: anything the server still marks pending or streaming is
    /// taken as complete, since no local stream drives it. Repeated ids keep
    /// their first occurrence.
    pub fn load_history(&mut self, history: Vec<Message>) -> bool {
        if self.open.is_some() {
            return false;
        }
        let mut messages: Vec<Message> = Vec::with_capacity(history.len());
        for mut message in history {
            if messages.iter().any(|m| m.id == message.id) {
                continue;
            }
            if !message.status.is_terminal() {
                message.status = MessageStatus::Complete;
            }
            message.progress = None;
            messages.push(message);
        }
        self.messages = messages;
        self.open_bound = false;
        self.stop_deadline_ms = None;
        true
    }

    /// Fold one stream event into the session.
    ///
    /// # Errors
    ///
    /// - [`SessionError::UnknownTarget`] for a foreign session or message id.
    /// - [`SessionError::Terminal`] once the turn has finished.
    /// - [`SessionError::StaleUpdate`] for a progress regression.
    /// - [`SessionError::NoOpenMessage`] for content with nothing to land on.
    pub fn apply(&mut self, event: &StreamEvent, now_ms: i64) -> Result<Applied, SessionError> {
        if let Some(target) = &event.session_id
            && *target != self.id
        {
            return Err(SessionError::UnknownTarget { target: target.clone() });
        }
        self.check_message_target(event.message_id.as_deref())?;

        match &event.kind {
            EventKind::MessageStart => self.start(event.message_id.as_deref(), now_ms),
            EventKind::StatusUpdate(update) => {
                let index = self.require_open()?;
                let message = &mut self.messages[index];
                if let (Some(current), Some(incoming)) = (message.progress.as_ref(), update.percentage)
                    && incoming < current.percentage
                {
                    return Err(SessionError::StaleUpdate { current: current.percentage, incoming });
                }
                message.progress = Some(merge_progress(message.progress.take(), update, now_ms));
                self.bind(event.message_id.as_deref());
                Ok(Applied::Progressed)
            }
            EventKind::MessageDelta { content } => {
                let index = self.require_open()?;
                self.messages[index].content.push_str(content);
                self.bind(event.message_id.as_deref());
                Ok(Applied::Appended)
            }
            EventKind::MessageComplete { content } => {
                self.require_open()?;
                let replacement = content.as_deref().filter(|c| !c.is_empty()).map(str::to_owned);
                self.close_open(MessageStatus::Complete, replacement);
                Ok(Applied::Completed)
            }
            EventKind::Error { error } => {
                if self.turn_closed {
                    return Err(SessionError::Terminal);
                }
                if self.open.is_none() {
                    self.messages.push(Message::new(Role::Assistant, String::new(), MessageStatus::Streaming, now_ms));
                    self.open = Some(self.messages.len() - 1);
                }
                let text = error.as_deref().filter(|e| !e.trim().is_empty()).unwrap_or(GENERIC_STREAM_ERROR);
                self.close_open(MessageStatus::Error, Some(format!("Error: {text}")));
                Ok(Applied::Failed)
            }
        }
    }

    /// Fail the open message because the transport broke.
    pub fn fail(&mut self, text: &str) -> bool {
        if self.open.is_none() {
            return false;
        }
        self.close_open(MessageStatus::Error, Some(format!("Error: {text}")));
        true
    }

    /// Start the stop grace period. Returns false if nothing is streaming.
    pub fn request_stop(&mut self, now_ms: i64, grace_ms: i64) -> bool {
        if self.open.is_none() {
            return false;
        }
        self.stop_deadline_ms.get_or_insert(now_ms + grace_ms);
        true
    }

    /// Force the open message into `Error` once the stop deadline passed.
    ///
    /// Partial content is kept; the timeout note is appended. Returns true
    /// if the message was forced.
    pub fn check_stop_deadline(&mut self, now_ms: i64) -> bool {
        let Some(deadline) = self.stop_deadline_ms else {
            return false;
        };
        if now_ms < deadline {
            return false;
        }
        let Some(index) = self.open else {
            self.stop_deadline_ms = None;
            return false;
        };
        let note = "Error: Stopped; the agent did not finish in time";
        let content = &self.messages[index].content;
        let content = if content.is_empty() { note.to_owned() } else { format!("{content}\n\n{note}") };
        self.close_open(MessageStatus::Error, Some(content));
        true
    }

    /// The stream ended without a terminal event: complete the open message.
    pub fn finish_stream(&mut self) -> bool {
        if self.open.is_none() {
            return false;
        }
        self.close_open(MessageStatus::Complete, None);
        true
    }

    fn start(&mut self, message_id: Option<&str>, now_ms: i64) -> Result<Applied, SessionError> {
        if let Some(index) = self.open {
            self.bind(message_id);
            return Ok(Applied::Started { message_id: self.messages[index].id.clone() });
        }
        if self.turn_closed {
            return Err(SessionError::Terminal);
        }
        let mut message = Message::new(Role::Assistant, String::new(), MessageStatus::Streaming, now_ms);
        if let Some(id) = message_id {
            message.id = id.to_owned();
        }
        let id = message.id.clone();
        self.messages.push(message);
        self.open = Some(self.messages.len() - 1);
        self.open_bound = message_id.is_some();
        Ok(Applied::Started { message_id: id })
    }

    fn require_open(&self) -> Result<usize, SessionError> {
        match self.open {
            Some(index) => Ok(index),
            None if self.turn_closed => Err(SessionError::Terminal),
            None => Err(SessionError::NoOpenMessage),
        }
    }

    /// Reject a message id that names a different message than the open one.
    fn check_message_target(&self, message_id: Option<&str>) -> Result<(), SessionError> {
        let Some(target) = message_id else {
            return Ok(());
        };
        let earlier = self.messages.iter().enumerate().any(|(i, m)| Some(i) != self.open && m.id == target);
        if earlier {
            return Err(SessionError::Terminal);
        }
        match self.open {
            Some(index) if self.open_bound && self.messages[index].id != target => {
                Err(SessionError::UnknownTarget { target: target.to_owned() })
            }
            _ => Ok(()),
        }
    }

    /// Adopt the server's id for the placeholder the first time one arrives.
    fn bind(&mut self, message_id: Option<&str>) {
        if let (Some(index), Some(id), false) = (self.open, message_id, self.open_bound) {
            self.messages[index].id = id.to_owned();
            self.open_bound = true;
        }
    }

    fn close_open(&mut self, status: MessageStatus, content: Option<String>) {
        if let Some(index) = self.open.take() {
            let message = &mut self.messages[index];
            message.status = status;
            message.progress = None;
            if let Some(content) = content {
                message.content = content;
            }
            self.turn_closed = true;
        }
        self.open_bound = false;
        self.stop_deadline_ms = None;
    }
}

/// Combine the previous progress with a new update; absent fields carry over.
fn merge_progress(previous: Option<Progress>, update: &events::StatusUpdate, now_ms: i64) -> Progress {
    let start_time_ms = previous.as_ref().map_or(now_ms, |p| p.start_time_ms);
    let previous_phase = previous.as_ref().map(|p| p.phase.clone());
    let phase = update.phase.clone().or(previous_phase.clone()).unwrap_or_default();
    let phase_changed = previous_phase.as_deref() != Some(phase.as_str());

    let filename = match &update.filename {
        Some(name) => Some(name.clone()),
        None if phase_changed => None,
        None => previous.as_ref().and_then(|p| p.filename.clone()),
    };
    let status_text = match (&update.message, Phase::parse(&phase)) {
        (Some(text), _) => text.clone(),
        (None, Some(known)) if phase_changed || update.filename.is_some() => known.status_label(filename.as_deref()),
        (None, _) => previous.as_ref().map(|p| p.status_text.clone()).unwrap_or_default(),
    };

    Progress {
        percentage: update.percentage.or(previous.as_ref().map(|p| p.percentage)).unwrap_or(0.0),
        step: update.step.or(previous.as_ref().and_then(|p| p.step)),
        phase,
        status_text,
        start_time_ms,
        filename,
    }
}

// =============================================================================
// STREAM HANDLE
// =============================================================================

/// Stop switch shared between a running stream driver and whoever stops it.
#[derive(Debug, Clone)]
pub struct StreamHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for StreamHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamHandle {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Request a stop. Idempotent.
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }

    /// Receiver the driver selects on.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

#[derive(Debug)]
struct SessionEntry {
    session: Session,
    handle: StreamHandle,
}

/// Sessions by id. Each session is isolated: events for one never touch another.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    entries: HashMap<String, SessionEntry>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the session with this id.
    pub fn open(&mut self, id: &str) -> &mut Session {
        &mut self
            .entries
            .entry(id.to_owned())
            .or_insert_with(|| SessionEntry { session: Session::new(id), handle: StreamHandle::new() })
            .session
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Session> {
        self.entries.get(id).map(|e| &e.session)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Session> {
        self.entries.get_mut(id).map(|e| &mut e.session)
    }

    /// A clone of the session's stop handle.
    #[must_use]
    pub fn handle(&self, id: &str) -> Option<StreamHandle> {
        self.entries.get(id).map(|e| e.handle.clone())
    }

    /// Stop the session's current stream and issue a fresh handle for the next.
    ///
    /// Clones of the old handle stay stopped, so a driver still running for
    /// an earlier turn winds down instead of being re-armed.
    pub fn renew_handle(&mut self, id: &str) -> Option<StreamHandle> {
        let entry = self.entries.get_mut(id)?;
        entry.handle.stop();
        entry.handle = StreamHandle::new();
        Some(entry.handle.clone())
    }

    /// Drop a session. Its stream, if running, is told to stop.
    pub fn remove(&mut self, id: &str) -> Option<Session> {
        let entry = self.entries.remove(id)?;
        entry.handle.stop();
        Some(entry.session)
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod session_test;
