//! Workspace: canvas widgets joined with their sessions and checklists.
//!
//! DESIGN
//! ======
//! The canvas engine owns geometry and widget records; sessions own
//! messages; checklists own phase progress. `Workspace` keeps the three in
//! step for each widget: stream events land on the widget's session, phases
//! project onto its checklist, and message status drives the widget status
//! and log. Nothing here does I/O; callers snapshot after changes and hand
//! the snapshot to the persistence worker.

use std::collections::{BTreeMap, HashMap};

use canvas::engine::{Action, EngineCore};
use canvas::registry::{LogEntry, LogLevel, PartialWidget, StatusState, WidgetId};
use events::{EventKind, StreamEvent};
use progress::{Checklist, ProjectStatus, Signal, classify_signal, summarize_activity};
use tracing::{debug, info, warn};

use crate::api::types::{Task, TaskResult, TaskStatus};
use crate::error::ClientError;
use crate::persist::{SNAPSHOT_VERSION, Snapshot};
use crate::session::{Applied, Message, MessageStatus, Session, SessionError, SessionRegistry, StreamHandle};
use crate::stream::StreamTarget;

/// Widget status for an assistant message status.
#[must_use]
pub fn status_for(message: MessageStatus) -> StatusState {
    match message {
        MessageStatus::Pending | MessageStatus::Streaming => StatusState::Running,
        MessageStatus::Complete => StatusState::Completed,
        MessageStatus::Error => StatusState::Error,
    }
}

#[derive(Debug, Default)]
pub struct Workspace {
    pub engine: EngineCore,
    sessions: SessionRegistry,
    checklists: BTreeMap<WidgetId, Checklist>,
    /// Backend session id per widget; widgets without one use their own id.
    session_ids: HashMap<WidgetId, String>,
}

impl Workspace {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Default title for the next task widget.
    #[must_use]
    pub fn next_task_title(&self) -> String {
        format!("Task {}", self.engine.registry.len() + 1)
    }

    // --- Widgets ---

    /// Create a running widget that follows a backend task.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::DuplicateId`] if the generated id collides.
    pub fn create_task_widget(
        &mut self,
        title: &str,
        task_id: &str,
        goal: &str,
        now_ms: i64,
    ) -> Result<WidgetId, ClientError> {
        let id = self.engine.create_widget(title)?;
        let registry = &mut self.engine.registry;
        registry.update(
            &id,
            &PartialWidget {
                status: Some(StatusState::Running),
                linked_task_id: Some(task_id.to_owned()),
                ..Default::default()
            },
        );
        registry.append_log(&id, LogEntry::new(now_ms, LogLevel::Info, format!("Task submitted: {goal}")));
        registry.append_log(&id, LogEntry::new(now_ms, LogLevel::Info, format!("Task ID: {task_id}")));
        self.checklists.insert(id, Checklist::new());
        info!(widget_id = %id, task_id, "task widget created");
        Ok(id)
    }

    /// Create an idle widget bound to a backend chat session.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::DuplicateId`] if the generated id collides.
    pub fn create_session_widget(&mut self, title: &str, session_id: &str) -> Result<WidgetId, ClientError> {
        let id = self.engine.create_widget(title)?;
        self.bind_session(&id, session_id);
        Ok(id)
    }

    /// Point an existing widget at a backend chat session. Returns false for
    /// an unknown widget.
    pub fn bind_session(&mut self, id: &WidgetId, session_id: &str) -> bool {
        if !self.engine.registry.contains(id) {
            return false;
        }
        self.session_ids.insert(*id, session_id.to_owned());
        self.checklists.entry(*id).or_default();
        self.sessions.open(session_id);
        true
    }

    /// First widget with this title.
    #[must_use]
    pub fn find_by_title(&self, title: &str) -> Option<WidgetId> {
        self.engine.registry.list().iter().find(|w| w.title == title).map(|w| w.id)
    }

    /// Remove a widget with its session and checklist. A running stream is stopped.
    pub fn close_widget(&mut self, id: &WidgetId) -> Vec<Action> {
        let actions = self.engine.close_widget(id);
        if actions.is_empty() {
            return actions;
        }
        let key = self.session_key(id);
        self.sessions.remove(&key);
        self.session_ids.remove(id);
        self.checklists.remove(id);
        info!(widget_id = %id, "widget closed");
        actions
    }

    // --- Sessions ---

    fn session_key(&self, id: &WidgetId) -> String {
        self.session_ids.get(id).cloned().unwrap_or_else(|| id.to_string())
    }

    #[must_use]
    pub fn session(&self, id: &WidgetId) -> Option<&Session> {
        self.sessions.get(&self.session_key(id))
    }

    #[must_use]
    pub fn checklist(&self, id: &WidgetId) -> Option<&Checklist> {
        self.checklists.get(id)
    }

    /// Stop switch for the widget's stream; the stream driver watches it.
    #[must_use]
    pub fn stop_handle(&self, id: &WidgetId) -> Option<StreamHandle> {
        self.sessions.handle(&self.session_key(id))
    }

    /// Seed the widget's session with stored history.
    ///
    /// Returns false for an unknown widget or while a turn is streaming.
    pub fn load_history(&mut self, id: &WidgetId, history: Vec<Message>) -> bool {
        if !self.engine.registry.contains(id) {
            return false;
        }
        let key = self.session_key(id);
        let count = history.len();
        let loaded = self.sessions.open(&key).load_history(history);
        debug!(session = %key, count, loaded, "session history");
        loaded
    }

    /// Start a new turn on the widget's session. Returns the placeholder id.
    pub fn begin_turn(&mut self, id: &WidgetId, text: &str, now_ms: i64) -> Option<String> {
        if !self.engine.registry.contains(id) {
            return None;
        }
        let key = self.session_key(id);
        let placeholder = self.sessions.open(&key).begin_turn(text, now_ms);
        self.sessions.renew_handle(&key);
        self.checklists.entry(*id).or_default().reset();
        self.set_status(id, StatusState::Running);
        Some(placeholder)
    }

    /// Fold a stream event into the widget's session, checklist and status.
    ///
    /// # Errors
    ///
    /// The [`SessionError`] the event was refused with. An unknown widget is
    /// [`SessionError::UnknownTarget`].
    pub fn ingest(&mut self, id: &WidgetId, event: &StreamEvent, now_ms: i64) -> Result<Applied, SessionError> {
        if !self.engine.registry.contains(id) {
            return Err(SessionError::UnknownTarget { target: id.to_string() });
        }
        let key = self.session_key(id);
        let applied = self.sessions.open(&key).apply(event, now_ms)?;

        match (&applied, &event.kind) {
            (Applied::Progressed, EventKind::StatusUpdate(update)) => {
                if let Some(phase) = &update.phase {
                    let checklist = self.checklists.entry(*id).or_default();
                    if !checklist.apply_raw(phase, update.message.as_deref(), now_ms) {
                        debug!(widget_id = %id, phase = %phase, "phase did not move the checklist");
                    }
                }
                let status_text = self
                    .session(id)
                    .and_then(Session::open_message)
                    .and_then(|m| m.progress.as_ref())
                    .map(|p| p.status_text.clone());
                if let Some(text) = status_text.filter(|t| !t.is_empty()) {
                    self.log_if_changed(id, LogLevel::Info, &text, now_ms);
                }
                self.set_status(id, StatusState::Running);
            }
            (Applied::Started { .. } | Applied::Appended, _) => {
                let status = self
                    .session(id)
                    .and_then(Session::open_message)
                    .map_or(StatusState::Running, |m| status_for(m.status));
                self.set_status(id, status);
            }
            (Applied::Completed, _) => self.finish(id, now_ms),
            (Applied::Failed, _) => self.fail(id, now_ms),
            (Applied::Progressed, _) => {}
        }
        Ok(applied)
    }

    fn finish(&mut self, id: &WidgetId, now_ms: i64) {
        self.checklists.entry(*id).or_default().force_complete(now_ms);
        self.set_status(id, status_for(MessageStatus::Complete));
        self.append_log(id, LogLevel::Success, "Response complete", now_ms);
    }

    fn fail(&mut self, id: &WidgetId, now_ms: i64) {
        self.checklists.entry(*id).or_default().mark_failed(now_ms);
        self.set_status(id, status_for(MessageStatus::Error));
        let text = self
            .session(id)
            .and_then(Session::latest_assistant)
            .map_or_else(|| "Error".to_owned(), |m| m.content.clone());
        self.append_log(id, LogLevel::Error, &text, now_ms);
    }

    // --- Task polling ---

    /// Widgets following a task that has not finished yet.
    #[must_use]
    pub fn pollable_tasks(&self) -> Vec<(WidgetId, String)> {
        self.engine
            .registry
            .list()
            .iter()
            .filter(|w| !w.status.is_terminal())
            .filter_map(|w| w.linked_task_id.clone().map(|task| (w.id, task)))
            .collect()
    }

    /// Reflect a polled task on its widget. Returns true if anything changed.
    pub fn apply_task_poll(&mut self, id: &WidgetId, task: &Task, now_ms: i64) -> bool {
        let Some(widget) = self.engine.registry.get(id) else {
            return false;
        };
        let status = match task.status {
            TaskStatus::Completed => StatusState::Completed,
            TaskStatus::Failed => StatusState::Error,
            s if s.is_working() => StatusState::Running,
            _ => widget.status,
        };
        let mut changed = status != widget.status;
        if changed {
            self.set_status(id, status);
        }
        if let Some(progress) = task.progress.as_deref().filter(|p| !p.is_empty()) {
            changed |= self.log_if_changed(id, LogLevel::Info, progress, now_ms);
        }
        changed
    }

    /// Store a finished task's result and log it.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Json`] if the result cannot be converted to JSON.
    pub fn attach_result(&mut self, id: &WidgetId, result: &TaskResult, now_ms: i64) -> Result<bool, ClientError> {
        if !self.engine.registry.contains(id) {
            return Ok(false);
        }
        let value = serde_json::to_value(result)?;
        self.engine.registry.update(id, &PartialWidget { result: Some(value), ..Default::default() });
        let message = format!("Task completed! Generated {} artifacts.", result.artifacts.len());
        self.append_log(id, LogLevel::Success, &message, now_ms);
        if !result.success {
            let text = result.error_message.as_deref().unwrap_or("Task reported failure");
            self.append_log(id, LogLevel::Error, text, now_ms);
        }
        Ok(true)
    }

    // --- Presentation ---

    /// One-line status caption for a widget body.
    ///
    /// Running widgets always read "Processing...". Otherwise the last log
    /// line is checked for a done/ready hint before falling back to the status.
    #[must_use]
    pub fn caption(&self, id: &WidgetId) -> Option<String> {
        let widget = self.engine.registry.get(id)?;
        if widget.status == StatusState::Running {
            return Some("Processing...".to_owned());
        }
        if let Some(signal) = widget.logs.last().and_then(|l| classify_signal(&l.message)) {
            return Some(signal.label().to_owned());
        }
        let text = match widget.status {
            StatusState::Idle => "Idle - Ready to start",
            StatusState::Completed => Signal::Done.label(),
            StatusState::Paused => "Paused",
            StatusState::Error => "Error",
            StatusState::Running => "Processing...",
        };
        Some(text.to_owned())
    }

    /// Activity line from the widget's latest assistant message.
    #[must_use]
    pub fn activity(&self, id: &WidgetId, status: ProjectStatus) -> String {
        let latest = self.session(id).and_then(Session::latest_assistant);
        let streaming = latest.is_some_and(|m| m.status == MessageStatus::Streaming);
        summarize_activity(latest.map(|m| m.content.as_str()), streaming, status)
    }

    // --- Persistence ---

    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            version: SNAPSHOT_VERSION,
            widgets: self.engine.registry.list().to_vec(),
            viewport: self.engine.viewport,
            checklists: self.checklists.clone(),
        }
    }

    /// Replace all state from a snapshot. Sessions start empty.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::DuplicateId`] if the snapshot repeats a widget
    /// id; the current state is kept.
    pub fn restore(&mut self, snapshot: Snapshot) -> Result<(), ClientError> {
        self.engine.load(snapshot.widgets, snapshot.viewport)?;
        let registry = &self.engine.registry;
        let mut checklists = snapshot.checklists;
        let before = checklists.len();
        checklists.retain(|id, _| registry.contains(id));
        if checklists.len() != before {
            warn!(dropped = before - checklists.len(), "snapshot checklists without a widget dropped");
        }
        self.checklists = checklists;
        self.sessions = SessionRegistry::new();
        self.session_ids.clear();
        info!(widgets = self.engine.registry.len(), "workspace restored");
        Ok(())
    }

    // --- Helpers ---

    fn set_status(&mut self, id: &WidgetId, status: StatusState) {
        self.engine.registry.update(id, &PartialWidget::status(status));
    }

    fn append_log(&mut self, id: &WidgetId, level: LogLevel, message: &str, now_ms: i64) {
        self.engine.registry.append_log(id, LogEntry::new(now_ms, level, message));
    }

    /// Append unless the last log line already says the same. Returns true if appended.
    fn log_if_changed(&mut self, id: &WidgetId, level: LogLevel, message: &str, now_ms: i64) -> bool {
        let same = self.engine.registry.get(id).and_then(|w| w.logs.last()).is_some_and(|l| l.message == message);
        if same {
            return false;
        }
        self.append_log(id, level, message, now_ms);
        true
    }
}

// =============================================================================
// STREAM TARGET
// =============================================================================

/// A widget's view of the workspace as a stream target.
pub struct WidgetStream<'a> {
    pub workspace: &'a mut Workspace,
    pub widget: WidgetId,
}

impl StreamTarget for WidgetStream<'_> {
    fn apply_event(&mut self, event: &StreamEvent, now_ms: i64) -> Result<Applied, SessionError> {
        self.workspace.ingest(&self.widget, event, now_ms)
    }

    fn transport_failed(&mut self, text: &str, now_ms: i64) {
        let key = self.workspace.session_key(&self.widget);
        if self.workspace.sessions.open(&key).fail(text) {
            self.workspace.fail(&self.widget, now_ms);
        }
    }

    fn stream_ended(&mut self, now_ms: i64) {
        let key = self.workspace.session_key(&self.widget);
        if self.workspace.sessions.open(&key).finish_stream() {
            self.workspace.finish(&self.widget, now_ms);
        }
    }

    fn stop_requested(&mut self, now_ms: i64, grace_ms: i64) {
        let key = self.workspace.session_key(&self.widget);
        if self.workspace.sessions.open(&key).request_stop(now_ms, grace_ms) {
            self.workspace.append_log(&self.widget, LogLevel::Warning, "Stop requested", now_ms);
        }
    }

    fn stop_expired(&mut self, now_ms: i64) -> bool {
        let key = self.workspace.session_key(&self.widget);
        let forced = self.workspace.sessions.open(&key).check_stop_deadline(now_ms);
        if forced {
            self.workspace.fail(&self.widget, now_ms);
        }
        forced
    }

    fn final_status(&self) -> Option<MessageStatus> {
        self.workspace.session(&self.widget).and_then(Session::latest_assistant).map(|m| m.status)
    }
}

#[cfg(test)]
#[path = "workspace_test.rs"]
mod workspace_test;
