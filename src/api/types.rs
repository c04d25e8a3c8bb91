//! Wire types for the task, project and session endpoints.
//!
//! Response structs default every field the backend may omit so that a
//! newer server adding or dropping optional fields does not break parsing.

use serde::{Deserialize, Serialize};

use crate::session::{Message, MessageStatus, Role};

// =============================================================================
// TASKS
// =============================================================================

/// Backend task lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Pending,
    Planning,
    Executing,
    Verifying,
    Completed,
    Failed,
    /// A status this client does not know yet.
    #[serde(other)]
    Unknown,
}

impl TaskStatus {
    /// Completed or failed; polling stops here.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Planning, executing or verifying.
    #[must_use]
    pub fn is_working(self) -> bool {
        matches!(self, Self::Planning | Self::Executing | Self::Verifying)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTaskRequest {
    pub goal: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<String>,
}

impl CreateTaskRequest {
    #[must_use]
    pub fn new(goal: impl Into<String>) -> Self {
        Self { goal: goal.into(), context: None, constraints: Vec::new() }
    }
}

/// Acknowledgement for a submitted task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskReceipt {
    pub task_id: String,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    #[serde(default)]
    pub goal: String,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub constraints: Vec<String>,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub completed_at: Option<String>,
    #[serde(default)]
    pub current_activity: Option<String>,
    /// Seconds.
    #[serde(default)]
    pub elapsed_time: Option<f64>,
    /// Free-form progress line; logged on the widget whenever it changes.
    #[serde(default)]
    pub progress: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskList {
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub name: String,
    pub path: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub content: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationCheck {
    pub check: String,
    pub passed: bool,
    #[serde(default)]
    pub details: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Validation {
    #[serde(default)]
    pub overall_confidence: f64,
    #[serde(default)]
    pub checks: Vec<VerificationCheck>,
    #[serde(default)]
    pub issues: Vec<String>,
}

impl Validation {
    #[must_use]
    pub fn passed_count(&self) -> usize {
        self.checks.iter().filter(|c| c.passed).count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    #[serde(default)]
    pub task_id: String,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
    #[serde(default)]
    pub validation: Validation,
    #[serde(default)]
    pub error_message: Option<String>,
}

// =============================================================================
// PROJECTS / SESSIONS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectType {
    Game,
    Trip,
    Content,
    Presentation,
}

impl std::str::FromStr for ProjectType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "game" => Ok(Self::Game),
            "trip" => Ok(Self::Trip),
            "content" => Ok(Self::Content),
            "presentation" => Ok(Self::Presentation),
            other => Err(format!("unknown project type: {other}")),
        }
    }
}

/// Stored lifecycle of a project record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectState {
    #[default]
    Active,
    Archived,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub kind: ProjectType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub kind: ProjectType,
    #[serde(default)]
    pub status: ProjectState,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateSessionRequest<'a> {
    pub name: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: String,
    pub project_id: String,
    pub name: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// One stored message from a session's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub id: String,
    #[serde(default)]
    pub session_id: Option<String>,
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub status: Option<MessageStatus>,
    /// ISO-8601 as stored by the server.
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl HistoryMessage {
    /// Convert for [`crate::session::Session::load_history`], stamped with `received_ms`.
    #[must_use]
    pub fn into_message(self, received_ms: i64) -> Message {
        Message {
            id: self.id,
            role: self.role,
            content: self.content,
            status: self.status.unwrap_or(MessageStatus::Complete),
            progress: None,
            timestamp_ms: received_ms,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct SendMessageRequest<'a> {
    pub content: &'a str,
}

#[cfg(test)]
#[path = "types_test.rs"]
mod types_test;
