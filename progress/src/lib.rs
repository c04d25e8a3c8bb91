//! Derived progress state for agent tasks.
//!
//! Everything here is computed from data the caller already holds: the phase
//! stream, the latest assistant message, and a clock reading. Nothing keeps
//! timers or does I/O, so the same inputs always render the same output.

pub mod checklist;

use serde::{Deserialize, Serialize};

pub use checklist::{Checklist, TaskItem, TaskState};

/// Longest activity summary shown for a finished message, in characters.
pub const SUMMARY_MAX_CHARS: usize = 150;

/// Coarse lifecycle of a project as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    #[default]
    Idle,
    Planning,
    Working,
    NeedsInput,
    Verifying,
    Complete,
}

impl ProjectStatus {
    #[must_use]
    pub fn status_text(self) -> &'static str {
        match self {
            Self::Idle => "Waiting for task",
            Self::Planning => "Analyzing your request...",
            Self::Working => "Creating deliverables...",
            Self::NeedsInput => "Waiting for your response",
            Self::Verifying => "Checking quality...",
            Self::Complete => "Task complete",
        }
    }
}

/// One-line activity text for a widget or activity bar.
///
/// While the latest assistant message is streaming its full content is shown;
/// otherwise it is cut to [`SUMMARY_MAX_CHARS`] characters with a trailing
/// ellipsis. With no content the project status text is used.
#[must_use]
pub fn summarize_activity(latest_content: Option<&str>, streaming: bool, status: ProjectStatus) -> String {
    let Some(content) = latest_content.filter(|c| !c.is_empty()) else {
        return status.status_text().to_owned();
    };
    if streaming {
        return content.to_owned();
    }
    match content.char_indices().nth(SUMMARY_MAX_CHARS) {
        Some((cut, _)) => format!("{}...", &content[..cut]),
        None => content.to_owned(),
    }
}

/// `"Xm Ys"` between two millisecond timestamps. Negative spans read as zero.
#[must_use]
pub fn format_elapsed(start_ms: i64, now_ms: i64) -> String {
    let elapsed = (now_ms - start_ms).max(0);
    let minutes = elapsed / 60_000;
    let seconds = (elapsed % 60_000) / 1_000;
    format!("{minutes}m {seconds}s")
}

/// Presentation hint read out of free-form log text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    Done,
    Ready,
}

impl Signal {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Done => "Done",
            Self::Ready => "Ready",
        }
    }
}

const DONE_MARKERS: [&str; 2] = ["completed", "done"];
const READY_MARKERS: [&str; 3] = ["waiting", "ready", "initialized"];

/// Best-effort, case-insensitive match of known substrings.
///
/// Only for captions. The widget status remains the source of truth.
#[must_use]
pub fn classify_signal(text: &str) -> Option<Signal> {
    let lower = text.to_lowercase();
    if DONE_MARKERS.iter().any(|m| lower.contains(m)) {
        return Some(Signal::Done);
    }
    if READY_MARKERS.iter().any(|m| lower.contains(m)) {
        return Some(Signal::Ready);
    }
    None
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
