//! Phase-driven task checklist.
//!
//! The checklist is derived state: it only changes when a phase arrives, the
//! stream ends, or the caller resets it. It keeps timestamps, not timers;
//! elapsed times are computed from those timestamps and a caller-supplied
//! clock reading.

#[cfg(test)]
#[path = "checklist_test.rs"]
mod checklist_test;

use events::Phase;
use serde::{Deserialize, Serialize};

/// Where a checklist task stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Pending,
    Active,
    Completed,
    Failed,
}

/// One row of the checklist, bound to a phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskItem {
    pub id: Phase,
    pub label: String,
    pub state: TaskState,
    pub started_at_ms: Option<i64>,
    pub completed_at_ms: Option<i64>,
    /// Latest activity text while active; cleared on completion.
    pub status_message: Option<String>,
}

impl TaskItem {
    fn pending(phase: Phase) -> Self {
        Self {
            id: phase,
            label: phase.task_label().to_owned(),
            state: TaskState::Pending,
            started_at_ms: None,
            completed_at_ms: None,
            status_message: None,
        }
    }
}

/// Ordered checklist with one task per [`Phase`].
///
/// For the active task at index `i`, every task before it is completed and
/// every task after it is pending. Phases older than the active one are
/// ignored, as is everything after a force-complete or failure until
/// [`Checklist::reset`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checklist {
    tasks: Vec<TaskItem>,
    #[serde(default)]
    sealed: bool,
}

impl Default for Checklist {
    fn default() -> Self {
        Self::new()
    }
}

impl Checklist {
    /// All tasks pending.
    #[must_use]
    pub fn new() -> Self {
        Self { tasks: Phase::ALL.into_iter().map(TaskItem::pending).collect(), sealed: false }
    }

    #[must_use]
    pub fn tasks(&self) -> &[TaskItem] {
        &self.tasks
    }

    #[must_use]
    pub fn task(&self, phase: Phase) -> Option<&TaskItem> {
        self.tasks.get(phase.index())
    }

    /// Phase of the active task, if any.
    #[must_use]
    pub fn active(&self) -> Option<Phase> {
        self.tasks.iter().find(|t| t.state == TaskState::Active).map(|t| t.id)
    }

    /// True once force-completed or failed.
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.tasks.iter().all(|t| t.state == TaskState::Completed)
    }

    #[must_use]
    pub fn completed_count(&self) -> usize {
        self.tasks.iter().filter(|t| t.state == TaskState::Completed).count()
    }

    /// Project a phase onto the checklist. Returns true if anything changed.
    ///
    /// Earlier tasks complete (stamping `completed_at`, clearing the status
    /// message), the phase's task becomes active (stamping `started_at`,
    /// taking `status_message` when one is given), later tasks stay pending.
    pub fn apply_phase(&mut self, phase: Phase, status_message: Option<&str>, now_ms: i64) -> bool {
        if self.sealed {
            return false;
        }
        let target = phase.index();
        if let Some(active) = self.active()
            && active.index() > target
        {
            return false;
        }

        let before = self.tasks.clone();
        for (index, task) in self.tasks.iter_mut().enumerate() {
            if index < target {
                task.state = TaskState::Completed;
                task.completed_at_ms.get_or_insert(now_ms);
                task.status_message = None;
            } else if index == target {
                task.state = TaskState::Active;
                task.started_at_ms.get_or_insert(now_ms);
                if let Some(message) = status_message {
                    task.status_message = Some(message.to_owned());
                }
            }
        }
        self.tasks != before
    }

    /// Like [`Checklist::apply_phase`] for a raw wire name. Unknown names are a no-op.
    pub fn apply_raw(&mut self, phase: &str, status_message: Option<&str>, now_ms: i64) -> bool {
        match Phase::parse(phase) {
            Some(phase) => self.apply_phase(phase, status_message, now_ms),
            None => false,
        }
    }

    /// Mark every task completed, filling in any missing timestamps.
    pub fn force_complete(&mut self, now_ms: i64) {
        for task in &mut self.tasks {
            task.state = TaskState::Completed;
            task.started_at_ms.get_or_insert(now_ms);
            task.completed_at_ms.get_or_insert(now_ms);
            task.status_message = None;
        }
        self.sealed = true;
    }

    /// Mark the active task failed after a stream error.
    ///
    /// With no active task the first pending one is failed instead, so the
    /// failure is always visible. Returns false if nothing could be marked.
    pub fn mark_failed(&mut self, now_ms: i64) -> bool {
        if self.sealed {
            return false;
        }
        let index = self
            .tasks
            .iter()
            .position(|t| t.state == TaskState::Active)
            .or_else(|| self.tasks.iter().position(|t| t.state == TaskState::Pending));
        self.sealed = true;
        let Some(task) = index.and_then(|i| self.tasks.get_mut(i)) else {
            return false;
        };
        task.state = TaskState::Failed;
        task.started_at_ms.get_or_insert(now_ms);
        task.completed_at_ms = Some(now_ms);
        true
    }

    /// Back to all pending with no timestamps.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Time spent on a task: until it finished, or until `now_ms` if it
    /// is still running. `None` if it never started.
    #[must_use]
    pub fn elapsed_ms(&self, phase: Phase, now_ms: i64) -> Option<i64> {
        let task = self.task(phase)?;
        let start = task.started_at_ms?;
        let end = task.completed_at_ms.unwrap_or(now_ms);
        Some((end - start).max(0))
    }
}
