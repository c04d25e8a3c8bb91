#[cfg(test)]
#[path = "phase_test.rs"]
mod phase_test;

use serde::{Deserialize, Serialize};

/// A named stage of agent work, in the order the agent moves through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Understanding,
    Planning,
    Thinking,
    Generating,
    ToolUse,
    Complete,
}

impl Phase {
    /// Every phase in checklist order.
    pub const ALL: [Self; 6] = [
        Self::Understanding,
        Self::Planning,
        Self::Thinking,
        Self::Generating,
        Self::ToolUse,
        Self::Complete,
    ];

    /// Parse a wire phase name. Unknown names yield `None`.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_str() == raw)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Understanding => "understanding",
            Self::Planning => "planning",
            Self::Thinking => "thinking",
            Self::Generating => "generating",
            Self::ToolUse => "tool_use",
            Self::Complete => "complete",
        }
    }

    /// Position in [`Phase::ALL`].
    #[must_use]
    pub fn index(self) -> usize {
        match self {
            Self::Understanding => 0,
            Self::Planning => 1,
            Self::Thinking => 2,
            Self::Generating => 3,
            Self::ToolUse => 4,
            Self::Complete => 5,
        }
    }

    /// Checklist label for the task this phase drives.
    #[must_use]
    pub fn task_label(self) -> &'static str {
        match self {
            Self::Understanding => "Understand your request",
            Self::Planning => "Plan the structure",
            Self::Thinking => "Design the approach",
            Self::Generating => "Create the files",
            Self::ToolUse => "Build components",
            Self::Complete => "Finalize and verify",
        }
    }

    /// Short present-tense caption shown while the phase is running.
    #[must_use]
    pub fn status_label(self, filename: Option<&str>) -> String {
        match self {
            Self::Understanding => "Understanding your request...".to_owned(),
            Self::Planning => "Planning approach...".to_owned(),
            Self::Thinking => "Thinking through options...".to_owned(),
            Self::Generating => "Crafting response...".to_owned(),
            Self::ToolUse => match filename {
                Some(name) => format!("Creating {name}..."),
                None => "Creating files...".to_owned(),
            },
            Self::Complete => "Complete".to_owned(),
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
