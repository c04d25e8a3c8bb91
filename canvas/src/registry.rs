//! Widget model and the registry that owns every widget on the canvas.
//!
//! This module defines the data that describes a widget (`Widget`,
//! `DisplayState`, `StatusState`, `LogEntry`), a sparse-update type for
//! incremental edits (`PartialWidget`), and the runtime store
//! (`WidgetRegistry`).
//!
//! Mutations arrive from two directions: the pointer controller (geometry,
//! display state, selection, z-order) and the stream side (status, logs,
//! result). All operations are synchronous. Operations on ids that are not
//! present are no-ops, never errors, with the single exception of `add`.

#[cfg(test)]
#[path = "registry_test.rs"]
mod registry_test;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::consts::{
    DEFAULT_WIDGET_HEIGHT, DEFAULT_WIDGET_WIDTH, GRID_COLUMNS, GRID_COLUMN_STRIDE, GRID_ORIGIN, GRID_ROW_STRIDE,
};
use crate::geometry::clamp_size;
use crate::viewport::{Point, Size};

/// Unique identifier for a widget.
pub type WidgetId = Uuid;

/// How much of a widget is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayState {
    /// Title bar and a one-line status only.
    Minimized,
    /// Summary card (default for new widgets).
    #[default]
    Compact,
    /// Full log view; the only state with resize handles.
    Expanded,
}

/// Lifecycle status of the task a widget is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusState {
    #[default]
    Idle,
    Running,
    Completed,
    Error,
    Paused,
}

impl StatusState {
    /// Whether no further progress is expected.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

/// Severity of a widget log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// One append-only log line shown in an expanded widget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: i64,
    pub level: LogLevel,
    pub message: String,
}

impl LogEntry {
    #[must_use]
    pub fn new(timestamp_ms: i64, level: LogLevel, message: impl Into<String>) -> Self {
        Self { timestamp_ms, level, message: message.into() }
    }
}

/// A single interactive panel on the canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Widget {
    /// Unique identifier for this widget.
    pub id: WidgetId,
    /// Display name shown in the header.
    pub title: String,
    /// Top-left corner in canvas coordinates.
    pub position: Point,
    /// Footprint in canvas units; never below the minimum.
    pub size: Size,
    /// Stacking order; higher values paint above lower ones.
    pub z_index: i64,
    pub display_state: DisplayState,
    /// Maintained by the registry; at most one widget has this set.
    pub selected: bool,
    pub status: StatusState,
    /// Ordered, append-only activity log.
    pub logs: Vec<LogEntry>,
    /// Backend task this widget follows, if any.
    pub linked_task_id: Option<String>,
    /// Result payload of the finished task.
    pub result: Option<serde_json::Value>,
}

impl Widget {
    /// A compact, idle widget with the default footprint.
    #[must_use]
    pub fn new(id: WidgetId, title: impl Into<String>, position: Point) -> Self {
        Self {
            id,
            title: title.into(),
            position,
            size: Size::new(DEFAULT_WIDGET_WIDTH, DEFAULT_WIDGET_HEIGHT),
            z_index: 0,
            display_state: DisplayState::Compact,
            selected: false,
            status: StatusState::Idle,
            logs: Vec::new(),
            linked_task_id: None,
            result: None,
        }
    }
}

/// Sparse update for a widget. Only present fields are applied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialWidget {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<Point>,
    /// Floored to the minimum footprint when applied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<Size>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub z_index: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_state: Option<DisplayState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<StatusState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linked_task_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
}

impl PartialWidget {
    #[must_use]
    pub fn position(position: Point) -> Self {
        Self { position: Some(position), ..Default::default() }
    }

    #[must_use]
    pub fn geometry(size: Size, position: Point) -> Self {
        Self { size: Some(size), position: Some(position), ..Default::default() }
    }

    #[must_use]
    pub fn status(status: StatusState) -> Self {
        Self { status: Some(status), ..Default::default() }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Error returned by [`WidgetRegistry::add`] and [`WidgetRegistry::load`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// A widget with this id is already registered.
    #[error("widget {0} already exists")]
    DuplicateId(WidgetId),
}

/// In-memory store of widgets, kept in insertion order.
#[derive(Debug, Clone, Default)]
pub struct WidgetRegistry {
    widgets: Vec<Widget>,
}

impl WidgetRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self { widgets: Vec::new() }
    }

    /// Register a new widget.
    ///
    /// The size is floored to the minimum footprint. A widget that arrives
    /// already selected takes the selection from any other widget.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateId`] if the id is already present.
    pub fn add(&mut self, mut widget: Widget) -> Result<(), RegistryError> {
        if self.contains(&widget.id) {
            return Err(RegistryError::DuplicateId(widget.id));
        }
        widget.size = clamp_size(widget.size);
        if widget.selected {
            for other in &mut self.widgets {
                other.selected = false;
            }
        }
        self.widgets.push(widget);
        Ok(())
    }

    /// Remove a widget by id, returning it if it was present.
    pub fn remove(&mut self, id: &WidgetId) -> Option<Widget> {
        let index = self.index_of(id)?;
        Some(self.widgets.remove(index))
    }

    /// Apply a partial update. Returns false if the widget doesn't exist.
    pub fn update(&mut self, id: &WidgetId, partial: &PartialWidget) -> bool {
        let Some(widget) = self.widgets.iter_mut().find(|w| w.id == *id) else {
            return false;
        };
        if let Some(title) = &partial.title {
            widget.title.clone_from(title);
        }
        if let Some(position) = partial.position {
            widget.position = position;
        }
        if let Some(size) = partial.size {
            widget.size = clamp_size(size);
        }
        if let Some(z) = partial.z_index {
            widget.z_index = z;
        }
        if let Some(state) = partial.display_state {
            widget.display_state = state;
        }
        if let Some(status) = partial.status {
            widget.status = status;
        }
        if let Some(task_id) = &partial.linked_task_id {
            widget.linked_task_id = Some(task_id.clone());
        }
        if let Some(result) = &partial.result {
            widget.result = Some(result.clone());
        }
        true
    }

    /// Returns false if the widget doesn't exist.
    pub fn set_display_state(&mut self, id: &WidgetId, state: DisplayState) -> bool {
        self.update(id, &PartialWidget { display_state: Some(state), ..Default::default() })
    }

    /// Append a log line. Returns false if the widget doesn't exist.
    pub fn append_log(&mut self, id: &WidgetId, entry: LogEntry) -> bool {
        let Some(widget) = self.widgets.iter_mut().find(|w| w.id == *id) else {
            return false;
        };
        widget.logs.push(entry);
        true
    }

    /// Select exactly one widget, or clear the selection with `None`.
    ///
    /// Selecting an unknown id leaves the current selection untouched.
    /// Returns true if the selection changed.
    pub fn select(&mut self, id: Option<WidgetId>) -> bool {
        if let Some(target) = id
            && !self.contains(&target)
        {
            return false;
        }
        let mut changed = false;
        for widget in &mut self.widgets {
            let want = Some(widget.id) == id;
            if widget.selected != want {
                widget.selected = want;
                changed = true;
            }
        }
        changed
    }

    /// Id of the selected widget, if any.
    #[must_use]
    pub fn selected(&self) -> Option<WidgetId> {
        self.widgets.iter().find(|w| w.selected).map(|w| w.id)
    }

    /// Raise a widget above every other widget.
    ///
    /// Assigns `max(existing z_index) + 1` and returns the new value, or
    /// `None` if the widget doesn't exist. When the top is already
    /// `i64::MAX`, z-indices are first renumbered `0..n` in paint order.
    pub fn bring_to_front(&mut self, id: &WidgetId) -> Option<i64> {
        let index = self.index_of(id)?;
        let mut top = self.top_z_index().unwrap_or(0);
        if top == i64::MAX {
            top = self.renumber_z();
        }
        let z = top + 1;
        self.widgets[index].z_index = z;
        Some(z)
    }

    /// Compact z-indices to `0..n`, keeping paint order. Returns the new top.
    fn renumber_z(&mut self) -> i64 {
        let mut order: Vec<usize> = (0..self.widgets.len()).collect();
        order.sort_by_key(|&i| self.widgets[i].z_index);
        let mut z = 0;
        for (rank, i) in (0_i64..).zip(order) {
            self.widgets[i].z_index = rank;
            z = rank;
        }
        z
    }

    /// Highest z-index currently in use.
    #[must_use]
    pub fn top_z_index(&self) -> Option<i64> {
        self.widgets.iter().map(|w| w.z_index).max()
    }

    /// Return a reference to a widget by id.
    #[must_use]
    pub fn get(&self, id: &WidgetId) -> Option<&Widget> {
        self.widgets.iter().find(|w| w.id == *id)
    }

    #[must_use]
    pub fn contains(&self, id: &WidgetId) -> bool {
        self.index_of(id).is_some()
    }

    /// All widgets in insertion order.
    #[must_use]
    pub fn list(&self) -> &[Widget] {
        &self.widgets
    }

    /// All widgets sorted for painting: by `z_index`, ties by insertion order.
    #[must_use]
    pub fn paint_order(&self) -> Vec<&Widget> {
        let mut ordered: Vec<&Widget> = self.widgets.iter().collect();
        ordered.sort_by_key(|w| w.z_index);
        ordered
    }

    /// Grid cell for the next widget, so new widgets never land exactly on top
    /// of each other.
    #[must_use]
    pub fn next_grid_position(&self) -> Point {
        grid_position(self.widgets.len())
    }

    /// Replace every widget with a restored snapshot.
    ///
    /// Sizes are floored, and only the first selected widget keeps its
    /// selection. On error the registry is left unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateId`] if the snapshot repeats an id.
    pub fn load(&mut self, widgets: Vec<Widget>) -> Result<(), RegistryError> {
        let mut fresh = Self::new();
        for mut widget in widgets {
            if widget.selected && fresh.selected().is_some() {
                widget.selected = false;
            }
            fresh.add(widget)?;
        }
        *self = fresh;
        Ok(())
    }

    /// Number of widgets currently registered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.widgets.len()
    }

    /// Returns `true` if the registry contains no widgets.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.widgets.is_empty()
    }

    fn index_of(&self, id: &WidgetId) -> Option<usize> {
        self.widgets.iter().position(|w| w.id == *id)
    }
}

/// Deterministic grid cell for the `n`th widget (zero-based).
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn grid_position(n: usize) -> Point {
    let column = n % GRID_COLUMNS;
    let row = n / GRID_COLUMNS;
    Point {
        x: GRID_ORIGIN + column as f64 * GRID_COLUMN_STRIDE,
        y: GRID_ORIGIN + row as f64 * GRID_ROW_STRIDE,
    }
}
