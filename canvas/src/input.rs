//! Input model: pointers, buttons, modifier keys, hit targets, and the
//! per-pointer gesture state machine.
//!
//! A gesture begins on pointer-down and ends on pointer-up or cancel. Each
//! active `Gesture` carries the context needed to compute its effect from the
//! press point, so coalescing intermediate moves never changes the result.

#[cfg(test)]
#[path = "input_test.rs"]
mod input_test;

use crate::geometry::ResizeHandle;
use crate::registry::WidgetId;
use crate::viewport::{Point, Size};

/// Identifies one pointer (mouse, pen, or touch contact) across its events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PointerId(pub i64);

/// Keyboard modifier keys held during an event.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, Copy, Default)]
pub struct Modifiers {
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
    /// Meta / Command key.
    pub meta: bool,
    /// Space bar held (hand tool).
    pub space: bool,
}

impl Modifiers {
    /// Ctrl or Cmd: turns the wheel into zoom.
    #[must_use]
    pub fn zoom(self) -> bool {
        self.ctrl || self.meta
    }

    /// Shift or space: turns a primary press on the background into a pan.
    #[must_use]
    pub fn pan(self) -> bool {
        self.shift || self.space
    }
}

/// Mouse button identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Button {
    /// Left mouse button (or single-finger tap).
    Primary,
    /// Middle mouse button (scroll wheel click).
    Middle,
    /// Right mouse button (or two-finger tap).
    Secondary,
}

/// Wheel / trackpad scroll delta in screen pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WheelDelta {
    pub dx: f64,
    /// Positive = down.
    pub dy: f64,
}

impl WheelDelta {
    #[must_use]
    pub fn is_zero(self) -> bool {
        self.dx == 0.0 && self.dy == 0.0
    }
}

/// Which region of a widget is under the pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidgetPart {
    /// Draggable surface.
    Body,
    /// Header buttons, inputs and other interactive children; never starts a drag.
    Control,
    ResizeHandle(ResizeHandle),
}

/// What a pointer event landed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Background,
    Widget { id: WidgetId, part: WidgetPart },
}

impl Target {
    #[must_use]
    pub fn widget_id(self) -> Option<WidgetId> {
        match self {
            Self::Background => None,
            Self::Widget { id, .. } => Some(id),
        }
    }
}

/// A pointer-down as delivered by the host.
#[derive(Debug, Clone, Copy)]
pub struct PointerEvent {
    pub pointer: PointerId,
    /// Screen-space position in CSS pixels.
    pub screen: Point,
    pub button: Button,
    pub modifiers: Modifiers,
    pub target: Target,
}

/// An in-progress gesture owned by one pointer.
///
/// `latest` is the most recent pointer position seen by `on_pointer_move`;
/// `dirty` is set when it has not yet been applied by an animation frame.
#[derive(Debug, Clone)]
pub enum Gesture {
    /// Moving a widget. The offset is render-only until release.
    Dragging {
        id: WidgetId,
        start: Point,
        latest: Point,
        /// Canvas-space offset shown by the renderer.
        offset: Point,
        dirty: bool,
    },
    /// Resizing an expanded widget; geometry is committed every frame.
    Resizing {
        id: WidgetId,
        handle: ResizeHandle,
        start: Point,
        latest: Point,
        start_size: Size,
        start_position: Point,
        dirty: bool,
    },
    /// Panning the viewport.
    Panning { last: Point, latest: Point, dirty: bool },
    /// Primary press on the background; a click clears the selection.
    BackgroundPress { start: Point, moved: bool },
}

impl Gesture {
    /// Widget this gesture acts on, if any.
    #[must_use]
    pub fn widget_id(&self) -> Option<WidgetId> {
        match self {
            Self::Dragging { id, .. } | Self::Resizing { id, .. } => Some(*id),
            Self::Panning { .. } | Self::BackgroundPress { .. } => None,
        }
    }

    /// Record the newest pointer position. Returns true if a frame is now needed.
    pub fn track(&mut self, screen: Point) -> bool {
        match self {
            Self::Dragging { latest, dirty, .. }
            | Self::Resizing { latest, dirty, .. }
            | Self::Panning { latest, dirty, .. } => {
                *latest = screen;
                *dirty = true;
                true
            }
            Self::BackgroundPress { start, moved } => {
                if screen != *start {
                    *moved = true;
                }
                false
            }
        }
    }
}
