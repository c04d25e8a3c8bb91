//! Pure geometry for widget moves and resizes.
//!
//! Nothing here touches the registry; the controller feeds the results back
//! through [`crate::registry::WidgetRegistry::update`].

#[cfg(test)]
#[path = "geometry_test.rs"]
mod geometry_test;

use serde::{Deserialize, Serialize};

use crate::consts::{MIN_WIDGET_HEIGHT, MIN_WIDGET_WIDTH};
use crate::viewport::{Point, Size};

/// One of the eight resize handles on an expanded widget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResizeHandle {
    N,
    Ne,
    E,
    Se,
    S,
    Sw,
    W,
    Nw,
}

impl ResizeHandle {
    /// All handles, clockwise from north.
    pub const ALL: [Self; 8] = [Self::N, Self::Ne, Self::E, Self::Se, Self::S, Self::Sw, Self::W, Self::Nw];

    /// Parse a handle name such as `"se"`.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "n" => Some(Self::N),
            "ne" => Some(Self::Ne),
            "e" => Some(Self::E),
            "se" => Some(Self::Se),
            "s" => Some(Self::S),
            "sw" => Some(Self::Sw),
            "w" => Some(Self::W),
            "nw" => Some(Self::Nw),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::N => "n",
            Self::Ne => "ne",
            Self::E => "e",
            Self::Se => "se",
            Self::S => "s",
            Self::Sw => "sw",
            Self::W => "w",
            Self::Nw => "nw",
        }
    }

    #[must_use]
    pub fn moves_north(self) -> bool {
        matches!(self, Self::N | Self::Ne | Self::Nw)
    }

    #[must_use]
    pub fn moves_south(self) -> bool {
        matches!(self, Self::S | Self::Se | Self::Sw)
    }

    #[must_use]
    pub fn moves_east(self) -> bool {
        matches!(self, Self::E | Self::Ne | Self::Se)
    }

    #[must_use]
    pub fn moves_west(self) -> bool {
        matches!(self, Self::W | Self::Nw | Self::Sw)
    }

    /// CSS cursor name shown while hovering or dragging this handle.
    #[must_use]
    pub fn cursor(self) -> &'static str {
        match self {
            Self::N | Self::S => "ns-resize",
            Self::E | Self::W => "ew-resize",
            Self::Ne | Self::Sw => "nesw-resize",
            Self::Nw | Self::Se => "nwse-resize",
        }
    }
}

/// Translate a position by a canvas-space delta.
#[must_use]
pub fn apply_delta(position: Point, dx: f64, dy: f64) -> Point {
    Point { x: position.x + dx, y: position.y + dy }
}

/// Resize a widget from `handle` by a canvas-space pointer delta.
///
/// Width and height are floored to the minimum footprint before the position
/// shift is derived, so the edge opposite the dragged handle never moves.
#[must_use]
pub fn resize_from_handle(handle: ResizeHandle, size: Size, position: Point, dx: f64, dy: f64) -> (Size, Point) {
    let mut out_size = size;
    let mut out_pos = position;

    if handle.moves_east() {
        out_size.width = (size.width + dx).max(MIN_WIDGET_WIDTH);
    }
    if handle.moves_west() {
        out_size.width = (size.width - dx).max(MIN_WIDGET_WIDTH);
        out_pos.x = position.x + (size.width - out_size.width);
    }
    if handle.moves_south() {
        out_size.height = (size.height + dy).max(MIN_WIDGET_HEIGHT);
    }
    if handle.moves_north() {
        out_size.height = (size.height - dy).max(MIN_WIDGET_HEIGHT);
        out_pos.y = position.y + (size.height - out_size.height);
    }

    (out_size, out_pos)
}

/// Floor a size to the minimum widget footprint.
#[must_use]
pub fn clamp_size(size: Size) -> Size {
    Size {
        width: size.width.max(MIN_WIDGET_WIDTH),
        height: size.height.max(MIN_WIDGET_HEIGHT),
    }
}
