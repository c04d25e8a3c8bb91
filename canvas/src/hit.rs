#[cfg(test)]
#[path = "hit_test.rs"]
mod hit_test;

use crate::consts::{HANDLE_RADIUS_PX, HEADER_CONTROLS_WIDTH, HEADER_HEIGHT};
use crate::geometry::ResizeHandle;
use crate::input::{Target, WidgetPart};
use crate::registry::{DisplayState, Widget, WidgetRegistry};
use crate::viewport::{Point, Viewport};

/// Resolve what lies under `screen_pt`, topmost widget first.
///
/// Resize handles are only reported for expanded widgets and extend
/// `HANDLE_RADIUS_PX` screen pixels beyond the widget edge. Minimized widgets
/// are only as tall as their title bar.
#[must_use]
pub fn hit_test(screen_pt: Point, registry: &WidgetRegistry, viewport: &Viewport) -> Target {
    let p = viewport.screen_to_canvas(screen_pt);
    let slop = HANDLE_RADIUS_PX / viewport.scale();

    for widget in registry.paint_order().into_iter().rev() {
        if let Some(part) = hit_widget(p, widget, slop) {
            return Target::Widget { id: widget.id, part };
        }
    }
    Target::Background
}

fn hit_widget(p: Point, widget: &Widget, slop: f64) -> Option<WidgetPart> {
    let left = widget.position.x;
    let top = widget.position.y;
    let right = left + widget.size.width;
    let height = match widget.display_state {
        DisplayState::Minimized => HEADER_HEIGHT.min(widget.size.height),
        DisplayState::Compact | DisplayState::Expanded => widget.size.height,
    };
    let bottom = top + height;

    if widget.display_state == DisplayState::Expanded
        && let Some(handle) = handle_at(p, left, top, right, bottom, slop)
    {
        return Some(WidgetPart::ResizeHandle(handle));
    }

    if p.x < left || p.x > right || p.y < top || p.y > bottom {
        return None;
    }
    if p.y <= top + HEADER_HEIGHT && p.x >= right - HEADER_CONTROLS_WIDTH {
        return Some(WidgetPart::Control);
    }
    Some(WidgetPart::Body)
}

fn handle_at(p: Point, left: f64, top: f64, right: f64, bottom: f64, slop: f64) -> Option<ResizeHandle> {
    if p.x < left - slop || p.x > right + slop || p.y < top - slop || p.y > bottom + slop {
        return None;
    }
    let north = (p.y - top).abs() <= slop;
    let south = !north && (p.y - bottom).abs() <= slop;
    let west = (p.x - left).abs() <= slop;
    let east = !west && (p.x - right).abs() <= slop;

    match (north, south, east, west) {
        (true, _, true, _) => Some(ResizeHandle::Ne),
        (true, _, _, true) => Some(ResizeHandle::Nw),
        (true, ..) => Some(ResizeHandle::N),
        (_, true, true, _) => Some(ResizeHandle::Se),
        (_, true, _, true) => Some(ResizeHandle::Sw),
        (_, true, ..) => Some(ResizeHandle::S),
        (_, _, true, _) => Some(ResizeHandle::E),
        (_, _, _, true) => Some(ResizeHandle::W),
        _ => None,
    }
}
