//! Pointer-interaction controller.
//!
//! `EngineCore` turns host pointer, wheel and frame callbacks into registry
//! and viewport mutations, returning [`Action`]s that tell the host what to
//! render or persist. It holds no browser handles, so every path is testable
//! natively.
//!
//! DESIGN
//! ======
//! Gestures are keyed by `PointerId`, so a drag on one widget and a resize on
//! another can run at the same time. A widget is the subject of at most one
//! gesture; a second press on a busy widget is ignored.
//!
//! Pointer moves only record the newest position and request a frame. The
//! frame callback applies each dirty gesture once, computing its effect from
//! the press point, so the number of coalesced moves never changes the
//! outcome. Release always applies the final pointer position.
//!
//! Drags are render-only until release (see [`EngineCore::live_offset`]).
//! Resizes commit to the registry every frame.
//!
//! ERROR HANDLING
//! ==============
//! A gesture whose widget disappears (closed mid-drag) is dropped at its next
//! commit. Nothing here returns an error or panics.

#[cfg(test)]
#[path = "engine_test.rs"]
mod engine_test;

use std::collections::BTreeMap;

use uuid::Uuid;

use crate::geometry::{ResizeHandle, apply_delta, resize_from_handle};
use crate::hit::hit_test;
use crate::input::{Button, Gesture, Modifiers, PointerEvent, PointerId, Target, WheelDelta, WidgetPart};
use crate::registry::{DisplayState, PartialWidget, RegistryError, Widget, WidgetId, WidgetRegistry};
use crate::viewport::{Point, Viewport};

const CURSOR_DEFAULT: &str = "default";
const CURSOR_GRABBING: &str = "grabbing";

/// Effects returned from input handlers for the host to process.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    WidgetRemoved { id: WidgetId },
    /// Committed registry change.
    WidgetUpdated { id: WidgetId, fields: PartialWidget },
    WidgetRaised { id: WidgetId, z_index: i64 },
    SelectionChanged(Option<WidgetId>),
    ViewportChanged(Viewport),
    /// Schedule one call to [`EngineCore::on_animation_frame`].
    FrameRequested,
    RenderNeeded,
    SetCursor(&'static str),
}

impl Action {
    /// Whether the host should schedule a snapshot after this action.
    #[must_use]
    pub fn persists(&self) -> bool {
        !matches!(self, Self::FrameRequested | Self::RenderNeeded | Self::SetCursor(_))
    }
}

/// Core engine state: the registry, the viewport, and live gestures.
#[derive(Debug, Default)]
pub struct EngineCore {
    pub registry: WidgetRegistry,
    pub viewport: Viewport,
    gestures: BTreeMap<PointerId, Gesture>,
    frame_pending: bool,
}

impl EngineCore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // --- Widgets ---

    /// Create a compact widget at the next grid cell, on top of everything.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateId`] if the generated id collides.
    pub fn create_widget(&mut self, title: &str) -> Result<WidgetId, RegistryError> {
        let mut widget = Widget::new(Uuid::new_v4(), title, self.registry.next_grid_position());
        widget.z_index = self.registry.top_z_index().map_or(0, |z| z.saturating_add(1));
        let id = widget.id;
        self.registry.add(widget)?;
        Ok(id)
    }

    /// Remove a widget and abandon any gesture on it.
    pub fn close_widget(&mut self, id: &WidgetId) -> Vec<Action> {
        let was_selected = self.registry.selected() == Some(*id);
        if self.registry.remove(id).is_none() {
            return Vec::new();
        }
        self.gestures.retain(|_, g| g.widget_id() != Some(*id));

        let mut actions = vec![Action::WidgetRemoved { id: *id }];
        if was_selected {
            actions.push(Action::SelectionChanged(None));
        }
        actions.push(Action::RenderNeeded);
        actions
    }

    /// Replace the registry and viewport from a restored snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateId`] if `widgets` repeats an id; the
    /// current state is kept.
    pub fn load(&mut self, widgets: Vec<Widget>, viewport: Viewport) -> Result<(), RegistryError> {
        self.registry.load(widgets)?;
        self.viewport = viewport;
        self.gestures.clear();
        self.frame_pending = false;
        Ok(())
    }

    /// Hit-test a screen point against the current registry and viewport.
    #[must_use]
    pub fn target_at(&self, screen: Point) -> Target {
        hit_test(screen, &self.registry, &self.viewport)
    }

    // --- Pointer events ---

    pub fn on_pointer_down(&mut self, event: PointerEvent) -> Vec<Action> {
        if self.gestures.contains_key(&event.pointer) {
            return Vec::new();
        }

        match (event.button, event.target) {
            (Button::Middle, Target::Background) => self.begin_pan(event.pointer, event.screen),
            (Button::Primary, Target::Background) if event.modifiers.pan() => {
                self.begin_pan(event.pointer, event.screen)
            }
            (Button::Primary, Target::Background) => {
                self.gestures
                    .insert(event.pointer, Gesture::BackgroundPress { start: event.screen, moved: false });
                Vec::new()
            }
            (Button::Primary, Target::Widget { id, part: WidgetPart::Body }) => {
                self.begin_drag(event.pointer, id, event.screen)
            }
            (Button::Primary, Target::Widget { id, part: WidgetPart::ResizeHandle(handle) }) => {
                self.begin_resize(event.pointer, id, handle, event.screen)
            }
            _ => Vec::new(),
        }
    }

    /// Record the pointer's newest position. Work happens in the next frame.
    pub fn on_pointer_move(&mut self, pointer: PointerId, screen: Point) -> Vec<Action> {
        let Some(gesture) = self.gestures.get_mut(&pointer) else {
            return Vec::new();
        };
        if gesture.track(screen) && !self.frame_pending {
            self.frame_pending = true;
            return vec![Action::FrameRequested];
        }
        Vec::new()
    }

    /// Apply at most one update per dirty gesture.
    pub fn on_animation_frame(&mut self) -> Vec<Action> {
        self.frame_pending = false;
        let mut actions = Vec::new();
        let mut lost = Vec::new();
        let mut render = false;

        for (pointer, gesture) in &mut self.gestures {
            match gesture {
                Gesture::Dragging { start, latest, offset, dirty, .. } if *dirty => {
                    let (dx, dy) = self.viewport.screen_delta_to_canvas(latest.x - start.x, latest.y - start.y);
                    *offset = Point::new(dx, dy);
                    *dirty = false;
                    render = true;
                }
                Gesture::Resizing { id, handle, start, latest, start_size, start_position, dirty } if *dirty => {
                    let (dx, dy) = self.viewport.screen_delta_to_canvas(latest.x - start.x, latest.y - start.y);
                    let (size, position) = resize_from_handle(*handle, *start_size, *start_position, dx, dy);
                    let fields = PartialWidget::geometry(size, position);
                    if self.registry.update(id, &fields) {
                        actions.push(Action::WidgetUpdated { id: *id, fields });
                        render = true;
                    } else {
                        lost.push(*pointer);
                    }
                    *dirty = false;
                }
                Gesture::Panning { last, latest, dirty } if *dirty => {
                    self.viewport.pan_by(latest.x - last.x, latest.y - last.y);
                    *last = *latest;
                    *dirty = false;
                    actions.push(Action::ViewportChanged(self.viewport));
                    render = true;
                }
                _ => {}
            }
        }

        for pointer in lost {
            self.gestures.remove(&pointer);
        }
        if render {
            actions.push(Action::RenderNeeded);
        }
        actions
    }

    /// Finish the pointer's gesture using the release point.
    pub fn on_pointer_up(&mut self, pointer: PointerId, screen: Point) -> Vec<Action> {
        let Some(gesture) = self.gestures.remove(&pointer) else {
            return Vec::new();
        };

        let mut actions = Vec::new();
        match gesture {
            Gesture::Dragging { id, start, .. } => {
                let (dx, dy) = self.viewport.screen_delta_to_canvas(screen.x - start.x, screen.y - start.y);
                if (dx != 0.0 || dy != 0.0)
                    && let Some(widget) = self.registry.get(&id)
                {
                    let fields = PartialWidget::position(apply_delta(widget.position, dx, dy));
                    self.registry.update(&id, &fields);
                    actions.push(Action::WidgetUpdated { id, fields });
                }
                actions.push(Action::SetCursor(CURSOR_DEFAULT));
                actions.push(Action::RenderNeeded);
            }
            Gesture::Resizing { id, handle, start, start_size, start_position, .. } => {
                let (dx, dy) = self.viewport.screen_delta_to_canvas(screen.x - start.x, screen.y - start.y);
                let (size, position) = resize_from_handle(handle, start_size, start_position, dx, dy);
                let fields = PartialWidget::geometry(size, position);
                if self.registry.update(&id, &fields) {
                    actions.push(Action::WidgetUpdated { id, fields });
                }
                actions.push(Action::SetCursor(CURSOR_DEFAULT));
                actions.push(Action::RenderNeeded);
            }
            Gesture::Panning { last, .. } => {
                let (dx, dy) = (screen.x - last.x, screen.y - last.y);
                if dx != 0.0 || dy != 0.0 {
                    self.viewport.pan_by(dx, dy);
                    actions.push(Action::ViewportChanged(self.viewport));
                }
                actions.push(Action::SetCursor(CURSOR_DEFAULT));
                actions.push(Action::RenderNeeded);
            }
            Gesture::BackgroundPress { start, moved } => {
                if !moved && screen == start && self.registry.select(None) {
                    actions.push(Action::SelectionChanged(None));
                    actions.push(Action::RenderNeeded);
                }
            }
        }
        actions
    }

    /// Abandon one pointer's gesture without committing a pending drag.
    pub fn on_pointer_cancel(&mut self, pointer: PointerId) -> Vec<Action> {
        match self.gestures.remove(&pointer) {
            Some(Gesture::BackgroundPress { .. }) | None => Vec::new(),
            Some(_) => vec![Action::SetCursor(CURSOR_DEFAULT), Action::RenderNeeded],
        }
    }

    /// Abandon every gesture (window blur). Live drag offsets are discarded.
    pub fn cancel_gestures(&mut self) -> Vec<Action> {
        let had_visible = self.gestures.values().any(|g| !matches!(g, Gesture::BackgroundPress { .. }));
        self.gestures.clear();
        self.frame_pending = false;
        if had_visible {
            vec![Action::SetCursor(CURSOR_DEFAULT), Action::RenderNeeded]
        } else {
            Vec::new()
        }
    }

    // --- Wheel / double-click ---

    /// Ctrl/Cmd + wheel zooms one step per tick; a plain wheel over the
    /// background pans.
    pub fn on_wheel(&mut self, delta: WheelDelta, modifiers: Modifiers, target: Target) -> Vec<Action> {
        if modifiers.zoom() {
            if delta.dy == 0.0 {
                return Vec::new();
            }
            let steps = if delta.dy > 0.0 { -1.0 } else { 1.0 };
            return self.zoom_by(steps);
        }
        if target != Target::Background || delta.is_zero() {
            return Vec::new();
        }
        self.viewport.pan_by(-delta.dx, -delta.dy);
        vec![Action::ViewportChanged(self.viewport), Action::RenderNeeded]
    }

    /// Toggle a widget between compact and expanded. Minimized is left alone.
    pub fn on_double_click(&mut self, target: Target) -> Vec<Action> {
        let Target::Widget { id, part: WidgetPart::Body } = target else {
            return Vec::new();
        };
        let Some(widget) = self.registry.get(&id) else {
            return Vec::new();
        };
        let next = match widget.display_state {
            DisplayState::Compact => DisplayState::Expanded,
            DisplayState::Expanded => DisplayState::Compact,
            DisplayState::Minimized => return Vec::new(),
        };
        self.registry.set_display_state(&id, next);
        vec![
            Action::WidgetUpdated { id, fields: PartialWidget { display_state: Some(next), ..Default::default() } },
            Action::RenderNeeded,
        ]
    }

    // --- Toolbar ---

    pub fn zoom_in(&mut self) -> Vec<Action> {
        self.zoom_by(1.0)
    }

    pub fn zoom_out(&mut self) -> Vec<Action> {
        self.zoom_by(-1.0)
    }

    /// Back to `scale = 1`, `pan = (0, 0)`.
    pub fn reset_view(&mut self) -> Vec<Action> {
        self.viewport.reset();
        vec![Action::ViewportChanged(self.viewport), Action::RenderNeeded]
    }

    // --- Queries ---

    /// Canvas-space offset of an in-flight drag, for rendering only.
    #[must_use]
    pub fn live_offset(&self, id: &WidgetId) -> Option<Point> {
        self.gestures.values().find_map(|g| match g {
            Gesture::Dragging { id: dragged, offset, .. } if dragged == id => Some(*offset),
            _ => None,
        })
    }

    /// Where the renderer should draw a widget: committed position plus any
    /// live drag offset.
    #[must_use]
    pub fn render_position(&self, id: &WidgetId) -> Option<Point> {
        let widget = self.registry.get(id)?;
        Some(match self.live_offset(id) {
            Some(offset) => apply_delta(widget.position, offset.x, offset.y),
            None => widget.position,
        })
    }

    #[must_use]
    pub fn gesture(&self, pointer: PointerId) -> Option<&Gesture> {
        self.gestures.get(&pointer)
    }

    /// Whether a gesture currently targets this widget.
    #[must_use]
    pub fn is_busy(&self, id: &WidgetId) -> bool {
        self.gestures.values().any(|g| g.widget_id() == Some(*id))
    }

    #[must_use]
    pub fn selection(&self) -> Option<WidgetId> {
        self.registry.selected()
    }

    // --- Internals ---

    fn zoom_by(&mut self, steps: f64) -> Vec<Action> {
        if self.viewport.zoom_by_steps(steps) {
            vec![Action::ViewportChanged(self.viewport), Action::RenderNeeded]
        } else {
            Vec::new()
        }
    }

    fn begin_pan(&mut self, pointer: PointerId, screen: Point) -> Vec<Action> {
        self.gestures
            .insert(pointer, Gesture::Panning { last: screen, latest: screen, dirty: false });
        vec![Action::SetCursor(CURSOR_GRABBING)]
    }

    fn begin_drag(&mut self, pointer: PointerId, id: WidgetId, screen: Point) -> Vec<Action> {
        if !self.registry.contains(&id) || self.is_busy(&id) {
            return Vec::new();
        }
        let mut actions = Vec::new();
        if self.registry.select(Some(id)) {
            actions.push(Action::SelectionChanged(Some(id)));
        }
        if let Some(z_index) = self.registry.bring_to_front(&id) {
            actions.push(Action::WidgetRaised { id, z_index });
        }
        self.gestures.insert(
            pointer,
            Gesture::Dragging { id, start: screen, latest: screen, offset: Point::default(), dirty: false },
        );
        actions.push(Action::SetCursor(CURSOR_GRABBING));
        actions.push(Action::RenderNeeded);
        actions
    }

    fn begin_resize(
        &mut self,
        pointer: PointerId,
        id: WidgetId,
        handle: ResizeHandle,
        screen: Point,
    ) -> Vec<Action> {
        let Some(widget) = self.registry.get(&id) else {
            return Vec::new();
        };
        if widget.display_state != DisplayState::Expanded || self.is_busy(&id) {
            return Vec::new();
        }
        let (start_size, start_position) = (widget.size, widget.position);

        let mut actions = Vec::new();
        if let Some(z_index) = self.registry.bring_to_front(&id) {
            actions.push(Action::WidgetRaised { id, z_index });
        }
        self.gestures.insert(
            pointer,
            Gesture::Resizing { id, handle, start: screen, latest: screen, start_size, start_position, dirty: false },
        );
        actions.push(Action::SetCursor(handle.cursor()));
        actions.push(Action::RenderNeeded);
        actions
    }
}
