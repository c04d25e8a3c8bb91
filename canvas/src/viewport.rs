#[cfg(test)]
#[path = "viewport_test.rs"]
mod viewport_test;

use serde::{Deserialize, Serialize};

use crate::consts::{MAX_SCALE, MIN_SCALE, ZOOM_STEP};

/// A point in either screen or canvas space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Width and height of a widget in canvas units.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    #[must_use]
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// Clamp a zoom factor into `[MIN_SCALE, MAX_SCALE]`.
///
/// NaN maps to `1.0` so a bad wheel delta can never poison the viewport.
#[must_use]
pub fn clamp_scale(scale: f64) -> f64 {
    if scale.is_nan() {
        return 1.0;
    }
    scale.clamp(MIN_SCALE, MAX_SCALE)
}

/// Global pan/zoom transform applied to every widget when rendering.
///
/// `pan` is in screen pixels and unbounded (infinite canvas).
/// `scale` is a zoom factor, always within `[MIN_SCALE, MAX_SCALE]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub pan: Point,
    #[serde(deserialize_with = "deserialize_scale")]
    scale: f64,
}

fn deserialize_scale<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    f64::deserialize(deserializer).map(clamp_scale)
}

impl Default for Viewport {
    fn default() -> Self {
        Self { pan: Point::default(), scale: 1.0 }
    }
}

impl Viewport {
    /// Build a viewport, clamping `scale` into range.
    #[must_use]
    pub fn new(pan: Point, scale: f64) -> Self {
        Self { pan, scale: clamp_scale(scale) }
    }

    #[must_use]
    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn set_scale(&mut self, scale: f64) {
        self.scale = clamp_scale(scale);
    }

    /// Step the zoom by `steps * ZOOM_STEP`, clamped. Returns true if the scale changed.
    pub fn zoom_by_steps(&mut self, steps: f64) -> bool {
        let before = self.scale;
        self.set_scale(self.scale + steps * ZOOM_STEP);
        (self.scale - before).abs() > f64::EPSILON
    }

    /// Translate the pan by a screen-space delta.
    pub fn pan_by(&mut self, dx: f64, dy: f64) {
        self.pan.x += dx;
        self.pan.y += dy;
    }

    /// Back to `scale = 1`, `pan = (0, 0)`.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Convert a screen-space point to canvas coordinates.
    #[must_use]
    pub fn screen_to_canvas(&self, screen: Point) -> Point {
        Point {
            x: (screen.x - self.pan.x) / self.scale,
            y: (screen.y - self.pan.y) / self.scale,
        }
    }

    /// Convert a canvas-space point to screen coordinates.
    #[must_use]
    pub fn canvas_to_screen(&self, canvas: Point) -> Point {
        Point {
            x: canvas.x * self.scale + self.pan.x,
            y: canvas.y * self.scale + self.pan.y,
        }
    }

    /// Convert a screen-space distance (pixels) to canvas units.
    #[must_use]
    pub fn screen_delta_to_canvas(&self, dx: f64, dy: f64) -> (f64, f64) {
        (dx / self.scale, dy / self.scale)
    }
}
