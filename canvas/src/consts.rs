//! Shared numeric constants for the canvas crate.

// ── Viewport ────────────────────────────────────────────────────

/// Smallest allowed zoom factor.
pub const MIN_SCALE: f64 = 0.1;

/// Largest allowed zoom factor.
pub const MAX_SCALE: f64 = 3.0;

/// Zoom change applied per wheel tick or toolbar click.
pub const ZOOM_STEP: f64 = 0.1;

// ── Widget footprint ────────────────────────────────────────────

/// Minimum usable widget width in canvas units.
pub const MIN_WIDGET_WIDTH: f64 = 200.0;

/// Minimum usable widget height in canvas units.
pub const MIN_WIDGET_HEIGHT: f64 = 100.0;

/// Width given to a freshly created widget.
pub const DEFAULT_WIDGET_WIDTH: f64 = 320.0;

/// Height given to a freshly created widget.
pub const DEFAULT_WIDGET_HEIGHT: f64 = 200.0;

// ── Grid placement ──────────────────────────────────────────────

/// Canvas-space x/y of the first grid cell.
pub const GRID_ORIGIN: f64 = 100.0;

/// Horizontal distance between grid columns.
pub const GRID_COLUMN_STRIDE: f64 = 350.0;

/// Vertical distance between grid rows.
pub const GRID_ROW_STRIDE: f64 = 220.0;

/// Widgets per grid row before wrapping.
pub const GRID_COLUMNS: usize = 4;

// ── Hit-testing ─────────────────────────────────────────────────

/// Screen-space hit slop in pixels for resize handles.
pub const HANDLE_RADIUS_PX: f64 = 8.0;

/// Height of the widget title bar; also the full height of a minimized widget.
pub const HEADER_HEIGHT: f64 = 40.0;

/// Width of the button strip at the right end of the title bar.
pub const HEADER_CONTROLS_WIDTH: f64 = 96.0;
