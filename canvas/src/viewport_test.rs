#![allow(clippy::float_cmp)]

use super::*;

const EPSILON: f64 = 1e-10;

fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() < EPSILON
}

fn point_approx_eq(a: Point, b: Point) -> bool {
    approx_eq(a.x, b.x) && approx_eq(a.y, b.y)
}

// --- clamp_scale ---

#[test]
fn clamp_scale_passes_in_range_values() {
    assert_eq!(clamp_scale(1.0), 1.0);
    assert_eq!(clamp_scale(0.1), 0.1);
    assert_eq!(clamp_scale(3.0), 3.0);
}

#[test]
fn clamp_scale_floors_and_ceils() {
    assert_eq!(clamp_scale(0.0), 0.1);
    assert_eq!(clamp_scale(-5.0), 0.1);
    assert_eq!(clamp_scale(3.5), 3.0);
    assert_eq!(clamp_scale(f64::INFINITY), 3.0);
    assert_eq!(clamp_scale(f64::NEG_INFINITY), 0.1);
}

#[test]
fn clamp_scale_nan_is_identity_zoom() {
    assert_eq!(clamp_scale(f64::NAN), 1.0);
}

#[test]
fn clamp_scale_is_idempotent_and_in_range() {
    let mut x = -4.0;
    while x <= 6.0 {
        let once = clamp_scale(x);
        assert_eq!(clamp_scale(once), once);
        assert!((0.1..=3.0).contains(&once));
        x += 0.037;
    }
}

// --- Viewport defaults ---

#[test]
fn viewport_default_is_identity() {
    let vp = Viewport::default();
    assert_eq!(vp.pan, Point::new(0.0, 0.0));
    assert_eq!(vp.scale(), 1.0);
}

#[test]
fn viewport_new_clamps_scale() {
    assert_eq!(Viewport::new(Point::default(), 9.0).scale(), 3.0);
    assert_eq!(Viewport::new(Point::default(), 0.01).scale(), 0.1);
}

// --- Zoom / pan ---

#[test]
fn zoom_by_steps_moves_by_zoom_step() {
    let mut vp = Viewport::default();
    assert!(vp.zoom_by_steps(1.0));
    assert!(approx_eq(vp.scale(), 1.1));
    assert!(vp.zoom_by_steps(-2.0));
    assert!(approx_eq(vp.scale(), 0.9));
}

#[test]
fn zoom_by_steps_reports_no_change_at_limit() {
    let mut vp = Viewport::new(Point::default(), 3.0);
    assert!(!vp.zoom_by_steps(1.0));
    assert_eq!(vp.scale(), 3.0);
}

#[test]
fn pan_by_accumulates() {
    let mut vp = Viewport::default();
    vp.pan_by(10.0, -4.0);
    vp.pan_by(5.0, 4.0);
    assert_eq!(vp.pan, Point::new(15.0, 0.0));
}

#[test]
fn reset_restores_identity() {
    let mut vp = Viewport::new(Point::new(40.0, 80.0), 2.5);
    vp.reset();
    assert_eq!(vp, Viewport::default());
}

// --- Coordinate conversion ---

#[test]
fn screen_to_canvas_identity() {
    let vp = Viewport::default();
    let p = vp.screen_to_canvas(Point::new(12.0, 34.0));
    assert!(point_approx_eq(p, Point::new(12.0, 34.0)));
}

#[test]
fn screen_to_canvas_applies_pan_then_scale() {
    let vp = Viewport::new(Point::new(100.0, 50.0), 2.0);
    let p = vp.screen_to_canvas(Point::new(300.0, 150.0));
    assert!(point_approx_eq(p, Point::new(100.0, 50.0)));
}

#[test]
fn canvas_to_screen_inverts_screen_to_canvas() {
    let vp = Viewport::new(Point::new(-37.5, 12.25), 0.7);
    let screen = Point::new(421.0, -88.0);
    let back = vp.canvas_to_screen(vp.screen_to_canvas(screen));
    assert!(point_approx_eq(back, screen));
}

#[test]
fn screen_delta_to_canvas_divides_by_scale() {
    let vp = Viewport::new(Point::new(999.0, 999.0), 2.0);
    assert_eq!(vp.screen_delta_to_canvas(10.0, -6.0), (5.0, -3.0));
}

// --- Serde ---

#[test]
fn viewport_serde_roundtrip() {
    let vp = Viewport::new(Point::new(3.5, -2.0), 1.7);
    let json = serde_json::to_string(&vp).unwrap();
    let back: Viewport = serde_json::from_str(&json).unwrap();
    assert_eq!(back, vp);
}

#[test]
fn viewport_deserialize_clamps_out_of_range_scale() {
    let back: Viewport = serde_json::from_str(r#"{"pan":{"x":0.0,"y":0.0},"scale":12.0}"#).unwrap();
    assert_eq!(back.scale(), 3.0);
}
