//! Canvas geometry, widget registry and pointer-interaction engine for the
//! agent desk.
//!
//! The crate is pure: no I/O, no logging, no clocks. The host feeds it pointer,
//! wheel and animation-frame callbacks and applies the returned
//! [`engine::Action`]s (render, persist, cursor changes).
//!
//! ## Module layout
//!
//! | Module | Role |
//! |--------|------|
//! | [`engine`] | [`engine::EngineCore`]: gestures, coalescing, zoom/pan |
//! | [`registry`] | Widget model and the insertion-ordered widget store |
//! | [`viewport`] | Pan/zoom transform and coordinate conversions |
//! | [`geometry`] | Move and resize math, resize handles |
//! | [`input`] | Pointer, modifier and gesture types |
//! | [`hit`] | Hit-testing screen points against widgets |
//! | [`consts`] | Shared numeric constants (zoom limits, minimum sizes, grid) |

pub mod consts;
pub mod engine;
pub mod geometry;
pub mod hit;
pub mod input;
pub mod registry;
pub mod viewport;
