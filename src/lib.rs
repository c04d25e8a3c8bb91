//! agentdesk: a canvas workspace for long-running AI agent tasks.
//!
//! The pure pieces live in the workspace crates: `canvas` (geometry, widget
//! registry, pointer interaction), `events` (stream event codec) and
//! `progress` (phase checklist, captions). This crate adds everything that
//! touches the outside world.
//!
//! - [`api`]: reqwest client for the agent backend.
//! - [`session`]: per-session message folding of stream events.
//! - [`stream`]: drives an SSE body into a session with stop handling.
//! - [`workspace`]: joins widgets, sessions and checklists.
//! - [`poll`]: keeps task widgets in step with backend task status.
//! - [`persist`]: snapshot file plus debounced background writer.
//! - [`config`] and [`error`]: ambient configuration and error codes.

pub mod api;
pub mod config;
pub mod error;
pub mod persist;
pub mod poll;
pub mod session;
pub mod stream;
pub mod workspace;

pub use config::ClientConfig;
pub use error::{ClientError, ErrorCode};
pub use workspace::Workspace;
