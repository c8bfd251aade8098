//! Application layer for deskctl-server.
//!
//! Knows *what* each action does and delegates *how* to the desktop
//! adapter and the compression engine.
//!
//! # Responsibilities
//!
//! - Executing decoded action requests ([`ActionDispatcher`])
//! - The screen-capture pipeline ([`CaptureService`])
//!
//! # What does NOT belong here?
//!
//! - Opening sockets or WebSocket framing (that is infrastructure)
//! - Wire decoding (that is `deskctl-core`)

pub mod capture;
pub mod dispatcher;

pub use capture::{CaptureError, CaptureReport, CaptureService};
pub use dispatcher::{ActionDispatcher, ActionError};
