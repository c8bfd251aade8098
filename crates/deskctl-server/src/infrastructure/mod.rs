//! Infrastructure layer for deskctl-server.
//!
//! Handles all I/O: the WebSocket listener and sessions, the configuration
//! file, and the desktop adapter.
//!
//! # Responsibilities
//!
//! - Binding the listener and performing the WebSocket upgrade
//! - Spawning per-session Tokio tasks
//! - Handling the graceful shutdown signal
//! - Loading the TOML config file
//! - Providing the in-memory desktop adapter
//!
//! # What does NOT belong here?
//!
//! - Action semantics (that is the application layer)
//! - Wire message decoding (that is `deskctl-core`)

pub mod desktop;
pub mod storage;
pub mod ws_server;

pub use ws_server::{build_dispatcher, handle_message, run_server, serve};
