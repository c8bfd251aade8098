//! Domain layer for deskctl-server.
//!
//! Pure types with no I/O, networking or framework dependencies: here, the
//! validated runtime configuration.  The wire types live in `deskctl-core`.
//!
//! # What does NOT belong here?
//!
//! - Any `tokio`, `TcpStream`, or `WebSocket` types
//! - File I/O or environment variable reading

pub mod config;

pub use config::{CaptureConfig, DesktopConfig, InputConfig, InvalidConfig, ServerConfig};
