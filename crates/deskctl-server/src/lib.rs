//! deskctl-server library crate.
//!
//! A WebSocket server that lets an external agent drive this machine's
//! mouse, keyboard and clipboard and pull compressed screenshots, using the
//! JSON action protocol from `deskctl-core`.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! Agent (JSON over WebSocket)
//!         ↕
//! [deskctl-server]
//!   ├── domain/           ServerConfig and its validation
//!   ├── application/      ActionDispatcher, CaptureService
//!   └── infrastructure/
//!         ├── ws_server/  Accept loop and per-session request loop
//!         ├── storage/    TOML config file
//!         └── desktop/    In-memory VirtualDesktop adapter
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O and no async.
//! - `application` depends on `domain` and `deskctl-core`; it reaches the OS
//!   only through `DesktopCapability` and the compressor's file output.
//! - `infrastructure` depends on all other layers plus `tokio` and
//!   `tungstenite`.

/// Domain layer: configuration types (no I/O).
pub mod domain;

/// Application layer: action execution and the capture pipeline.
pub mod application;

/// Infrastructure layer: WebSocket server, config file, desktop adapter.
pub mod infrastructure;
