//! # deskctl-core
//!
//! Shared library for deskctl containing the JSON action protocol, the
//! capability seam to the operating system, and the adaptive compression
//! engine used for screen captures.
//!
//! This crate is used by the server and by its tests.
//! It has no dependencies on OS input APIs, async runtimes, or network sockets.
//!
//! # Architecture overview (for beginners)
//!
//! deskctl lets an external agent (an automation client, a test harness, or an
//! LLM-driven controller) drive a machine's mouse, keyboard and clipboard and
//! pull compressed screenshots over a long-lived WebSocket connection.
//!
//! This crate (`deskctl-core`) is the shared foundation.  It defines:
//!
//! - **`protocol`** – What travels over the wire.  Inbound JSON objects are
//!   decoded and validated into a closed [`ActionRequest`] enum; every outcome
//!   is reported back as a [`ResponseEnvelope`].
//!
//! - **`capability`** – The [`DesktopCapability`] trait: the opaque boundary to
//!   OS-level input injection, clipboard access and frame-buffer capture.
//!
//! - **`compress`** – The [`AdaptiveCompressor`]: a bounded quality search with
//!   a downscaling fallback that keeps an encoded capture under a byte budget.

pub mod capability;
pub mod compress;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `deskctl_core::ActionRequest` instead of the full module path.
pub use capability::{CapabilityError, DesktopCapability, MouseButton, Point};
pub use compress::{
    AdaptiveCompressor, Compressed, CompressionError, CompressionOutcome, CompressionSettings,
    JpegEncoder, QualityEncoder,
};
pub use protocol::request::{decode_request, ActionRequest, Category, ProtocolError};
pub use protocol::response::{ResponseEnvelope, Status};
