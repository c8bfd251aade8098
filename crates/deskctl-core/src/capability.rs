//! The capability seam between the action protocol and the operating system.
//!
//! Everything that touches real hardware (cursor motion, key injection,
//! clipboard access, frame-buffer capture) sits behind the
//! [`DesktopCapability`] trait.  The dispatcher only ever talks to this trait,
//! so it can be driven by a platform adapter in production and by an
//! in-memory recording adapter in tests.
//!
//! # Contract notes
//!
//! - All methods are synchronous.  OS input APIs return quickly; the one
//!   expensive call, [`DesktopCapability::capture_frame`], is expected to be
//!   run off the async executor by the caller.
//! - Implementations must be `Send + Sync` because one adapter instance is
//!   shared by every connection.  Concurrent input from two connections is
//!   allowed to interleave at the OS level; adapters do not serialise it.
//! - [`DesktopCapability::press_keys`] receives keys in the caller's order.
//!   Pressing them in that order and releasing them in reverse is the
//!   adapter's job, not the dispatcher's.

use std::fmt;
use std::time::Duration;

use image::RgbImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error raised by a capability adapter.
///
/// The display text is forwarded verbatim to the peer as the envelope's
/// `message`, so it should read like the underlying OS error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CapabilityError {
    /// The platform call itself failed (e.g. input injection denied).
    #[error("{0}")]
    Platform(String),
}

/// A pixel position in screen coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Mouse buttons addressable by `mouse.click`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

impl MouseButton {
    /// Parses the wire name of a button (`"left"`, `"right"`, `"middle"`).
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "left" => Some(MouseButton::Left),
            "right" => Some(MouseButton::Right),
            "middle" => Some(MouseButton::Middle),
            _ => None,
        }
    }

    /// Returns the wire name of the button.
    pub fn as_str(self) -> &'static str {
        match self {
            MouseButton::Left => "left",
            MouseButton::Right => "right",
            MouseButton::Middle => "middle",
        }
    }
}

impl fmt::Display for MouseButton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Platform-agnostic access to the machine's pointer, keyboard, clipboard and
/// screen.
///
/// Each supported platform provides an implementation outside this crate.
pub trait DesktopCapability: Send + Sync {
    /// Captures the current frame buffer as an RGB bitmap.
    fn capture_frame(&self) -> Result<RgbImage, CapabilityError>;

    /// Returns the primary screen size as `(width, height)` in pixels.
    fn screen_size(&self) -> Result<(u32, u32), CapabilityError>;

    /// Returns the current cursor position.
    fn cursor_position(&self) -> Result<Point, CapabilityError>;

    /// Moves the cursor to an absolute screen position.
    fn move_cursor(&self, to: Point) -> Result<(), CapabilityError>;

    /// Clicks `button` `count` times at the current cursor position.
    fn click(&self, button: MouseButton, count: u32) -> Result<(), CapabilityError>;

    /// Presses the left button at `from`, moves to `to` over `duration`, and
    /// releases it there.
    fn drag(&self, from: Point, to: Point, duration: Duration) -> Result<(), CapabilityError>;

    /// Scrolls the wheel by `amount` clicks; positive scrolls up.
    fn scroll(&self, amount: i32) -> Result<(), CapabilityError>;

    /// Presses `keys` as one chord, in order, then releases them in reverse.
    fn press_keys(&self, keys: &[String]) -> Result<(), CapabilityError>;

    /// Presses and releases a single named key.
    fn press_key(&self, key: &str) -> Result<(), CapabilityError>;

    /// Types `text` character by character into the focused window.
    fn type_text(&self, text: &str) -> Result<(), CapabilityError>;

    /// Reads the clipboard as text.
    fn read_clipboard(&self) -> Result<String, CapabilityError>;

    /// Replaces the clipboard contents with `text`.
    fn write_clipboard(&self, text: &str) -> Result<(), CapabilityError>;
}
