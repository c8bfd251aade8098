//! Server configuration types.
//!
//! [`ServerConfig`] is the single source of truth for runtime settings once
//! startup is done.  It is built by layering CLI flags, environment
//! variables and the TOML file over [`ServerConfig::default`] (see
//! `infrastructure::storage::config`), validated once, and then shared
//! read-only by every session.
//!
//! Nothing in here reads files or the environment.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use deskctl_core::CompressionSettings;
use thiserror::Error;

/// Default WebSocket listen port.
pub const DEFAULT_PORT: u16 = 8767;

/// Default directory for captures without an explicit `save_path`.
pub const DEFAULT_SAVE_DIR: &str = "captures";

/// Default pause between a clipboard-affecting keystroke and the clipboard
/// access that depends on it.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(100);

pub const DEFAULT_SCREEN_WIDTH: u32 = 1920;
pub const DEFAULT_SCREEN_HEIGHT: u32 = 1080;

/// Largest desktop side accepted; the JPEG container cannot encode more.
pub const MAX_SCREEN_DIMENSION: u32 = 65_535;

/// A configuration value that cannot be used.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid value for {field}: {reason}")]
pub struct InvalidConfig {
    pub field: &'static str,
    pub reason: String,
}

impl InvalidConfig {
    fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

/// Returns the platform's shortcut modifier: `command` on macOS, `ctrl`
/// elsewhere.
pub fn default_shortcut_modifier() -> &'static str {
    if cfg!(target_os = "macos") {
        "command"
    } else {
        "ctrl"
    }
}

/// All runtime configuration for the server.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// Address the WebSocket listener binds to.
    ///
    /// Loopback by default.  The protocol carries no authentication, so
    /// binding a public interface hands the desktop to anyone who can reach
    /// the port.
    pub bind_addr: SocketAddr,
    pub capture: CaptureConfig,
    pub input: InputConfig,
    pub desktop: DesktopConfig,
}

/// Where captures go and how hard they are compressed.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureConfig {
    pub save_dir: PathBuf,
    pub compression: CompressionSettings,
}

/// Timing and key names for compound keyboard operations.
#[derive(Debug, Clone, PartialEq)]
pub struct InputConfig {
    /// Pause inside `text.copy` and `text.paste`.
    pub settle_delay: Duration,
    /// Modifier for select-all, copy and paste shortcuts.
    pub shortcut_modifier: String,
}

/// Geometry of the built-in virtual desktop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DesktopConfig {
    pub width: u32,
    pub height: u32,
}

impl Default for ServerConfig {
    /// | Field                      | Default            |
    /// |----------------------------|--------------------|
    /// | bind_addr                  | `127.0.0.1:8767`   |
    /// | capture.save_dir           | `captures`         |
    /// | capture.compression        | 500 KiB, q20..=95  |
    /// | input.settle_delay         | 100 ms             |
    /// | input.shortcut_modifier    | `command` / `ctrl` |
    /// | desktop                    | 1920x1080          |
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), DEFAULT_PORT),
            capture: CaptureConfig::default(),
            input: InputConfig::default(),
            desktop: DesktopConfig::default(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            save_dir: PathBuf::from(DEFAULT_SAVE_DIR),
            compression: CompressionSettings::default(),
        }
    }
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            settle_delay: DEFAULT_SETTLE_DELAY,
            shortcut_modifier: default_shortcut_modifier().to_string(),
        }
    }
}

impl Default for DesktopConfig {
    fn default() -> Self {
        Self {
            width: DEFAULT_SCREEN_WIDTH,
            height: DEFAULT_SCREEN_HEIGHT,
        }
    }
}

impl ServerConfig {
    /// Checks every section.
    ///
    /// # Errors
    ///
    /// Returns the first [`InvalidConfig`] found.
    pub fn validate(&self) -> Result<(), InvalidConfig> {
        self.capture
            .compression
            .validate()
            .map_err(|e| InvalidConfig::new("capture", e.to_string()))?;
        if self.capture.save_dir.as_os_str().is_empty() {
            return Err(InvalidConfig::new("capture.save_dir", "must not be empty"));
        }
        if self.input.shortcut_modifier.trim().is_empty() {
            return Err(InvalidConfig::new(
                "input.shortcut_modifier",
                "must name a key",
            ));
        }
        if self.desktop.width == 0 || self.desktop.height == 0 {
            return Err(InvalidConfig::new(
                "desktop",
                format!(
                    "screen size {}x{} has no area",
                    self.desktop.width, self.desktop.height
                ),
            ));
        }
        if self.desktop.width > MAX_SCREEN_DIMENSION
            || self.desktop.height > MAX_SCREEN_DIMENSION
        {
            return Err(InvalidConfig::new(
                "desktop",
                format!(
                    "screen size {}x{} exceeds {MAX_SCREEN_DIMENSION} pixels per side",
                    self.desktop.width, self.desktop.height
                ),
            ));
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
