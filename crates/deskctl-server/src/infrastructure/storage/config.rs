//! TOML configuration file for the server.
//!
//! Looked up, when no `--config` path is given, at:
//! - Windows:  `%APPDATA%\deskctl\config.toml`
//! - Linux:    `$XDG_CONFIG_HOME/deskctl/config.toml` (or `~/.config/...`)
//! - macOS:    `~/Library/Application Support/deskctl/config.toml`
//!
//! ```toml
//! [server]
//! bind_address = "127.0.0.1"
//! port = 8767
//!
//! [capture]
//! save_dir = "captures"
//! target_size_kb = 500
//! min_quality = 20
//! max_quality = 95
//! max_iterations = 7
//! shrink_factor = 0.9
//!
//! [input]
//! settle_delay_ms = 100
//! shortcut_modifier = "ctrl"
//!
//! [desktop]
//! width = 1920
//! height = 1080
//! ```
//!
//! Every section and every field is optional; absent values take the
//! defaults below.  Command-line flags and environment variables are applied
//! on top with [`FileConfig::apply`] before the result is converted into a
//! validated [`ServerConfig`].

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use deskctl_core::CompressionSettings;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::domain::config::{
    default_shortcut_modifier, CaptureConfig, DesktopConfig, InputConfig, InvalidConfig,
    ServerConfig, DEFAULT_PORT, DEFAULT_SAVE_DIR, DEFAULT_SCREEN_HEIGHT, DEFAULT_SCREEN_WIDTH,
};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    #[error("I/O error accessing config at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error(transparent)]
    Invalid(#[from] InvalidConfig),
}

// ── File schema ───────────────────────────────────────────────────────────────

/// The on-disk configuration, before overrides and validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FileConfig {
    pub server: ServerSection,
    pub capture: CaptureSection,
    pub input: InputSection,
    pub desktop: DesktopSection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerSection {
    /// IP address to listen on.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CaptureSection {
    #[serde(default = "default_save_dir")]
    pub save_dir: PathBuf,
    /// Byte budget per capture, in KiB.
    #[serde(default = "default_target_size_kb")]
    pub target_size_kb: u64,
    #[serde(default = "default_min_quality")]
    pub min_quality: u8,
    #[serde(default = "default_max_quality")]
    pub max_quality: u8,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default = "default_shrink_factor")]
    pub shrink_factor: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InputSection {
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    #[serde(default = "default_modifier")]
    pub shortcut_modifier: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DesktopSection {
    #[serde(default = "default_screen_width")]
    pub width: u32,
    #[serde(default = "default_screen_height")]
    pub height: u32,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_save_dir() -> PathBuf {
    PathBuf::from(DEFAULT_SAVE_DIR)
}
fn default_target_size_kb() -> u64 {
    CompressionSettings::default().target_bytes / 1024
}
fn default_min_quality() -> u8 {
    CompressionSettings::default().min_quality
}
fn default_max_quality() -> u8 {
    CompressionSettings::default().max_quality
}
fn default_max_iterations() -> u32 {
    CompressionSettings::default().max_iterations
}
fn default_shrink_factor() -> f64 {
    CompressionSettings::default().shrink_factor
}
fn default_settle_delay_ms() -> u64 {
    100
}
fn default_modifier() -> String {
    default_shortcut_modifier().to_string()
}
fn default_screen_width() -> u32 {
    DEFAULT_SCREEN_WIDTH
}
fn default_screen_height() -> u32 {
    DEFAULT_SCREEN_HEIGHT
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl Default for CaptureSection {
    fn default() -> Self {
        Self {
            save_dir: default_save_dir(),
            target_size_kb: default_target_size_kb(),
            min_quality: default_min_quality(),
            max_quality: default_max_quality(),
            max_iterations: default_max_iterations(),
            shrink_factor: default_shrink_factor(),
        }
    }
}

impl Default for InputSection {
    fn default() -> Self {
        Self {
            settle_delay_ms: default_settle_delay_ms(),
            shortcut_modifier: default_modifier(),
        }
    }
}

impl Default for DesktopSection {
    fn default() -> Self {
        Self {
            width: default_screen_width(),
            height: default_screen_height(),
        }
    }
}

// ── Overrides ─────────────────────────────────────────────────────────────────

/// Values from the command line or environment that win over the file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigOverrides {
    pub bind_address: Option<String>,
    pub port: Option<u16>,
    pub save_dir: Option<PathBuf>,
    pub target_size_kb: Option<u64>,
    pub screen_width: Option<u32>,
    pub screen_height: Option<u32>,
}

impl FileConfig {
    /// Replaces every field for which `overrides` carries a value.
    pub fn apply(&mut self, overrides: ConfigOverrides) {
        if let Some(bind) = overrides.bind_address {
            self.server.bind_address = bind;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(dir) = overrides.save_dir {
            self.capture.save_dir = dir;
        }
        if let Some(kb) = overrides.target_size_kb {
            self.capture.target_size_kb = kb;
        }
        if let Some(w) = overrides.screen_width {
            self.desktop.width = w;
        }
        if let Some(h) = overrides.screen_height {
            self.desktop.height = h;
        }
    }

    /// Converts to a validated [`ServerConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the bind address is not an IP
    /// address or any value fails [`ServerConfig::validate`].
    pub fn into_server_config(self) -> Result<ServerConfig, ConfigError> {
        let ip: IpAddr = self.server.bind_address.parse().map_err(|_| {
            InvalidConfig {
                field: "server.bind_address",
                reason: format!("'{}' is not an IP address", self.server.bind_address),
            }
        })?;
        let target_bytes = self
            .capture
            .target_size_kb
            .checked_mul(1024)
            .ok_or_else(|| InvalidConfig {
                field: "capture.target_size_kb",
                reason: "too large".to_string(),
            })?;

        let config = ServerConfig {
            bind_addr: SocketAddr::new(ip, self.server.port),
            capture: CaptureConfig {
                save_dir: self.capture.save_dir,
                compression: CompressionSettings {
                    target_bytes,
                    min_quality: self.capture.min_quality,
                    max_quality: self.capture.max_quality,
                    max_iterations: self.capture.max_iterations,
                    shrink_factor: self.capture.shrink_factor,
                },
            },
            input: InputConfig {
                settle_delay: Duration::from_millis(self.input.settle_delay_ms),
                shortcut_modifier: self.input.shortcut_modifier,
            },
            desktop: DesktopConfig {
                width: self.desktop.width,
                height: self.desktop.height,
            },
        };
        config.validate()?;
        Ok(config)
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Resolves the platform config file path.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the base directory
/// cannot be determined from the environment.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    platform_config_dir()
        .map(|dir| dir.join("config.toml"))
        .ok_or(ConfigError::NoPlatformConfigDir)
}

/// Loads the configuration file.
///
/// With `explicit = Some(path)` the file must exist.  Otherwise the platform
/// file is read if present, and defaults are returned when it is not (or
/// when the platform has no config directory).
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors and
/// [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(explicit: Option<&Path>) -> Result<FileConfig, ConfigError> {
    match explicit {
        Some(path) => read_config(path),
        None => match config_file_path() {
            Ok(path) => read_config_if_present(&path),
            Err(ConfigError::NoPlatformConfigDir) => {
                debug!("no platform config directory; using defaults");
                Ok(FileConfig::default())
            }
            Err(e) => Err(e),
        },
    }
}

fn read_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    debug!("loaded config from {}", path.display());
    Ok(toml::from_str(&content)?)
}

fn read_config_if_present(path: &Path) -> Result<FileConfig, ConfigError> {
    match read_config(path) {
        Err(ConfigError::Io { source, .. }) if source.kind() == std::io::ErrorKind::NotFound => {
            debug!("no config file at {}; using defaults", path.display());
            Ok(FileConfig::default())
        }
        other => other,
    }
}

/// Resolves the platform config base directory, including the `deskctl`
/// subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("deskctl"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("deskctl"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("deskctl")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
