//! deskctl server entry point.
//!
//! Accepts WebSocket connections and executes JSON action requests against
//! the desktop: keyboard, mouse, clipboard, and compressed screen captures.
//!
//! # Usage
//!
//! ```text
//! deskctl-server [OPTIONS]
//!
//! Options:
//!   --bind <IP>               Listen address [default: 127.0.0.1]
//!   --port <PORT>             Listen port [default: 8767]
//!   --config <PATH>           TOML config file
//!   --save-dir <DIR>          Directory for captures [default: captures]
//!   --target-size-kb <KB>     Byte budget per capture [default: 500]
//!   --screen-width <PX>       Virtual desktop width [default: 1920]
//!   --screen-height <PX>      Virtual desktop height [default: 1080]
//! ```
//!
//! # Precedence
//!
//! Command-line flag, then environment variable, then config file, then
//! built-in default.
//!
//! | Variable            | Flag               |
//! |---------------------|--------------------|
//! | `DESKCTL_BIND`      | `--bind`           |
//! | `DESKCTL_PORT`      | `--port`           |
//! | `DESKCTL_CONFIG`    | `--config`         |
//! | `SCREEN_SAVE_DIR`   | `--save-dir`       |
//! | `DESKCTL_TARGET_KB` | `--target-size-kb` |
//!
//! Log verbosity follows `RUST_LOG` (default `info`).

use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use deskctl_server::domain::ServerConfig;
use deskctl_server::infrastructure::desktop::VirtualDesktop;
use deskctl_server::infrastructure::run_server;
use deskctl_server::infrastructure::storage::{load_config, ConfigOverrides};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Remote-control server for keyboard, mouse, clipboard and screen capture.
///
/// Every option is also settable in the config file; flags and environment
/// variables win over it.
#[derive(Debug, Parser)]
#[command(
    name = "deskctl-server",
    about = "WebSocket JSON remote-control server with compressed screen capture",
    version
)]
struct Cli {
    /// IP address to listen on.
    ///
    /// The protocol has no authentication: anything other than a loopback
    /// address exposes this desktop to the network.
    #[arg(long, env = "DESKCTL_BIND")]
    bind: Option<String>,

    /// TCP port to listen on.
    #[arg(long, env = "DESKCTL_PORT")]
    port: Option<u16>,

    /// Path to a TOML config file.  Must exist when given.
    #[arg(long, env = "DESKCTL_CONFIG")]
    config: Option<PathBuf>,

    /// Directory for captures requested without a `save_path`.
    #[arg(long, env = "SCREEN_SAVE_DIR")]
    save_dir: Option<PathBuf>,

    /// Byte budget for one capture, in KiB.
    #[arg(long, env = "DESKCTL_TARGET_KB")]
    target_size_kb: Option<u64>,

    /// Width of the virtual desktop in pixels.
    #[arg(long)]
    screen_width: Option<u32>,

    /// Height of the virtual desktop in pixels.
    #[arg(long)]
    screen_height: Option<u32>,
}

impl Cli {
    /// Loads the config file and layers the CLI and environment values on
    /// top.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed, or if
    /// the merged values fail validation.
    fn into_server_config(self) -> anyhow::Result<ServerConfig> {
        let mut file = load_config(self.config.as_deref()).context("failed to load config")?;
        file.apply(ConfigOverrides {
            bind_address: self.bind,
            port: self.port,
            save_dir: self.save_dir,
            target_size_kb: self.target_size_kb,
            screen_width: self.screen_width,
            screen_height: self.screen_height,
        });
        Ok(file.into_server_config()?)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Cli::parse().into_server_config()?;

    info!(
        "deskctl server starting: bind={}, save_dir={}, budget={} bytes",
        config.bind_addr,
        config.capture.save_dir.display(),
        config.capture.compression.target_bytes
    );
    if !config.bind_addr.ip().is_loopback() {
        warn!(
            "listening on non-loopback address {}; any host that can reach it controls this desktop",
            config.bind_addr
        );
    }

    let desktop = Arc::new(VirtualDesktop::new(
        config.desktop.width,
        config.desktop.height,
        config.input.shortcut_modifier.clone(),
    ));

    // The accept loop polls this flag every 200 ms.
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C, shutting down");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    run_server(config, desktop, running).await?;

    info!("deskctl server stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
