//! WebSocket server: accept loop and per-session request loop.
//!
//! This module is responsible for:
//!
//! 1. Binding a TCP listener on the configured address.
//! 2. Accepting connections and upgrading each one to a WebSocket session.
//! 3. Running one task per session that reads a frame, decodes it, hands it
//!    to the [`ActionDispatcher`], and writes the envelope back, strictly in
//!    that order, before reading the next frame.
//! 4. Stopping the accept loop when the `running` flag is cleared.
//!
//! # Ordering
//!
//! A session never reads request N+1 before the reply to request N has been
//! written, so replies match requests one-to-one and side effects happen in
//! receipt order.  Sessions are independent of each other.
//!
//! # Errors
//!
//! Bad requests produce error envelopes and the session continues.  A
//! WebSocket protocol error, a failed write, or the peer going away ends that
//! session only.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use deskctl_core::{decode_request, DesktopCapability, ProtocolError, ResponseEnvelope};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::{
    accept_async,
    tungstenite::{Error as WsError, Message as WsMessage},
};
use tracing::{debug, error, info, warn};

use crate::application::{ActionDispatcher, CaptureService};
use crate::domain::config::ServerConfig;

/// How often the accept loop re-checks the shutdown flag.
const ACCEPT_POLL: Duration = Duration::from_millis(200);

/// Sent if an envelope somehow fails to serialize.
const SERIALIZE_FAILURE: &str = r#"{"status":"error","message":"Failed to encode response"}"#;

// ── Public API ────────────────────────────────────────────────────────────────

/// Builds the dispatcher for `config` on top of `desktop`.
///
/// # Errors
///
/// Returns an error if the capture compression settings are invalid.
pub fn build_dispatcher(
    config: &ServerConfig,
    desktop: Arc<dyn DesktopCapability>,
) -> anyhow::Result<ActionDispatcher> {
    let capture = CaptureService::new(Arc::clone(&desktop), &config.capture)
        .context("invalid capture settings")?;
    Ok(ActionDispatcher::new(desktop, capture, &config.input))
}

/// Binds `config.bind_addr` and serves until `running` is set to `false`.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound (port in use, no
/// permission) or the dispatcher cannot be built.
pub async fn run_server(
    config: ServerConfig,
    desktop: Arc<dyn DesktopCapability>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let dispatcher = Arc::new(build_dispatcher(&config, desktop)?);

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind WebSocket listener on {}", config.bind_addr))?;

    info!("deskctl server listening on ws://{}", config.bind_addr);
    serve(listener, dispatcher, running).await
}

/// Accepts connections on an already-bound `listener` until `running` is set
/// to `false`.  Sessions still open at that point run to completion.
///
/// # Errors
///
/// Currently always returns `Ok`; accept errors are logged and skipped.
pub async fn serve(
    listener: TcpListener,
    dispatcher: Arc<ActionDispatcher>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    loop {
        if !running.load(Ordering::Relaxed) {
            info!("shutdown flag set; stopping accept loop");
            break;
        }

        match timeout(ACCEPT_POLL, listener.accept()).await {
            Ok(Ok((stream, peer_addr))) => {
                info!("new connection from {peer_addr}");
                let dispatcher = Arc::clone(&dispatcher);
                tokio::spawn(async move {
                    handle_session(stream, peer_addr, dispatcher).await;
                });
            }
            Ok(Err(e)) => {
                // Transient (e.g. out of file descriptors); keep serving.
                error!("accept error: {e}");
            }
            Err(_) => {
                // No connection within the poll interval.
            }
        }
    }

    Ok(())
}

/// Decodes one inbound message and produces its reply.
///
/// Decode failures become error envelopes without reaching the dispatcher.
pub async fn handle_message(dispatcher: &ActionDispatcher, raw: &str) -> ResponseEnvelope {
    match decode_request(raw) {
        Ok(request) => dispatcher.dispatch(request).await,
        Err(e) => {
            debug!("rejected request: {e}");
            ResponseEnvelope::error(e.to_string())
        }
    }
}

// ── Per-session handler ───────────────────────────────────────────────────────

async fn handle_session(
    stream: TcpStream,
    peer_addr: SocketAddr,
    dispatcher: Arc<ActionDispatcher>,
) {
    match run_session(stream, peer_addr, &dispatcher).await {
        Ok(()) => info!("session {peer_addr} closed"),
        Err(e) => warn!("session {peer_addr} closed with error: {e:#}"),
    }
}

async fn run_session(
    stream: TcpStream,
    peer_addr: SocketAddr,
    dispatcher: &ActionDispatcher,
) -> anyhow::Result<()> {
    let ws_stream = accept_async(stream)
        .await
        .with_context(|| format!("WebSocket handshake failed with {peer_addr}"))?;
    debug!("WebSocket session established: {peer_addr}");

    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    while let Some(frame) = ws_rx.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(WsError::ConnectionClosed | WsError::AlreadyClosed | WsError::Protocol(_)) => {
                debug!("session {peer_addr}: peer went away");
                break;
            }
            Err(e) => return Err(e).context(format!("session {peer_addr}: read failed")),
        };

        let reply = match frame {
            WsMessage::Text(text) => handle_message(dispatcher, &text).await,
            WsMessage::Binary(bytes) => match String::from_utf8(bytes) {
                Ok(text) => handle_message(dispatcher, &text).await,
                Err(_) => ResponseEnvelope::error(ProtocolError::InvalidJson.to_string()),
            },
            WsMessage::Close(_) => break,
            // Ping/Pong are answered by tungstenite itself.
            WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => continue,
        };

        let json = reply.to_json().unwrap_or_else(|e| {
            error!("session {peer_addr}: failed to serialize response: {e}");
            SERIALIZE_FAILURE.to_string()
        });
        ws_tx
            .send(WsMessage::Text(json))
            .await
            .with_context(|| format!("session {peer_addr}: write failed"))?;
    }

    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
