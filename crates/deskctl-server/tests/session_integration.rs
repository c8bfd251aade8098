//! End-to-end tests: a real WebSocket client talking to the server over
//! loopback, with the in-memory desktop behind it.
//!
//! Each test binds its own ephemeral port so tests can run in parallel.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use deskctl_core::{ResponseEnvelope, Status};
use deskctl_server::domain::ServerConfig;
use deskctl_server::infrastructure::desktop::VirtualDesktop;
use deskctl_server::infrastructure::{build_dispatcher, serve};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct TestServer {
    addr: SocketAddr,
    desktop: Arc<VirtualDesktop>,
    running: Arc<AtomicBool>,
    capture_dir: tempfile::TempDir,
}

impl TestServer {
    async fn start() -> Self {
        let save_dir = tempfile::tempdir().unwrap();
        let mut config = ServerConfig::default();
        config.capture.save_dir = save_dir.path().to_path_buf();
        config.input.settle_delay = Duration::from_millis(5);
        config.input.shortcut_modifier = "ctrl".to_string();

        let desktop = Arc::new(VirtualDesktop::new(800, 600, "ctrl"));
        let dispatcher = Arc::new(build_dispatcher(&config, desktop.clone()).unwrap());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let running = Arc::new(AtomicBool::new(true));

        tokio::spawn(serve(listener, dispatcher, Arc::clone(&running)));

        Self {
            addr,
            desktop,
            running,
            capture_dir: save_dir,
        }
    }

    async fn connect(&self) -> Client {
        let (ws, _) = connect_async(format!("ws://{}", self.addr)).await.unwrap();
        ws
    }

    fn save_dir(&self) -> &std::path::Path {
        self.capture_dir.path()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
    }
}

async fn recv_envelope(ws: &mut Client) -> (ResponseEnvelope, Value) {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(10), ws.next())
            .await
            .expect("timed out waiting for a reply")
            .expect("stream ended")
            .expect("websocket error");
        if let Message::Text(text) = msg {
            let env: ResponseEnvelope = serde_json::from_str(&text).unwrap();
            let raw: Value = serde_json::from_str(&text).unwrap();
            return (env, raw);
        }
    }
}

async fn request(ws: &mut Client, body: Value) -> (ResponseEnvelope, Value) {
    ws.send(Message::Text(body.to_string())).await.unwrap();
    recv_envelope(ws).await
}

// ── Error handling keeps the session open ─────────────────────────────────────

#[tokio::test]
async fn test_unknown_type_is_error_and_session_stays_usable() {
    // Arrange
    let server = TestServer::start().await;
    let mut ws = server.connect().await;

    // Act
    let (_, first) = request(&mut ws, json!({"type": "gamepad", "action": "rumble"})).await;
    let (second, _) = request(&mut ws, json!({"type": "system", "action": "get_screen_size"})).await;

    // Assert
    assert_eq!(first, json!({"status": "error", "message": "Unknown action type"}));
    assert!(second.is_success());
    assert_eq!(second.field("width"), Some(&json!(800)));
}

#[tokio::test]
async fn test_invalid_json_reply_has_no_action_field() {
    let server = TestServer::start().await;
    let mut ws = server.connect().await;

    ws.send(Message::Text("{oops".to_string())).await.unwrap();
    let (_, raw) = recv_envelope(&mut ws).await;

    assert_eq!(raw, json!({"status": "error", "message": "Invalid JSON format"}));
}

#[tokio::test]
async fn test_binary_frame_with_json_is_accepted() {
    let server = TestServer::start().await;
    let mut ws = server.connect().await;

    let body = json!({"type": "system", "action": "get_mouse_position"}).to_string();
    ws.send(Message::Binary(body.into_bytes())).await.unwrap();
    let (env, _) = recv_envelope(&mut ws).await;

    assert!(env.is_success());
}

#[tokio::test]
async fn test_binary_frame_with_invalid_utf8_is_invalid_json() {
    let server = TestServer::start().await;
    let mut ws = server.connect().await;

    ws.send(Message::Binary(vec![0xFF, 0xFE, 0x00])).await.unwrap();
    let (env, _) = recv_envelope(&mut ws).await;

    assert_eq!(env.message.as_deref(), Some("Invalid JSON format"));
}

#[tokio::test]
async fn test_missing_parameter_names_it() {
    let server = TestServer::start().await;
    let mut ws = server.connect().await;

    let (env, _) = request(&mut ws, json!({"type": "mouse", "action": "move", "x": 5})).await;

    assert_eq!(env.status, Status::Error);
    assert_eq!(
        env.message.as_deref(),
        Some("Missing required parameter 'y' for move")
    );
}

// ── Scenarios ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_move_then_get_mouse_position() {
    let server = TestServer::start().await;
    let mut ws = server.connect().await;

    request(&mut ws, json!({"type": "mouse", "action": "move", "x": 10, "y": 20})).await;
    let (_, raw) = request(&mut ws, json!({"type": "system", "action": "get_mouse_position"})).await;

    assert_eq!(
        raw,
        json!({"status": "success", "action": "get_mouse_position", "x": 10, "y": 20})
    );
}

#[tokio::test]
async fn test_paste_then_copy_returns_same_text() {
    // Arrange
    let server = TestServer::start().await;
    let mut ws = server.connect().await;

    // Act
    let (paste, _) = request(&mut ws, json!({"type": "text", "action": "paste", "text": "abc"})).await;
    let (copy, _) = request(&mut ws, json!({"type": "text", "action": "copy"})).await;

    // Assert
    assert!(paste.is_success());
    assert_eq!(copy.field("text"), Some(&json!("abc")));
}

#[tokio::test]
async fn test_select_all_copy_then_position_replies_in_order() {
    // Arrange
    let server = TestServer::start().await;
    let mut ws = server.connect().await;
    let requests = [
        json!({"type": "keyboard", "action": "hotkey", "keys": ["ctrl", "a"]}),
        json!({"type": "keyboard", "action": "hotkey", "keys": ["ctrl", "c"]}),
        json!({"type": "system", "action": "get_mouse_position"}),
    ];

    // Act: send all three before reading any reply.
    for body in &requests {
        ws.send(Message::Text(body.to_string())).await.unwrap();
    }
    let mut replies = Vec::new();
    for _ in 0..requests.len() {
        replies.push(recv_envelope(&mut ws).await.0);
    }

    // Assert
    assert!(replies.iter().all(ResponseEnvelope::is_success));
    assert_eq!(replies[0].action.as_deref(), Some("hotkey"));
    assert_eq!(replies[1].action.as_deref(), Some("hotkey"));
    assert_eq!(replies[2].action.as_deref(), Some("get_mouse_position"));
    assert!(replies[2].field("x").is_some_and(Value::is_i64));
    assert!(replies[2].field("y").is_some_and(Value::is_i64));
}

#[tokio::test]
async fn test_capture_screen_writes_file_and_reports_size() {
    let server = TestServer::start().await;
    let mut ws = server.connect().await;

    let (env, _) = request(&mut ws, json!({"type": "system", "action": "capture_screen"})).await;

    assert!(env.is_success(), "{env:?}");
    assert_eq!(env.field("size"), Some(&json!({"width": 800, "height": 600})));
    let path = env.field("path").and_then(Value::as_str).unwrap();
    assert!(std::path::Path::new(path).starts_with(server.save_dir()));
    let size = std::fs::metadata(path).unwrap().len();
    assert!(size <= 500 * 1024);
}

#[tokio::test]
async fn test_capture_screen_custom_path_gets_extension() {
    let server = TestServer::start().await;
    let mut ws = server.connect().await;
    let requested = server.save_dir().join("custom");

    let (env, _) = request(
        &mut ws,
        json!({"type": "system", "action": "capture_screen", "save_path": requested.to_str().unwrap()}),
    )
    .await;

    let expected = server.save_dir().join("custom.jpg");
    assert_eq!(env.field("path"), Some(&json!(expected.to_str().unwrap())));
    assert!(expected.is_file());
}

#[tokio::test]
async fn test_capability_failure_message_reaches_peer() {
    let server = TestServer::start().await;
    let mut ws = server.connect().await;
    server.desktop.set_failing(true);

    let (env, _) = request(&mut ws, json!({"type": "mouse", "action": "click"})).await;

    assert_eq!(env.status, Status::Error);
    assert_eq!(
        env.message.as_deref(),
        Some(deskctl_server::infrastructure::desktop::INJECTED_FAILURE)
    );
}

// ── Connections ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_closing_one_session_does_not_affect_another() {
    // Arrange
    let server = TestServer::start().await;
    let mut a = server.connect().await;
    let mut b = server.connect().await;

    // Act
    a.close(None).await.unwrap();
    let (env, _) = request(&mut b, json!({"type": "system", "action": "get_screen_size"})).await;

    // Assert
    assert!(env.is_success());
}

#[tokio::test]
async fn test_events_from_one_session_arrive_in_send_order() {
    let server = TestServer::start().await;
    let mut ws = server.connect().await;

    for x in [1, 2, 3] {
        request(&mut ws, json!({"type": "mouse", "action": "move", "x": x, "y": 0})).await;
    }

    let moves: Vec<i32> = server
        .desktop
        .events()
        .into_iter()
        .filter_map(|e| match e {
            deskctl_server::infrastructure::desktop::DesktopEvent::Move(p) => Some(p.x),
            _ => None,
        })
        .collect();
    assert_eq!(moves, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_server_stops_accepting_after_shutdown_flag() {
    // Arrange
    let server = TestServer::start().await;
    server.running.store(false, Ordering::Relaxed);

    // Act: give the accept loop time to observe the flag.
    tokio::time::sleep(Duration::from_millis(600)).await;
    let result = tokio::time::timeout(
        Duration::from_secs(2),
        connect_async(format!("ws://{}", server.addr)),
    )
    .await;

    // Assert: the listener is gone, so the handshake cannot complete.
    assert!(!matches!(result, Ok(Ok(_))));
}
