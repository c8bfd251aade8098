//! Action dispatcher: executes one decoded request and wraps the outcome.
//!
//! # Responsibilities
//!
//! - Map each [`ActionRequest`] variant to calls on the [`DesktopCapability`].
//! - Run the compound clipboard operations (`text.copy`, `text.paste`) with
//!   their settling delays.
//! - Route `system.capture_screen` to the [`CaptureService`].
//! - Turn every outcome, success or failure, into a [`ResponseEnvelope`].
//!
//! The dispatcher has no per-request mutable state.  One instance is shared
//! by every connection and calls from different connections may overlap;
//! input from two peers then interleaves at the adapter.
//!
//! # Blocking
//!
//! Capability calls are synchronous.  Most return at once, but a real
//! adapter's `drag` sleeps for the drag duration, so every call is made on
//! the blocking pool.

use std::sync::Arc;
use std::time::Duration;

use deskctl_core::protocol::{KeyboardAction, MouseAction, SystemAction, TextAction};
use deskctl_core::{ActionRequest, CapabilityError, DesktopCapability, ResponseEnvelope};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, warn};

use super::capture::{CaptureError, CaptureService};
use crate::domain::config::InputConfig;

/// Errors raised while executing a decoded request.
///
/// The display text is sent to the peer as the envelope `message`.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error(transparent)]
    Capability(#[from] CapabilityError),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    /// The blocking task running a capability call panicked.
    #[error("desktop task failed: {0}")]
    Task(String),
}

/// Executes action requests against one desktop.
pub struct ActionDispatcher {
    desktop: Arc<dyn DesktopCapability>,
    capture: CaptureService,
    settle_delay: Duration,
    modifier: String,
}

impl ActionDispatcher {
    pub fn new(
        desktop: Arc<dyn DesktopCapability>,
        capture: CaptureService,
        input: &InputConfig,
    ) -> Self {
        Self {
            desktop,
            capture,
            settle_delay: input.settle_delay,
            modifier: input.shortcut_modifier.clone(),
        }
    }

    /// Executes `request` and returns its envelope.  Never fails: errors
    /// become error envelopes.
    pub async fn dispatch(&self, request: ActionRequest) -> ResponseEnvelope {
        let category = request.category();
        let operation = request.operation();
        debug!(%category, operation, "dispatching");

        match self.execute(request).await {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(%category, operation, "action failed: {e}");
                ResponseEnvelope::error(e.to_string())
            }
        }
    }

    async fn execute(&self, request: ActionRequest) -> Result<ResponseEnvelope, ActionError> {
        match request {
            ActionRequest::Keyboard(action) => self.keyboard(action).await,
            ActionRequest::Mouse(action) => self.mouse(action).await,
            ActionRequest::System(action) => self.system(action).await,
            ActionRequest::Text(action) => self.text(action).await,
        }
    }

    // ── Categories ────────────────────────────────────────────────────────────

    async fn keyboard(&self, action: KeyboardAction) -> Result<ResponseEnvelope, ActionError> {
        match action {
            KeyboardAction::Type { text } => {
                let typed = text.clone();
                self.on_desktop(move |d| d.type_text(&typed)).await?;
                Ok(ResponseEnvelope::success("type").with("text", text))
            }
            KeyboardAction::Hotkey { keys } => {
                let chord = keys.clone();
                self.on_desktop(move |d| d.press_keys(&chord)).await?;
                Ok(ResponseEnvelope::success("hotkey").with("keys", keys))
            }
            KeyboardAction::Press { key } => {
                let pressed = key.clone();
                self.on_desktop(move |d| d.press_key(&pressed)).await?;
                Ok(ResponseEnvelope::success("press").with("key", key))
            }
        }
    }

    async fn mouse(&self, action: MouseAction) -> Result<ResponseEnvelope, ActionError> {
        match action {
            MouseAction::Move { to } => {
                self.on_desktop(move |d| d.move_cursor(to)).await?;
                Ok(ResponseEnvelope::success("move").with("position", json!({"x": to.x, "y": to.y})))
            }
            MouseAction::Click { button, clicks } => {
                self.on_desktop(move |d| d.click(button, clicks)).await?;
                Ok(ResponseEnvelope::success("click")
                    .with("button", button.as_str())
                    .with("clicks", clicks))
            }
            MouseAction::Drag { from, to, duration } => {
                self.on_desktop(move |d| d.drag(from, to, duration)).await?;
                Ok(ResponseEnvelope::success("drag")
                    .with("start", json!({"x": from.x, "y": from.y}))
                    .with("end", json!({"x": to.x, "y": to.y})))
            }
            MouseAction::Scroll { amount } => {
                self.on_desktop(move |d| d.scroll(amount)).await?;
                Ok(ResponseEnvelope::success("scroll").with("amount", amount))
            }
        }
    }

    async fn system(&self, action: SystemAction) -> Result<ResponseEnvelope, ActionError> {
        match action {
            SystemAction::GetScreenSize => {
                let (width, height) = self.on_desktop(|d| d.screen_size()).await?;
                Ok(ResponseEnvelope::success("get_screen_size")
                    .with("width", width)
                    .with("height", height))
            }
            SystemAction::GetMousePosition => {
                let p = self.on_desktop(|d| d.cursor_position()).await?;
                Ok(ResponseEnvelope::success("get_mouse_position")
                    .with("x", p.x)
                    .with("y", p.y))
            }
            SystemAction::CaptureScreen { save_path } => {
                let report = self.capture.capture(save_path.as_deref()).await?;
                Ok(ResponseEnvelope::success("capture_screen")
                    .with("timestamp", report.timestamp)
                    .with("path", report.path.to_string_lossy().into_owned())
                    .with(
                        "size",
                        json!({"width": report.width, "height": report.height}),
                    ))
            }
        }
    }

    async fn text(&self, action: TextAction) -> Result<ResponseEnvelope, ActionError> {
        match action {
            TextAction::Copy => {
                self.shortcut("a").await?;
                tokio::time::sleep(self.settle_delay).await;
                self.shortcut("c").await?;
                tokio::time::sleep(self.settle_delay).await;
                let text = self.on_desktop(|d| d.read_clipboard()).await?;
                Ok(ResponseEnvelope::success("copy").with("text", text))
            }
            TextAction::Paste { text } => {
                self.on_desktop(move |d| d.write_clipboard(&text)).await?;
                tokio::time::sleep(self.settle_delay).await;
                self.shortcut("v").await?;
                Ok(ResponseEnvelope::success("paste"))
            }
        }
    }

    // ── Helpers ───────────────────────────────────────────────────────────────

    /// Presses `<modifier>+<letter>`.
    async fn shortcut(&self, letter: &str) -> Result<(), ActionError> {
        let chord = vec![self.modifier.clone(), letter.to_string()];
        self.on_desktop(move |d| d.press_keys(&chord)).await
    }

    /// Runs one capability call on the blocking pool.
    async fn on_desktop<T, F>(&self, call: F) -> Result<T, ActionError>
    where
        F: FnOnce(&dyn DesktopCapability) -> Result<T, CapabilityError> + Send + 'static,
        T: Send + 'static,
    {
        let desktop = Arc::clone(&self.desktop);
        tokio::task::spawn_blocking(move || call(desktop.as_ref()))
            .await
            .map_err(|e| ActionError::Task(e.to_string()))?
            .map_err(ActionError::from)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::CaptureConfig;
    use crate::infrastructure::desktop::{DesktopEvent, VirtualDesktop, INJECTED_FAILURE};
    use deskctl_core::{decode_request, CompressionSettings, MouseButton, Point, Status};
    use std::path::Path;

    fn dispatcher_with(desktop: Arc<VirtualDesktop>, save_dir: &Path) -> ActionDispatcher {
        let capture = CaptureService::new(
            desktop.clone(),
            &CaptureConfig {
                save_dir: save_dir.to_path_buf(),
                compression: CompressionSettings::default(),
            },
        )
        .unwrap();
        let input = InputConfig {
            settle_delay: Duration::from_millis(1),
            shortcut_modifier: "ctrl".to_string(),
        };
        ActionDispatcher::new(desktop, capture, &input)
    }

    fn fixture() -> (Arc<VirtualDesktop>, ActionDispatcher, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let desktop = Arc::new(VirtualDesktop::new(1024, 768, "ctrl"));
        let dispatcher = dispatcher_with(Arc::clone(&desktop), dir.path());
        (desktop, dispatcher, dir)
    }

    async fn run(dispatcher: &ActionDispatcher, raw: &str) -> ResponseEnvelope {
        dispatcher.dispatch(decode_request(raw).unwrap()).await
    }

    fn chord(keys: &[&str]) -> DesktopEvent {
        DesktopEvent::Chord(keys.iter().map(|k| k.to_string()).collect())
    }

    // ── keyboard ──────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_type_injects_text_and_echoes_it() {
        // Arrange
        let (desktop, d, _dir) = fixture();

        // Act
        let env = run(&d, r#"{"type":"keyboard","action":"type","text":"hi"}"#).await;

        // Assert
        assert!(env.is_success());
        assert_eq!(env.action.as_deref(), Some("type"));
        assert_eq!(env.field("text"), Some(&json!("hi")));
        assert_eq!(desktop.events(), vec![DesktopEvent::Type("hi".into())]);
    }

    #[tokio::test]
    async fn test_hotkey_passes_keys_in_order() {
        let (desktop, d, _dir) = fixture();

        let env = run(
            &d,
            r#"{"type":"keyboard","action":"hotkey","keys":["ctrl","shift","esc"]}"#,
        )
        .await;

        assert_eq!(env.field("keys"), Some(&json!(["ctrl", "shift", "esc"])));
        assert_eq!(desktop.events(), vec![chord(&["ctrl", "shift", "esc"])]);
    }

    #[tokio::test]
    async fn test_press_echoes_key() {
        let (desktop, d, _dir) = fixture();
        let env = run(&d, r#"{"type":"keyboard","action":"press","key":"enter"}"#).await;
        assert_eq!(env.field("key"), Some(&json!("enter")));
        assert_eq!(desktop.events(), vec![DesktopEvent::Key("enter".into())]);
    }

    // ── mouse ─────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_move_then_position_reports_new_cursor() {
        // Arrange
        let (_desktop, d, _dir) = fixture();

        // Act
        let moved = run(&d, r#"{"type":"mouse","action":"move","x":10,"y":20}"#).await;
        let pos = run(&d, r#"{"type":"system","action":"get_mouse_position"}"#).await;

        // Assert
        assert_eq!(moved.field("position"), Some(&json!({"x": 10, "y": 20})));
        assert_eq!(pos.field("x"), Some(&json!(10)));
        assert_eq!(pos.field("y"), Some(&json!(20)));
    }

    #[tokio::test]
    async fn test_click_defaults_to_single_left_click() {
        let (desktop, d, _dir) = fixture();

        let env = run(&d, r#"{"type":"mouse","action":"click"}"#).await;

        assert_eq!(env.field("button"), Some(&json!("left")));
        assert_eq!(env.field("clicks"), Some(&json!(1)));
        assert_eq!(
            desktop.events(),
            vec![DesktopEvent::Click {
                button: MouseButton::Left,
                count: 1
            }]
        );
    }

    #[tokio::test]
    async fn test_drag_reports_start_and_end() {
        let (desktop, d, _dir) = fixture();

        let env = run(
            &d,
            r#"{"type":"mouse","action":"drag","start_x":1,"start_y":2,"end_x":30,"end_y":40,"duration":0.25}"#,
        )
        .await;

        assert_eq!(env.field("start"), Some(&json!({"x": 1, "y": 2})));
        assert_eq!(env.field("end"), Some(&json!({"x": 30, "y": 40})));
        assert_eq!(
            desktop.events(),
            vec![DesktopEvent::Drag {
                from: Point::new(1, 2),
                to: Point::new(30, 40),
                duration: Duration::from_millis(250),
            }]
        );
    }

    #[tokio::test]
    async fn test_scroll_echoes_amount() {
        let (desktop, d, _dir) = fixture();
        let env = run(&d, r#"{"type":"mouse","action":"scroll","amount":-3}"#).await;
        assert_eq!(env.field("amount"), Some(&json!(-3)));
        assert_eq!(desktop.scroll_offset(), -3);
    }

    // ── system ────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_screen_size_reports_desktop_geometry() {
        let (_desktop, d, _dir) = fixture();
        let env = run(&d, r#"{"type":"system","action":"get_screen_size"}"#).await;
        assert_eq!(env.field("width"), Some(&json!(1024)));
        assert_eq!(env.field("height"), Some(&json!(768)));
    }

    #[tokio::test]
    async fn test_capture_screen_reports_path_and_original_size() {
        // Arrange
        let (_desktop, d, dir) = fixture();

        // Act
        let env = run(&d, r#"{"type":"system","action":"capture_screen"}"#).await;

        // Assert
        assert!(env.is_success(), "{env:?}");
        assert_eq!(env.field("size"), Some(&json!({"width": 1024, "height": 768})));
        let path = env.field("path").and_then(|v| v.as_str()).unwrap();
        assert!(Path::new(path).starts_with(dir.path()));
        assert!(Path::new(path).is_file());
        assert!(env.field("timestamp").and_then(|v| v.as_str()).is_some());
    }

    // ── text ──────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_copy_selects_all_copies_then_reads_clipboard() {
        // Arrange
        let (desktop, d, _dir) = fixture();
        desktop.type_text("field contents").unwrap();

        // Act
        let env = run(&d, r#"{"type":"text","action":"copy"}"#).await;

        // Assert
        assert_eq!(env.field("text"), Some(&json!("field contents")));
        assert_eq!(
            desktop.events()[1..],
            [chord(&["ctrl", "a"]), chord(&["ctrl", "c"])]
        );
    }

    #[tokio::test]
    async fn test_paste_writes_clipboard_then_sends_shortcut() {
        let (desktop, d, _dir) = fixture();

        let env = run(&d, r#"{"type":"text","action":"paste","text":"abc"}"#).await;

        assert!(env.is_success());
        assert!(env.fields.is_empty(), "paste returns no result fields");
        assert_eq!(
            desktop.events(),
            vec![
                DesktopEvent::ClipboardWrite("abc".into()),
                chord(&["ctrl", "v"])
            ]
        );
    }

    #[tokio::test]
    async fn test_paste_then_copy_round_trips_text() {
        let (_desktop, d, _dir) = fixture();

        run(&d, r#"{"type":"text","action":"paste","text":"abc"}"#).await;
        let env = run(&d, r#"{"type":"text","action":"copy"}"#).await;

        assert_eq!(env.field("text"), Some(&json!("abc")));
    }

    // ── failures ──────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_capability_failure_becomes_error_envelope_with_message() {
        // Arrange
        let (desktop, d, _dir) = fixture();
        desktop.set_failing(true);

        // Act
        let env = run(&d, r#"{"type":"mouse","action":"move","x":1,"y":1}"#).await;

        // Assert
        assert_eq!(env.status, Status::Error);
        assert_eq!(env.action, None);
        assert_eq!(env.message.as_deref(), Some(INJECTED_FAILURE));
    }

    #[tokio::test]
    async fn test_copy_stops_at_first_failure() {
        let (desktop, d, _dir) = fixture();
        desktop.set_failing(true);

        let env = run(&d, r#"{"type":"text","action":"copy"}"#).await;

        assert!(!env.is_success());
        assert!(desktop.events().is_empty());
    }

    #[tokio::test]
    async fn test_failed_capture_is_error_envelope() {
        let (desktop, d, _dir) = fixture();
        desktop.set_failing(true);
        let env = run(&d, r#"{"type":"system","action":"capture_screen"}"#).await;
        assert_eq!(env.message.as_deref(), Some(INJECTED_FAILURE));
    }
}
