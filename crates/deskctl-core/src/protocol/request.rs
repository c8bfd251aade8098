//! Decoding and validation of inbound action requests.
//!
//! Wire format (one JSON object per WebSocket text frame):
//! ```text
//! { "type": "<keyboard|mouse|system|text>", "action": "<operation>", ...operation fields }
//! ```
//!
//! Decoding happens in three steps, and each step has its own error so the
//! peer always learns *why* a request was refused:
//!
//! 1. The text must be valid JSON and a JSON object ([`ProtocolError::InvalidJson`],
//!    [`ProtocolError::NotAnObject`]).
//! 2. `type` must name one of the four categories and `action` one of that
//!    category's operations ([`ProtocolError::UnknownCategory`],
//!    [`ProtocolError::UnknownOperation`]).
//! 3. The operation's own parameters must be present and well-typed
//!    ([`ProtocolError::MissingParameter`], [`ProtocolError::InvalidParameter`]).
//!    Optional parameters fall back to their documented defaults.
//!
//! The result is a closed [`ActionRequest`] enum: once a request decodes, the
//! dispatcher can match on it exhaustively and never sees an unknown verb.

use std::fmt;
use std::time::Duration;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::capability::{MouseButton, Point};

/// Default `mouse.click` button.
pub const DEFAULT_CLICK_BUTTON: MouseButton = MouseButton::Left;

/// Default `mouse.click` count.
pub const DEFAULT_CLICK_COUNT: u32 = 1;

/// Default `mouse.drag` duration.
pub const DEFAULT_DRAG_DURATION: Duration = Duration::from_millis(500);

/// Longest `mouse.drag` accepted; the adapter holds a blocking thread for it.
pub const MAX_DRAG_DURATION: Duration = Duration::from_secs(60);

/// Errors that can occur while decoding an inbound message.
///
/// The display strings are part of the wire contract: they are sent to the
/// peer unchanged as the error envelope's `message`.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProtocolError {
    /// The frame is not valid JSON.
    #[error("Invalid JSON format")]
    InvalidJson,

    /// The frame is valid JSON but not a JSON object.
    #[error("Request must be a JSON object")]
    NotAnObject,

    /// `type` is missing or does not name a known category.
    #[error("Unknown action type")]
    UnknownCategory,

    /// `action` is missing or not an operation of its category.
    #[error("Unknown {category} action: {operation}")]
    UnknownOperation { category: Category, operation: String },

    /// A required parameter is absent (or `null`).
    #[error("Missing required parameter '{name}' for {operation}")]
    MissingParameter {
        operation: &'static str,
        name: &'static str,
    },

    /// A parameter is present but has the wrong kind or an out-of-range value.
    #[error("Invalid parameter '{name}' for {operation}: {reason}")]
    InvalidParameter {
        operation: &'static str,
        name: &'static str,
        reason: String,
    },
}

// ── Categories ────────────────────────────────────────────────────────────────

/// The four fixed request categories (the wire `type` field).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Keyboard,
    Mouse,
    System,
    Text,
}

impl Category {
    /// Parses the wire tag of a category.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "keyboard" => Some(Category::Keyboard),
            "mouse" => Some(Category::Mouse),
            "system" => Some(Category::System),
            "text" => Some(Category::Text),
            _ => None,
        }
    }

    /// Returns the wire tag of the category.
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Keyboard => "keyboard",
            Category::Mouse => "mouse",
            Category::System => "system",
            Category::Text => "text",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Request types ─────────────────────────────────────────────────────────────

/// One decoded, validated inbound request.
///
/// Constructed by [`decode_request`], consumed by exactly one dispatch call.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionRequest {
    Keyboard(KeyboardAction),
    Mouse(MouseAction),
    System(SystemAction),
    Text(TextAction),
}

/// `type = "keyboard"` operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyboardAction {
    /// Types `text` into the focused window.
    Type { text: String },
    /// Presses `keys` as a chord, in the given order.
    Hotkey { keys: Vec<String> },
    /// Presses and releases one key.
    Press { key: String },
}

/// `type = "mouse"` operations.
#[derive(Debug, Clone, PartialEq)]
pub enum MouseAction {
    Move { to: Point },
    Click { button: MouseButton, clicks: u32 },
    Drag { from: Point, to: Point, duration: Duration },
    Scroll { amount: i32 },
}

/// `type = "system"` operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SystemAction {
    GetScreenSize,
    GetMousePosition,
    /// Captures the screen; `save_path` overrides the generated destination.
    CaptureScreen { save_path: Option<String> },
}

/// `type = "text"` operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextAction {
    /// Select-all, copy, then read the clipboard.
    Copy,
    /// Write `text` to the clipboard, then inject the paste shortcut.
    Paste { text: String },
}

impl ActionRequest {
    /// Returns the request's category.
    pub fn category(&self) -> Category {
        match self {
            ActionRequest::Keyboard(_) => Category::Keyboard,
            ActionRequest::Mouse(_) => Category::Mouse,
            ActionRequest::System(_) => Category::System,
            ActionRequest::Text(_) => Category::Text,
        }
    }

    /// Returns the wire name of the operation (the `action` field).
    pub fn operation(&self) -> &'static str {
        match self {
            ActionRequest::Keyboard(KeyboardAction::Type { .. }) => "type",
            ActionRequest::Keyboard(KeyboardAction::Hotkey { .. }) => "hotkey",
            ActionRequest::Keyboard(KeyboardAction::Press { .. }) => "press",
            ActionRequest::Mouse(MouseAction::Move { .. }) => "move",
            ActionRequest::Mouse(MouseAction::Click { .. }) => "click",
            ActionRequest::Mouse(MouseAction::Drag { .. }) => "drag",
            ActionRequest::Mouse(MouseAction::Scroll { .. }) => "scroll",
            ActionRequest::System(SystemAction::GetScreenSize) => "get_screen_size",
            ActionRequest::System(SystemAction::GetMousePosition) => "get_mouse_position",
            ActionRequest::System(SystemAction::CaptureScreen { .. }) => "capture_screen",
            ActionRequest::Text(TextAction::Copy) => "copy",
            ActionRequest::Text(TextAction::Paste { .. }) => "paste",
        }
    }
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Decodes one inbound text frame into an [`ActionRequest`].
///
/// # Errors
///
/// Returns [`ProtocolError`] if the frame is not a JSON object, names an
/// unknown category or operation, or carries missing/invalid parameters.
///
/// # Examples
///
/// ```rust
/// use deskctl_core::protocol::request::{decode_request, ActionRequest, MouseAction};
/// use deskctl_core::Point;
///
/// let req = decode_request(r#"{"type":"mouse","action":"move","x":10,"y":20}"#).unwrap();
/// assert_eq!(req, ActionRequest::Mouse(MouseAction::Move { to: Point::new(10, 20) }));
/// ```
pub fn decode_request(raw: &str) -> Result<ActionRequest, ProtocolError> {
    let value: Value = serde_json::from_str(raw).map_err(|_| ProtocolError::InvalidJson)?;
    match value {
        Value::Object(fields) => decode_fields(&fields),
        _ => Err(ProtocolError::NotAnObject),
    }
}

fn decode_fields(fields: &Map<String, Value>) -> Result<ActionRequest, ProtocolError> {
    let category = fields
        .get("type")
        .and_then(Value::as_str)
        .and_then(Category::from_tag)
        .ok_or(ProtocolError::UnknownCategory)?;

    let operation = fields.get("action").and_then(Value::as_str).unwrap_or("");
    let unknown = || ProtocolError::UnknownOperation {
        category,
        operation: operation.to_string(),
    };

    let decoded = match category {
        Category::Keyboard => {
            decode_keyboard(fields, operation).map(|r| r.map(ActionRequest::Keyboard))
        }
        Category::Mouse => decode_mouse(fields, operation).map(|r| r.map(ActionRequest::Mouse)),
        Category::System => {
            decode_system(fields, operation).map(|r| r.map(ActionRequest::System))
        }
        Category::Text => decode_text(fields, operation).map(|r| r.map(ActionRequest::Text)),
    };
    decoded.unwrap_or_else(|| Err(unknown()))
}

// ── Per-category decoders ─────────────────────────────────────────────────────
//
// Each returns `None` for an unknown operation and `Some(result)` otherwise,
// so the caller can build the UnknownOperation error in one place.

fn decode_keyboard(
    fields: &Map<String, Value>,
    operation: &str,
) -> Option<Result<KeyboardAction, ProtocolError>> {
    let decoded = match operation {
        "type" => {
            let p = Params::new(fields, "type");
            p.string("text").map(|text| KeyboardAction::Type { text })
        }
        "hotkey" => {
            let p = Params::new(fields, "hotkey");
            p.key_list("keys").map(|keys| KeyboardAction::Hotkey { keys })
        }
        "press" => {
            let p = Params::new(fields, "press");
            p.key_name("key").map(|key| KeyboardAction::Press { key })
        }
        _ => return None,
    };
    Some(decoded)
}

fn decode_mouse(
    fields: &Map<String, Value>,
    operation: &str,
) -> Option<Result<MouseAction, ProtocolError>> {
    let decoded = match operation {
        "move" => {
            let p = Params::new(fields, "move");
            p.point("x", "y").map(|to| MouseAction::Move { to })
        }
        "click" => decode_click(&Params::new(fields, "click")),
        "drag" => decode_drag(&Params::new(fields, "drag")),
        "scroll" => {
            let p = Params::new(fields, "scroll");
            p.integer("amount").map(|amount| MouseAction::Scroll { amount })
        }
        _ => return None,
    };
    Some(decoded)
}

fn decode_click(p: &Params<'_>) -> Result<MouseAction, ProtocolError> {
    Ok(MouseAction::Click {
        button: p.button("button")?,
        clicks: p.count("clicks")?,
    })
}

fn decode_drag(p: &Params<'_>) -> Result<MouseAction, ProtocolError> {
    Ok(MouseAction::Drag {
        from: p.point("start_x", "start_y")?,
        to: p.point("end_x", "end_y")?,
        duration: p.seconds("duration")?,
    })
}

fn decode_system(
    fields: &Map<String, Value>,
    operation: &str,
) -> Option<Result<SystemAction, ProtocolError>> {
    let decoded = match operation {
        "get_screen_size" => Ok(SystemAction::GetScreenSize),
        "get_mouse_position" => Ok(SystemAction::GetMousePosition),
        "capture_screen" => {
            let p = Params::new(fields, "capture_screen");
            p.optional_string("save_path")
                .map(|save_path| SystemAction::CaptureScreen { save_path })
        }
        _ => return None,
    };
    Some(decoded)
}

fn decode_text(
    fields: &Map<String, Value>,
    operation: &str,
) -> Option<Result<TextAction, ProtocolError>> {
    let decoded = match operation {
        "copy" => Ok(TextAction::Copy),
        "paste" => {
            let p = Params::new(fields, "paste");
            p.string("text").map(|text| TextAction::Paste { text })
        }
        _ => return None,
    };
    Some(decoded)
}

// ── Parameter readers ─────────────────────────────────────────────────────────

/// Typed view over the request object for one operation.
///
/// A `null` value is treated the same as an absent key.
struct Params<'a> {
    fields: &'a Map<String, Value>,
    operation: &'static str,
}

impl<'a> Params<'a> {
    fn new(fields: &'a Map<String, Value>, operation: &'static str) -> Self {
        Self { fields, operation }
    }

    fn get(&self, name: &str) -> Option<&'a Value> {
        self.fields.get(name).filter(|v| !v.is_null())
    }

    fn require(&self, name: &'static str) -> Result<&'a Value, ProtocolError> {
        self.get(name).ok_or(ProtocolError::MissingParameter {
            operation: self.operation,
            name,
        })
    }

    fn invalid(&self, name: &'static str, reason: impl Into<String>) -> ProtocolError {
        ProtocolError::InvalidParameter {
            operation: self.operation,
            name,
            reason: reason.into(),
        }
    }

    fn string(&self, name: &'static str) -> Result<String, ProtocolError> {
        self.require(name)?
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| self.invalid(name, "expected a string"))
    }

    fn optional_string(&self, name: &'static str) -> Result<Option<String>, ProtocolError> {
        match self.get(name) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(_) => Err(self.invalid(name, "expected a string")),
        }
    }

    fn key_name(&self, name: &'static str) -> Result<String, ProtocolError> {
        let key = self.string(name)?;
        if key.is_empty() {
            return Err(self.invalid(name, "key name must not be empty"));
        }
        Ok(key)
    }

    fn key_list(&self, name: &'static str) -> Result<Vec<String>, ProtocolError> {
        let items = self
            .require(name)?
            .as_array()
            .ok_or_else(|| self.invalid(name, "expected an array of key names"))?;
        if items.is_empty() {
            return Err(self.invalid(name, "at least one key is required"));
        }
        items
            .iter()
            .map(|item| match item.as_str() {
                Some(key) if !key.is_empty() => Ok(key.to_string()),
                _ => Err(self.invalid(name, "every key must be a non-empty string")),
            })
            .collect()
    }

    /// Reads a screen coordinate.  Floats are rounded to the nearest pixel.
    fn coordinate(&self, name: &'static str) -> Result<i32, ProtocolError> {
        let number = match self.require(name)? {
            Value::Number(n) => n.as_f64(),
            _ => None,
        }
        .ok_or_else(|| self.invalid(name, "expected a number"))?;

        let rounded = number.round();
        if !(f64::from(i32::MIN)..=f64::from(i32::MAX)).contains(&rounded) {
            return Err(self.invalid(name, format!("{number} is out of range")));
        }
        Ok(rounded as i32)
    }

    fn point(&self, x: &'static str, y: &'static str) -> Result<Point, ProtocolError> {
        Ok(Point::new(self.coordinate(x)?, self.coordinate(y)?))
    }

    fn integer(&self, name: &'static str) -> Result<i32, ProtocolError> {
        let value = self
            .require(name)?
            .as_i64()
            .ok_or_else(|| self.invalid(name, "expected an integer"))?;
        i32::try_from(value).map_err(|_| self.invalid(name, format!("{value} is out of range")))
    }

    fn button(&self, name: &'static str) -> Result<MouseButton, ProtocolError> {
        match self.get(name) {
            None => Ok(DEFAULT_CLICK_BUTTON),
            Some(value) => value
                .as_str()
                .and_then(MouseButton::from_name)
                .ok_or_else(|| self.invalid(name, "expected one of \"left\", \"right\", \"middle\"")),
        }
    }

    fn count(&self, name: &'static str) -> Result<u32, ProtocolError> {
        match self.get(name) {
            None => Ok(DEFAULT_CLICK_COUNT),
            Some(value) => value
                .as_u64()
                .filter(|n| *n >= 1)
                .and_then(|n| u32::try_from(n).ok())
                .ok_or_else(|| self.invalid(name, "expected a positive integer")),
        }
    }

    fn seconds(&self, name: &'static str) -> Result<Duration, ProtocolError> {
        let Some(value) = self.get(name) else {
            return Ok(DEFAULT_DRAG_DURATION);
        };
        let secs = value
            .as_f64()
            .filter(|secs| *secs >= 0.0)
            .ok_or_else(|| self.invalid(name, "expected a non-negative number of seconds"))?;
        if secs > MAX_DRAG_DURATION.as_secs_f64() {
            return Err(self.invalid(
                name,
                format!("at most {} seconds", MAX_DRAG_DURATION.as_secs()),
            ));
        }
        Ok(Duration::from_secs_f64(secs))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
