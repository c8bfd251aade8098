//! The uniform response envelope.
//!
//! Every inbound message produces exactly one envelope, in receipt order:
//!
//! ```json
//! {"status":"success","action":"get_mouse_position","x":10,"y":20}
//! {"status":"error","message":"Unknown action type"}
//! ```
//!
//! Success envelopes carry the operation name in `action` plus whatever
//! result fields that operation promises.  Error envelopes carry a
//! human-readable `message` and no `action`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Outcome discriminant of an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

/// One outbound reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub status: Status,

    /// Operation name; present on success envelopes only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,

    /// Operation-specific result fields, flattened into the top-level object.
    #[serde(flatten)]
    pub fields: Map<String, Value>,

    /// Error description; present on error envelopes only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ResponseEnvelope {
    /// Starts a success envelope for `action` with no result fields.
    pub fn success(action: &str) -> Self {
        Self {
            status: Status::Success,
            action: Some(action.to_string()),
            fields: Map::new(),
            message: None,
        }
    }

    /// Builds an error envelope.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            action: None,
            fields: Map::new(),
            message: Some(message.into()),
        }
    }

    /// Adds one result field (builder style).
    ///
    /// `action`, `status` and `message` are reserved and must not be used as
    /// field names.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        debug_assert!(
            !matches!(key, "status" | "action" | "message"),
            "reserved envelope key: {key}"
        );
        self.fields.insert(key.to_string(), value.into());
        self
    }

    /// Returns `true` for a success envelope.
    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    /// Looks up a result field.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Serializes the envelope to its wire text.
    ///
    /// # Errors
    ///
    /// Returns the serializer's error; with string keys and JSON values this
    /// does not happen in practice.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
