//! Push payload decoding.
//!
//! The push service delivers opaque bytes. The app sends a JSON object
//! with an optional `type` and free-form fields; anything else is treated
//! as if no payload had been sent.

use serde_json::{Map, Value};
use tracing::warn;

/// A decoded push payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PushPayload {
    fields: Map<String, Value>,
}

impl PushPayload {
    /// Decode raw push data. Absent, empty or malformed data yields `None`.
    pub fn decode(data: Option<&[u8]>) -> Option<Self> {
        let data = data.filter(|d| !d.iter().all(u8::is_ascii_whitespace))?;
        match serde_json::from_slice::<Map<String, Value>>(data) {
            Ok(fields) => Some(Self { fields }),
            Err(e) => {
                warn!(error = %e, len = data.len(), "Ignoring malformed push payload");
                None
            }
        }
    }

    pub fn from_fields(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// The `type` discriminant, if it is a string.
    pub fn kind(&self) -> Option<&str> {
        self.fields.get("type").and_then(Value::as_str)
    }

    /// A field rendered as display text.
    ///
    /// Strings and numbers qualify; blank strings, `null`, booleans and
    /// nested values do not.
    pub fn text(&self, field: &str) -> Option<String> {
        match self.fields.get(field)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}
