//! Uniform control-plane result value.

use serde::Serialize;
use serde_json::{json, Value};

/// Decoded control-plane payload, or an error-shaped `{"error": reason}`.
///
/// Protocol failures (non-200 status) and transport failures are reported
/// the same way, so callers only branch on [`is_error`](Self::is_error).
/// A successful response whose body itself carries an `error` key is an
/// error too.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ControlReply(Value);

impl ControlReply {
    /// Wrap a decoded response body.
    #[must_use]
    pub fn payload(value: Value) -> Self {
        Self(value)
    }

    /// Build an error-shaped reply.
    #[must_use]
    pub fn error(reason: impl Into<String>) -> Self {
        Self(json!({ "error": reason.into() }))
    }

    /// `true` when the reply carries an `error` key.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.0.get("error").is_some()
    }

    /// Human-readable error reason, if any.
    ///
    /// Non-string `error` values are rendered as compact JSON.
    #[must_use]
    pub fn error_reason(&self) -> Option<String> {
        self.0.get("error").map(|value| match value {
            Value::String(reason) => reason.clone(),
            other => other.to_string(),
        })
    }

    /// Borrow the underlying JSON value.
    #[must_use]
    pub fn value(&self) -> &Value {
        &self.0
    }

    /// Consume the reply and return the underlying JSON value.
    #[must_use]
    pub fn into_value(self) -> Value {
        self.0
    }

    /// Convert into a `Result`, splitting off the error reason.
    ///
    /// # Errors
    ///
    /// Returns the error reason when the reply is error-shaped.
    pub fn into_result(self) -> std::result::Result<Value, String> {
        match self.error_reason() {
            Some(reason) => Err(reason),
            None => Ok(self.0),
        }
    }
}

impl From<ControlReply> for Value {
    fn from(reply: ControlReply) -> Self {
        reply.0
    }
}
