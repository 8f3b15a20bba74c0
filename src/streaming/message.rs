//! Streaming wire messages.
//!
//! # Inbound dispatch table
//!
//! | `type`     | Maps to                       | Payload field |
//! |------------|-------------------------------|---------------|
//! | `frame`    | [`InboundMessage::Frame`]     | `frame`       |
//! | `audio`    | [`InboundMessage::Audio`]     | `audio`       |
//! | `status`   | [`InboundMessage::Status`]    | `status`      |
//! | *(other)*  | [`InboundMessage::Other`]     | n/a           |
//!
//! A missing payload field is delivered as `null`.

use serde::Serialize;
use serde_json::Value;

use crate::{AppError, Result};

/// Control messages sent to the streaming endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    /// Ask the simulator to begin streaming in `format`.
    StartStreaming {
        /// Declared stream format.
        format: String,
    },
    /// Ask the simulator to stop streaming.
    StopStreaming,
}

/// Decoded inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Video frame payload.
    Frame(Value),
    /// Audio chunk payload.
    Audio(Value),
    /// Remote status update.
    Status(Value),
    /// Any other tag; `None` when the message has no usable `type`.
    Other(Option<String>),
}

/// Decode one inbound text message.
///
/// # Errors
///
/// Returns [`AppError::Streaming`] when the text is not JSON or is not a
/// JSON object.
pub fn parse_inbound(text: &str) -> Result<InboundMessage> {
    let value: Value = serde_json::from_str(text)
        .map_err(|err| AppError::Streaming(format!("malformed json: {err}")))?;

    let Value::Object(mut fields) = value else {
        return Err(AppError::Streaming(
            "malformed message: expected a json object".into(),
        ));
    };

    let tag = match fields.get("type") {
        Some(Value::String(tag)) => tag.clone(),
        Some(Value::Null) | None => return Ok(InboundMessage::Other(None)),
        Some(other) => return Ok(InboundMessage::Other(Some(other.to_string()))),
    };

    let mut payload = |field: &str| fields.remove(field).unwrap_or(Value::Null);
    Ok(match tag.as_str() {
        "frame" => InboundMessage::Frame(payload("frame")),
        "audio" => InboundMessage::Audio(payload("audio")),
        "status" => InboundMessage::Status(payload("status")),
        other => InboundMessage::Other(Some(other.to_owned())),
    })
}
