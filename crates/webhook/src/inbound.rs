//! Wire format of inbound webhook requests.
//!
//! The body is decoded once at the boundary into [`InboundMessage`]; content
//! is either flat text or an ordered list of role-tagged entries.

use serde_json::Value;

/// Decoded inbound request.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    /// Sender id, trimmed and non-empty.
    pub from: String,
    pub from_name: Option<String>,
    pub content: InboundContent,
    pub media_url: Option<String>,
    pub message_id: Option<String>,
    /// Epoch millis supplied by the sender.
    pub timestamp: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InboundContent {
    Text(String),
    /// Role-tagged entries, undecoded. Entries that do not look like
    /// messages are skipped during normalization.
    Messages(Vec<Value>),
}

impl InboundMessage {
    /// Display name for envelopes: `fromName` when set, else the sender id.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.from_name.as_deref().unwrap_or(&self.from)
    }
}

/// Why a request body was refused. Every variant maps to HTTP 400.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("empty body")]
    EmptyBody,
    #[error("invalid JSON")]
    InvalidJson,
    #[error("body must be a JSON object")]
    NotAnObject,
    #[error("missing 'from'")]
    MissingFrom,
    #[error("missing 'text' or 'messages'")]
    MissingContent,
}

/// Decode and shape-check a request body.
///
/// When both a non-empty `messages` array and non-empty `text` are present,
/// `messages` wins.
pub fn decode_inbound(body: &[u8]) -> Result<InboundMessage, Rejection> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(Rejection::EmptyBody);
    }
    let value: Value = serde_json::from_slice(body).map_err(|_| Rejection::InvalidJson)?;
    let Value::Object(obj) = value else {
        return Err(Rejection::NotAnObject);
    };

    let from = obj
        .get("from")
        .and_then(scalar_string)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or(Rejection::MissingFrom)?;

    let messages = obj
        .get("messages")
        .and_then(Value::as_array)
        .filter(|m| !m.is_empty());
    let text = obj
        .get("text")
        .and_then(Value::as_str)
        .filter(|t| !t.trim().is_empty());

    let content = match (messages, text) {
        (Some(messages), _) => InboundContent::Messages(messages.clone()),
        (None, Some(text)) => InboundContent::Text(text.to_string()),
        (None, None) => return Err(Rejection::MissingContent),
    };

    Ok(InboundMessage {
        from,
        from_name: non_empty_str(obj.get("fromName")),
        content,
        media_url: non_empty_str(obj.get("mediaUrl")),
        message_id: obj
            .get("messageId")
            .and_then(scalar_string)
            .filter(|s| !s.is_empty()),
        timestamp: obj.get("timestamp").and_then(|v| {
            v.as_i64()
                .or_else(|| v.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
        }),
    })
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Strings as-is, numbers rendered; other types are not ids.
fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
