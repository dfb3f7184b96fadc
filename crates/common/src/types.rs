use serde::{Deserialize, Serialize};

/// A media reference attached to a reply.
///
/// `url` is either a remote `http(s)://` URL, a `file://` URL, or a local
/// filesystem path produced by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaAttachment {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl MediaAttachment {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            mime_type: None,
        }
    }
}

/// One block of a backend reply, handed to a channel for delivery.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyPayload {
    /// Reply text. Empty means "no text".
    #[serde(default)]
    pub text: String,
    /// Ordered media references.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub media: Vec<MediaAttachment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_id: Option<String>,
}

impl ReplyPayload {
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn has_text(&self) -> bool {
        !self.text.trim().is_empty()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.has_text() && self.media.is_empty()
    }
}

/// Current wall-clock time in epoch milliseconds.
#[must_use]
pub fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_text_counts_as_empty() {
        let payload = ReplyPayload::text("  \n ");
        assert!(!payload.has_text());
        assert!(payload.is_empty());
    }

    #[test]
    fn media_only_payload_is_not_empty() {
        let payload = ReplyPayload {
            media: vec![MediaAttachment::new("https://x/y.png")],
            ..Default::default()
        };
        assert!(!payload.is_empty());
    }

    #[test]
    fn deserializes_without_optional_fields() {
        let payload: ReplyPayload = serde_json::from_str(r#"{"text":"hi"}"#).unwrap();
        assert_eq!(payload.text, "hi");
        assert!(payload.media.is_empty());
        assert!(payload.reply_to_id.is_none());
    }
}
