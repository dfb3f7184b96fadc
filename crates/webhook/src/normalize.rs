//! Flatten an [`InboundMessage`] into one text string plus ordered media.

use {
    base64::{Engine as _, engine::general_purpose::STANDARD},
    hookrelay_media::fetch::parse_data_url,
    serde_json::{Map, Value},
    tracing::debug,
};

use crate::inbound::{InboundContent, InboundMessage};

/// A media item found in an inbound message, not yet resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractedMedia {
    Remote { url: String },
    /// Base64 payload.
    Inline { data: String, media_type: Option<String> },
}

impl ExtractedMedia {
    /// Label for logs and metrics.
    #[must_use]
    pub fn source(&self) -> &'static str {
        match self {
            Self::Remote { .. } => "remote",
            Self::Inline { .. } => "inline",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CanonicalContent {
    pub text: String,
    pub media: Vec<ExtractedMedia>,
}

impl CanonicalContent {
    /// Messages whose trimmed text is empty are dropped, even when they carry
    /// media.
    #[must_use]
    pub fn is_actionable(&self) -> bool {
        !self.text.is_empty()
    }
}

/// Normalize `msg`.
///
/// System entries are prepended as `[System: …]` separated by a blank line,
/// so the last one processed ends up first. User text is appended in order,
/// one entry per line; assistant text is appended as `[Assistant: …]`; tool
/// entries are ignored. `mediaUrl` goes after any media found in parts.
#[must_use]
pub fn normalize(msg: &InboundMessage) -> CanonicalContent {
    let mut out = CanonicalContent::default();

    match &msg.content {
        InboundContent::Text(text) => out.text = text.trim().to_string(),
        InboundContent::Messages(entries) => {
            let mut folded = Folded::default();
            for (index, entry) in entries.iter().enumerate() {
                folded.entry(index, entry, &mut out.media);
            }
            out.text = folded.into_text();
        },
    }

    if let Some(url) = &msg.media_url
        && let Some(media) = media_from_reference(url, None)
    {
        out.media.push(media);
    }
    out
}

#[derive(Default)]
struct Folded {
    /// Tagged system entries, most recent first.
    system: Vec<String>,
    body: String,
}

impl Folded {
    fn entry(&mut self, index: usize, entry: &Value, media: &mut Vec<ExtractedMedia>) {
        let Some(obj) = entry.as_object() else {
            debug!(index, "skipping non-object message entry");
            return;
        };
        let Some(role) = obj.get("role").and_then(Value::as_str) else {
            debug!(index, "skipping message entry without role");
            return;
        };
        let content = obj.get("content").unwrap_or(&Value::Null);

        match role {
            "system" => {
                let body = plain_text(content);
                if !body.is_empty() {
                    self.system.insert(0, format!("[System: {body}]"));
                }
            },
            "user" => match content {
                Value::String(s) => append_line(&mut self.body, s),
                Value::Array(parts) => {
                    for part in parts {
                        fold_user_part(part, &mut self.body, media);
                    }
                },
                _ => debug!(index, "skipping user entry with unsupported content"),
            },
            "assistant" => {
                let body = plain_text(content);
                if !body.is_empty() {
                    append_line(&mut self.body, &format!("[Assistant: {body}]"));
                }
            },
            "tool" => {},
            other => debug!(index, role = other, "skipping message entry with unknown role"),
        }
    }

    fn into_text(self) -> String {
        let mut sections = self.system;
        let body = self.body.trim();
        if !body.is_empty() {
            sections.push(body.to_string());
        }
        sections.join("\n\n").trim().to_string()
    }
}

fn fold_user_part(part: &Value, text: &mut String, media: &mut Vec<ExtractedMedia>) {
    let Some(obj) = part.as_object() else {
        if let Some(s) = part.as_str() {
            append_line(text, s);
        }
        return;
    };
    let declared = declared_type(obj);
    match obj.get("type").and_then(Value::as_str) {
        Some("text") => {
            if let Some(s) = obj.get("text").and_then(Value::as_str) {
                append_line(text, s);
            }
        },
        Some("image") => {
            if let Some(m) = obj.get("image").and_then(|v| classify_media_data(v, declared)) {
                media.push(m);
            }
        },
        Some("file") => {
            if let Some(m) = obj.get("data").and_then(|v| classify_media_data(v, declared)) {
                media.push(m);
            }
        },
        other => debug!(part_type = ?other, "skipping unsupported content part"),
    }
}

fn declared_type(obj: &Map<String, Value>) -> Option<&str> {
    obj.get("mediaType")
        .or_else(|| obj.get("mimeType"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Text of a system or assistant entry: a string, or its text parts joined
/// by newlines.
fn plain_text(content: &Value) -> String {
    match content {
        Value::String(s) => s.trim().to_string(),
        Value::Array(parts) => parts
            .iter()
            .filter_map(|p| match p {
                Value::String(s) => Some(s.as_str()),
                Value::Object(o) if o.get("type").and_then(Value::as_str) == Some("text") => {
                    o.get("text").and_then(Value::as_str)
                },
                _ => None,
            })
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}

fn append_line(text: &mut String, line: &str) {
    if line.trim().is_empty() {
        return;
    }
    if !text.is_empty() {
        text.push('\n');
    }
    text.push_str(line);
}

/// Classify the data carried by an image or file part.
///
/// Objects with a `url`/`href` and `http(s)` strings are remote; `data:` URLs
/// and other strings are inline base64; byte arrays (plain or Node-style
/// `{"type":"Buffer","data":[…]}`) are encoded to base64.
#[must_use]
pub fn classify_media_data(value: &Value, declared: Option<&str>) -> Option<ExtractedMedia> {
    match value {
        Value::String(s) => media_from_reference(s, declared),
        Value::Object(obj) => {
            if let Some(url) = obj
                .get("url")
                .or_else(|| obj.get("href"))
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|u| !u.is_empty())
            {
                return Some(ExtractedMedia::Remote { url: url.to_string() });
            }
            if obj.get("type").and_then(Value::as_str) == Some("Buffer") {
                return obj.get("data").and_then(|d| bytes_to_inline(d, declared));
            }
            None
        },
        Value::Array(_) => bytes_to_inline(value, declared),
        _ => None,
    }
}

fn media_from_reference(reference: &str, declared: Option<&str>) -> Option<ExtractedMedia> {
    let reference = reference.trim();
    if reference.is_empty() {
        return None;
    }
    if reference.starts_with("http://") || reference.starts_with("https://") {
        return Some(ExtractedMedia::Remote {
            url: reference.to_string(),
        });
    }
    if reference.starts_with("data:") {
        let Some((media_type, payload)) = parse_data_url(reference) else {
            debug!("skipping data: URL without base64 payload");
            return None;
        };
        return Some(ExtractedMedia::Inline {
            data: payload.to_string(),
            media_type: media_type.or_else(|| declared.map(str::to_string)),
        });
    }
    if declared.is_none() && reference.contains("://") {
        return Some(ExtractedMedia::Remote {
            url: reference.to_string(),
        });
    }
    Some(ExtractedMedia::Inline {
        data: reference.to_string(),
        media_type: declared.map(str::to_string),
    })
}

fn bytes_to_inline(value: &Value, declared: Option<&str>) -> Option<ExtractedMedia> {
    let bytes = value
        .as_array()?
        .iter()
        .map(|b| b.as_u64().and_then(|n| u8::try_from(n).ok()))
        .collect::<Option<Vec<u8>>>()?;
    if bytes.is_empty() {
        return None;
    }
    Some(ExtractedMedia::Inline {
        data: STANDARD.encode(bytes),
        media_type: declared.map(str::to_string),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {super::*, serde_json::json};

    fn message(content: InboundContent, media_url: Option<&str>) -> InboundMessage {
        InboundMessage {
            from: "alice".into(),
            from_name: None,
            content,
            media_url: media_url.map(str::to_string),
            message_id: None,
            timestamp: None,
        }
    }

    fn messages(entries: Value) -> InboundMessage {
        let Value::Array(entries) = entries else {
            panic!("expected array");
        };
        message(InboundContent::Messages(entries), None)
    }

    #[test]
    fn flat_text_is_trimmed_and_media_url_kept() {
        let out = normalize(&message(
            InboundContent::Text("  hello \n".into()),
            Some("https://cdn/x.png"),
        ));
        assert_eq!(out.text, "hello");
        assert_eq!(out.media, vec![ExtractedMedia::Remote {
            url: "https://cdn/x.png".into()
        }]);
    }

    #[test]
    fn system_entries_are_prepended_last_first() {
        let out = normalize(&messages(json!([
            { "role": "system", "content": "one" },
            { "role": "user", "content": "hello" },
            { "role": "system", "content": "two" },
            { "role": "user", "content": "again" }
        ])));
        assert_eq!(out.text, "[System: two]\n\n[System: one]\n\nhello\nagain");
    }

    #[test]
    fn assistant_is_bracketed_and_tool_dropped() {
        let out = normalize(&messages(json!([
            { "role": "user", "content": "q" },
            { "role": "assistant", "content": [{ "type": "text", "text": "a" }] },
            { "role": "tool", "content": "secret tool output" },
            { "role": "wizard", "content": "nope" },
            "garbage",
            { "content": "no role" }
        ])));
        assert_eq!(out.text, "q\n[Assistant: a]");
    }

    #[test]
    fn user_parts_split_into_text_and_media() {
        let out = normalize(&messages(json!([{
            "role": "user",
            "content": [
                { "type": "text", "text": "look" },
                { "type": "image", "image": "https://cdn/a.jpg" },
                { "type": "image", "image": "data:image/png;base64,iVBORw0KGgo=" },
                { "type": "file", "data": "JVBERi0=", "mediaType": "application/pdf" },
                { "type": "image", "image": { "url": "https://cdn/b.gif" } },
                { "type": "file", "data": [1, 2, 3], "mimeType": "application/octet-stream" },
                { "type": "file", "data": { "type": "Buffer", "data": [255] } },
                { "type": "image", "image": 42 },
                { "type": "text", "text": "twice" }
            ]
        }])));
        assert_eq!(out.text, "look\ntwice");
        assert_eq!(out.media, vec![
            ExtractedMedia::Remote {
                url: "https://cdn/a.jpg".into()
            },
            ExtractedMedia::Inline {
                data: "iVBORw0KGgo=".into(),
                media_type: Some("image/png".into())
            },
            ExtractedMedia::Inline {
                data: "JVBERi0=".into(),
                media_type: Some("application/pdf".into())
            },
            ExtractedMedia::Remote {
                url: "https://cdn/b.gif".into()
            },
            ExtractedMedia::Inline {
                data: "AQID".into(),
                media_type: Some("application/octet-stream".into())
            },
            ExtractedMedia::Inline {
                data: "/w==".into(),
                media_type: None
            },
        ]);
    }

    #[test]
    fn media_url_follows_part_media() {
        let mut msg = messages(json!([{
            "role": "user",
            "content": [{ "type": "image", "image": "https://cdn/first.png" }]
        }]));
        msg.media_url = Some("https://cdn/last.png".into());
        let out = normalize(&msg);
        assert_eq!(out.media.len(), 2);
        assert_eq!(out.media[1], ExtractedMedia::Remote {
            url: "https://cdn/last.png".into()
        });
        assert!(out.text.is_empty());
        assert!(!out.is_actionable());
    }

    #[test]
    fn tool_only_conversation_is_not_actionable() {
        let out = normalize(&messages(json!([{ "role": "tool", "content": "x" }])));
        assert!(!out.is_actionable());
    }

    #[test]
    fn bare_string_is_raw_base64_without_type() {
        assert_eq!(
            classify_media_data(&json!("AAAA"), None),
            Some(ExtractedMedia::Inline {
                data: "AAAA".into(),
                media_type: None
            })
        );
    }

    #[test]
    fn string_references_by_scheme() {
        assert_eq!(
            classify_media_data(&json!("https://x/y.jpg"), None),
            Some(ExtractedMedia::Remote {
                url: "https://x/y.jpg".into()
            })
        );
        assert_eq!(
            classify_media_data(&json!("data:image/png;base64,AAAA"), None),
            Some(ExtractedMedia::Inline {
                data: "AAAA".into(),
                media_type: Some("image/png".into())
            })
        );
        assert_eq!(
            classify_media_data(&json!("data:image/png;base64,AAAA"), Some("image/jpeg")),
            Some(ExtractedMedia::Inline {
                data: "AAAA".into(),
                media_type: Some("image/png".into())
            })
        );
    }

    #[test]
    fn other_schemes_depend_on_declared_type() {
        assert_eq!(
            classify_media_data(&json!("s3://bucket/key.png"), None),
            Some(ExtractedMedia::Remote {
                url: "s3://bucket/key.png".into()
            })
        );
        assert_eq!(
            classify_media_data(&json!("s3://bucket/key.png"), Some("image/png")),
            Some(ExtractedMedia::Inline {
                data: "s3://bucket/key.png".into(),
                media_type: Some("image/png".into())
            })
        );
    }

    #[test]
    fn invalid_byte_arrays_are_skipped() {
        assert_eq!(classify_media_data(&json!([1, 300]), None), None);
        assert_eq!(classify_media_data(&json!([]), None), None);
        assert_eq!(classify_media_data(&json!({ "foo": 1 }), None), None);
        assert_eq!(classify_media_data(&json!(null), None), None);
    }
}
