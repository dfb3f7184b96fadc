//! Seams between a channel and the conversational backend.

use std::sync::Arc;

use {
    async_trait::async_trait,
    hookrelay_common::types::ReplyPayload,
    serde::{Deserialize, Serialize},
};

/// Normalized, routing-enriched inbound message handed to the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundContext {
    /// Envelope-formatted text shown to the model.
    pub body: String,
    /// Canonical text without the envelope.
    pub raw_body: String,
    /// Text used for slash-command detection.
    pub command_body: String,
    /// `<channel>:<sender>`.
    pub from: String,
    /// `<channel>:<account>`.
    pub to: String,
    pub session_key: String,
    pub agent_id: String,
    pub account_id: String,
    pub channel: String,
    pub sender_id: String,
    pub sender_name: Option<String>,
    pub message_id: Option<String>,
    /// Epoch millis supplied by the sender, or receipt time.
    pub timestamp: i64,
    /// First saved media file, if any.
    pub media_path: Option<String>,
    pub media_type: Option<String>,
    /// All saved media, in inbound order. Parallel to `media_types`.
    pub media_paths: Vec<String>,
    pub media_types: Vec<String>,
    pub command_authorized: bool,
}

/// What part of a reply a payload is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyKind {
    Tool,
    Block,
    Final,
}

impl ReplyKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tool => "tool",
            Self::Block => "block",
            Self::Final => "final",
        }
    }
}

/// Receives reply payloads produced by the backend for one inbound message.
#[async_trait]
pub trait ReplySink: Send + Sync {
    async fn deliver(&self, payload: ReplyPayload, kind: ReplyKind) -> anyhow::Result<()>;

    /// Called when `deliver` fails. Implementations log; they do not retry.
    fn on_error(&self, error: &anyhow::Error, kind: ReplyKind);
}

/// The conversational backend, seen from a channel.
#[async_trait]
pub trait ReplyDispatcher: Send + Sync {
    /// Process one inbound message, calling `sink.deliver` for each reply block.
    async fn dispatch(&self, ctx: InboundContext, sink: Arc<dyn ReplySink>) -> anyhow::Result<()>;

    /// Whether `body` is a control command that needs sender authorization.
    fn needs_command_authorization(&self, _body: &str) -> bool {
        false
    }
}
