//! Collaborators the webhook channel needs, injected explicitly.

use std::{path::PathBuf, sync::Arc};

use {
    hookrelay_channels::{PairingStore, ReplyDispatcher},
    hookrelay_routing::AgentRouter,
    hookrelay_sessions::SessionStore,
    hookrelay_usage::{TokenUsageTracker, UsageEventBus},
};

use crate::{
    markdown::{MarkdownChunker, TextChunker},
    outbound::OutboundClient,
};

/// Everything an account's listener and pipeline use besides its config.
///
/// Cloning is cheap; all members are shared handles.
#[derive(Clone)]
pub struct WebhookRuntime {
    pub dispatcher: Arc<dyn ReplyDispatcher>,
    pub router: Arc<dyn AgentRouter>,
    pub sessions: Arc<dyn SessionStore>,
    pub pairing: Arc<dyn PairingStore>,
    pub usage: TokenUsageTracker,
    pub usage_bus: UsageEventBus,
    pub chunker: Arc<dyn TextChunker>,
    pub outbound: OutboundClient,
    /// Shared HTTP client for media downloads.
    pub http: reqwest::Client,
    /// Root for media files: `<data_dir>/media/webhook/<account>/inbound`.
    pub data_dir: PathBuf,
}

impl WebhookRuntime {
    /// Runtime with the default markdown chunker and a fresh HTTP client.
    pub fn new(
        dispatcher: Arc<dyn ReplyDispatcher>,
        router: Arc<dyn AgentRouter>,
        sessions: Arc<dyn SessionStore>,
        pairing: Arc<dyn PairingStore>,
        usage: TokenUsageTracker,
        usage_bus: UsageEventBus,
        data_dir: impl Into<PathBuf>,
    ) -> Self {
        let http = reqwest::Client::new();
        Self {
            dispatcher,
            router,
            sessions,
            pairing,
            usage,
            usage_bus,
            chunker: Arc::new(MarkdownChunker),
            outbound: OutboundClient::new(http.clone()),
            http,
            data_dir: data_dir.into(),
        }
    }

    #[must_use]
    pub fn with_chunker(mut self, chunker: Arc<dyn TextChunker>) -> Self {
        self.chunker = chunker;
        self
    }

    /// Directory inbound media for `account_id` is saved under.
    #[must_use]
    pub fn inbound_media_dir(&self, account_id: &str) -> PathBuf {
        let safe: String = account_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_') { c } else { '_' })
            .collect();
        self.data_dir
            .join("media")
            .join(crate::CHANNEL_ID)
            .join(safe)
            .join("inbound")
    }
}
