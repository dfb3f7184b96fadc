//! Fan a backend reply out into outbound calls.
//!
//! Media items go one call each, in order. The reply text rides as the
//! caption until it has been delivered once. A media item that cannot be
//! loaded or sent falls back to a text-only send (if the text is still
//! undelivered) and never stops later items. Text-only replies are chunked
//! and each chunk is sent independently.

use std::sync::Arc;

use {
    async_trait::async_trait,
    base64::{Engine as _, engine::general_purpose::STANDARD},
    hookrelay_channels::{ReplyKind, ReplySink},
    hookrelay_common::types::{MediaAttachment, ReplyPayload},
    hookrelay_usage::TokenUsageTracker,
    tracing::{debug, warn},
};

use crate::{
    config::WebhookAccountConfig,
    markdown::TextChunker,
    outbound::{OutboundClient, OutboundFile, OutboundMessage, SendError, SendReceipt},
    runtime::WebhookRuntime,
    state::ActivityClock,
};

/// Counts of outbound calls made for one reply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub sent: usize,
    pub failed: usize,
}

impl DeliveryReport {
    fn absorb(&mut self, other: Self) {
        self.sent += other.sent;
        self.failed += other.failed;
    }
}

/// Delivers replies to one recipient.
pub struct ReplyDelivery {
    client: OutboundClient,
    config: Arc<WebhookAccountConfig>,
    chunker: Arc<dyn TextChunker>,
    http: reqwest::Client,
    usage: TokenUsageTracker,
    activity: Arc<ActivityClock>,
    to: String,
}

impl ReplyDelivery {
    pub fn new(
        runtime: &WebhookRuntime,
        config: Arc<WebhookAccountConfig>,
        activity: Arc<ActivityClock>,
        to: impl Into<String>,
    ) -> Self {
        Self {
            client: runtime.outbound.clone(),
            config,
            chunker: Arc::clone(&runtime.chunker),
            http: runtime.http.clone(),
            usage: runtime.usage.clone(),
            activity,
            to: to.into(),
        }
    }

    fn message(&self, text: &str) -> OutboundMessage {
        let mut msg = OutboundMessage::text(self.to.clone(), text);
        if self.config.outbound.include_usage {
            let data = self.usage.get_data();
            msg.usage = Some(data.summary());
            msg.tokens = Some(data);
        }
        msg
    }

    async fn send(&self, msg: &OutboundMessage) -> Result<SendReceipt, SendError> {
        let receipt = self.client.send(&self.config.outbound, msg).await?;
        self.activity.mark_outbound();
        Ok(receipt)
    }

    /// Send one text-only message, unchunked.
    pub async fn send_text(&self, text: &str) -> Result<SendReceipt, SendError> {
        self.send(&self.message(text)).await
    }

    /// Deliver a full reply payload.
    pub async fn deliver(&self, payload: &ReplyPayload) -> DeliveryReport {
        if payload.media.is_empty() {
            return self.deliver_text(&payload.text).await;
        }
        self.deliver_media(payload).await
    }

    /// Chunk `text` and send every chunk; a failed chunk does not stop the rest.
    pub async fn deliver_text(&self, text: &str) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        let chunks = self.chunker.chunk(text.trim(), self.config.text_chunk_limit);
        let total = chunks.len();
        for (index, chunk) in chunks.iter().enumerate() {
            match self.send_text(chunk).await {
                Ok(_) => report.sent += 1,
                Err(e) => {
                    warn!(to = %self.to, chunk = index + 1, total, error = %e, "failed to send text chunk");
                    report.failed += 1;
                },
            }
        }
        report
    }

    async fn deliver_media(&self, payload: &ReplyPayload) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        let text = payload.text.trim();
        let mut text_delivered = text.is_empty();

        // A caption that would need chunking goes out on its own first.
        if !text_delivered && text.chars().count() > self.config.text_chunk_limit {
            let sent = self.deliver_text(text).await;
            text_delivered = sent.sent > 0;
            report.absorb(sent);
        }

        for (index, media) in payload.media.iter().enumerate() {
            let caption = if text_delivered { "" } else { text };
            match self.send_media_item(media, caption).await {
                Ok(_) => {
                    report.sent += 1;
                    if !caption.is_empty() {
                        text_delivered = true;
                    }
                },
                Err(e) => {
                    warn!(to = %self.to, index, url = %display_reference(&media.url), error = %e, "media delivery failed");
                    report.failed += 1;
                    if !text_delivered {
                        let fallback = self.deliver_text(text).await;
                        text_delivered = fallback.sent > 0;
                        report.absorb(fallback);
                    }
                },
            }
        }
        report
    }

    async fn send_media_item(&self, media: &MediaAttachment, caption: &str) -> anyhow::Result<SendReceipt> {
        let fetched =
            hookrelay_media::load_reference(&self.http, &media.url, self.config.media_max_bytes()).await?;
        debug!(url = %display_reference(&media.url), bytes = fetched.bytes.len(), "loaded reply media");
        let file = OutboundFile {
            data: STANDARD.encode(&fetched.bytes),
            media_type: media.mime_type.clone().unwrap_or(fetched.content_type),
            filename: fetched.file_name,
        };
        Ok(self.send(&self.message(caption).with_file(file)).await?)
    }
}

/// References for logs: `data:` payloads are elided.
fn display_reference(reference: &str) -> &str {
    if reference.starts_with("data:") {
        "data:…"
    } else {
        reference
    }
}

/// [`ReplySink`] that sends every reply block through a [`ReplyDelivery`].
pub struct WebhookReplySink {
    delivery: ReplyDelivery,
}

impl WebhookReplySink {
    #[must_use]
    pub fn new(delivery: ReplyDelivery) -> Self {
        Self { delivery }
    }
}

#[async_trait]
impl ReplySink for WebhookReplySink {
    async fn deliver(&self, payload: ReplyPayload, kind: ReplyKind) -> anyhow::Result<()> {
        if payload.is_empty() {
            return Ok(());
        }
        let report = self.delivery.deliver(&payload).await;
        debug!(kind = kind.as_str(), sent = report.sent, failed = report.failed, "reply delivered");
        if report.sent == 0 && report.failed > 0 {
            anyhow::bail!("all {} outbound calls failed", report.failed);
        }
        Ok(())
    }

    fn on_error(&self, error: &anyhow::Error, kind: ReplyKind) {
        warn!(to = %self.delivery.to, kind = kind.as_str(), error = %error, "reply delivery failed");
    }
}
