//! Per-message processing after the HTTP acknowledgement.

use std::{sync::Arc, time::Duration};

use {
    chrono::{DateTime, Utc},
    hookrelay_channels::{InboundContext, ReplySink, gating},
    hookrelay_common::types::now_ms,
    hookrelay_media::{MediaStore, SavedMedia},
    hookrelay_routing::RouteInput,
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use hookrelay_metrics::{counter, labels, media as media_metrics, webhook as webhook_metrics};

use crate::{
    CHANNEL_ID,
    access::{self, AccessDecision},
    config::WebhookAccountConfig,
    delivery::{ReplyDelivery, WebhookReplySink},
    inbound::InboundMessage,
    normalize::{self, ExtractedMedia},
    runtime::WebhookRuntime,
    state::ActivityClock,
};

/// Upper bound for downloading one inbound media item.
const MEDIA_FETCH_TIMEOUT: Duration = Duration::from_secs(60);

/// Runs accepted messages through access control, media resolution,
/// routing and dispatch.
#[derive(Clone)]
pub struct Pipeline {
    runtime: WebhookRuntime,
    config: Arc<WebhookAccountConfig>,
    activity: Arc<ActivityClock>,
    media: MediaStore,
}

impl Pipeline {
    pub fn new(runtime: WebhookRuntime, config: Arc<WebhookAccountConfig>, activity: Arc<ActivityClock>) -> Self {
        let media = MediaStore::new(
            runtime.inbound_media_dir(&config.account_id),
            config.media_max_bytes(),
        );
        Self {
            runtime,
            config,
            activity,
            media,
        }
    }

    fn delivery(&self, to: &str) -> ReplyDelivery {
        ReplyDelivery::new(
            &self.runtime,
            Arc::clone(&self.config),
            Arc::clone(&self.activity),
            to,
        )
    }

    /// Process one inbound message end to end.
    pub async fn process(&self, msg: InboundMessage) -> anyhow::Result<()> {
        let account_id = self.config.account_id.as_str();
        let content = normalize::normalize(&msg);
        if !content.is_actionable() {
            debug!(
                account_id,
                sender = %msg.from,
                media = content.media.len(),
                "dropping message with empty text"
            );
            return Ok(());
        }

        let dm = &self.config.dm;
        match access::evaluate(
            dm,
            CHANNEL_ID,
            &msg.from,
            msg.from_name.as_deref(),
            self.runtime.pairing.as_ref(),
        )
        .await
        {
            AccessDecision::Allow => {},
            AccessDecision::Drop(reason) => {
                debug!(account_id, channel = CHANNEL_ID, sender = %msg.from, policy = %dm.policy, %reason, "dropping message");
                #[cfg(feature = "metrics")]
                counter!(webhook_metrics::MESSAGES_DROPPED_TOTAL, labels::REASON => reason.as_str()).increment(1);
                return Ok(());
            },
            AccessDecision::PairingPending => {
                debug!(account_id, channel = CHANNEL_ID, sender = %msg.from, "pairing already pending, dropping message");
                #[cfg(feature = "metrics")]
                counter!(webhook_metrics::MESSAGES_DROPPED_TOTAL, labels::REASON => "pairing_pending").increment(1);
                return Ok(());
            },
            AccessDecision::PairingIssued { code } => {
                info!(account_id, sender = %msg.from, "issued pairing code to unknown sender");
                #[cfg(feature = "metrics")]
                counter!(webhook_metrics::PAIRING_REQUESTS_TOTAL).increment(1);
                if let Err(e) = self
                    .delivery(&msg.from)
                    .send_text(&access::pairing_reply_text(&code))
                    .await
                {
                    warn!(account_id, sender = %msg.from, error = %e, "failed to send pairing code");
                }
                return Ok(());
            },
        }

        #[cfg(feature = "metrics")]
        counter!(webhook_metrics::MESSAGES_ACCEPTED_TOTAL).increment(1);

        let saved = self.resolve_media(&content.media).await;

        let route = self
            .runtime
            .router
            .resolve(RouteInput {
                channel: CHANNEL_ID,
                account_id,
                peer_id: &msg.from,
            })
            .await?;

        let previous = match self.runtime.sessions.last_activity(&route.session_key).await {
            Ok(at) => at,
            Err(e) => {
                warn!(account_id, session = %route.session_key, error = %e, "failed to read session activity");
                None
            },
        };
        let timestamp = msg.timestamp.unwrap_or_else(now_ms);
        let body = format_envelope(msg.display_name(), timestamp, previous, &content.text);

        let command_authorized = if self
            .runtime
            .dispatcher
            .needs_command_authorization(&content.text)
        {
            let list = access::effective_allow_list(dm, CHANNEL_ID, self.runtime.pairing.as_ref()).await;
            gating::is_allowed(&msg.from, &list)
        } else {
            false
        };

        let media_paths: Vec<String> = saved.iter().map(|m| m.path.display().to_string()).collect();
        let media_types: Vec<String> = saved.iter().map(|m| m.content_type.clone()).collect();
        let ctx = InboundContext {
            body,
            raw_body: content.text.clone(),
            command_body: content.text.clone(),
            from: format!("{CHANNEL_ID}:{}", msg.from),
            to: format!("{CHANNEL_ID}:{account_id}"),
            session_key: route.session_key.to_string(),
            agent_id: route.agent_id.clone(),
            account_id: account_id.to_string(),
            channel: CHANNEL_ID.to_string(),
            sender_id: msg.from.clone(),
            sender_name: msg.from_name.clone(),
            message_id: msg.message_id.clone(),
            timestamp,
            media_path: media_paths.first().cloned(),
            media_type: media_types.first().cloned(),
            media_paths,
            media_types,
            command_authorized,
        };

        if let Err(e) = self
            .runtime
            .sessions
            .record_inbound(&route.session_key, CHANNEL_ID, &msg.from, timestamp)
            .await
        {
            warn!(account_id, session = %route.session_key, error = %e, "failed to record session activity");
        }

        debug!(
            account_id,
            sender = %msg.from,
            agent = %route.agent_id,
            media = ctx.media_paths.len(),
            "dispatching inbound message"
        );
        let sink: Arc<dyn ReplySink> = Arc::new(WebhookReplySink::new(self.delivery(&msg.from)));
        self.runtime.dispatcher.dispatch(ctx, sink).await
    }

    /// Fetch or decode every item and save it. Failures are logged and skipped.
    async fn resolve_media(&self, items: &[ExtractedMedia]) -> Vec<SavedMedia> {
        let mut saved = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            match self.resolve_one(item).await {
                Ok(media) => {
                    #[cfg(feature = "metrics")]
                    counter!(media_metrics::SAVED_TOTAL, labels::SOURCE => item.source()).increment(1);
                    debug!(index, source = item.source(), path = %media.path.display(), size = media.size, "saved inbound media");
                    saved.push(media);
                },
                Err(e) => {
                    #[cfg(feature = "metrics")]
                    counter!(media_metrics::FAILURES_TOTAL, labels::SOURCE => item.source()).increment(1);
                    warn!(index, source = item.source(), error = %e, "failed to resolve inbound media");
                },
            }
        }
        saved
    }

    async fn resolve_one(&self, item: &ExtractedMedia) -> anyhow::Result<SavedMedia> {
        let max = self.media.max_bytes();
        let fetched = match item {
            ExtractedMedia::Remote { url } => {
                tokio::time::timeout(
                    MEDIA_FETCH_TIMEOUT,
                    hookrelay_media::fetch_remote(&self.runtime.http, url, max),
                )
                .await
                .map_err(|_| anyhow::anyhow!("download timed out after {MEDIA_FETCH_TIMEOUT:?}"))??
            },
            ExtractedMedia::Inline { data, media_type } => {
                hookrelay_media::decode_inline(data, media_type.as_deref(), max)?
            },
        };
        Ok(self
            .media
            .save_buffer(
                &fetched.bytes,
                Some(&fetched.content_type),
                fetched.file_name.as_deref(),
            )
            .await?)
    }
}

/// `[Webhook <name> +<elapsed> <time>] <text>`. The elapsed part is omitted
/// for the first message of a session.
#[must_use]
pub fn format_envelope(name: &str, timestamp: i64, previous: Option<i64>, text: &str) -> String {
    let mut header = format!("Webhook {name}");
    if let Some(prev) = previous {
        header.push_str(" +");
        header.push_str(&format_elapsed(timestamp.saturating_sub(prev)));
    }
    if let Some(at) = DateTime::<Utc>::from_timestamp_millis(timestamp) {
        header.push(' ');
        header.push_str(&at.format("%Y-%m-%d %H:%M UTC").to_string());
    }
    if text.is_empty() {
        format!("[{header}]")
    } else {
        format!("[{header}] {text}")
    }
}

/// Compact elapsed time: `45s`, `3m`, `2h`, `5d`.
fn format_elapsed(ms: i64) -> String {
    let secs = ms.max(0) / 1000;
    match secs {
        s if s < 60 => format!("{s}s"),
        s if s < 3_600 => format!("{}m", s / 60),
        s if s < 86_400 => format!("{}h", s / 3_600),
        s => format!("{}d", s / 86_400),
    }
}
