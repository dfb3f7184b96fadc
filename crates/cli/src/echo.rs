//! Built-in backend that answers every message with its own text.
//!
//! Lets the bridge run end to end without a model provider. Each reply emits
//! a [`UsageEvent`] with rough token estimates so usage accounting has
//! something to count.

use std::sync::Arc;

use {
    async_trait::async_trait,
    hookrelay_channels::{InboundContext, ReplyDispatcher, ReplyKind, ReplySink},
    hookrelay_common::types::ReplyPayload,
    hookrelay_usage::{Period, TokenUsageTracker, UsageEvent, UsageEventBus},
    tracing::info,
};

pub const PROVIDER: &str = "echo";
pub const MODEL: &str = "echo-1";

/// Slash command that reports the usage windows instead of echoing.
const USAGE_COMMAND: &str = "/usage";

pub struct EchoDispatcher {
    bus: UsageEventBus,
    usage: TokenUsageTracker,
}

impl EchoDispatcher {
    pub fn new(bus: UsageEventBus, usage: TokenUsageTracker) -> Self {
        Self { bus, usage }
    }

    fn usage_report(&self) -> String {
        let summary = self.usage.summary();
        let lines: Vec<String> = Period::ALL
            .iter()
            .map(|&period| {
                let counters = match period {
                    Period::AllTime => summary.all_time,
                    Period::Monthly => summary.monthly,
                    Period::Weekly => summary.weekly,
                    Period::Daily => summary.daily,
                };
                format!(
                    "{period}: {} tokens over {} requests",
                    counters.total_tokens, counters.request_count
                )
            })
            .collect();
        lines.join("\n")
    }
}

/// Rough token count: one token per four bytes, rounded up.
fn estimate_tokens(text: &str) -> u64 {
    (text.len() as u64).div_ceil(4)
}

fn is_command(body: &str) -> bool {
    body.trim_start().starts_with('/')
}

#[async_trait]
impl ReplyDispatcher for EchoDispatcher {
    async fn dispatch(&self, ctx: InboundContext, sink: Arc<dyn ReplySink>) -> anyhow::Result<()> {
        info!(
            channel = %ctx.channel,
            account_id = %ctx.account_id,
            from = %ctx.from,
            sender = ctx.sender_name.as_deref().unwrap_or("unknown"),
            session_key = %ctx.session_key,
            media = ctx.media_paths.len(),
            "incoming message"
        );

        let text = if ctx.command_body.trim() == USAGE_COMMAND {
            if ctx.command_authorized {
                self.usage_report()
            } else {
                "You are not allowed to run commands.".to_string()
            }
        } else if ctx.raw_body.is_empty() {
            format!("Echo: (no text, {} attachment(s))", ctx.media_paths.len())
        } else {
            format!("Echo: {}", ctx.raw_body)
        };

        self.bus.emit(UsageEvent::new(
            PROVIDER,
            MODEL,
            estimate_tokens(&ctx.body),
            estimate_tokens(&text),
        ));

        let payload = ReplyPayload {
            reply_to_id: ctx.message_id.clone(),
            ..ReplyPayload::text(text)
        };
        if let Err(e) = sink.deliver(payload, ReplyKind::Final).await {
            sink.on_error(&e, ReplyKind::Final);
        }
        Ok(())
    }

    fn needs_command_authorization(&self, body: &str) -> bool {
        is_command(body)
    }
}
