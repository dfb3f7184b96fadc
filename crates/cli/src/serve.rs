use std::{sync::Arc, time::Duration};

use {
    anyhow::{Context, bail},
    hookrelay_channels::{ChannelPlugin, FilePairingStore},
    hookrelay_config::HookrelayConfig,
    hookrelay_routing::DefaultRouter,
    hookrelay_sessions::FileSessionStore,
    hookrelay_usage::{TokenUsageTracker, UsageEventBus},
    hookrelay_webhook::{WebhookAccountConfig, WebhookPlugin, WebhookRuntime},
    tracing::info,
};

use crate::echo::EchoDispatcher;

/// Agent every message routes to when no binding matches.
const DEFAULT_AGENT: &str = "main";

/// Start the webhook account and run until Ctrl-C.
pub async fn run(config: HookrelayConfig) -> anyhow::Result<()> {
    let Some(raw) = config.channels.webhook.clone() else {
        bail!("no [channels.webhook] section in the config; nothing to serve");
    };
    let account_id = WebhookAccountConfig::from_value(raw.clone())?.account_id;

    #[cfg(feature = "metrics")]
    let metrics_endpoint = crate::metrics_server::start(&config.metrics).await?;

    let data_dir = config.data_dir();
    info!(data_dir = %data_dir.display(), "using data directory");

    let usage_bus = UsageEventBus::default();
    let usage = TokenUsageTracker::new(
        config.usage_path(),
        Duration::from_secs(config.usage.autosave_secs),
    );
    let outcome = usage.load().await;
    info!(path = %usage.path().display(), ?outcome, "usage snapshot loaded");

    let sessions = FileSessionStore::open(data_dir.join("sessions.json"))
        .context("opening the session index")?;
    let runtime = WebhookRuntime::new(
        Arc::new(EchoDispatcher::new(usage_bus.clone(), usage.clone())),
        Arc::new(DefaultRouter::new(DEFAULT_AGENT)),
        Arc::new(sessions),
        Arc::new(FilePairingStore::new(data_dir.join("pairing"))),
        usage,
        usage_bus,
        data_dir,
    );

    let mut plugin = WebhookPlugin::new(runtime);
    plugin.start_account(&account_id, raw).await?;
    if let Some(addr) = plugin.local_addr(&account_id) {
        info!(account_id = %account_id, %addr, "webhook bridge ready");
    }

    tokio::signal::ctrl_c()
        .await
        .context("waiting for Ctrl-C")?;
    info!("shutting down");

    let stopped = plugin.stop_account(&account_id).await;
    #[cfg(feature = "metrics")]
    {
        if let Some(task) = metrics_endpoint {
            task.abort();
        }
    }
    stopped
}
