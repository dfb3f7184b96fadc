use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{Arc, RwLock},
};

use {
    anyhow::Result,
    async_trait::async_trait,
    hookrelay_channels::plugin::{ChannelHealthSnapshot, ChannelOutbound, ChannelPlugin, ChannelStatus},
    hookrelay_common::types::ReplyPayload,
    tracing::{info, warn},
};

use crate::{
    CHANNEL_ID,
    config::WebhookAccountConfig,
    delivery::{DeliveryReport, ReplyDelivery},
    error::Error,
    outbound::OutboundClient,
    runtime::WebhookRuntime,
    server::start_server,
    state::{AccountState, AccountStateMap, ActivityClock},
    status::{IssueLevel, collect_status_issues},
};

/// HTTP webhook channel plugin. Runs at most one account.
pub struct WebhookPlugin {
    runtime: WebhookRuntime,
    accounts: AccountStateMap,
    outbound: WebhookOutbound,
}

impl WebhookPlugin {
    pub fn new(runtime: WebhookRuntime) -> Self {
        let accounts: AccountStateMap = Arc::new(RwLock::new(HashMap::new()));
        let outbound = WebhookOutbound {
            runtime: runtime.clone(),
            accounts: Arc::clone(&accounts),
        };
        Self {
            runtime,
            accounts,
            outbound,
        }
    }

    pub fn shared_outbound(&self) -> Arc<dyn ChannelOutbound> {
        Arc::new(self.outbound.clone())
    }

    pub fn account_ids(&self) -> Vec<String> {
        let accounts = self.accounts.read().unwrap_or_else(|e| e.into_inner());
        accounts.keys().cloned().collect()
    }

    /// Address the account's listener is bound to.
    pub fn local_addr(&self, account_id: &str) -> Option<SocketAddr> {
        let accounts = self.accounts.read().unwrap_or_else(|e| e.into_inner());
        accounts.get(account_id).map(|s| s.server.local_addr())
    }
}

#[async_trait]
impl ChannelPlugin for WebhookPlugin {
    fn id(&self) -> &str {
        CHANNEL_ID
    }

    fn name(&self) -> &str {
        "Webhook"
    }

    async fn start_account(&mut self, account_id: &str, config: serde_json::Value) -> Result<()> {
        let mut cfg = WebhookAccountConfig::from_value(config)?;
        cfg.account_id = account_id.to_string();

        {
            let accounts = self.accounts.read().unwrap_or_else(|e| e.into_inner());
            if let Some(existing) = accounts.keys().next() {
                return Err(Error::AccountLimit {
                    existing: existing.clone(),
                }
                .into());
            }
        }

        let issues = collect_status_issues(&cfg);
        for issue in issues.iter().filter(|i| i.level == IssueLevel::Warning) {
            warn!(account_id, fix = ?issue.fix, "{}", issue.message);
        }
        let errors: Vec<&str> = issues
            .iter()
            .filter(|i| i.level == IssueLevel::Error)
            .map(|i| i.message.as_str())
            .collect();
        if !errors.is_empty() {
            return Err(Error::Misconfigured {
                account_id: account_id.to_string(),
                message: errors.join("; "),
            }
            .into());
        }

        info!(account_id, policy = %cfg.dm.policy, "starting webhook account");
        let config = Arc::new(cfg);
        let activity = Arc::new(ActivityClock::default());
        let server = start_server(Arc::clone(&config), self.runtime.clone(), Arc::clone(&activity)).await?;

        let mut accounts = self.accounts.write().unwrap_or_else(|e| e.into_inner());
        accounts.insert(account_id.to_string(), AccountState {
            account_id: account_id.to_string(),
            config,
            server,
            activity,
        });
        Ok(())
    }

    async fn stop_account(&mut self, account_id: &str) -> Result<()> {
        let removed = {
            let mut accounts = self.accounts.write().unwrap_or_else(|e| e.into_inner());
            accounts.remove(account_id)
        };
        let Some(state) = removed else {
            warn!(account_id, "webhook account not found");
            return Ok(());
        };
        info!(account_id, "stopping webhook account");
        state.server.shutdown();
        state.server.wait().await;
        Ok(())
    }

    fn outbound(&self) -> Option<&dyn ChannelOutbound> {
        Some(&self.outbound)
    }

    fn status(&self) -> Option<&dyn ChannelStatus> {
        Some(self)
    }
}

#[async_trait]
impl ChannelStatus for WebhookPlugin {
    async fn probe(&self, account_id: &str) -> Result<ChannelHealthSnapshot> {
        let accounts = self.accounts.read().unwrap_or_else(|e| e.into_inner());
        let Some(state) = accounts.get(account_id) else {
            return Ok(ChannelHealthSnapshot {
                connected: false,
                account_id: account_id.to_string(),
                details: Some("account not started".into()),
            });
        };

        let mut details = vec![format!("listening on {}", state.server.local_addr())];
        if let Some(at) = state.activity.last_inbound_at() {
            details.push(format!("last inbound at {at}"));
        }
        if let Some(at) = state.activity.last_outbound_at() {
            details.push(format!("last outbound at {at}"));
        }
        if let Err(e) = OutboundClient::probe(&state.config.outbound) {
            details.push(format!("outbound unavailable: {e}"));
        }
        Ok(ChannelHealthSnapshot {
            connected: !state.server.is_shutdown(),
            account_id: state.account_id.clone(),
            details: Some(details.join("; ")),
        })
    }
}

/// [`ChannelOutbound`] over the running account's outbound configuration.
#[derive(Clone)]
pub struct WebhookOutbound {
    runtime: WebhookRuntime,
    accounts: AccountStateMap,
}

impl WebhookOutbound {
    fn delivery(&self, account_id: &str, to: &str) -> Result<ReplyDelivery> {
        let accounts = self.accounts.read().unwrap_or_else(|e| e.into_inner());
        let state = accounts
            .get(account_id)
            .ok_or_else(|| anyhow::anyhow!("unknown webhook account: {account_id}"))?;
        Ok(ReplyDelivery::new(
            &self.runtime,
            Arc::clone(&state.config),
            Arc::clone(&state.activity),
            to,
        ))
    }
}

fn check_report(report: DeliveryReport) -> Result<()> {
    if report.sent == 0 {
        anyhow::bail!("nothing delivered ({} failed sends)", report.failed);
    }
    Ok(())
}

#[async_trait]
impl ChannelOutbound for WebhookOutbound {
    async fn send_text(&self, account_id: &str, to: &str, text: &str) -> Result<()> {
        let delivery = self.delivery(account_id, to)?;
        check_report(delivery.deliver_text(text).await)
    }

    async fn send_media(&self, account_id: &str, to: &str, payload: &ReplyPayload) -> Result<()> {
        let delivery = self.delivery(account_id, to)?;
        check_report(delivery.deliver(payload).await)
    }
}
