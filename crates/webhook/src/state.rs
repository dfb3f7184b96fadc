use std::{
    collections::HashMap,
    sync::{
        Arc, RwLock,
        atomic::{AtomicI64, Ordering},
    },
};

use crate::{config::WebhookAccountConfig, server::ServerHandle};

/// Shared account state map.
pub type AccountStateMap = Arc<RwLock<HashMap<String, AccountState>>>;

/// Per-account runtime state.
pub struct AccountState {
    pub account_id: String,
    pub config: Arc<WebhookAccountConfig>,
    pub server: ServerHandle,
    pub activity: Arc<ActivityClock>,
}

/// Last inbound and outbound activity, epoch millis. Zero means never.
#[derive(Debug, Default)]
pub struct ActivityClock {
    last_inbound_at: AtomicI64,
    last_outbound_at: AtomicI64,
}

impl ActivityClock {
    pub fn mark_inbound(&self) {
        self.last_inbound_at
            .store(hookrelay_common::types::now_ms(), Ordering::Relaxed);
    }

    pub fn mark_outbound(&self) {
        self.last_outbound_at
            .store(hookrelay_common::types::now_ms(), Ordering::Relaxed);
    }

    #[must_use]
    pub fn last_inbound_at(&self) -> Option<i64> {
        Some(self.last_inbound_at.load(Ordering::Relaxed)).filter(|t| *t > 0)
    }

    #[must_use]
    pub fn last_outbound_at(&self) -> Option<i64> {
        Some(self.last_outbound_at.load(Ordering::Relaxed)).filter(|t| *t > 0)
    }
}
