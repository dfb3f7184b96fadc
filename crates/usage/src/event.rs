use {
    serde::{Deserialize, Serialize},
    tokio::sync::broadcast,
};

const DEFAULT_CAPACITY: usize = 256;

/// One backend call's token consumption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageEvent {
    pub provider: String,
    pub model: String,
    #[serde(default)]
    pub input: u64,
    #[serde(default)]
    pub output: u64,
    #[serde(default)]
    pub cache_read: u64,
    #[serde(default)]
    pub cache_write: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
}

impl UsageEvent {
    #[must_use]
    pub fn new(provider: impl Into<String>, model: impl Into<String>, input: u64, output: u64) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            input,
            output,
            cache_read: 0,
            cache_write: 0,
            total: None,
        }
    }

    /// Explicit total, or the sum of the four component counts.
    #[must_use]
    pub fn total_tokens(&self) -> u64 {
        self.total.unwrap_or_else(|| {
            self.input
                .saturating_add(self.output)
                .saturating_add(self.cache_read)
                .saturating_add(self.cache_write)
        })
    }
}

/// Process-wide fan-out of usage events.
///
/// Cloning shares the same channel. Emitting with no subscribers is not an
/// error; the event is simply discarded.
#[derive(Debug, Clone)]
pub struct UsageEventBus {
    tx: broadcast::Sender<UsageEvent>,
}

impl UsageEventBus {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event. Returns how many subscribers received it.
    pub fn emit(&self, event: UsageEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<UsageEvent> {
        self.tx.subscribe()
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for UsageEventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
