use std::path::PathBuf;

use {async_trait::async_trait, tokio::sync::Mutex};

use crate::{error::Result, key::SessionKey, metadata::SessionMetadata};

/// Session activity, as consumed by channels.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Epoch millis of the last recorded inbound message for `key`.
    async fn last_activity(&self, key: &SessionKey) -> Result<Option<i64>>;

    /// Record an inbound message from `sender` on `channel` at `at`.
    async fn record_inbound(&self, key: &SessionKey, channel: &str, sender: &str, at: i64) -> Result<()>;
}

/// [`SessionStore`] backed by a [`SessionMetadata`] JSON file.
pub struct FileSessionStore {
    meta: Mutex<SessionMetadata>,
}

impl FileSessionStore {
    pub fn open(path: PathBuf) -> Result<Self> {
        Ok(Self {
            meta: Mutex::new(SessionMetadata::load(path)?),
        })
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn last_activity(&self, key: &SessionKey) -> Result<Option<i64>> {
        Ok(self.meta.lock().await.get(key.as_str()).map(|e| e.updated_at))
    }

    async fn record_inbound(&self, key: &SessionKey, channel: &str, sender: &str, at: i64) -> Result<()> {
        let mut meta = self.meta.lock().await;
        meta.touch(key.as_str(), channel, sender, at);
        meta.save()
    }
}
