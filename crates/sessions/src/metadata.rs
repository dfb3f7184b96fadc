use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use {
    serde::{Deserialize, Serialize},
    tracing::warn,
};

use crate::error::Result;

/// A single session entry in the activity index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEntry {
    pub key: String,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(default)]
    pub message_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_channel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sender: Option<String>,
}

/// JSON file-backed index mapping session key -> [`SessionEntry`].
#[derive(Debug)]
pub struct SessionMetadata {
    path: PathBuf,
    entries: HashMap<String, SessionEntry>,
}

impl SessionMetadata {
    /// Load the index from disk. A missing file gives an empty index; a
    /// malformed one is logged and replaced by an empty index.
    pub fn load(path: PathBuf) -> Result<Self> {
        let entries = match fs::read_to_string(&path) {
            Ok(data) => serde_json::from_str(&data).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "malformed session index, starting fresh");
                HashMap::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self { path, entries })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persist the whole index (temp file, then rename).
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(&self.entries)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, data)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&SessionEntry> {
        self.entries.get(key)
    }

    /// Record one inbound message at `at`, creating the entry if needed.
    pub fn touch(&mut self, key: &str, channel: &str, sender: &str, at: i64) -> &SessionEntry {
        self.entries
            .entry(key.to_string())
            .and_modify(|e| {
                e.updated_at = e.updated_at.max(at);
                e.message_count = e.message_count.saturating_add(1);
                e.last_channel = Some(channel.to_string());
                e.last_sender = Some(sender.to_string());
            })
            .or_insert_with(|| SessionEntry {
                key: key.to_string(),
                created_at: at,
                updated_at: at,
                message_count: 1,
                last_channel: Some(channel.to_string()),
                last_sender: Some(sender.to_string()),
            })
    }

    pub fn remove(&mut self, key: &str) -> Option<SessionEntry> {
        self.entries.remove(key)
    }

    /// All entries, most recently active first.
    pub fn list(&self) -> Vec<SessionEntry> {
        let mut entries: Vec<_> = self.entries.values().cloned().collect();
        entries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        entries
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn touch_creates_then_updates() {
        let dir = tempfile::tempdir().unwrap();
        let mut meta = SessionMetadata::load(dir.path().join("sessions.json")).unwrap();

        meta.touch("k", "webhook", "alice", 100);
        let entry = meta.touch("k", "webhook", "alice", 250).clone();

        assert_eq!(entry.created_at, 100);
        assert_eq!(entry.updated_at, 250);
        assert_eq!(entry.message_count, 2);
    }

    #[test]
    fn out_of_order_touch_keeps_latest_time() {
        let dir = tempfile::tempdir().unwrap();
        let mut meta = SessionMetadata::load(dir.path().join("sessions.json")).unwrap();
        meta.touch("k", "webhook", "a", 500);
        meta.touch("k", "webhook", "a", 400);
        assert_eq!(meta.get("k").unwrap().updated_at, 500);
    }

    #[test]
    fn save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/sessions.json");
        {
            let mut meta = SessionMetadata::load(path.clone()).unwrap();
            meta.touch("main", "webhook", "bob", 7);
            meta.save().unwrap();
        }
        let meta = SessionMetadata::load(path).unwrap();
        assert_eq!(meta.get("main").unwrap().last_sender.as_deref(), Some("bob"));
    }

    #[test]
    fn list_is_most_recent_first_and_remove_works() {
        let dir = tempfile::tempdir().unwrap();
        let mut meta = SessionMetadata::load(dir.path().join("s.json")).unwrap();
        meta.touch("old", "webhook", "a", 1);
        meta.touch("new", "webhook", "b", 2);
        let keys: Vec<_> = meta.list().into_iter().map(|e| e.key).collect();
        assert_eq!(keys, vec!["new", "old"]);

        assert!(meta.remove("old").is_some());
        assert!(meta.get("old").is_none());
    }

    #[test]
    fn malformed_index_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.json");
        fs::write(&path, "not json").unwrap();
        assert!(SessionMetadata::load(path).unwrap().list().is_empty());
    }
}
