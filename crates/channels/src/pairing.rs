//! Pairing requests for DM senders that are not yet allowed.
//!
//! An unknown sender gets a short code. An operator approves the code out of
//! band (`hookrelay pairing approve <code>`), which moves the sender onto the
//! channel's dynamic allowlist.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use {
    async_trait::async_trait,
    hookrelay_common::types::now_ms,
    rand::Rng,
    serde::{Deserialize, Serialize},
    tokio::sync::Mutex,
    tracing::{debug, info, warn},
};

use crate::error::{Error, Result};

/// How long a pending request stays valid.
pub const PAIRING_TTL: Duration = Duration::from_secs(60 * 60);

/// Maximum pending requests per channel.
pub const MAX_PENDING: usize = 3;

const CODE_LEN: usize = 8;
/// Uppercase letters and digits without look-alikes (0/O, 1/I).
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// A pending pairing request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingRequest {
    pub sender_id: String,
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    pub created_at: i64,
    pub last_seen_at: i64,
}

/// Result of [`PairingStore::upsert_request`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingUpsert {
    /// A new request was created; the sender should be told its code.
    Created(PairingRequest),
    /// A request already exists for this sender.
    AlreadyPending(PairingRequest),
    /// The channel already has the maximum number of pending requests.
    AtCapacity,
}

/// Pending pairing requests and the approved (dynamic) allowlist.
#[async_trait]
pub trait PairingStore: Send + Sync {
    /// Create a pending request for `sender_id`, or fetch the existing one.
    async fn upsert_request(
        &self,
        channel: &str,
        sender_id: &str,
        sender_name: Option<&str>,
    ) -> Result<PairingUpsert>;

    /// Senders approved through pairing.
    async fn read_allow_from(&self, channel: &str) -> Result<Vec<String>>;

    /// Approve the request carrying `code`. Returns the approved request.
    async fn approve(&self, channel: &str, code: &str) -> Result<Option<PairingRequest>>;

    /// Pending, unexpired requests.
    async fn list_requests(&self, channel: &str) -> Result<Vec<PairingRequest>>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ChannelPairingFile {
    requests: Vec<PairingRequest>,
    allow_from: Vec<String>,
}

/// JSON file-backed [`PairingStore`], one file per channel under `dir`.
pub struct FilePairingStore {
    dir: PathBuf,
    ttl: Duration,
    max_pending: usize,
    lock: Mutex<()>,
}

impl FilePairingStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ttl: PAIRING_TTL,
            max_pending: MAX_PENDING,
            lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = max_pending;
        self
    }

    fn file_path(&self, channel: &str) -> PathBuf {
        let safe: String = channel
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(format!("{safe}-pairing.json"))
    }

    async fn read_file(path: &Path) -> Result<ChannelPairingFile> {
        match tokio::fs::read_to_string(path).await {
            Ok(raw) => Ok(serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "malformed pairing file, starting fresh");
                ChannelPairingFile::default()
            })),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ChannelPairingFile::default()),
            Err(e) => Err(Error::external(format!("read {}", path.display()), e)),
        }
    }

    async fn write_file(path: &Path, file: &ChannelPairingFile) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::external(format!("create {}", parent.display()), e))?;
        }
        let data = serde_json::to_vec_pretty(file)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, data)
            .await
            .map_err(|e| Error::external(format!("write {}", tmp.display()), e))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| Error::external(format!("rename {}", path.display()), e))
    }

    fn prune(&self, file: &mut ChannelPairingFile, now: i64) -> bool {
        let ttl_ms = i64::try_from(self.ttl.as_millis()).unwrap_or(i64::MAX);
        let before = file.requests.len();
        file.requests
            .retain(|r| now.saturating_sub(r.created_at) < ttl_ms);
        file.requests.len() != before
    }

    pub(crate) async fn upsert_request_at(
        &self,
        channel: &str,
        sender_id: &str,
        sender_name: Option<&str>,
        now: i64,
    ) -> Result<PairingUpsert> {
        let _guard = self.lock.lock().await;
        let path = self.file_path(channel);
        let mut file = Self::read_file(&path).await?;
        let pruned = self.prune(&mut file, now);

        if let Some(existing) = file.requests.iter_mut().find(|r| r.sender_id == sender_id) {
            existing.last_seen_at = now;
            let existing = existing.clone();
            Self::write_file(&path, &file).await?;
            return Ok(PairingUpsert::AlreadyPending(existing));
        }

        if file.requests.len() >= self.max_pending {
            if pruned {
                Self::write_file(&path, &file).await?;
            }
            debug!(channel, sender_id, "pairing queue full");
            return Ok(PairingUpsert::AtCapacity);
        }

        let request = PairingRequest {
            sender_id: sender_id.to_string(),
            code: unique_code(&file.requests),
            sender_name: sender_name.map(str::to_string),
            created_at: now,
            last_seen_at: now,
        };
        file.requests.push(request.clone());
        Self::write_file(&path, &file).await?;
        info!(channel, sender_id, "pairing request created");
        Ok(PairingUpsert::Created(request))
    }

    pub(crate) async fn approve_at(
        &self,
        channel: &str,
        code: &str,
        now: i64,
    ) -> Result<Option<PairingRequest>> {
        let _guard = self.lock.lock().await;
        let path = self.file_path(channel);
        let mut file = Self::read_file(&path).await?;
        let pruned = self.prune(&mut file, now);

        let code = code.trim();
        let Some(idx) = file
            .requests
            .iter()
            .position(|r| r.code.eq_ignore_ascii_case(code))
        else {
            if pruned {
                Self::write_file(&path, &file).await?;
            }
            return Ok(None);
        };

        let request = file.requests.remove(idx);
        if !file.allow_from.contains(&request.sender_id) {
            file.allow_from.push(request.sender_id.clone());
        }
        Self::write_file(&path, &file).await?;
        info!(channel, sender_id = %request.sender_id, "pairing request approved");
        Ok(Some(request))
    }

    pub(crate) async fn list_requests_at(&self, channel: &str, now: i64) -> Result<Vec<PairingRequest>> {
        let _guard = self.lock.lock().await;
        let mut file = Self::read_file(&self.file_path(channel)).await?;
        self.prune(&mut file, now);
        Ok(file.requests)
    }
}

#[async_trait]
impl PairingStore for FilePairingStore {
    async fn upsert_request(
        &self,
        channel: &str,
        sender_id: &str,
        sender_name: Option<&str>,
    ) -> Result<PairingUpsert> {
        self.upsert_request_at(channel, sender_id, sender_name, now_ms())
            .await
    }

    async fn read_allow_from(&self, channel: &str) -> Result<Vec<String>> {
        let _guard = self.lock.lock().await;
        Ok(Self::read_file(&self.file_path(channel)).await?.allow_from)
    }

    async fn approve(&self, channel: &str, code: &str) -> Result<Option<PairingRequest>> {
        self.approve_at(channel, code, now_ms()).await
    }

    async fn list_requests(&self, channel: &str) -> Result<Vec<PairingRequest>> {
        self.list_requests_at(channel, now_ms()).await
    }
}

fn generate_code() -> String {
    let mut rng = rand::rng();
    (0..CODE_LEN)
        .map(|_| char::from(CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())]))
        .collect()
}

fn unique_code(existing: &[PairingRequest]) -> String {
    loop {
        let code = generate_code();
        if !existing.iter().any(|r| r.code == code) {
            return code;
        }
    }
}
