//! DM access policy for inbound senders.

use {
    hookrelay_channels::{
        gating::{self, DmPolicy},
        pairing::{PairingStore, PairingUpsert},
    },
    tracing::warn,
};

use crate::config::DmConfig;

/// Outcome of [`evaluate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessDecision {
    /// Process the message.
    Allow,
    /// Drop silently.
    Drop(DropReason),
    /// A pairing request was just created; tell the sender `code`.
    PairingIssued { code: String },
    /// A pairing request already exists; drop silently.
    PairingPending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    Disabled,
    NotAllowed,
    PairingQueueFull,
    PairingUnavailable,
}

impl DropReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disabled => "dm_disabled",
            Self::NotAllowed => "not_allowed",
            Self::PairingQueueFull => "pairing_queue_full",
            Self::PairingUnavailable => "pairing_unavailable",
        }
    }
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static allowlist plus senders approved through pairing.
///
/// A pairing store that cannot be read contributes nothing.
pub async fn effective_allow_list(dm: &DmConfig, channel: &str, pairing: &dyn PairingStore) -> Vec<String> {
    let mut list = dm.allow_from.clone();
    match pairing.read_allow_from(channel).await {
        Ok(dynamic) => {
            for entry in dynamic {
                if !list.contains(&entry) {
                    list.push(entry);
                }
            }
        },
        Err(e) => warn!(channel, error = %e, "failed to read paired allowlist"),
    }
    list
}

/// Decide what to do with a direct message from `sender_id`.
pub async fn evaluate(
    dm: &DmConfig,
    channel: &str,
    sender_id: &str,
    sender_name: Option<&str>,
    pairing: &dyn PairingStore,
) -> AccessDecision {
    if !dm.enabled {
        return AccessDecision::Drop(DropReason::Disabled);
    }
    match dm.policy {
        DmPolicy::Disabled => AccessDecision::Drop(DropReason::Disabled),
        DmPolicy::Open => AccessDecision::Allow,
        DmPolicy::Allowlist => {
            let list = effective_allow_list(dm, channel, pairing).await;
            if gating::is_allowed(sender_id, &list) {
                AccessDecision::Allow
            } else {
                AccessDecision::Drop(DropReason::NotAllowed)
            }
        },
        DmPolicy::Pairing => {
            let list = effective_allow_list(dm, channel, pairing).await;
            if gating::is_allowed(sender_id, &list) {
                return AccessDecision::Allow;
            }
            match pairing.upsert_request(channel, sender_id, sender_name).await {
                Ok(PairingUpsert::Created(request)) => AccessDecision::PairingIssued { code: request.code },
                Ok(PairingUpsert::AlreadyPending(_)) => AccessDecision::PairingPending,
                Ok(PairingUpsert::AtCapacity) => AccessDecision::Drop(DropReason::PairingQueueFull),
                Err(e) => {
                    warn!(channel, sender_id, error = %e, "failed to record pairing request");
                    AccessDecision::Drop(DropReason::PairingUnavailable)
                },
            }
        },
    }
}

/// Text sent to a sender who was just issued a pairing code.
#[must_use]
pub fn pairing_reply_text(code: &str) -> String {
    format!(
        "This bot only talks to approved senders.\n\nYour pairing code: {code}\n\n\
         Ask the operator to run `hookrelay pairing approve {code}`."
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {super::*, hookrelay_channels::pairing::FilePairingStore};

    fn dm(policy: DmPolicy, allow: &[&str]) -> DmConfig {
        DmConfig {
            enabled: true,
            policy,
            allow_from: allow.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn disabled_wins_before_allowlist() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilePairingStore::new(dir.path());
        let mut cfg = dm(DmPolicy::Open, &["*"]);
        cfg.enabled = false;
        assert_eq!(
            evaluate(&cfg, "webhook", "alice", None, &store).await,
            AccessDecision::Drop(DropReason::Disabled)
        );
        let cfg = dm(DmPolicy::Disabled, &["alice"]);
        assert_eq!(
            evaluate(&cfg, "webhook", "alice", None, &store).await,
            AccessDecision::Drop(DropReason::Disabled)
        );
    }

    #[tokio::test]
    async fn open_allows_everyone() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilePairingStore::new(dir.path());
        let cfg = dm(DmPolicy::Open, &["*"]);
        assert_eq!(evaluate(&cfg, "webhook", "anyone", None, &store).await, AccessDecision::Allow);
    }

    #[tokio::test]
    async fn allowlist_matches_exact_entries_only() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilePairingStore::new(dir.path());
        let cfg = dm(DmPolicy::Allowlist, &["alice", "team-*"]);
        assert_eq!(evaluate(&cfg, "webhook", "alice", None, &store).await, AccessDecision::Allow);
        assert_eq!(
            evaluate(&cfg, "webhook", "team-ops", None, &store).await,
            AccessDecision::Drop(DropReason::NotAllowed)
        );
        assert_eq!(
            evaluate(&cfg, "webhook", "Alice", None, &store).await,
            AccessDecision::Drop(DropReason::NotAllowed)
        );
    }

    #[tokio::test]
    async fn empty_allowlist_denies() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilePairingStore::new(dir.path());
        let cfg = dm(DmPolicy::Allowlist, &[]);
        assert_eq!(
            evaluate(&cfg, "webhook", "alice", None, &store).await,
            AccessDecision::Drop(DropReason::NotAllowed)
        );
    }

    #[tokio::test]
    async fn pairing_issues_once_then_allows_after_approval() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilePairingStore::new(dir.path());
        let cfg = dm(DmPolicy::Pairing, &[]);

        let AccessDecision::PairingIssued { code } =
            evaluate(&cfg, "webhook", "bob", Some("Bob"), &store).await
        else {
            panic!("expected a pairing code");
        };
        assert_eq!(
            evaluate(&cfg, "webhook", "bob", None, &store).await,
            AccessDecision::PairingPending
        );

        store.approve("webhook", &code).await.unwrap().unwrap();
        assert_eq!(evaluate(&cfg, "webhook", "bob", None, &store).await, AccessDecision::Allow);

        // Approved senders also pass an allowlist policy.
        let cfg = dm(DmPolicy::Allowlist, &[]);
        assert_eq!(evaluate(&cfg, "webhook", "bob", None, &store).await, AccessDecision::Allow);
    }

    #[tokio::test]
    async fn pairing_queue_full_drops() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilePairingStore::new(dir.path()).with_max_pending(1);
        let cfg = dm(DmPolicy::Pairing, &[]);
        assert!(matches!(
            evaluate(&cfg, "webhook", "a", None, &store).await,
            AccessDecision::PairingIssued { .. }
        ));
        assert_eq!(
            evaluate(&cfg, "webhook", "b", None, &store).await,
            AccessDecision::Drop(DropReason::PairingQueueFull)
        );
    }

    #[tokio::test]
    async fn statically_allowed_sender_skips_pairing() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilePairingStore::new(dir.path());
        let cfg = dm(DmPolicy::Pairing, &["carol"]);
        assert_eq!(evaluate(&cfg, "webhook", "carol", None, &store).await, AccessDecision::Allow);
        assert!(store.list_requests("webhook").await.unwrap().is_empty());
    }

    #[test]
    fn pairing_text_mentions_code() {
        assert!(pairing_reply_text("ABCD2345").contains("ABCD2345"));
    }
}
