use serde::{Deserialize, Serialize};

/// Check whether `sender_id` matches any entry of `allowlist`.
///
/// An empty allowlist denies everyone. Entries match exactly
/// (case-sensitive); a bare `*` admits every sender. Other `*` characters
/// are literal.
pub fn is_allowed(sender_id: &str, allowlist: &[String]) -> bool {
    allowlist
        .iter()
        .any(|entry| entry == "*" || entry == sender_id)
}

/// DM access policy.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DmPolicy {
    /// Anyone can message. Requires `*` in the static allowlist.
    Open,
    /// Unknown senders get a pairing code an operator must approve.
    #[default]
    Pairing,
    /// Only senders on the static or paired allowlist.
    Allowlist,
    /// Every direct message is dropped.
    Disabled,
}

impl DmPolicy {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Pairing => "pairing",
            Self::Allowlist => "allowlist",
            Self::Disabled => "disabled",
        }
    }
}

impl std::fmt::Display for DmPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
