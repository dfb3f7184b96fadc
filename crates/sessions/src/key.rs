use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Session identifier: `agent:<agent_id>:<channel>:direct:<peer_id>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionKey(String);

impl SessionKey {
    /// Key for a one-to-one conversation with `peer_id` on `channel`.
    #[must_use]
    pub fn direct(agent_id: &str, channel: &str, peer_id: &str) -> Self {
        Self(format!(
            "agent:{}:{}:direct:{}",
            agent_id.trim().to_lowercase(),
            channel.trim().to_lowercase(),
            peer_id.trim()
        ))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Agent id segment.
    #[must_use]
    pub fn agent_id(&self) -> &str {
        self.0.split(':').nth(1).unwrap_or_default()
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SessionKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.splitn(5, ':').collect();
        match parts.as_slice() {
            ["agent", agent, channel, _, peer]
                if !agent.is_empty() && !channel.is_empty() && !peer.is_empty() =>
            {
                Ok(Self(s.to_string()))
            },
            _ => Err(Error::InvalidKey { key: s.to_string() }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_key_format() {
        let key = SessionKey::direct("Main", "webhook", "+15550100");
        assert_eq!(key.as_str(), "agent:main:webhook:direct:+15550100");
        assert_eq!(key.agent_id(), "main");
    }

    #[test]
    fn peer_ids_with_colons_survive_parsing() {
        let key = SessionKey::direct("main", "webhook", "user:42");
        let parsed: SessionKey = key.as_str().parse().unwrap_or_else(|_| SessionKey::direct("x", "x", "x"));
        assert_eq!(parsed, key);
    }

    #[test]
    fn rejects_malformed_keys() {
        assert!("main".parse::<SessionKey>().is_err());
        assert!("agent::webhook:direct:x".parse::<SessionKey>().is_err());
    }
}
