use {
    hookrelay_channels::gating::DmPolicy,
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8788;
pub const DEFAULT_PATH: &str = "/";
pub const DEFAULT_MAX_CONCURRENT: usize = 16;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MEDIA_MAX_MB: u64 = 20;
pub const DEFAULT_TEXT_CHUNK_LIMIT: usize = 4000;

/// Configuration for the single webhook account.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WebhookAccountConfig {
    pub account_id: String,
    /// Ceiling for one inbound or outbound media item, in megabytes.
    pub media_max_mb: u64,
    /// Maximum characters per outbound text chunk.
    pub text_chunk_limit: usize,
    pub inbound: InboundConfig,
    pub outbound: OutboundConfig,
    pub dm: DmConfig,
}

impl Default for WebhookAccountConfig {
    fn default() -> Self {
        Self {
            account_id: "default".into(),
            media_max_mb: DEFAULT_MEDIA_MAX_MB,
            text_chunk_limit: DEFAULT_TEXT_CHUNK_LIMIT,
            inbound: InboundConfig::default(),
            outbound: OutboundConfig::default(),
            dm: DmConfig::default(),
        }
    }
}

impl WebhookAccountConfig {
    pub fn from_value(value: serde_json::Value) -> crate::Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    #[must_use]
    pub fn media_max_bytes(&self) -> u64 {
        hookrelay_media::mb_to_bytes(self.media_max_mb)
    }
}

impl std::fmt::Debug for WebhookAccountConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookAccountConfig")
            .field("account_id", &self.account_id)
            .field("media_max_mb", &self.media_max_mb)
            .field("text_chunk_limit", &self.text_chunk_limit)
            .field("inbound", &self.inbound)
            .field("outbound", &self.outbound)
            .field("dm", &self.dm)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InboundConfig {
    pub host: String,
    pub port: u16,
    pub path: String,
    /// Shared secret callers present as a bearer token.
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_option_secret"
    )]
    pub token: Option<Secret<String>>,
    /// Pipelines allowed to run at once; further messages queue.
    pub max_concurrent: usize,
}

impl Default for InboundConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.into(),
            port: DEFAULT_PORT,
            path: DEFAULT_PATH.into(),
            token: None,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
        }
    }
}

impl InboundConfig {
    /// Configured token with surrounding whitespace removed, if non-blank.
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        non_blank(self.token.as_ref())
    }

    #[must_use]
    pub fn listen_addr(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl std::fmt::Debug for InboundConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InboundConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("path", &self.path)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("max_concurrent", &self.max_concurrent)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OutboundConfig {
    pub url: Option<String>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_option_secret"
    )]
    pub token: Option<Secret<String>>,
    pub timeout_seconds: u64,
    /// Attach usage totals and the full usage snapshot to every send.
    pub include_usage: bool,
}

impl Default for OutboundConfig {
    fn default() -> Self {
        Self {
            url: None,
            token: None,
            timeout_seconds: DEFAULT_TIMEOUT_SECS,
            include_usage: false,
        }
    }
}

impl OutboundConfig {
    #[must_use]
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref().map(str::trim).filter(|u| !u.is_empty())
    }

    #[must_use]
    pub fn token(&self) -> Option<&str> {
        non_blank(self.token.as_ref())
    }
}

impl std::fmt::Debug for OutboundConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutboundConfig")
            .field("url", &self.url)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("timeout_seconds", &self.timeout_seconds)
            .field("include_usage", &self.include_usage)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DmConfig {
    pub enabled: bool,
    pub policy: DmPolicy,
    /// Static allowlist: exact sender ids, or `*` for anyone.
    pub allow_from: Vec<String>,
}

impl Default for DmConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            policy: DmPolicy::Pairing,
            allow_from: Vec::new(),
        }
    }
}

fn non_blank(secret: Option<&Secret<String>>) -> Option<&str> {
    secret
        .map(|s| s.expose_secret().trim())
        .filter(|s| !s.is_empty())
}

fn serialize_option_secret<S: serde::Serializer>(
    secret: &Option<Secret<String>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match secret {
        Some(s) => serializer.serialize_some(s.expose_secret()),
        None => serializer.serialize_none(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_sections() {
        let cfg = WebhookAccountConfig::from_value(serde_json::json!({})).unwrap();
        assert_eq!(cfg.account_id, "default");
        assert_eq!(cfg.inbound.host, "0.0.0.0");
        assert_eq!(cfg.inbound.path, "/");
        assert_eq!(cfg.inbound.max_concurrent, 16);
        assert_eq!(cfg.outbound.timeout_seconds, 30);
        assert!(!cfg.outbound.include_usage);
        assert!(cfg.dm.enabled);
        assert_eq!(cfg.dm.policy, DmPolicy::Pairing);
        assert_eq!(cfg.text_chunk_limit, 4000);
        assert_eq!(cfg.media_max_bytes(), 20 * 1024 * 1024);
    }

    #[test]
    fn parses_camel_case_sections() {
        let cfg = WebhookAccountConfig::from_value(serde_json::json!({
            "textChunkLimit": 500,
            "inbound": { "port": 9000, "token": "in-secret", "maxConcurrent": 2 },
            "outbound": { "url": "https://x/hook", "token": "out", "timeoutSeconds": 5, "includeUsage": true },
            "dm": { "policy": "allowlist", "allowFrom": ["alice"] }
        }))
        .unwrap();
        assert_eq!(cfg.text_chunk_limit, 500);
        assert_eq!(cfg.inbound.token(), Some("in-secret"));
        assert_eq!(cfg.inbound.max_concurrent, 2);
        assert_eq!(cfg.outbound.url(), Some("https://x/hook"));
        assert!(cfg.outbound.include_usage);
        assert_eq!(cfg.dm.allow_from, vec!["alice"]);
    }

    #[test]
    fn debug_redacts_tokens() {
        let cfg = WebhookAccountConfig::from_value(serde_json::json!({
            "inbound": { "token": "in-secret" },
            "outbound": { "token": "out-secret" }
        }))
        .unwrap();
        let debug = format!("{cfg:?}");
        assert!(!debug.contains("in-secret"));
        assert!(!debug.contains("out-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn blank_tokens_count_as_unset() {
        let cfg = WebhookAccountConfig::from_value(serde_json::json!({
            "inbound": { "token": "   " },
            "outbound": { "url": " " }
        }))
        .unwrap();
        assert_eq!(cfg.inbound.token(), None);
        assert_eq!(cfg.outbound.url(), None);
    }

    #[test]
    fn tokens_are_trimmed() {
        let cfg = WebhookAccountConfig::from_value(serde_json::json!({
            "inbound": { "token": "in-secret\n" },
            "outbound": { "token": " out-secret " }
        }))
        .unwrap();
        assert_eq!(cfg.inbound.token(), Some("in-secret"));
        assert_eq!(cfg.outbound.token(), Some("out-secret"));
    }

    #[test]
    fn ipv6_hosts_are_bracketed() {
        let inbound = InboundConfig {
            host: "::1".into(),
            port: 80,
            ..Default::default()
        };
        assert_eq!(inbound.listen_addr(), "[::1]:80");
    }
}
