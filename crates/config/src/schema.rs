//! Config schema types.
use std::{collections::HashMap, path::PathBuf};

use serde::{Deserialize, Serialize};

pub const DEFAULT_AUTOSAVE_SECS: u64 = 30;
pub const DEFAULT_METRICS_LISTEN: &str = "127.0.0.1:9464";

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HookrelayConfig {
    pub channels: ChannelsConfig,
    pub usage: UsageConfig,
    pub storage: StorageConfig,
    pub metrics: MetricsConfig,
}

/// Per-channel account configuration, kept as raw JSON.
///
/// Each channel crate owns the typed shape of its own section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UsageConfig {
    /// Snapshot file. Defaults to `<dataDir>/usage.json`.
    pub path: Option<PathBuf>,
    pub autosave_secs: u64,
}

impl Default for UsageConfig {
    fn default() -> Self {
        Self {
            path: None,
            autosave_secs: DEFAULT_AUTOSAVE_SECS,
        }
    }
}

/// Metrics collection and the Prometheus scrape endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MetricsConfig {
    /// Whether metrics collection is enabled.
    pub enabled: bool,
    /// Whether to expose the `/metrics` Prometheus endpoint.
    pub prometheus_endpoint: bool,
    /// Address the `/metrics` endpoint binds to.
    pub listen: String,
    /// Additional labels to add to all metrics.
    pub labels: HashMap<String, String>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            prometheus_endpoint: true,
            listen: DEFAULT_METRICS_LISTEN.into(),
            labels: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StorageConfig {
    pub data_dir: Option<PathBuf>,
}

impl HookrelayConfig {
    /// Configured data directory, or the platform default.
    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        self.storage
            .data_dir
            .clone()
            .unwrap_or_else(crate::loader::default_data_dir)
    }

    #[must_use]
    pub fn usage_path(&self) -> PathBuf {
        self.usage
            .path
            .clone()
            .unwrap_or_else(|| self.data_dir().join("usage.json"))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_to_empty_document() {
        let config: HookrelayConfig = toml::from_str("").unwrap();
        assert!(config.channels.webhook.is_none());
        assert_eq!(config.usage.autosave_secs, DEFAULT_AUTOSAVE_SECS);
    }

    #[test]
    fn metrics_section_overrides_defaults() {
        let config: HookrelayConfig = toml::from_str("").unwrap();
        assert!(config.metrics.enabled);
        assert_eq!(config.metrics.listen, DEFAULT_METRICS_LISTEN);

        let config: HookrelayConfig = toml::from_str(
            r#"
[metrics]
prometheusEndpoint = false
listen = "0.0.0.0:9100"
[metrics.labels]
instance = "edge-1"
"#,
        )
        .unwrap();
        assert!(config.metrics.enabled);
        assert!(!config.metrics.prometheus_endpoint);
        assert_eq!(config.metrics.listen, "0.0.0.0:9100");
        assert_eq!(config.metrics.labels["instance"], "edge-1");
    }

    #[test]
    fn usage_path_defaults_under_data_dir() {
        let config: HookrelayConfig = toml::from_str("[storage]\ndataDir = \"/srv/hr\"\n").unwrap();
        assert_eq!(config.usage_path(), PathBuf::from("/srv/hr/usage.json"));
    }

    #[test]
    fn webhook_section_is_kept_raw() {
        let config: HookrelayConfig = toml::from_str(
            r#"
[channels.webhook]
textChunkLimit = 1200
[channels.webhook.inbound]
port = 8788
"#,
        )
        .unwrap();
        let webhook = config.channels.webhook.unwrap();
        assert_eq!(webhook["textChunkLimit"], 1200);
        assert_eq!(webhook["inbound"]["port"], 8788);
    }
}
