//! Configuration problems surfaced at startup and by `hookrelay check`.

use {hookrelay_channels::gating::DmPolicy, serde::Serialize};

use crate::config::WebhookAccountConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueLevel {
    /// The account cannot start.
    Error,
    /// The account starts but some behavior is degraded.
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusIssue {
    pub level: IssueLevel,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fix: Option<String>,
}

impl StatusIssue {
    fn error(message: impl Into<String>, fix: impl Into<String>) -> Self {
        Self {
            level: IssueLevel::Error,
            message: message.into(),
            fix: Some(fix.into()),
        }
    }

    fn warning(message: impl Into<String>, fix: impl Into<String>) -> Self {
        Self {
            level: IssueLevel::Warning,
            message: message.into(),
            fix: Some(fix.into()),
        }
    }
}

/// Every problem with `config`, errors first.
#[must_use]
pub fn collect_status_issues(config: &WebhookAccountConfig) -> Vec<StatusIssue> {
    let mut issues = Vec::new();

    if config.inbound.token().is_none() {
        issues.push(StatusIssue::error(
            "inbound token is not set; every request would be rejected",
            "set channels.webhook.inbound.token (e.g. \"${HOOKRELAY_INBOUND_TOKEN}\")",
        ));
    }
    if !config.inbound.path.starts_with('/') {
        issues.push(StatusIssue::error(
            format!("inbound path {:?} must start with '/'", config.inbound.path),
            "set channels.webhook.inbound.path to an absolute path such as \"/\"",
        ));
    }
    if config.inbound.path == "/health" {
        issues.push(StatusIssue::error(
            "inbound path collides with the /health route",
            "choose a different channels.webhook.inbound.path",
        ));
    }
    if config.inbound.max_concurrent == 0 {
        issues.push(StatusIssue::error(
            "inbound.maxConcurrent is 0; no message could ever be processed",
            "set channels.webhook.inbound.maxConcurrent to 1 or more",
        ));
    }
    if config.dm.policy == DmPolicy::Open && !config.dm.allow_from.iter().any(|e| e == "*") {
        issues.push(StatusIssue::error(
            "dm.policy is \"open\" but dm.allowFrom does not contain \"*\"",
            "add \"*\" to channels.webhook.dm.allowFrom, or use policy \"allowlist\"",
        ));
    }
    if config.text_chunk_limit == 0 {
        issues.push(StatusIssue::error(
            "textChunkLimit is 0",
            "set channels.webhook.textChunkLimit to a positive number (default 4000)",
        ));
    }
    if config.outbound.timeout_seconds == 0 {
        issues.push(StatusIssue::error(
            "outbound.timeoutSeconds is 0; every send would time out",
            "set channels.webhook.outbound.timeoutSeconds (default 30)",
        ));
    }

    match config.outbound.url() {
        None => issues.push(StatusIssue::warning(
            "outbound url is not set; replies cannot be delivered",
            "set channels.webhook.outbound.url",
        )),
        Some(url) => match url::Url::parse(url) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {},
            _ => issues.push(StatusIssue::warning(
                format!("outbound url {url:?} is not a valid http(s) URL"),
                "set channels.webhook.outbound.url to an http:// or https:// URL",
            )),
        },
    }
    if config.outbound.token().is_none() {
        issues.push(StatusIssue::warning(
            "outbound token is not set; replies cannot be delivered",
            "set channels.webhook.outbound.token",
        ));
    }
    if !config.dm.enabled || config.dm.policy == DmPolicy::Disabled {
        issues.push(StatusIssue::warning(
            "direct messages are disabled; every inbound message is dropped",
            "set channels.webhook.dm.enabled = true and choose a policy",
        ));
    }

    issues.sort_by_key(|i| i.level != IssueLevel::Error);
    issues
}
