//! Outbound delivery: one POST per message to the configured URL.

use std::time::{Duration, Instant};

use {
    futures::StreamExt,
    hookrelay_usage::{TokenUsageData, UsageSummary},
    serde::{Deserialize, Serialize},
    tracing::{debug, warn},
};

#[cfg(feature = "metrics")]
use hookrelay_metrics::{counter, histogram, labels, outbound as outbound_metrics};

use crate::config::OutboundConfig;

/// Longest response body excerpt kept in [`SendError::Status`].
const MAX_REASON_LEN: usize = 200;

/// Receiver response bytes read before the rest is discarded.
pub const MAX_RESPONSE_BYTES: usize = 64 * 1024;

/// A file attached to an outbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundFile {
    /// Base64 payload.
    pub data: String,
    pub media_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

/// JSON body POSTed to the outbound URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundMessage {
    pub text: String,
    /// Recipient id (the inbound sender).
    pub to: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<OutboundFile>,
    /// Epoch millis.
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<TokenUsageData>,
}

impl OutboundMessage {
    pub fn text(to: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            to: to.into(),
            files: Vec::new(),
            timestamp: hookrelay_common::types::now_ms(),
            usage: None,
            tokens: None,
        }
    }

    #[must_use]
    pub fn with_file(mut self, file: OutboundFile) -> Self {
        self.files.push(file);
        self
    }

    /// Nothing to send: blank text and no files.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.files.is_empty()
    }
}

/// Successful delivery.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendReceipt {
    /// `messageId` from the receiver's JSON response, when it sent one.
    pub message_id: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("outbound {missing} is not configured")]
    NotConfigured { missing: &'static str },

    #[error("outbound url {url:?} is invalid: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("refusing to send an empty message")]
    EmptyMessage,

    #[error("outbound request timed out after {after:?}")]
    Timeout { after: Duration },

    #[error("outbound endpoint answered HTTP {status}: {reason}")]
    Status { status: u16, reason: String },

    #[error("outbound request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

impl SendError {
    /// Short label for logs and metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotConfigured { .. } => "not_configured",
            Self::InvalidUrl { .. } => "invalid_url",
            Self::EmptyMessage => "empty",
            Self::Timeout { .. } => "timeout",
            Self::Status { .. } => "status",
            Self::Transport(_) => "transport",
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReceiverResponse {
    #[serde(default)]
    message_id: Option<serde_json::Value>,
}

/// POSTs [`OutboundMessage`]s with bearer auth.
#[derive(Debug, Clone, Default)]
pub struct OutboundClient {
    http: reqwest::Client,
}

impl OutboundClient {
    #[must_use]
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// Check that `config` can be used for delivery without sending anything.
    pub fn probe(config: &OutboundConfig) -> Result<url::Url, SendError> {
        let raw = config
            .url()
            .ok_or(SendError::NotConfigured { missing: "url" })?;
        if config.token().is_none() {
            return Err(SendError::NotConfigured { missing: "token" });
        }
        let url = url::Url::parse(raw).map_err(|e| SendError::InvalidUrl {
            url: raw.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(SendError::InvalidUrl {
                url: raw.to_string(),
                reason: format!("unsupported scheme {:?}", url.scheme()),
            });
        }
        Ok(url)
    }

    /// Deliver `message`.
    ///
    /// The whole exchange (connect, send, response headers and body) is
    /// bounded by `timeoutSeconds`; on expiry the in-flight request is
    /// dropped.
    pub async fn send(&self, config: &OutboundConfig, message: &OutboundMessage) -> Result<SendReceipt, SendError> {
        let url = Self::probe(config)?;
        let token = config
            .token()
            .ok_or(SendError::NotConfigured { missing: "token" })?;
        if message.is_empty() {
            return Err(SendError::EmptyMessage);
        }

        let timeout = Duration::from_secs(config.timeout_seconds);
        let started = Instant::now();
        let result = match tokio::time::timeout(timeout, self.post(url, token, message)).await {
            Ok(result) => result,
            Err(_) => Err(SendError::Timeout { after: timeout }),
        };

        #[cfg(feature = "metrics")]
        {
            histogram!(outbound_metrics::SEND_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
            counter!(outbound_metrics::SENDS_TOTAL, labels::SUCCESS => result.is_ok().to_string()).increment(1);
            if let Err(e) = &result {
                counter!(outbound_metrics::ERRORS_TOTAL, labels::ERROR_TYPE => e.kind()).increment(1);
            }
        }

        match &result {
            Ok(receipt) => debug!(
                to = %message.to,
                files = message.files.len(),
                message_id = ?receipt.message_id,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "outbound message delivered"
            ),
            Err(e) => warn!(to = %message.to, kind = e.kind(), error = %e, "outbound send failed"),
        }
        result
    }

    async fn post(&self, url: url::Url, token: &str, message: &OutboundMessage) -> Result<SendReceipt, SendError> {
        let resp = self
            .http
            .post(url)
            .bearer_auth(token)
            .json(message)
            .send()
            .await?;
        let status = resp.status();
        let body = read_capped(resp, MAX_RESPONSE_BYTES).await;

        if !status.is_success() {
            let excerpt = body.trim();
            let reason = if excerpt.is_empty() {
                status.canonical_reason().unwrap_or("unknown").to_string()
            } else {
                truncate(excerpt, MAX_REASON_LEN)
            };
            return Err(SendError::Status {
                status: status.as_u16(),
                reason,
            });
        }

        let message_id = serde_json::from_str::<ReceiverResponse>(&body)
            .ok()
            .and_then(|r| r.message_id)
            .and_then(|id| match id {
                serde_json::Value::String(s) => Some(s),
                serde_json::Value::Number(n) => Some(n.to_string()),
                _ => None,
            });
        Ok(SendReceipt { message_id })
    }
}

/// Read at most `max` bytes of the response body. A read error ends the body
/// early.
async fn read_capped(resp: reqwest::Response, max: usize) -> String {
    let mut bytes = Vec::new();
    let mut stream = resp.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let Ok(chunk) = chunk else {
            break;
        };
        let take = chunk.len().min(max - bytes.len());
        bytes.extend_from_slice(&chunk[..take]);
        if bytes.len() >= max {
            debug!(max, "receiver response truncated");
            break;
        }
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    format!("{}…", &text[..text.floor_char_boundary(max)])
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {
        super::*,
        axum::{
            Json, Router,
            http::{HeaderMap, StatusCode},
            routing::post,
        },
        std::sync::{Arc, Mutex},
    };

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}/hook")
    }

    fn config(url: &str) -> OutboundConfig {
        serde_json::from_value(serde_json::json!({
            "url": url,
            "token": "out-token",
            "timeoutSeconds": 2
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn posts_json_with_bearer_and_reads_message_id() {
        let seen = Arc::new(Mutex::new(None));
        let seen_c = Arc::clone(&seen);
        let router = Router::new().route(
            "/hook",
            post(move |headers: HeaderMap, Json(body): Json<serde_json::Value>| {
                let seen = Arc::clone(&seen_c);
                async move {
                    let auth = headers["authorization"].to_str().unwrap().to_string();
                    *seen.lock().unwrap() = Some((auth, body));
                    Json(serde_json::json!({ "messageId": 7 }))
                }
            }),
        );
        let url = serve(router).await;

        let msg = OutboundMessage::text("alice", "hi");
        let receipt = OutboundClient::default().send(&config(&url), &msg).await.unwrap();
        assert_eq!(receipt.message_id.as_deref(), Some("7"));

        let (auth, body) = seen.lock().unwrap().take().unwrap();
        assert_eq!(auth, "Bearer out-token");
        assert_eq!(body["text"], "hi");
        assert_eq!(body["to"], "alice");
        assert!(body.get("files").is_none());
        assert!(body.get("usage").is_none());
    }

    #[tokio::test]
    async fn non_json_success_is_bare_receipt() {
        let router = Router::new().route("/hook", post(|| async { "accepted" }));
        let url = serve(router).await;
        let receipt = OutboundClient::default()
            .send(&config(&url), &OutboundMessage::text("a", "b"))
            .await
            .unwrap();
        assert_eq!(receipt, SendReceipt::default());
    }

    #[tokio::test]
    async fn endless_success_body_is_not_read_to_the_end() {
        const PAD: [u8; 1024] = [b' '; 1024];
        let router = Router::new().route(
            "/hook",
            post(|| async {
                let endless = futures::stream::repeat(Ok::<_, std::convert::Infallible>(
                    bytes::Bytes::from_static(&PAD),
                ));
                axum::body::Body::from_stream(endless)
            }),
        );
        let url = serve(router).await;
        let receipt = OutboundClient::default()
            .send(&config(&url), &OutboundMessage::text("a", "b"))
            .await
            .unwrap();
        assert_eq!(receipt, SendReceipt::default());
    }

    #[tokio::test]
    async fn oversized_error_body_is_cut_to_an_excerpt() {
        let router = Router::new().route(
            "/hook",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "e".repeat(4 * MAX_RESPONSE_BYTES)) }),
        );
        let url = serve(router).await;
        let err = OutboundClient::default()
            .send(&config(&url), &OutboundMessage::text("a", "b"))
            .await
            .unwrap_err();
        let SendError::Status { status, reason } = err else {
            panic!("unexpected error: {err:?}");
        };
        assert_eq!(status, 500);
        assert_eq!(reason, format!("{}…", "e".repeat(MAX_REASON_LEN)));
    }

    #[tokio::test]
    async fn non_2xx_maps_to_status_error() {
        let router = Router::new().route(
            "/hook",
            post(|| async { (StatusCode::BAD_GATEWAY, "upstream down") }),
        );
        let url = serve(router).await;
        let err = OutboundClient::default()
            .send(&config(&url), &OutboundMessage::text("a", "b"))
            .await
            .unwrap_err();
        match err {
            SendError::Status { status, reason } => {
                assert_eq!(status, 502);
                assert_eq!(reason, "upstream down");
            },
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn slow_receiver_times_out() {
        let router = Router::new().route(
            "/hook",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "late"
            }),
        );
        let url = serve(router).await;
        let mut cfg = config(&url);
        cfg.timeout_seconds = 1;
        let err = OutboundClient::default()
            .send(&cfg, &OutboundMessage::text("a", "b"))
            .await
            .unwrap_err();
        assert!(matches!(err, SendError::Timeout { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn missing_configuration_sends_nothing() {
        let cfg = OutboundConfig::default();
        let err = OutboundClient::default()
            .send(&cfg, &OutboundMessage::text("a", "b"))
            .await
            .unwrap_err();
        assert!(matches!(err, SendError::NotConfigured { missing: "url" }));

        let mut cfg = config("https://example.com/hook");
        cfg.token = None;
        assert!(matches!(
            OutboundClient::probe(&cfg),
            Err(SendError::NotConfigured { missing: "token" })
        ));
    }

    #[test]
    fn probe_rejects_bad_urls() {
        assert!(matches!(
            OutboundClient::probe(&config("not a url")),
            Err(SendError::InvalidUrl { .. })
        ));
        assert!(matches!(
            OutboundClient::probe(&config("ftp://x/y")),
            Err(SendError::InvalidUrl { .. })
        ));
        assert!(OutboundClient::probe(&config("https://x/y")).is_ok());
    }

    #[tokio::test]
    async fn empty_message_is_refused() {
        let err = OutboundClient::default()
            .send(&config("https://example.invalid/hook"), &OutboundMessage::text("a", "  "))
            .await
            .unwrap_err();
        assert!(matches!(err, SendError::EmptyMessage));
    }

    #[test]
    fn truncate_keeps_char_boundaries() {
        let long = "é".repeat(300);
        let out = truncate(&long, 5);
        assert!(out.ends_with('…'));
        assert_eq!(out.chars().count(), 3);
    }
}
