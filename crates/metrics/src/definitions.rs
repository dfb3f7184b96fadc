//! Metric name and label definitions.
//!
//! Centralizing names here keeps them consistent across crates and documents
//! what is recorded.

/// Inbound webhook listener metrics
pub mod webhook {
    /// Inbound HTTP requests, labelled by response status
    pub const INBOUND_REQUESTS_TOTAL: &str = "hookrelay_webhook_inbound_requests_total";
    /// Inbound messages accepted into the pipeline
    pub const MESSAGES_ACCEPTED_TOTAL: &str = "hookrelay_webhook_messages_accepted_total";
    /// Messages dropped by DM policy, labelled by reason
    pub const MESSAGES_DROPPED_TOTAL: &str = "hookrelay_webhook_messages_dropped_total";
    /// Pairing codes issued to unknown senders
    pub const PAIRING_REQUESTS_TOTAL: &str = "hookrelay_webhook_pairing_requests_total";
    /// Pipelines currently running
    pub const PIPELINES_ACTIVE: &str = "hookrelay_webhook_pipelines_active";
    /// End-to-end pipeline duration in seconds
    pub const PIPELINE_DURATION_SECONDS: &str = "hookrelay_webhook_pipeline_duration_seconds";
}

/// Outbound delivery metrics
pub mod outbound {
    /// Outbound HTTP calls, labelled by success
    pub const SENDS_TOTAL: &str = "hookrelay_outbound_sends_total";
    /// Outbound failures, labelled by error type
    pub const ERRORS_TOTAL: &str = "hookrelay_outbound_errors_total";
    /// Outbound call duration in seconds
    pub const SEND_DURATION_SECONDS: &str = "hookrelay_outbound_send_duration_seconds";
}

/// Media pipeline metrics
pub mod media {
    /// Media items saved locally, labelled by source (remote / inline)
    pub const SAVED_TOTAL: &str = "hookrelay_media_saved_total";
    /// Media items that failed to resolve
    pub const FAILURES_TOTAL: &str = "hookrelay_media_failures_total";
    /// Bytes written to the media store
    pub const BYTES_TOTAL: &str = "hookrelay_media_bytes_total";
}

/// Token usage accounting metrics
pub mod usage {
    /// Usage events folded into the tracker
    pub const EVENTS_TOTAL: &str = "hookrelay_usage_events_total";
    /// Tokens recorded, labelled by provider and kind
    pub const TOKENS_TOTAL: &str = "hookrelay_usage_tokens_total";
    /// Snapshot saves, labelled by success
    pub const SAVES_TOTAL: &str = "hookrelay_usage_saves_total";
}

/// Common label keys
pub mod labels {
    pub const STATUS: &str = "status";
    pub const PROVIDER: &str = "provider";
    pub const MODEL: &str = "model";
    pub const CHANNEL: &str = "channel";
    pub const ERROR_TYPE: &str = "error_type";
    pub const SUCCESS: &str = "success";
    pub const REASON: &str = "reason";
    pub const SOURCE: &str = "source";
    pub const KIND: &str = "kind";
    pub const ACCOUNT_ID: &str = "account_id";
}

/// Histogram buckets
pub mod buckets {
    /// Request and pipeline durations in seconds, 5ms to 60s
    pub const DURATION_SECONDS: &[f64] = &[
        0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
    ];
}
