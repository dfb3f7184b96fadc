//! HTTP webhook channel.
//!
//! Inbound: an authenticated axum listener accepts chat-style JSON messages,
//! acknowledges them immediately, then normalizes, gates, resolves media,
//! routes and dispatches them to the backend on a detached task.
//!
//! Outbound: backend replies are POSTed to a configured URL, one call per
//! media item or text chunk, with a per-call timeout.

pub mod access;
pub mod auth;
pub mod config;
pub mod delivery;
pub mod error;
pub mod inbound;
pub mod markdown;
pub mod normalize;
pub mod outbound;
pub mod pipeline;
pub mod plugin;
pub mod runtime;
pub mod server;
pub mod state;
pub mod status;

/// Channel identifier used in session keys, pairing files and addresses.
pub const CHANNEL_ID: &str = "webhook";

pub use {
    config::WebhookAccountConfig,
    error::{Error, Result},
    markdown::{MarkdownChunker, TextChunker},
    outbound::{OutboundClient, OutboundMessage, SendError, SendReceipt},
    plugin::WebhookPlugin,
    runtime::WebhookRuntime,
    server::{ServerHandle, start_server},
    status::{IssueLevel, StatusIssue, collect_status_issues},
};
