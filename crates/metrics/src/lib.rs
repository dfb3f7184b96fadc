//! Metric names, the recording facade, and the Prometheus recorder used by
//! hookrelay crates.
//!
//! All crates record through the `metrics` facade macros re-exported here.
//! Without an installed recorder the calls are no-ops; the binary installs
//! one with [`init_metrics`] and serves [`MetricsHandle::render`].
//!
//! ```rust,ignore
//! use hookrelay_metrics::{counter, webhook, labels};
//!
//! counter!(webhook::INBOUND_REQUESTS_TOTAL, labels::STATUS => "200").increment(1);
//! ```

mod definitions;
mod recorder;

pub use {
    definitions::*,
    recorder::{MetricsHandle, MetricsRecorderConfig, init_metrics},
};

pub use metrics::{counter, gauge, histogram};
