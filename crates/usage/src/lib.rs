//! Token usage accounting.
//!
//! A [`TokenUsageTracker`] folds [`UsageEvent`]s emitted on a process-wide
//! [`UsageEventBus`] into four rolling windows (all-time, monthly, weekly,
//! daily), keyed by provider and model, and persists the aggregate as a JSON
//! snapshot on a fixed autosave interval.

pub mod error;
pub mod event;
pub mod tracker;
pub mod types;

pub use {
    error::{Error, Result},
    event::{UsageEvent, UsageEventBus},
    tracker::{LoadOutcome, TokenUsageTracker},
    types::{Period, TokenCounters, TokenUsageData, TokenUsagePeriod, UsageSummary},
};
