use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{error::Error, event::UsageEvent};

const HOUR_MS: i64 = 60 * 60 * 1000;
const DAY_MS: i64 = 24 * HOUR_MS;

/// Aggregation window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Period {
    AllTime,
    Monthly,
    Weekly,
    Daily,
}

impl Period {
    pub const ALL: [Self; 4] = [Self::AllTime, Self::Monthly, Self::Weekly, Self::Daily];

    /// Window length in milliseconds, `None` for a period that never resets.
    #[must_use]
    pub fn window_ms(self) -> Option<i64> {
        match self {
            Self::AllTime => None,
            Self::Monthly => Some(30 * DAY_MS),
            Self::Weekly => Some(7 * DAY_MS),
            Self::Daily => Some(DAY_MS),
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AllTime => "allTime",
            Self::Monthly => "monthly",
            Self::Weekly => "weekly",
            Self::Daily => "daily",
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Period {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "all" | "alltime" => Ok(Self::AllTime),
            "month" | "monthly" => Ok(Self::Monthly),
            "week" | "weekly" => Ok(Self::Weekly),
            "day" | "daily" => Ok(Self::Daily),
            _ => Err(Error::UnknownPeriod {
                value: s.to_string(),
            }),
        }
    }
}

/// Token counters for one provider/model pair (or a rollup of several).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TokenCounters {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_tokens: u64,
    pub cache_write_tokens: u64,
    pub total_tokens: u64,
    pub request_count: u64,
}

impl TokenCounters {
    pub fn record(&mut self, event: &UsageEvent) {
        self.input_tokens = self.input_tokens.saturating_add(event.input);
        self.output_tokens = self.output_tokens.saturating_add(event.output);
        self.cache_read_tokens = self.cache_read_tokens.saturating_add(event.cache_read);
        self.cache_write_tokens = self.cache_write_tokens.saturating_add(event.cache_write);
        self.total_tokens = self.total_tokens.saturating_add(event.total_tokens());
        self.request_count = self.request_count.saturating_add(1);
    }

    pub fn merge(&mut self, other: &Self) {
        self.input_tokens = self.input_tokens.saturating_add(other.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(other.output_tokens);
        self.cache_read_tokens = self.cache_read_tokens.saturating_add(other.cache_read_tokens);
        self.cache_write_tokens = self
            .cache_write_tokens
            .saturating_add(other.cache_write_tokens);
        self.total_tokens = self.total_tokens.saturating_add(other.total_tokens);
        self.request_count = self.request_count.saturating_add(other.request_count);
    }
}

/// Counters for a single window, keyed provider -> model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsagePeriod {
    pub started_at: i64,
    pub last_updated_at: i64,
    #[serde(default)]
    pub providers: BTreeMap<String, BTreeMap<String, TokenCounters>>,
}

impl TokenUsagePeriod {
    #[must_use]
    pub fn new(now: i64) -> Self {
        Self {
            started_at: now,
            last_updated_at: now,
            providers: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn is_expired(&self, period: Period, now: i64) -> bool {
        period
            .window_ms()
            .is_some_and(|window| now.saturating_sub(self.started_at) > window)
    }

    pub fn reset(&mut self, now: i64) {
        *self = Self::new(now);
    }

    pub fn record(&mut self, event: &UsageEvent, now: i64) {
        self.providers
            .entry(event.provider.clone())
            .or_default()
            .entry(event.model.clone())
            .or_default()
            .record(event);
        self.last_updated_at = now;
    }

    /// Sum across every provider and model.
    #[must_use]
    pub fn totals(&self) -> TokenCounters {
        let mut totals = TokenCounters::default();
        for counters in self.providers.values().flat_map(BTreeMap::values) {
            totals.merge(counters);
        }
        totals
    }
}

/// The full persisted aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsageData {
    pub all_time: TokenUsagePeriod,
    pub monthly: TokenUsagePeriod,
    pub weekly: TokenUsagePeriod,
    pub daily: TokenUsagePeriod,
}

impl TokenUsageData {
    #[must_use]
    pub fn new(now: i64) -> Self {
        Self {
            all_time: TokenUsagePeriod::new(now),
            monthly: TokenUsagePeriod::new(now),
            weekly: TokenUsagePeriod::new(now),
            daily: TokenUsagePeriod::new(now),
        }
    }

    #[must_use]
    pub fn period(&self, period: Period) -> &TokenUsagePeriod {
        match period {
            Period::AllTime => &self.all_time,
            Period::Monthly => &self.monthly,
            Period::Weekly => &self.weekly,
            Period::Daily => &self.daily,
        }
    }

    pub fn period_mut(&mut self, period: Period) -> &mut TokenUsagePeriod {
        match period {
            Period::AllTime => &mut self.all_time,
            Period::Monthly => &mut self.monthly,
            Period::Weekly => &mut self.weekly,
            Period::Daily => &mut self.daily,
        }
    }

    /// Reset every window older than its length. Returns the windows that reset.
    pub fn expire_stale(&mut self, now: i64) -> Vec<Period> {
        let mut expired = Vec::new();
        for period in Period::ALL {
            let slot = self.period_mut(period);
            if slot.is_expired(period, now) {
                slot.reset(now);
                expired.push(period);
            }
        }
        expired
    }

    /// Apply expiry, then count the event in every window.
    pub fn record(&mut self, event: &UsageEvent, now: i64) {
        self.expire_stale(now);
        for period in Period::ALL {
            self.period_mut(period).record(event, now);
        }
    }

    /// Reset one window, or all of them when `period` is `None`.
    pub fn reset(&mut self, period: Option<Period>, now: i64) {
        match period {
            Some(period) => self.period_mut(period).reset(now),
            None => *self = Self::new(now),
        }
    }

    #[must_use]
    pub fn summary(&self) -> UsageSummary {
        UsageSummary {
            all_time: self.all_time.totals(),
            monthly: self.monthly.totals(),
            weekly: self.weekly.totals(),
            daily: self.daily.totals(),
        }
    }
}

/// Per-window totals, as attached to outbound messages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSummary {
    pub all_time: TokenCounters,
    pub monthly: TokenCounters,
    pub weekly: TokenCounters,
    pub daily: TokenCounters,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn event(provider: &str, model: &str, input: u64, output: u64) -> UsageEvent {
        UsageEvent::new(provider, model, input, output)
    }

    #[test]
    fn record_counts_in_every_window() {
        let mut data = TokenUsageData::new(0);
        data.record(&event("anthropic", "claude", 10, 5), 1_000);
        data.record(&event("anthropic", "claude", 1, 1), 2_000);

        for period in Period::ALL {
            let counters = data.period(period).providers["anthropic"]["claude"];
            assert_eq!(counters.input_tokens, 11);
            assert_eq!(counters.output_tokens, 6);
            assert_eq!(counters.total_tokens, 17);
            assert_eq!(counters.request_count, 2);
            assert_eq!(data.period(period).last_updated_at, 2_000);
        }
    }

    #[test]
    fn daily_resets_after_a_day_and_others_keep_counting() {
        let mut data = TokenUsageData::new(0);
        data.record(&event("openai", "gpt", 100, 0), 0);

        let later = 25 * HOUR_MS;
        data.record(&event("openai", "gpt", 1, 0), later);

        assert_eq!(data.daily.started_at, later);
        assert_eq!(data.daily.totals().input_tokens, 1);
        assert_eq!(data.weekly.started_at, 0);
        assert_eq!(data.weekly.totals().input_tokens, 101);
        assert_eq!(data.monthly.totals().input_tokens, 101);
        assert_eq!(data.all_time.totals().input_tokens, 101);
    }

    #[test]
    fn exactly_one_window_old_is_not_expired() {
        let period = TokenUsagePeriod::new(0);
        assert!(!period.is_expired(Period::Daily, DAY_MS));
        assert!(period.is_expired(Period::Daily, DAY_MS + 1));
        assert!(!period.is_expired(Period::AllTime, i64::MAX));
    }

    #[test]
    fn expire_stale_reports_reset_windows() {
        let mut data = TokenUsageData::new(0);
        let expired = data.expire_stale(8 * DAY_MS);
        assert_eq!(expired, vec![Period::Weekly, Period::Daily]);
        assert_eq!(data.monthly.started_at, 0);
    }

    #[test]
    fn totals_sum_across_providers_and_models() {
        let mut data = TokenUsageData::new(0);
        data.record(&event("a", "m1", 1, 2), 1);
        data.record(&event("a", "m2", 3, 4), 1);
        data.record(&event("b", "m1", 5, 6), 1);

        let summary = data.summary();
        assert_eq!(summary.all_time.input_tokens, 9);
        assert_eq!(summary.all_time.output_tokens, 12);
        assert_eq!(summary.all_time.request_count, 3);
    }

    #[test]
    fn reset_single_period_leaves_others() {
        let mut data = TokenUsageData::new(0);
        data.record(&event("a", "m", 1, 1), 1);
        data.reset(Some(Period::Weekly), 50);

        assert!(data.weekly.providers.is_empty());
        assert_eq!(data.weekly.started_at, 50);
        assert_eq!(data.daily.totals().request_count, 1);

        data.reset(None, 60);
        assert_eq!(data, TokenUsageData::new(60));
    }

    #[test]
    fn serializes_camel_case_keys() {
        let mut data = TokenUsageData::new(7);
        data.record(&event("p", "m", 1, 1), 7);
        let json = serde_json::to_value(&data).unwrap();

        assert_eq!(json["allTime"]["startedAt"], 7);
        let counters = &json["daily"]["providers"]["p"]["m"];
        assert_eq!(counters["inputTokens"], 1);
        assert_eq!(counters["cacheReadTokens"], 0);
        assert_eq!(counters["requestCount"], 1);
    }

    #[test]
    fn parses_period_names() {
        assert_eq!("daily".parse::<Period>().unwrap(), Period::Daily);
        assert_eq!("all-time".parse::<Period>().unwrap(), Period::AllTime);
        assert_eq!("allTime".parse::<Period>().unwrap(), Period::AllTime);
        assert_eq!("WEEK".parse::<Period>().unwrap(), Period::Weekly);
        assert!("yearly".parse::<Period>().is_err());
    }
}
