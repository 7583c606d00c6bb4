//! Click accounting for links and lists
//!
//! Clicks are not stored one row per visit. Each entity carries a small
//! ledger: a pre-summed archive of old clicks plus one bucket per day for the
//! last 30 days. This keeps at most 31 buckets per entity while still giving
//! an exact lifetime total and day-granular recency.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Number of days a click stays in its own bucket before being archived
pub const RECENT_WINDOW_DAYS: i32 = 30;

/// Day ordinal meaning "never clicked"
pub const NEVER: i32 = 0;

/// Day ordinal of a calendar date, counting 0001-01-01 as day 1
pub fn day_ordinal(date: NaiveDate) -> i32 {
    date.num_days_from_ce()
}

/// Today's day ordinal (UTC)
pub fn today() -> i32 {
    day_of(Utc::now())
}

/// Day ordinal of a timestamp (UTC)
pub fn day_of(at: DateTime<Utc>) -> i32 {
    day_ordinal(at.date_naive())
}

/// Per-entity click counters
///
/// `total_clicks() == archived_clicks + sum(buckets)` holds after every
/// call to [`ClickLedger::record_click`].
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ClickLedger {
    /// Clicks older than the recent window, pre-summed
    #[serde(default)]
    archived_clicks: u64,

    /// Day ordinal -> clicks on that day, only for days inside the window
    #[serde(default)]
    buckets: BTreeMap<i32, u64>,
}

impl ClickLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a ledger from raw parts (used by snapshot import).
    ///
    /// Buckets are taken as-is; they get re-partitioned on the next click.
    pub fn from_parts(archived_clicks: u64, buckets: BTreeMap<i32, u64>) -> Self {
        Self {
            archived_clicks,
            buckets,
        }
    }

    /// Records `n` clicks on day `today`.
    ///
    /// Buckets with `today - 30 > day` are folded into the archive before
    /// today's bucket is incremented.
    pub fn record_click(&mut self, n: u64, today: i32) {
        let recent = self.buckets.split_off(&(today - RECENT_WINDOW_DAYS));
        let archived: u64 = self.buckets.values().sum();
        self.archived_clicks += archived;
        self.buckets = recent;

        *self.buckets.entry(today).or_insert(0) += n;
    }

    pub fn archived_clicks(&self) -> u64 {
        self.archived_clicks
    }

    /// Clicks inside the recent window only
    pub fn recent_clicks(&self) -> u64 {
        self.buckets.values().sum()
    }

    pub fn total_clicks(&self) -> u64 {
        self.archived_clicks + self.recent_clicks()
    }

    /// Most recent day with a click, or [`NEVER`]
    pub fn last_click_day(&self) -> i32 {
        self.buckets.keys().next_back().copied().unwrap_or(NEVER)
    }

    pub fn buckets(&self) -> &BTreeMap<i32, u64> {
        &self.buckets
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}
