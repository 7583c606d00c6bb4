//! Popularity ordering and freshness display helpers

use std::cmp::Reverse;

use chrono::{DateTime, Utc};

use crate::clicks::{ClickLedger, RECENT_WINDOW_DAYS};

/// Anything that carries a click ledger: links and lists alike
pub trait Clickable {
    fn clicks(&self) -> &ClickLedger;
}

impl Clickable for ClickLedger {
    fn clicks(&self) -> &ClickLedger {
        self
    }
}

impl<T: Clickable + ?Sized> Clickable for &T {
    fn clicks(&self) -> &ClickLedger {
        (**self).clicks()
    }
}

/// Sorts by descending recent clicks, then descending total clicks.
///
/// The sort is stable: items with equal counters keep their input order.
pub fn rank_by_popularity<T: Clickable>(mut items: Vec<T>) -> Vec<T> {
    items.sort_by_key(|item| {
        let clicks = item.clicks();
        (Reverse(clicks.recent_clicks()), Reverse(clicks.total_clicks()))
    });
    items
}

/// Lowest opacity an entity fades to
pub const OPACITY_FLOOR: f64 = 0.2;

/// Display emphasis in `[0.2, 1.0]`: 1.0 when clicked today, fading linearly
/// to 0.2 once the last click is 30 or more days old.
pub fn opacity(ledger: &ClickLedger, today: i32) -> f64 {
    let stale_days = f64::from(today - ledger.last_click_day());
    let window = f64::from(RECENT_WINDOW_DAYS);
    ((window - stale_days) / window).clamp(OPACITY_FLOOR, 1.0)
}

/// Relative label for a day ordinal, e.g. `"yesterday"` or `"3 months ago"`.
///
/// Anything below day 10 is treated as the "never clicked" sentinel.
pub fn pretty_day(day: i32, today: i32) -> String {
    if day < 10 {
        return "never".to_string();
    }

    relative_days(i64::from(today - day))
}

/// Relative label for a unix timestamp in seconds.
///
/// Timestamps below 100000 are treated as unset.
pub fn pretty_time(timestamp: i64, now: DateTime<Utc>) -> String {
    if timestamp < 100_000 {
        return "never".to_string();
    }

    let elapsed = now.timestamp() - timestamp;
    relative_days(elapsed.div_euclid(24 * 3600))
}

fn relative_days(days: i64) -> String {
    match days {
        d if d < 1 => "today".to_string(),
        d if d < 2 => "yesterday".to_string(),
        d if d < 60 => format!("{} days ago", d),
        d => format!("{} months ago", d / 30),
    }
}

/// One-line usage summary, e.g. `"4 recent clicks (10 total); last visited today"`
pub fn click_info(ledger: &ClickLedger, today: i32) -> String {
    format!(
        "{} recent clicks ({} total); last visited {}",
        ledger.recent_clicks(),
        ledger.total_clicks(),
        pretty_day(ledger.last_click_day(), today)
    )
}
