//! Click trend statistics over a recent time window.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;

use crate::{ClickEvent, ClickRepository, Clock, CoreError, DEFAULT_CATEGORY};

/// Window used when the caller does not ask for one: one day.
pub const DEFAULT_WINDOW_MINUTES: u32 = 1440;
/// Largest accepted window: one week.
pub const MAX_WINDOW_MINUTES: u32 = 10080;

/// Message attached to a report with no clicks in the window.
pub const NO_DATA_MESSAGE: &str = "no data";

/// Per-category click counts for a window.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TrendReport {
    pub window_minutes: u32,
    pub stats: BTreeMap<String, u64>,
    pub ai_analysis: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Clamp a requested window to `1..=MAX_WINDOW_MINUTES`.
pub fn clamp_window(minutes: Option<i64>) -> u32 {
    match minutes {
        None => DEFAULT_WINDOW_MINUTES,
        Some(m) => m.clamp(1, MAX_WINDOW_MINUTES as i64) as u32,
    }
}

/// Count clicks by category. Blank categories count as [`DEFAULT_CATEGORY`].
pub fn aggregate_by_category(events: &[ClickEvent]) -> BTreeMap<String, u64> {
    let mut stats = BTreeMap::new();
    for ev in events {
        let cat = ev.category.trim();
        let cat = if cat.is_empty() { DEFAULT_CATEGORY } else { cat };
        *stats.entry(cat.to_string()).or_insert(0) += 1;
    }
    stats
}

/// Build the trend report for the last `minutes` minutes.
pub fn trend_report<R, C>(repo: &R, clock: &C, minutes: Option<i64>) -> Result<TrendReport, CoreError>
where
    R: ClickRepository + ?Sized,
    C: Clock + ?Sized,
{
    let window_minutes = clamp_window(minutes);
    let window = Duration::from_secs(u64::from(window_minutes) * 60);
    let since = clock
        .now()
        .checked_sub(window)
        .unwrap_or(std::time::UNIX_EPOCH);

    let events = repo.clicks_since(since)?;
    let stats = aggregate_by_category(&events);
    tracing::debug!(window_minutes, clicks = events.len(), "trend computed");

    let message = stats.is_empty().then(|| NO_DATA_MESSAGE.to_string());
    Ok(TrendReport {
        window_minutes,
        stats,
        ai_analysis: None,
        message,
    })
}
