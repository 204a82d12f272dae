//! Performance classification for an offer's ad-count history.
//!
//! Given an unordered set of timestamped ad counts, [`analyze_offer_performance`]
//! derives a trend verdict ([`PerformanceStatus`]) plus the percentage change
//! over a configurable trailing window and over a fixed trailing week.
//!
//! The classifier is pure: no I/O, no shared state, and it never fails. Empty
//! or malformed input degrades to a [`PerformanceStatus::NoData`] result.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::model::AdCount;

/// Length of the secondary trend window, independent of the analysis window.
pub const WEEKLY_WINDOW_DAYS: i64 = 7;

/// Number of most recent samples used for compact offer summaries.
pub const CARD_SAMPLE_LIMIT: u32 = 15;

/// One observation of an offer's active ad count.
///
/// Both fields are kept as they arrived from the caller. A missing count
/// means the source held something non-numeric; a timestamp that fails
/// [`parse_timestamp`] makes the sample unusable for windowing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    #[serde(default, deserialize_with = "lenient_count")]
    pub count: Option<i64>,

    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub timestamp: Option<String>,
}

impl Sample {
    /// A well-formed sample.
    pub fn new(count: i64, timestamp: DateTime<Utc>) -> Self {
        Self {
            count: Some(count),
            timestamp: Some(timestamp.to_rfc3339()),
        }
    }

    fn parsed_timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp.as_deref().and_then(parse_timestamp)
    }
}

impl From<&AdCount> for Sample {
    fn from(ad_count: &AdCount) -> Self {
        Self::new(ad_count.count, ad_count.timestamp)
    }
}

fn lenient_count<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| v.as_i64().or_else(|| v.as_f64().and_then(whole_number))))
}

/// Floats such as `20.0` are counts too; fractional or out-of-range values are not.
fn whole_number(value: f64) -> Option<i64> {
    let in_range = value >= i64::MIN as f64 && value < i64::MAX as f64;
    (value.is_finite() && value.fract() == 0.0 && in_range).then_some(value as i64)
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        serde_json::Value::String(raw) => Some(raw),
        // Bare numbers are Unix epoch milliseconds
        serde_json::Value::Number(n) => n
            .as_i64()
            .and_then(DateTime::from_timestamp_millis)
            .map(|ts| ts.to_rfc3339()),
        _ => None,
    }))
}

/// Parse a stored or user-supplied timestamp into a UTC instant.
///
/// Accepts RFC 3339, Postgres-style `YYYY-MM-DD HH:MM:SS+HH`, naive
/// date-times (taken as UTC) and bare dates (midnight UTC).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }

    if let Ok(parsed) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%#z") {
        return Some(parsed.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Tunable thresholds for [`analyze_offer_performance`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AnalysisParams {
    /// Length of the analysis window in days, inclusive of the latest day.
    pub days_to_analyze: i64,

    /// Minimum latest count for an offer to be considered worth testing.
    pub min_ads_threshold: i64,

    /// Drop (in percent) beyond which an offer is flagged for exclusion.
    pub max_drop_percentage: f64,
}

impl Default for AnalysisParams {
    fn default() -> Self {
        Self {
            days_to_analyze: 7,
            min_ads_threshold: 10,
            max_drop_percentage: 20.0,
        }
    }
}

/// Trend verdict for an offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PerformanceStatus {
    /// History is empty or its latest sample is unusable.
    NoData,
    /// Exactly one sample falls inside the analysis window.
    RecentStart,
    /// Enough ads and no significant drop.
    Test,
    /// Significant drop, or a very low count sustained over the whole window.
    ExcludeRisk,
    /// Below the ad threshold for the whole window.
    LowPerformance,
    /// Nothing conclusive yet.
    Observe,
}

impl PerformanceStatus {
    /// Presentation category for this status.
    pub fn color(&self) -> ColorTag {
        match self {
            PerformanceStatus::NoData => ColorTag::Neutral,
            PerformanceStatus::RecentStart => ColorTag::Info,
            PerformanceStatus::Test => ColorTag::Positive,
            PerformanceStatus::ExcludeRisk => ColorTag::Negative,
            PerformanceStatus::LowPerformance => ColorTag::Warning,
            PerformanceStatus::Observe => ColorTag::Info,
        }
    }

    /// Short human-readable name.
    pub fn label(&self) -> &'static str {
        match self {
            PerformanceStatus::NoData => "Insufficient Data",
            PerformanceStatus::RecentStart => "Recent Start",
            PerformanceStatus::Test => "Test Potential",
            PerformanceStatus::ExcludeRisk => "Exclusion Risk",
            PerformanceStatus::LowPerformance => "Low Performance",
            PerformanceStatus::Observe => "Observe",
        }
    }
}

/// Semantic color category; mapping to concrete colors is left to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorTag {
    Positive,
    Negative,
    Neutral,
    Warning,
    Info,
}

/// Percent change between the oldest and latest sample of a window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PercentageChange {
    /// Not enough data, or nothing active to compare.
    Unavailable,
    /// A single sample with activity; no ratio yet.
    New,
    /// Grew from zero.
    Unbounded,
    /// Change in percent.
    Value(f64),
}

impl PercentageChange {
    /// Numeric change at display precision (one decimal place).
    ///
    /// Sentinels have no numeric value and never count as a drop.
    pub fn as_percent(&self) -> Option<f64> {
        match self {
            PercentageChange::Value(change) => Some((change * 10.0).round() / 10.0),
            _ => None,
        }
    }
}

impl fmt::Display for PercentageChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PercentageChange::Unavailable => write!(f, "N/A"),
            PercentageChange::New => write!(f, "new"),
            PercentageChange::Unbounded => write!(f, "+∞%"),
            PercentageChange::Value(change) => {
                let sign = if *change > 0.0 { "+" } else { "" };
                // Halves round away from zero, as in `as_percent`
                write!(f, "{}{:.1}%", sign, (change * 10.0).round() / 10.0)
            }
        }
    }
}

impl Serialize for PercentageChange {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Result of classifying one offer's history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceAnalysis {
    pub status: PerformanceStatus,
    pub label: String,
    pub detail: String,
    pub color: ColorTag,

    /// Change over the analysis window.
    pub period_change: PercentageChange,

    /// Change over the fixed trailing week.
    pub weekly_change: PercentageChange,

    /// Analysis window length, or 0 when no sample fell inside it.
    pub days_analyzed: i64,
}

#[derive(Debug, Clone, Copy)]
enum NoDataReason {
    EmptyHistory,
    InvalidCount,
    InvalidTimestamp,
}

impl PerformanceAnalysis {
    fn no_data(reason: NoDataReason) -> Self {
        let (label, detail) = match reason {
            NoDataReason::EmptyHistory => ("Insufficient Data", "No ad count history."),
            NoDataReason::InvalidCount => ("Invalid Data", "Latest record is invalid."),
            NoDataReason::InvalidTimestamp => {
                ("Invalid Date", "Latest record has an invalid date.")
            }
        };

        Self {
            status: PerformanceStatus::NoData,
            label: label.to_string(),
            detail: detail.to_string(),
            color: PerformanceStatus::NoData.color(),
            period_change: PercentageChange::Unavailable,
            weekly_change: PercentageChange::Unavailable,
            days_analyzed: 0,
        }
    }
}

/// Classify an offer's recent performance from its ad-count history.
///
/// Samples may arrive in any order; those with unparseable timestamps are
/// ignored. The latest valid sample anchors both the analysis window
/// (`params.days_to_analyze` days) and the weekly window, each inclusive of
/// the latest sample's day.
///
/// Decision order, first match wins:
///
/// 1. one sample in the window: `RecentStart`
/// 2. at or above `min_ads_threshold` without a significant drop: `Test`
/// 3. drop beyond `max_drop_percentage`, or below half the threshold for a
///    fully populated window: `ExcludeRisk`
/// 4. below the threshold for a fully populated window: `LowPerformance`
/// 5. otherwise: `Observe`
pub fn analyze_offer_performance(
    history: &[Sample],
    params: &AnalysisParams,
) -> PerformanceAnalysis {
    if history.is_empty() {
        return PerformanceAnalysis::no_data(NoDataReason::EmptyHistory);
    }

    // (timestamp, count) descending; count breaks ties so input order never matters
    let mut dated: Vec<(DateTime<Utc>, Option<i64>)> = history
        .iter()
        .filter_map(|sample| sample.parsed_timestamp().map(|ts| (ts, sample.count)))
        .collect();
    dated.sort_by(|a, b| b.cmp(a));

    let Some(&(latest_at, latest_count)) = dated.first() else {
        return PerformanceAnalysis::no_data(NoDataReason::InvalidTimestamp);
    };
    let Some(latest_count) = latest_count else {
        return PerformanceAnalysis::no_data(NoDataReason::InvalidCount);
    };

    let in_period = entries_in_window(&dated, latest_at, params.days_to_analyze);
    let in_week = entries_in_window(&dated, latest_at, WEEKLY_WINDOW_DAYS);

    let period_change = percentage_change(&in_period, latest_count);
    let weekly_change = percentage_change(&in_week, latest_count);

    let status = classify(in_period.len(), latest_count, period_change, params);
    let days = params.days_to_analyze;
    let min_ads = params.min_ads_threshold;

    let detail = match status {
        PerformanceStatus::RecentStart => format!(
            "First records in the last {} days. Change ({}d): {}.",
            days, days, period_change
        ),
        PerformanceStatus::Test => format!(
            "Ads >= {}. Change ({}d): {}.",
            min_ads, days, period_change
        ),
        PerformanceStatus::ExcludeRisk => format!(
            "Drop or sustained low count. Change ({}d): {}.",
            days, period_change
        ),
        PerformanceStatus::LowPerformance => format!(
            "Ads < {}. Change ({}d): {}.",
            min_ads, days, period_change
        ),
        _ => format!("Change ({}d): {}.", days, period_change),
    };

    PerformanceAnalysis {
        status,
        label: status.label().to_string(),
        detail,
        color: status.color(),
        period_change,
        weekly_change,
        days_analyzed: if in_period.is_empty() { 0 } else { days },
    }
}

fn classify(
    entries: usize,
    latest_count: i64,
    change: PercentageChange,
    params: &AnalysisParams,
) -> PerformanceStatus {
    if entries == 1 {
        return PerformanceStatus::RecentStart;
    }
    if entries == 0 {
        return PerformanceStatus::Observe;
    }

    let above_min_ads = latest_count >= params.min_ads_threshold;
    let numeric_change = change.as_percent();
    let has_dropped_significantly =
        numeric_change.is_some_and(|c| c < -params.max_drop_percentage);
    let is_stable_or_growing = numeric_change.is_none_or(|c| c >= -params.max_drop_percentage);
    let window_filled = i64::try_from(entries).unwrap_or(i64::MAX) >= params.days_to_analyze;
    let far_below_min = (latest_count as f64) < params.min_ads_threshold as f64 / 2.0;

    if above_min_ads && is_stable_or_growing {
        PerformanceStatus::Test
    } else if has_dropped_significantly || (far_below_min && window_filled) {
        PerformanceStatus::ExcludeRisk
    } else if !above_min_ads && window_filled {
        PerformanceStatus::LowPerformance
    } else {
        PerformanceStatus::Observe
    }
}

/// Counts of samples inside `[end - (days - 1) days, end]`, oldest first.
fn entries_in_window(
    dated_desc: &[(DateTime<Utc>, Option<i64>)],
    end: DateTime<Utc>,
    days: i64,
) -> Vec<Option<i64>> {
    let Some(start) = window_start(end, days) else {
        return Vec::new();
    };

    dated_desc
        .iter()
        .rev()
        .filter(|(ts, _)| *ts >= start && *ts <= end)
        .map(|(_, count)| *count)
        .collect()
}

/// `None` when the window is empty (non-positive length).
fn window_start(end: DateTime<Utc>, days: i64) -> Option<DateTime<Utc>> {
    if days <= 0 {
        return None;
    }
    let lookback = days - 1;

    Some(
        TimeDelta::try_days(lookback)
            .and_then(|delta| end.checked_sub_signed(delta))
            .unwrap_or(DateTime::<Utc>::MIN_UTC),
    )
}

fn percentage_change(entries_oldest_first: &[Option<i64>], latest_count: i64) -> PercentageChange {
    match entries_oldest_first {
        [] => PercentageChange::Unavailable,
        [_] if latest_count > 0 => PercentageChange::New,
        [_] => PercentageChange::Unavailable,
        [first, ..] => match *first {
            Some(initial) if initial > 0 => {
                let initial = initial as f64;
                PercentageChange::Value((latest_count as f64 - initial) / initial * 100.0)
            }
            Some(0) if latest_count > 0 => PercentageChange::Unbounded,
            _ => PercentageChange::Unavailable,
        },
    }
}
