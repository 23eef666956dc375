//! Shared utilities for CLI commands.

use std::sync::LazyLock;

use anyhow::{Context, bail};
use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use lumen_core::{RewardType, StreakStatus};
use regex::Regex;

/// Pre-compiled regex for relative date parsing.
static RELATIVE_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)\s+(day|week)s?\s+ago$").expect("valid regex"));

/// Conservative bound for relative dates (~100 years).
const MAX_RELATIVE_DAYS: i64 = 100 * 366;

/// Parse a calendar date relative to `today`.
///
/// Supports:
/// - ISO 8601 dates: "2025-03-10"
/// - Keywords: "today", "yesterday"
/// - Relative: "3 days ago", "1 week ago"
pub fn parse_date(s: &str, today: NaiveDate) -> anyhow::Result<NaiveDate> {
    let s = s.trim();
    match s {
        "today" => return Ok(today),
        "yesterday" => return Ok(today - TimeDelta::days(1)),
        _ => {}
    }

    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(date);
    }

    let Some(caps) = RELATIVE_DATE_RE.captures(s) else {
        bail!("Invalid date: {s}. Use YYYY-MM-DD, 'today', 'yesterday' or relative (e.g., '3 days ago')");
    };

    let n: i64 = caps[1]
        .parse()
        .context("failed to parse number in relative date")?;
    let days = match &caps[2] {
        "day" => n,
        "week" => n.saturating_mul(7),
        unit => bail!("Unknown date unit: {unit}"),
    };
    if days > MAX_RELATIVE_DAYS {
        bail!("Relative date too far back: {s}");
    }

    Ok(today - TimeDelta::days(days))
}

/// Resolve an optional `--date` flag, defaulting to `default`, and refuse
/// dates after `today`.
pub fn resolve_date(
    flag: Option<&str>,
    today: NaiveDate,
    default: NaiveDate,
) -> anyhow::Result<NaiveDate> {
    let date = flag.map_or(Ok(default), |s| parse_date(s, today))?;
    if date > today {
        bail!("date {date} is in the future (today is {today})");
    }
    Ok(date)
}

/// Parse an RFC 3339 timestamp.
pub fn parse_timestamp(s: &str) -> anyhow::Result<DateTime<Utc>> {
    let parsed = DateTime::parse_from_rfc3339(s).with_context(|| {
        format!("invalid timestamp {s:?}, expected RFC 3339 (e.g., 2025-03-10T09:00:00Z)")
    })?;
    Ok(parsed.with_timezone(&Utc))
}

/// Human-readable reward, e.g. "+100 xp".
pub fn describe_reward(reward_type: RewardType, amount: u32) -> String {
    match reward_type {
        RewardType::Xp => format!("+{amount} xp"),
        RewardType::Freeze if amount == 1 => "+1 freeze".to_string(),
        RewardType::Freeze => format!("+{amount} freezes"),
        RewardType::Badge => "badge".to_string(),
    }
}

pub const fn status_label(status: StreakStatus) -> &'static str {
    match status {
        StreakStatus::Inactive => "inactive",
        StreakStatus::ActiveToday => "active today",
        StreakStatus::AtRisk => "at risk",
        StreakStatus::Lapsed => "lapsed",
    }
}
