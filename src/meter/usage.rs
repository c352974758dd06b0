//! Reporting periods and usage aggregates.
//!
//! Aggregates are computed on read from the append-only validation log:
//! 1. The period picks a window ending at the clock's `now`
//! 2. Rows inside the window are counted, grouped by license
//! 3. The daily average divides by the period's nominal length, not by the
//!    number of days that actually had traffic

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Reporting window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Period {
    /// Last 7 days.
    #[serde(rename = "7d")]
    Week,
    /// Last 30 days.
    #[serde(rename = "30d")]
    #[default]
    Month,
    /// Last 90 days.
    #[serde(rename = "90d")]
    Quarter,
    /// Last 365 days.
    #[serde(rename = "1y")]
    Year,
}

impl Period {
    /// All periods, shortest first.
    pub const ALL: [Period; 4] = [Period::Week, Period::Month, Period::Quarter, Period::Year];

    /// Parse the wire form (`7d`, `30d`, `90d`, `1y`).
    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_str() == raw)
    }

    /// Wire form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Week => "7d",
            Period::Month => "30d",
            Period::Quarter => "90d",
            Period::Year => "1y",
        }
    }

    /// Nominal length in days.
    pub fn days(&self) -> i64 {
        match self {
            Period::Week => 7,
            Period::Month => 30,
            Period::Quarter => 90,
            Period::Year => 365,
        }
    }

    /// Human form, e.g. `30 days`.
    pub fn describe(&self) -> &'static str {
        match self {
            Period::Week => "7 days",
            Period::Month => "30 days",
            Period::Quarter => "90 days",
            Period::Year => "year",
        }
    }

    /// First instant inside the window ending at `now`.
    pub fn window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::days(self.days())
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-identity validation usage over a period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageSummary {
    pub period: Period,
    pub total_validations: u64,
    pub successful_validations: u64,
    pub distinct_licenses: u64,
    /// License with the most validations; ties go to the lexically smallest key.
    pub most_used_license: Option<String>,
    /// Validations per day, rounded to two decimals.
    pub average_daily: f64,
}

impl UsageSummary {
    /// Summary with no traffic.
    pub fn empty(period: Period) -> Self {
        Self {
            period,
            total_validations: 0,
            successful_validations: 0,
            distinct_licenses: 0,
            most_used_license: None,
            average_daily: 0.0,
        }
    }

    /// Aggregate `(license_key, succeeded)` pairs already filtered to the window.
    pub fn tally<'a, I>(period: Period, rows: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, bool)>,
    {
        let mut per_license: HashMap<&'a str, u64> = HashMap::new();
        let mut summary = Self::empty(period);

        for (key, succeeded) in rows {
            summary.total_validations += 1;
            if succeeded {
                summary.successful_validations += 1;
            }
            *per_license.entry(key).or_default() += 1;
        }

        summary.distinct_licenses = per_license.len() as u64;
        summary.most_used_license = per_license
            .into_iter()
            .max_by(|(ka, ca), (kb, cb)| ca.cmp(cb).then_with(|| kb.cmp(ka)))
            .map(|(k, _)| k.to_string());
        summary.average_daily = average_daily(summary.total_validations, period);
        summary
    }
}

/// Whole-bot counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotStats {
    pub total_users: u64,
    pub total_licenses: u64,
    pub total_commands: u64,
    pub total_validations: u64,
}

/// Average per day over the period's nominal length, two decimals.
pub fn average_daily(total: u64, period: Period) -> f64 {
    let raw = total as f64 / period.days() as f64;
    (raw * 100.0).round() / 100.0
}
