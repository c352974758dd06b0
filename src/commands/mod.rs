//! Command handlers and the table that registers them.
//!
//! Every handler has the shape `async fn(&HandlerContext) -> Result<Payload, BotError>`
//! and is registered through a [`CommandDescriptor`] that declares its tier
//! and parameters. Permission and schema checks have already passed by the
//! time a handler body runs.

pub mod admin;
pub mod analytics;
pub mod help;
pub mod license;
pub mod product;
pub mod user;

use crate::dispatch::{CommandDescriptor, CommandTable, HandlerContext};
use crate::meter::usage::Period;
use crate::validate::validate_period;
use crate::BotError;
use chrono::{DateTime, Utc};

/// Accepted `period` values.
pub const PERIOD_CHOICES: &[&str] = &["7d", "30d", "90d", "1y"];

/// Shown when a payload was served from the local store after an upstream failure.
pub(crate) const CACHED_NOTICE: &str = "Licensing API unavailable; showing locally cached data.";

/// Default page length for remote listings.
pub const DEFAULT_PAGE_LIMIT: u32 = 10;

/// Every command the bot answers.
pub fn descriptors() -> Vec<CommandDescriptor> {
    let mut all = Vec::new();
    all.extend(license::descriptors());
    all.extend(user::descriptors());
    all.extend(product::descriptors());
    all.extend(analytics::descriptors());
    all.extend(admin::descriptors());
    all.extend(help::descriptors());
    all
}

/// Build the immutable command table.
///
/// # Errors
///
/// `ConfigError` if two descriptors share a name.
pub fn command_table() -> Result<CommandTable, BotError> {
    CommandTable::new(descriptors())
}

/// `period` argument, defaulting to 30 days.
pub(crate) fn period_arg(ctx: &HandlerContext) -> Result<Period, BotError> {
    match ctx.str_arg("period") {
        Some(raw) => validate_period(raw),
        None => Ok(Period::default()),
    }
}

/// `page` and `limit` arguments. Bounds were checked by the schema.
pub(crate) fn paging_args(ctx: &HandlerContext) -> (u32, u32) {
    let page = ctx.int_arg("page").unwrap_or(1).max(1) as u32;
    let limit = ctx
        .int_arg("limit")
        .map(|l| l.max(1) as u32)
        .unwrap_or(DEFAULT_PAGE_LIMIT);
    (page, limit)
}

pub(crate) fn format_date(at: Option<DateTime<Utc>>) -> String {
    at.map(|t| t.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "Never".to_string())
}

/// Whole numbers print without decimals; missing values print as `0`.
pub(crate) fn format_metric(value: Option<f64>) -> String {
    match value {
        Some(v) if v.fract() == 0.0 => format!("{}", v as i64),
        Some(v) => format!("{:.2}", v),
        None => "0".to_string(),
    }
}

pub(crate) fn or_unknown(value: Option<&str>) -> &str {
    value.filter(|v| !v.is_empty()).unwrap_or("Unknown")
}
