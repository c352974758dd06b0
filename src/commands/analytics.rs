//! `analytics` commands.

use super::{format_metric, period_arg, PERIOD_CHOICES};
use crate::dispatch::{CommandDescriptor, DataSource, HandlerContext, ParamSpec, Payload};
use crate::validate::validate_license_key;
use crate::BotError;
use serde_json::json;

/// Metric families requested by `analytics overview`.
pub const OVERVIEW_METRICS: &[&str] = &["revenue", "licenses", "users", "conversions"];

const RECENT_DAYS: usize = 7;

pub(crate) fn descriptors() -> Vec<CommandDescriptor> {
    vec![
        CommandDescriptor::new(
            "analytics",
            Some("overview"),
            "Account-wide analytics",
            crate::handler!(overview),
        )
        .param(ParamSpec::choice("period", "Time period", PERIOD_CHOICES)),
        CommandDescriptor::new(
            "analytics",
            Some("license"),
            "Analytics for one license",
            crate::handler!(license),
        )
        .param(ParamSpec::string("key", "License key").required())
        .param(ParamSpec::choice("period", "Time period", PERIOD_CHOICES)),
        CommandDescriptor::new(
            "analytics",
            Some("usage"),
            "Your validation usage",
            crate::handler!(usage),
        )
        .param(ParamSpec::choice("period", "Time period", PERIOD_CHOICES))
        .ephemeral(),
    ]
}

fn percent(value: Option<f64>) -> String {
    format!("{}%", format_metric(value))
}

async fn overview(ctx: &HandlerContext) -> Result<Payload, BotError> {
    let period = period_arg(ctx)?;
    ctx.reply.defer();

    let report = ctx.api.get_analytics(period, OVERVIEW_METRICS).await?;
    let revenue = report.revenue.clone().unwrap_or_default();
    let licenses = report.licenses.clone().unwrap_or_default();

    let mut payload = Payload::new("Analytics Overview", DataSource::Remote)
        .description(format!("Analytics for the last {}", period.describe()))
        .inline_field("Total Revenue", format!("${}", format_metric(revenue.total)))
        .inline_field("Active Licenses", format_metric(licenses.active))
        .inline_field(
            "Total Users",
            format_metric(report.users.as_ref().and_then(|u| u.total)),
        )
        .inline_field(
            "Conversion Rate",
            percent(report.conversions.as_ref().and_then(|c| c.rate)),
        )
        .inline_field(
            "Growth Rate",
            percent(report.growth.as_ref().and_then(|g| g.rate)),
        )
        .inline_field("Top Feature", report.top_feature.as_deref().unwrap_or("N/A"));
    if revenue.growth.is_some() {
        payload = payload.inline_field("Revenue Growth", percent(revenue.growth));
    }
    if licenses.growth.is_some() {
        payload = payload.inline_field("License Growth", percent(licenses.growth));
    }
    Ok(payload.data(&report))
}

async fn license(ctx: &HandlerContext) -> Result<Payload, BotError> {
    let key = validate_license_key(ctx.required_str("key")?)?;
    let period = period_arg(ctx)?;
    ctx.reply.defer();

    let validation = ctx.api.validate_license(&key, None).await?;
    if !validation.valid {
        return Ok(Payload::new("License Not Found", DataSource::Remote)
            .description("The provided license key is invalid or not found."));
    }
    let id = validation.license_id.as_deref().unwrap_or(&key);
    let analytics = ctx.api.get_license_analytics(id, period).await?;

    let peak = analytics
        .peak_usage
        .as_ref()
        .map(|p| format!("{} on {}", p.validations, p.date))
        .unwrap_or_else(|| "N/A".to_string());
    let mut payload = Payload::new("License Analytics", DataSource::Remote)
        .description(format!("Analytics for license {} ({})", key, period.describe()))
        .inline_field(
            "Total Validations",
            analytics.total_validations.unwrap_or(0).to_string(),
        )
        .inline_field("Unique Users", analytics.unique_users.unwrap_or(0).to_string())
        .inline_field(
            "Avg. Daily Validations",
            format_metric(analytics.average_validations_per_day),
        )
        .field("Peak Usage", peak);

    let days = &analytics.usage_by_day;
    if !days.is_empty() {
        let recent = days[days.len().saturating_sub(RECENT_DAYS)..]
            .iter()
            .map(|d| format!("{}: {}", d.date, d.validations))
            .collect::<Vec<_>>()
            .join("\n");
        payload = payload.field("Recent Usage (Last 7 Days)", recent);
    }
    Ok(payload.data(&analytics))
}

/// Served from the local validation log; the store is the primary source here.
async fn usage(ctx: &HandlerContext) -> Result<Payload, BotError> {
    let period = period_arg(ctx)?;
    let summary = ctx
        .store
        .get_usage_stats(&ctx.caller().identity, period)
        .await?;

    let payload = Payload::new("Usage Statistics", DataSource::Local)
        .description(format!(
            "Your usage statistics for the last {}",
            period.describe()
        ))
        .inline_field("Total Validations", summary.total_validations.to_string())
        .inline_field(
            "Successful Validations",
            summary.successful_validations.to_string(),
        )
        .inline_field("Licenses Used", summary.distinct_licenses.to_string())
        .inline_field(
            "Most Used License",
            summary.most_used_license.as_deref().unwrap_or("N/A"),
        )
        .inline_field("Average Daily Usage", format!("{:.2}", summary.average_daily));
    Ok(payload.data(&json!({ "summary": summary })))
}
