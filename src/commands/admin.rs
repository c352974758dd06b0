//! `admin` commands.
//!
//! `stats` and `health` fan out to the licensing API and the local store at
//! the same time and join both before answering. Either side may be missing
//! from the result; `stats` only fails when both sides fail.

use super::{format_metric, or_unknown, paging_args};
use crate::dispatch::{CommandDescriptor, DataSource, HandlerContext, ParamSpec, Payload};
use crate::meter::usage::{BotStats, Period};
use crate::policy::tier::Tier;
use crate::protocol::models::{AnalyticsReport, MetricBlock};
use crate::validate::sanitize_for_display;
use crate::BotError;
use serde_json::json;
use std::time::Instant;

/// Metric families requested by `admin stats`.
pub const STATS_METRICS: &[&str] = &["licenses", "users", "products", "revenue"];

pub(crate) fn descriptors() -> Vec<CommandDescriptor> {
    vec![
        CommandDescriptor::new("admin", Some("stats"), "Bot and account statistics", crate::handler!(stats))
            .min_tier(Tier::Admin),
        CommandDescriptor::new("admin", Some("users"), "List users", crate::handler!(users))
            .min_tier(Tier::Admin)
            .param(ParamSpec::integer("page", "Page number", 1, 100))
            .param(ParamSpec::integer("limit", "Users per page", 1, 50)),
        CommandDescriptor::new("admin", Some("products"), "List products", crate::handler!(products))
            .min_tier(Tier::Admin)
            .param(ParamSpec::integer("page", "Page number", 1, 100))
            .param(ParamSpec::integer("limit", "Products per page", 1, 50)),
        // Owner only: the listing shows endpoint URLs, which commonly carry
        // delivery tokens in their query strings.
        CommandDescriptor::new("admin", Some("webhooks"), "List webhooks", crate::handler!(webhooks))
            .min_tier(Tier::Owner)
            .ephemeral(),
        CommandDescriptor::new("admin", Some("health"), "Check API and store health", crate::handler!(health))
            .min_tier(Tier::Admin),
    ]
}

fn block_lines(block: &MetricBlock, keys: &[&str]) -> String {
    keys.iter()
        .map(|key| {
            let value = match *key {
                "Total" => block.total,
                "Active" => block.active,
                "Inactive" => block.inactive,
                "Expired" => block.expired,
                "Revoked" => block.revoked,
                _ => None,
            };
            format!("{}: {}", key, format_metric(value))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn remote_fields(payload: Payload, report: &AnalyticsReport) -> Payload {
    let licenses = report.licenses.clone().unwrap_or_default();
    let users = report.users.clone().unwrap_or_default();
    let products = report.products.clone().unwrap_or_default();
    let revenue = report.revenue.as_ref().and_then(|r| r.total);
    payload
        .inline_field(
            "Licenses",
            block_lines(&licenses, &["Total", "Active", "Expired", "Revoked"]),
        )
        .inline_field("Users", block_lines(&users, &["Total", "Active", "Inactive"]))
        .inline_field("Products", block_lines(&products, &["Total", "Active"]))
        .inline_field("Revenue", format!("${}", format_metric(revenue)))
}

fn local_fields(payload: Payload, stats: &BotStats) -> Payload {
    payload.inline_field(
        "Bot Usage",
        format!(
            "Users: {}\nLicenses: {}\nCommands: {}\nValidations: {}",
            stats.total_users, stats.total_licenses, stats.total_commands, stats.total_validations
        ),
    )
}

async fn stats(ctx: &HandlerContext) -> Result<Payload, BotError> {
    ctx.reply.defer();
    let (remote, local) = futures::join!(
        ctx.api.get_analytics(Period::default(), STATS_METRICS),
        ctx.store.get_bot_stats()
    );

    let payload = Payload::new("LicenseChain Statistics", DataSource::Combined);
    match (remote, local) {
        (Ok(report), Ok(stats)) => Ok(local_fields(remote_fields(payload, &report), &stats)
            .data(&json!({ "remote": report, "local": stats }))),
        (Ok(report), Err(local)) => {
            tracing::warn!(error = %local, "bot stats unavailable");
            Ok(remote_fields(payload, &report)
                .source(DataSource::Remote)
                .notice("Local statistics unavailable.")
                .data(&json!({ "remote": report })))
        }
        (Err(remote), Ok(stats)) => {
            tracing::warn!(error = %remote, "account analytics unavailable");
            Ok(local_fields(payload, &stats)
                .source(DataSource::Local)
                .notice("Licensing API statistics unavailable.")
                .data(&json!({ "local": stats })))
        }
        (Err(remote), Err(local)) => {
            tracing::warn!(error = %local, "bot stats unavailable");
            Err(remote)
        }
    }
}

async fn users(ctx: &HandlerContext) -> Result<Payload, BotError> {
    let (page, limit) = paging_args(ctx);
    ctx.reply.defer();
    let listing = ctx.api.list_users(page, limit).await?;

    let mut payload = Payload::new(format!("Users (Page {})", page), DataSource::Remote);
    if listing.items.is_empty() {
        return Ok(payload.description("No users found."));
    }
    payload = payload.description(format!("Total: {} users", listing.total));
    for user in &listing.items {
        payload = payload.field(
            sanitize_for_display(or_unknown(user.name.as_deref())),
            format!(
                "ID: {}\nEmail: {}",
                or_unknown(user.id.as_deref()),
                or_unknown(user.email.as_deref())
            ),
        );
    }
    Ok(payload.data(&json!({ "page": page, "total": listing.total, "items": listing.items })))
}

async fn products(ctx: &HandlerContext) -> Result<Payload, BotError> {
    let (page, limit) = paging_args(ctx);
    ctx.reply.defer();
    let listing = ctx.api.list_products(page, limit).await?;
    Ok(super::product::render_listing("Products", page, &listing))
}

async fn webhooks(ctx: &HandlerContext) -> Result<Payload, BotError> {
    ctx.reply.defer();
    let hooks = ctx.api.list_webhooks().await?;

    let mut payload = Payload::new("Webhooks", DataSource::Remote);
    if hooks.is_empty() {
        return Ok(payload.description("No webhooks found."));
    }
    payload = payload.description(format!("Total: {} webhooks", hooks.len()));
    for hook in &hooks {
        payload = payload.field(
            sanitize_for_display(or_unknown(hook.id.as_deref())),
            format!(
                "URL: {}\nEvents: {}",
                or_unknown(hook.url.as_deref()),
                hook.events.join(", ")
            ),
        );
    }
    Ok(payload.data(&hooks))
}

/// Always answers; unreachable dependencies are reported, not raised.
async fn health(ctx: &HandlerContext) -> Result<Payload, BotError> {
    ctx.reply.defer();
    let started = Instant::now();
    let remote = async {
        let result = ctx.api.health_check().await;
        (result, started.elapsed())
    };
    let ((remote, latency), local) = futures::join!(remote, ctx.store.get_bot_stats());

    let api_value = match &remote {
        Ok(h) => format!(
            "Status: {}\nVersion: {}\nLatency: {} ms",
            h.status,
            or_unknown(h.version.as_deref()),
            latency.as_millis()
        ),
        Err(e) => format!("Status: unreachable\nError: {}", e),
    };
    let store_value = match &local {
        Ok(stats) => format!("Status: ok\nUsers: {}", stats.total_users),
        Err(e) => format!("Status: unavailable\nError: {}", e),
    };

    let healthy = remote.is_ok() && local.is_ok();
    Ok(Payload::new("Health Check", DataSource::Combined)
        .description(if healthy {
            "All systems operational."
        } else {
            "Some dependencies are degraded."
        })
        .inline_field("Licensing API", api_value)
        .inline_field("Local Store", store_value)
        .data(&json!({
            "api": remote.as_ref().ok(),
            "api_latency_ms": latency.as_millis() as u64,
            "store_ok": local.is_ok(),
        })))
}
