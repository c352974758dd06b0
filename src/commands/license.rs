//! `license` commands.

use super::{format_date, or_unknown, CACHED_NOTICE};
use crate::client::retry_with_backoff;
use crate::dispatch::context::tolerate;
use crate::dispatch::{CommandDescriptor, DataSource, HandlerContext, ParamSpec, Payload};
use crate::errors::ErrorKind;
use crate::policy::tier::Tier;
use crate::protocol::models::{LicenseRecord, LicenseStatus, NewLicense};
use crate::validate::{
    generate_license_key, sanitize_for_display, validate_email, validate_identity,
    validate_license_key,
};
use crate::BotError;
use serde_json::json;

/// Plans accepted by `license create`.
pub const PLAN_CHOICES: &[&str] = &["monthly", "yearly", "lifetime"];

const NOT_FOUND_DESCRIPTION: &str = "The provided license key is invalid or not found.";
const EMPTY_LIST_DESCRIPTION: &str = "You don't have any licenses yet.";

pub(crate) fn descriptors() -> Vec<CommandDescriptor> {
    vec![
        CommandDescriptor::new(
            "license",
            Some("validate"),
            "Validate a license key",
            crate::handler!(validate),
        )
        .param(ParamSpec::string("key", "License key to validate").required()),
        CommandDescriptor::new(
            "license",
            Some("info"),
            "Get license information",
            crate::handler!(info),
        )
        .param(ParamSpec::string("key", "License key to get info for").required()),
        CommandDescriptor::new("license", Some("list"), "List your licenses", crate::handler!(list))
            .param(ParamSpec::integer("page", "Page number", 1, 100)),
        CommandDescriptor::new(
            "license",
            Some("create"),
            "Create a new license",
            crate::handler!(create),
        )
        .min_tier(Tier::Admin)
        .param(ParamSpec::choice("plan", "License plan", PLAN_CHOICES).required())
        .param(ParamSpec::string("email", "Email of the license holder"))
        .param(ParamSpec::string("user", "Chat user the license is issued to"))
        .ephemeral(),
        CommandDescriptor::new(
            "license",
            Some("revoke"),
            "Revoke a license key",
            crate::handler!(revoke),
        )
        .min_tier(Tier::Admin)
        .param(ParamSpec::string("key", "License key to revoke").required())
        .ephemeral(),
    ]
}

async fn validate(ctx: &HandlerContext) -> Result<Payload, BotError> {
    let key = validate_license_key(ctx.required_str("key")?)?;
    ctx.reply.defer();

    let outcome = ctx.api.validate_license(&key, None).await?;
    tolerate(
        "log_validation",
        ctx.store
            .log_validation(&ctx.caller().identity, &key, outcome.valid)
            .await,
    );

    let (title, status) = if outcome.valid {
        ("License Valid", "Active")
    } else {
        ("License Invalid", "Invalid")
    };
    let mut payload = Payload::new(title, DataSource::Remote)
        .inline_field("License Key", &key)
        .inline_field("Status", status)
        .field(
            "Message",
            outcome
                .message
                .as_deref()
                .unwrap_or("No additional information"),
        );
    if outcome.valid && outcome.expires_at.is_some() {
        payload = payload.inline_field("Expires", format_date(outcome.expires_at));
    }
    if !outcome.features.is_empty() {
        payload = payload.field("Features", outcome.features.join(", "));
    }
    Ok(payload.data(&outcome))
}

/// Validate, then fetch the full record. `None` means the key is unknown.
async fn remote_license(ctx: &HandlerContext, key: &str) -> Result<Option<LicenseRecord>, BotError> {
    let validation = ctx.api.validate_license(key, None).await?;
    if !validation.valid {
        return Ok(None);
    }
    let id = validation.license_id.as_deref().unwrap_or(key);
    ctx.api.get_license(id).await.map(Some)
}

async fn info(ctx: &HandlerContext) -> Result<Payload, BotError> {
    let key = validate_license_key(ctx.required_str("key")?)?;
    ctx.reply.defer();

    match remote_license(ctx, &key).await {
        Ok(Some(record)) => Ok(render_license("License Information", &record, DataSource::Remote)),
        Ok(None) => Ok(Payload::new("License Not Found", DataSource::Remote)
            .description(NOT_FOUND_DESCRIPTION)),
        Err(remote) if remote.kind() == ErrorKind::UpstreamError => {
            match ctx.store.find_license(&key).await {
                Ok(Some(record)) => {
                    tracing::info!(error = %remote, "serving license info from local store");
                    Ok(render_license("License Information", &record, DataSource::Fallback)
                        .notice(CACHED_NOTICE))
                }
                Ok(None) => Err(remote),
                Err(local) => {
                    tracing::warn!(error = %local, "local fallback failed");
                    Err(remote)
                }
            }
        }
        Err(e) => Err(e),
    }
}

fn render_license(title: &str, record: &LicenseRecord, source: DataSource) -> Payload {
    Payload::new(title, source)
        .inline_field("License Key", &record.key)
        .inline_field("Application", or_unknown(record.application.as_deref()))
        .inline_field("Status", record.status.as_str())
        .inline_field("Plan", &record.plan_name)
        .inline_field("Expires", format_date(record.expires_at))
        .inline_field("Issued To", or_unknown(record.owner.as_deref()))
        .data(record)
}

/// Licenses in the application listing that belong to the caller.
async fn owned_remote(ctx: &HandlerContext) -> Result<Vec<LicenseRecord>, BotError> {
    let app_id = ctx.app_id()?;
    let all = ctx.api.list_licenses_for_app(app_id).await?;

    let identity = ctx.caller().identity.as_str();
    let email = tolerate("get_user", ctx.store.get_user(identity).await)
        .flatten()
        .and_then(|u| u.email);
    let mut handles = vec![identity];
    if let Some(email) = email.as_deref() {
        handles.push(email);
    }

    let owned: Vec<LicenseRecord> = all
        .into_iter()
        .filter(|l| ctx.settings.ownership.owns(&handles, l))
        .collect();
    for license in &owned {
        tolerate("upsert_license", ctx.store.upsert_license(identity, license).await);
    }
    Ok(owned)
}

async fn list(ctx: &HandlerContext) -> Result<Payload, BotError> {
    let page = ctx.int_arg("page").unwrap_or(1).max(1) as usize;
    ctx.reply.defer();

    let (licenses, source) = match owned_remote(ctx).await {
        Ok(licenses) => (licenses, DataSource::Remote),
        Err(remote) => match ctx.store.get_user_licenses(&ctx.caller().identity).await {
            Ok(licenses) => {
                tracing::info!(error = %remote, "serving license list from local store");
                (licenses, DataSource::Fallback)
            }
            Err(local) => {
                tracing::warn!(error = %local, "local fallback failed");
                return Err(remote);
            }
        },
    };

    let mut payload = Payload::new("Your Licenses", source);
    if source == DataSource::Fallback {
        payload = payload.notice("Licensing API unavailable; showing locally cached licenses.");
    }
    if licenses.is_empty() {
        return Ok(payload.description(EMPTY_LIST_DESCRIPTION));
    }

    let page_size = ctx.settings.license_page_size.max(1);
    let total_pages = licenses.len().div_ceil(page_size);
    if page > total_pages {
        return Err(BotError::OutOfRange {
            field: "page".to_string(),
            min: 1,
            max: total_pages as i64,
            value: page as i64,
        });
    }

    let shown = &licenses[(page - 1) * page_size..(page * page_size).min(licenses.len())];
    payload = payload.description(format!("Page {} of {}", page, total_pages));
    for license in shown {
        payload = payload.inline_field(
            format!(
                "{} ({})",
                sanitize_for_display(license.application.as_deref().unwrap_or("Unknown App")),
                license.status.as_str()
            ),
            format!(
                "Key: {}\nPlan: {}\nExpires: {}",
                license.key,
                license.plan_name,
                format_date(license.expires_at)
            ),
        );
    }
    Ok(payload.data(&json!({
        "page": page,
        "total_pages": total_pages,
        "total": licenses.len(),
        "licenses": shown,
    })))
}

async fn create(ctx: &HandlerContext) -> Result<Payload, BotError> {
    let plan = ctx.required_str("plan")?.to_string();
    let email = ctx.str_arg("email").map(validate_email).transpose()?;
    let user = ctx.str_arg("user").map(validate_identity).transpose()?;
    let app_id = ctx.app_id()?;
    ctx.reply.defer();

    let request = NewLicense {
        plan,
        email,
        user_id: user.clone(),
        key: Some(generate_license_key()),
    };
    let record = ctx.api.create_license(app_id, &request).await?;

    if let Some(user) = user.as_deref() {
        tolerate("upsert_license", ctx.store.upsert_license(user, &record).await);
    }
    tracing::info!(
        plan = %record.plan_name,
        issued_by = %ctx.caller().identity,
        "license created"
    );
    Ok(render_license("License Created", &record, DataSource::Remote))
}

async fn revoke(ctx: &HandlerContext) -> Result<Payload, BotError> {
    let key = validate_license_key(ctx.required_str("key")?)?;
    ctx.reply.defer();

    // The delete endpoint is addressed by upstream id, not by key.
    let validation = ctx.api.validate_license(&key, None).await?;
    let id = match validation.license_id {
        Some(id) => id,
        None if validation.valid => key.clone(),
        None => {
            return Ok(Payload::new("License Not Found", DataSource::Remote)
                .description(NOT_FOUND_DESCRIPTION))
        }
    };
    let record = ctx.api.get_license(&id).await?;
    let id = record.api_id();

    let api = &ctx.api;
    retry_with_backoff(ctx.settings.retry, || api.revoke_license(id)).await?;
    let cached = tolerate(
        "set_license_status",
        ctx.store.set_license_status(&key, LicenseStatus::Revoked).await,
    )
    .unwrap_or(false);

    tracing::info!(license_id = %id, revoked_by = %ctx.caller().identity, "license revoked");
    Ok(Payload::new("License Revoked", DataSource::Remote)
        .inline_field("License Key", &key)
        .inline_field("Status", LicenseStatus::Revoked.as_str())
        .data(&json!({ "key": key, "id": id, "local_cache_updated": cached })))
}
