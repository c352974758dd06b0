//! `user` commands.
//!
//! The licensing API may not expose user lookups at all. `get_user` then
//! answers `NotSupported` and `user info` reads the local store as its
//! primary source instead of treating the store as a degraded fallback.

use super::{or_unknown, CACHED_NOTICE};
use crate::client::ApiOutcome;
use crate::dispatch::context::tolerate;
use crate::dispatch::{CommandDescriptor, DataSource, HandlerContext, ParamSpec, Payload};
use crate::policy::tier::{require_tier, Tier};
use crate::protocol::models::{NewUser, UserPatch, UserProfile};
use crate::store::{UserRecord, UserUpdate};
use crate::validate::{validate_email, validate_identity, MAX_IDENTITY_LEN};
use crate::BotError;
use chrono::DateTime;

pub(crate) fn descriptors() -> Vec<CommandDescriptor> {
    vec![
        CommandDescriptor::new(
            "user",
            Some("create"),
            "Register yourself with the licensing service",
            crate::handler!(create),
        )
        .param(ParamSpec::string("email", "Your email address").required())
        .param(ParamSpec::string("name", "Display name"))
        .ephemeral(),
        CommandDescriptor::new("user", Some("info"), "Show user information", crate::handler!(info))
            .param(ParamSpec::string("user", "User to look up (admins only for others)"))
            .ephemeral(),
        CommandDescriptor::new(
            "user",
            Some("update"),
            "Update your profile",
            crate::handler!(update),
        )
        .param(ParamSpec::string("name", "New display name"))
        .param(ParamSpec::string("email", "New email address"))
        .ephemeral(),
    ]
}

fn display_name(raw: Option<&str>) -> Result<Option<String>, BotError> {
    match raw {
        Some(name) if name.chars().count() > MAX_IDENTITY_LEN => Err(BotError::invalid(
            "name",
            format!("longer than {} characters", MAX_IDENTITY_LEN),
        )),
        other => Ok(other.map(str::to_string)),
    }
}

async fn create(ctx: &HandlerContext) -> Result<Payload, BotError> {
    let email = validate_email(ctx.required_str("email")?)?;
    let name = display_name(ctx.str_arg("name"))?;
    let identity = ctx.caller().identity.clone();
    ctx.reply.defer();

    let profile = ctx
        .api
        .create_user(&NewUser {
            discord_id: identity.clone(),
            email: email.clone(),
            name: name.clone(),
        })
        .await?;

    let update = UserUpdate {
        username: name,
        email: Some(email),
    };
    tolerate("update_user", ctx.store.update_user(&identity, &update).await);
    Ok(render_profile("User Created", &profile))
}

async fn info(ctx: &HandlerContext) -> Result<Payload, BotError> {
    let caller = ctx.caller();
    let target = match ctx.str_arg("user") {
        Some(raw) => validate_identity(raw)?,
        None => caller.identity.clone(),
    };
    let is_self = target == caller.identity;
    if !is_self {
        require_tier(ctx.tier, Tier::Admin)?;
    }

    let remote_error = match ctx.api.get_user(&target).await {
        Ok(ApiOutcome::Available(profile)) => {
            return Ok(render_profile("User Information", &profile))
        }
        Ok(ApiOutcome::NotSupported { operation }) => {
            tracing::debug!(operation, "user lookup not offered upstream, reading local store");
            None
        }
        Err(e) => Some(e),
    };

    let local = if is_self {
        ctx.store
            .get_or_create_user(&target, caller.display_name.as_deref())
            .await
            .map(Some)
    } else {
        ctx.store.get_user(&target).await
    };

    match (local, remote_error) {
        (Ok(Some(record)), None) => Ok(render_record(&record, DataSource::Local)),
        (Ok(Some(record)), Some(remote)) => {
            tracing::info!(error = %remote, "serving user info from local store");
            Ok(render_record(&record, DataSource::Fallback)
                .notice(CACHED_NOTICE))
        }
        (Ok(None), None) => Ok(Payload::new("User Not Found", DataSource::Local)
            .description("No record exists for that user.")),
        (Ok(None), Some(remote)) => Err(remote),
        (Err(local), None) => Err(local),
        (Err(local), Some(remote)) => {
            tracing::warn!(error = %local, "local fallback failed");
            Err(remote)
        }
    }
}

async fn update(ctx: &HandlerContext) -> Result<Payload, BotError> {
    let patch = UserPatch {
        name: display_name(ctx.str_arg("name"))?,
        email: ctx.str_arg("email").map(validate_email).transpose()?,
    };
    if patch.is_empty() {
        return Err(BotError::invalid("arguments", "provide a name or an email to update"));
    }
    let identity = ctx.caller().identity.clone();
    ctx.reply.defer();

    let profile = ctx.api.update_user(&identity, &patch).await?;
    let update = UserUpdate {
        username: patch.name.clone(),
        email: patch.email.clone(),
    };
    tolerate("update_user", ctx.store.update_user(&identity, &update).await);
    Ok(render_profile("Profile Updated", &profile))
}

fn render_profile(title: &str, profile: &UserProfile) -> Payload {
    Payload::new(title, DataSource::Remote)
        .inline_field("User ID", or_unknown(profile.id.as_deref()))
        .inline_field("Name", or_unknown(profile.name.as_deref()))
        .inline_field("Email", or_unknown(profile.email.as_deref()))
        .inline_field("Created", or_unknown(profile.created_at.as_deref()))
        .data(profile)
}

fn render_record(record: &UserRecord, source: DataSource) -> Payload {
    let since = DateTime::from_timestamp(record.created_at, 0)
        .map(|t| t.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "Unknown".to_string());
    Payload::new("User Information", source)
        .inline_field("User ID", &record.identity)
        .inline_field("Name", or_unknown(record.username.as_deref()))
        .inline_field("Email", or_unknown(record.email.as_deref()))
        .inline_field("Member Since", since)
        .data(record)
}
