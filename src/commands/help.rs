//! `help`, rendered from the command table itself.

use crate::dispatch::descriptor::ParamKind;
use crate::dispatch::{CommandDescriptor, DataSource, HandlerContext, ParamSpec, Payload};
use crate::BotError;
use std::collections::BTreeMap;

pub(crate) fn descriptors() -> Vec<CommandDescriptor> {
    vec![CommandDescriptor::new(
        "help",
        None,
        "Show available commands",
        crate::handler!(help),
    )
    .param(ParamSpec::string("command", "Command to describe, e.g. `license` or `license list`"))
    .ephemeral()]
}

fn summary_line(d: &CommandDescriptor) -> String {
    match d.min_tier {
        Some(tier) => format!("/{} - {} ({} only)", d.qualified_name(), d.description, tier),
        None => format!("/{} - {}", d.qualified_name(), d.description),
    }
}

fn param_line(p: &ParamSpec) -> String {
    let kind = match &p.kind {
        ParamKind::String => "text".to_string(),
        ParamKind::Integer { min, max } => format!("number {}..{}", min, max),
        ParamKind::Choice(choices) => choices.join("|"),
    };
    let required = if p.required { ", required" } else { "" };
    format!("{} ({}{}): {}", p.name, kind, required, p.description)
}

async fn help(ctx: &HandlerContext) -> Result<Payload, BotError> {
    let table = &ctx.commands;
    let Some(query) = ctx.str_arg("command") else {
        let mut groups: BTreeMap<&str, Vec<String>> = BTreeMap::new();
        for d in table.iter() {
            groups.entry(d.name).or_default().push(summary_line(d));
        }
        let mut payload = Payload::new("Available Commands", DataSource::Static)
            .description("Use /help command:<name> for details on a command.");
        for (name, lines) in groups {
            payload = payload.field(name, lines.join("\n"));
        }
        return Ok(payload);
    };

    let query = query.trim().trim_start_matches('/').to_lowercase();
    let mut parts = query.split_whitespace();
    let name = parts.next().unwrap_or_default();
    let sub = parts.next();

    if let Some(d) = table.lookup(name, sub) {
        let mut payload = Payload::new(format!("/{}", d.qualified_name()), DataSource::Static)
            .description(d.description)
            .inline_field(
                "Permission",
                d.min_tier.map(|t| t.to_string()).unwrap_or_else(|| "everyone".into()),
            );
        if !d.params.is_empty() {
            payload = payload.field(
                "Parameters",
                d.params.iter().map(param_line).collect::<Vec<_>>().join("\n"),
            );
        }
        return Ok(payload);
    }

    let lines: Vec<String> = table.group(name).map(summary_line).collect();
    if sub.is_none() && !lines.is_empty() {
        return Ok(Payload::new(format!("/{}", name), DataSource::Static)
            .field("Subcommands", lines.join("\n")));
    }
    Err(BotError::UnknownCommand(query))
}

#[cfg(test)]
mod tests {
    use crate::dispatch::{CommandInvocation, DataSource};
    use crate::errors::ErrorKind;
    use crate::testing::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_overview_lists_every_group() {
        let api = Arc::new(MockApi::new());
        let d = dispatcher(api.clone(), Arc::new(MockStore::new()));
        let payload = d
            .dispatch(CommandInvocation::new("help", None, user_caller("u1")))
            .await
            .result
            .payload()
            .cloned()
            .unwrap();
        assert_eq!(payload.source, DataSource::Static);
        let names: Vec<_> = payload.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["admin", "analytics", "help", "license", "product", "user"]);
        assert_eq!(api.call_count(), 0);
    }

    #[tokio::test]
    async fn test_describes_single_command() {
        let d = dispatcher(Arc::new(MockApi::new()), Arc::new(MockStore::new()));
        let inv = CommandInvocation::new("help", None, user_caller("u1"))
            .with_arg("command", "/License Create");
        let payload = d.dispatch(inv).await.result.payload().cloned().unwrap();
        assert_eq!(payload.title, "/license create");
        assert_eq!(payload.field_value("Permission"), Some("admin"));
        assert!(payload
            .field_value("Parameters")
            .unwrap()
            .contains("monthly\\|yearly\\|lifetime"));
    }

    #[tokio::test]
    async fn test_group_and_unknown() {
        let d = dispatcher(Arc::new(MockApi::new()), Arc::new(MockStore::new()));
        let inv = CommandInvocation::new("help", None, user_caller("u1")).with_arg("command", "admin");
        let payload = d.dispatch(inv).await.result.payload().cloned().unwrap();
        assert!(payload.field_value("Subcommands").unwrap().contains("/admin webhooks"));

        let inv = CommandInvocation::new("help", None, user_caller("u1"))
            .with_arg("command", "frobnicate");
        let response = d.dispatch(inv).await;
        assert_eq!(response.result.error_kind(), Some(ErrorKind::UnknownCommand));
    }
}
