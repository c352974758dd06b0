//! Command descriptors and the immutable command table.

use super::context::HandlerContext;
use super::invocation::{qualified_name, ArgValue, Arguments};
use super::response::Payload;
use crate::policy::tier::Tier;
use crate::validate::validate_integer;
use crate::BotError;
use futures::future::BoxFuture;
use std::collections::BTreeMap;

/// Future returned by a handler.
pub type HandlerFuture<'a> = BoxFuture<'a, Result<Payload, BotError>>;

/// Handler entry point. Plain `fn` pointers keep the table `'static` and
/// free of captured state.
pub type HandlerFn = for<'a> fn(&'a HandlerContext) -> HandlerFuture<'a>;

/// Wrap an `async fn(&HandlerContext) -> Result<Payload, BotError>` as a
/// [`HandlerFn`].
#[macro_export]
macro_rules! handler {
    ($f:path) => {{
        fn boxed(
            ctx: &$crate::dispatch::context::HandlerContext,
        ) -> $crate::dispatch::descriptor::HandlerFuture<'_> {
            ::std::boxed::Box::pin($f(ctx))
        }
        boxed as $crate::dispatch::descriptor::HandlerFn
    }};
}

/// Declared type of a parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamKind {
    /// Free text, trimmed; must be non-empty when supplied.
    String,
    /// Integer within inclusive bounds.
    Integer { min: i64, max: i64 },
    /// One of a fixed set, matched case-insensitively.
    Choice(&'static [&'static str]),
}

/// A declared parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub kind: ParamKind,
    pub required: bool,
}

impl ParamSpec {
    /// Optional string parameter.
    pub fn string(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            description,
            kind: ParamKind::String,
            required: false,
        }
    }

    /// Optional bounded integer parameter.
    pub fn integer(name: &'static str, description: &'static str, min: i64, max: i64) -> Self {
        Self {
            name,
            description,
            kind: ParamKind::Integer { min, max },
            required: false,
        }
    }

    /// Optional enumerated parameter.
    pub fn choice(
        name: &'static str,
        description: &'static str,
        choices: &'static [&'static str],
    ) -> Self {
        Self {
            name,
            description,
            kind: ParamKind::Choice(choices),
            required: false,
        }
    }

    /// Mark as required.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Check and normalize one supplied value.
    fn normalize(&self, value: &ArgValue) -> Result<ArgValue, BotError> {
        match &self.kind {
            ParamKind::String => {
                let text = match value {
                    ArgValue::String(s) => s.trim().to_string(),
                    ArgValue::Integer(n) => n.to_string(),
                };
                if text.is_empty() {
                    return Err(BotError::invalid(self.name, "cannot be empty"));
                }
                Ok(ArgValue::String(text))
            }
            ParamKind::Integer { min, max } => {
                let n = match value {
                    ArgValue::Integer(n) => *n,
                    ArgValue::String(s) => s
                        .trim()
                        .parse()
                        .map_err(|_| BotError::invalid(self.name, "must be a whole number"))?,
                };
                validate_integer(self.name, n, *min, *max).map(ArgValue::Integer)
            }
            ParamKind::Choice(choices) => {
                let raw = match value {
                    ArgValue::String(s) => s.trim().to_string(),
                    ArgValue::Integer(n) => n.to_string(),
                };
                choices
                    .iter()
                    .find(|c| c.eq_ignore_ascii_case(&raw))
                    .map(|c| ArgValue::String(c.to_string()))
                    .ok_or_else(|| {
                        BotError::invalid(self.name, format!("expected one of {}", choices.join(", ")))
                    })
            }
        }
    }
}

/// Everything the dispatcher needs to know about one command.
#[derive(Clone)]
pub struct CommandDescriptor {
    pub name: &'static str,
    pub subcommand: Option<&'static str>,
    pub description: &'static str,
    /// Minimum tier, checked before the handler runs.
    pub min_tier: Option<Tier>,
    pub params: Vec<ParamSpec>,
    pub handler: HandlerFn,
    /// Reply visible only to the caller.
    pub ephemeral: bool,
}

impl std::fmt::Debug for CommandDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandDescriptor")
            .field("name", &self.qualified_name())
            .field("min_tier", &self.min_tier)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl CommandDescriptor {
    /// Descriptor open to every tier, with no parameters.
    pub fn new(
        name: &'static str,
        subcommand: Option<&'static str>,
        description: &'static str,
        handler: HandlerFn,
    ) -> Self {
        Self {
            name,
            subcommand,
            description,
            min_tier: None,
            params: Vec::new(),
            handler,
            ephemeral: false,
        }
    }

    /// Require at least `tier`.
    pub fn min_tier(mut self, tier: Tier) -> Self {
        self.min_tier = Some(tier);
        self
    }

    /// Append a parameter.
    pub fn param(mut self, spec: ParamSpec) -> Self {
        self.params.push(spec);
        self
    }

    /// Reply privately.
    pub fn ephemeral(mut self) -> Self {
        self.ephemeral = true;
        self
    }

    /// `name` or `name subcommand`.
    pub fn qualified_name(&self) -> String {
        qualified_name(self.name, self.subcommand)
    }

    /// Check supplied arguments against the declared schema.
    ///
    /// Unknown arguments are rejected; missing required ones fail with
    /// `MissingArgument`. Returns the normalized arguments.
    pub fn validate_arguments(&self, args: &Arguments) -> Result<Arguments, BotError> {
        if let Some((unknown, _)) = args
            .iter()
            .find(|(name, _)| !self.params.iter().any(|p| p.name == *name))
        {
            return Err(BotError::invalid(
                "arguments",
                format!("unknown argument '{}'", unknown),
            ));
        }

        let mut normalized = Arguments::new();
        for spec in &self.params {
            match args.get(spec.name) {
                Some(value) => normalized.insert(spec.name, spec.normalize(value)?),
                None if spec.required => {
                    return Err(BotError::MissingArgument(spec.name.to_string()))
                }
                None => {}
            }
        }
        Ok(normalized)
    }
}

/// Immutable lookup table built once at startup.
#[derive(Debug, Default)]
pub struct CommandTable {
    commands: BTreeMap<String, CommandDescriptor>,
}

impl CommandTable {
    /// Build from descriptors.
    ///
    /// # Errors
    ///
    /// `ConfigError` on duplicate names.
    pub fn new(descriptors: impl IntoIterator<Item = CommandDescriptor>) -> Result<Self, BotError> {
        let mut commands = BTreeMap::new();
        for descriptor in descriptors {
            let key = descriptor.qualified_name();
            if commands.insert(key.clone(), descriptor).is_some() {
                return Err(BotError::ConfigError(format!(
                    "duplicate command registration: {}",
                    key
                )));
            }
        }
        Ok(Self { commands })
    }

    /// Find a descriptor.
    pub fn lookup(&self, name: &str, subcommand: Option<&str>) -> Option<&CommandDescriptor> {
        self.commands.get(&qualified_name(name, subcommand))
    }

    /// Descriptors in name order.
    pub fn iter(&self) -> impl Iterator<Item = &CommandDescriptor> {
        self.commands.values()
    }

    /// Descriptors sharing a top-level name.
    pub fn group<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a CommandDescriptor> + 'a {
        self.commands.values().filter(move |d| d.name == name)
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}
