//! Parsed command requests.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Who issued a command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    /// Opaque platform identity.
    pub identity: String,
    /// Role ids held in the current guild.
    #[serde(default)]
    pub roles: BTreeSet<String>,
    /// Whether the platform itself grants administrator rights.
    #[serde(default)]
    pub platform_admin: bool,
    /// Display name, if the transport supplied one.
    #[serde(default)]
    pub display_name: Option<String>,
}

impl Caller {
    /// Caller with no roles.
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            ..Default::default()
        }
    }

    /// Replace the role set.
    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    /// Mark as platform administrator.
    pub fn with_platform_admin(mut self) -> Self {
        self.platform_admin = true;
        self
    }
}

/// Typed argument value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgValue {
    Integer(i64),
    String(String),
}

impl ArgValue {
    /// String content, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ArgValue::String(s) => Some(s),
            ArgValue::Integer(_) => None,
        }
    }

    /// Integer content, if this is an integer.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ArgValue::Integer(n) => Some(*n),
            ArgValue::String(_) => None,
        }
    }
}

impl From<&str> for ArgValue {
    fn from(s: &str) -> Self {
        ArgValue::String(s.to_string())
    }
}

impl From<String> for ArgValue {
    fn from(s: String) -> Self {
        ArgValue::String(s)
    }
}

impl From<i64> for ArgValue {
    fn from(n: i64) -> Self {
        ArgValue::Integer(n)
    }
}

/// Named arguments of an invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Arguments(BTreeMap<String, ArgValue>);

impl Arguments {
    /// No arguments.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an argument, replacing any previous value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<ArgValue>) {
        self.0.insert(name.into(), value.into());
    }

    /// Raw value by name.
    pub fn get(&self, name: &str) -> Option<&ArgValue> {
        self.0.get(name)
    }

    /// String argument by name.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(ArgValue::as_str)
    }

    /// Integer argument by name.
    pub fn get_int(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(ArgValue::as_int)
    }

    /// Iterate in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ArgValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One inbound command request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandInvocation {
    /// Top-level command, e.g. `license`.
    pub name: String,
    /// Subcommand, e.g. `validate`.
    #[serde(default)]
    pub subcommand: Option<String>,
    /// Arguments as supplied by the transport.
    #[serde(default)]
    pub arguments: Arguments,
    /// Issuer.
    pub caller: Caller,
}

impl CommandInvocation {
    /// Invocation with no arguments.
    pub fn new(name: impl Into<String>, subcommand: Option<&str>, caller: Caller) -> Self {
        Self {
            name: name.into(),
            subcommand: subcommand.map(str::to_string),
            arguments: Arguments::new(),
            caller,
        }
    }

    /// Builder-style argument setter.
    pub fn with_arg(mut self, name: impl Into<String>, value: impl Into<ArgValue>) -> Self {
        self.arguments.insert(name, value);
        self
    }

    /// `name` or `name subcommand`.
    pub fn qualified_name(&self) -> String {
        qualified_name(&self.name, self.subcommand.as_deref())
    }
}

/// Join a command and optional subcommand with a space.
pub fn qualified_name(name: &str, subcommand: Option<&str>) -> String {
    match subcommand {
        Some(sub) => format!("{} {}", name, sub),
        None => name.to_string(),
    }
}
