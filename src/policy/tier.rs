//! Authorization tiers and the permission resolver.
//!
//! Tiers are resolved fresh for every invocation:
//! 1. Caller identity equals the configured owner -> `Owner`
//! 2. Caller holds an admin role or the platform administrator capability -> `Admin`
//! 3. Everyone else -> `User`

use crate::dispatch::invocation::Caller;
use crate::BotError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Ordered authorization level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Any member.
    User,
    /// Holder of an admin role or platform administrator.
    Admin,
    /// The single configured bot owner.
    Owner,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Tier::User => "user",
            Tier::Admin => "admin",
            Tier::Owner => "owner",
        };
        f.write_str(name)
    }
}

/// Fail with `PermissionDenied` when `actual` is below `minimum`.
pub fn require_tier(actual: Tier, minimum: Tier) -> Result<(), BotError> {
    if actual < minimum {
        return Err(BotError::PermissionDenied {
            required: minimum,
            actual,
        });
    }
    Ok(())
}

/// Computes caller tiers from the configured owner and admin roles.
#[derive(Debug, Clone, Default)]
pub struct PermissionResolver {
    owner_id: Option<String>,
    admin_roles: BTreeSet<String>,
}

impl PermissionResolver {
    /// Create a resolver from configuration values.
    pub fn new(owner_id: Option<String>, admin_roles: impl IntoIterator<Item = String>) -> Self {
        let owner_id = owner_id.filter(|id| !id.trim().is_empty());
        if owner_id.is_none() {
            tracing::warn!("BOT_OWNER_ID not configured, owner tier is unreachable");
        }
        Self {
            owner_id,
            admin_roles: admin_roles
                .into_iter()
                .map(|r| r.trim().to_string())
                .filter(|r| !r.is_empty())
                .collect(),
        }
    }

    /// Whether `identity` is the configured owner.
    pub fn is_owner(&self, identity: &str) -> bool {
        self.owner_id.as_deref() == Some(identity)
    }

    /// Whether the caller qualifies for the admin tier.
    pub fn is_admin(&self, caller: &Caller) -> bool {
        caller.platform_admin || caller.roles.iter().any(|r| self.admin_roles.contains(r))
    }

    /// Resolve the tier for a caller. First match wins.
    pub fn resolve_tier(&self, caller: &Caller) -> Tier {
        if self.is_owner(&caller.identity) {
            Tier::Owner
        } else if self.is_admin(caller) {
            Tier::Admin
        } else {
            Tier::User
        }
    }

    /// Resolve and enforce in one step.
    pub fn require(&self, caller: &Caller, minimum: Tier) -> Result<Tier, BotError> {
        let tier = self.resolve_tier(caller);
        require_tier(tier, minimum)?;
        Ok(tier)
    }
}
