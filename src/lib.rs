//! # licensebot
//!
//! **License management for chat communities, backed by the LicenseChain API.**
//!
//! licensebot exposes LicenseChain licenses, users, products and analytics
//! through slash commands. Every invocation is permission-checked, its
//! arguments validated against the command's schema, and its reply rendered
//! as a sanitized, platform-independent payload.
//!
//! ## Layers
//!
//! - **Client**: authenticated HTTP access to the licensing API
//! - **Store**: SQLite cache of users and licenses plus the validation log
//! - **Dispatch**: command table, permission tiers and the handler contract
//! - **Gateway**: JSON-lines transport feeding invocations to the dispatcher
//!
//! The licensing API is authoritative. The local store is supplementary:
//! when the API is unreachable, read commands answer from cached data and
//! mark the reply as such.
//!
//! ## Quickstart
//!
//! ```no_run
//! use licensebot::{BotConfig, LicenseBot};
//! use licensebot::dispatch::{Caller, CommandInvocation};
//!
//! # async fn run() -> Result<(), licensebot::BotError> {
//! let config = BotConfig::from_env()?;
//! let bot = LicenseBot::from_config(&config).await?;
//!
//! let invocation = CommandInvocation::new("license", Some("validate"), Caller::new("1234"))
//!     .with_arg("key", "ABCDEFGHIJKLMNOPQRSTUVWXYZ012345");
//! let response = bot.dispatcher().dispatch(invocation).await;
//! println!("{}", serde_json::to_string(&response).unwrap_or_default());
//! # Ok(())
//! # }
//! ```
//!
//! ## Configuration
//!
//! Read from the environment by [`BotConfig::from_env`]: `DISCORD_TOKEN`,
//! `LICENSE_CHAIN_API_KEY`, `LICENSE_CHAIN_API_URL`, `LICENSE_CHAIN_APP_ID`,
//! `BOT_OWNER_ID`, `ADMIN_ROLE_IDS`, `DATABASE_URL`, `REQUEST_TIMEOUT_SECS`,
//! `WEBHOOK_SECRET` and `LICENSE_OWNER_FIELDS`.

#![doc(html_root_url = "https://docs.rs/licensebot/0.1.0")]

// Core modules
pub mod clock;
pub mod config;
pub mod errors;
pub mod validate;

// Crypto layer
pub mod crypto;

// Protocol layer
pub mod protocol;

// Client layer
pub mod client;

// Storage layer
pub mod store;

// Metering layer
pub mod meter;

// Policy layer
pub mod policy;

// Command layer
pub mod commands;
pub mod dispatch;

// Bot assembly and transport
pub mod bot;
pub mod gateway;
pub mod webhook;

#[cfg(test)]
mod testing;

// Re-exports for public API
pub use bot::LicenseBot;
pub use clock::{Clock, SystemClock};
pub use config::BotConfig;
pub use dispatch::{CommandInvocation, Dispatcher, Response};
pub use errors::{BotError, ErrorKind};
pub use policy::tier::Tier;

#[cfg(any(test, feature = "test-seams"))]
pub use clock::MockClock;
