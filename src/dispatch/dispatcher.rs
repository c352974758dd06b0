//! The command pipeline.
//!
//! For each invocation:
//! 1. Look up the descriptor; unknown names fail without touching anything
//! 2. Resolve the caller's tier and enforce the descriptor's minimum
//! 3. Validate arguments against the declared schema
//! 4. Run the handler, converting panics into internal errors
//! 5. Record successful runs in the command log (failure tolerated)
//! 6. Wrap the outcome in a [`Response`]

use super::context::{tolerate, HandlerContext, HandlerSettings};
use super::descriptor::CommandTable;
use super::invocation::CommandInvocation;
use super::response::{HandlerResult, Payload, ReplyState, Response};
use crate::client::LicenseApi;
use crate::clock::Clock;
use crate::errors::ErrorKind;
use crate::policy::tier::{require_tier, PermissionResolver};
use crate::store::LicenseStore;
use crate::BotError;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::Instrument;

/// Routes invocations to handlers.
pub struct Dispatcher {
    table: Arc<CommandTable>,
    resolver: PermissionResolver,
    api: Arc<dyn LicenseApi>,
    store: Arc<dyn LicenseStore>,
    clock: Arc<dyn Clock>,
    settings: Arc<HandlerSettings>,
}

impl Dispatcher {
    pub fn new(
        table: CommandTable,
        resolver: PermissionResolver,
        api: Arc<dyn LicenseApi>,
        store: Arc<dyn LicenseStore>,
        clock: Arc<dyn Clock>,
        settings: HandlerSettings,
    ) -> Self {
        Self {
            table: Arc::new(table),
            resolver,
            api,
            store,
            clock,
            settings: Arc::new(settings),
        }
    }

    /// The registered commands.
    pub fn table(&self) -> &CommandTable {
        &self.table
    }

    /// Store shared with handlers.
    pub fn store(&self) -> &Arc<dyn LicenseStore> {
        &self.store
    }

    /// Dispatch with fresh reply state.
    pub async fn dispatch(&self, invocation: CommandInvocation) -> Response {
        self.dispatch_with_reply(invocation, ReplyState::new()).await
    }

    /// Dispatch using reply state owned by the transport.
    pub async fn dispatch_with_reply(
        &self,
        invocation: CommandInvocation,
        reply: ReplyState,
    ) -> Response {
        let command = invocation.qualified_name();
        let span = tracing::info_span!(
            "command",
            command = %command,
            caller = %invocation.caller.identity
        );

        let (outcome, ephemeral) = self.run(invocation, reply.clone()).instrument(span.clone()).await;

        let result = span.in_scope(|| match outcome {
            Ok(payload) => {
                tracing::info!(source = ?payload.source, "command succeeded");
                HandlerResult::Success(payload)
            }
            Err(err) => {
                match err.kind() {
                    ErrorKind::InternalError => tracing::error!(error = %err, "command failed"),
                    ErrorKind::UpstreamError | ErrorKind::StoreUnavailable => {
                        tracing::warn!(error = %err, "command failed")
                    }
                    _ => tracing::info!(error = %err, "command rejected"),
                }
                HandlerResult::from_error(&err)
            }
        });

        Response {
            command,
            ephemeral: ephemeral || !result.is_success(),
            reply: reply.mark_responded(),
            result,
        }
    }

    async fn run(
        &self,
        invocation: CommandInvocation,
        reply: ReplyState,
    ) -> (Result<Payload, BotError>, bool) {
        let Some(descriptor) = self
            .table
            .lookup(&invocation.name, invocation.subcommand.as_deref())
        else {
            return (Err(BotError::UnknownCommand(invocation.qualified_name())), true);
        };
        let ephemeral = descriptor.ephemeral;

        let tier = self.resolver.resolve_tier(&invocation.caller);
        if let Some(minimum) = descriptor.min_tier {
            if let Err(e) = require_tier(tier, minimum) {
                return (Err(e), true);
            }
        }

        let arguments = match descriptor.validate_arguments(&invocation.arguments) {
            Ok(arguments) => arguments,
            Err(e) => return (Err(e), true),
        };

        let identity = invocation.caller.identity.clone();
        let command = descriptor.qualified_name();
        let ctx = HandlerContext {
            invocation: CommandInvocation {
                arguments,
                ..invocation
            },
            tier,
            api: Arc::clone(&self.api),
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
            settings: Arc::clone(&self.settings),
            commands: Arc::clone(&self.table),
            reply,
        };

        let outcome = match AssertUnwindSafe((descriptor.handler)(&ctx))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(panic) => Err(BotError::Internal(format!(
                "handler panicked: {}",
                panic_message(panic.as_ref())
            ))),
        };

        if outcome.is_ok() {
            tolerate("log_command", self.store.log_command(&identity, &command).await);
        }
        (outcome, ephemeral)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
