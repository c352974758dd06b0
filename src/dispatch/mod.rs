//! Command dispatch: descriptors, invocations, handler context and the
//! response envelope.

pub mod context;
pub mod descriptor;
pub mod dispatcher;
pub mod invocation;
pub mod response;

pub use context::{HandlerContext, HandlerSettings};
pub use descriptor::{CommandDescriptor, CommandTable, HandlerFn, ParamKind, ParamSpec};
pub use dispatcher::Dispatcher;
pub use invocation::{ArgValue, Arguments, Caller, CommandInvocation};
pub use response::{DataSource, HandlerResult, Payload, ReplyKind, ReplyState, Response};
