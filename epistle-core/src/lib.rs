//! The protocol-agnostic core of the epistle framework.
//!
//! Epistle builds line-oriented mail protocol servers (SMTP, LMTP, POP3) out
//! of four pieces supplied by this crate: an asynchronous TCP transport with
//! line framing, idle timeouts, and STARTTLS upgrades; a per-connection
//! [`session::Session`] carrying connection- and transaction-scoped state; an
//! ordered, one-shot-wired [`chain::HandlerChain`] of command handlers and
//! typed hooks; and the [`hookable::HookableCommand`] template that runs
//! filter checks, a hook chain, and a core command for every verb.
//!
//! Protocol crates (`epistle-smtp`, `epistle-lmtp`, `epistle-pop3`) supply
//! the concrete verbs, hook types, and modal line handlers on top.

pub mod address;
pub mod backend;
pub mod chain;
pub mod config;
pub mod dialect;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod hook;
pub mod hookable;
pub mod logging;
pub mod response;
pub mod session;
pub mod transport;

pub use tracing;

pub use chain::{ChainBuilder, HandlerChain, HookRegistry};
pub use config::{Policy, ServerConfig, ServerPolicy};
pub use dialect::Dialect;
pub use handler::{
    CommandHandler, ConnectHandler, ExtensibleHandler, LineHandler, LineOutcome, Request,
};
pub use hook::{HookCode, HookResult};
pub use hookable::{CommandBehavior, HookableCommand};
pub use response::{Code, Dsn, MultiResponse, Response};
pub use session::Session;

/// Control messages broadcast to listeners and live sessions.
#[derive(Debug, Clone, Copy)]
pub enum Signal {
    Shutdown,
}
