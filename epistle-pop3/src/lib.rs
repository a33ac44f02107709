//! The POP3 protocol (RFC 1939 + STLS, RFC 2595) on top of `epistle-core`.
//!
//! Supplies the Authorization/Transaction state machine, the maildrop
//! seam ([`Mailbox`] / [`MailboxFactory`]), and the standard verb set
//! with dot-stuffed multi-line replies. QUIT from the transaction state
//! performs the update step through [`Mailbox::commit_deletes`]; RSET
//! un-deletes through [`Mailbox::rollback`], so no session state carries
//! over a reset.

pub mod handlers;
pub mod mailbox;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use epistle_core::{
    backend::AuthBackend,
    chain::ChainBuilder,
    dialect::Dialect,
    response::Response,
    session::state::StateKey,
};

pub use handlers::misc::Pop3Capabilities;
pub use mailbox::{Mailbox, MailboxError, MailboxFactory, MessageInfo};
pub use state::{Phase, Pop3Session};

use crate::handlers::{
    CapaHandler, DeleHandler, ListHandler, NoopHandler, PassHandler, Pop3Greeting, QuitHandler,
    RetrHandler, RsetHandler, StatHandler, StlsHandler, TopHandler, UidlHandler, UnknownHandler,
    UserHandler,
};

/// POP3 RSET is entirely mailbox-side, so nothing survives a reset.
pub const CARRY_OVER: &[StateKey] = &[];

/// POP3's answers to the transport's protocol-specific questions.
pub struct Pop3Dialect;

impl Dialect for Pop3Dialect {
    fn name(&self) -> &'static str {
        "POP3"
    }

    fn carry_over(&self) -> &'static [StateKey] {
        CARRY_OVER
    }

    fn timeout_response(&self) -> Response {
        Response::err("autologout; connection closed").closing()
    }

    fn line_too_long_response(&self) -> Response {
        Response::err("line too long").closing()
    }

    fn fault_response(&self) -> Response {
        Response::err("internal error")
    }

    fn shutdown_response(&self) -> Response {
        Response::err("server shutting down").closing()
    }
}

/// A chain builder carrying the standard POP3 handler set.
#[must_use]
pub fn chain(
    backend: Arc<dyn AuthBackend>,
    factory: Arc<dyn MailboxFactory>,
    capabilities: Pop3Capabilities,
) -> ChainBuilder {
    let mut builder = ChainBuilder::new()
        .connect(Pop3Greeting)
        .command(UserHandler)
        .command(PassHandler::new(backend, factory))
        .command(StatHandler)
        .command(ListHandler)
        .command(RetrHandler)
        .command(TopHandler)
        .command(UidlHandler)
        .command(DeleHandler)
        .command(NoopHandler)
        .command(RsetHandler)
        .command(QuitHandler)
        .command(CapaHandler::new(capabilities))
        .unknown(UnknownHandler);

    if capabilities.stls {
        builder = builder.command(StlsHandler);
    }

    builder
}
