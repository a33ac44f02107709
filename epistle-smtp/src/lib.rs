//! The SMTP receive path on top of `epistle-core`.
//!
//! Supplies the standard RFC 5321 verb handlers, the SMTP hook types
//! (HELO, MAIL, RCPT, message, AUTH, QUIT), the modal line handlers for
//! DATA and AUTH, and DNS-backed fast-fail hooks. [`chain`] assembles a
//! ready-to-wire [`ChainBuilder`] with all of them; embedders add their
//! own hooks before wiring.

pub mod command;
pub mod dns;
pub mod fastfail;
pub mod handlers;
pub mod hooks;
pub mod status;

use std::sync::Arc;

use epistle_core::{
    backend::AuthBackend,
    chain::ChainBuilder,
    dialect::Dialect,
    response::{Dsn, Response},
    session::state::StateKey,
};

pub use handlers::Capabilities;
pub use status::Status;

use crate::{
    dns::DnsService,
    fastfail::ValidSenderDomain,
    handlers::{
        AuthHandler, DataHandler, HelpHandler, NoopHandler, RsetHandler, ServiceGreeting,
        StarttlsHandler, UnknownHandler, VrfyHandler, helo, mail, quit_handler, rcpt,
    },
    hooks::MailHook,
    status::reply,
};

/// The transaction keys that survive a state reset: RSET and a completed
/// DATA both return the session to its post-greeting state.
pub const CARRY_OVER: &[StateKey] = &[StateKey::Hello];

/// SMTP's answers to the transport's protocol-specific questions.
pub struct SmtpDialect;

impl Dialect for SmtpDialect {
    fn name(&self) -> &'static str {
        "SMTP"
    }

    fn carry_over(&self) -> &'static [StateKey] {
        CARRY_OVER
    }

    fn timeout_response(&self) -> Response {
        reply(Status::Unavailable, "Connection timed out")
            .with_dsn(Dsn::new(4, 4, 2))
            .closing()
    }

    fn line_too_long_response(&self) -> Response {
        reply(Status::UnknownCommand, "Line too long")
            .with_dsn(Dsn::new(5, 5, 2))
            .closing()
    }

    fn fault_response(&self) -> Response {
        reply(
            Status::ActionAborted,
            "Requested action aborted: local error in processing",
        )
        .with_dsn(Dsn::new(4, 3, 0))
    }

    fn shutdown_response(&self) -> Response {
        reply(Status::Unavailable, "Service shutting down")
            .with_dsn(Dsn::new(4, 3, 2))
            .closing()
    }
}

/// The collaborators an SMTP chain is built around.
#[derive(Default)]
pub struct ChainOptions {
    /// Advertise and accept STARTTLS. The transport also needs a
    /// certificate in its [`epistle_core::transport::TlsConfig`].
    pub starttls: bool,

    /// Advertise and accept AUTH PLAIN against this backend.
    pub auth: Option<Arc<dyn AuthBackend>>,

    /// Install the sender-domain MX fast-fail hook against this resolver.
    pub dns: Option<Arc<dyn DnsService>>,
}

/// A chain builder carrying the full standard SMTP handler set.
///
/// The caller registers any further hooks, then wires:
///
/// ```ignore
/// let chain = chain(ChainOptions::default())
///     .hook::<dyn MessageHook>(Arc::new(SpoolMessage::new(spool)))
///     .wire()?;
/// ```
#[must_use]
pub fn chain(options: ChainOptions) -> ChainBuilder {
    let capabilities = Capabilities {
        starttls: options.starttls,
        auth: options.auth.is_some(),
    };

    let mut builder = ChainBuilder::new()
        .connect(ServiceGreeting)
        .command(helo::handler(capabilities))
        .command(mail::handler())
        .command(rcpt::handler())
        .command(DataHandler::new())
        .command(RsetHandler)
        .command(NoopHandler)
        .command(VrfyHandler)
        .command(HelpHandler)
        .command(quit_handler())
        .unknown(UnknownHandler);

    if options.starttls {
        builder = builder.command(StarttlsHandler);
    }

    if let Some(backend) = options.auth {
        builder = builder.command(AuthHandler::new(backend));
    }

    if let Some(dns) = options.dns {
        builder = builder.hook::<dyn MailHook>(Arc::new(ValidSenderDomain::new(dns)));
    }

    builder
}
