//! The LMTP specialization (RFC 2033).
//!
//! LMTP is SMTP with two differences this crate owns: the greeting verb
//! is `LHLO` (HELO and EHLO are not registered, so they earn a `500`),
//! and the end-of-data terminator is answered with one reply block per
//! recipient, produced by the [`delivery::DeliveryHook`] chain. Everything
//! else is reused from `epistle-smtp`.

pub mod data;
pub mod delivery;

use async_trait::async_trait;

use epistle_core::{
    chain::ChainBuilder,
    dialect::Dialect,
    error::HandlerError,
    handler::ConnectHandler,
    response::{Dsn, Response},
    session::{Session, state::StateKey},
};
use epistle_smtp::{
    Capabilities, Status,
    handlers::{HelpHandler, NoopHandler, RsetHandler, UnknownHandler, VrfyHandler},
    handlers::{helo, mail, quit_handler, rcpt},
    status::reply,
};

pub use data::{LmtpDataHandler, LmtpDataLineHandler};
pub use delivery::DeliveryHook;

/// LHLO survives resets just as EHLO does in SMTP.
pub const CARRY_OVER: &[StateKey] = &[StateKey::Hello];

/// LMTP's answers to the transport's protocol-specific questions.
pub struct LmtpDialect;

impl Dialect for LmtpDialect {
    fn name(&self) -> &'static str {
        "LMTP"
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

/// Emits the `220` greeting when a connection is accepted.
pub struct LmtpGreeting;

#[async_trait]
impl ConnectHandler for LmtpGreeting {
    async fn on_connect(&self, session: &mut Session) -> Result<Option<Response>, HandlerError> {
        let greeting = format!(
            "{} LMTP {}",
            session.policy().hello_name(),
            session.policy().greeting()
        );

        Ok(Some(reply(Status::ServiceReady, greeting)))
    }
}

/// A chain builder carrying the standard LMTP handler set.
///
/// The caller must register at least one [`DeliveryHook`] before wiring;
/// a delivery-less LMTP chain is a wiring error.
#[must_use]
pub fn chain() -> ChainBuilder {
    ChainBuilder::new()
        .connect(LmtpGreeting)
        .command(helo::handler_for(&["LHLO"], Capabilities::default()))
        .command(mail::handler())
        .command(rcpt::handler())
        .command(LmtpDataHandler::new())
        .command(RsetHandler)
        .command(NoopHandler)
        .command(VrfyHandler)
        .command(HelpHandler)
        .command(quit_handler())
        .unknown(UnknownHandler)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use std::sync::Arc;

    use async_trait::async_trait;
    use epistle_core::{
        address::Address,
        error::{HandlerError, WiringError},
        hook::HookResult,
        session::Session,
    };
    use epistle_smtp::hooks::Message;

    use super::chain;
    use crate::delivery::DeliveryHook;

    struct AcceptAll;

    #[async_trait]
    impl DeliveryHook for AcceptAll {
        async fn deliver(
            &self,
            _session: &mut Session,
            _recipient: &Address,
            _message: &Message,
        ) -> Result<HookResult, HandlerError> {
            Ok(HookResult::ok())
        }
    }

    #[test]
    fn wiring_fails_without_a_delivery_hook() {
        assert!(matches!(
            chain().wire(),
            Err(WiringError::UnresolvedHook { verb: "DATA", .. })
        ));
    }

    #[test]
    fn the_standard_chain_wires_with_a_delivery_hook() {
        let chain = chain()
            .hook::<dyn DeliveryHook>(Arc::new(AcceptAll))
            .wire()
            .unwrap();

        assert!(chain.has_verb("LHLO"));
        assert!(!chain.has_verb("EHLO"));
        assert!(!chain.has_verb("HELO"));
        assert!(chain.has_verb("DATA"));
    }
}
