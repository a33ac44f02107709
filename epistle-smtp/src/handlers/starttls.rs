use async_trait::async_trait;

use epistle_core::{
    error::HandlerError,
    handler::{CommandHandler, Request},
    response::{Dsn, Response},
    session::Session,
};

use crate::status::{Status, reply};

/// The STARTTLS handler (RFC 3207).
///
/// Replies `220` and asks the transport to upgrade once that reply has
/// been flushed; the transport discards anything the client pipelined
/// after the upgrade request and resets the session state.
pub struct StarttlsHandler;

#[async_trait]
impl CommandHandler for StarttlsHandler {
    fn verbs(&self) -> &[&'static str] {
        &["STARTTLS"]
    }

    async fn on_command(
        &self,
        session: &mut Session,
        request: &Request,
    ) -> Result<Response, HandlerError> {
        if !request.args().trim().is_empty() {
            return Ok(
                reply(Status::SyntaxError, "No parameters allowed").with_dsn(Dsn::new(5, 5, 4))
            );
        }

        if session.is_tls_started() {
            return Ok(reply(Status::InvalidCommandSequence, "TLS already active")
                .with_dsn(Dsn::new(5, 5, 1)));
        }

        session.request_tls();

        Ok(reply(Status::ServiceReady, "Ready to start TLS").with_dsn(Dsn::new(2, 0, 0)))
    }
}
