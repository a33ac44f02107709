use std::sync::Arc;

use async_trait::async_trait;

use epistle_core::{
    backend::AuthBackend,
    error::{BackendError, HandlerError},
    handler::{CommandHandler, Request},
    response::Response,
    session::Session,
};

use crate::{
    handlers::{in_phase, wrong_state},
    mailbox::{MailboxError, MailboxFactory},
    state::{Phase, pop3},
};

/// USER: record the name awaiting its PASS.
pub struct UserHandler;

#[async_trait]
impl CommandHandler for UserHandler {
    fn verbs(&self) -> &[&'static str] {
        &["USER"]
    }

    async fn on_command(
        &self,
        session: &mut Session,
        request: &Request,
    ) -> Result<Response, HandlerError> {
        let name = request.args().trim();
        if name.is_empty() {
            return Ok(Response::err("no username given"));
        }

        let state = pop3(session);
        if !in_phase(state, Phase::Authorization) {
            return Ok(wrong_state());
        }

        state.pending_user = Some(name.to_string());

        Ok(Response::ok(format!("{name} accepted, send PASS")))
    }
}

/// PASS: verify the USER/PASS pair, then lock the maildrop.
pub struct PassHandler {
    backend: Arc<dyn AuthBackend>,
    factory: Arc<dyn MailboxFactory>,
}

impl PassHandler {
    #[must_use]
    pub fn new(backend: Arc<dyn AuthBackend>, factory: Arc<dyn MailboxFactory>) -> Self {
        Self { backend, factory }
    }
}

#[async_trait]
impl CommandHandler for PassHandler {
    fn verbs(&self) -> &[&'static str] {
        &["PASS"]
    }

    async fn on_command(
        &self,
        session: &mut Session,
        request: &Request,
    ) -> Result<Response, HandlerError> {
        // A password may contain spaces, so take the argument verbatim.
        let password = request.args();

        let state = pop3(session);
        if !in_phase(state, Phase::Authorization) {
            return Ok(wrong_state());
        }

        let Some(user) = state.pending_user.take() else {
            return Ok(Response::err("send USER first"));
        };

        let identity = match self.backend.authenticate(&user, password).await {
            Ok(Some(identity)) => identity,
            Ok(None) => return Ok(Response::err("invalid credentials")),
            Err(BackendError::Temporary(_)) => {
                return Ok(Response::err("temporary authentication failure, try again later"));
            }
            Err(BackendError::Permanent(_)) => {
                return Ok(Response::err("invalid credentials"));
            }
        };

        let mailbox = match self.factory.open(&identity).await {
            Ok(mailbox) => mailbox,
            Err(MailboxError::Locked) => {
                return Ok(Response::err("maildrop already locked"));
            }
            Err(err) if err.is_temporary() => {
                return Ok(Response::err("mailbox temporarily unavailable"));
            }
            Err(_) => return Ok(Response::err("unable to open mailbox")),
        };

        tracing::debug!("Maildrop opened for {identity}");

        let count = mailbox.list().await.map(|listing| listing.len()).unwrap_or(0);
        let size = mailbox.size().await.unwrap_or(0);

        let state = pop3(session);
        state.mailbox = Some(mailbox);
        state.phase = Phase::Transaction;

        session.connection_mut().set_identity(identity);

        Ok(Response::ok(format!(
            "maildrop has {count} messages ({size} octets)"
        )))
    }
}
