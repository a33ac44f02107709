use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;

use epistle_core::{
    backend::AuthBackend,
    chain::HookRegistry,
    error::{BackendError, HandlerError, WiringError},
    handler::{CommandHandler, ExtensibleHandler, LineHandler, LineOutcome, Request},
    hook::HookResult,
    response::{Dsn, Response},
    session::Session,
};

use crate::{
    hooks::AuthHook,
    status::{Status, reply},
};

/// The AUTH handler (RFC 4954, PLAIN only).
///
/// With an initial response the credential is verified immediately;
/// without one, a `334` challenge is sent and an [`AuthLineHandler`] is
/// pushed to read the continuation line. The [`AuthBackend`] verifies the
/// credential; registered [`AuthHook`]s are consulted afterwards and may
/// still reject the authentication.
pub struct AuthHandler {
    backend: Arc<dyn AuthBackend>,
    hooks: Vec<Arc<dyn AuthHook>>,
}

impl AuthHandler {
    #[must_use]
    pub fn new(backend: Arc<dyn AuthBackend>) -> Self {
        Self {
            backend,
            hooks: Vec::new(),
        }
    }
}

#[async_trait]
impl CommandHandler for AuthHandler {
    fn verbs(&self) -> &[&'static str] {
        &["AUTH"]
    }

    async fn on_command(
        &self,
        session: &mut Session,
        request: &Request,
    ) -> Result<Response, HandlerError> {
        if session.connection().identity().is_some() {
            return Ok(reply(Status::InvalidCommandSequence, "Already authenticated")
                .with_dsn(Dsn::new(5, 5, 1)));
        }

        // RFC 4954: AUTH is not permitted once a mail transaction begins.
        if session.transaction().sender().is_some() {
            return Ok(reply(
                Status::InvalidCommandSequence,
                "AUTH not permitted during a mail transaction",
            )
            .with_dsn(Dsn::new(5, 5, 1)));
        }

        let mut parts = request.args().split_whitespace();
        let Some(mechanism) = parts.next() else {
            return Ok(
                reply(Status::SyntaxError, "Mechanism required").with_dsn(Dsn::new(5, 5, 4))
            );
        };

        if !mechanism.eq_ignore_ascii_case("PLAIN") {
            return Ok(reply(
                Status::AuthMechanismUnsupported,
                "Unrecognized authentication type",
            )
            .with_dsn(Dsn::new(5, 5, 4)));
        }

        match parts.next() {
            Some(initial) => {
                authenticate_plain(session, &*self.backend, &self.hooks, initial).await
            }
            None => {
                session.push_line_handler(Box::new(AuthLineHandler {
                    backend: Arc::clone(&self.backend),
                    hooks: self.hooks.clone(),
                }));

                Ok(reply(Status::AuthContinue, ""))
            }
        }
    }

    fn as_extensible(&mut self) -> Option<&mut dyn ExtensibleHandler> {
        Some(self)
    }
}

impl ExtensibleHandler for AuthHandler {
    fn wire(&mut self, hooks: &HookRegistry) -> Result<(), WiringError> {
        self.hooks = hooks.of::<dyn AuthHook>();
        Ok(())
    }
}

/// Reads the single credential continuation line of an AUTH exchange.
pub struct AuthLineHandler {
    backend: Arc<dyn AuthBackend>,
    hooks: Vec<Arc<dyn AuthHook>>,
}

#[async_trait]
impl LineHandler for AuthLineHandler {
    async fn on_line(
        &mut self,
        session: &mut Session,
        line: &[u8],
    ) -> Result<LineOutcome, HandlerError> {
        session.pop_line_handler();

        if line == b"*" {
            return Ok(LineOutcome::Reply(
                reply(Status::SyntaxError, "Authentication aborted").with_dsn(Dsn::new(5, 0, 0)),
            ));
        }

        let payload = String::from_utf8_lossy(line);
        let response =
            authenticate_plain(session, &*self.backend, &self.hooks, payload.trim()).await?;

        Ok(LineOutcome::Reply(response))
    }
}

fn auth_denied(result: &HookResult) -> Response {
    let response = Response::smtp(
        result.status().unwrap_or_else(|| Status::AuthInvalid.into()),
        result
            .message()
            .map_or_else(|| "Authentication credentials invalid".to_string(), str::to_string),
    )
    .with_dsn(result.dsn().unwrap_or(Dsn::new(5, 7, 8)));

    if result.code() == epistle_core::hook::HookCode::Disconnect {
        response.closing()
    } else {
        response
    }
}

/// Verify one SASL PLAIN payload and update the session identity.
async fn authenticate_plain(
    session: &mut Session,
    backend: &dyn AuthBackend,
    hooks: &[Arc<dyn AuthHook>],
    payload: &str,
) -> Result<Response, HandlerError> {
    // RFC 4954: a lone "=" is an empty initial response.
    let payload = if payload == "=" { "" } else { payload };

    let Ok(decoded) = base64::engine::general_purpose::STANDARD.decode(payload) else {
        return Ok(reply(Status::SyntaxError, "Invalid base64").with_dsn(Dsn::new(5, 5, 2)));
    };

    let Ok(decoded) = String::from_utf8(decoded) else {
        return Ok(reply(Status::SyntaxError, "Invalid PLAIN response").with_dsn(Dsn::new(5, 5, 2)));
    };

    // authzid NUL authcid NUL passwd
    let parts: Vec<&str> = decoded.split('\0').collect();
    let [_, authcid, secret] = parts[..] else {
        return Ok(reply(Status::SyntaxError, "Invalid PLAIN response").with_dsn(Dsn::new(5, 5, 2)));
    };

    let identity = match backend.authenticate(authcid, secret).await {
        Ok(Some(identity)) => identity,
        Ok(None) => {
            return Ok(reply(Status::AuthInvalid, "Authentication credentials invalid")
                .with_dsn(Dsn::new(5, 7, 8)));
        }
        Err(BackendError::Temporary(_)) => {
            return Ok(reply(
                Status::AuthTemporaryFailure,
                "Temporary authentication failure",
            )
            .with_dsn(Dsn::new(4, 7, 0)));
        }
        Err(BackendError::Permanent(_)) => {
            return Ok(reply(Status::AuthInvalid, "Authentication credentials invalid")
                .with_dsn(Dsn::new(5, 7, 8)));
        }
    };

    for hook in hooks {
        let result = hook.on_auth(session, &identity).await?;
        if result.code().terminates() {
            return Ok(auth_denied(&result));
        }
    }

    session.connection_mut().set_identity(identity);

    Ok(reply(Status::AuthSucceeded, "Authentication successful").with_dsn(Dsn::new(2, 7, 0)))
}
