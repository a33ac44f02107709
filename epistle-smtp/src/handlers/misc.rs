use async_trait::async_trait;

use epistle_core::{
    error::HandlerError,
    handler::{CommandHandler, Request},
    hook::HookResult,
    hookable::{CommandBehavior, HookableCommand},
    response::{Dsn, Response},
    session::Session,
};

use crate::{
    hooks::{QuitHook, synthesize},
    status::{Status, reply},
};

/// RSET: abandon the transaction, keep the greeting.
pub struct RsetHandler;

#[async_trait]
impl CommandHandler for RsetHandler {
    fn verbs(&self) -> &[&'static str] {
        &["RSET"]
    }

    async fn on_command(
        &self,
        session: &mut Session,
        _request: &Request,
    ) -> Result<Response, HandlerError> {
        session.reset_state();
        Ok(reply(Status::Ok, "Ok").with_dsn(Dsn::new(2, 0, 0)))
    }
}

pub struct NoopHandler;

#[async_trait]
impl CommandHandler for NoopHandler {
    fn verbs(&self) -> &[&'static str] {
        &["NOOP"]
    }

    async fn on_command(
        &self,
        _session: &mut Session,
        _request: &Request,
    ) -> Result<Response, HandlerError> {
        Ok(reply(Status::Ok, "Ok").with_dsn(Dsn::new(2, 0, 0)))
    }
}

/// VRFY: answered inconclusively, per RFC 5321 section 3.5.3.
pub struct VrfyHandler;

#[async_trait]
impl CommandHandler for VrfyHandler {
    fn verbs(&self) -> &[&'static str] {
        &["VRFY"]
    }

    async fn on_command(
        &self,
        _session: &mut Session,
        _request: &Request,
    ) -> Result<Response, HandlerError> {
        Ok(reply(
            Status::CannotVerify,
            "Cannot verify user; try RCPT to attempt delivery",
        ))
    }
}

pub struct HelpHandler;

#[async_trait]
impl CommandHandler for HelpHandler {
    fn verbs(&self) -> &[&'static str] {
        &["HELP"]
    }

    async fn on_command(
        &self,
        _session: &mut Session,
        _request: &Request,
    ) -> Result<Response, HandlerError> {
        Ok(reply(
            Status::HelpMessage,
            "Supported commands: EHLO HELO MAIL RCPT DATA RSET NOOP VRFY HELP QUIT",
        ))
    }
}

/// The QUIT handler; consults [`QuitHook`]s before closing.
#[must_use]
pub fn quit_handler() -> HookableCommand<dyn QuitHook> {
    HookableCommand::new(&["QUIT"], QuitBehavior)
}

struct QuitBehavior;

#[async_trait]
impl CommandBehavior<dyn QuitHook> for QuitBehavior {
    async fn invoke(
        &self,
        hook: &dyn QuitHook,
        session: &mut Session,
        _request: &Request,
    ) -> Result<HookResult, HandlerError> {
        hook.on_quit(session).await
    }

    async fn core(
        &self,
        session: &mut Session,
        _request: &Request,
    ) -> Result<Response, HandlerError> {
        let hello_name = session.policy().hello_name().to_string();

        Ok(reply(
            Status::GoodBye,
            format!("{hello_name} Service closing transmission channel"),
        )
        .with_dsn(Dsn::new(2, 0, 0))
        .closing())
    }

    fn synthesize(&self, result: &HookResult) -> Response {
        // Whatever the hooks say, QUIT always ends the session.
        synthesize(result).closing()
    }
}

/// Receives every unrecognised verb.
pub struct UnknownHandler;

#[async_trait]
impl CommandHandler for UnknownHandler {
    fn verbs(&self) -> &[&'static str] {
        &[]
    }

    async fn on_command(
        &self,
        _session: &mut Session,
        request: &Request,
    ) -> Result<Response, HandlerError> {
        let text = if request.verb().is_empty() {
            "Command unrecognized".to_string()
        } else {
            format!("Command {} unrecognized", request.verb())
        };

        Ok(reply(Status::UnknownCommand, text).with_dsn(Dsn::new(5, 5, 1)))
    }
}
