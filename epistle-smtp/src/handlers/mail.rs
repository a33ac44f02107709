use async_trait::async_trait;

use epistle_core::{
    error::HandlerError,
    handler::Request,
    hook::HookResult,
    hookable::{CommandBehavior, HookableCommand},
    response::{Dsn, Response},
    session::Session,
};

use crate::{
    command::{SyntaxError, parse_mail_args},
    hooks::{MailHook, synthesize},
    status::{Status, reply},
};

/// The MAIL FROM handler.
#[must_use]
pub fn handler() -> HookableCommand<dyn MailHook> {
    HookableCommand::new(&["MAIL"], MailBehavior)
}

struct MailBehavior;

fn syntax_reply(err: &SyntaxError) -> Response {
    let dsn = match err {
        SyntaxError::BadAddress(_) => Dsn::new(5, 1, 7),
        SyntaxError::DuplicateSize => Dsn::new(5, 5, 4),
        SyntaxError::MissingKeyword(_) | SyntaxError::MissingBrackets => Dsn::new(5, 5, 2),
    };

    reply(Status::SyntaxError, err.to_string()).with_dsn(dsn)
}

#[async_trait]
impl CommandBehavior<dyn MailHook> for MailBehavior {
    async fn filter(
        &self,
        session: &mut Session,
        request: &Request,
    ) -> Result<Option<Response>, HandlerError> {
        let policy = session.policy();
        let enforce_helo = policy.enforce_helo_ehlo();
        let enforce_brackets = policy.enforce_address_brackets();
        let max_message_size = policy.max_message_size();
        let auth_required = policy.is_auth_required(session.peer().ip());

        if enforce_helo && session.transaction().hello().is_none() {
            return Ok(Some(
                reply(Status::InvalidCommandSequence, "Send HELO or EHLO first")
                    .with_dsn(Dsn::new(5, 5, 1)),
            ));
        }

        if auth_required && session.connection().identity().is_none() {
            return Ok(Some(
                reply(Status::AuthRequired, "Authentication required")
                    .with_dsn(Dsn::new(5, 7, 0)),
            ));
        }

        if session.transaction().sender().is_some() {
            return Ok(Some(
                reply(Status::InvalidCommandSequence, "Sender already specified")
                    .with_dsn(Dsn::new(5, 5, 1)),
            ));
        }

        match parse_mail_args(request.args(), enforce_brackets) {
            Err(err) => Ok(Some(syntax_reply(&err))),
            Ok((_, Some(declared))) if max_message_size > 0 && declared > max_message_size => {
                Ok(Some(
                    reply(
                        Status::ExceededStorage,
                        format!(
                            "Declared message size {declared} exceeds maximum {max_message_size}"
                        ),
                    )
                    .with_dsn(Dsn::new(5, 3, 4)),
                ))
            }
            Ok(_) => Ok(None),
        }
    }

    async fn invoke(
        &self,
        hook: &dyn MailHook,
        session: &mut Session,
        request: &Request,
    ) -> Result<HookResult, HandlerError> {
        let enforce_brackets = session.policy().enforce_address_brackets();

        // The filter already validated the syntax.
        let Ok((sender, _)) = parse_mail_args(request.args(), enforce_brackets) else {
            return Ok(HookResult::declined());
        };

        hook.on_mail(session, sender.as_ref()).await
    }

    async fn core(
        &self,
        session: &mut Session,
        request: &Request,
    ) -> Result<Response, HandlerError> {
        let enforce_brackets = session.policy().enforce_address_brackets();

        let Ok((sender, declared)) = parse_mail_args(request.args(), enforce_brackets) else {
            return Ok(reply(Status::SyntaxError, "Unable to parse sender")
                .with_dsn(Dsn::new(5, 5, 2)));
        };

        session.transaction_mut().set_sender(sender);
        if let Some(declared) = declared {
            session.transaction_mut().set_size_hint(declared);
        }

        Ok(reply(Status::Ok, "Sender OK").with_dsn(Dsn::new(2, 1, 0)))
    }

    fn synthesize(&self, result: &HookResult) -> Response {
        synthesize(result)
    }
}
