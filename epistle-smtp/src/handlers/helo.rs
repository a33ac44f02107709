use async_trait::async_trait;

use epistle_core::{
    error::HandlerError,
    handler::Request,
    hook::HookResult,
    hookable::{CommandBehavior, HookableCommand},
    response::{Dsn, Response},
    session::{
        Session,
        state::{HeloMode, Hello},
    },
};

use crate::{
    hooks::{HeloHook, synthesize},
    status::{Status, reply},
};

/// What the EHLO reply advertises beyond the mandatory keywords.
#[derive(Clone, Copy, Debug, Default)]
pub struct Capabilities {
    pub starttls: bool,
    pub auth: bool,
}

/// The HELO/EHLO handler.
#[must_use]
pub fn handler(capabilities: Capabilities) -> HookableCommand<dyn HeloHook> {
    handler_for(&["HELO", "EHLO"], capabilities)
}

/// The same behavior under different verbs; LMTP registers `LHLO`.
#[must_use]
pub fn handler_for(
    verbs: &'static [&'static str],
    capabilities: Capabilities,
) -> HookableCommand<dyn HeloHook> {
    HookableCommand::new(verbs, HeloBehavior { capabilities })
}

struct HeloBehavior {
    capabilities: Capabilities,
}

fn hello_from(request: &Request) -> Hello {
    let mode = match request.verb() {
        "HELO" => HeloMode::Helo,
        "LHLO" => HeloMode::Lhlo,
        _ => HeloMode::Ehlo,
    };

    Hello {
        mode,
        name: request.args().trim().to_string(),
    }
}

#[async_trait]
impl CommandBehavior<dyn HeloHook> for HeloBehavior {
    async fn filter(
        &self,
        _session: &mut Session,
        request: &Request,
    ) -> Result<Option<Response>, HandlerError> {
        if request.args().trim().is_empty() {
            return Ok(Some(
                reply(Status::SyntaxError, "Hostname required").with_dsn(Dsn::new(5, 5, 4)),
            ));
        }

        Ok(None)
    }

    async fn invoke(
        &self,
        hook: &dyn HeloHook,
        session: &mut Session,
        request: &Request,
    ) -> Result<HookResult, HandlerError> {
        hook.on_helo(session, &hello_from(request)).await
    }

    async fn core(
        &self,
        session: &mut Session,
        request: &Request,
    ) -> Result<Response, HandlerError> {
        let hello = hello_from(request);
        let hello_name = session.policy().hello_name().to_string();
        let max_message_size = session.policy().max_message_size();

        // A fresh greeting abandons any transaction in progress.
        session.transaction_mut().clear();
        session.transaction_mut().set_hello(hello.clone());

        let banner = format!("{hello_name} Hello {}", hello.name);

        if hello.mode == HeloMode::Helo {
            return Ok(reply(Status::Ok, banner));
        }

        let mut response = reply(Status::Ok, banner).line("PIPELINING");

        response = if max_message_size > 0 {
            response.line(format!("SIZE {max_message_size}"))
        } else {
            response.line("SIZE")
        };

        response = response.line("ENHANCEDSTATUSCODES").line("8BITMIME");

        if self.capabilities.starttls && !session.is_tls_started() {
            response = response.line("STARTTLS");
        }

        if self.capabilities.auth && session.connection().identity().is_none() {
            response = response.line("AUTH PLAIN");
        }

        Ok(response)
    }

    fn synthesize(&self, result: &HookResult) -> Response {
        synthesize(result)
    }
}
