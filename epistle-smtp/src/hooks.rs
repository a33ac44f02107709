//! SMTP hook types.
//!
//! Each stage of the receive path exposes one typed extension point.
//! Hooks are registered on the chain builder and handed, in registration
//! order, to the hookable command that consumes them during wiring.

use std::sync::Arc;

use async_trait::async_trait;

use epistle_core::{
    address::Address,
    error::HandlerError,
    hook::{HookCode, HookResult},
    response::{Dsn, Response},
    session::{Session, state::Hello},
};

use crate::status::Status;

/// The accumulated message handed to the [`MessageHook`] chain.
#[derive(Clone, Debug)]
pub struct Message {
    pub sender: Option<Address>,
    pub recipients: Vec<Address>,
    pub data: Arc<[u8]>,
}

/// Consulted when the client introduces itself with HELO or EHLO.
#[async_trait]
pub trait HeloHook: Send + Sync {
    async fn on_helo(
        &self,
        session: &mut Session,
        hello: &Hello,
    ) -> Result<HookResult, HandlerError>;
}

/// Consulted for MAIL FROM; `None` is the null reverse-path.
#[async_trait]
pub trait MailHook: Send + Sync {
    async fn on_mail(
        &self,
        session: &mut Session,
        sender: Option<&Address>,
    ) -> Result<HookResult, HandlerError>;
}

/// Consulted for each RCPT TO.
#[async_trait]
pub trait RcptHook: Send + Sync {
    async fn on_rcpt(
        &self,
        session: &mut Session,
        recipient: &Address,
    ) -> Result<HookResult, HandlerError>;
}

/// Consulted once the end-of-data terminator arrives.
#[async_trait]
pub trait MessageHook: Send + Sync {
    async fn on_message(
        &self,
        session: &mut Session,
        message: &Message,
    ) -> Result<HookResult, HandlerError>;
}

/// Consulted after the backend accepted a credential, before the session
/// is marked authenticated.
#[async_trait]
pub trait AuthHook: Send + Sync {
    async fn on_auth(
        &self,
        session: &mut Session,
        identity: &str,
    ) -> Result<HookResult, HandlerError>;
}

/// Consulted when the client says QUIT.
#[async_trait]
pub trait QuitHook: Send + Sync {
    async fn on_quit(&self, session: &mut Session) -> Result<HookResult, HandlerError>;
}

/// Map a decisive hook result onto an SMTP reply.
///
/// The hook's return code, enhanced status, and message win when present;
/// otherwise each chain verdict gets its conventional default.
#[must_use]
pub fn synthesize(result: &HookResult) -> Response {
    let (status, dsn, message) = match result.code() {
        HookCode::Deny => (Status::Rejected, Dsn::new(5, 7, 1), "Rejected"),
        HookCode::DenySoft => (
            Status::ActionAborted,
            Dsn::new(4, 7, 1),
            "Temporary failure, try again later",
        ),
        HookCode::Disconnect => (
            Status::Unavailable,
            Dsn::new(4, 3, 0),
            "Closing transmission channel",
        ),
        HookCode::Ok | HookCode::Declined => (Status::Ok, Dsn::new(2, 0, 0), "Ok"),
    };

    let response = Response::smtp(
        result.status().unwrap_or_else(|| status.into()),
        result
            .message()
            .map_or_else(|| message.to_string(), str::to_string),
    )
    .with_dsn(result.dsn().unwrap_or(dsn));

    if result.code() == HookCode::Disconnect {
        response.closing()
    } else {
        response
    }
}

/// Walk a [`MessageHook`] chain with the standard merge semantics and
/// synthesize the reply for one accepted message.
pub async fn run_message_hooks(
    hooks: &[Arc<dyn MessageHook>],
    session: &mut Session,
    message: &Message,
) -> Result<Response, HandlerError> {
    let mut accepted: Option<HookResult> = None;

    for hook in hooks {
        let result = hook.on_message(session, message).await?;

        match result.code() {
            HookCode::Declined => {}
            HookCode::Ok => {
                if accepted.is_none() {
                    accepted = Some(result);
                }
            }
            HookCode::Deny | HookCode::DenySoft | HookCode::Disconnect => {
                return Ok(synthesize(&result));
            }
        }
    }

    Ok(match accepted {
        Some(result) => synthesize(&result),
        None => Response::smtp(Status::Ok.into(), "Message accepted for delivery")
            .with_dsn(Dsn::new(2, 6, 0)),
    })
}
