//! LMTP DATA: one reply block per recipient.

use std::sync::Arc;

use async_trait::async_trait;

use epistle_core::{
    address::Address,
    chain::HookRegistry,
    error::{HandlerError, WiringError},
    handler::{CommandHandler, ExtensibleHandler, LineHandler, LineOutcome, Request},
    hook::{HookCode, HookResult},
    response::{Dsn, MultiResponse, Response},
    session::Session,
};
use epistle_smtp::{
    Status,
    handlers::data::unstuff,
    hooks::Message,
    status::reply,
};

use crate::delivery::DeliveryHook;

/// The LMTP DATA handler.
///
/// Shares the SMTP sequence checks but pushes a line handler that, at the
/// terminator, consults the [`DeliveryHook`] chain once per recipient and
/// wraps the outcomes into a [`MultiResponse`] in RCPT order.
pub struct LmtpDataHandler {
    hooks: Vec<Arc<dyn DeliveryHook>>,
}

impl LmtpDataHandler {
    #[must_use]
    pub const fn new() -> Self {
        Self { hooks: Vec::new() }
    }
}

impl Default for LmtpDataHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandHandler for LmtpDataHandler {
    fn verbs(&self) -> &[&'static str] {
        &["DATA"]
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

        if session.transaction().sender().is_none() {
            return Ok(reply(Status::InvalidCommandSequence, "Need MAIL before DATA")
                .with_dsn(Dsn::new(5, 5, 1)));
        }

        if session.rcpt_count() == 0 {
            return Ok(reply(Status::InvalidCommandSequence, "Need RCPT before DATA")
                .with_dsn(Dsn::new(5, 5, 1)));
        }

        session.push_line_handler(Box::new(LmtpDataLineHandler::new(
            self.hooks.clone(),
            session.policy().max_message_size(),
        )));

        Ok(reply(
            Status::StartMailInput,
            "End data with <CR><LF>.<CR><LF>",
        ))
    }

    fn as_extensible(&mut self) -> Option<&mut dyn ExtensibleHandler> {
        Some(self)
    }
}

impl ExtensibleHandler for LmtpDataHandler {
    fn wire(&mut self, hooks: &HookRegistry) -> Result<(), WiringError> {
        self.hooks = hooks.require::<dyn DeliveryHook>("DATA")?;
        Ok(())
    }
}

/// Map one recipient's decisive delivery result onto its reply block.
fn recipient_reply(recipient: &Address, result: &HookResult) -> Response {
    let (status, dsn, message) = match result.code() {
        HookCode::Deny => (
            Status::Rejected,
            Dsn::new(5, 2, 1),
            format!("{} delivery refused", recipient.mailbox()),
        ),
        HookCode::DenySoft => (
            Status::ActionAborted,
            Dsn::new(4, 3, 0),
            format!("{} temporary delivery failure", recipient.mailbox()),
        ),
        HookCode::Disconnect => (
            Status::Unavailable,
            Dsn::new(4, 3, 0),
            "Closing transmission channel".to_string(),
        ),
        HookCode::Ok | HookCode::Declined => (
            Status::Ok,
            Dsn::new(2, 1, 5),
            format!("{} OK", recipient.mailbox()),
        ),
    };

    let response = Response::smtp(
        result.status().unwrap_or_else(|| status.into()),
        result.message().map_or(message, str::to_string),
    )
    .with_dsn(result.dsn().unwrap_or(dsn));

    if result.code() == HookCode::Disconnect {
        response.closing()
    } else {
        response
    }
}

/// Accumulates the message, then delivers it per recipient.
pub struct LmtpDataLineHandler {
    hooks: Vec<Arc<dyn DeliveryHook>>,
    max_size: usize,
    buf: Vec<u8>,
    oversized: bool,
}

impl LmtpDataLineHandler {
    #[must_use]
    pub const fn new(hooks: Vec<Arc<dyn DeliveryHook>>, max_size: usize) -> Self {
        Self {
            hooks,
            max_size,
            buf: Vec::new(),
            oversized: false,
        }
    }

    async fn deliver_to(
        &self,
        session: &mut Session,
        recipient: &Address,
        message: &Message,
    ) -> Result<Response, HandlerError> {
        let mut accepted: Option<HookResult> = None;

        for hook in &self.hooks {
            let result = hook.deliver(session, recipient, message).await?;

            match result.code() {
                HookCode::Declined => {}
                HookCode::Ok => {
                    if accepted.is_none() {
                        accepted = Some(result);
                    }
                }
                HookCode::Deny | HookCode::DenySoft | HookCode::Disconnect => {
                    return Ok(recipient_reply(recipient, &result));
                }
            }
        }

        Ok(match accepted {
            Some(result) => recipient_reply(recipient, &result),
            // Nobody owned this recipient: a temporary failure, so the
            // client retries once the configuration is fixed.
            None => reply(
                Status::ActionAborted,
                format!("{} delivery not attempted", recipient.mailbox()),
            )
            .with_dsn(Dsn::new(4, 3, 0)),
        })
    }

    async fn finalize(&mut self, session: &mut Session) -> Result<Response, HandlerError> {
        let recipients: Vec<Address> = session
            .transaction()
            .recipients()
            .map(<[_]>::to_vec)
            .unwrap_or_default();

        if self.oversized {
            session.reset_state();
            let oversize = reply(
                Status::ExceededStorage,
                format!("Message exceeds fixed maximum size of {} bytes", self.max_size),
            )
            .with_dsn(Dsn::new(5, 3, 4));

            let mut replies = MultiResponse::new();
            for _ in &recipients {
                replies.push(oversize.clone());
            }
            return Ok(replies.into_response());
        }

        let message = Message {
            sender: session.transaction().sender().and_then(|s| s.cloned()),
            recipients: recipients.clone(),
            data: std::mem::take(&mut self.buf).into(),
        };

        tracing::debug!(
            "End of data: {} bytes for {} recipients",
            message.data.len(),
            recipients.len()
        );

        let mut replies = MultiResponse::new();
        for recipient in &recipients {
            replies.push(self.deliver_to(session, recipient, &message).await?);
        }

        session.reset_state();

        Ok(replies.into_response())
    }
}

#[async_trait]
impl LineHandler for LmtpDataLineHandler {
    async fn on_line(
        &mut self,
        session: &mut Session,
        line: &[u8],
    ) -> Result<LineOutcome, HandlerError> {
        if line == b"." {
            session.pop_line_handler();
            let response = self.finalize(session).await?;
            return Ok(LineOutcome::Reply(response));
        }

        let line = unstuff(line);

        if self.max_size > 0 && self.buf.len() + line.len() + 2 > self.max_size {
            self.oversized = true;
            self.buf.clear();
        }

        if !self.oversized {
            self.buf.extend_from_slice(line);
            self.buf.extend_from_slice(b"\r\n");
        }

        Ok(LineOutcome::NoReply)
    }

    fn unlimited_line_length(&self) -> bool {
        true
    }
}
