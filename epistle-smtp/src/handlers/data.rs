use std::sync::Arc;

use async_trait::async_trait;

use epistle_core::{
    chain::HookRegistry,
    error::{HandlerError, WiringError},
    handler::{CommandHandler, ExtensibleHandler, LineHandler, LineOutcome, Request},
    response::{Dsn, Response},
    session::Session,
};

use crate::{
    hooks::{Message, MessageHook, run_message_hooks},
    status::{Status, reply},
};

/// The DATA handler.
///
/// Sequence-checks the transaction, then pushes a [`DataLineHandler`]
/// that owns the connection's input until the end-of-data terminator.
pub struct DataHandler {
    hooks: Vec<Arc<dyn MessageHook>>,
}

impl DataHandler {
    #[must_use]
    pub const fn new() -> Self {
        Self { hooks: Vec::new() }
    }
}

impl Default for DataHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandHandler for DataHandler {
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

        session.push_line_handler(Box::new(DataLineHandler::new(
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

impl ExtensibleHandler for DataHandler {
    fn wire(&mut self, hooks: &HookRegistry) -> Result<(), WiringError> {
        self.hooks = hooks.of::<dyn MessageHook>();
        Ok(())
    }
}

/// Strip the leading-dot escape from a transmitted body line.
#[must_use]
pub fn unstuff(line: &[u8]) -> &[u8] {
    if line.first() == Some(&b'.') {
        &line[1..]
    } else {
        line
    }
}

/// Accumulates message lines until the lone-dot terminator, then runs the
/// [`MessageHook`] chain over the unstuffed message and pops itself.
pub struct DataLineHandler {
    hooks: Vec<Arc<dyn MessageHook>>,
    max_size: usize,
    buf: Vec<u8>,
    oversized: bool,
}

impl DataLineHandler {
    #[must_use]
    pub const fn new(hooks: Vec<Arc<dyn MessageHook>>, max_size: usize) -> Self {
        Self {
            hooks,
            max_size,
            buf: Vec::new(),
            oversized: false,
        }
    }

    fn take_message(&mut self, session: &Session) -> Message {
        let sender = session.transaction().sender().and_then(|s| s.cloned());
        let recipients = session
            .transaction()
            .recipients()
            .map(<[_]>::to_vec)
            .unwrap_or_default();

        Message {
            sender,
            recipients,
            data: std::mem::take(&mut self.buf).into(),
        }
    }
}

#[async_trait]
impl LineHandler for DataLineHandler {
    async fn on_line(
        &mut self,
        session: &mut Session,
        line: &[u8],
    ) -> Result<LineOutcome, HandlerError> {
        if line == b"." {
            session.pop_line_handler();

            if self.oversized {
                session.reset_state();
                return Ok(LineOutcome::Reply(
                    reply(
                        Status::ExceededStorage,
                        format!("Message exceeds fixed maximum size of {} bytes", self.max_size),
                    )
                    .with_dsn(Dsn::new(5, 3, 4)),
                ));
            }

            let message = self.take_message(session);
            tracing::debug!(
                "End of data: {} bytes for {} recipients",
                message.data.len(),
                message.recipients.len()
            );

            let response = run_message_hooks(&self.hooks, session, &message).await?;
            session.reset_state();

            return Ok(LineOutcome::Reply(response));
        }

        let line = unstuff(line);

        // Keep draining oversized messages until the terminator; the
        // rejection happens there, once, with the right code.
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
