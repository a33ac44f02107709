//! Handler traits consulted by the chain and the per-connection driver.

use async_trait::async_trait;

use crate::{
    chain::HookRegistry,
    error::{HandlerError, WiringError},
    response::Response,
    session::Session,
};

/// A command line split into its verb and verbatim arguments.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Request {
    verb: String,
    args: String,
}

impl Request {
    /// Split a framed line into (verb, args).
    ///
    /// The verb is the first whitespace-delimited token, uppercased; the
    /// arguments are the remainder, passed through verbatim (the framer has
    /// already removed the trailing CRLF).
    #[must_use]
    pub fn parse(line: &str) -> Self {
        match line.split_once(char::is_whitespace) {
            Some((verb, args)) => Self {
                verb: verb.to_ascii_uppercase(),
                args: args.to_string(),
            },
            None => Self {
                verb: line.to_ascii_uppercase(),
                args: String::new(),
            },
        }
    }

    #[must_use]
    pub fn verb(&self) -> &str {
        &self.verb
    }

    #[must_use]
    pub fn args(&self) -> &str {
        &self.args
    }
}

/// Fires once when a connection is accepted, before any command.
///
/// May emit a greeting, or an end-session reply to refuse service.
#[async_trait]
pub trait ConnectHandler: Send + Sync {
    async fn on_connect(&self, session: &mut Session) -> Result<Option<Response>, HandlerError>;
}

/// Handles one or more verbs, producing a reply per command.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// The verbs this handler implements, uppercased.
    fn verbs(&self) -> &[&'static str];

    async fn on_command(
        &self,
        session: &mut Session,
        request: &Request,
    ) -> Result<Response, HandlerError>;

    /// Handlers that consume hooks at wiring time return themselves here.
    fn as_extensible(&mut self) -> Option<&mut dyn ExtensibleHandler> {
        None
    }
}

/// A handler that receives its hook providers during the one-shot wiring
/// pass of [`crate::chain::ChainBuilder::wire`].
pub trait ExtensibleHandler {
    fn wire(&mut self, hooks: &HookRegistry) -> Result<(), WiringError>;
}

/// What a line handler wants done after consuming a framed line.
#[derive(Debug, PartialEq, Eq)]
pub enum LineOutcome {
    /// Nothing to send; keep reading.
    NoReply,
    /// Send this reply.
    Reply(Response),
}

/// Consumes raw framed lines.
///
/// Line handlers are stacked on the connection to implement modal input:
/// the command dispatcher sits at the bottom, and DATA, AUTH, or STARTTLS
/// handlers are pushed on top for the duration of their mode. Only the top
/// handler receives lines; push and pop requests queued on the
/// [`Session`] take effect before the next line is framed.
#[async_trait]
pub trait LineHandler: Send + Sync {
    async fn on_line(
        &mut self,
        session: &mut Session,
        line: &[u8],
    ) -> Result<LineOutcome, HandlerError>;

    /// Message-body modes are exempt from the command line length limit.
    fn unlimited_line_length(&self) -> bool {
        false
    }
}
