//! Per-protocol knobs the transport needs.
//!
//! The transport is protocol-agnostic, but a handful of its replies are
//! not: what to say on idle timeout, on an over-long line, on a handler
//! fault, and on shutdown. Each protocol crate supplies a [`Dialect`]
//! answering those questions, plus the set of transaction keys that
//! survive a state reset.

use crate::{response::Response, session::state::StateKey};

pub trait Dialect: Send + Sync + 'static {
    /// Protocol name, for logs.
    fn name(&self) -> &'static str;

    /// Transaction keys preserved across [`crate::session::Session::reset_state`].
    fn carry_over(&self) -> &'static [StateKey];

    /// Sent when the idle deadline expires; must end the session.
    fn timeout_response(&self) -> Response;

    /// Sent when a command line exceeds the configured maximum.
    fn line_too_long_response(&self) -> Response;

    /// Sent when a handler fault escapes the command template.
    fn fault_response(&self) -> Response;

    /// Sent to live sessions when the server unbinds.
    fn shutdown_response(&self) -> Response;
}
