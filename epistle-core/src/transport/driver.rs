//! The per-connection read-frame-dispatch loop.
//!
//! One driver task owns everything a connection needs: the socket, the
//! framing buffer, the session, and the line-handler stack. Lines are
//! framed on CRLF and handed to the top of the stack; replies are written
//! back in command order; stack mutations and TLS upgrade requests queued
//! on the session are applied after each dispatch, before the next line
//! is framed.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::{
    Signal,
    chain::HandlerChain,
    config::{Policy, ServerConfig},
    dialect::Dialect,
    dispatcher::Dispatcher,
    error::{ConnectionError, ConnectionResult, SessionError},
    handler::{LineHandler, LineOutcome},
    incoming, internal, outgoing,
    response::Response,
    session::{Session, StackOp},
    transport::connection::{Connection, TlsConfig},
};

/// Everything a listener hands to each accepted connection.
#[derive(Clone)]
pub struct SessionContext {
    pub chain: Arc<HandlerChain>,
    pub dialect: Arc<dyn Dialect>,
    pub policy: Arc<dyn Policy>,
    pub tls: Option<Arc<TlsConfig>>,
}

enum Frame {
    Line(Vec<u8>),
    Eof,
}

/// Frame the next CRLF-delimited line out of `buf`, reading more bytes as
/// needed. `limit` is `None` for message-body modes.
async fn next_line<Stream: AsyncRead + AsyncWrite + Unpin + Send + Sync>(
    conn: &mut Connection<Stream>,
    buf: &mut Vec<u8>,
    limit: Option<usize>,
) -> ConnectionResult<Frame> {
    let mut chunk = [0; 4096];
    let mut scanned: usize = 0;

    loop {
        if let Some(pos) = find_crlf(&buf[scanned.saturating_sub(1)..]) {
            let pos = pos + scanned.saturating_sub(1);
            if let Some(max) = limit
                && pos > max
            {
                return Err(ConnectionError::LineTooLong(max));
            }

            let mut line: Vec<u8> = buf.drain(..pos + 2).collect();
            line.truncate(pos);
            return Ok(Frame::Line(line));
        }

        scanned = buf.len();

        if let Some(max) = limit
            && buf.len() > max + 1
        {
            return Err(ConnectionError::LineTooLong(max));
        }

        let bytes_read = conn.receive(&mut chunk).await?;
        if bytes_read == 0 {
            return Ok(Frame::Eof);
        }

        buf.extend_from_slice(&chunk[..bytes_read]);
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|pair| pair == b"\r\n")
}

/// Apply the stack mutations a handler queued during its dispatch.
///
/// Popping the bottom handler is a programming error in the protocol
/// implementation and faults loudly rather than corrupting the session.
fn apply_stack_ops(stack: &mut Vec<Box<dyn LineHandler>>, ops: Vec<StackOp>) {
    for op in ops {
        match op {
            StackOp::Push(handler) => stack.push(handler),
            StackOp::Pop => {
                assert!(
                    stack.len() > 1,
                    "line-handler stack underflow: the command dispatcher is never popped"
                );
                stack.pop();
            }
        }
    }
}

async fn write_response<Stream: AsyncRead + AsyncWrite + Unpin + Send + Sync>(
    conn: &mut Connection<Stream>,
    response: &Response,
) -> ConnectionResult<()> {
    for line in response.wire_lines() {
        outgoing!("{line}");
        conn.send(&line).await?;
    }

    conn.flush().await
}

/// Drive one connection to completion.
///
/// Returns `Ok(())` for every orderly end of session (QUIT, EOF, timeout,
/// shutdown) and `Err` only for transport-class failures.
pub async fn serve<Stream: AsyncRead + AsyncWrite + Unpin + Send + Sync>(
    stream: Stream,
    peer: SocketAddr,
    local: SocketAddr,
    ctx: SessionContext,
    config: ServerConfig,
    mut shutdown: tokio::sync::broadcast::Receiver<Signal>,
) -> Result<(), SessionError> {
    internal!("Connected: {peer}");

    let mut conn = Connection::plain(stream);
    let mut session = Session::new(
        peer,
        local,
        Arc::clone(&ctx.policy),
        ctx.dialect.carry_over(),
    );

    // Invariant: the dispatcher sits at the bottom and is never popped.
    let mut stack: Vec<Box<dyn LineHandler>> = vec![Box::new(Dispatcher::new(
        Arc::clone(&ctx.chain),
        ctx.dialect.fault_response(),
    ))];

    for handler in ctx.chain.connect_handlers() {
        match handler.on_connect(&mut session).await {
            Ok(Some(response)) => {
                let end = response.is_end_session();
                write_response(&mut conn, &response).await?;
                if end {
                    internal!("Connection refused at accept: {peer}");
                    return Ok(());
                }
            }
            Ok(None) => {}
            Err(err) if err.is_transport() => return Err(err.into()),
            Err(err) => {
                internal!(level = ERROR, "Connect handler failed: {err}");
                let response = ctx.dialect.fault_response().closing();
                write_response(&mut conn, &response).await?;
                return Ok(());
            }
        }
    }

    let mut buf = Vec::new();
    let result: Result<(), SessionError> = loop {
        let limit = stack
            .last()
            .is_none_or(|handler| !handler.unlimited_line_length())
            .then_some(config.max_line_length);

        let frame = tokio::select! {
            _ = shutdown.recv() => {
                write_response(&mut conn, &ctx.dialect.shutdown_response()).await?;
                break Ok(());
            }

            frame = tokio::time::timeout(
                config.idle_timeout(),
                next_line(&mut conn, &mut buf, limit),
            ) => frame,
        };

        let line = match frame {
            Err(_elapsed) => {
                internal!("Idle timeout: {peer}");
                write_response(&mut conn, &ctx.dialect.timeout_response()).await?;
                break Ok(());
            }
            Ok(Err(ConnectionError::LineTooLong(max))) => {
                internal!("Line too long (> {max} bytes): {peer}");
                write_response(&mut conn, &ctx.dialect.line_too_long_response()).await?;
                break Ok(());
            }
            Ok(Err(err)) => break Err(err.into()),
            Ok(Ok(Frame::Eof)) => break Ok(()),
            Ok(Ok(Frame::Line(line))) => line,
        };

        incoming!("{}", String::from_utf8_lossy(&line));

        let outcome = match stack.last_mut() {
            Some(handler) => handler.on_line(&mut session, &line).await,
            None => unreachable!("the line-handler stack is never empty"),
        };

        let mut end = false;
        match outcome {
            Ok(LineOutcome::NoReply) => {}
            Ok(LineOutcome::Reply(response)) => {
                end = response.is_end_session();
                write_response(&mut conn, &response).await?;
            }
            Err(err) if err.is_transport() => break Err(SessionError::from(err)),
            Err(err) => {
                internal!(level = ERROR, "Line handler failed: {err}");
                write_response(&mut conn, &ctx.dialect.fault_response()).await?;
            }
        }

        apply_stack_ops(&mut stack, session.take_stack_ops());

        if end {
            break Ok(());
        }

        if session.take_tls_request() {
            let Some(tls) = ctx.tls.as_deref() else {
                internal!(level = ERROR, "TLS upgrade requested without TLS configuration");
                break Ok(());
            };

            // RFC 3207: anything the client pipelined after the upgrade
            // request must not survive into the encrypted channel.
            buf.clear();

            let (upgraded, info) = conn.upgrade(tls).await?;
            conn = upgraded;
            session.mark_tls_started();

            internal!(
                level = DEBUG,
                "Connection upgraded: {} {}",
                info.proto(),
                info.cipher()
            );
        }
    };

    internal!("Connection closed: {peer}");

    result.inspect_err(|err| {
        internal!(level = ERROR, "{err}");
    })
}
