//! The transaction-state maildrop commands.

use async_trait::async_trait;

use epistle_core::{
    error::HandlerError,
    handler::{CommandHandler, Request},
    response::Response,
    session::Session,
};

use crate::{
    handlers::{body_lines, in_phase, wrong_state},
    mailbox::{Mailbox, MailboxError},
    state::{Phase, Pop3Session, pop3},
};

fn mailbox_err(err: &MailboxError) -> Response {
    Response::err(err.to_string())
}

/// The locked maildrop, or `None` outside the transaction state.
fn maildrop(state: &mut Pop3Session) -> Option<&mut Box<dyn Mailbox>> {
    if in_phase(state, Phase::Transaction) {
        state.mailbox.as_mut()
    } else {
        None
    }
}

fn parse_number(args: &str) -> Option<usize> {
    args.trim().parse().ok()
}

pub struct StatHandler;

#[async_trait]
impl CommandHandler for StatHandler {
    fn verbs(&self) -> &[&'static str] {
        &["STAT"]
    }

    async fn on_command(
        &self,
        session: &mut Session,
        _request: &Request,
    ) -> Result<Response, HandlerError> {
        let Some(mailbox) = maildrop(pop3(session)) else {
            return Ok(wrong_state());
        };

        let count = match mailbox.list().await {
            Ok(listing) => listing.len(),
            Err(err) => return Ok(mailbox_err(&err)),
        };
        let size = match mailbox.size().await {
            Ok(size) => size,
            Err(err) => return Ok(mailbox_err(&err)),
        };

        Ok(Response::ok(format!("{count} {size}")))
    }
}

pub struct ListHandler;

#[async_trait]
impl CommandHandler for ListHandler {
    fn verbs(&self) -> &[&'static str] {
        &["LIST"]
    }

    async fn on_command(
        &self,
        session: &mut Session,
        request: &Request,
    ) -> Result<Response, HandlerError> {
        let args = request.args().trim().to_string();
        let Some(mailbox) = maildrop(pop3(session)) else {
            return Ok(wrong_state());
        };

        let listing = match mailbox.list().await {
            Ok(listing) => listing,
            Err(err) => return Ok(mailbox_err(&err)),
        };

        if !args.is_empty() {
            let Some(number) = parse_number(&args) else {
                return Ok(Response::err("noise on the line"));
            };

            return Ok(listing
                .iter()
                .find(|info| info.number == number)
                .map_or_else(
                    || Response::err("no such message"),
                    |info| Response::ok(format!("{} {}", info.number, info.size)),
                ));
        }

        let size: usize = listing.iter().map(|info| info.size).sum();
        let mut response =
            Response::ok(format!("{} messages ({size} octets)", listing.len())).multiline();
        for info in &listing {
            response = response.line(format!("{} {}", info.number, info.size));
        }

        Ok(response)
    }
}

pub struct RetrHandler;

#[async_trait]
impl CommandHandler for RetrHandler {
    fn verbs(&self) -> &[&'static str] {
        &["RETR"]
    }

    async fn on_command(
        &self,
        session: &mut Session,
        request: &Request,
    ) -> Result<Response, HandlerError> {
        let args = request.args().trim().to_string();
        let Some(mailbox) = maildrop(pop3(session)) else {
            return Ok(wrong_state());
        };

        let Some(number) = parse_number(&args) else {
            return Ok(Response::err("no message number given"));
        };

        let data = match mailbox.retrieve(number).await {
            Ok(data) => data,
            Err(err) => return Ok(mailbox_err(&err)),
        };

        let mut response = Response::ok(format!("{} octets", data.len())).multiline();
        for line in body_lines(&data) {
            response = response.line(line);
        }

        Ok(response)
    }
}

/// TOP: the headers plus the first n lines of the body (RFC 1939
/// section 7). Served from a full retrieve, truncated here.
pub struct TopHandler;

#[async_trait]
impl CommandHandler for TopHandler {
    fn verbs(&self) -> &[&'static str] {
        &["TOP"]
    }

    async fn on_command(
        &self,
        session: &mut Session,
        request: &Request,
    ) -> Result<Response, HandlerError> {
        let args = request.args().trim().to_string();
        let Some(mailbox) = maildrop(pop3(session)) else {
            return Ok(wrong_state());
        };

        let mut parts = args.split_whitespace();
        let (Some(number), Some(lines)) = (
            parts.next().and_then(parse_number),
            parts.next().and_then(parse_number),
        ) else {
            return Ok(Response::err("usage: TOP msg lines"));
        };

        let data = match mailbox.retrieve(number).await {
            Ok(data) => data,
            Err(err) => return Ok(mailbox_err(&err)),
        };

        let all = body_lines(&data);
        let header_end = all
            .iter()
            .position(String::is_empty)
            .map_or(all.len(), |blank| blank + 1);
        let keep = header_end + lines.min(all.len() - header_end);

        let mut response = Response::ok("").multiline();
        for line in &all[..keep] {
            response = response.line(line.clone());
        }

        Ok(response)
    }
}

pub struct UidlHandler;

#[async_trait]
impl CommandHandler for UidlHandler {
    fn verbs(&self) -> &[&'static str] {
        &["UIDL"]
    }

    async fn on_command(
        &self,
        session: &mut Session,
        request: &Request,
    ) -> Result<Response, HandlerError> {
        let args = request.args().trim().to_string();
        let Some(mailbox) = maildrop(pop3(session)) else {
            return Ok(wrong_state());
        };

        if !args.is_empty() {
            let Some(number) = parse_number(&args) else {
                return Ok(Response::err("noise on the line"));
            };

            return Ok(match mailbox.uidl(number).await {
                Ok(uid) => Response::ok(format!("{number} {uid}")),
                Err(err) => mailbox_err(&err),
            });
        }

        let listing = match mailbox.list().await {
            Ok(listing) => listing,
            Err(err) => return Ok(mailbox_err(&err)),
        };

        let mut response = Response::ok("").multiline();
        for info in &listing {
            match mailbox.uidl(info.number).await {
                Ok(uid) => response = response.line(format!("{} {uid}", info.number)),
                Err(err) => return Ok(mailbox_err(&err)),
            }
        }

        Ok(response)
    }
}

pub struct DeleHandler;

#[async_trait]
impl CommandHandler for DeleHandler {
    fn verbs(&self) -> &[&'static str] {
        &["DELE"]
    }

    async fn on_command(
        &self,
        session: &mut Session,
        request: &Request,
    ) -> Result<Response, HandlerError> {
        let args = request.args().trim().to_string();
        let Some(mailbox) = maildrop(pop3(session)) else {
            return Ok(wrong_state());
        };

        let Some(number) = parse_number(&args) else {
            return Ok(Response::err("no message number given"));
        };

        Ok(match mailbox.delete(number).await {
            Ok(()) => Response::ok(format!("message {number} deleted")),
            Err(err) => mailbox_err(&err),
        })
    }
}
