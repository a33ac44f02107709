//! The reply model shared by every protocol.
//!
//! A [`Response`] carries a return code (three ASCII digits for SMTP and
//! LMTP, `+OK`/`-ERR` for POP3), an ordered list of text lines, and an
//! end-session flag. Rendering to wire lines lives here so that handlers
//! only ever deal in codes and text: SMTP multi-line replies use hyphen
//! continuation, POP3 multi-line replies dot-stuff their payload and close
//! with a lone `.`.

use std::borrow::Cow;
use std::fmt::{self, Display, Formatter};

/// An RFC 3463 enhanced status code, e.g. `5.1.7`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Dsn {
    class: u8,
    subject: u16,
    detail: u16,
}

impl Dsn {
    #[must_use]
    pub const fn new(class: u8, subject: u16, detail: u16) -> Self {
        Self {
            class,
            subject,
            detail,
        }
    }
}

impl Display for Dsn {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.class, self.subject, self.detail)
    }
}

/// The return-code family of a [`Response`].
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Code {
    /// A three-digit SMTP/LMTP reply code.
    Smtp(u16),
    /// POP3 positive status indicator (`+OK`).
    Ok,
    /// POP3 negative status indicator (`-ERR`).
    Err,
    /// Lines are already wire-formatted; pass them through verbatim.
    ///
    /// Used by [`MultiResponse`] aggregation, where every sub-reply keeps
    /// its own code.
    Raw,
}

impl Code {
    /// Permanent failures are 5xx (SMTP) or `-ERR` (POP3).
    #[must_use]
    pub const fn is_permanent(self) -> bool {
        matches!(self, Self::Err | Self::Smtp(500..=599))
    }

    /// Temporary failures are 4xx; POP3 has no temporary class.
    #[must_use]
    pub const fn is_temporary(self) -> bool {
        matches!(self, Self::Smtp(400..=499))
    }
}

/// A single reply to the client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Response {
    code: Code,
    dsn: Option<Dsn>,
    lines: Vec<Cow<'static, str>>,
    multiline: bool,
    end_session: bool,
}

impl Response {
    /// An SMTP/LMTP reply with the given three-digit code.
    #[must_use]
    pub fn smtp(code: u16, text: impl Into<Cow<'static, str>>) -> Self {
        Self {
            code: Code::Smtp(code),
            dsn: None,
            lines: vec![text.into()],
            multiline: false,
            end_session: false,
        }
    }

    /// A POP3 positive reply.
    #[must_use]
    pub fn ok(text: impl Into<Cow<'static, str>>) -> Self {
        Self {
            code: Code::Ok,
            dsn: None,
            lines: vec![text.into()],
            multiline: false,
            end_session: false,
        }
    }

    /// A POP3 negative reply.
    #[must_use]
    pub fn err(text: impl Into<Cow<'static, str>>) -> Self {
        Self {
            code: Code::Err,
            dsn: None,
            lines: vec![text.into()],
            multiline: false,
            end_session: false,
        }
    }

    /// A reply whose lines are already in wire form.
    #[must_use]
    pub fn raw(lines: Vec<String>, end_session: bool) -> Self {
        Self {
            code: Code::Raw,
            dsn: None,
            lines: lines.into_iter().map(Cow::Owned).collect(),
            multiline: false,
            end_session,
        }
    }

    /// Attach an enhanced status code; rendered before the text of every
    /// line of an SMTP reply.
    #[must_use]
    pub const fn with_dsn(mut self, dsn: Dsn) -> Self {
        self.dsn = Some(dsn);
        self
    }

    /// Append a further text line.
    #[must_use]
    pub fn line(mut self, text: impl Into<Cow<'static, str>>) -> Self {
        self.lines.push(text.into());
        self
    }

    /// Mark a POP3 reply as multi-line. The payload after the status line
    /// is dot-stuffed and the reply is closed with a lone `.`, even when
    /// the payload is empty.
    #[must_use]
    pub const fn multiline(mut self) -> Self {
        self.multiline = true;
        self
    }

    /// Close the connection once this reply has been flushed.
    #[must_use]
    pub const fn closing(mut self) -> Self {
        self.end_session = true;
        self
    }

    #[must_use]
    pub const fn code(&self) -> Code {
        self.code
    }

    #[must_use]
    pub const fn dsn(&self) -> Option<Dsn> {
        self.dsn
    }

    #[must_use]
    pub fn lines(&self) -> &[Cow<'static, str>] {
        &self.lines
    }

    #[must_use]
    pub const fn is_end_session(&self) -> bool {
        self.end_session
    }

    /// Render this reply into the lines that go on the wire, without CRLF.
    #[must_use]
    pub fn wire_lines(&self) -> Vec<String> {
        match self.code {
            Code::Smtp(code) => {
                let last = self.lines.len().saturating_sub(1);
                self.lines
                    .iter()
                    .enumerate()
                    .map(|(idx, line)| {
                        let sep = if idx == last { ' ' } else { '-' };
                        match self.dsn {
                            Some(dsn) => format!("{code}{sep}{dsn} {line}"),
                            None => format!("{code}{sep}{line}"),
                        }
                    })
                    .collect()
            }
            Code::Ok | Code::Err => {
                let indicator = if self.code == Code::Ok { "+OK" } else { "-ERR" };
                let mut wire = Vec::with_capacity(self.lines.len() + 1);

                let status = self.lines.first().map_or(Cow::Borrowed(""), Cow::clone);
                if status.is_empty() {
                    wire.push(indicator.to_string());
                } else {
                    wire.push(format!("{indicator} {status}"));
                }

                for line in self.lines.iter().skip(1) {
                    wire.push(stuff_dot(line));
                }

                if self.multiline {
                    wire.push(".".to_string());
                }

                wire
            }
            Code::Raw => self.lines.iter().map(|line| line.clone().into_owned()).collect(),
        }
    }
}

/// Leading-dot escape for a POP3 payload line.
fn stuff_dot(line: &str) -> String {
    if line.starts_with('.') {
        format!(".{line}")
    } else {
        line.to_string()
    }
}

/// An ordered aggregation of replies, one per LMTP recipient.
///
/// Renders as the concatenation of each sub-reply's wire lines in recipient
/// order; the session ends if any sub-reply says so.
#[derive(Debug, Default)]
pub struct MultiResponse {
    responses: Vec<Response>,
}

impl MultiResponse {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            responses: Vec::new(),
        }
    }

    pub fn push(&mut self, response: Response) {
        self.responses.push(response);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.responses.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.responses.is_empty()
    }

    #[must_use]
    pub fn is_end_session(&self) -> bool {
        self.responses.iter().any(Response::is_end_session)
    }

    /// Flatten into a single [`Response`] of pre-rendered lines.
    #[must_use]
    pub fn into_response(self) -> Response {
        let end_session = self.is_end_session();
        let lines = self
            .responses
            .iter()
            .flat_map(Response::wire_lines)
            .collect();

        Response::raw(lines, end_session)
    }
}

impl From<Vec<Response>> for MultiResponse {
    fn from(responses: Vec<Response>) -> Self {
        Self { responses }
    }
}
