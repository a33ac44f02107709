//! The built-in POP3 command handlers.

pub mod maildrop;
pub mod misc;
pub mod user;

pub use maildrop::{DeleHandler, ListHandler, RetrHandler, StatHandler, TopHandler, UidlHandler};
pub use misc::{
    CapaHandler, NoopHandler, Pop3Greeting, QuitHandler, RsetHandler, StlsHandler, UnknownHandler,
};
pub use user::{PassHandler, UserHandler};

use epistle_core::response::Response;

use crate::state::{Phase, Pop3Session};

/// The refusal shared by every command issued in the wrong state.
pub(crate) fn wrong_state() -> Response {
    Response::err("command not valid in this state")
}

pub(crate) fn in_phase(state: &Pop3Session, phase: Phase) -> bool {
    state.phase == phase
}

/// Split message bytes into reply payload lines.
pub(crate) fn body_lines(data: &[u8]) -> Vec<String> {
    if data.is_empty() {
        return Vec::new();
    }

    let text = String::from_utf8_lossy(data);
    let mut lines: Vec<String> = text.split("\r\n").map(str::to_string).collect();

    // A trailing CRLF is a line terminator, not an empty final line.
    if text.ends_with("\r\n") {
        lines.pop();
    }

    lines
}
