//! The per-connection POP3 state machine.

use epistle_core::session::Session;

use crate::mailbox::Mailbox;

/// RFC 1939 session states. The update step is not a resting state: QUIT
/// from the transaction state performs it and closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Authorization,
    Transaction,
}

/// Everything POP3 keeps on the connection: the phase, the username
/// awaiting its PASS, and the locked maildrop once authenticated.
#[derive(Default)]
pub struct Pop3Session {
    pub phase: Phase,
    pub pending_user: Option<String>,
    pub mailbox: Option<Box<dyn Mailbox>>,
}

/// The connection's POP3 state, created on first access.
pub fn pop3(session: &mut Session) -> &mut Pop3Session {
    if session.extensions().get::<Pop3Session>().is_none() {
        session.extensions_mut().insert(Pop3Session::default());
    }

    match session.extensions_mut().get_mut::<Pop3Session>() {
        Some(state) => state,
        None => unreachable!("the POP3 session state was just inserted"),
    }
}
