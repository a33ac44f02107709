use async_trait::async_trait;

use epistle_core::{
    error::HandlerError,
    handler::{CommandHandler, ConnectHandler, Request},
    response::Response,
    session::Session,
};

use crate::{
    handlers::{in_phase, wrong_state},
    state::{Phase, pop3},
};

/// Emits the `+OK` greeting when a connection is accepted.
pub struct Pop3Greeting;

#[async_trait]
impl ConnectHandler for Pop3Greeting {
    async fn on_connect(&self, session: &mut Session) -> Result<Option<Response>, HandlerError> {
        Ok(Some(Response::ok(format!(
            "{} POP3 server ready",
            session.policy().hello_name()
        ))))
    }
}

pub struct NoopHandler;

#[async_trait]
impl CommandHandler for NoopHandler {
    fn verbs(&self) -> &[&'static str] {
        &["NOOP"]
    }

    async fn on_command(
        &self,
        _session: &mut Session,
        _request: &Request,
    ) -> Result<Response, HandlerError> {
        Ok(Response::ok(""))
    }
}

/// RSET: unmark every deleted message. The un-deletion lives entirely in
/// mailbox state, so no session key survives the reset.
pub struct RsetHandler;

#[async_trait]
impl CommandHandler for RsetHandler {
    fn verbs(&self) -> &[&'static str] {
        &["RSET"]
    }

    async fn on_command(
        &self,
        session: &mut Session,
        _request: &Request,
    ) -> Result<Response, HandlerError> {
        let state = pop3(session);
        let Some(mailbox) = state.mailbox.as_mut().filter(|_| state.phase == Phase::Transaction)
        else {
            return Ok(wrong_state());
        };

        let response = match mailbox.rollback().await {
            Ok(()) => {
                let count = mailbox.list().await.map(|listing| listing.len()).unwrap_or(0);
                let size = mailbox.size().await.unwrap_or(0);
                Response::ok(format!("maildrop has {count} messages ({size} octets)"))
            }
            Err(err) => Response::err(err.to_string()),
        };

        session.reset_state();

        Ok(response)
    }
}

/// QUIT: from the transaction state this is the update step; from the
/// authorization state it closes without side effects.
pub struct QuitHandler;

#[async_trait]
impl CommandHandler for QuitHandler {
    fn verbs(&self) -> &[&'static str] {
        &["QUIT"]
    }

    async fn on_command(
        &self,
        session: &mut Session,
        _request: &Request,
    ) -> Result<Response, HandlerError> {
        let hello_name = session.policy().hello_name().to_string();
        let state = pop3(session);

        if in_phase(state, Phase::Transaction)
            && let Some(mailbox) = state.mailbox.as_mut()
            && let Err(err) = mailbox.commit_deletes().await
        {
            return Ok(Response::err(format!(
                "some deleted messages not removed: {err}"
            ))
            .closing());
        }

        Ok(Response::ok(format!("{hello_name} POP3 server signing off")).closing())
    }
}

/// The capabilities advertised by CAPA and honoured at wiring time.
#[derive(Clone, Copy, Debug, Default)]
pub struct Pop3Capabilities {
    pub stls: bool,
}

/// CAPA (RFC 2449): valid in both states.
pub struct CapaHandler {
    capabilities: Pop3Capabilities,
}

impl CapaHandler {
    #[must_use]
    pub const fn new(capabilities: Pop3Capabilities) -> Self {
        Self { capabilities }
    }
}

#[async_trait]
impl CommandHandler for CapaHandler {
    fn verbs(&self) -> &[&'static str] {
        &["CAPA"]
    }

    async fn on_command(
        &self,
        session: &mut Session,
        _request: &Request,
    ) -> Result<Response, HandlerError> {
        let mut response = Response::ok("capability list follows")
            .multiline()
            .line("USER")
            .line("TOP")
            .line("UIDL")
            .line("PIPELINING");

        if self.capabilities.stls && !session.is_tls_started() {
            response = response.line("STLS");
        }

        Ok(response.line("IMPLEMENTATION epistle"))
    }
}

/// STLS (RFC 2595): upgrade to TLS from the authorization state.
pub struct StlsHandler;

#[async_trait]
impl CommandHandler for StlsHandler {
    fn verbs(&self) -> &[&'static str] {
        &["STLS"]
    }

    async fn on_command(
        &self,
        session: &mut Session,
        _request: &Request,
    ) -> Result<Response, HandlerError> {
        if session.is_tls_started() {
            return Ok(Response::err("TLS already active"));
        }

        if !in_phase(pop3(session), Phase::Authorization) {
            return Ok(wrong_state());
        }

        session.request_tls();

        Ok(Response::ok("begin TLS negotiation"))
    }
}

pub struct UnknownHandler;

#[async_trait]
impl CommandHandler for UnknownHandler {
    fn verbs(&self) -> &[&'static str] {
        &[]
    }

    async fn on_command(
        &self,
        _session: &mut Session,
        _request: &Request,
    ) -> Result<Response, HandlerError> {
        Ok(Response::err("unknown command"))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use epistle_core::handler::{CommandHandler, Request};
    use pretty_assertions::assert_eq;

    use super::{CapaHandler, Pop3Capabilities, QuitHandler, RsetHandler};
    use crate::{
        mailbox::MailboxFactory,
        state::{Phase, pop3},
        testing::{TestMaildrop, session},
    };

    async fn transacting(maildrop: &TestMaildrop) -> epistle_core::session::Session {
        let mut session = session();
        let state = pop3(&mut session);
        state.mailbox = Some(maildrop.open("alice").await.unwrap());
        state.phase = Phase::Transaction;
        session
    }

    #[tokio::test]
    async fn quit_from_transaction_commits_the_deletes() {
        let maildrop = TestMaildrop::with_messages(&["a", "b"]);
        let mut session = transacting(&maildrop).await;

        pop3(&mut session)
            .mailbox
            .as_mut()
            .unwrap()
            .delete(1)
            .await
            .unwrap();

        let response = QuitHandler
            .on_command(&mut session, &Request::parse("QUIT"))
            .await
            .unwrap();

        assert!(response.is_end_session());
        assert!(maildrop.committed());
        assert_eq!(maildrop.remaining(), 1);
    }

    #[tokio::test]
    async fn quit_from_authorization_has_no_side_effects() {
        let maildrop = TestMaildrop::with_messages(&["a"]);
        let mut session = session();

        let response = QuitHandler
            .on_command(&mut session, &Request::parse("QUIT"))
            .await
            .unwrap();

        assert!(response.is_end_session());
        assert!(!maildrop.committed());
    }

    #[tokio::test]
    async fn rset_unmarks_deleted_messages() {
        let maildrop = TestMaildrop::with_messages(&["a", "b"]);
        let mut session = transacting(&maildrop).await;

        pop3(&mut session)
            .mailbox
            .as_mut()
            .unwrap()
            .delete(2)
            .await
            .unwrap();

        let response = RsetHandler
            .on_command(&mut session, &Request::parse("RSET"))
            .await
            .unwrap();

        assert_eq!(
            response.wire_lines(),
            vec!["+OK maildrop has 2 messages (2 octets)"]
        );
        assert_eq!(maildrop.remaining(), 2);
    }

    #[tokio::test]
    async fn capa_advertises_stls_until_tls_starts() {
        let handler = CapaHandler::new(Pop3Capabilities { stls: true });
        let mut session = session();

        let response = handler
            .on_command(&mut session, &Request::parse("CAPA"))
            .await
            .unwrap();
        assert!(response.wire_lines().contains(&"STLS".to_string()));

        session.mark_tls_started();
        let response = handler
            .on_command(&mut session, &Request::parse("CAPA"))
            .await
            .unwrap();
        assert!(!response.wire_lines().contains(&"STLS".to_string()));
    }
}
