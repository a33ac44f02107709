use async_trait::async_trait;

use epistle_core::{
    error::HandlerError,
    handler::Request,
    hook::HookResult,
    hookable::{CommandBehavior, HookableCommand},
    response::{Dsn, Response},
    session::Session,
};

use crate::{
    command::parse_rcpt_args,
    hooks::{RcptHook, synthesize},
    status::{Status, reply},
};

/// The RCPT TO handler.
#[must_use]
pub fn handler() -> HookableCommand<dyn RcptHook> {
    HookableCommand::new(&["RCPT"], RcptBehavior)
}

struct RcptBehavior;

#[async_trait]
impl CommandBehavior<dyn RcptHook> for RcptBehavior {
    async fn filter(
        &self,
        session: &mut Session,
        request: &Request,
    ) -> Result<Option<Response>, HandlerError> {
        if session.transaction().sender().is_none() {
            return Ok(Some(
                reply(Status::InvalidCommandSequence, "Need MAIL before RCPT")
                    .with_dsn(Dsn::new(5, 5, 1)),
            ));
        }

        let enforce_brackets = session.policy().enforce_address_brackets();
        match parse_rcpt_args(request.args(), enforce_brackets) {
            Ok(_) => Ok(None),
            Err(err) => Ok(Some(
                reply(Status::SyntaxError, err.to_string()).with_dsn(Dsn::new(5, 1, 3)),
            )),
        }
    }

    async fn invoke(
        &self,
        hook: &dyn RcptHook,
        session: &mut Session,
        request: &Request,
    ) -> Result<HookResult, HandlerError> {
        let enforce_brackets = session.policy().enforce_address_brackets();

        // The filter already validated the syntax.
        let Ok(recipient) = parse_rcpt_args(request.args(), enforce_brackets) else {
            return Ok(HookResult::declined());
        };

        hook.on_rcpt(session, &recipient).await
    }

    async fn core(
        &self,
        session: &mut Session,
        request: &Request,
    ) -> Result<Response, HandlerError> {
        let enforce_brackets = session.policy().enforce_address_brackets();

        let Ok(recipient) = parse_rcpt_args(request.args(), enforce_brackets) else {
            return Ok(reply(Status::SyntaxError, "Unable to parse recipient")
                .with_dsn(Dsn::new(5, 1, 3)));
        };

        // No hook accepted the recipient, so the default relay policy
        // decides: the peer either relays by address or is authenticated.
        let relaying_allowed = session.policy().is_relaying_allowed(session.peer().ip())
            || session.connection().identity().is_some();

        if !relaying_allowed {
            return Ok(reply(
                Status::Rejected,
                format!("Relaying denied for {}", recipient.mailbox()),
            )
            .with_dsn(Dsn::new(5, 7, 1)));
        }

        session.transaction_mut().push_recipient(recipient);

        Ok(reply(Status::Ok, "Recipient OK").with_dsn(Dsn::new(2, 1, 5)))
    }

    fn synthesize(&self, result: &HookResult) -> Response {
        synthesize(result)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use std::sync::Arc;

    use epistle_core::{
        config::ServerPolicy,
        handler::{CommandHandler, Request},
        session::{
            Session,
            state::{HeloMode, Hello, StateKey},
        },
    };
    use pretty_assertions::assert_eq;

    use super::handler;

    const CARRY_OVER: &[StateKey] = &[StateKey::Hello];

    fn transacting_session(peer: &str, policy: ServerPolicy) -> Session {
        let mut session = Session::new(
            peer.parse().unwrap(),
            "127.0.0.1:25".parse().unwrap(),
            Arc::new(policy),
            CARRY_OVER,
        );
        session.transaction_mut().set_hello(Hello {
            mode: HeloMode::Ehlo,
            name: "client.example".to_string(),
        });
        session.transaction_mut().set_sender(None);
        session
    }

    #[tokio::test]
    async fn rcpt_before_mail_is_a_bad_sequence() {
        let handler = handler();
        let mut session = Session::new(
            "127.0.0.1:4321".parse().unwrap(),
            "127.0.0.1:25".parse().unwrap(),
            Arc::new(ServerPolicy::default()),
            CARRY_OVER,
        );

        let response = handler
            .on_command(&mut session, &Request::parse("RCPT TO:<b@example.com>"))
            .await
            .unwrap();

        assert_eq!(
            response.wire_lines(),
            vec!["503 5.5.1 Need MAIL before RCPT"]
        );
        assert_eq!(session.rcpt_count(), 0);
    }

    #[tokio::test]
    async fn recipients_accumulate() {
        let handler = handler();
        let mut session = transacting_session("127.0.0.1:4321", ServerPolicy::default());

        for recipient in ["RCPT TO:<b@example.com>", "RCPT TO:<c@example.com>"] {
            let response = handler
                .on_command(&mut session, &Request::parse(recipient))
                .await
                .unwrap();
            assert_eq!(response.wire_lines(), vec!["250 2.1.5 Recipient OK"]);
        }

        assert_eq!(session.rcpt_count(), 2);
        let recipients = session.transaction().recipients().unwrap();
        assert_eq!(recipients[0].mailbox(), "b@example.com");
        assert_eq!(recipients[1].mailbox(), "c@example.com");
    }

    #[tokio::test]
    async fn relaying_is_denied_for_unprivileged_peers() {
        let handler = handler();
        let mut session = transacting_session("192.0.2.9:4321", ServerPolicy::default());

        let response = handler
            .on_command(&mut session, &Request::parse("RCPT TO:<b@example.com>"))
            .await
            .unwrap();

        assert_eq!(
            response.wire_lines(),
            vec!["550 5.7.1 Relaying denied for b@example.com"]
        );
        assert_eq!(session.rcpt_count(), 0);
    }

    #[tokio::test]
    async fn bad_recipient_syntax() {
        let handler = handler();
        let mut session = transacting_session("127.0.0.1:4321", ServerPolicy::default());

        let response = handler
            .on_command(&mut session, &Request::parse("RCPT b@example.com"))
            .await
            .unwrap();

        assert!(response.wire_lines()[0].starts_with("501 5.1.3"));
        assert_eq!(session.rcpt_count(), 0);
    }
}
