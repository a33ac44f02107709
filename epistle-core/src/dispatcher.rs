//! The command dispatcher at the bottom of every line-handler stack.

use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    chain::HandlerChain,
    error::HandlerError,
    handler::{LineHandler, LineOutcome, Request},
    internal,
    response::Response,
    session::Session,
};

/// Routes framed command lines to their verb's handler.
///
/// The dispatcher never inspects arguments and keeps no state: it splits
/// the line into (verb, args), looks the verb up in the frozen chain
/// (falling back to the UNKNOWN handler), and forwards the reply. Handler
/// faults that escape the command template are converted into the
/// protocol's generic failure reply; only transport-class faults
/// propagate and close the connection.
pub struct Dispatcher {
    chain: Arc<HandlerChain>,
    fault: Response,
}

impl Dispatcher {
    #[must_use]
    pub fn new(chain: Arc<HandlerChain>, fault: Response) -> Self {
        Self { chain, fault }
    }
}

#[async_trait]
impl LineHandler for Dispatcher {
    async fn on_line(
        &mut self,
        session: &mut Session,
        line: &[u8],
    ) -> Result<LineOutcome, HandlerError> {
        let line = String::from_utf8_lossy(line);
        let request = Request::parse(&line);

        let handler = Arc::clone(self.chain.command(request.verb()));

        match handler.on_command(session, &request).await {
            Ok(response) => Ok(LineOutcome::Reply(response)),
            Err(err) if err.is_transport() => Err(err),
            Err(err) => {
                internal!(level = ERROR, "{} failed: {err}", request.verb());
                Ok(LineOutcome::Reply(self.fault.clone()))
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    use super::Dispatcher;
    use crate::{
        chain::ChainBuilder,
        config::ServerPolicy,
        error::HandlerError,
        handler::{CommandHandler, LineHandler, LineOutcome, Request},
        response::Response,
        session::{Session, state::StateKey},
    };

    struct Recorder {
        verbs: &'static [&'static str],
        calls: Arc<AtomicUsize>,
        seen: Arc<std::sync::Mutex<Vec<Request>>>,
    }

    #[async_trait]
    impl CommandHandler for Recorder {
        fn verbs(&self) -> &[&'static str] {
            self.verbs
        }

        async fn on_command(
            &self,
            _session: &mut Session,
            request: &Request,
        ) -> Result<Response, HandlerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(request.clone());
            Ok(Response::smtp(250, "Ok"))
        }
    }

    struct Faulty;

    #[async_trait]
    impl CommandHandler for Faulty {
        fn verbs(&self) -> &[&'static str] {
            &["BOOM"]
        }

        async fn on_command(
            &self,
            _session: &mut Session,
            _request: &Request,
        ) -> Result<Response, HandlerError> {
            Err(HandlerError::Other("exploded".to_string()))
        }
    }

    fn session() -> Session {
        const NO_CARRY_OVER: &[StateKey] = &[];
        Session::new(
            "192.0.2.7:4321".parse().unwrap(),
            "127.0.0.1:25".parse().unwrap(),
            Arc::new(ServerPolicy::default()),
            NO_CARRY_OVER,
        )
    }

    #[tokio::test]
    async fn registered_verb_is_invoked_exactly_once_with_verbatim_args() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));

        let chain = ChainBuilder::new()
            .command(Recorder {
                verbs: &["MAIL"],
                calls: Arc::clone(&calls),
                seen: Arc::clone(&seen),
            })
            .unknown(Recorder {
                verbs: &[],
                calls: Arc::new(AtomicUsize::new(0)),
                seen: Arc::new(std::sync::Mutex::new(Vec::new())),
            })
            .wire()
            .unwrap();

        let mut dispatcher = Dispatcher::new(Arc::new(chain), Response::smtp(451, "Oops"));
        let mut session = session();

        let outcome = dispatcher
            .on_line(&mut session, b"mail FROM:<a@example.com>")
            .await
            .unwrap();

        assert!(matches!(outcome, LineOutcome::Reply(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].verb(), "MAIL");
        assert_eq!(seen[0].args(), "FROM:<a@example.com>");
    }

    #[tokio::test]
    async fn unknown_verbs_route_to_the_unknown_handler() {
        let unknown_calls = Arc::new(AtomicUsize::new(0));

        let chain = ChainBuilder::new()
            .unknown(Recorder {
                verbs: &[],
                calls: Arc::clone(&unknown_calls),
                seen: Arc::new(std::sync::Mutex::new(Vec::new())),
            })
            .wire()
            .unwrap();

        let mut dispatcher = Dispatcher::new(Arc::new(chain), Response::smtp(451, "Oops"));
        let mut session = session();

        dispatcher
            .on_line(&mut session, b"BOGUS args")
            .await
            .unwrap();

        assert_eq!(unknown_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn handler_faults_become_the_generic_failure_reply() {
        let chain = ChainBuilder::new()
            .command(Faulty)
            .unknown(Recorder {
                verbs: &[],
                calls: Arc::new(AtomicUsize::new(0)),
                seen: Arc::new(std::sync::Mutex::new(Vec::new())),
            })
            .wire()
            .unwrap();

        let mut dispatcher = Dispatcher::new(Arc::new(chain), Response::smtp(451, "Requested action aborted"));
        let mut session = session();

        let outcome = dispatcher.on_line(&mut session, b"BOOM").await.unwrap();

        match outcome {
            LineOutcome::Reply(response) => {
                assert_eq!(response.wire_lines(), vec!["451 Requested action aborted"]);
            }
            LineOutcome::NoReply => panic!("fault must produce a reply"),
        }
    }
}
