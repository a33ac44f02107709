//! The hookable command template.
//!
//! A [`HookableCommand`] wraps one verb (or a small family of verbs) and
//! runs the same algorithm for all of them: filter checks first, then the
//! ordered hook chain, then either the reply synthesized from the decisive
//! hook result or the behavior's core command when every hook declined.
//!
//! Chain semantics per [`HookCode`](crate::hook::HookCode):
//!
//! | code         | action                                              |
//! |--------------|-----------------------------------------------------|
//! | `Declined`   | continue                                            |
//! | `Ok`         | record first, continue; overrides later `Declined`  |
//! | `Deny`       | stop, permanent failure reply                       |
//! | `DenySoft`   | stop, temporary failure reply                       |
//! | `Disconnect` | stop, reply carries the end-session flag            |

use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    chain::HookRegistry,
    error::{HandlerError, WiringError},
    handler::{CommandHandler, ExtensibleHandler, Request},
    hook::{HookCode, HookResult},
    response::Response,
    session::Session,
};

/// The per-verb half of the template.
///
/// The template owns the chain walk; implementations supply what varies
/// between verbs: the early filter checks, how to call one hook of type
/// `H`, the core command for when no hook takes ownership, and how a hook
/// result maps onto a protocol reply.
#[async_trait]
pub trait CommandBehavior<H: ?Sized>: Send + Sync {
    /// Syntax and sequence checks that run before any hook. A reply here
    /// short-circuits the whole template.
    async fn filter(
        &self,
        _session: &mut Session,
        _request: &Request,
    ) -> Result<Option<Response>, HandlerError> {
        Ok(None)
    }

    /// Invoke a single hook.
    async fn invoke(
        &self,
        hook: &H,
        session: &mut Session,
        request: &Request,
    ) -> Result<HookResult, HandlerError>;

    /// The core command, run when every hook declined.
    async fn core(
        &self,
        session: &mut Session,
        request: &Request,
    ) -> Result<Response, HandlerError>;

    /// Map a decisive hook result onto a reply, using the hook's return
    /// code, enhanced status, and message when present and protocol
    /// defaults otherwise.
    fn synthesize(&self, result: &HookResult) -> Response;
}

/// A command handler assembled from a [`CommandBehavior`] and the ordered
/// hook chain it was wired with.
pub struct HookableCommand<H: ?Sized + Send + Sync + 'static> {
    verbs: &'static [&'static str],
    behavior: Box<dyn CommandBehavior<H>>,
    hooks: Vec<Arc<H>>,
}

impl<H: ?Sized + Send + Sync + 'static> HookableCommand<H> {
    #[must_use]
    pub fn new(
        verbs: &'static [&'static str],
        behavior: impl CommandBehavior<H> + 'static,
    ) -> Self {
        Self {
            verbs,
            behavior: Box::new(behavior),
            hooks: Vec::new(),
        }
    }
}

impl<H: ?Sized + Send + Sync + 'static> ExtensibleHandler for HookableCommand<H> {
    fn wire(&mut self, hooks: &HookRegistry) -> Result<(), WiringError> {
        self.hooks = hooks.of::<H>();
        Ok(())
    }
}

#[async_trait]
impl<H: ?Sized + Send + Sync + 'static> CommandHandler for HookableCommand<H> {
    fn verbs(&self) -> &[&'static str] {
        self.verbs
    }

    async fn on_command(
        &self,
        session: &mut Session,
        request: &Request,
    ) -> Result<Response, HandlerError> {
        if let Some(response) = self.behavior.filter(session, request).await? {
            return Ok(response);
        }

        let mut accepted: Option<HookResult> = None;

        for hook in &self.hooks {
            let result = self.behavior.invoke(hook, session, request).await?;

            match result.code() {
                HookCode::Declined => {}
                HookCode::Ok => {
                    if accepted.is_none() {
                        accepted = Some(result);
                    }
                }
                HookCode::Deny | HookCode::DenySoft | HookCode::Disconnect => {
                    return Ok(self.behavior.synthesize(&result));
                }
            }
        }

        match accepted {
            Some(result) => Ok(self.behavior.synthesize(&result)),
            None => self.behavior.core(session, request).await,
        }
    }

    fn as_extensible(&mut self) -> Option<&mut dyn ExtensibleHandler> {
        Some(self)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use std::sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    use super::{CommandBehavior, HookableCommand};
    use crate::{
        chain::HookRegistry,
        config::ServerPolicy,
        error::HandlerError,
        handler::{CommandHandler, ExtensibleHandler, Request},
        hook::HookResult,
        response::Response,
        session::{Session, state::StateKey},
    };

    trait ScriptedHook: Send + Sync {
        fn result(&self) -> HookResult;
        fn mark_called(&self);
    }

    struct Scripted {
        result: HookResult,
        called: Arc<AtomicUsize>,
        order: Arc<Mutex<Vec<&'static str>>>,
        tag: &'static str,
    }

    impl ScriptedHook for Scripted {
        fn result(&self) -> HookResult {
            self.result.clone()
        }

        fn mark_called(&self) {
            self.called.fetch_add(1, Ordering::SeqCst);
            self.order.lock().unwrap().push(self.tag);
        }
    }

    struct Behavior {
        core_runs: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl CommandBehavior<dyn ScriptedHook> for Behavior {
        async fn invoke(
            &self,
            hook: &dyn ScriptedHook,
            _session: &mut Session,
            _request: &Request,
        ) -> Result<HookResult, HandlerError> {
            hook.mark_called();
            Ok(hook.result())
        }

        async fn core(
            &self,
            _session: &mut Session,
            _request: &Request,
        ) -> Result<Response, HandlerError> {
            self.core_runs.fetch_add(1, Ordering::SeqCst);
            Ok(Response::smtp(250, "core"))
        }

        fn synthesize(&self, result: &HookResult) -> Response {
            let code = result.status().unwrap_or(match result.code() {
                crate::hook::HookCode::Deny => 550,
                crate::hook::HookCode::DenySoft => 451,
                crate::hook::HookCode::Disconnect => 421,
                _ => 250,
            });
            let message = result.message().unwrap_or("synthesized").to_string();
            let response = Response::smtp(code, message);

            if result.code() == crate::hook::HookCode::Disconnect {
                response.closing()
            } else {
                response
            }
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

    struct Fixture {
        command: HookableCommand<dyn ScriptedHook>,
        order: Arc<Mutex<Vec<&'static str>>>,
        core_runs: Arc<AtomicUsize>,
        counters: Vec<Arc<AtomicUsize>>,
    }

    fn fixture(results: Vec<(&'static str, HookResult)>) -> Fixture {
        let order = Arc::new(Mutex::new(Vec::new()));
        let core_runs = Arc::new(AtomicUsize::new(0));
        let mut registry = HookRegistry::default();
        let mut counters = Vec::new();

        for (tag, result) in results {
            let called = Arc::new(AtomicUsize::new(0));
            counters.push(Arc::clone(&called));
            registry.register::<dyn ScriptedHook>(Arc::new(Scripted {
                result,
                called,
                order: Arc::clone(&order),
                tag,
            }));
        }

        let mut command = HookableCommand::<dyn ScriptedHook>::new(
            &["PROBE"],
            Behavior {
                core_runs: Arc::clone(&core_runs),
            },
        );
        command.wire(&registry).unwrap();

        Fixture {
            command,
            order,
            core_runs,
            counters,
        }
    }

    async fn run(fixture: &Fixture) -> Response {
        let mut session = session();
        fixture
            .command
            .on_command(&mut session, &Request::parse("PROBE"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn all_declined_runs_the_core_command() {
        let fixture = fixture(vec![
            ("a", HookResult::declined()),
            ("b", HookResult::declined()),
        ]);

        let response = run(&fixture).await;

        assert_eq!(response.wire_lines(), vec!["250 core"]);
        assert_eq!(fixture.core_runs.load(Ordering::SeqCst), 1);
        assert_eq!(*fixture.order.lock().unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn deny_stops_the_chain_immediately() {
        let fixture = fixture(vec![
            ("a", HookResult::declined()),
            ("b", HookResult::deny().with_message("rejected")),
            ("c", HookResult::declined()),
        ]);

        let response = run(&fixture).await;

        assert_eq!(response.wire_lines(), vec!["550 rejected"]);
        assert_eq!(fixture.core_runs.load(Ordering::SeqCst), 0);
        // the denying hook is the last one invoked
        assert_eq!(*fixture.order.lock().unwrap(), vec!["a", "b"]);
        assert_eq!(fixture.counters[2].load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn ok_is_recorded_and_overrides_later_declined() {
        let fixture = fixture(vec![
            ("a", HookResult::ok().with_message("accepted early")),
            ("b", HookResult::declined()),
        ]);

        let response = run(&fixture).await;

        assert_eq!(response.wire_lines(), vec!["250 accepted early"]);
        assert_eq!(fixture.core_runs.load(Ordering::SeqCst), 0);
        // the chain still ran to completion
        assert_eq!(*fixture.order.lock().unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn deny_soft_uses_temporary_code() {
        let fixture = fixture(vec![("a", HookResult::deny_soft())]);
        let response = run(&fixture).await;
        assert_eq!(response.wire_lines(), vec!["451 synthesized"]);
    }

    #[tokio::test]
    async fn disconnect_sets_end_session() {
        let fixture = fixture(vec![("a", HookResult::disconnect())]);
        let response = run(&fixture).await;
        assert!(response.is_end_session());
    }

}
