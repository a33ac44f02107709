//! The protocol-level view of one connection.
//!
//! A [`Session`] is created right after accept and destroyed when the
//! socket closes. It carries two state tiers with disjoint namespaces:
//! connection state lives for the whole TCP connection, transaction state
//! is cleared by [`Session::reset_state`] except for the protocol's
//! carry-over set. Handlers also use the session to queue line-handler
//! stack operations and transport control requests; the driver applies
//! them after the handler returns, before the next line is framed.

pub mod state;

use std::any::{Any, TypeId};
use std::net::SocketAddr;
use std::sync::Arc;

use ahash::AHashMap;

use crate::{
    config::Policy,
    handler::LineHandler,
    session::state::{StateKey, StateMap},
};

/// A queued mutation of the connection's line-handler stack.
pub enum StackOp {
    Push(Box<dyn LineHandler>),
    Pop,
}

impl std::fmt::Debug for StackOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Push(_) => "Push",
            Self::Pop => "Pop",
        })
    }
}

/// Type-keyed storage for live per-connection resources.
///
/// Protocol crates stash handles here that have no place in the value
/// map, such as the POP3 mailbox lock.
#[derive(Default)]
pub struct Extensions {
    entries: AHashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Extensions {
    pub fn insert<T: Send + Sync + 'static>(&mut self, value: T) {
        self.entries.insert(TypeId::of::<T>(), Box::new(value));
    }

    #[must_use]
    pub fn get<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.entries
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref())
    }

    pub fn get_mut<T: Send + Sync + 'static>(&mut self) -> Option<&mut T> {
        self.entries
            .get_mut(&TypeId::of::<T>())
            .and_then(|value| value.downcast_mut())
    }

    pub fn remove<T: Send + Sync + 'static>(&mut self) -> Option<T> {
        self.entries
            .remove(&TypeId::of::<T>())
            .and_then(|value| value.downcast().ok())
            .map(|value| *value)
    }
}

pub struct Session {
    peer: SocketAddr,
    local: SocketAddr,
    policy: Arc<dyn Policy>,
    carry_over: &'static [StateKey],
    connection: StateMap,
    transaction: StateMap,
    extensions: Extensions,
    stack_ops: Vec<StackOp>,
    tls_requested: bool,
}

impl Session {
    #[must_use]
    pub fn new(
        peer: SocketAddr,
        local: SocketAddr,
        policy: Arc<dyn Policy>,
        carry_over: &'static [StateKey],
    ) -> Self {
        Self {
            peer,
            local,
            policy,
            carry_over,
            connection: StateMap::default(),
            transaction: StateMap::default(),
            extensions: Extensions::default(),
            stack_ops: Vec::new(),
            tls_requested: false,
        }
    }

    #[must_use]
    pub const fn peer(&self) -> SocketAddr {
        self.peer
    }

    #[must_use]
    pub const fn local(&self) -> SocketAddr {
        self.local
    }

    #[must_use]
    pub fn policy(&self) -> &dyn Policy {
        &*self.policy
    }

    /// Connection-scoped state; lives until the socket closes.
    #[must_use]
    pub const fn connection(&self) -> &StateMap {
        &self.connection
    }

    pub const fn connection_mut(&mut self) -> &mut StateMap {
        &mut self.connection
    }

    /// Transaction-scoped state; cleared by [`Session::reset_state`].
    #[must_use]
    pub const fn transaction(&self) -> &StateMap {
        &self.transaction
    }

    pub const fn transaction_mut(&mut self) -> &mut StateMap {
        &mut self.transaction
    }

    #[must_use]
    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    /// Cardinality of the current transaction's recipient list.
    #[must_use]
    pub fn rcpt_count(&self) -> usize {
        self.transaction.rcpt_count()
    }

    /// Clear the transaction tier, preserving exactly the carry-over set.
    ///
    /// Idempotent: resetting twice leaves the same state as resetting once.
    pub fn reset_state(&mut self) {
        let preserved: Vec<_> = self
            .carry_over
            .iter()
            .filter_map(|key| {
                self.transaction
                    .get(key)
                    .cloned()
                    .map(|value| (key.clone(), value))
            })
            .collect();

        self.transaction.clear();

        for (key, value) in preserved {
            self.transaction.insert(key, value);
        }
    }

    /// Queue a line handler to be pushed before the next line is framed.
    pub fn push_line_handler(&mut self, handler: Box<dyn LineHandler>) {
        self.stack_ops.push(StackOp::Push(handler));
    }

    /// Queue a pop of the top line handler.
    ///
    /// Popping the bottom handler (the command dispatcher) is a programming
    /// error; the driver panics when it applies such an op.
    pub fn pop_line_handler(&mut self) {
        self.stack_ops.push(StackOp::Pop);
    }

    /// Drain the queued stack mutations. Called by the transport driver
    /// after each dispatch, before the next line is framed.
    pub fn take_stack_ops(&mut self) -> Vec<StackOp> {
        std::mem::take(&mut self.stack_ops)
    }

    /// Whether any stack mutations are queued.
    #[must_use]
    pub fn has_stack_ops(&self) -> bool {
        !self.stack_ops.is_empty()
    }

    /// Ask the transport to upgrade this connection to TLS after the
    /// pending reply has been flushed.
    pub fn request_tls(&mut self) {
        self.tls_requested = true;
    }

    /// Consume a pending TLS upgrade request. Called by the transport
    /// driver once the reply has been flushed.
    pub fn take_tls_request(&mut self) -> bool {
        std::mem::take(&mut self.tls_requested)
    }

    /// Called by the transport once the TLS handshake has completed.
    ///
    /// RFC 3207 requires the session to forget everything it learned in
    /// the clear; both tiers are dropped and the TLS flag is set.
    pub fn mark_tls_started(&mut self) {
        self.connection.clear();
        self.transaction.clear();
        self.connection.set_flag(StateKey::TlsStarted, true);
    }

    #[must_use]
    pub fn is_tls_started(&self) -> bool {
        self.connection.flag(&StateKey::TlsStarted)
    }
}
