//! Shared doubles for the handler tests.

#![allow(clippy::expect_used)]

use std::sync::{Arc, Mutex, atomic::AtomicBool, atomic::Ordering};

use async_trait::async_trait;

use epistle_core::{
    backend::AuthBackend,
    config::ServerPolicy,
    error::BackendError,
    session::{Session, state::StateKey},
};

use crate::mailbox::{Mailbox, MailboxError, MailboxFactory, MessageInfo};

pub(crate) const CARRY_OVER: &[StateKey] = &[];

pub(crate) fn session() -> Session {
    Session::new(
        "127.0.0.1:4321".parse().expect("valid address"),
        "127.0.0.1:110".parse().expect("valid address"),
        Arc::new(ServerPolicy {
            hello_name: "pop3.example.com".to_string(),
            ..ServerPolicy::default()
        }),
        CARRY_OVER,
    )
}

/// Accepts `alice` / `secret` only.
pub(crate) struct TestAuth;

#[async_trait]
impl AuthBackend for TestAuth {
    async fn authenticate(
        &self,
        user: &str,
        credential: &str,
    ) -> Result<Option<String>, BackendError> {
        Ok((user == "alice" && credential == "secret").then(|| user.to_string()))
    }
}

#[derive(Default)]
struct DropState {
    messages: Vec<(Vec<u8>, bool)>,
    committed: bool,
}

/// An in-memory maildrop shared between the factory and its mailboxes so
/// tests can observe deletes and commits from the outside.
#[derive(Clone, Default)]
pub(crate) struct TestMaildrop {
    state: Arc<Mutex<DropState>>,
    locked: Arc<AtomicBool>,
}

impl TestMaildrop {
    pub(crate) fn with_messages(messages: &[&str]) -> Self {
        Self {
            state: Arc::new(Mutex::new(DropState {
                messages: messages
                    .iter()
                    .map(|message| (message.as_bytes().to_vec(), false))
                    .collect(),
                committed: false,
            })),
            locked: Arc::new(AtomicBool::new(false)),
        }
    }

    pub(crate) fn committed(&self) -> bool {
        self.state.lock().expect("lock poisoned").committed
    }

    pub(crate) fn remaining(&self) -> usize {
        self.state
            .lock()
            .expect("lock poisoned")
            .messages
            .iter()
            .filter(|(_, deleted)| !deleted)
            .count()
    }
}

#[async_trait]
impl MailboxFactory for TestMaildrop {
    async fn open(&self, _user: &str) -> Result<Box<dyn Mailbox>, MailboxError> {
        if self.locked.swap(true, Ordering::SeqCst) {
            return Err(MailboxError::Locked);
        }

        Ok(Box::new(self.clone()))
    }
}

#[async_trait]
impl Mailbox for TestMaildrop {
    async fn list(&self) -> Result<Vec<MessageInfo>, MailboxError> {
        Ok(self
            .state
            .lock()
            .expect("lock poisoned")
            .messages
            .iter()
            .enumerate()
            .filter(|(_, (_, deleted))| !deleted)
            .map(|(idx, (data, _))| MessageInfo {
                number: idx + 1,
                size: data.len(),
            })
            .collect())
    }

    async fn retrieve(&self, number: usize) -> Result<Arc<[u8]>, MailboxError> {
        self.state
            .lock()
            .expect("lock poisoned")
            .messages
            .get(number.wrapping_sub(1))
            .filter(|(_, deleted)| !deleted)
            .map(|(data, _)| Arc::from(data.as_slice()))
            .ok_or(MailboxError::NoSuchMessage)
    }

    async fn delete(&mut self, number: usize) -> Result<(), MailboxError> {
        let mut state = self.state.lock().expect("lock poisoned");
        match state.messages.get_mut(number.wrapping_sub(1)) {
            Some((_, deleted)) if !*deleted => {
                *deleted = true;
                Ok(())
            }
            _ => Err(MailboxError::NoSuchMessage),
        }
    }

    async fn size(&self) -> Result<usize, MailboxError> {
        Ok(self
            .state
            .lock()
            .expect("lock poisoned")
            .messages
            .iter()
            .filter(|(_, deleted)| !deleted)
            .map(|(data, _)| data.len())
            .sum())
    }

    async fn uidl(&self, number: usize) -> Result<String, MailboxError> {
        self.state
            .lock()
            .expect("lock poisoned")
            .messages
            .get(number.wrapping_sub(1))
            .filter(|(_, deleted)| !deleted)
            .map(|_| format!("uid-{number}"))
            .ok_or(MailboxError::NoSuchMessage)
    }

    async fn commit_deletes(&mut self) -> Result<(), MailboxError> {
        let mut state = self.state.lock().expect("lock poisoned");
        state.messages.retain(|(_, deleted)| !deleted);
        state.committed = true;
        self.locked.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), MailboxError> {
        for (_, deleted) in &mut self.state.lock().expect("lock poisoned").messages {
            *deleted = false;
        }
        Ok(())
    }
}
