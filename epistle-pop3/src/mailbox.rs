//! The maildrop seam.
//!
//! The POP3 handlers never touch storage themselves; an authenticated
//! session holds one locked [`Mailbox`] obtained from the embedder's
//! [`MailboxFactory`], and every maildrop command delegates to it.
//! Message numbers are the 1-based numbers of the session snapshot, per
//! RFC 1939; numbers of deleted messages stay assigned and invalid until
//! the update step.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

/// One scan-listing entry: message number and exact size in octets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageInfo {
    pub number: usize,
    pub size: usize,
}

/// Errors from maildrop operations.
#[derive(Debug, Error)]
pub enum MailboxError {
    /// The message number is unassigned or refers to a deleted message.
    #[error("no such message")]
    NoSuchMessage,

    /// Another session holds the maildrop lock.
    #[error("maildrop already locked")]
    Locked,

    /// The backend could not answer right now.
    #[error("mailbox temporarily unavailable: {0}")]
    Temporary(String),

    /// The backend definitively failed.
    #[error("mailbox error: {0}")]
    Failed(String),
}

impl MailboxError {
    #[must_use]
    pub const fn is_temporary(&self) -> bool {
        matches!(self, Self::Temporary(_))
    }
}

/// A locked maildrop.
#[async_trait]
pub trait Mailbox: Send + Sync {
    /// Scan listing of the undeleted messages.
    async fn list(&self) -> Result<Vec<MessageInfo>, MailboxError>;

    /// The full content of one message.
    async fn retrieve(&self, number: usize) -> Result<Arc<[u8]>, MailboxError>;

    /// Mark one message as deleted; takes effect at [`Mailbox::commit_deletes`].
    async fn delete(&mut self, number: usize) -> Result<(), MailboxError>;

    /// Total size in octets of the undeleted messages.
    async fn size(&self) -> Result<usize, MailboxError>;

    /// The unique-id of one message.
    async fn uidl(&self, number: usize) -> Result<String, MailboxError>;

    /// Apply the pending deletes and release the lock (the update step).
    async fn commit_deletes(&mut self) -> Result<(), MailboxError>;

    /// Unmark every deleted message.
    async fn rollback(&mut self) -> Result<(), MailboxError>;
}

/// Yields a locked [`Mailbox`] for an authenticated user.
#[async_trait]
pub trait MailboxFactory: Send + Sync {
    async fn open(&self, user: &str) -> Result<Box<dyn Mailbox>, MailboxError>;
}
