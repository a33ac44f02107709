//! Backend seams consumed by the core.
//!
//! Authentication is shared by SMTP AUTH and POP3 PASS, so its seam lives
//! here; DNS and mailbox seams live with the protocol that consumes them.

use async_trait::async_trait;

use crate::error::BackendError;

/// Verifies a user's credential against some external store.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// `Ok(Some(identity))` on success, `Ok(None)` when the credential is
    /// wrong, `Err` when the backend itself failed.
    async fn authenticate(
        &self,
        user: &str,
        credential: &str,
    ) -> Result<Option<String>, BackendError>;
}
