//! The per-recipient delivery hook.

use async_trait::async_trait;

use epistle_core::{address::Address, error::HandlerError, hook::HookResult, session::Session};
use epistle_smtp::hooks::Message;

/// Delivers one message to one recipient.
///
/// LMTP answers the end-of-data terminator with one reply per recipient,
/// so delivery is consulted recipient by recipient, in RCPT order. At
/// least one provider must be registered or wiring fails: an LMTP server
/// that cannot deliver anywhere is a misconfiguration.
#[async_trait]
pub trait DeliveryHook: Send + Sync {
    async fn deliver(
        &self,
        session: &mut Session,
        recipient: &Address,
        message: &Message,
    ) -> Result<HookResult, HandlerError>;
}
