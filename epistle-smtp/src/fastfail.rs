//! Fast-fail policy hooks backed by DNS.

use std::sync::Arc;

use async_trait::async_trait;

use epistle_core::{
    address::Address,
    error::HandlerError,
    hook::HookResult,
    response::Dsn,
    session::Session,
};

use crate::{
    dns::DnsService,
    hooks::MailHook,
    status::Status,
};

/// Rejects MAIL FROM when the sender's domain has no mail exchangers.
///
/// A domain that resolves to an empty MX set earns a permanent `501
/// 5.1.7`; a resolver that cannot answer right now earns a temporary
/// `451` so the client retries later. The null reverse-path is always
/// let through.
pub struct ValidSenderDomain {
    dns: Arc<dyn DnsService>,
}

impl ValidSenderDomain {
    #[must_use]
    pub fn new(dns: Arc<dyn DnsService>) -> Self {
        Self { dns }
    }
}

#[async_trait]
impl MailHook for ValidSenderDomain {
    async fn on_mail(
        &self,
        _session: &mut Session,
        sender: Option<&Address>,
    ) -> Result<HookResult, HandlerError> {
        let Some(domain) = sender.and_then(Address::domain) else {
            return Ok(HookResult::declined());
        };

        match self.dns.find_mx_records(domain).await {
            Ok(records) if records.is_empty() => Ok(HookResult::deny()
                .with_status(Status::SyntaxError.into())
                .with_dsn(Dsn::new(5, 1, 7))
                .with_message(format!("sender domain {domain} has no valid MX records"))),
            Ok(_) => Ok(HookResult::declined()),
            Err(err) if err.is_temporary() => Ok(HookResult::deny_soft()
                .with_dsn(Dsn::new(4, 4, 3))
                .with_message(format!("temporary failure resolving {domain}"))),
            Err(_) => Ok(HookResult::deny()
                .with_status(Status::SyntaxError.into())
                .with_dsn(Dsn::new(5, 1, 7))
                .with_message(format!("sender domain {domain} does not resolve"))),
        }
    }
}
