//! The DNS seam consumed by the fast-fail hooks.

use async_trait::async_trait;
use thiserror::Error;

/// Errors from MX resolution.
///
/// Temporary resolution failures must stay distinct from a domain that
/// definitively has no MX records: the former earns a 4xx reply, the
/// latter a 5xx.
#[derive(Debug, Error)]
pub enum DnsError {
    /// The resolver could not answer right now.
    #[error("Temporary DNS failure for {0}")]
    Temporary(String),

    /// The name is definitively bad.
    #[error("Permanent DNS failure for {0}")]
    Permanent(String),
}

impl DnsError {
    #[must_use]
    pub const fn is_temporary(&self) -> bool {
        matches!(self, Self::Temporary(_))
    }
}

/// Resolves the mail exchangers of a domain.
#[async_trait]
pub trait DnsService: Send + Sync {
    /// The MX host names of `domain`; an empty set means the domain
    /// cannot receive mail.
    async fn find_mx_records(&self, domain: &str) -> Result<Vec<String>, DnsError>;
}
