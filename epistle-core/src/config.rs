//! Server configuration and the policy seam.
//!
//! [`Policy`] is the trait handlers consult for site decisions; embedders
//! can implement it directly or deserialize a [`ServerPolicy`].
//! [`ServerConfig`] holds the transport knobs; both follow the same
//! serde-defaulted shape, with the defaults collected in one module.

use std::net::IpAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Site policy consulted by protocol handlers.
pub trait Policy: Send + Sync {
    /// The name this server announces in greetings and HELO replies.
    fn hello_name(&self) -> &str;

    /// Free text appended to the service greeting.
    fn greeting(&self) -> &str;

    /// Maximum accepted message size in bytes; 0 means unlimited.
    fn max_message_size(&self) -> usize;

    /// Whether this peer may relay to non-local recipients.
    fn is_relaying_allowed(&self, remote: IpAddr) -> bool;

    /// Whether this peer must authenticate before starting a transaction.
    fn is_auth_required(&self, remote: IpAddr) -> bool;

    /// Whether envelope addresses must be enclosed in angle brackets.
    fn enforce_address_brackets(&self) -> bool;

    /// Whether MAIL is rejected before a successful HELO/EHLO.
    fn enforce_helo_ehlo(&self) -> bool;
}

/// A file-backed [`Policy`].
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ServerPolicy {
    #[serde(default = "defaults::hello_name")]
    pub hello_name: String,

    #[serde(default = "defaults::greeting")]
    pub greeting: String,

    /// Maximum message size in bytes; 0 disables the limit.
    #[serde(default = "defaults::max_message_size")]
    pub max_message_size: usize,

    /// Relay for any peer. Loopback peers may always relay.
    #[serde(default)]
    pub allow_relay: bool,

    /// Require authentication from non-loopback peers.
    #[serde(default)]
    pub require_auth: bool,

    #[serde(default = "defaults::enabled")]
    pub enforce_address_brackets: bool,

    #[serde(default = "defaults::enabled")]
    pub enforce_helo_ehlo: bool,
}

impl Default for ServerPolicy {
    fn default() -> Self {
        Self {
            hello_name: defaults::hello_name(),
            greeting: defaults::greeting(),
            max_message_size: defaults::max_message_size(),
            allow_relay: false,
            require_auth: false,
            enforce_address_brackets: defaults::enabled(),
            enforce_helo_ehlo: defaults::enabled(),
        }
    }
}

impl Policy for ServerPolicy {
    fn hello_name(&self) -> &str {
        &self.hello_name
    }

    fn greeting(&self) -> &str {
        &self.greeting
    }

    fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    fn is_relaying_allowed(&self, remote: IpAddr) -> bool {
        self.allow_relay || remote.is_loopback()
    }

    fn is_auth_required(&self, remote: IpAddr) -> bool {
        self.require_auth && !remote.is_loopback()
    }

    fn enforce_address_brackets(&self) -> bool {
        self.enforce_address_brackets
    }

    fn enforce_helo_ehlo(&self) -> bool {
        self.enforce_helo_ehlo
    }
}

/// Transport configuration.
///
/// All knobs are fixed once [`crate::transport::Server::bind`] has been
/// called; the setters on `Server` reject mutation after that point.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ServerConfig {
    /// I/O worker threads the embedder should give the runtime.
    #[serde(default = "defaults::io_workers")]
    pub io_workers: usize,

    /// Idle timeout per connection, refreshed on every complete read.
    #[serde(default = "defaults::timeout_secs")]
    pub timeout_secs: u64,

    /// Listen backlog applied to every bound socket.
    #[serde(default = "defaults::backlog")]
    pub backlog: u32,

    /// Maximum command line length; message-body modes are exempt.
    #[serde(default = "defaults::max_line_length")]
    pub max_line_length: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            io_workers: defaults::io_workers(),
            timeout_secs: defaults::timeout_secs(),
            backlog: defaults::backlog(),
            max_line_length: defaults::max_line_length(),
        }
    }
}

impl ServerConfig {
    #[must_use]
    pub const fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Default configuration values.
mod defaults {
    pub fn hello_name() -> String {
        std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string())
    }

    pub fn greeting() -> String {
        "Service ready".to_string()
    }

    pub const fn max_message_size() -> usize {
        26_214_400 // 25 MiB
    }

    pub const fn enabled() -> bool {
        true
    }

    pub fn io_workers() -> usize {
        std::thread::available_parallelism().map_or(2, |n| n.get() * 2)
    }

    pub const fn timeout_secs() -> u64 {
        300 // 5 minutes per RFC 5321
    }

    pub const fn backlog() -> u32 {
        250
    }

    pub const fn max_line_length() -> usize {
        16 * 1024
    }
}
