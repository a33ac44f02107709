//! The shared TCP transport: accept loops, line framing, idle timeouts,
//! and TLS upgrades.

pub mod connection;
pub mod driver;
mod listener;
pub mod server;

pub use connection::{Connection, TlsConfig, TlsInfo};
pub use driver::{SessionContext, serve};
pub use server::Server;
