//! The built-in SMTP command handlers.

pub mod auth;
pub mod connect;
pub mod data;
pub mod helo;
pub mod mail;
pub mod misc;
pub mod rcpt;
pub mod starttls;

pub use auth::AuthHandler;
pub use connect::ServiceGreeting;
pub use data::DataHandler;
pub use helo::Capabilities;
pub use misc::{HelpHandler, NoopHandler, RsetHandler, UnknownHandler, VrfyHandler, quit_handler};
pub use starttls::StarttlsHandler;
