//! Error types shared across the epistle core.
//!
//! Each concern gets its own typed enum so embedders can match on the
//! failure class: transport faults close connections, handler faults are
//! converted into protocol responses, and wiring faults prevent bind.

use std::io;

use thiserror::Error;

/// Errors that can occur while assembling a handler chain.
///
/// Any of these prevents the chain from being wired, and therefore the
/// server from binding.
#[derive(Debug, Error)]
pub enum WiringError {
    /// Two command handlers both declared the same verb.
    #[error("Duplicate handler registered for verb {0}")]
    DuplicateVerb(String),

    /// Every protocol must route unrecognised verbs somewhere.
    #[error("No handler registered for unknown commands")]
    MissingUnknownHandler,

    /// A handler requires a hook type for which no provider is registered.
    #[error("No {hook} provider registered for verb {verb}")]
    UnresolvedHook {
        verb: &'static str,
        hook: &'static str,
    },
}

/// Errors surfaced by command, connect, and line handlers.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// I/O failure while the handler drove the connection.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A backend collaborator (DNS, mailbox, authentication) failed.
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Anything else; converted into the protocol's generic failure reply.
    #[error("Handler error: {0}")]
    Other(String),
}

impl HandlerError {
    /// Transport-class faults close the connection without further output.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}

/// Errors from the backend seams the core consumes.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The backend may succeed if retried; maps to a temporary reply (4xx).
    #[error("Temporary backend failure: {0}")]
    Temporary(String),

    /// The backend definitively refused; maps to a permanent reply (5xx).
    #[error("Permanent backend failure: {0}")]
    Permanent(String),
}

impl BackendError {
    #[must_use]
    pub const fn is_temporary(&self) -> bool {
        matches!(self, Self::Temporary(_))
    }
}

/// Errors that can occur during connection operations.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// I/O error during connection operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A command line exceeded the configured maximum length.
    #[error("Line exceeded the configured maximum of {0} bytes")]
    LineTooLong(usize),

    /// Connection was closed by peer.
    #[error("Connection closed by peer")]
    Closed,
}

/// Errors that can occur during TLS operations.
#[derive(Debug, Error)]
pub enum TlsError {
    /// I/O error during TLS operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Failed to load the TLS certificate.
    #[error("Failed to load TLS certificate from {path}: {source}")]
    CertificateLoad {
        path: String,
        #[source]
        source: io::Error,
    },

    /// Failed to load the TLS private key.
    #[error("Failed to load TLS private key from {path}: {reason}")]
    KeyLoad { path: String, reason: String },

    /// Rustls library error.
    #[error("TLS error: {0}")]
    Rustls(String),
}

impl From<tokio_rustls::rustls::Error> for TlsError {
    fn from(err: tokio_rustls::rustls::Error) -> Self {
        Self::Rustls(err.to_string())
    }
}

/// Errors that can occur while a session is being driven.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Connection error occurred.
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// TLS upgrade failed.
    #[error("TLS upgrade failed: {0}")]
    Tls(#[from] TlsError),

    /// A handler raised a transport-class fault.
    #[error("Handler transport fault: {0}")]
    Handler(#[from] HandlerError),
}

/// Errors that can occur in the server and its listeners.
#[derive(Debug, Error)]
pub enum ServerError {
    /// `bind` was called twice, or configuration was mutated after bind.
    #[error("Server is already bound")]
    AlreadyBound,

    /// `bind` was called with an empty address list.
    #[error("No addresses provided to bind")]
    NoAddresses,

    /// Failed to bind a listening socket.
    #[error("Failed to bind listener to {address}: {source}")]
    BindFailed {
        address: String,
        #[source]
        source: io::Error,
    },
}

/// Specialized `Result` type for connection operations.
pub type ConnectionResult<T> = std::result::Result<T, ConnectionError>;

/// Specialized `Result` type for TLS operations.
pub type TlsResult<T> = std::result::Result<T, TlsError>;

#[cfg(test)]
mod test {
    use std::error::Error as StdError;

    use super::*;

    #[test]
    fn handler_error_classification() {
        let err = HandlerError::Io(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
        assert!(err.is_transport());

        let err = HandlerError::Other("boom".to_string());
        assert!(!err.is_transport());

        let err = HandlerError::Backend(BackendError::Temporary("dns".to_string()));
        assert!(!err.is_transport());
    }

    #[test]
    fn backend_error_classification() {
        assert!(BackendError::Temporary("later".to_string()).is_temporary());
        assert!(!BackendError::Permanent("never".to_string()).is_temporary());
    }

    #[test]
    fn wiring_error_display() {
        let err = WiringError::DuplicateVerb("MAIL".to_string());
        assert_eq!(err.to_string(), "Duplicate handler registered for verb MAIL");

        let err = WiringError::UnresolvedHook {
            verb: "DATA",
            hook: "DeliveryHook",
        };
        assert_eq!(
            err.to_string(),
            "No DeliveryHook provider registered for verb DATA"
        );
    }

    #[test]
    fn error_source_chain() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let bind_err = ServerError::BindFailed {
            address: "0.0.0.0:25".to_string(),
            source: io_err,
        };

        assert!(bind_err.source().is_some());
        assert_eq!(
            bind_err.to_string(),
            "Failed to bind listener to 0.0.0.0:25: access denied"
        );
    }
}
