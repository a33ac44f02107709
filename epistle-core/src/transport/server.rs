//! The bind/unbind surface an embedder drives.

use std::net::SocketAddr;

use tokio::task::JoinHandle;

use crate::{
    Signal,
    config::ServerConfig,
    error::ServerError,
    internal,
    transport::{driver::SessionContext, listener},
};

/// Owns the listening sockets and the shutdown broadcast.
///
/// Configuration is mutable until [`Server::bind`]; afterwards the setters
/// reject changes. [`Server::unbind`] stops accepting, signals every live
/// session, and drains the listeners; it is idempotent.
pub struct Server {
    config: ServerConfig,
    shutdown: tokio::sync::broadcast::Sender<Signal>,
    listeners: Vec<JoinHandle<()>>,
}

impl Server {
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        let (shutdown, _) = tokio::sync::broadcast::channel(1);

        Self {
            config,
            shutdown,
            listeners: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_bound(&self) -> bool {
        !self.listeners.is_empty()
    }

    pub fn set_io_workers(&mut self, workers: usize) -> Result<(), ServerError> {
        self.configure(|config| config.io_workers = workers)
    }

    pub fn set_timeout(&mut self, seconds: u64) -> Result<(), ServerError> {
        self.configure(|config| config.timeout_secs = seconds)
    }

    pub fn set_backlog(&mut self, backlog: u32) -> Result<(), ServerError> {
        self.configure(|config| config.backlog = backlog)
    }

    pub fn set_max_line_length(&mut self, length: usize) -> Result<(), ServerError> {
        self.configure(|config| config.max_line_length = length)
    }

    fn configure(&mut self, apply: impl FnOnce(&mut ServerConfig)) -> Result<(), ServerError> {
        if self.is_bound() {
            return Err(ServerError::AlreadyBound);
        }

        apply(&mut self.config);
        Ok(())
    }

    /// Bind every address and start accepting.
    ///
    /// Fails if already bound, if no address was provided, or if any
    /// socket cannot be bound; on partial failure nothing is left
    /// listening.
    pub fn bind(
        &mut self,
        addresses: &[SocketAddr],
        ctx: &SessionContext,
    ) -> Result<(), ServerError> {
        if self.is_bound() {
            return Err(ServerError::AlreadyBound);
        }

        if addresses.is_empty() {
            return Err(ServerError::NoAddresses);
        }

        let mut sockets = Vec::with_capacity(addresses.len());
        for address in addresses {
            sockets.push(listener::bind_socket(*address, self.config.backlog)?);
        }

        for socket in sockets {
            self.listeners.push(tokio::spawn(listener::serve(
                socket,
                ctx.clone(),
                self.config.clone(),
                self.shutdown.clone(),
            )));
        }

        Ok(())
    }

    /// Stop accepting, close all live connections, and drain the
    /// listeners.
    pub async fn unbind(&mut self) {
        if self.listeners.is_empty() {
            return;
        }

        internal!(level = INFO, "Unbinding ...");

        // Nobody listening means every session already finished.
        drop(self.shutdown.send(Signal::Shutdown));

        for listener in self.listeners.drain(..) {
            if let Err(err) = listener.await {
                internal!(level = ERROR, "Listener task failed: {err}");
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::Server;
    use crate::{
        chain::ChainBuilder,
        config::{ServerConfig, ServerPolicy},
        dialect::Dialect,
        error::{HandlerError, ServerError},
        handler::{CommandHandler, Request},
        response::Response,
        session::{Session, state::StateKey},
        transport::driver::SessionContext,
    };

    struct StubDialect;

    impl Dialect for StubDialect {
        fn name(&self) -> &'static str {
            "STUB"
        }

        fn carry_over(&self) -> &'static [StateKey] {
            &[]
        }

        fn timeout_response(&self) -> Response {
            Response::smtp(421, "Timeout").closing()
        }

        fn line_too_long_response(&self) -> Response {
            Response::smtp(500, "Line too long").closing()
        }

        fn fault_response(&self) -> Response {
            Response::smtp(451, "Aborted")
        }

        fn shutdown_response(&self) -> Response {
            Response::smtp(421, "Shutting down").closing()
        }
    }

    struct Unknown;

    #[async_trait]
    impl CommandHandler for Unknown {
        fn verbs(&self) -> &[&'static str] {
            &[]
        }

        async fn on_command(
            &self,
            _session: &mut Session,
            _request: &Request,
        ) -> Result<Response, HandlerError> {
            Ok(Response::smtp(500, "Unrecognized"))
        }
    }

    fn context() -> SessionContext {
        SessionContext {
            chain: Arc::new(ChainBuilder::new().unknown(Unknown).wire().unwrap()),
            dialect: Arc::new(StubDialect),
            policy: Arc::new(ServerPolicy::default()),
            tls: None,
        }
    }

    #[tokio::test]
    async fn configuration_is_mutable_until_bound() {
        let mut server = Server::new(ServerConfig::default());
        assert!(server.set_timeout(60).is_ok());
        assert!(server.set_backlog(16).is_ok());
        assert!(!server.is_bound());

        server
            .bind(&["127.0.0.1:0".parse().unwrap()], &context())
            .unwrap();
        assert!(server.is_bound());
        assert!(matches!(
            server.set_timeout(60),
            Err(ServerError::AlreadyBound)
        ));
        assert!(matches!(
            server.set_io_workers(4),
            Err(ServerError::AlreadyBound)
        ));

        server.unbind().await;
    }

    #[tokio::test]
    async fn bind_rejects_an_empty_address_list() {
        let mut server = Server::new(ServerConfig::default());
        assert!(matches!(
            server.bind(&[], &context()),
            Err(ServerError::NoAddresses)
        ));
    }

    #[tokio::test]
    async fn bind_is_one_shot() {
        let mut server = Server::new(ServerConfig::default());
        let addresses = ["127.0.0.1:0".parse().unwrap()];

        server.bind(&addresses, &context()).unwrap();
        assert!(matches!(
            server.bind(&addresses, &context()),
            Err(ServerError::AlreadyBound)
        ));

        server.unbind().await;
    }

    #[tokio::test]
    async fn unbind_is_idempotent() {
        let mut server = Server::new(ServerConfig::default());
        server.unbind().await;

        server
            .bind(&["127.0.0.1:0".parse().unwrap()], &context())
            .unwrap();
        server.unbind().await;
        assert!(!server.is_bound());
        server.unbind().await;
    }
}
