//! One accept loop per bound address.

use std::net::SocketAddr;

use futures_util::future::join_all;
use tokio::net::{TcpListener, TcpSocket};

use crate::{
    Signal,
    config::ServerConfig,
    error::ServerError,
    internal, tracing,
    transport::driver::{self, SessionContext},
};

/// Bind a listening socket with reuse-address and the configured backlog.
pub(crate) fn bind_socket(addr: SocketAddr, backlog: u32) -> Result<TcpListener, ServerError> {
    let bind = || -> std::io::Result<TcpListener> {
        let socket = match addr {
            SocketAddr::V4(_) => TcpSocket::new_v4()?,
            SocketAddr::V6(_) => TcpSocket::new_v6()?,
        };

        socket.set_reuseaddr(true)?;
        socket.bind(addr)?;
        socket.listen(backlog)
    };

    bind().map_err(|source| ServerError::BindFailed {
        address: addr.to_string(),
        source,
    })
}

/// Accept connections until a shutdown signal arrives, then drain the
/// sessions spawned from this listener.
pub(crate) async fn serve(
    listener: TcpListener,
    ctx: SessionContext,
    config: ServerConfig,
    shutdown: tokio::sync::broadcast::Sender<Signal>,
) {
    let local = match listener.local_addr() {
        Ok(local) => local,
        Err(err) => {
            internal!(level = ERROR, "Listener has no local address: {err}");
            return;
        }
    };

    internal!("Serving {} on {local}", ctx.dialect.name());

    let mut sessions = Vec::default();
    let mut signal = shutdown.subscribe();

    loop {
        tokio::select! {
            // A closed channel means the server is gone, which is as
            // final as an explicit shutdown.
            _ = signal.recv() => {
                internal!(
                    level = INFO,
                    "{} listener {local} received shutdown signal, finishing sessions ...",
                    ctx.dialect.name()
                );
                join_all(sessions).await;
                break;
            }

            connection = listener.accept() => {
                let (stream, peer) = match connection {
                    Ok(accepted) => accepted,
                    Err(err) => {
                        internal!(level = ERROR, "Accept failed on {local}: {err}");
                        continue;
                    }
                };

                tracing::debug!("Connection received on {local} from {peer}");

                if let Err(err) = stream.set_nodelay(true) {
                    internal!(level = ERROR, "Failed to set TCP_NODELAY for {peer}: {err}");
                }

                let ctx = ctx.clone();
                let config = config.clone();
                let signal = shutdown.subscribe();
                sessions.push(tokio::spawn(async move {
                    if let Err(err) = driver::serve(stream, peer, local, ctx, config, signal).await {
                        internal!(level = ERROR, "Error: {err}");
                    }
                }));
            }
        }
    }
}
