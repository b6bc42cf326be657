//! A plain TLS server for the device side of NETCONF over TLS.
//!
//! Each accepted connection is handshaken and served in its own task, so a
//! slow or failing peer never holds up the accept loop.

use std::net::SocketAddr;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::context::DialContext;
use crate::error::{NetconfError, Origin, Result};
use crate::handshake::TlsHandshake;
use crate::trace::TlsServerTrace;
use crate::transport::tls::TlsConn;

/// Serves one established TLS connection.
pub trait ConnectionHandler: Send + 'static {
    /// Run until the conversation ends. The server shuts the connection down
    /// afterwards.
    fn handle<'a>(self: Box<Self>, conn: &'a mut TlsConn) -> BoxFuture<'a, Result<()>>;
}

/// Produces a [`ConnectionHandler`] for every accepted peer.
pub trait HandlerFactory: Send + Sync + 'static {
    /// Create the handler for `peer`.
    fn new_handler(&self, peer: SocketAddr) -> Box<dyn ConnectionHandler>;
}

impl<F> HandlerFactory for F
where
    F: Fn(SocketAddr) -> Box<dyn ConnectionHandler> + Send + Sync + 'static,
{
    fn new_handler(&self, peer: SocketAddr) -> Box<dyn ConnectionHandler> {
        self(peer)
    }
}

/// A running TLS server.
///
/// Dropping the server, or calling [`close`](Self::close), stops accepting.
/// Connections already handed to a handler run to completion.
#[derive(Debug)]
pub struct TlsServer {
    local_addr: SocketAddr,
    accept_loop: JoinHandle<()>,
}

impl TlsServer {
    /// Bind `address:port` and start accepting.
    ///
    /// Port 0 picks a free port; see [`port`](Self::port).
    pub async fn bind(
        ctx: &DialContext,
        address: &str,
        port: u16,
        config: Arc<rustls::ServerConfig>,
        factory: Arc<dyn HandlerFactory>,
    ) -> Result<Self> {
        let trace = Arc::clone(ctx.server_trace());
        let listen_address = crate::callhome::client::listen_address(address, port);

        let listener = match TcpListener::bind(&listen_address).await {
            Ok(listener) => listener,
            Err(source) => {
                let err = NetconfError::Listen {
                    origin: Origin::Server,
                    address: listen_address,
                    source,
                };
                trace.listened(address, Some(&err));
                return Err(err);
            }
        };
        let local_addr = listener.local_addr()?;
        trace.listened(address, None);

        let accept_loop = tokio::spawn(accept_loop(listener, config, factory, trace));
        Ok(Self {
            local_addr,
            accept_loop,
        })
    }

    /// The bound address.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The bound port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Stop accepting and release the listening socket.
    pub fn close(self) {
        tracing::debug!(address = %self.local_addr, "TLS server closed");
    }
}

impl Drop for TlsServer {
    fn drop(&mut self) {
        self.accept_loop.abort();
    }
}

async fn accept_loop(
    listener: TcpListener,
    config: Arc<rustls::ServerConfig>,
    factory: Arc<dyn HandlerFactory>,
    trace: Arc<TlsServerTrace>,
) {
    trace.start_accepting();
    loop {
        let (tcp, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(source) => {
                let err = NetconfError::Accept {
                    origin: Origin::Server,
                    source,
                };
                trace.accepted(None, Some(&err));
                tracing::error!(error = %err, "TLS server accept loop stopped");
                return;
            }
        };
        trace.accepted(Some(peer), None);

        let config = Arc::clone(&config);
        let factory = Arc::clone(&factory);
        let trace = Arc::clone(&trace);
        tokio::spawn(async move {
            let target = peer.to_string();
            let mut conn = match TlsHandshake::responder(config)
                .perform(tcp, None, Origin::Server, &target)
                .await
            {
                Ok(conn) => {
                    trace.tls_handshake(peer, None);
                    conn
                }
                Err(err) => {
                    trace.tls_handshake(peer, Some(&err));
                    return;
                }
            };

            let result = factory.new_handler(peer).handle(&mut conn).await;
            if let Err(e) = conn.shutdown().await {
                tracing::debug!(peer = %peer, error = %e, "TLS shutdown failed");
            }
            trace.connection_closed(peer, result.as_ref().err());
        });
    }
}
