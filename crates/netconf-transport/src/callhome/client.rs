//! Manager-side Call Home listeners.
//!
//! The manager listens, the device connects, and then the manager drives the
//! security handshake as SSH client or TLS client over the accepted
//! connection. A failed accept or handshake is returned to the caller and
//! leaves the listener usable.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};

use crate::context::DialContext;
use crate::error::{NetconfError, Origin, Result};
use crate::handshake::TlsHandshake;
use crate::trace::{CallHomeClientTrace, TlsInfo};
use crate::transport::ConnDialer;
use crate::transport::ssh::{self, ClientHandler, SshChannelConn, SshClientConfig};
use crate::transport::tls::TlsConn;

/// A NETCONF channel on a Call Home SSH connection, as seen by the manager.
pub type CallHomeSshConn = SshChannelConn<ClientHandler>;

/// Hands an accepted Call Home SSH connection to the session factory.
///
/// Accepted TLS connections use [`TlsConnDialer`](crate::transport::tls::TlsConnDialer).
pub type SshConnDialer = ConnDialer<CallHomeSshConn>;

/// Format `address` and `port` as a bindable socket address string.
pub(crate) fn listen_address(address: &str, port: u16) -> String {
    if address.contains(':') && !address.starts_with('[') {
        format!("[{address}]:{port}")
    } else {
        format!("{address}:{port}")
    }
}

/// The TCP half shared by both listeners.
#[derive(Debug)]
struct CallHomeSocket {
    listener: TcpListener,
    local_addr: SocketAddr,
    trace: Arc<CallHomeClientTrace>,
}

impl CallHomeSocket {
    async fn bind(ctx: &DialContext, address: &str, port: u16) -> Result<Self> {
        let address = listen_address(address, port);
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|source| NetconfError::Listen {
                origin: Origin::CallHome,
                address: address.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;

        let trace = Arc::clone(ctx.callhome_client_trace());
        trace.listen_start(local_addr);
        tracing::debug!(address = %local_addr, "Call Home listener bound");

        Ok(Self {
            listener,
            local_addr,
            trace,
        })
    }

    async fn accept(&self) -> Result<(TcpStream, SocketAddr)> {
        match self.listener.accept().await {
            Ok((stream, peer)) => {
                self.trace.accept_done(Some(peer), None);
                if let Err(e) = stream.set_nodelay(true) {
                    tracing::debug!(peer = %peer, error = %e, "Failed to set TCP_NODELAY");
                }
                Ok((stream, peer))
            }
            Err(source) => {
                let err = NetconfError::Accept {
                    origin: Origin::CallHome,
                    source,
                };
                self.trace.accept_done(None, Some(&err));
                Err(err)
            }
        }
    }
}

/// Listens for devices calling home over SSH.
#[derive(Debug)]
pub struct SshListener {
    socket: CallHomeSocket,
    config: Arc<SshClientConfig>,
    host_key_alias: Option<String>,
}

impl SshListener {
    /// Bind `address:port`. Port 0 picks a free port; see [`port`](Self::port).
    ///
    /// `config` is an SSH *client* configuration: the manager authenticates
    /// to the device even though the device connected.
    pub async fn bind(
        ctx: &DialContext,
        address: &str,
        port: u16,
        config: impl Into<Arc<SshClientConfig>>,
    ) -> Result<Self> {
        Ok(Self {
            socket: CallHomeSocket::bind(ctx, address, port).await?,
            config: config.into(),
            host_key_alias: None,
        })
    }

    /// Look device host keys up under `alias` instead of the peer address.
    #[must_use]
    pub fn with_host_key_alias(mut self, alias: impl Into<String>) -> Self {
        self.host_key_alias = Some(alias.into());
        self
    }

    /// Wait for a device, authenticate to it and open the netconf subsystem.
    ///
    /// The device host key is checked under the peer IP address, without the
    /// ephemeral source port, or under the alias if one is set.
    ///
    /// The SSH handshake does not observe the context deadline. Everything
    /// opened during a failed attempt is closed before the error is returned.
    pub async fn accept(&self, _ctx: &DialContext) -> Result<CallHomeSshConn> {
        let (tcp, peer) = self.socket.accept().await?;
        let target = peer.to_string();
        let trace = &self.socket.trace;

        let host = self
            .host_key_alias
            .clone()
            .unwrap_or_else(|| peer.ip().to_string());
        let handler = ClientHandler::for_host(self.config.host_key_verification.clone(), host);
        let handle = ssh::initiate(tcp, &self.config, handler, &target, Origin::CallHome).await?;
        trace.ssh_connected(&target, self.config.username());

        let channel = match ssh::open_netconf_channel(&handle, &target, Origin::CallHome).await {
            Ok(channel) => channel,
            Err(e) => {
                let _ = handle
                    .disconnect(russh::Disconnect::ByApplication, "", "en")
                    .await;
                return Err(e);
            }
        };
        trace.subsystem_ready(&target);

        Ok(SshChannelConn::owned(channel, handle, target))
    }

    /// The bound address.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.socket.local_addr
    }

    /// The bound port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.socket.local_addr.port()
    }

    /// Stop listening. Accepted connections are unaffected.
    pub fn close(self) {
        tracing::debug!(address = %self.socket.local_addr, "Call Home listener closed");
    }
}

/// Listens for devices calling home over TLS.
#[derive(Debug)]
pub struct TlsListener {
    socket: CallHomeSocket,
    config: Arc<rustls::ClientConfig>,
    server_name: Option<String>,
}

impl TlsListener {
    /// Bind `address:port`. Port 0 picks a free port; see [`port`](Self::port).
    ///
    /// `config` is a TLS *client* configuration: the manager starts the TLS
    /// handshake even though the device connected.
    pub async fn bind(
        ctx: &DialContext,
        address: &str,
        port: u16,
        config: Arc<rustls::ClientConfig>,
    ) -> Result<Self> {
        Ok(Self {
            socket: CallHomeSocket::bind(ctx, address, port).await?,
            config,
            server_name: None,
        })
    }

    /// Verify device certificates against `name` instead of the peer address.
    #[must_use]
    pub fn with_server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = Some(name.into());
        self
    }

    /// Wait for a device and run the TLS client handshake with it.
    ///
    /// The device certificate is verified against the configured server name,
    /// or the peer IP address when none is set. The context deadline, if any,
    /// bounds the handshake.
    pub async fn accept(&self, ctx: &DialContext) -> Result<TlsConn> {
        let (tcp, peer) = self.socket.accept().await?;
        let target = peer.to_string();

        let server_name = self
            .server_name
            .clone()
            .unwrap_or_else(|| peer.ip().to_string());
        let stream = TlsHandshake::initiator(Arc::clone(&self.config), &server_name)?
            .perform(tcp, ctx.deadline(), Origin::CallHome, &target)
            .await?;

        self.socket
            .trace
            .tls_connected(&target, &TlsInfo::from_state(stream.get_ref().1));
        Ok(stream)
    }

    /// The bound address.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.socket.local_addr
    }

    /// The bound port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.socket.local_addr.port()
    }

    /// Stop listening. Accepted connections are unaffected.
    pub fn close(self) {
        tracing::debug!(address = %self.socket.local_addr, "Call Home listener closed");
    }
}
