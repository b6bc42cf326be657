//! NETCONF over TLS (RFC 7589).
//!
//! [`TlsDialer`] opens a TCP connection and runs the TLS client handshake,
//! both bounded by the context deadline when one is set. [`TlsConnDialer`]
//! hands out a connection the caller already established and takes it back
//! untouched on close.

use std::sync::Arc;
use std::time::Instant;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_rustls::TlsStream;

use crate::context::DialContext;
use crate::error::{NetconfError, Origin, Result};
use crate::handshake::TlsHandshake;
use crate::transport::{ConnDialer, Dialer, connect_tcp};

/// A TLS connection over TCP, in either role.
pub type TlsConn = TlsStream<TcpStream>;

/// The host part of `host:port`, without IPv6 brackets.
pub(crate) fn host_of(target: &str) -> &str {
    let host = match target.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => host,
        _ => target,
    };
    host.trim_start_matches('[').trim_end_matches(']')
}

/// Dials a fresh TLS connection per transport.
#[derive(Debug, Clone)]
pub struct TlsDialer {
    target: String,
    config: Arc<rustls::ClientConfig>,
    server_name: Option<String>,
}

impl TlsDialer {
    /// Create a dialer for `target` (`host:port`).
    ///
    /// The server certificate is verified against the host part of `target`
    /// unless [`with_server_name`](Self::with_server_name) overrides it.
    pub fn new(target: impl Into<String>, config: Arc<rustls::ClientConfig>) -> Self {
        Self {
            target: target.into(),
            config,
            server_name: None,
        }
    }

    /// Verify the server certificate against `name` instead of the target host.
    #[must_use]
    pub fn with_server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = Some(name.into());
        self
    }

    /// The name the server certificate is verified against.
    #[must_use]
    pub fn server_name(&self) -> &str {
        self.server_name
            .as_deref()
            .unwrap_or_else(|| host_of(&self.target))
    }

    async fn establish(&self, ctx: &DialContext) -> Result<TlsConn> {
        let step = TlsHandshake::initiator(Arc::clone(&self.config), self.server_name())?;
        let tcp = connect_tcp(
            TcpStream::connect(&self.target),
            ctx,
            Origin::Transport,
            &self.target,
        )
        .await?;
        step.perform(tcp, ctx.deadline(), Origin::Transport, &self.target)
            .await
    }
}

impl Dialer for TlsDialer {
    type Stream = TlsConn;

    async fn dial(&self, ctx: &DialContext) -> Result<TlsConn> {
        let trace = ctx.client_trace();
        trace.dial_start(&self.target);
        let started = Instant::now();
        let result = self.establish(ctx).await;
        trace.dial_done(&self.target, result.as_ref().err(), started.elapsed());
        if result.is_ok() {
            tracing::debug!(target = %self.target, "TLS connection established");
        }
        result
    }

    async fn close(&self, mut stream: TlsConn) -> Result<()> {
        NetconfError::with_io_context(
            stream.shutdown().await,
            format!("closing TLS connection to {}", self.target),
        )
    }

    fn target(&self) -> String {
        self.target.clone()
    }
}

/// Wraps a TLS connection the caller already established.
pub type TlsConnDialer = ConnDialer<TlsConn>;

impl ConnDialer<TlsConn> {
    /// Wrap an established TLS connection, naming it by its peer address.
    pub fn from_tls(conn: TlsConn) -> Result<Self> {
        let peer = conn.get_ref().0.peer_addr()?;
        Ok(Self::new(conn, peer.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_of_strips_port_and_brackets() {
        assert_eq!(host_of("router.example.net:6513"), "router.example.net");
        assert_eq!(host_of("[2001:db8::1]:6513"), "2001:db8::1");
        assert_eq!(host_of("localhost"), "localhost");
    }

    #[test]
    fn server_name_defaults_to_target_host() {
        let config = crate::tls_config::insecure_client_config().unwrap();
        let dialer = TlsDialer::new("10.1.1.1:4335", config);
        assert_eq!(dialer.server_name(), "10.1.1.1");
        let dialer = dialer.with_server_name("device.example.net");
        assert_eq!(dialer.server_name(), "device.example.net");
    }
}
