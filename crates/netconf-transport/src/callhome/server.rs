//! Device-side Call Home dialers.
//!
//! The device opens the TCP connection to the manager and then answers the
//! manager's security handshake: it is the SSH server or TLS server even
//! though it dialed.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use futures::future::BoxFuture;
use russh::server;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

use super::responder::{self, SshServerConfig};
use crate::context::DialContext;
use crate::error::{NetconfError, Origin, Result};
use crate::handshake::TlsHandshake;
use crate::trace::TlsInfo;
use crate::transport::ssh::ChannelPipe;
use crate::transport::tls::TlsConn;
use crate::transport::{Dialer, connect_tcp};

/// Opens the outbound TCP connection to the manager.
///
/// Replace the default to dial through a proxy, apply rate limits or
/// resolve names differently.
pub trait TcpConnect: Send + Sync + std::fmt::Debug {
    /// Connect to `target` (`host:port`).
    fn connect<'a>(&'a self, target: &'a str) -> BoxFuture<'a, io::Result<TcpStream>>;
}

/// Plain [`TcpStream::connect`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioTcpConnect;

impl TcpConnect for TokioTcpConnect {
    fn connect<'a>(&'a self, target: &'a str) -> BoxFuture<'a, io::Result<TcpStream>> {
        Box::pin(TcpStream::connect(target))
    }
}

fn default_connector() -> Arc<dyn TcpConnect> {
    Arc::new(TokioTcpConnect)
}

/// A NETCONF channel served to a manager over a Call Home SSH connection.
///
/// Closing it releases the channel and ends the SSH session.
pub struct SshServerConn {
    pipe: ChannelPipe<server::Msg>,
    session: JoinHandle<std::result::Result<(), russh::Error>>,
    target: String,
}

impl std::fmt::Debug for SshServerConn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshServerConn")
            .field("target", &self.target)
            .field("pipe_opened", &self.pipe.is_opened())
            .finish_non_exhaustive()
    }
}

impl SshServerConn {
    /// The manager's address.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Release the channel, then end the SSH session.
    pub async fn close(mut self) -> Result<()> {
        let result = self.pipe.close().await;
        self.session.abort();
        tracing::debug!(target = %self.target, "Call Home SSH session closed");
        NetconfError::with_io_context(result, format!("closing SSH channel to {}", self.target))
    }
}

impl Drop for SshServerConn {
    fn drop(&mut self) {
        self.session.abort();
    }
}

impl AsyncRead for SshServerConn {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        self.get_mut().pipe.poll_read(cx, buf)
    }
}

impl AsyncWrite for SshServerConn {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.get_mut().pipe.poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.get_mut().pipe.poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.get_mut().pipe.poll_shutdown(cx)
    }
}

/// Calls a manager home over SSH.
///
/// The SSH handshake and the channel negotiation wait on the manager and do
/// not observe the context deadline; only the TCP connect does.
#[derive(Debug, Clone)]
pub struct SshCallHomeDialer {
    target: String,
    config: SshServerConfig,
    connector: Arc<dyn TcpConnect>,
}

impl SshCallHomeDialer {
    /// Dial `target` with the default TCP connector.
    pub fn new(target: impl Into<String>, config: SshServerConfig) -> Self {
        Self::with_options(target, config, default_connector())
    }

    /// Dial `target` through `connector`.
    pub fn with_options(
        target: impl Into<String>,
        config: SshServerConfig,
        connector: Arc<dyn TcpConnect>,
    ) -> Self {
        Self {
            target: target.into(),
            config,
            connector,
        }
    }

    async fn establish(&self, ctx: &DialContext) -> Result<SshServerConn> {
        let tcp = connect_tcp(
            self.connector.connect(&self.target),
            ctx,
            Origin::CallHome,
            &self.target,
        )
        .await?;

        let trace = ctx.callhome_server_trace();
        let negotiated = responder::respond(tcp, &self.config, &self.target, trace).await?;
        trace.subsystem_ready(&self.target);

        Ok(SshServerConn {
            pipe: ChannelPipe::new(negotiated.channel),
            session: negotiated.session,
            target: self.target.clone(),
        })
    }
}

impl Dialer for SshCallHomeDialer {
    type Stream = SshServerConn;

    async fn dial(&self, ctx: &DialContext) -> Result<SshServerConn> {
        let trace = ctx.callhome_server_trace();
        trace.dial_start(&self.target);
        let started = Instant::now();
        let result = self.establish(ctx).await;
        trace.dial_done(&self.target, result.as_ref().err(), started.elapsed());
        result
    }

    async fn close(&self, stream: SshServerConn) -> Result<()> {
        stream.close().await
    }

    fn target(&self) -> String {
        self.target.clone()
    }
}

/// Calls a manager home over TLS.
///
/// The TCP connect and the TLS server handshake are both bounded by the
/// context deadline.
#[derive(Debug, Clone)]
pub struct TlsCallHomeDialer {
    target: String,
    config: Arc<rustls::ServerConfig>,
    connector: Arc<dyn TcpConnect>,
}

impl TlsCallHomeDialer {
    /// Dial `target` with the default TCP connector.
    pub fn new(target: impl Into<String>, config: Arc<rustls::ServerConfig>) -> Self {
        Self::with_options(target, config, default_connector())
    }

    /// Dial `target` through `connector`.
    pub fn with_options(
        target: impl Into<String>,
        config: Arc<rustls::ServerConfig>,
        connector: Arc<dyn TcpConnect>,
    ) -> Self {
        Self {
            target: target.into(),
            config,
            connector,
        }
    }

    async fn establish(&self, ctx: &DialContext) -> Result<TlsConn> {
        let tcp = connect_tcp(
            self.connector.connect(&self.target),
            ctx,
            Origin::CallHome,
            &self.target,
        )
        .await?;

        let trace = ctx.callhome_server_trace();
        trace.accept_start(&self.target);
        let result = TlsHandshake::responder(Arc::clone(&self.config))
            .perform(tcp, ctx.deadline(), Origin::CallHome, &self.target)
            .await;
        trace.accept_done(&self.target, result.as_ref().err());

        let stream = result?;
        trace.tls_connected(&self.target, &TlsInfo::from_state(stream.get_ref().1));
        Ok(stream)
    }
}

impl Dialer for TlsCallHomeDialer {
    type Stream = TlsConn;

    async fn dial(&self, ctx: &DialContext) -> Result<TlsConn> {
        let trace = ctx.callhome_server_trace();
        trace.dial_start(&self.target);
        let started = Instant::now();
        let result = self.establish(ctx).await;
        trace.dial_done(&self.target, result.as_ref().err(), started.elapsed());
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
