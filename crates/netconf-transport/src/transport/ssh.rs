//! NETCONF over SSH.
//!
//! Two dialers are provided:
//!
//! - [`SshDialer`] opens a fresh TCP connection, runs the SSH client
//!   handshake, opens a session channel and requests the `netconf`
//!   subsystem. Closing the stream disconnects the SSH client.
//! - [`SshClientDialer`] opens the channel on an SSH client the caller
//!   already holds. Closing the stream releases only the channel.
//!
//! The SSH handshake itself does not observe the context deadline.

pub mod auth;
mod channel;

use std::sync::Arc;
use std::time::Instant;

use russh::{Channel, client};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

pub use auth::{
    AuthMethod, ClientHandler, HostKeyVerification, SshClientConfig, SshCredentials,
    load_private_key,
};
pub use channel::SshChannelConn;
pub(crate) use channel::{ChannelPipe, request_netconf};

use crate::context::DialContext;
use crate::error::{NetconfError, Origin, Result, SshError};
use crate::handshake::HandshakeRole;
use crate::transport::Dialer;

/// The SSH subsystem name NETCONF runs under.
pub const NETCONF_SUBSYSTEM: &str = "netconf";

/// Run the SSH client handshake over an established stream and authenticate.
///
/// Used both for outbound dials and for Call Home, where the TCP connection
/// was accepted rather than opened.
pub(crate) async fn initiate<S>(
    stream: S,
    config: &SshClientConfig,
    handler: ClientHandler,
    target: &str,
    origin: Origin,
) -> Result<client::Handle<ClientHandler>>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let mut handle = client::connect_stream(Arc::clone(&config.russh), stream, handler)
        .await
        .map_err(|source| SshError::Handshake {
            origin,
            role: HandshakeRole::Initiator,
            target: target.to_string(),
            source,
        })?;

    if let Err(e) = auth::authenticate(&mut handle, &config.credentials).await {
        let _ = handle
            .disconnect(russh::Disconnect::ByApplication, "", "en")
            .await;
        return Err(e);
    }
    Ok(handle)
}

/// Open a session channel on `handle` and request the netconf subsystem.
///
/// A channel that was opened but refused the subsystem is closed before
/// returning. The client connection is left to the caller.
pub(crate) async fn open_netconf_channel<H: client::Handler>(
    handle: &client::Handle<H>,
    target: &str,
    origin: Origin,
) -> Result<Channel<client::Msg>> {
    let mut channel = handle
        .channel_open_session()
        .await
        .map_err(|source| SshError::Session {
            origin,
            target: target.to_string(),
            source,
        })?;

    if let Err(reason) = request_netconf(&mut channel).await {
        let _ = channel.close().await;
        return Err(SshError::Subsystem {
            origin,
            target: target.to_string(),
            reason,
        }
        .into());
    }

    tracing::debug!(target = %target, "netconf subsystem established");
    Ok(channel)
}

/// Dials a fresh SSH connection per transport.
#[derive(Debug, Clone)]
pub struct SshDialer {
    target: String,
    config: Arc<SshClientConfig>,
}

impl SshDialer {
    /// Create a dialer for `target` (`host:port`).
    pub fn new(target: impl Into<String>, config: impl Into<Arc<SshClientConfig>>) -> Self {
        Self {
            target: target.into(),
            config: config.into(),
        }
    }

    /// The client configuration.
    #[must_use]
    pub fn config(&self) -> &SshClientConfig {
        &self.config
    }

    async fn establish(&self) -> Result<SshChannelConn<ClientHandler>> {
        let tcp = TcpStream::connect(&self.target)
            .await
            .map_err(|source| NetconfError::Dial {
                origin: Origin::Transport,
                target: self.target.clone(),
                source,
            })?;
        if let Err(e) = tcp.set_nodelay(true) {
            tracing::debug!(target = %self.target, error = %e, "Failed to set TCP_NODELAY");
        }

        let handler =
            ClientHandler::for_target(self.config.host_key_verification.clone(), &self.target);
        let handle = initiate(tcp, &self.config, handler, &self.target, Origin::Transport).await?;

        match open_netconf_channel(&handle, &self.target, Origin::Transport).await {
            Ok(channel) => Ok(SshChannelConn::owned(channel, handle, self.target.clone())),
            Err(e) => {
                let _ = handle
                    .disconnect(russh::Disconnect::ByApplication, "", "en")
                    .await;
                Err(e)
            }
        }
    }
}

impl Dialer for SshDialer {
    type Stream = SshChannelConn<ClientHandler>;

    async fn dial(&self, ctx: &DialContext) -> Result<Self::Stream> {
        let trace = ctx.client_trace();
        trace.dial_start(&self.target);
        let started = Instant::now();
        let result = self.establish().await;
        trace.dial_done(&self.target, result.as_ref().err(), started.elapsed());
        result
    }

    async fn close(&self, stream: Self::Stream) -> Result<()> {
        stream.close().await
    }

    fn target(&self) -> String {
        self.target.clone()
    }
}

/// Opens NETCONF channels on an SSH client owned by the caller.
///
/// The client is never disconnected by this dialer, so it can carry several
/// sessions in turn. No dial events are emitted since nothing is dialed.
pub struct SshClientDialer<H: client::Handler> {
    handle: Arc<client::Handle<H>>,
    target: String,
}

impl<H: client::Handler> std::fmt::Debug for SshClientDialer<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshClientDialer")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

impl<H: client::Handler> SshClientDialer<H> {
    /// Wrap an existing client connected to `target`.
    pub fn new(handle: Arc<client::Handle<H>>, target: impl Into<String>) -> Self {
        Self {
            handle,
            target: target.into(),
        }
    }

    /// The wrapped client.
    #[must_use]
    pub fn handle(&self) -> &Arc<client::Handle<H>> {
        &self.handle
    }
}

impl<H: client::Handler + 'static> Dialer for SshClientDialer<H> {
    type Stream = SshChannelConn<H>;

    async fn dial(&self, _ctx: &DialContext) -> Result<Self::Stream> {
        let channel = open_netconf_channel(&self.handle, &self.target, Origin::Transport).await?;
        Ok(SshChannelConn::borrowed(channel, self.target.clone()))
    }

    async fn close(&self, stream: Self::Stream) -> Result<()> {
        stream.close().await
    }

    fn target(&self) -> String {
        self.target.clone()
    }
}
