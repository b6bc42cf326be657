//! NETCONF subsystem channels as byte streams.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use russh::{Channel, ChannelId, ChannelMsg, ChannelStream, client};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};

use super::NETCONF_SUBSYSTEM;

/// The data pipe of an SSH channel.
///
/// The channel's stdin/stdout pipe is only materialized on first read or
/// write. These streams have a single owner, so the transition needs no
/// synchronization.
pub(crate) enum ChannelPipe<S>
where
    S: From<(ChannelId, ChannelMsg)> + Send + Sync + 'static,
{
    /// Channel negotiated, pipe not yet used.
    Unopened(Channel<S>),
    /// Pipe in use.
    Opened(Pin<Box<ChannelStream<S>>>),
    /// Pipe released.
    Closed,
}

impl<S> ChannelPipe<S>
where
    S: From<(ChannelId, ChannelMsg)> + Send + Sync + 'static,
{
    pub(crate) const fn new(channel: Channel<S>) -> Self {
        Self::Unopened(channel)
    }

    pub(crate) const fn is_opened(&self) -> bool {
        matches!(self, Self::Opened(_))
    }

    /// The pipe, opening it on first use.
    fn stream(&mut self) -> io::Result<Pin<&mut ChannelStream<S>>> {
        if matches!(self, Self::Unopened(_)) {
            if let Self::Unopened(channel) = std::mem::replace(self, Self::Closed) {
                *self = Self::Opened(Box::pin(channel.into_stream()));
            }
        }
        match self {
            Self::Opened(stream) => Ok(stream.as_mut()),
            _ => Err(io::Error::new(io::ErrorKind::NotConnected, "SSH channel closed")),
        }
    }

    /// Release the pipe, or the bare channel if the pipe was never opened.
    pub(crate) async fn close(&mut self) -> io::Result<()> {
        match std::mem::replace(self, Self::Closed) {
            Self::Unopened(channel) => channel.close().await.map_err(io::Error::other),
            Self::Opened(mut stream) => stream.shutdown().await,
            Self::Closed => Ok(()),
        }
    }

    pub(crate) fn poll_read(
        &mut self,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.stream() {
            Ok(stream) => stream.poll_read(cx, buf),
            Err(e) => Poll::Ready(Err(e)),
        }
    }

    pub(crate) fn poll_write(
        &mut self,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.stream() {
            Ok(stream) => stream.poll_write(cx, buf),
            Err(e) => Poll::Ready(Err(e)),
        }
    }

    pub(crate) fn poll_flush(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self {
            Self::Opened(stream) => stream.as_mut().poll_flush(cx),
            _ => Poll::Ready(Ok(())),
        }
    }

    pub(crate) fn poll_shutdown(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.stream() {
            Ok(stream) => stream.poll_shutdown(cx),
            Err(_) => Poll::Ready(Ok(())),
        }
    }
}

/// Request the netconf subsystem and wait for the peer's answer.
///
/// Returns the refusal reason on failure; the caller owns cleanup.
pub(crate) async fn request_netconf<S>(channel: &mut Channel<S>) -> Result<(), String>
where
    S: From<(ChannelId, ChannelMsg)> + Send + Sync + 'static,
{
    channel
        .request_subsystem(true, NETCONF_SUBSYSTEM)
        .await
        .map_err(|e| e.to_string())?;

    loop {
        match channel.wait().await {
            Some(ChannelMsg::Success) => return Ok(()),
            Some(ChannelMsg::Failure) => return Err("request rejected by peer".to_string()),
            Some(ChannelMsg::Eof | ChannelMsg::Close) | None => {
                return Err("channel closed before the request was answered".to_string());
            }
            Some(_) => {}
        }
    }
}

/// A NETCONF subsystem channel opened by the SSH initiator.
///
/// When the connection was opened by this crate the SSH client handle is
/// owned here and disconnected on [`close`](SshChannelConn::close). When it
/// wraps a caller's client, only the channel is released.
pub struct SshChannelConn<H: client::Handler> {
    pipe: ChannelPipe<client::Msg>,
    client: Option<client::Handle<H>>,
    target: String,
}

impl<H: client::Handler> std::fmt::Debug for SshChannelConn<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshChannelConn")
            .field("target", &self.target)
            .field("pipe_opened", &self.pipe.is_opened())
            .field("owns_client", &self.client.is_some())
            .finish()
    }
}

impl<H: client::Handler> SshChannelConn<H> {
    /// A channel whose client connection this stream owns.
    pub(crate) fn owned(
        channel: Channel<client::Msg>,
        client: client::Handle<H>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            pipe: ChannelPipe::new(channel),
            client: Some(client),
            target: target.into(),
        }
    }

    /// A channel on a client owned by someone else.
    pub(crate) fn borrowed(channel: Channel<client::Msg>, target: impl Into<String>) -> Self {
        Self {
            pipe: ChannelPipe::new(channel),
            client: None,
            target: target.into(),
        }
    }

    /// The peer address.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Whether closing this stream also disconnects the SSH client.
    #[must_use]
    pub const fn owns_client(&self) -> bool {
        self.client.is_some()
    }

    /// Release the channel, then the client if owned.
    ///
    /// Both steps always run; the first error is returned.
    pub async fn close(mut self) -> crate::Result<()> {
        let pipe = self.pipe.close().await.map_err(|e| {
            crate::NetconfError::io_context(format!("closing SSH channel to {}", self.target), e)
        });

        let client: crate::Result<()> = match self.client.take() {
            Some(client) => client
                .disconnect(russh::Disconnect::ByApplication, "", "en")
                .await
                .map_err(|e| {
                    crate::error::SshError::Channel {
                        reason: format!("disconnect from {} failed: {e}", self.target),
                    }
                    .into()
                }),
            None => Ok(()),
        };

        tracing::debug!(target = %self.target, "SSH channel closed");
        pipe.and(client)
    }
}

impl<H: client::Handler> AsyncRead for SshChannelConn<H> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        self.get_mut().pipe.poll_read(cx, buf)
    }
}

impl<H: client::Handler> AsyncWrite for SshChannelConn<H> {
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
