//! The `Dialer` abstraction and the instrumented `Transport` built on it.
//!
//! A [`Dialer`] knows how to produce a duplex byte stream to one target and
//! how to release it afterwards. A [`Transport`] performs that dial exactly
//! once and reports every read, write and the final close to the context's
//! [`ClientTrace`]. The session layer only ever sees a `Transport`.
//!
//! Ownership is decided by the dialer. A dialer that opened the connection
//! itself shuts it down in [`Dialer::close`]; a dialer wrapping a
//! caller-owned connection hands it back instead and never closes it.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Instant;

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;

use crate::context::DialContext;
use crate::error::{NetconfError, Origin, Result};
use crate::trace::ClientTrace;

pub mod ssh;
pub mod tls;

/// Produces a duplex stream to a target and releases it afterwards.
pub trait Dialer: Send + Sync {
    /// The stream produced by [`Dialer::dial`].
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Open the stream. On error, everything opened during the attempt has
    /// already been released.
    fn dial(&self, ctx: &DialContext) -> impl Future<Output = Result<Self::Stream>> + Send;

    /// Release a stream produced by this dialer.
    fn close(&self, stream: Self::Stream) -> impl Future<Output = Result<()>> + Send;

    /// The remote endpoint, as `host:port`.
    fn target(&self) -> String;
}

impl<D: Dialer> Dialer for Arc<D> {
    type Stream = D::Stream;

    fn dial(&self, ctx: &DialContext) -> impl Future<Output = Result<Self::Stream>> + Send {
        (**self).dial(ctx)
    }

    fn close(&self, stream: Self::Stream) -> impl Future<Output = Result<()>> + Send {
        (**self).close(stream)
    }

    fn target(&self) -> String {
        (**self).target()
    }
}

/// Run a TCP connect, bounded by the context deadline when one is set.
pub(crate) async fn connect_tcp<F>(
    connect: F,
    ctx: &DialContext,
    origin: Origin,
    target: &str,
) -> Result<TcpStream>
where
    F: Future<Output = io::Result<TcpStream>>,
{
    let started = Instant::now();
    let result = match ctx.deadline() {
        Some(deadline) => deadline
            .apply(connect)
            .await
            .map_err(|_| NetconfError::Timeout {
                operation: format!("{origin}: connect to {target}"),
                duration: started.elapsed(),
            })?,
        None => connect.await,
    };
    let tcp = result.map_err(|source| NetconfError::Dial {
        origin,
        target: target.to_string(),
        source,
    })?;
    if let Err(e) = tcp.set_nodelay(true) {
        tracing::debug!(target = %target, error = %e, "Failed to set TCP_NODELAY");
    }
    Ok(tcp)
}

/// A dialer over a connection the caller already established.
///
/// `dial` hands the connection out once; `close` takes it back without
/// shutting it down. The caller recovers it with [`take`](Self::take) or
/// [`into_inner`](Self::into_inner) and stays responsible for closing it.
#[derive(Debug)]
pub struct ConnDialer<S> {
    conn: Mutex<Option<S>>,
    target: String,
}

impl<S> ConnDialer<S> {
    /// Wrap `conn`, connected to `target`.
    pub fn new(conn: S, target: impl Into<String>) -> Self {
        Self {
            conn: Mutex::new(Some(conn)),
            target: target.into(),
        }
    }

    /// Take the connection back, if it is not currently handed out.
    pub fn take(&self) -> Option<S> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner()).take()
    }

    /// Recover the connection, if it is not currently handed out.
    pub fn into_inner(self) -> Option<S> {
        self.conn.into_inner().unwrap_or_else(|e| e.into_inner())
    }
}

impl<S> Dialer for ConnDialer<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    type Stream = S;

    async fn dial(&self, _ctx: &DialContext) -> Result<S> {
        self.take().ok_or_else(|| {
            NetconfError::config(format!("connection to {} already in use", self.target))
        })
    }

    async fn close(&self, stream: S) -> Result<()> {
        *self.conn.lock().unwrap_or_else(|e| e.into_inner()) = Some(stream);
        Ok(())
    }

    fn target(&self) -> String {
        self.target.clone()
    }
}

/// An established, instrumented connection owned by one session.
///
/// Start events fire on the first poll of a read or write and Done events
/// when that operation completes, so Start always precedes Done and the
/// elapsed time covers any time spent pending.
pub struct Transport<D: Dialer> {
    dialer: D,
    stream: D::Stream,
    target: String,
    trace: Arc<ClientTrace>,
    read_started: Option<Instant>,
    write_started: Option<Instant>,
}

impl<D: Dialer> std::fmt::Debug for Transport<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("target", &self.target)
            .field("read_pending", &self.read_started.is_some())
            .field("write_pending", &self.write_started.is_some())
            .finish_non_exhaustive()
    }
}

impl<D: Dialer> Transport<D> {
    /// Dial `dialer` once and wrap the resulting stream.
    ///
    /// `connect_start` fires before the dial and `connect_done` after it,
    /// on the error path as well.
    pub async fn connect(ctx: &DialContext, dialer: D) -> Result<Self> {
        let target = dialer.target();
        let trace = Arc::clone(ctx.client_trace());

        trace.connect_start(&target);
        let started = Instant::now();
        let result = dialer.dial(ctx).await;
        trace.connect_done(&target, result.as_ref().err(), started.elapsed());

        let stream = result?;
        tracing::debug!(target = %target, "Transport established");

        Ok(Self {
            dialer,
            stream,
            target,
            trace,
            read_started: None,
            write_started: None,
        })
    }

    /// The remote endpoint.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// The dialer this transport was built from.
    #[must_use]
    pub const fn dialer(&self) -> &D {
        &self.dialer
    }

    /// The underlying stream.
    #[must_use]
    pub const fn get_ref(&self) -> &D::Stream {
        &self.stream
    }

    /// Close the transport through its dialer.
    ///
    /// `connection_closed` fires exactly once, with the close result.
    pub async fn close(self) -> Result<()> {
        let Self {
            dialer,
            stream,
            target,
            trace,
            ..
        } = self;

        let result = dialer.close(stream).await;
        trace.connection_closed(&target, result.as_ref().err());
        result
    }
}

impl<D: Dialer + Unpin> AsyncRead for Transport<D> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.read_started.is_none() {
            this.trace.read_start(buf.remaining());
            this.read_started = Some(Instant::now());
        }

        let filled_before = buf.filled().len();
        let poll = Pin::new(&mut this.stream).poll_read(cx, buf);

        if let Poll::Ready(result) = &poll {
            let started = this.read_started.take().unwrap_or_else(Instant::now);
            this.trace.read_done(
                &buf.filled()[filled_before..],
                result.as_ref().err(),
                started.elapsed(),
            );
        }
        poll
    }
}

impl<D: Dialer + Unpin> AsyncWrite for Transport<D> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if this.write_started.is_none() {
            this.trace.write_start(buf);
            this.write_started = Some(Instant::now());
        }

        let poll = Pin::new(&mut this.stream).poll_write(cx, buf);

        if let Poll::Ready(result) = &poll {
            let started = this.write_started.take().unwrap_or_else(Instant::now);
            let written = result.as_ref().map_or(0, |n| *n);
            this.trace
                .write_done(buf, written, result.as_ref().err(), started.elapsed());
        }
        poll
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_shutdown(cx)
    }
}
