//! Session factory: turns any [`Dialer`] into a session.
//!
//! The RPC session layer lives outside this crate and plugs in through
//! [`SessionEstablisher`]. The factory resolves the configuration, connects a
//! [`Transport`] and hands it over. If the establisher refuses, the transport
//! comes back in [`Rejected`] and is closed before the error is returned.

use std::future::Future;
use std::sync::Arc;

use russh::client;

use crate::config::Config;
use crate::context::DialContext;
use crate::error::{NetconfError, Result};
use crate::transport::ssh::{SshClientConfig, SshClientDialer, SshDialer};
use crate::transport::tls::{TlsConnDialer, TlsDialer};
use crate::transport::{Dialer, Transport};

/// A refused transport together with the reason.
#[derive(Debug)]
pub struct Rejected<D: Dialer> {
    /// Why the session could not be established.
    pub error: NetconfError,
    /// The transport, still open.
    pub transport: Transport<D>,
}

impl<D: Dialer> Rejected<D> {
    /// Pair `transport` with the error that refused it.
    pub const fn new(transport: Transport<D>, error: NetconfError) -> Self {
        Self { error, transport }
    }
}

/// Builds a session on top of a connected transport.
pub trait SessionEstablisher<D: Dialer>: Send + Sync {
    /// The established session.
    type Session: Send;

    /// Take ownership of `transport` and run the session setup.
    ///
    /// `config` is already merged with the defaults.
    fn establish(
        &self,
        transport: Transport<D>,
        config: &Config,
    ) -> impl Future<Output = std::result::Result<Self::Session, Rejected<D>>> + Send;
}

/// An establisher whose session is the transport itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransportOnly;

impl<D: Dialer> SessionEstablisher<D> for TransportOnly {
    type Session = Transport<D>;

    async fn establish(
        &self,
        transport: Transport<D>,
        _config: &Config,
    ) -> std::result::Result<Transport<D>, Rejected<D>> {
        Ok(transport)
    }
}

/// Connect `dialer` and establish a session over it.
///
/// `config` is merged over [`Config::DEFAULT`]. A `connect_timeout` becomes
/// the dial deadline when `ctx` has none.
pub async fn new_session_from_dialer<D, E>(
    ctx: &DialContext,
    dialer: D,
    config: Config,
    establisher: &E,
) -> Result<E::Session>
where
    D: Dialer,
    E: SessionEstablisher<D>,
{
    let config = config.resolved();
    let ctx = match (ctx.deadline(), config.connect_timeout) {
        (None, Some(timeout)) => ctx.clone().with_timeout(timeout),
        _ => ctx.clone(),
    };

    let transport = Transport::connect(&ctx, dialer).await?;
    let target = transport.target().to_string();

    match establisher.establish(transport, &config).await {
        Ok(session) => Ok(session),
        Err(Rejected { error, transport }) => {
            tracing::debug!(target = %target, error = %error, "session refused, closing transport");
            if let Err(close_error) = transport.close().await {
                tracing::warn!(target = %target, error = %close_error, "closing refused transport failed");
            }
            Err(error)
        }
    }
}

/// [`new_session_from_dialer`] with an empty configuration.
pub async fn new_session_with_defaults<D, E>(
    ctx: &DialContext,
    dialer: D,
    establisher: &E,
) -> Result<E::Session>
where
    D: Dialer,
    E: SessionEstablisher<D>,
{
    new_session_from_dialer(ctx, dialer, Config::new(), establisher).await
}

/// Dial `target` over SSH and establish a session.
pub async fn new_ssh_session<E>(
    ctx: &DialContext,
    target: &str,
    ssh_config: impl Into<Arc<SshClientConfig>>,
    config: Config,
    establisher: &E,
) -> Result<E::Session>
where
    E: SessionEstablisher<SshDialer>,
{
    new_session_from_dialer(ctx, SshDialer::new(target, ssh_config), config, establisher).await
}

/// Establish a session on a new channel of an existing SSH client.
///
/// The client stays open after the session ends.
pub async fn new_ssh_session_from_client<H, E>(
    ctx: &DialContext,
    client: Arc<client::Handle<H>>,
    target: &str,
    config: Config,
    establisher: &E,
) -> Result<E::Session>
where
    H: client::Handler + 'static,
    E: SessionEstablisher<SshClientDialer<H>>,
{
    new_session_from_dialer(ctx, SshClientDialer::new(client, target), config, establisher).await
}

/// Dial `target` over TLS and establish a session.
pub async fn new_tls_session<E>(
    ctx: &DialContext,
    target: &str,
    tls_config: Arc<rustls::ClientConfig>,
    config: Config,
    establisher: &E,
) -> Result<E::Session>
where
    E: SessionEstablisher<TlsDialer>,
{
    new_session_from_dialer(ctx, TlsDialer::new(target, tls_config), config, establisher).await
}

/// Establish a session over a TLS connection the caller already holds.
///
/// The connection is never closed here. After the transport closes, or the
/// establisher refuses it, the caller gets it back with
/// [`ConnDialer::take`](crate::transport::ConnDialer::take).
pub async fn new_tls_session_from_conn<E>(
    ctx: &DialContext,
    conn: &Arc<TlsConnDialer>,
    config: Config,
    establisher: &E,
) -> Result<E::Session>
where
    E: SessionEstablisher<Arc<TlsConnDialer>>,
{
    new_session_from_dialer(ctx, Arc::clone(conn), config, establisher).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ConnDialer;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::io::DuplexStream;

    /// Records the config it saw and refuses every transport.
    #[derive(Default)]
    struct Refuser {
        seen: Mutex<Option<Config>>,
    }

    impl<D: Dialer> SessionEstablisher<D> for Refuser {
        type Session = ();

        async fn establish(
            &self,
            transport: Transport<D>,
            config: &Config,
        ) -> std::result::Result<(), Rejected<D>> {
            *self.seen.lock().unwrap() = Some(*config);
            Err(Rejected::new(transport, NetconfError::session("hello refused")))
        }
    }

    fn pipe_dialer() -> (Arc<ConnDialer<DuplexStream>>, DuplexStream) {
        let (near, far) = tokio::io::duplex(64);
        (Arc::new(ConnDialer::new(near, "pipe:0")), far)
    }

    #[tokio::test]
    async fn refused_session_closes_transport() {
        let (dialer, _far) = pipe_dialer();
        let closed = Arc::new(Mutex::new(Vec::new()));
        let slot = Arc::clone(&closed);
        let trace = crate::trace::ClientTrace::default()
            .on_connection_closed(move |target, _| slot.lock().unwrap().push(target.to_string()));
        let ctx = DialContext::new().with_client_trace(Arc::new(trace));

        let refuser = Refuser::default();
        let err = new_session_from_dialer(&ctx, Arc::clone(&dialer), Config::new(), &refuser)
            .await
            .unwrap_err();

        assert!(matches!(err, NetconfError::Session { .. }));
        assert_eq!(*closed.lock().unwrap(), vec!["pipe:0".to_string()]);
        // Closing a borrowed connection hands it back to the dialer.
        assert!(dialer.take().is_some());
    }

    #[tokio::test]
    async fn establisher_sees_merged_config() {
        let (dialer, _far) = pipe_dialer();
        let refuser = Refuser::default();
        let config = Config::new().connect_timeout(Duration::from_secs(3));
        let _ = new_session_from_dialer(&DialContext::new(), dialer, config, &refuser).await;

        let seen = refuser.seen.lock().unwrap().unwrap();
        assert_eq!(seen.setup_timeout, Config::DEFAULT.setup_timeout);
        assert_eq!(seen.connect_timeout, Some(Duration::from_secs(3)));
    }

    #[tokio::test]
    async fn transport_only_returns_the_transport() {
        let (dialer, _far) = pipe_dialer();
        let transport = new_session_with_defaults(&DialContext::new(), dialer, &TransportOnly)
            .await
            .unwrap();
        assert_eq!(transport.target(), "pipe:0");
        transport.close().await.unwrap();
    }
}
