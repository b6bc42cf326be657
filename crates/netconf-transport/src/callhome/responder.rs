//! The SSH server role a device plays after calling home.

use std::sync::Arc;

use russh::keys::{PrivateKey, PublicKey};
use russh::server::{self, Auth, Msg, Session};
use russh::{Channel, ChannelId, Pty, Sig};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::oneshot;

use super::negotiate::{ChannelDecision, ChannelRequest, RequestReply, SubsystemNegotiator};
use crate::error::{NegotiationError, NetconfError, Origin, Result, SshError};
use crate::handshake::HandshakeRole;
use crate::trace::CallHomeServerTrace;

/// Decides whether a manager may log in.
pub trait Authenticator: Send + Sync + std::fmt::Debug {
    /// Check a password login.
    fn check_password(&self, _user: &str, _password: &str) -> bool {
        false
    }

    /// Check a public key login.
    fn check_public_key(&self, _user: &str, _key: &PublicKey) -> bool {
        false
    }
}

/// Fixed credentials: one user, with a password and/or authorized keys.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    user: String,
    password: Option<String>,
    authorized_keys: Vec<PublicKey>,
}

impl StaticCredentials {
    /// Credentials for `user` with nothing accepted yet.
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            ..Self::default()
        }
    }

    /// Accept `password`.
    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Accept `key`.
    #[must_use]
    pub fn with_authorized_key(mut self, key: PublicKey) -> Self {
        self.authorized_keys.push(key);
        self
    }
}

impl Authenticator for StaticCredentials {
    fn check_password(&self, user: &str, password: &str) -> bool {
        user == self.user && self.password.as_deref() == Some(password)
    }

    fn check_public_key(&self, user: &str, key: &PublicKey) -> bool {
        user == self.user && self.authorized_keys.iter().any(|k| k.key_data() == key.key_data())
    }
}

/// SSH server configuration for the device side of Call Home.
#[derive(Clone)]
pub struct SshServerConfig {
    /// russh server settings, including the host keys.
    pub russh: Arc<server::Config>,
    /// Login policy.
    pub authenticator: Arc<dyn Authenticator>,
}

impl std::fmt::Debug for SshServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshServerConfig")
            .field("host_keys", &self.russh.keys.len())
            .field("authenticator", &self.authenticator)
            .finish()
    }
}

impl SshServerConfig {
    /// Combine russh settings with a login policy.
    pub fn new(russh: impl Into<Arc<server::Config>>, authenticator: Arc<dyn Authenticator>) -> Self {
        Self {
            russh: russh.into(),
            authenticator,
        }
    }

    /// A server accepting a single user/password pair, presenting `host_key`.
    pub fn password(
        user: impl Into<String>,
        password: impl Into<String>,
        host_key: PrivateKey,
    ) -> Self {
        let russh = server::Config {
            keys: vec![host_key],
            auth_rejection_time_initial: Some(std::time::Duration::ZERO),
            ..Default::default()
        };
        Self::new(
            russh,
            Arc::new(StaticCredentials::new(user).with_password(password)),
        )
    }
}

/// The outcome delivered from the SSH session task to the dialer.
type Outcome = std::result::Result<Channel<Msg>, NegotiationError>;

/// russh handler that authenticates the manager and drives the negotiator.
struct ResponderHandler {
    negotiator: SubsystemNegotiator,
    pending: Option<Channel<Msg>>,
    outcome: Option<oneshot::Sender<Outcome>>,
    authenticator: Arc<dyn Authenticator>,
    trace: Arc<CallHomeServerTrace>,
    target: String,
    authenticated: bool,
}

impl ResponderHandler {
    fn login(&mut self, user: &str, accepted: bool) -> Auth {
        if !accepted {
            tracing::debug!(target = %self.target, user = %user, "Rejecting manager login");
            return Auth::Reject {
                proceed_with_methods: None,
                partial_success: false,
            };
        }
        if !self.authenticated {
            self.authenticated = true;
            self.trace.ssh_connected(&self.target, user);
            self.trace.accept_start(&self.target);
        }
        Auth::Accept
    }

    fn reply(&self, channel: ChannelId, reply: RequestReply, session: &mut Session) {
        let _ = match reply {
            RequestReply::Success => session.channel_success(channel),
            RequestReply::Failure => session.channel_failure(channel),
        };
    }

    /// Deliver the outcome once the negotiation has settled.
    fn settle(&mut self) {
        if !self.negotiator.is_settled() {
            return;
        }
        if let Some(tx) = self.outcome.take() {
            let outcome = match self.negotiator.finish() {
                Ok(_) => self
                    .pending
                    .take()
                    .ok_or(NegotiationError::NoSessionChannel),
                Err(e) => {
                    self.pending = None;
                    Err(e)
                }
            };
            let _ = tx.send(outcome);
        }
    }

    fn request(&mut self, channel: ChannelId, request: ChannelRequest<'_>, session: &mut Session) {
        let reply = self.decide(channel, request);
        self.reply(channel, reply, session);
    }

    /// Run `request` through the negotiator without replying on the wire.
    fn decide(&mut self, channel: ChannelId, request: ChannelRequest<'_>) -> RequestReply {
        let reply = self.negotiator.on_request(channel, request);
        tracing::debug!(target = %self.target, request = ?request, reply = ?reply, "Channel request");
        self.settle();
        reply
    }

    fn open(&mut self, channel: ChannelId, kind: &str) -> bool {
        match self.negotiator.on_channel_open(channel, kind) {
            ChannelDecision::Accept => true,
            ChannelDecision::Reject { reason, message } => {
                tracing::debug!(
                    target = %self.target,
                    kind = %kind,
                    reason = ?reason,
                    "Refusing channel: {message}"
                );
                false
            }
        }
    }
}

impl Drop for ResponderHandler {
    fn drop(&mut self) {
        // Session over. Report what was missing if authentication got that far;
        // otherwise the dialer reads the session error instead.
        if self.authenticated {
            if let (Some(tx), Err(e)) = (self.outcome.take(), self.negotiator.finish()) {
                let _ = tx.send(Err(e));
            }
        }
    }
}

impl server::Handler for ResponderHandler {
    type Error = russh::Error;

    async fn auth_password(
        &mut self,
        user: &str,
        password: &str,
    ) -> std::result::Result<Auth, Self::Error> {
        let accepted = self.authenticator.check_password(user, password);
        Ok(self.login(user, accepted))
    }

    async fn auth_publickey(
        &mut self,
        user: &str,
        public_key: &PublicKey,
    ) -> std::result::Result<Auth, Self::Error> {
        let accepted = self.authenticator.check_public_key(user, public_key);
        Ok(self.login(user, accepted))
    }

    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        _session: &mut Session,
    ) -> std::result::Result<bool, Self::Error> {
        let accepted = self.open(channel.id(), super::negotiate::SESSION_CHANNEL);
        if accepted {
            self.pending = Some(channel);
        }
        Ok(accepted)
    }

    async fn channel_open_direct_tcpip(
        &mut self,
        channel: Channel<Msg>,
        _host_to_connect: &str,
        _port_to_connect: u32,
        _originator_address: &str,
        _originator_port: u32,
        _session: &mut Session,
    ) -> std::result::Result<bool, Self::Error> {
        Ok(self.open(channel.id(), "direct-tcpip"))
    }

    async fn channel_open_x11(
        &mut self,
        channel: Channel<Msg>,
        _originator_address: &str,
        _originator_port: u32,
        _session: &mut Session,
    ) -> std::result::Result<bool, Self::Error> {
        Ok(self.open(channel.id(), "x11"))
    }

    async fn subsystem_request(
        &mut self,
        channel: ChannelId,
        name: &str,
        session: &mut Session,
    ) -> std::result::Result<(), Self::Error> {
        self.request(channel, ChannelRequest::Subsystem(name), session);
        Ok(())
    }

    async fn exec_request(
        &mut self,
        channel: ChannelId,
        _data: &[u8],
        session: &mut Session,
    ) -> std::result::Result<(), Self::Error> {
        self.request(channel, ChannelRequest::Other("exec"), session);
        Ok(())
    }

    async fn shell_request(
        &mut self,
        channel: ChannelId,
        session: &mut Session,
    ) -> std::result::Result<(), Self::Error> {
        self.request(channel, ChannelRequest::Other("shell"), session);
        Ok(())
    }

    async fn env_request(
        &mut self,
        channel: ChannelId,
        _variable_name: &str,
        _variable_value: &str,
        session: &mut Session,
    ) -> std::result::Result<(), Self::Error> {
        self.request(channel, ChannelRequest::Other("env"), session);
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn pty_request(
        &mut self,
        channel: ChannelId,
        _term: &str,
        _col_width: u32,
        _row_height: u32,
        _pix_width: u32,
        _pix_height: u32,
        _modes: &[(Pty, u32)],
        session: &mut Session,
    ) -> std::result::Result<(), Self::Error> {
        self.request(channel, ChannelRequest::Other("pty-req"), session);
        Ok(())
    }

    async fn x11_request(
        &mut self,
        channel: ChannelId,
        _single_connection: bool,
        _x11_auth_protocol: &str,
        _x11_auth_cookie: &str,
        _x11_screen_number: u32,
        session: &mut Session,
    ) -> std::result::Result<(), Self::Error> {
        self.request(channel, ChannelRequest::Other("x11-req"), session);
        Ok(())
    }

    /// russh sends the reply from the returned flag.
    async fn agent_request(
        &mut self,
        channel: ChannelId,
        _session: &mut Session,
    ) -> std::result::Result<bool, Self::Error> {
        let reply = self.decide(channel, ChannelRequest::Other("auth-agent-req@openssh.com"));
        Ok(reply == RequestReply::Success)
    }

    // window-change and signal never ask for a reply.
    async fn window_change_request(
        &mut self,
        channel: ChannelId,
        _col_width: u32,
        _row_height: u32,
        _pix_width: u32,
        _pix_height: u32,
        _session: &mut Session,
    ) -> std::result::Result<(), Self::Error> {
        self.decide(channel, ChannelRequest::Other("window-change"));
        Ok(())
    }

    async fn signal(
        &mut self,
        channel: ChannelId,
        _signal: Sig,
        _session: &mut Session,
    ) -> std::result::Result<(), Self::Error> {
        self.decide(channel, ChannelRequest::Other("signal"));
        Ok(())
    }

    async fn channel_eof(
        &mut self,
        channel: ChannelId,
        _session: &mut Session,
    ) -> std::result::Result<(), Self::Error> {
        self.negotiator.on_requests_exhausted(channel);
        self.settle();
        Ok(())
    }

    async fn channel_close(
        &mut self,
        channel: ChannelId,
        _session: &mut Session,
    ) -> std::result::Result<(), Self::Error> {
        self.negotiator.on_requests_exhausted(channel);
        self.settle();
        Ok(())
    }
}

/// A negotiated SSH session on the device side.
pub(crate) struct Negotiated {
    pub(crate) channel: Channel<Msg>,
    pub(crate) session: tokio::task::JoinHandle<std::result::Result<(), russh::Error>>,
}

/// Run the SSH server handshake over `stream` and wait for the manager to
/// open a session channel and request the netconf subsystem.
///
/// The manager drives every step; nothing here observes a deadline.
pub(crate) async fn respond<S>(
    stream: S,
    config: &SshServerConfig,
    target: &str,
    trace: &Arc<CallHomeServerTrace>,
) -> Result<Negotiated>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let handshake_error = |source: russh::Error| SshError::Handshake {
        origin: Origin::CallHome,
        role: HandshakeRole::Responder,
        target: target.to_string(),
        source,
    };

    let (tx, rx) = oneshot::channel();
    let handler = ResponderHandler {
        negotiator: SubsystemNegotiator::new(),
        pending: None,
        outcome: Some(tx),
        authenticator: Arc::clone(&config.authenticator),
        trace: Arc::clone(trace),
        target: target.to_string(),
        authenticated: false,
    };

    let running = server::run_stream(Arc::clone(&config.russh), stream, handler)
        .await
        .map_err(handshake_error)?;
    let session = tokio::spawn(running);

    match rx.await {
        Ok(Ok(channel)) => {
            trace.accept_done(target, None);
            Ok(Negotiated { channel, session })
        }
        Ok(Err(negotiation)) => {
            let err = NetconfError::Negotiation {
                origin: Origin::CallHome,
                source: negotiation,
            };
            trace.accept_done(target, Some(&err));
            session.abort();
            Err(err)
        }
        // Session ended before the manager authenticated.
        Err(_) => {
            let source = match session.await {
                Ok(Err(e)) => e,
                Ok(Ok(())) => russh::Error::Disconnect,
                Err(join) => russh::Error::IO(std::io::Error::other(join.to_string())),
            };
            Err(handshake_error(source).into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_credentials_check_user_and_secret() {
        let creds = StaticCredentials::new("admin").with_password("secret");
        assert!(creds.check_password("admin", "secret"));
        assert!(!creds.check_password("admin", "wrong"));
        assert!(!creds.check_password("root", "secret"));
    }

    #[test]
    fn authorized_keys_match_on_key_data() {
        let key = russh::keys::parse_public_key_base64(
            "AAAAC3NzaC1lZDI1NTE5AAAAIDSNIgW14xGCqTDcnmrHS9gdVadiF+CyRmW0juBgiBFd",
        )
        .unwrap();
        let creds = StaticCredentials::new("admin").with_authorized_key(key.clone());
        assert!(creds.check_public_key("admin", &key));
        assert!(!creds.check_public_key("guest", &key));
        assert!(!StaticCredentials::new("admin").check_password("admin", ""));
    }
}
