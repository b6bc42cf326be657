//! Integration tests for the SSH dialers against an in-process device.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{EchoOutcome, RecordingTrace, SshEchoServer, host_public_key, manager_ssh_config};
use netconf_transport::transport::ssh::{ClientHandler, HostKeyVerification};
use netconf_transport::{
    DialContext, Dialer, NetconfError, SshClientDialer, SshDialer, SshError, Transport,
};
use russh::client;
use russh::keys::PublicKey;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

async fn echo_once<S>(stream: &mut S, payload: &[u8])
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    stream.write_all(payload).await.unwrap();
    stream.flush().await.unwrap();
    let mut buf = vec![0u8; payload.len()];
    stream.read_exact(&mut buf).await.unwrap();
    assert_eq!(buf, payload);
}

async fn next_outcome(server: &mut SshEchoServer) -> EchoOutcome {
    tokio::time::timeout(Duration::from_secs(5), server.outcomes.recv())
        .await
        .expect("device reported in time")
        .expect("device still running")
}

#[tokio::test]
async fn dial_and_echo() {
    common::init_tracing();
    let mut server = SshEchoServer::spawn().await;
    let trace = RecordingTrace::new();
    let ctx = DialContext::new().with_client_trace(trace.client());

    let dialer = SshDialer::new(server.target(), manager_ssh_config("admin"));
    let mut transport = Transport::connect(&ctx, dialer).await.unwrap();
    echo_once(&mut transport, b"<hello xmlns=\"urn:ietf:params:xml:ns:netconf:base:1.0\"/>").await;
    transport.close().await.unwrap();

    assert!(matches!(next_outcome(&mut server).await, EchoOutcome::Served));
    assert_eq!(
        trace.events(),
        ["connect_start", "dial_start", "dial_done", "connect_done", "connection_closed"]
    );
}

#[tokio::test]
async fn owned_client_close_ends_device_session() {
    let mut server = SshEchoServer::spawn().await;
    let dialer = SshDialer::new(server.target(), manager_ssh_config("admin"));

    let mut conn = dialer.dial(&DialContext::new()).await.unwrap();
    assert!(conn.owns_client());
    echo_once(&mut conn, b"ping").await;
    dialer.close(conn).await.unwrap();

    assert!(matches!(next_outcome(&mut server).await, EchoOutcome::Served));
}

#[tokio::test]
async fn wrong_password_is_an_authentication_error() {
    let mut server = SshEchoServer::spawn().await;
    let dialer = SshDialer::new(server.target(), manager_ssh_config("nope"));

    let err = dialer.dial(&DialContext::new()).await.unwrap_err();
    assert!(matches!(err, NetconfError::Ssh(SshError::Authentication { .. })), "{err}");
    assert!(matches!(next_outcome(&mut server).await, EchoOutcome::Failed(_)));
}

#[tokio::test]
async fn unknown_host_key_is_rejected() {
    let server = SshEchoServer::spawn().await;
    let config = manager_ssh_config("admin").host_key_verification(HostKeyVerification::RejectUnknown);
    let dialer = SshDialer::new(server.target(), config);

    let err = dialer.dial(&DialContext::new()).await.unwrap_err();
    assert!(matches!(err, NetconfError::Ssh(SshError::Handshake { .. })), "{err}");
}

/// A caller-owned client that pins the device key.
struct PinnedManager {
    expected: PublicKey,
}

impl client::Handler for PinnedManager {
    type Error = russh::Error;

    async fn check_server_key(&mut self, key: &PublicKey) -> Result<bool, Self::Error> {
        Ok(key.key_data() == self.expected.key_data())
    }
}

async fn connect_client(target: &str) -> Arc<client::Handle<PinnedManager>> {
    let handler = PinnedManager {
        expected: host_public_key(),
    };
    let mut handle = client::connect(Arc::new(client::Config::default()), target, handler)
        .await
        .unwrap();
    let auth = handle.authenticate_password("admin", "admin").await.unwrap();
    assert!(auth.success());
    Arc::new(handle)
}

#[tokio::test]
async fn borrowed_client_survives_close() {
    let mut server = SshEchoServer::spawn().await;
    let handle = connect_client(&server.target()).await;

    let trace = RecordingTrace::new();
    let ctx = DialContext::new().with_client_trace(trace.client());
    let dialer = SshClientDialer::new(Arc::clone(&handle), server.target());
    let mut transport = Transport::connect(&ctx, dialer).await.unwrap();
    assert!(!transport.get_ref().owns_client());
    echo_once(&mut transport, b"borrowed").await;
    transport.close().await.unwrap();

    assert!(matches!(next_outcome(&mut server).await, EchoOutcome::Served));
    assert!(!handle.is_closed());
    // Nothing was dialed, so no dial events.
    assert_eq!(trace.events(), ["connect_start", "connect_done", "connection_closed"]);
}

#[tokio::test]
async fn second_channel_on_one_client_is_refused_by_device() {
    let server = SshEchoServer::spawn().await;
    let handle = connect_client(&server.target()).await;
    let dialer = SshClientDialer::new(Arc::clone(&handle), server.target());

    let first = dialer.dial(&DialContext::new()).await.unwrap();
    let err = dialer.dial(&DialContext::new()).await.unwrap_err();
    assert!(matches!(err, NetconfError::Ssh(SshError::Session { .. })), "{err}");
    dialer.close(first).await.unwrap();
}

#[test]
fn client_handler_type_is_public() {
    fn assert_handler<H: client::Handler>() {}
    assert_handler::<ClientHandler>();
}
