//! Call Home over TLS: manager listener against device dialer.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::RecordingTrace;
use netconf_transport::tls_config::{generate_self_signed, insecure_client_config};
use netconf_transport::{
    DialContext, Dialer, NetconfError, TlsCallHomeDialer, TlsConnDialer, TlsError, TlsListener,
    Transport,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

#[tokio::test]
async fn device_message_reaches_manager() {
    common::init_tracing();
    let cert = generate_self_signed().unwrap();
    let listener = TlsListener::bind(&DialContext::new(), "127.0.0.1", 0, insecure_client_config().unwrap())
        .await
        .unwrap();
    let dialer = TlsCallHomeDialer::new(format!("localhost:{}", listener.port()), cert.server_config().unwrap());

    let device = tokio::spawn(async move {
        let mut conn = dialer.dial(&DialContext::new()).await.unwrap();
        conn.write_all(b"hello from client").await.unwrap();
        conn.flush().await.unwrap();
        let mut rest = Vec::new();
        let _ = conn.read_to_end(&mut rest).await;
    });

    let mut conn = listener.accept(&DialContext::new()).await.unwrap();
    let mut buf = [0u8; 18];
    let n = conn.read(&mut buf).await.unwrap();
    assert_eq!(&buf[..n], b"hello from client");

    conn.shutdown().await.unwrap();
    drop(conn);
    device.await.unwrap();
}

#[tokio::test]
async fn device_certificate_is_checked_against_peer_ip() {
    let cert = generate_self_signed().unwrap();
    // The certificate names localhost only, while the manager verifies the
    // address the device called from.
    let listener = TlsListener::bind(&DialContext::new(), "127.0.0.1", 0, cert.client_config().unwrap())
        .await
        .unwrap();
    let dialer = TlsCallHomeDialer::new(format!("127.0.0.1:{}", listener.port()), cert.server_config().unwrap());

    let device = tokio::spawn(async move { dialer.dial(&DialContext::new()).await });
    let err = listener.accept(&DialContext::new()).await.unwrap_err();
    assert!(matches!(err, NetconfError::Tls(TlsError::Handshake { .. })), "{err}");
    assert!(err.to_string().starts_with("callhome:"), "{err}");
    assert!(device.await.unwrap().is_err());
}

#[tokio::test]
async fn configured_server_name_accepts_dns_certificate() {
    let cert = generate_self_signed().unwrap();
    let listener = TlsListener::bind(&DialContext::new(), "127.0.0.1", 0, cert.client_config().unwrap())
        .await
        .unwrap()
        .with_server_name("localhost");
    let dialer = TlsCallHomeDialer::new(format!("127.0.0.1:{}", listener.port()), cert.server_config().unwrap());

    let device = tokio::spawn(async move {
        let mut conn = dialer.dial(&DialContext::new()).await.unwrap();
        conn.write_all(b"<hello/>").await.unwrap();
        conn.flush().await.unwrap();
        let mut rest = Vec::new();
        let _ = conn.read_to_end(&mut rest).await;
    });

    let mut conn = listener.accept(&DialContext::new()).await.unwrap();
    let mut buf = [0u8; 8];
    conn.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"<hello/>");

    conn.shutdown().await.unwrap();
    drop(conn);
    device.await.unwrap();
}

#[tokio::test]
async fn both_sides_trace_the_handshake() {
    let cert = generate_self_signed().unwrap();
    let manager_trace = RecordingTrace::new();
    let device_trace = RecordingTrace::new();
    let manager_ctx = DialContext::new().with_callhome_client_trace(manager_trace.callhome_client());
    let device_ctx = DialContext::new().with_callhome_server_trace(device_trace.callhome_server());

    let listener = TlsListener::bind(&manager_ctx, "127.0.0.1", 0, insecure_client_config().unwrap())
        .await
        .unwrap();
    let dialer = TlsCallHomeDialer::new(format!("127.0.0.1:{}", listener.port()), cert.server_config().unwrap());

    let device = tokio::spawn(async move { dialer.dial(&device_ctx).await });
    let _conn = listener.accept(&manager_ctx).await.unwrap();
    let _device_conn = device.await.unwrap().unwrap();

    assert_eq!(manager_trace.events(), ["listen_start", "accept_done", "tls_connected"]);
    assert_eq!(
        device_trace.events(),
        ["dial_start", "accept_start", "accept_done", "tls_connected", "dial_done"]
    );
}

#[tokio::test]
async fn manager_handshake_honors_deadline() {
    let listener = TlsListener::bind(&DialContext::new(), "127.0.0.1", 0, insecure_client_config().unwrap())
        .await
        .unwrap();

    // Connects but never answers the ClientHello.
    let silent = tokio::net::TcpStream::connect(listener.local_addr()).await.unwrap();

    let ctx = DialContext::new().with_timeout(Duration::from_millis(200));
    let err = listener.accept(&ctx).await.unwrap_err();
    assert!(err.is_timeout(), "{err}");
    drop(silent);
}

#[tokio::test]
async fn device_handshake_honors_deadline() {
    let cert = generate_self_signed().unwrap();
    // A manager that accepts the TCP connection and never starts TLS.
    let manager = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dialer = TlsCallHomeDialer::new(manager.local_addr().unwrap().to_string(), cert.server_config().unwrap());
    let hold = tokio::spawn(async move {
        let (stream, _) = manager.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        drop(stream);
    });

    let ctx = DialContext::new().with_timeout(Duration::from_millis(200));
    let err = dialer.dial(&ctx).await.unwrap_err();
    assert!(err.is_timeout(), "{err}");
    hold.abort();
}

#[tokio::test]
async fn accepted_connection_feeds_a_transport() {
    let cert = generate_self_signed().unwrap();
    let listener = TlsListener::bind(&DialContext::new(), "127.0.0.1", 0, insecure_client_config().unwrap())
        .await
        .unwrap();
    let dialer = TlsCallHomeDialer::new(format!("127.0.0.1:{}", listener.port()), cert.server_config().unwrap());

    let device = tokio::spawn(async move {
        let mut conn = dialer.dial(&DialContext::new()).await.unwrap();
        let mut hello = [0u8; 7];
        conn.read_exact(&mut hello).await.unwrap();
        conn.write_all(b"<hello/>").await.unwrap();
        conn.flush().await.unwrap();
        (hello, conn)
    });

    let accepted = listener.accept(&DialContext::new()).await.unwrap();
    let conn_dialer = Arc::new(TlsConnDialer::from_tls(accepted).unwrap());
    let mut transport = Transport::connect(&DialContext::new(), Arc::clone(&conn_dialer))
        .await
        .unwrap();
    transport.write_all(b"<hello>").await.unwrap();
    transport.flush().await.unwrap();
    let mut reply = [0u8; 8];
    transport.read_exact(&mut reply).await.unwrap();
    assert_eq!(&reply, b"<hello/>");

    transport.close().await.unwrap();
    // The accepted connection belongs to the caller and is still usable.
    let mut conn = conn_dialer.take().unwrap();
    let (hello, mut device_conn) = device.await.unwrap();
    assert_eq!(&hello, b"<hello>");
    device_conn.write_all(b"still").await.unwrap();
    device_conn.flush().await.unwrap();
    let mut tail = [0u8; 5];
    conn.read_exact(&mut tail).await.unwrap();
    assert_eq!(&tail, b"still");
}
