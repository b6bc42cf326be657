//! netconf-transport: connection establishment for NETCONF
//!
//! This crate produces the duplex byte stream a NETCONF session runs over.
//! It covers outbound SSH and TLS, RFC 8071 Call Home in both roles, and a
//! plain TLS server for the device side.
//!
//! # Features
//!
//! - **One abstraction for every transport**: a [`Dialer`] yields a stream,
//!   a [`Transport`] wraps it with instrumentation
//! - **SSH** with the `netconf` subsystem, via `russh`, on fresh or reused clients
//! - **TLS** via `rustls`, on fresh or caller-held connections
//! - **Call Home**: manager listeners that initiate the handshake on an
//!   accepted connection, device dialers that answer it on a dialed one
//! - **Trace bundles** for every lifecycle event, passed through [`DialContext`]
//! - **Session factory** that plugs any dialer into the session layer
//!
//! # Example
//!
//! ```ignore
//! use netconf_transport::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let ctx = DialContext::new().with_client_trace(Arc::new(ClientTrace::logging()));
//!     let ssh = SshClientConfig::password("admin", "admin");
//!     let transport =
//!         new_ssh_session(&ctx, "192.0.2.1:830", ssh, Config::new(), &TransportOnly).await?;
//!     transport.close().await
//! }
//! ```

pub mod callhome;
pub mod config;
pub mod context;
pub mod error;
pub mod handshake;
pub mod prelude;
pub mod server;
pub mod session;
pub mod tls_config;
pub mod trace;
pub mod transport;

pub use callhome::{
    SshCallHomeDialer, SshListener, SshServerConfig, TcpConnect, TlsCallHomeDialer, TlsListener,
};
pub use config::Config;
pub use context::{Deadline, DialContext};
pub use error::{NegotiationError, NetconfError, Origin, Result, SshError, TlsError};
pub use handshake::{HandshakeRole, TlsHandshake};
pub use server::{ConnectionHandler, HandlerFactory, TlsServer};
pub use session::{
    Rejected, SessionEstablisher, TransportOnly, new_session_from_dialer,
    new_session_with_defaults, new_ssh_session, new_ssh_session_from_client, new_tls_session,
    new_tls_session_from_conn,
};
pub use trace::{CallHomeClientTrace, CallHomeServerTrace, ClientTrace, TlsInfo, TlsServerTrace};
pub use transport::ssh::{NETCONF_SUBSYSTEM, SshClientConfig, SshClientDialer, SshDialer};
pub use transport::tls::{TlsConn, TlsConnDialer, TlsDialer};
pub use transport::{ConnDialer, Dialer, Transport};
