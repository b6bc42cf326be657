//! Convenient re-exports for common netconf-transport usage.
//!
//! ```ignore
//! use netconf_transport::prelude::*;
//! ```

pub use std::sync::Arc;

// Context and errors
pub use crate::context::{Deadline, DialContext};
pub use crate::error::{NetconfError, Result};

// Configuration
pub use crate::config::Config;
pub use crate::tls_config::{generate_self_signed, insecure_client_config};

// Dialers and transport
pub use crate::transport::ssh::{SshClientConfig, SshDialer};
pub use crate::transport::tls::TlsDialer;
pub use crate::transport::{Dialer, Transport};

// Call Home
pub use crate::callhome::{
    SshCallHomeDialer, SshListener, SshServerConfig, TlsCallHomeDialer, TlsListener,
};

// Traces
pub use crate::trace::{CallHomeClientTrace, CallHomeServerTrace, ClientTrace, TlsServerTrace};

// Sessions and server
pub use crate::server::{ConnectionHandler, HandlerFactory, TlsServer};
pub use crate::session::{
    SessionEstablisher, TransportOnly, new_session_from_dialer, new_ssh_session, new_tls_session,
};
