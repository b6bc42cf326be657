//! Error types for netconf-transport.
//!
//! Every error carries the operation that failed (listen, accept, dial,
//! handshake, negotiation) and keeps the underlying cause as its source.
//! The core never retries; callers decide what to do with a failure.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::handshake::HandshakeRole;

/// The component an error originated from.
///
/// Rendered as the leading prefix of the error message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// A client-initiated transport (fresh SSH/TLS dial).
    Transport,
    /// A Call Home listener or dialer.
    CallHome,
    /// The plain TLS server.
    Server,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Transport => "transport",
            Self::CallHome => "callhome",
            Self::Server => "server",
        })
    }
}

/// The main error type for netconf-transport operations.
#[derive(Debug, Error)]
pub enum NetconfError {
    /// A listening socket could not be bound.
    #[error("{origin}: failed to listen on {address}: {source}")]
    Listen {
        /// Where the listener was being created.
        origin: Origin,
        /// The address that could not be bound.
        address: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Accepting a TCP connection failed. The listener stays usable.
    #[error("{origin}: accept failed: {source}")]
    Accept {
        /// Where the accept happened.
        origin: Origin,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The outbound TCP connection could not be opened.
    #[error("{origin}: failed to connect to {target}: {source}")]
    Dial {
        /// Where the dial happened.
        origin: Origin,
        /// The address being dialed.
        target: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// SSH-level failure.
    #[error(transparent)]
    Ssh(#[from] SshError),

    /// TLS-level failure.
    #[error(transparent)]
    Tls(#[from] TlsError),

    /// The SSH channel/subsystem negotiation did not produce a NETCONF channel.
    #[error("{origin}: {source}")]
    Negotiation {
        /// Where the negotiation happened.
        origin: Origin,
        /// What went wrong.
        #[source]
        source: NegotiationError,
    },

    /// Invalid configuration or credential material.
    #[error("configuration error: {message}")]
    Config {
        /// Description of the problem.
        message: String,
    },

    /// The downstream session layer refused the transport.
    #[error("session setup failed: {message}")]
    Session {
        /// Description of the problem.
        message: String,
    },

    /// An operation exceeded its deadline.
    #[error("{operation} timed out after {duration:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// How long was allowed.
        duration: Duration,
    },

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An I/O error occurred with additional context.
    #[error("{context}: {source}")]
    IoWithContext {
        /// What operation was being performed.
        context: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// SSH-specific errors.
#[derive(Debug, Error)]
pub enum SshError {
    /// The SSH protocol handshake failed.
    #[error("{origin}: SSH {role} handshake with {target} failed: {source}")]
    Handshake {
        /// Where the handshake happened.
        origin: Origin,
        /// Which side of the handshake this end played.
        role: HandshakeRole,
        /// The peer address.
        target: String,
        /// The underlying SSH error.
        #[source]
        source: russh::Error,
    },

    /// Authentication failed.
    #[error("authentication failed for user '{user}': {reason}")]
    Authentication {
        /// The user that failed to authenticate.
        user: String,
        /// The reason for the failure.
        reason: String,
    },

    /// Host key verification failed.
    #[error("host key verification failed for {host}: {reason}")]
    HostKeyVerification {
        /// The host whose key verification failed.
        host: String,
        /// The reason for the failure.
        reason: String,
    },

    /// Opening the session channel failed.
    #[error("{origin}: failed to create SSH session with {target}: {source}")]
    Session {
        /// Where the session was opened.
        origin: Origin,
        /// The peer address.
        target: String,
        /// The underlying SSH error.
        #[source]
        source: russh::Error,
    },

    /// The peer refused or never answered the netconf subsystem request.
    #[error("{origin}: failed to request netconf subsystem from {target}: {reason}")]
    Subsystem {
        /// Where the request was made.
        origin: Origin,
        /// The peer address.
        target: String,
        /// The reason for the failure.
        reason: String,
    },

    /// Channel error.
    #[error("SSH channel error: {reason}")]
    Channel {
        /// The reason for the channel error.
        reason: String,
    },
}

/// TLS-specific errors.
#[derive(Debug, Error)]
pub enum TlsError {
    /// The TLS handshake failed.
    #[error("{origin}: TLS {role} handshake with {target} failed: {source}")]
    Handshake {
        /// Where the handshake happened.
        origin: Origin,
        /// Which side of the handshake this end played.
        role: HandshakeRole,
        /// The peer address.
        target: String,
        /// The underlying I/O error raised by the TLS stack.
        #[source]
        source: std::io::Error,
    },

    /// The handshake did not finish before the context deadline.
    #[error("{origin}: TLS {role} handshake with {target} exceeded its deadline")]
    DeadlineExceeded {
        /// Where the handshake happened.
        origin: Origin,
        /// Which side of the handshake this end played.
        role: HandshakeRole,
        /// The peer address.
        target: String,
    },

    /// The name to verify the server certificate against is not valid.
    #[error("invalid TLS server name '{name}'")]
    InvalidServerName {
        /// The rejected name.
        name: String,
    },

    /// Certificate, key or protocol configuration could not be built.
    #[error("invalid TLS configuration: {reason}")]
    Config {
        /// Description of the problem.
        reason: String,
    },
}

/// Failures of the device-side SSH channel/subsystem negotiation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NegotiationError {
    /// The SSH session ended before the peer opened a session channel.
    #[error("no session channel received")]
    NoSessionChannel,

    /// The session channel's requests were exhausted without a netconf subsystem request.
    #[error("netconf subsystem not requested")]
    SubsystemNotRequested,
}

/// Result type alias for netconf-transport operations.
pub type Result<T> = std::result::Result<T, NetconfError>;

impl NetconfError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a session setup error.
    pub fn session(message: impl Into<String>) -> Self {
        Self::Session {
            message: message.into(),
        }
    }

    /// Create an I/O error with context.
    pub fn io_context(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::IoWithContext {
            context: context.into(),
            source,
        }
    }

    /// Wrap an I/O result with context.
    pub fn with_io_context<T>(result: std::io::Result<T>, context: impl Into<String>) -> Result<T> {
        result.map_err(|e| Self::io_context(context, e))
    }

    /// Check if this is a timeout error.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::Tls(TlsError::DeadlineExceeded { .. })
        )
    }

    /// Check if this is a channel/subsystem negotiation failure.
    #[must_use]
    pub const fn is_negotiation(&self) -> bool {
        matches!(self, Self::Negotiation { .. })
    }

    /// Check if this is a listen (bind) failure.
    #[must_use]
    pub const fn is_listen(&self) -> bool {
        matches!(self, Self::Listen { .. })
    }

    /// The negotiation failure, if this is one.
    #[must_use]
    pub const fn negotiation(&self) -> Option<&NegotiationError> {
        match self {
            Self::Negotiation { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl TlsError {
    /// Create a configuration error.
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }
}

impl From<rustls::Error> for TlsError {
    fn from(e: rustls::Error) -> Self {
        Self::config(e.to_string())
    }
}

impl From<rustls::Error> for NetconfError {
    fn from(e: rustls::Error) -> Self {
        Self::Tls(e.into())
    }
}
