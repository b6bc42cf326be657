//! Secure-handshake role selection.
//!
//! RFC 8071 separates the side that opens the TCP connection from the side
//! that drives the security handshake. The role is named explicitly here and
//! passed into the handshake step instead of being implied by the call site:
//!
//! | Path                        | TCP         | SSH role   | TLS role   |
//! |-----------------------------|-------------|------------|------------|
//! | client dial                 | connects    | Initiator  | Initiator  |
//! | Call Home manager (listen)  | accepts     | Initiator  | Initiator  |
//! | Call Home device (dial)     | connects    | Responder  | Responder  |
//! | plain TLS server            | accepts     | -          | Responder  |

use std::fmt;
use std::sync::Arc;

use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::{TlsAcceptor, TlsConnector, TlsStream};

use crate::context::Deadline;
use crate::error::{Origin, Result, TlsError};

/// Which side of a secure handshake this end plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeRole {
    /// Sends the first handshake message: SSH client, TLS client.
    Initiator,
    /// Answers the handshake: SSH server, TLS server.
    Responder,
}

impl fmt::Display for HandshakeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Initiator => "client",
            Self::Responder => "server",
        })
    }
}

/// A TLS handshake step with its role and the material that role needs.
#[derive(Debug, Clone)]
pub enum TlsHandshake {
    /// Act as the TLS client.
    Initiator {
        /// Client configuration.
        config: Arc<rustls::ClientConfig>,
        /// Name the server certificate is verified against.
        server_name: ServerName<'static>,
    },
    /// Act as the TLS server.
    Responder {
        /// Server configuration.
        config: Arc<rustls::ServerConfig>,
    },
}

impl TlsHandshake {
    /// Build an initiator step, parsing `server_name` as a DNS name or IP address.
    pub fn initiator(config: Arc<rustls::ClientConfig>, server_name: &str) -> Result<Self> {
        let server_name = ServerName::try_from(server_name.to_string()).map_err(|_| {
            TlsError::InvalidServerName {
                name: server_name.to_string(),
            }
        })?;
        Ok(Self::Initiator {
            config,
            server_name,
        })
    }

    /// Build a responder step.
    #[must_use]
    pub const fn responder(config: Arc<rustls::ServerConfig>) -> Self {
        Self::Responder { config }
    }

    /// The role this step plays.
    #[must_use]
    pub const fn role(&self) -> HandshakeRole {
        match self {
            Self::Initiator { .. } => HandshakeRole::Initiator,
            Self::Responder { .. } => HandshakeRole::Responder,
        }
    }

    /// Run the handshake over `stream`.
    ///
    /// A deadline bounds the handshake only; the returned stream carries no
    /// timeout. On failure `stream` is dropped, which closes it.
    pub async fn perform<S>(
        self,
        stream: S,
        deadline: Option<&Deadline>,
        origin: Origin,
        target: &str,
    ) -> Result<TlsStream<S>>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let role = self.role();
        let handshake = async move {
            match self {
                Self::Initiator {
                    config,
                    server_name,
                } => TlsConnector::from(config)
                    .connect(server_name, stream)
                    .await
                    .map(TlsStream::Client),
                Self::Responder { config } => TlsAcceptor::from(config)
                    .accept(stream)
                    .await
                    .map(TlsStream::Server),
            }
        };

        let outcome = match deadline {
            Some(deadline) => deadline.apply(handshake).await.map_err(|_| {
                TlsError::DeadlineExceeded {
                    origin,
                    role,
                    target: target.to_string(),
                }
            })?,
            None => handshake.await,
        };

        outcome.map_err(|source| {
            TlsError::Handshake {
                origin,
                role,
                target: target.to_string(),
                source,
            }
            .into()
        })
    }
}
