//! Hooks for the plain TLS server.

use std::net::SocketAddr;

use crate::error::NetconfError;

use super::display_error;

trace_bundle! {
    /// Events emitted by [`TlsServer`](crate::server::TlsServer).
    pub struct TlsServerTrace {
        /// Called after the bind attempt.
        listened / on_listened(address: &str, error: Option<&NetconfError>);
        /// Called once when the accept loop starts.
        start_accepting / on_start_accepting();
        /// Called after every TCP accept.
        accepted / on_accepted(peer: Option<SocketAddr>, error: Option<&NetconfError>);
        /// Called after every TLS handshake attempt.
        tls_handshake / on_tls_handshake(peer: SocketAddr, error: Option<&NetconfError>);
        /// Called when a handled connection ends.
        connection_closed / on_connection_closed(peer: SocketAddr, error: Option<&NetconfError>);
    }
}

impl TlsServerTrace {
    /// A bundle that logs every event at info level.
    #[must_use]
    pub fn logging() -> Self {
        Self::default()
            .on_listened(|address, error| {
                tracing::info!(address = %address, error = %display_error(error), "TLS server listening");
            })
            .on_start_accepting(|| tracing::info!("TLS server started accepting connections"))
            .on_accepted(|peer, error| match error {
                Some(error) => tracing::warn!(error = %error, "TLS server accept error"),
                None => tracing::info!(peer = ?peer, "TLS server accepted connection"),
            })
            .on_tls_handshake(|peer, error| match error {
                Some(error) => tracing::warn!(peer = %peer, error = %error, "TLS handshake failed"),
                None => tracing::info!(peer = %peer, "TLS handshake completed"),
            })
            .on_connection_closed(|peer, error| {
                tracing::info!(peer = %peer, error = %display_error(error), "TLS connection closed");
            })
    }

    /// A verbose bundle for debugging, logging every event at debug level.
    #[must_use]
    pub fn diagnostic() -> Self {
        Self::default()
            .on_listened(|address, error| {
                tracing::debug!(address = %address, error = %display_error(error), "[diag] TLS server listening");
            })
            .on_start_accepting(|| tracing::debug!("[diag] TLS server started accepting connections"))
            .on_accepted(|peer, error| {
                tracing::debug!(peer = ?peer, error = %display_error(error), "[diag] TLS server accept");
            })
            .on_tls_handshake(|peer, error| {
                tracing::debug!(peer = %peer, error = %display_error(error), "[diag] TLS handshake");
            })
            .on_connection_closed(|peer, error| {
                tracing::debug!(peer = %peer, error = %display_error(error), "[diag] TLS connection closed");
            })
    }
}
