//! Hooks for the two Call Home roles.

use std::net::SocketAddr;
use std::time::Duration;

use crate::error::NetconfError;

use super::{TlsInfo, display_error};

trace_bundle! {
    /// Events emitted by the manager-side Call Home listeners.
    pub struct CallHomeClientTrace {
        /// Called once the listening socket is bound.
        listen_start / on_listen_start(address: SocketAddr);
        /// Called after every TCP accept, successful or not.
        accept_done / on_accept_done(peer: Option<SocketAddr>, error: Option<&NetconfError>);
        /// Called when the SSH client handshake and authentication succeeded.
        ssh_connected / on_ssh_connected(target: &str, user: &str);
        /// Called when the device granted the netconf subsystem.
        subsystem_ready / on_subsystem_ready(target: &str);
        /// Called when the TLS client handshake succeeded.
        tls_connected / on_tls_connected(target: &str, info: &TlsInfo);
    }
}

trace_bundle! {
    /// Events emitted by the device-side Call Home dialers.
    ///
    /// `accept_*` brackets the wait for the manager to drive the secure
    /// handshake to completion over the connection this side opened.
    pub struct CallHomeServerTrace {
        /// Called before the outbound TCP connection is opened.
        dial_start / on_dial_start(target: &str);
        /// Called when the dial (connect, handshake and negotiation) finished.
        dial_done / on_dial_done(target: &str, error: Option<&NetconfError>, elapsed: Duration);
        /// Called when the manager authenticated over SSH.
        ssh_connected / on_ssh_connected(target: &str, user: &str);
        /// Called when the netconf subsystem was granted on the session channel.
        subsystem_ready / on_subsystem_ready(target: &str);
        /// Called when the TLS server handshake succeeded.
        tls_connected / on_tls_connected(target: &str, info: &TlsInfo);
        /// Called before waiting for the manager's handshake or channel.
        accept_start / on_accept_start(target: &str);
        /// Called once the manager's handshake or channel negotiation resolved.
        accept_done / on_accept_done(target: &str, error: Option<&NetconfError>);
    }
}

impl CallHomeClientTrace {
    /// A bundle that logs every event through `tracing`.
    #[must_use]
    pub fn logging() -> Self {
        Self::default()
            .on_listen_start(|address| tracing::info!(address = %address, "Call Home listening"))
            .on_accept_done(|peer, error| match (peer, error) {
                (_, Some(error)) => tracing::warn!(error = %error, "Call Home accept failed"),
                (peer, None) => tracing::info!(peer = ?peer, "Call Home accepted connection"),
            })
            .on_ssh_connected(|target, user| {
                tracing::info!(target = %target, user = %user, "Call Home SSH client connected");
            })
            .on_subsystem_ready(|target| {
                tracing::info!(target = %target, "Call Home netconf subsystem ready");
            })
            .on_tls_connected(|target, info| {
                tracing::info!(
                    target = %target,
                    protocol = ?info.protocol,
                    cipher_suite = ?info.cipher_suite,
                    "Call Home TLS connected"
                );
            })
    }
}

impl CallHomeServerTrace {
    /// A bundle that logs every event through `tracing`.
    #[must_use]
    pub fn logging() -> Self {
        Self::default()
            .on_dial_start(|target| tracing::info!(target = %target, "Call Home dialing"))
            .on_dial_done(|target, error, elapsed| {
                if let Some(error) = error {
                    tracing::warn!(target = %target, error = %error, elapsed = ?elapsed, "Call Home dial failed");
                } else {
                    tracing::info!(target = %target, elapsed = ?elapsed, "Call Home dial succeeded");
                }
            })
            .on_ssh_connected(|target, user| {
                tracing::info!(target = %target, user = %user, "Call Home SSH connected");
            })
            .on_subsystem_ready(|target| {
                tracing::info!(target = %target, "Call Home netconf subsystem ready");
            })
            .on_tls_connected(|target, info| {
                tracing::info!(
                    target = %target,
                    protocol = ?info.protocol,
                    cipher_suite = ?info.cipher_suite,
                    "Call Home TLS connected"
                );
            })
            .on_accept_start(|target| {
                tracing::debug!(target = %target, "Waiting for manager handshake");
            })
            .on_accept_done(|target, error| {
                tracing::debug!(
                    target = %target,
                    error = %display_error(error),
                    "Manager handshake resolved"
                );
            })
    }
}
