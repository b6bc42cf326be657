//! Hooks for client-initiated transports.

use std::io;
use std::time::Duration;

use crate::error::NetconfError;

use super::display_error;

trace_bundle! {
    /// Events emitted while a [`Transport`](crate::Transport) is established and used.
    ///
    /// `connect_*` brackets the whole transport construction, `dial_*` the
    /// dialer's own work inside it. `read_*`/`write_*` fire for every I/O
    /// operation on the live transport.
    pub struct ClientTrace {
        /// Called before the dialer runs.
        connect_start / on_connect_start(target: &str);
        /// Called once the dial finished, successfully or not.
        connect_done / on_connect_done(target: &str, error: Option<&NetconfError>, elapsed: Duration);
        /// Called by a dialer before it opens its connection.
        dial_start / on_dial_start(target: &str);
        /// Called by a dialer after its connection is ready or failed.
        dial_done / on_dial_done(target: &str, error: Option<&NetconfError>, elapsed: Duration);
        /// Called when a read begins, with the space available in the buffer.
        read_start / on_read_start(capacity: usize);
        /// Called when a read completes with the bytes it produced.
        read_done / on_read_done(data: &[u8], error: Option<&io::Error>, elapsed: Duration);
        /// Called when a write begins with the bytes offered.
        write_start / on_write_start(data: &[u8]);
        /// Called when a write completes with the number of bytes accepted.
        write_done / on_write_done(data: &[u8], written: usize, error: Option<&io::Error>, elapsed: Duration);
        /// Called exactly once when the transport is closed.
        connection_closed / on_connection_closed(target: &str, error: Option<&NetconfError>);
    }
}

impl ClientTrace {
    /// A bundle that logs connection events through `tracing`.
    ///
    /// Per-operation read and write events are logged at trace level.
    #[must_use]
    pub fn logging() -> Self {
        Self::default()
            .on_connect_start(|target| tracing::info!(target = %target, "Connecting"))
            .on_connect_done(|target, error, elapsed| {
                tracing::info!(
                    target = %target,
                    error = %display_error(error),
                    elapsed = ?elapsed,
                    "Connect done"
                );
            })
            .on_dial_start(|target| tracing::info!(target = %target, "Dialing"))
            .on_dial_done(|target, error, elapsed| {
                tracing::info!(
                    target = %target,
                    error = %display_error(error),
                    elapsed = ?elapsed,
                    "Dial done"
                );
            })
            .on_read_start(|capacity| tracing::trace!(capacity, "Read start"))
            .on_read_done(|data, error, elapsed| {
                tracing::trace!(
                    bytes = data.len(),
                    error = %display_error(error),
                    elapsed = ?elapsed,
                    "Read done"
                );
            })
            .on_write_start(|data| tracing::trace!(bytes = data.len(), "Write start"))
            .on_write_done(|data, written, error, elapsed| {
                tracing::trace!(
                    offered = data.len(),
                    written,
                    error = %display_error(error),
                    elapsed = ?elapsed,
                    "Write done"
                );
            })
            .on_connection_closed(|target, error| {
                tracing::info!(target = %target, error = %display_error(error), "Connection closed");
            })
    }
}
