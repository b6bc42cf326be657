//! The context passed explicitly through every dial and accept.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, Timeout, timeout_at};

use crate::trace::{CallHomeClientTrace, CallHomeServerTrace, ClientTrace, TlsServerTrace};

/// A point in time after which a bounded operation gives up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    /// The deadline instant.
    deadline: Instant,
}

impl Deadline {
    /// Create a new deadline from now.
    #[must_use]
    pub fn from_now(duration: Duration) -> Self {
        Self {
            deadline: Instant::now() + duration,
        }
    }

    /// Create a deadline at a fixed instant.
    #[must_use]
    pub const fn at(deadline: Instant) -> Self {
        Self { deadline }
    }

    /// The deadline instant.
    #[must_use]
    pub const fn instant(&self) -> Instant {
        self.deadline
    }

    /// Check if the deadline has passed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    /// Get the remaining time until the deadline.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Apply this deadline to a future.
    pub fn apply<F: Future>(&self, future: F) -> Timeout<F> {
        timeout_at(self.deadline, future)
    }
}

/// Per-call context: an optional deadline plus the trace bundles.
///
/// Cloning is cheap. A context built with [`DialContext::new`] carries no
/// deadline and the shared no-op bundle for every role, so components can
/// always invoke their hooks directly.
#[derive(Debug, Clone)]
pub struct DialContext {
    deadline: Option<Deadline>,
    client_trace: Arc<ClientTrace>,
    callhome_client_trace: Arc<CallHomeClientTrace>,
    callhome_server_trace: Arc<CallHomeServerTrace>,
    server_trace: Arc<TlsServerTrace>,
}

impl Default for DialContext {
    fn default() -> Self {
        Self {
            deadline: None,
            client_trace: ClientTrace::noop(),
            callhome_client_trace: CallHomeClientTrace::noop(),
            callhome_server_trace: CallHomeServerTrace::noop(),
            server_trace: TlsServerTrace::noop(),
        }
    }
}

impl DialContext {
    /// Create a context with no deadline and no-op traces.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the deadline.
    #[must_use]
    pub const fn with_deadline(mut self, deadline: Deadline) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Set the deadline to `duration` from now.
    #[must_use]
    pub fn with_timeout(self, duration: Duration) -> Self {
        self.with_deadline(Deadline::from_now(duration))
    }

    /// Attach the client transport trace.
    #[must_use]
    pub fn with_client_trace(mut self, trace: Arc<ClientTrace>) -> Self {
        self.client_trace = trace;
        self
    }

    /// Attach the Call Home listener trace.
    #[must_use]
    pub fn with_callhome_client_trace(mut self, trace: Arc<CallHomeClientTrace>) -> Self {
        self.callhome_client_trace = trace;
        self
    }

    /// Attach the Call Home dialer trace.
    #[must_use]
    pub fn with_callhome_server_trace(mut self, trace: Arc<CallHomeServerTrace>) -> Self {
        self.callhome_server_trace = trace;
        self
    }

    /// Attach the TLS server trace.
    #[must_use]
    pub fn with_server_trace(mut self, trace: Arc<TlsServerTrace>) -> Self {
        self.server_trace = trace;
        self
    }

    /// The deadline, if any.
    #[must_use]
    pub const fn deadline(&self) -> Option<&Deadline> {
        self.deadline.as_ref()
    }

    /// The client transport trace.
    #[must_use]
    pub fn client_trace(&self) -> &Arc<ClientTrace> {
        &self.client_trace
    }

    /// The Call Home listener trace.
    #[must_use]
    pub fn callhome_client_trace(&self) -> &Arc<CallHomeClientTrace> {
        &self.callhome_client_trace
    }

    /// The Call Home dialer trace.
    #[must_use]
    pub fn callhome_server_trace(&self) -> &Arc<CallHomeServerTrace> {
        &self.callhome_server_trace
    }

    /// The TLS server trace.
    #[must_use]
    pub fn server_trace(&self) -> &Arc<TlsServerTrace> {
        &self.server_trace
    }
}
