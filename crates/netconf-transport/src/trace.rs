//! Connection lifecycle instrumentation.
//!
//! Each component that reports events takes a trace bundle: a record of
//! named callback slots. Every slot starts out as a no-op, so a bundle built
//! with `Default` (or obtained from [`ClientTrace::noop`] and friends) can be
//! invoked without any presence check. Callers replace individual slots with
//! the `on_*` builder methods; untouched slots keep their no-op.
//!
//! Bundles are immutable once built and are shared behind `Arc`, so a single
//! bundle may observe many connections concurrently.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use netconf_transport::trace::ClientTrace;
//! use netconf_transport::DialContext;
//!
//! let trace = ClientTrace::default()
//!     .on_connect_start(|target| println!("connecting to {target}"));
//! let ctx = DialContext::new().with_client_trace(Arc::new(trace));
//! # let _ = ctx;
//! ```

/// Declare a trace bundle: a struct of `Arc<dyn Fn>` slots with no-op
/// defaults, one `on_*` setter and one invoking method per slot.
macro_rules! trace_bundle {
    (
        $(#[$meta:meta])*
        pub struct $name:ident {
            $(
                $(#[$slot_meta:meta])*
                $slot:ident / $setter:ident ( $($arg:ident : $ty:ty),* );
            )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone)]
        pub struct $name {
            $( $slot: std::sync::Arc<dyn Fn($($ty),*) + Send + Sync>, )*
        }

        impl Default for $name {
            fn default() -> Self {
                Self {
                    $( $slot: std::sync::Arc::new(|$(_: $ty),*| {}), )*
                }
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_struct(stringify!($name)).finish_non_exhaustive()
            }
        }

        impl $name {
            /// The shared bundle whose every slot does nothing.
            #[must_use]
            pub fn noop() -> std::sync::Arc<Self> {
                static NOOP: std::sync::LazyLock<std::sync::Arc<$name>> =
                    std::sync::LazyLock::new(|| std::sync::Arc::new($name::default()));
                std::sync::Arc::clone(&NOOP)
            }

            $(
                $(#[$slot_meta])*
                pub fn $slot(&self, $($arg: $ty),*) {
                    (self.$slot)($($arg),*);
                }

                #[doc = concat!("Replace the `", stringify!($slot), "` hook.")]
                #[must_use]
                pub fn $setter<F>(mut self, hook: F) -> Self
                where
                    F: Fn($($ty),*) + Send + Sync + 'static,
                {
                    self.$slot = std::sync::Arc::new(hook);
                    self
                }
            )*
        }
    };
}

mod callhome;
mod client;
mod server;

pub use callhome::{CallHomeClientTrace, CallHomeServerTrace};
pub use client::ClientTrace;
pub use server::TlsServerTrace;

/// Negotiated parameters of a completed TLS handshake.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TlsInfo {
    /// Negotiated protocol version.
    pub protocol: Option<rustls::ProtocolVersion>,
    /// Negotiated cipher suite.
    pub cipher_suite: Option<rustls::CipherSuite>,
}

impl TlsInfo {
    pub(crate) fn from_state(state: &rustls::CommonState) -> Self {
        Self {
            protocol: state.protocol_version(),
            cipher_suite: state.negotiated_cipher_suite().map(|s| s.suite()),
        }
    }
}

/// Render an optional error for log output.
pub(crate) fn display_error<E: std::fmt::Display + ?Sized>(error: Option<&E>) -> String {
    error.map_or_else(|| "none".to_string(), ToString::to_string)
}
