//! Configuration handed to the session factory.
//!
//! [`Config`] is an optional-fields record. Fields left as `None` by the
//! caller inherit the matching field of [`Config::DEFAULT`]; fields the caller
//! set are kept. The merge is spelled out per field in
//! [`Config::merge_defaults`] and runs once, when a session is created.
//!
//! Configuration can also be read from a TOML file ([`Config::from_file`]) or
//! from `NETCONF_*` environment variables ([`Config::from_env`]). In both
//! sources a value of `0` means "unset".

mod env;
mod file;

use std::time::Duration;

pub use env::{DEFAULT_PREFIX, EnvConfig, vars};
pub(crate) use env::home_dir;

/// Default time allowed for the session layer's hello exchange.
pub const DEFAULT_SETUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Session configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Config {
    /// Time allowed for the session layer to complete its setup.
    pub setup_timeout: Option<Duration>,

    /// Dial deadline applied by the session factory when the context has none.
    ///
    /// Only TLS handshakes observe deadlines.
    pub connect_timeout: Option<Duration>,
}

impl Config {
    /// The process-wide defaults that unset fields are resolved against.
    pub const DEFAULT: Self = Self {
        setup_timeout: Some(DEFAULT_SETUP_TIMEOUT),
        connect_timeout: None,
    };

    /// Create a configuration with every field unset.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            setup_timeout: None,
            connect_timeout: None,
        }
    }

    /// Set the setup timeout.
    #[must_use]
    pub const fn setup_timeout(mut self, timeout: Duration) -> Self {
        self.setup_timeout = Some(timeout);
        self
    }

    /// Set the connect timeout.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Fill every unset field from `defaults`.
    #[must_use]
    pub const fn merge_defaults(self, defaults: &Self) -> Self {
        Self {
            setup_timeout: match self.setup_timeout {
                Some(timeout) => Some(timeout),
                None => defaults.setup_timeout,
            },
            connect_timeout: match self.connect_timeout {
                Some(timeout) => Some(timeout),
                None => defaults.connect_timeout,
            },
        }
    }

    /// Merge against [`Config::DEFAULT`].
    #[must_use]
    pub const fn resolved(self) -> Self {
        self.merge_defaults(&Self::DEFAULT)
    }

    /// The setup timeout, falling back to [`DEFAULT_SETUP_TIMEOUT`].
    #[must_use]
    pub fn effective_setup_timeout(&self) -> Duration {
        self.setup_timeout.unwrap_or(DEFAULT_SETUP_TIMEOUT)
    }

    /// Read `NETCONF_SETUP_TIMEOUT_SECS` and `NETCONF_CONNECT_TIMEOUT_SECS`.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_env_config(&EnvConfig::default())
    }

    /// Read the configuration through a specific environment reader.
    #[must_use]
    pub fn from_env_config(env: &EnvConfig) -> Self {
        Self {
            setup_timeout: env.duration_secs(vars::SETUP_TIMEOUT_SECS),
            connect_timeout: env.duration_secs(vars::CONNECT_TIMEOUT_SECS),
        }
    }
}
