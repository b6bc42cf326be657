//! File-based configuration loading.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use super::Config;
use crate::error::{NetconfError, Result};

/// On-disk shape of [`Config`].
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    setup_timeout_secs: Option<u64>,
    connect_timeout_secs: Option<u64>,
}

fn secs(value: Option<u64>) -> Option<Duration> {
    value.filter(|secs| *secs > 0).map(Duration::from_secs)
}

impl From<ConfigFile> for Config {
    fn from(file: ConfigFile) -> Self {
        Self {
            setup_timeout: secs(file.setup_timeout_secs),
            connect_timeout: secs(file.connect_timeout_secs),
        }
    }
}

impl Config {
    /// Parse a TOML document.
    ///
    /// ```
    /// use std::time::Duration;
    /// use netconf_transport::Config;
    ///
    /// let config = Config::from_toml_str("setup_timeout_secs = 10").unwrap();
    /// assert_eq!(config.setup_timeout, Some(Duration::from_secs(10)));
    /// ```
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(content)
            .map_err(|e| NetconfError::config(format!("invalid config: {e}")))?;
        Ok(file.into())
    }

    /// Load a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| NetconfError::io_context(format!("reading {}", path.display()), e))?;
        Self::from_toml_str(&content)
    }
}
