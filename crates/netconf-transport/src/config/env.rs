//! Environment-based configuration.

use std::collections::HashMap;
use std::time::Duration;

/// Environment configuration prefix.
pub const DEFAULT_PREFIX: &str = "NETCONF";

/// Environment variable reader.
///
/// Values set with [`EnvConfig::with_override`] shadow the process
/// environment, which keeps tests free of global mutation.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    /// Prefix for environment variables.
    prefix: String,
    /// Values that take precedence over the process environment.
    overrides: HashMap<String, String>,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}

impl EnvConfig {
    /// Create a new environment config reader.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            overrides: HashMap::new(),
        }
    }

    /// Shadow one variable (named without the prefix).
    #[must_use]
    pub fn with_override(mut self, name: &str, value: impl Into<String>) -> Self {
        let var_name = self.var_name(name);
        self.overrides.insert(var_name, value.into());
        self
    }

    /// Build the full environment variable name.
    fn var_name(&self, name: &str) -> String {
        if self.prefix.is_empty() {
            name.to_uppercase()
        } else {
            format!("{}_{}", self.prefix, name.to_uppercase())
        }
    }

    /// Get a string value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<String> {
        let var_name = self.var_name(name);
        self.overrides
            .get(&var_name)
            .cloned()
            .or_else(|| std::env::var(&var_name).ok())
    }

    /// Get a parsed value.
    #[must_use]
    pub fn parse<T: std::str::FromStr>(&self, name: &str) -> Option<T> {
        self.get(name).and_then(|v| v.trim().parse().ok())
    }

    /// Get a duration in seconds. Zero reads as unset.
    #[must_use]
    pub fn duration_secs(&self, name: &str) -> Option<Duration> {
        self.parse::<u64>(name)
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

/// Environment variables read by this crate, without the prefix.
pub mod vars {
    /// Session setup timeout in seconds.
    pub const SETUP_TIMEOUT_SECS: &str = "SETUP_TIMEOUT_SECS";
    /// Dial deadline in seconds.
    pub const CONNECT_TIMEOUT_SECS: &str = "CONNECT_TIMEOUT_SECS";
}

/// Get the home directory.
#[must_use]
pub(crate) fn home_dir() -> Option<std::path::PathBuf> {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .ok()
        .map(std::path::PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn var_name_uses_prefix() {
        let env = EnvConfig::new("NETCONF");
        assert_eq!(env.var_name("setup_timeout_secs"), "NETCONF_SETUP_TIMEOUT_SECS");
        assert_eq!(EnvConfig::new("").var_name("x"), "X");
    }

    #[test]
    fn override_shadows_environment() {
        let env = EnvConfig::new("NETCONF_TEST_ONLY").with_override("value", " 7 ");
        assert_eq!(env.get("value").as_deref(), Some(" 7 "));
        assert_eq!(env.parse::<u32>("value"), Some(7));
        assert_eq!(env.duration_secs("value"), Some(Duration::from_secs(7)));
        assert_eq!(env.get("missing"), None);
    }

    #[test]
    fn unparsable_values_are_unset() {
        let env = EnvConfig::new("NETCONF_TEST_ONLY").with_override("value", "soon");
        assert_eq!(env.duration_secs("value"), None);
    }
}
