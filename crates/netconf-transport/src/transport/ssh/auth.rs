//! SSH client credentials, host key policy and authentication.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use russh::client;
use russh::keys::{HashAlg, PrivateKey, PrivateKeyWithHashAlg, PublicKey};

use crate::error::{NetconfError, Result, SshError};

/// SSH authentication method.
#[derive(Debug, Clone)]
pub enum AuthMethod {
    /// Password authentication.
    Password(String),
    /// Public key authentication with a key file.
    PublicKey {
        /// Private key path.
        private_key: PathBuf,
        /// Passphrase for the key (if encrypted).
        passphrase: Option<String>,
    },
    /// Public key authentication with a key already in memory.
    Key(Arc<PrivateKey>),
    /// SSH agent authentication.
    Agent,
    /// The `none` method, for servers that need no credentials.
    None,
}

impl AuthMethod {
    /// Create password auth.
    #[must_use]
    pub fn password(password: impl Into<String>) -> Self {
        Self::Password(password.into())
    }

    /// Create public key auth.
    #[must_use]
    pub fn public_key(private_key: impl Into<PathBuf>) -> Self {
        Self::PublicKey {
            private_key: private_key.into(),
            passphrase: None,
        }
    }

    /// Create public key auth with passphrase.
    #[must_use]
    pub fn public_key_with_passphrase(
        private_key: impl Into<PathBuf>,
        passphrase: impl Into<String>,
    ) -> Self {
        Self::PublicKey {
            private_key: private_key.into(),
            passphrase: Some(passphrase.into()),
        }
    }

    /// Check if this is password auth.
    #[must_use]
    pub const fn is_password(&self) -> bool {
        matches!(self, Self::Password(_))
    }

    /// Check if this is public key auth.
    #[must_use]
    pub const fn is_public_key(&self) -> bool {
        matches!(self, Self::PublicKey { .. } | Self::Key(_))
    }
}

/// SSH credentials.
#[derive(Debug, Clone)]
pub struct SshCredentials {
    /// Username.
    pub username: String,
    /// Authentication methods to try (in order).
    pub auth_methods: Vec<AuthMethod>,
}

impl SshCredentials {
    /// Create new credentials.
    #[must_use]
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            auth_methods: Vec::new(),
        }
    }

    /// Add an authentication method.
    #[must_use]
    pub fn with_auth(mut self, method: AuthMethod) -> Self {
        self.auth_methods.push(method);
        self
    }

    /// Add password authentication.
    #[must_use]
    pub fn with_password(self, password: impl Into<String>) -> Self {
        self.with_auth(AuthMethod::password(password))
    }

    /// Add public key authentication.
    #[must_use]
    pub fn with_key(self, private_key: impl Into<PathBuf>) -> Self {
        self.with_auth(AuthMethod::public_key(private_key))
    }

    /// Add agent authentication.
    #[must_use]
    pub fn with_agent(self) -> Self {
        self.with_auth(AuthMethod::Agent)
    }
}

/// Host key verification policy.
///
/// # Security
///
/// The default policy is `KnownHosts`. Call Home managers usually know the
/// device key up front and use `Pinned`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[non_exhaustive]
pub enum HostKeyVerification {
    /// Accept all keys without verification.
    ///
    /// **DANGEROUS:** only available with the `insecure-skip-verify` feature.
    #[cfg(feature = "insecure-skip-verify")]
    AcceptAll,
    /// Reject every key.
    RejectUnknown,
    /// Check against the `known_hosts` file (`$SSH_KNOWN_HOSTS` or `~/.ssh/known_hosts`).
    #[default]
    KnownHosts,
    /// Accept exactly this key.
    Pinned(PublicKey),
}

/// Everything the SSH initiator needs besides the TCP stream.
#[derive(Debug, Clone)]
pub struct SshClientConfig {
    /// Credentials.
    pub credentials: SshCredentials,
    /// Host key verification policy.
    pub host_key_verification: HostKeyVerification,
    /// Protocol-level settings (algorithms, keepalive, window sizes).
    pub russh: Arc<client::Config>,
}

impl SshClientConfig {
    /// Create a configuration with default protocol settings.
    #[must_use]
    pub fn new(credentials: SshCredentials) -> Self {
        Self {
            credentials,
            host_key_verification: HostKeyVerification::default(),
            russh: Arc::new(client::Config::default()),
        }
    }

    /// Shorthand for username/password credentials.
    #[must_use]
    pub fn password(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::new(SshCredentials::new(username).with_password(password))
    }

    /// Set the host key policy.
    #[must_use]
    pub fn host_key_verification(mut self, policy: HostKeyVerification) -> Self {
        self.host_key_verification = policy;
        self
    }

    /// Set the protocol-level settings.
    #[must_use]
    pub fn russh_config(mut self, config: Arc<client::Config>) -> Self {
        self.russh = config;
        self
    }

    /// The username.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.credentials.username
    }
}

/// russh client handler that applies a [`HostKeyVerification`] policy.
#[derive(Debug)]
pub struct ClientHandler {
    policy: HostKeyVerification,
    host: String,
    port: u16,
}

impl ClientHandler {
    /// Verify the key of the server dialed at `target` (`host:port`).
    pub(crate) fn for_target(policy: HostKeyVerification, target: &str) -> Self {
        let (host, port) = split_target(target);
        Self { policy, host, port }
    }

    /// Verify the key under a bare host name, with no port.
    ///
    /// Call Home peers connect from an ephemeral port, so their keys are
    /// recorded under the address or an alias alone.
    pub(crate) fn for_host(policy: HostKeyVerification, host: impl Into<String>) -> Self {
        Self {
            policy,
            host: host.into(),
            port: 22,
        }
    }
}

impl client::Handler for ClientHandler {
    type Error = russh::Error;

    async fn check_server_key(&mut self, server_public_key: &PublicKey) -> std::result::Result<bool, Self::Error> {
        match &self.policy {
            #[cfg(feature = "insecure-skip-verify")]
            HostKeyVerification::AcceptAll => {
                tracing::warn!(
                    host = %self.host,
                    "Accepting server key without verification (INSECURE)"
                );
                Ok(true)
            }
            HostKeyVerification::RejectUnknown => {
                tracing::debug!(host = %self.host, "Rejecting host key");
                Ok(false)
            }
            HostKeyVerification::KnownHosts => Ok(check_known_hosts_file(
                &known_hosts_path(),
                &self.host,
                self.port,
                server_public_key,
            )),
            HostKeyVerification::Pinned(expected) => {
                let matched = keys_match(expected, server_public_key);
                if !matched {
                    tracing::error!(
                        host = %self.host,
                        presented = %server_public_key.fingerprint(HashAlg::Sha256),
                        "Host key does not match pinned key"
                    );
                }
                Ok(matched)
            }
        }
    }
}

/// Split `host:port`, tolerating bracketed IPv6 and a missing port.
fn split_target(target: &str) -> (String, u16) {
    match target.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() => {
            let host = host.trim_start_matches('[').trim_end_matches(']');
            (host.to_string(), port.parse().unwrap_or(22))
        }
        _ => (target.to_string(), 22),
    }
}

/// Outcome of looking a host up in `known_hosts` content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KnownHostsMatch {
    Match,
    Mismatch,
    NotFound,
}

fn check_known_hosts_file(path: &Path, host: &str, port: u16, key: &PublicKey) -> bool {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            tracing::warn!(
                host = %host,
                path = %path.display(),
                error = %e,
                "Cannot read known_hosts file, rejecting key"
            );
            return false;
        }
    };

    match lookup_known_hosts(&contents, host, port, key) {
        KnownHostsMatch::Match => {
            tracing::debug!(host = %host, "Host key verified against known_hosts");
            true
        }
        KnownHostsMatch::Mismatch => {
            tracing::error!(host = %host, "HOST KEY MISMATCH! Possible man-in-the-middle attack!");
            false
        }
        KnownHostsMatch::NotFound => {
            tracing::warn!(host = %host, "Host not found in known_hosts file");
            false
        }
    }
}

fn lookup_known_hosts(contents: &str, host: &str, port: u16, key: &PublicKey) -> KnownHostsMatch {
    // OpenSSH writes "[host]:port" for anything but port 22.
    let host_pattern = if port == 22 {
        host.to_string()
    } else {
        format!("[{host}]:{port}")
    };

    for line in contents.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') || line.starts_with('@') {
            continue;
        }

        let mut parts = line.split_whitespace();
        let (Some(hostnames), Some(_key_type), Some(key_data)) =
            (parts.next(), parts.next(), parts.next())
        else {
            continue;
        };

        if !hostnames.split(',').any(|h| h == host_pattern || h == "*") {
            continue;
        }

        match russh::keys::parse_public_key_base64(key_data) {
            Ok(stored) if keys_match(&stored, key) => return KnownHostsMatch::Match,
            Ok(_) => return KnownHostsMatch::Mismatch,
            Err(e) => tracing::debug!(error = %e, "Unparsable key in known_hosts"),
        }
    }

    KnownHostsMatch::NotFound
}

/// Compare two public keys by SHA-256 fingerprint.
fn keys_match(stored: &PublicKey, server: &PublicKey) -> bool {
    stored.fingerprint(HashAlg::Sha256) == server.fingerprint(HashAlg::Sha256)
}

fn known_hosts_path() -> PathBuf {
    if let Ok(path) = std::env::var("SSH_KNOWN_HOSTS") {
        return PathBuf::from(path);
    }
    crate::config::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".ssh")
        .join("known_hosts")
}

/// Load a private key from a file, decrypting it with `passphrase` if given.
pub async fn load_private_key(path: &Path, passphrase: Option<&str>) -> Result<Arc<PrivateKey>> {
    let key_str = tokio::fs::read_to_string(path).await.map_err(|e| {
        NetconfError::io_context(format!("reading key file {}", path.display()), e)
    })?;

    let key = russh::keys::decode_secret_key(&key_str, passphrase).map_err(|e| {
        NetconfError::config(format!("failed to decode key {}: {e}", path.display()))
    })?;

    Ok(Arc::new(key))
}

/// Try each configured method in order until one succeeds.
pub(crate) async fn authenticate<H: client::Handler>(
    handle: &mut client::Handle<H>,
    credentials: &SshCredentials,
) -> Result<()> {
    let username = &credentials.username;

    for method in &credentials.auth_methods {
        let outcome = match method {
            AuthMethod::Password(password) => {
                tracing::debug!(user = %username, "Attempting password authentication");
                handle
                    .authenticate_password(username, password)
                    .await
                    .map(|r| r.success())
            }
            AuthMethod::PublicKey {
                private_key,
                passphrase,
            } => match load_private_key(private_key, passphrase.as_deref()).await {
                Ok(key) => authenticate_key(handle, username, key).await,
                Err(e) => {
                    tracing::debug!(
                        user = %username,
                        key = %private_key.display(),
                        error = %e,
                        "Failed to load private key"
                    );
                    Ok(false)
                }
            },
            AuthMethod::Key(key) => authenticate_key(handle, username, Arc::clone(key)).await,
            AuthMethod::Agent => authenticate_agent(handle, username).await,
            AuthMethod::None => handle.authenticate_none(username).await.map(|r| r.success()),
        };

        match outcome {
            Ok(true) => {
                tracing::info!(user = %username, "SSH authentication successful");
                return Ok(());
            }
            Ok(false) => tracing::debug!(user = %username, "Authentication method rejected"),
            Err(e) => tracing::debug!(user = %username, error = %e, "Authentication error"),
        }
    }

    Err(SshError::Authentication {
        user: username.clone(),
        reason: "all authentication methods failed".to_string(),
    }
    .into())
}

async fn authenticate_key<H: client::Handler>(
    handle: &mut client::Handle<H>,
    username: &str,
    key: Arc<PrivateKey>,
) -> std::result::Result<bool, russh::Error> {
    tracing::debug!(user = %username, "Attempting public key authentication");
    // best_supported_rsa_hash returns Result<Option<Option<HashAlg>>, _>
    let rsa_hash = handle
        .best_supported_rsa_hash()
        .await
        .ok()
        .flatten()
        .flatten();
    handle
        .authenticate_publickey(username, PrivateKeyWithHashAlg::new(key, rsa_hash))
        .await
        .map(|r| r.success())
}

#[cfg(unix)]
async fn authenticate_agent<H: client::Handler>(
    handle: &mut client::Handle<H>,
    username: &str,
) -> std::result::Result<bool, russh::Error> {
    tracing::debug!(user = %username, "Attempting SSH agent authentication");
    let mut agent = match russh::keys::agent::client::AgentClient::connect_env().await {
        Ok(agent) => agent,
        Err(e) => {
            tracing::debug!(user = %username, error = %e, "Failed to connect to SSH agent");
            return Ok(false);
        }
    };
    let keys = match agent.request_identities().await {
        Ok(keys) => keys,
        Err(e) => {
            tracing::debug!(user = %username, error = %e, "Failed to list agent identities");
            return Ok(false);
        }
    };

    for key in keys {
        let rsa_hash = handle
            .best_supported_rsa_hash()
            .await
            .ok()
            .flatten()
            .flatten();
        match handle
            .authenticate_publickey_with(username, key.clone(), rsa_hash, &mut agent)
            .await
        {
            Ok(result) if result.success() => return Ok(true),
            Ok(_) => {}
            Err(e) => tracing::debug!(user = %username, error = %e, "SSH agent key failed"),
        }
    }
    Ok(false)
}

#[cfg(not(unix))]
async fn authenticate_agent<H: client::Handler>(
    _handle: &mut client::Handle<H>,
    username: &str,
) -> std::result::Result<bool, russh::Error> {
    tracing::debug!(user = %username, "SSH agent authentication is only supported on Unix");
    Ok(false)
}
