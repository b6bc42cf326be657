//! Ready-made rustls configurations.
//!
//! All configurations use the ring provider and accept TLS 1.2 and 1.3.
//! Certificate and key material is read from PEM.

use std::path::Path;
use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, WebPkiSupportedAlgorithms};
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, ServerConfig, SignatureScheme};

use crate::error::{NetconfError, Result, TlsError};

fn provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

fn parse_certs(pem: &[u8]) -> Result<Vec<CertificateDer<'static>>> {
    let certs = CertificateDer::pem_slice_iter(pem)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| TlsError::config(format!("invalid certificate PEM: {e}")))?;
    if certs.is_empty() {
        return Err(TlsError::config("no certificates found in PEM").into());
    }
    Ok(certs)
}

fn parse_key(pem: &[u8]) -> Result<PrivateKeyDer<'static>> {
    PrivateKeyDer::from_pem_slice(pem)
        .map_err(|e| TlsError::config(format!("invalid private key PEM: {e}")).into())
}

/// Server configuration presenting `cert_pem` (leaf first) with `key_pem`.
pub fn server_config(cert_pem: &[u8], key_pem: &[u8]) -> Result<Arc<ServerConfig>> {
    let certs = parse_certs(cert_pem)?;
    let key = parse_key(key_pem)?;

    let config = ServerConfig::builder_with_provider(provider())
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(certs, key)?;
    Ok(Arc::new(config))
}

/// [`server_config`] with the material read from files.
pub fn server_config_files(
    cert_file: impl AsRef<Path>,
    key_file: impl AsRef<Path>,
) -> Result<Arc<ServerConfig>> {
    let read = |path: &Path| {
        std::fs::read(path)
            .map_err(|e| NetconfError::io_context(format!("reading {}", path.display()), e))
    };
    let cert_pem = read(cert_file.as_ref())?;
    let key_pem = read(key_file.as_ref())?;
    server_config(&cert_pem, &key_pem)
}

/// Client configuration trusting only the CA certificates in `ca_pem`.
pub fn client_config(ca_pem: &[u8]) -> Result<Arc<ClientConfig>> {
    let mut roots = RootCertStore::empty();
    for cert in parse_certs(ca_pem)? {
        roots.add(cert)?;
    }

    let config = ClientConfig::builder_with_provider(provider())
        .with_safe_default_protocol_versions()?
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(Arc::new(config))
}

/// Client configuration that accepts any server certificate.
///
/// Handshake signatures are still checked; only the chain and name are not.
/// Suitable for tests and lab devices with self-signed certificates.
pub fn insecure_client_config() -> Result<Arc<ClientConfig>> {
    let provider = provider();
    let verifier = AcceptAnyServerCert {
        algorithms: provider.signature_verification_algorithms,
    };

    let config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(verifier))
        .with_no_client_auth();
    Ok(Arc::new(config))
}

#[derive(Debug)]
struct AcceptAnyServerCert {
    algorithms: WebPkiSupportedAlgorithms,
}

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        tracing::warn!(server = ?server_name, "Accepting server certificate without verification");
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}

/// A generated certificate and its private key, both PEM encoded.
#[derive(Debug, Clone)]
pub struct SelfSignedCert {
    /// The certificate.
    pub cert_pem: String,
    /// The PKCS#8 private key.
    pub key_pem: String,
}

impl SelfSignedCert {
    /// A server configuration presenting this certificate.
    pub fn server_config(&self) -> Result<Arc<ServerConfig>> {
        server_config(self.cert_pem.as_bytes(), self.key_pem.as_bytes())
    }

    /// A client configuration trusting only this certificate.
    pub fn client_config(&self) -> Result<Arc<ClientConfig>> {
        client_config(self.cert_pem.as_bytes())
    }
}

/// Generate a self-signed server certificate for `localhost`.
///
/// Intended for tests and local experiments.
pub fn generate_self_signed() -> Result<SelfSignedCert> {
    use rcgen::{
        CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, KeyPair,
        KeyUsagePurpose,
    };

    let rcgen_err = |e: rcgen::Error| TlsError::config(format!("certificate generation failed: {e}"));

    let mut params = CertificateParams::new(vec!["localhost".to_string()]).map_err(rcgen_err)?;
    let mut name = DistinguishedName::new();
    name.push(DnType::OrganizationName, "NETCONF Test");
    name.push(DnType::CommonName, "localhost");
    params.distinguished_name = name;
    params.key_usages = vec![
        KeyUsagePurpose::DigitalSignature,
        KeyUsagePurpose::KeyEncipherment,
    ];
    params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];

    let key_pair = KeyPair::generate().map_err(rcgen_err)?;
    let cert = params.self_signed(&key_pair).map_err(rcgen_err)?;

    Ok(SelfSignedCert {
        cert_pem: cert.pem(),
        key_pem: key_pair.serialize_pem(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_signed_material_builds_both_sides() {
        let generated = generate_self_signed().unwrap();
        assert!(generated.cert_pem.starts_with("-----BEGIN CERTIFICATE-----"));
        assert!(generated.key_pem.contains("PRIVATE KEY"));

        generated.server_config().unwrap();
        generated.client_config().unwrap();
    }

    #[test]
    fn garbage_pem_is_a_config_error() {
        let err = server_config(b"not pem", b"not pem").unwrap_err();
        assert!(matches!(err, NetconfError::Tls(TlsError::Config { .. })));

        let err = client_config(b"").unwrap_err();
        assert!(err.to_string().contains("no certificates"));
    }

    #[test]
    fn missing_files_name_the_path() {
        let err = server_config_files("/nonexistent/cert.pem", "/nonexistent/key.pem").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/cert.pem"));
    }

    #[test]
    fn insecure_config_installs_custom_verifier() {
        let config = insecure_client_config().unwrap();
        assert!(config.alpn_protocols.is_empty());
    }
}
