//! TLS layer.
//!
//! One `rustls` server configuration is built at startup from the PEM
//! material in [`TlsSettings`]. With mutual TLS enabled, client
//! certificates must chain to the configured CA bundle (rustls bounds the
//! chain internally) and the peer's subject DN is matched against the
//! allow-list after the handshake.

use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

use hestia_core::HestiaError;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::RootCertStore;
use tokio_rustls::TlsAcceptor;
use x509_parser::prelude::FromDer;
use x509_parser::certificate::X509Certificate;

use crate::config::TlsSettings;

/// Builds the shared TLS acceptor from the configured PEM files.
///
/// # Errors
///
/// Returns [`HestiaError::Tls`] when the certificate chain, key or CA
/// bundle cannot be loaded.
pub(crate) fn build_acceptor(settings: &TlsSettings) -> Result<TlsAcceptor, HestiaError> {
    if settings.key_password.is_some() {
        return Err(HestiaError::Tls(
            "encrypted private keys are not supported; decrypt the key file first".to_string(),
        ));
    }

    let certs = load_certs(settings.cert_path.as_path())?;
    let key = load_key(settings.key_path.as_path())?;

    let builder = rustls::ServerConfig::builder();
    let config = match &settings.client_auth {
        Some(client_auth) => {
            let mut roots = RootCertStore::empty();
            for cert in load_certs(client_auth.ca_path.as_path())? {
                roots
                    .add(cert)
                    .map_err(|err| HestiaError::Tls(format!("bad CA certificate: {err}")))?;
            }
            let verifier = WebPkiClientVerifier::builder(Arc::new(roots))
                .build()
                .map_err(|err| HestiaError::Tls(format!("client verifier: {err}")))?;
            builder.with_client_cert_verifier(verifier)
        }
        None => builder.with_no_client_auth(),
    }
    .with_single_cert(certs, key)
    .map_err(|err| HestiaError::Tls(format!("bad certificate/key pair: {err}")))?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}

fn load_certs(path: &std::path::Path) -> Result<Vec<CertificateDer<'static>>, HestiaError> {
    let file = File::open(path)
        .map_err(|err| HestiaError::Tls(format!("cannot open {}: {err}", path.display())))?;
    let certs: Result<Vec<_>, _> = rustls_pemfile::certs(&mut BufReader::new(file)).collect();
    let certs =
        certs.map_err(|err| HestiaError::Tls(format!("bad PEM in {}: {err}", path.display())))?;
    if certs.is_empty() {
        return Err(HestiaError::Tls(format!(
            "no certificates found in {}",
            path.display()
        )));
    }
    Ok(certs)
}

fn load_key(path: &std::path::Path) -> Result<PrivateKeyDer<'static>, HestiaError> {
    let file = File::open(path)
        .map_err(|err| HestiaError::Tls(format!("cannot open {}: {err}", path.display())))?;
    rustls_pemfile::private_key(&mut BufReader::new(file))
        .map_err(|err| HestiaError::Tls(format!("bad PEM in {}: {err}", path.display())))?
        .ok_or_else(|| {
            HestiaError::Tls(format!("no private key found in {}", path.display()))
        })
}

/// Extracts the subject DN from a verified peer certificate when it
/// appears in the allow-list.
pub(crate) fn allowed_peer_dn(
    peer_certs: Option<&[CertificateDer<'_>]>,
    allowed: &[String],
) -> Option<String> {
    let leaf = peer_certs?.first()?;
    let (_, parsed) = X509Certificate::from_der(leaf.as_ref()).ok()?;
    let dn = parsed.subject().to_string();
    allowed.iter().any(|entry| entry == &dn).then_some(dn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TlsSettings;

    #[test]
    fn test_missing_files_are_tls_errors() {
        let settings = TlsSettings {
            cert_path: "/nonexistent/cert.pem".into(),
            key_path: "/nonexistent/key.pem".into(),
            key_password: None,
            client_auth: None,
        };
        assert!(matches!(
            build_acceptor(&settings),
            Err(HestiaError::Tls(_))
        ));
    }

    #[test]
    fn test_key_password_rejected() {
        let settings = TlsSettings {
            cert_path: "/tmp/cert.pem".into(),
            key_path: "/tmp/key.pem".into(),
            key_password: Some("secret".to_string()),
            client_auth: None,
        };
        let err = match build_acceptor(&settings) {
            Err(e) => e,
            Ok(_) => panic!("expected build_acceptor to fail"),
        };
        assert!(err.to_string().contains("encrypted private keys"));
    }

    #[test]
    fn test_dn_matching_requires_listed_subject() {
        assert!(allowed_peer_dn(None, &["CN=x".to_string()]).is_none());
        assert!(allowed_peer_dn(Some(&[]), &["CN=x".to_string()]).is_none());
    }
}
