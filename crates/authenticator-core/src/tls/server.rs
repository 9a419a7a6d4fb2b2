//! TLS server acceptor for inbound client connections.
//!
//! Wraps accepted TCP connections in TLS using a [`ServerTlsConfig`] and
//! exposes the peer certificates of the completed handshake for
//! certificate authentication.

use std::sync::Arc;

use rustls::crypto::ring::default_provider;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio::net::TcpStream;
use tokio_rustls::server::TlsStream;
use tokio_rustls::TlsAcceptor as TokioTlsAcceptor;
use tracing::{debug, warn};

use super::cert_config::ServerTlsConfig;
use crate::auth::TlsConnectionState;
use crate::error::{TlsError, TlsResult};

/// Install the ring crypto provider as the process default if none is
/// installed yet, and return the process default.
pub(crate) fn crypto_provider() -> Arc<CryptoProvider> {
    // Another provider may already be installed; use whichever won.
    let _ = CryptoProvider::install_default(default_provider());
    CryptoProvider::get_default()
        .cloned()
        .unwrap_or_else(|| Arc::new(default_provider()))
}

/// TLS acceptor for inbound client connections.
#[derive(Clone)]
pub struct TlsServerAcceptor {
    inner: TokioTlsAcceptor,
    config: ServerTlsConfig,
}

impl std::fmt::Debug for TlsServerAcceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsServerAcceptor")
            .field("client_auth", &self.config.client_auth())
            .finish_non_exhaustive()
    }
}

impl TlsServerAcceptor {
    /// Create an acceptor for a built configuration.
    pub fn new(config: &ServerTlsConfig) -> Self {
        Self {
            inner: TokioTlsAcceptor::from(config.server_config()),
            config: config.clone(),
        }
    }

    pub fn config(&self) -> &ServerTlsConfig {
        &self.config
    }

    /// Accept a TLS connection from a client.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS handshake fails, including when the client
    /// certificate is missing or untrusted under the configured client-auth
    /// mode.
    pub async fn accept(&self, stream: TcpStream) -> TlsResult<TlsStream<TcpStream>> {
        let peer = stream.peer_addr().ok();
        debug!(peer = ?peer, "accepting TLS connection from client");

        self.inner.accept(stream).await.map_err(|e| {
            warn!(peer = ?peer, error = %e, "TLS handshake failed");
            TlsError::Handshake(e.to_string())
        })
    }

    /// Peer certificates of an accepted connection.
    pub fn connection_state(stream: &TlsStream<TcpStream>) -> TlsConnectionState<'_> {
        let (_, connection) = stream.get_ref();
        TlsConnectionState::from_server_connection(connection)
    }
}

/// Parse every certificate in a PEM buffer.
///
/// `source` names the input in errors and logs.
///
/// # Errors
///
/// Returns `TlsError::NoCertificates` if the buffer holds no valid certificate.
pub fn load_certificates(pem: &[u8], source: &str) -> TlsResult<Vec<CertificateDer<'static>>> {
    let mut reader = pem;
    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut reader)
        .filter_map(|result| match result {
            Ok(cert) => Some(cert),
            Err(e) => {
                warn!(source, error = %e, "skipping invalid certificate");
                None
            }
        })
        .collect();

    if certs.is_empty() {
        return Err(TlsError::NoCertificates(source.to_string()));
    }

    debug!(count = certs.len(), source, "loaded certificates");
    Ok(certs)
}

/// Parse the first private key in a PEM buffer (PKCS#1, PKCS#8 or SEC1).
///
/// # Errors
///
/// Returns `TlsError::NoPrivateKeys` if the buffer holds no key, or
/// `TlsError::PrivateKeyLoad` if the PEM is malformed.
pub fn load_private_key(pem: &[u8], source: &str) -> TlsResult<PrivateKeyDer<'static>> {
    let mut reader = pem;

    loop {
        match rustls_pemfile::read_one(&mut reader) {
            Ok(Some(rustls_pemfile::Item::Pkcs1Key(key))) => {
                debug!(source, "loaded PKCS#1 RSA private key");
                return Ok(PrivateKeyDer::Pkcs1(key));
            }
            Ok(Some(rustls_pemfile::Item::Pkcs8Key(key))) => {
                debug!(source, "loaded PKCS#8 private key");
                return Ok(PrivateKeyDer::Pkcs8(key));
            }
            Ok(Some(rustls_pemfile::Item::Sec1Key(key))) => {
                debug!(source, "loaded SEC1 EC private key");
                return Ok(PrivateKeyDer::Sec1(key));
            }
            // Certificates and other items may share the file.
            Ok(Some(_)) => continue,
            Ok(None) => break,
            Err(e) => {
                return Err(TlsError::PrivateKeyLoad {
                    path: source.to_string(),
                    message: e.to_string(),
                });
            }
        }
    }

    Err(TlsError::NoPrivateKeys(source.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientAuthType;
    use crate::tls::CertConfig;
    use rcgen::{CertificateParams, KeyPair};

    fn identity() -> (String, String) {
        let key = KeyPair::generate().unwrap();
        let params = CertificateParams::new(vec!["localhost".to_string()]).unwrap();
        let cert = params.self_signed(&key).unwrap();
        (cert.pem(), key.serialize_pem())
    }

    #[test]
    fn test_load_certificates() {
        let (cert, _) = identity();
        let certs = load_certificates(cert.as_bytes(), "test").unwrap();
        assert_eq!(certs.len(), 1);
    }

    #[test]
    fn test_load_certificate_bundle() {
        let (first, _) = identity();
        let (second, _) = identity();
        let bundle = format!("{first}\n{second}");
        assert_eq!(load_certificates(bundle.as_bytes(), "bundle").unwrap().len(), 2);
    }

    #[test]
    fn test_load_certificates_empty() {
        assert!(matches!(
            load_certificates(b"", "empty"),
            Err(TlsError::NoCertificates(source)) if source == "empty"
        ));
    }

    #[test]
    fn test_load_private_key() {
        let (_, key) = identity();
        assert!(matches!(
            load_private_key(key.as_bytes(), "test"),
            Ok(PrivateKeyDer::Pkcs8(_))
        ));
    }

    #[test]
    fn test_load_private_key_skips_certificates() {
        let (cert, key) = identity();
        let combined = format!("{cert}\n{key}");
        assert!(load_private_key(combined.as_bytes(), "combined").is_ok());
    }

    #[test]
    fn test_load_private_key_missing() {
        let (cert, _) = identity();
        assert!(matches!(
            load_private_key(cert.as_bytes(), "cert only"),
            Err(TlsError::NoPrivateKeys(_))
        ));
    }

    #[test]
    fn test_crypto_provider_is_stable() {
        let first = crypto_provider();
        let second = crypto_provider();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_acceptor_from_config() {
        let (cert, key) = identity();
        let mut config = CertConfig::new();
        config.set_client_auth_type(ClientAuthType::NoClientCert);
        config.set_server_cert(cert);
        config.set_server_key(key);

        let tls = config.tls_config().unwrap().unwrap();
        let acceptor = TlsServerAcceptor::new(&tls);
        assert_eq!(acceptor.config().client_auth(), ClientAuthType::NoClientCert);
    }
}
