//! Server TLS configuration builder.
//!
//! [`CertConfig`] collects the server key, certificate chain, root
//! certificates and client-auth mode, then builds a rustls [`ServerConfig`]
//! on first request. The built configuration is cached until a setter
//! changes its inputs.
//!
//! ```text
//!   Disabled --setter--> Unbuilt --tls_config()--> Built
//!                                                    |
//!                        Stale  <------setter--------+
//!                          |
//!                          +-----tls_config()-----> Built
//! ```

use std::path::Path;
use std::sync::Arc;

use rustls::crypto::CryptoProvider;
use rustls::server::danger::ClientCertVerifier;
use rustls::server::WebPkiClientVerifier;
use rustls::version::{TLS12, TLS13};
use rustls::{ProtocolVersion, RootCertStore, ServerConfig, SupportedProtocolVersion};
use tracing::{debug, info, warn};

use super::server::{crypto_provider, load_certificates, load_private_key};
use super::verifier::UnverifiedClientCert;
use crate::config::{AuthConfig, ClientAuthType, TlsSettings};
use crate::error::{ConfigResult, TlsError, TlsResult};

/// Protocol versions offered by built configurations.
static PROTOCOL_VERSIONS: &[&SupportedProtocolVersion] = &[&TLS13, &TLS12];

/// Lowest protocol version offered by built configurations.
pub const MIN_PROTOCOL_VERSION: ProtocolVersion = ProtocolVersion::TLSv1_2;

/// A built server TLS configuration. Cloning is cheap.
#[derive(Debug, Clone)]
pub struct ServerTlsConfig {
    inner: Arc<ServerConfig>,
    client_auth: ClientAuthType,
}

impl ServerTlsConfig {
    /// Wrap an externally built rustls configuration.
    pub fn new(inner: Arc<ServerConfig>, client_auth: ClientAuthType) -> Self {
        Self { inner, client_auth }
    }

    pub fn server_config(&self) -> Arc<ServerConfig> {
        Arc::clone(&self.inner)
    }

    pub fn client_auth(&self) -> ClientAuthType {
        self.client_auth
    }

    pub fn min_protocol_version(&self) -> ProtocolVersion {
        MIN_PROTOCOL_VERSION
    }
}

/// Cache state of a [`CertConfig`].
#[derive(Debug, Clone)]
pub enum CacheState {
    /// TLS is off; `tls_config` returns `None`.
    Disabled,
    /// TLS is on and nothing has been built yet.
    Unbuilt,
    /// A setter ran after the last build.
    Stale,
    /// The cached configuration is current.
    Built(ServerTlsConfig),
}

/// Server TLS configuration builder with a lazily built, cached result.
#[derive(Debug, Clone)]
pub struct CertConfig {
    client_auth: ClientAuthType,
    server_cert: Vec<u8>,
    server_key: Vec<u8>,
    root_certs: Vec<Vec<u8>>,
    state: CacheState,
}

impl Default for CertConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl CertConfig {
    /// Create a builder with TLS disabled.
    #[must_use]
    pub fn new() -> Self {
        Self {
            client_auth: ClientAuthType::default(),
            server_cert: Vec::new(),
            server_key: Vec::new(),
            root_certs: Vec::new(),
            state: CacheState::Disabled,
        }
    }

    /// Create a builder from configuration, reading every file eagerly.
    ///
    /// # Errors
    ///
    /// Returns an error if any certificate or key file cannot be read.
    pub fn from_settings(settings: &TlsSettings) -> TlsResult<Self> {
        let mut config = Self::new();
        config.set_client_auth_type(settings.client_auth);
        config.set_server_cert_file(&settings.cert_path)?;
        config.set_server_key_file(&settings.key_path)?;
        if !settings.ca_cert_paths.is_empty() {
            config.set_root_cert_files(&settings.ca_cert_paths)?;
        }
        Ok(config)
    }

    /// Create a builder from the `tls` section of a configuration.
    ///
    /// Returns `Ok(None)` when the section is absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or a file cannot be
    /// read.
    pub fn from_config(config: &AuthConfig) -> ConfigResult<Option<Self>> {
        config.validate()?;
        match &config.tls {
            Some(settings) => Ok(Some(Self::from_settings(settings)?)),
            None => Ok(None),
        }
    }

    pub fn cache_state(&self) -> &CacheState {
        &self.state
    }

    pub fn client_auth_type(&self) -> ClientAuthType {
        self.client_auth
    }

    pub fn is_tls_enabled(&self) -> bool {
        !matches!(self.state, CacheState::Disabled)
    }

    /// Turn TLS on or off without touching the key material.
    pub fn set_tls_enabled(&mut self, enabled: bool) {
        if !enabled {
            self.state = CacheState::Disabled;
        } else if !self.is_tls_enabled() {
            self.state = CacheState::Unbuilt;
        }
    }

    fn invalidate(&mut self) {
        self.state = match self.state {
            CacheState::Built(_) | CacheState::Stale => CacheState::Stale,
            CacheState::Disabled | CacheState::Unbuilt => CacheState::Unbuilt,
        };
    }

    pub fn set_client_auth_type(&mut self, client_auth: ClientAuthType) {
        self.client_auth = client_auth;
        self.invalidate();
    }

    /// Set the PEM-encoded server private key.
    pub fn set_server_key(&mut self, key: impl Into<Vec<u8>>) {
        self.server_key = key.into();
        self.invalidate();
    }

    /// Set the PEM-encoded server certificate chain, leaf first.
    pub fn set_server_cert(&mut self, cert: impl Into<Vec<u8>>) {
        self.server_cert = cert.into();
        self.invalidate();
    }

    /// Replace the PEM-encoded root certificates used to verify clients.
    pub fn set_root_certs<I, C>(&mut self, certs: I)
    where
        I: IntoIterator<Item = C>,
        C: Into<Vec<u8>>,
    {
        self.root_certs = certs.into_iter().map(Into::into).collect();
        self.invalidate();
    }

    /// Read the server private key from a PEM file.
    ///
    /// # Errors
    ///
    /// Returns `TlsError::PrivateKeyLoad` if the file cannot be read.
    pub fn set_server_key_file(&mut self, path: impl AsRef<Path>) -> TlsResult<()> {
        let path = path.as_ref();
        let key = std::fs::read(path).map_err(|e| TlsError::PrivateKeyLoad {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        self.set_server_key(key);
        Ok(())
    }

    /// Read the server certificate chain from a PEM file.
    ///
    /// # Errors
    ///
    /// Returns `TlsError::CertificateLoad` if the file cannot be read.
    pub fn set_server_cert_file(&mut self, path: impl AsRef<Path>) -> TlsResult<()> {
        let path = path.as_ref();
        let cert = read_certificate_file(path)?;
        self.set_server_cert(cert);
        Ok(())
    }

    /// Read root certificates from PEM files. Nothing changes if any file
    /// cannot be read.
    ///
    /// # Errors
    ///
    /// Returns `TlsError::CertificateLoad` for the first unreadable file.
    pub fn set_root_cert_files<I, P>(&mut self, paths: I) -> TlsResult<()>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let certs = paths
            .into_iter()
            .map(|path| read_certificate_file(path.as_ref()))
            .collect::<TlsResult<Vec<_>>>()?;
        self.set_root_certs(certs);
        Ok(())
    }

    /// Install a prebuilt configuration, or disable TLS with `None`.
    pub fn set_tls_config(&mut self, config: Option<ServerTlsConfig>) {
        self.state = match config {
            Some(config) => {
                self.client_auth = config.client_auth();
                CacheState::Built(config)
            }
            None => CacheState::Disabled,
        };
    }

    /// Get the server TLS configuration, building it if needed.
    ///
    /// Returns `Ok(None)` while TLS is disabled. A failed build leaves the
    /// builder unchanged.
    ///
    /// # Errors
    ///
    /// Returns an error if the key material does not parse or the key does
    /// not match the certificate. A verifying client-auth mode with no usable
    /// root certificate still builds; it rejects every client certificate.
    pub fn tls_config(&mut self) -> TlsResult<Option<ServerTlsConfig>> {
        match &self.state {
            CacheState::Disabled => return Ok(None),
            CacheState::Built(config) => return Ok(Some(config.clone())),
            CacheState::Unbuilt | CacheState::Stale => {}
        }

        let config = self.build()?;
        self.state = CacheState::Built(config.clone());
        Ok(Some(config))
    }

    fn build(&self) -> TlsResult<ServerTlsConfig> {
        let certs = load_certificates(&self.server_cert, "server certificate")?;
        let key = load_private_key(&self.server_key, "server key")?;
        let provider = crypto_provider();

        let builder = ServerConfig::builder_with_provider(Arc::clone(&provider))
            .with_protocol_versions(PROTOCOL_VERSIONS)
            .map_err(|e| TlsError::Config(format!("unsupported protocol versions: {e}")))?;

        let builder = match self.client_verifier(provider)? {
            Some(verifier) => builder.with_client_cert_verifier(verifier),
            None => builder.with_no_client_auth(),
        };

        let server_config = builder
            .with_single_cert(certs, key)
            .map_err(|e| TlsError::Config(format!("failed to configure server cert: {e}")))?;

        info!(client_auth = ?self.client_auth, "built server TLS configuration");
        Ok(ServerTlsConfig::new(Arc::new(server_config), self.client_auth))
    }

    /// The client certificate verifier for the configured mode, or `None`
    /// when client certificates are not requested.
    pub(crate) fn client_verifier(
        &self,
        provider: Arc<CryptoProvider>,
    ) -> TlsResult<Option<Arc<dyn ClientCertVerifier>>> {
        let mandatory = self.client_auth.requires_client_cert();
        let verifier: Arc<dyn ClientCertVerifier> = match self.client_auth {
            ClientAuthType::NoClientCert => {
                debug!("configuring TLS without client certificate verification");
                return Ok(None);
            }
            ClientAuthType::RequestClientCert | ClientAuthType::RequireAnyClientCert => {
                debug!(mandatory, "configuring TLS with unvalidated client certificates");
                UnverifiedClientCert::accept_any(provider, mandatory)
            }
            ClientAuthType::VerifyClientCertIfGiven
            | ClientAuthType::RequireAndVerifyClientCert => {
                let roots = self.root_store();
                if roots.is_empty() {
                    warn!(
                        client_auth = ?self.client_auth,
                        "no root certificates configured, every client certificate will be rejected"
                    );
                    UnverifiedClientCert::reject_all(provider, mandatory)
                } else {
                    let builder =
                        WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider);
                    let builder = if mandatory {
                        debug!("configuring mTLS with client certificate verification");
                        builder
                    } else {
                        debug!("configuring optional client certificate verification");
                        builder.allow_unauthenticated()
                    };
                    builder.build().map_err(|e| {
                        TlsError::Config(format!("failed to build client verifier: {e}"))
                    })?
                }
            }
        };
        Ok(Some(verifier))
    }

    /// Roots from every configured bundle; unparseable entries are skipped.
    fn root_store(&self) -> RootCertStore {
        let mut root_store = RootCertStore::empty();
        for (index, bundle) in self.root_certs.iter().enumerate() {
            match load_certificates(bundle, "root certificates") {
                Ok(certs) => {
                    let (added, ignored) = root_store.add_parsable_certificates(certs);
                    debug!(index, added, ignored, "added root certificates");
                }
                Err(e) => warn!(index, error = %e, "skipping root certificate bundle"),
            }
        }

        root_store
    }
}

fn read_certificate_file(path: &Path) -> TlsResult<Vec<u8>> {
    std::fs::read(path).map_err(|e| TlsError::CertificateLoad {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}
