//! Authentication manager.
//!
//! [`AuthManager`] is the single entry point a hosting server uses to
//! authenticate a connection. Credential checks go to the SASL layer;
//! certificate checks go to the configured [`CertificateAuthenticator`].
//!
//! # Configuration
//!
//! Prefer [`AuthManager::from_config`], which builds every collaborator up
//! front. The setters exist for hosting servers that wire collaborators in
//! code; call them before accepting connections. They are lock-protected, so
//! a late call is memory-safe, but verifications already in flight may still
//! see the previous collaborator.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::auth::certificate::{
    CertificateAuthenticator, CommonNameAuthenticator, TlsConnectionState,
};
use crate::auth::ConnectionContext;
use crate::config::AuthConfig;
use crate::error::{AuthResult, ConfigResult};
use crate::sasl::{
    CredentialAuthenticator, CredentialQuery, CredentialStore, CredentialVerifier, Mechanism,
    SaslServer, SaslSession, SaslStepResult,
};

/// The authentication surface offered to a hosting server.
pub trait AuthServer: Send + Sync {
    /// Version of the authentication layer.
    fn version(&self) -> &'static str;

    /// Enabled SASL mechanisms, in advertisement order.
    fn mechanisms(&self) -> Vec<Arc<dyn Mechanism>>;

    /// Look up an enabled mechanism by name (case-insensitive).
    fn mechanism(&self, name: &str) -> AuthResult<Arc<dyn Mechanism>>;

    fn set_credential_authenticator(&self, authenticator: Arc<dyn CredentialAuthenticator>);

    fn set_credential_store(&self, store: Arc<dyn CredentialStore>);

    fn credential_store(&self) -> Option<Arc<dyn CredentialStore>>;

    /// Verify a credential query. Fails when no credential side is configured.
    fn verify_credential(&self, conn: &ConnectionContext, query: &CredentialQuery)
        -> AuthResult<bool>;

    fn set_certificate_authenticator(&self, authenticator: Arc<dyn CertificateAuthenticator>);

    /// Verify peer certificates. Succeeds when no certificate authenticator
    /// is configured.
    fn verify_certificate(
        &self,
        conn: &ConnectionContext,
        state: &TlsConnectionState<'_>,
    ) -> AuthResult<bool>;
}

/// Authentication manager composing the SASL layer and a certificate
/// authenticator.
#[derive(Debug)]
pub struct AuthManager {
    sasl: SaslServer,
    certificate_authenticator: RwLock<Option<Arc<dyn CertificateAuthenticator>>>,
}

impl Default for AuthManager {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthManager {
    /// Create a manager with every built-in mechanism, no credential store and
    /// a certificate authenticator that accepts every connection.
    #[must_use]
    pub fn new() -> Self {
        Self::with_sasl_server(SaslServer::new())
    }

    /// Create a manager around an existing SASL server.
    #[must_use]
    pub fn with_sasl_server(sasl: SaslServer) -> Self {
        Self {
            sasl,
            certificate_authenticator: RwLock::new(Some(Arc::new(CommonNameAuthenticator::new()))),
        }
    }

    /// Build a manager from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the credential store
    /// cannot be loaded, or a certificate pattern fails to compile.
    pub fn from_config(config: &AuthConfig) -> ConfigResult<Self> {
        config.validate()?;

        let sasl = SaslServer::from_config(&config.sasl)?;
        let certificate = CommonNameAuthenticator::from_config(&config.certificate)?;

        info!(
            mechanisms = ?sasl.mechanism_names(),
            credential_store = sasl.credential_store().is_some(),
            certificate_policy = ?certificate.policy(),
            "authentication manager configured"
        );

        let manager = Self::with_sasl_server(sasl);
        manager.set_certificate_authenticator(Arc::new(certificate));
        Ok(manager)
    }

    /// The SASL server backing the credential side.
    pub fn sasl_server(&self) -> &SaslServer {
        &self.sasl
    }

    /// Remove the certificate authenticator; every certificate check then
    /// succeeds.
    pub fn clear_certificate_authenticator(&self) {
        *self.certificate_authenticator.write() = None;
    }

    pub fn certificate_authenticator(&self) -> Option<Arc<dyn CertificateAuthenticator>> {
        self.certificate_authenticator.read().clone()
    }

    /// Start a SASL exchange.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UnsupportedMechanism` if the mechanism is not enabled.
    pub fn start_session(&self, mechanism: &str) -> AuthResult<SaslSession> {
        self.sasl.start_session(mechanism)
    }

    /// Feed one client message into a SASL exchange.
    pub fn authenticate_step(
        &self,
        conn: &ConnectionContext,
        session: &mut SaslSession,
        client_message: &[u8],
    ) -> SaslStepResult {
        self.sasl.authenticate_step(conn, session, client_message)
    }
}

impl AuthServer for AuthManager {
    fn version(&self) -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    fn mechanisms(&self) -> Vec<Arc<dyn Mechanism>> {
        self.sasl.mechanisms()
    }

    fn mechanism(&self, name: &str) -> AuthResult<Arc<dyn Mechanism>> {
        self.sasl.mechanism(name)
    }

    fn set_credential_authenticator(&self, authenticator: Arc<dyn CredentialAuthenticator>) {
        self.sasl.set_credential_authenticator(authenticator);
    }

    fn set_credential_store(&self, store: Arc<dyn CredentialStore>) {
        self.sasl.set_credential_store(store);
    }

    fn credential_store(&self) -> Option<Arc<dyn CredentialStore>> {
        self.sasl.credential_store()
    }

    fn verify_credential(
        &self,
        conn: &ConnectionContext,
        query: &CredentialQuery,
    ) -> AuthResult<bool> {
        self.sasl.verify_credential(conn, query)
    }

    fn set_certificate_authenticator(&self, authenticator: Arc<dyn CertificateAuthenticator>) {
        *self.certificate_authenticator.write() = Some(authenticator);
    }

    fn verify_certificate(
        &self,
        conn: &ConnectionContext,
        state: &TlsConnectionState<'_>,
    ) -> AuthResult<bool> {
        let Some(authenticator) = self.certificate_authenticator() else {
            debug!(
                connection_id = %conn.connection_id(),
                "no certificate authenticator configured, accepting connection"
            );
            return Ok(true);
        };
        authenticator.verify_certificate(conn, state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CertificatePolicyConfig, SaslMechanism};
    use crate::error::{AuthError, ConfigError};
    use crate::sasl::InMemoryCredentialStore;
    use std::net::SocketAddr;

    fn conn() -> ConnectionContext {
        let addr: SocketAddr = "127.0.0.1:3306".parse().unwrap();
        ConnectionContext::new(addr, "conn-1")
    }

    #[derive(Debug)]
    struct DenyAll;

    impl CertificateAuthenticator for DenyAll {
        fn verify_certificate(
            &self,
            _conn: &ConnectionContext,
            _state: &TlsConnectionState<'_>,
        ) -> AuthResult<bool> {
            Ok(false)
        }
    }

    #[test]
    fn test_version() {
        assert_eq!(AuthManager::new().version(), env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn test_default_mechanisms() {
        let manager = AuthManager::new();
        let names: Vec<_> = manager.mechanisms().iter().map(|m| m.name()).collect();
        assert_eq!(names, vec!["PLAIN", "SCRAM-SHA-256", "SCRAM-SHA-512"]);
        assert_eq!(manager.mechanism("scram-sha-512").unwrap().name(), "SCRAM-SHA-512");
    }

    #[test]
    fn test_unknown_mechanism() {
        let manager = AuthManager::new();
        assert!(matches!(
            manager.mechanism("GSSAPI"),
            Err(AuthError::UnsupportedMechanism(_))
        ));
    }

    #[test]
    fn test_default_certificate_authenticator_accepts() {
        let manager = AuthManager::new();
        assert!(manager.certificate_authenticator().is_some());
        assert!(manager
            .verify_certificate(&conn(), &TlsConnectionState::empty())
            .unwrap());
    }

    #[test]
    fn test_no_certificate_authenticator_fails_open() {
        let manager = AuthManager::new();
        manager.clear_certificate_authenticator();
        assert!(manager
            .verify_certificate(&conn(), &TlsConnectionState::empty())
            .unwrap());
    }

    #[test]
    fn test_set_certificate_authenticator() {
        let manager = AuthManager::new();
        manager.set_certificate_authenticator(Arc::new(DenyAll));
        assert!(!manager
            .verify_certificate(&conn(), &TlsConnectionState::empty())
            .unwrap());
    }

    #[test]
    fn test_verify_credential_requires_credential_side() {
        let manager = AuthManager::new();
        let query = CredentialQuery::new("alice", "secret");
        assert!(matches!(
            manager.verify_credential(&conn(), &query),
            Err(AuthError::NoCredentialAuthenticator)
        ));
    }

    #[test]
    fn test_credential_store_round_trip() {
        let manager = AuthManager::new();
        assert!(manager.credential_store().is_none());

        let mut store = InMemoryCredentialStore::new();
        store.add_user("alice", "secret");
        manager.set_credential_store(Arc::new(store));

        assert!(manager.credential_store().is_some());
        assert!(manager
            .verify_credential(&conn(), &CredentialQuery::new("alice", "secret"))
            .unwrap());
        assert!(!manager
            .verify_credential(&conn(), &CredentialQuery::new("alice", "guess"))
            .unwrap());
    }

    #[test]
    fn test_plain_exchange_through_manager() {
        let manager = AuthManager::new();
        let mut store = InMemoryCredentialStore::new();
        store.add_user("alice", "secret");
        manager.set_credential_store(Arc::new(store));

        let mut session = manager.start_session("PLAIN").unwrap();
        let result = manager.authenticate_step(&conn(), &mut session, b"\0alice\0secret");
        assert!(matches!(result, SaslStepResult::Complete(_)));
        assert_eq!(session.authenticated_user.as_deref(), Some("alice"));
    }

    #[test]
    fn test_from_config() {
        let mut config = AuthConfig::default();
        config.sasl.enabled_mechanisms = vec![SaslMechanism::ScramSha256];
        config.certificate = CertificatePolicyConfig {
            common_name: Some("svc-A".to_string()),
            common_name_patterns: None,
        };

        let manager = AuthManager::from_config(&config).unwrap();
        let names: Vec<_> = manager.mechanisms().iter().map(|m| m.name()).collect();
        assert_eq!(names, vec!["SCRAM-SHA-256"]);
        assert!(!manager
            .verify_certificate(&conn(), &TlsConnectionState::empty())
            .unwrap());
    }

    #[test]
    fn test_from_config_invalid_pattern() {
        let mut config = AuthConfig::default();
        config.certificate.common_name_patterns = Some(vec!["(unclosed".to_string()]);

        let result = AuthManager::from_config(&config);
        assert!(matches!(
            result,
            Err(ConfigError::Auth(AuthError::InvalidPattern { .. }))
        ));
    }
}
