//! SASL mechanism negotiation and credential verification.
//!
//! This module provides the credential side of the authentication manager.
//! Supported mechanisms:
//! - PLAIN - Simple username/password (should only be used over TLS)
//! - SCRAM-SHA-256 - Challenge-response authentication
//! - SCRAM-SHA-512 - Challenge-response authentication
//!
//! Mechanisms never read a credential store directly. They ask the
//! [`SaslServer`] (through [`CredentialVerifier`]) so that an installed
//! [`CredentialAuthenticator`] and [`CredentialStore`] apply uniformly to
//! mechanism exchanges and to direct `verify_credential` calls.

pub mod authenticator;
pub mod credentials;
pub mod plain;
pub mod query;
pub mod scram;

pub use authenticator::{CredentialAuthenticator, StoreCredentialAuthenticator};
pub use credentials::{
    create_credential_store, Credential, CredentialStore, FileCredentialStore,
    InMemoryCredentialStore,
};
pub use plain::PlainMechanism;
pub use query::{CredentialQuery, CredentialQueryBuilder, EncryptFn};
pub use scram::{
    ScramHash, ScramKeys, ScramMechanism, ScramSessionState, ScramSha256, ScramSha256Mechanism,
    ScramSha512, ScramSha512Mechanism,
};

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::auth::ConnectionContext;
use crate::config::{SaslConfig, SaslMechanism};
use crate::error::{AuthError, AuthResult};

/// SASL session state.
#[derive(Debug, Default)]
pub struct SaslSession {
    /// The mechanism being used.
    pub mechanism: Option<String>,
    /// The authenticated username (set when authentication completes).
    pub authenticated_user: Option<String>,
    /// Number of authentication steps completed.
    pub step_count: usize,
    /// SCRAM-specific session state for multi-step authentication.
    pub scram_state: Option<ScramSessionState>,
}

impl SaslSession {
    /// Create a new SASL session.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the mechanism being used.
    pub fn set_mechanism(&mut self, mechanism: &str) {
        self.mechanism = Some(mechanism.to_string());
    }

    /// Check if authentication is complete.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.authenticated_user.is_some()
    }
}

/// Result of a SASL authentication step.
#[derive(Debug)]
pub enum SaslStepResult {
    /// Authentication completed successfully, with optional final response.
    Complete(Vec<u8>),
    /// More steps required, send this challenge to client.
    Continue(Vec<u8>),
    /// Authentication failed.
    Failed(AuthError),
}

/// Credential access offered to mechanisms during an exchange.
pub trait CredentialVerifier {
    /// Verify a username/password style query.
    fn verify_credential(
        &self,
        conn: &ConnectionContext,
        query: &CredentialQuery,
    ) -> AuthResult<bool>;

    /// Fetch the stored credential for mechanisms that derive keys from it.
    fn lookup_credential(&self, query: &CredentialQuery) -> AuthResult<Option<Credential>>;
}

/// A SASL mechanism.
pub trait Mechanism: Send + Sync + std::fmt::Debug {
    /// Get the mechanism name (e.g., "PLAIN", "SCRAM-SHA-256").
    fn name(&self) -> &'static str;

    /// Process a client authentication message.
    fn step(
        &self,
        verifier: &dyn CredentialVerifier,
        conn: &ConnectionContext,
        client_message: &[u8],
        session: &mut SaslSession,
    ) -> SaslStepResult;
}

/// SASL server: the enabled mechanisms plus the credential side they verify
/// against.
///
/// The credential authenticator and store are set once at startup and then
/// read on every verification. Both sit behind a lock so that replacing them
/// later is memory-safe, but an in-flight verification may still observe the
/// previous value.
#[derive(Debug)]
pub struct SaslServer {
    mechanisms: Vec<Arc<dyn Mechanism>>,
    credential_authenticator: RwLock<Option<Arc<dyn CredentialAuthenticator>>>,
    credential_store: RwLock<Option<Arc<dyn CredentialStore>>>,
}

impl Default for SaslServer {
    fn default() -> Self {
        Self::new()
    }
}

impl SaslServer {
    /// Create a server offering every built-in mechanism.
    #[must_use]
    pub fn new() -> Self {
        Self {
            mechanisms: SaslMechanism::ALL.iter().map(|m| build_mechanism(*m)).collect(),
            credential_authenticator: RwLock::new(None),
            credential_store: RwLock::new(None),
        }
    }

    /// Create a server offering the given mechanisms, in the given order.
    ///
    /// # Errors
    ///
    /// Returns an error if no mechanism is enabled.
    pub fn with_mechanisms(mechanisms: &[SaslMechanism]) -> AuthResult<Self> {
        let mut enabled: Vec<Arc<dyn Mechanism>> = Vec::new();
        for mechanism in mechanisms {
            if enabled.iter().any(|m| m.name() == mechanism.mechanism_name()) {
                continue;
            }
            enabled.push(build_mechanism(*mechanism));
        }

        if enabled.is_empty() {
            return Err(AuthError::UnsupportedMechanism(
                "no SASL mechanisms configured".to_string(),
            ));
        }

        Ok(Self {
            mechanisms: enabled,
            credential_authenticator: RwLock::new(None),
            credential_store: RwLock::new(None),
        })
    }

    /// Create a server from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if no mechanism is enabled or the credential store
    /// cannot be created.
    pub fn from_config(config: &SaslConfig) -> AuthResult<Self> {
        let server = Self::with_mechanisms(&config.enabled_mechanisms)?;
        if let Some(credentials) = &config.credentials {
            server.set_credential_store(create_credential_store(credentials)?);
        }
        Ok(server)
    }

    /// Get the enabled mechanisms, in advertisement order.
    #[must_use]
    pub fn mechanisms(&self) -> Vec<Arc<dyn Mechanism>> {
        self.mechanisms.clone()
    }

    /// Get the list of enabled mechanism names.
    #[must_use]
    pub fn mechanism_names(&self) -> Vec<&'static str> {
        self.mechanisms.iter().map(|m| m.name()).collect()
    }

    /// Get a mechanism by name (case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UnsupportedMechanism` if the mechanism is not enabled.
    pub fn mechanism(&self, name: &str) -> AuthResult<Arc<dyn Mechanism>> {
        self.mechanisms
            .iter()
            .find(|m| m.name().eq_ignore_ascii_case(name))
            .cloned()
            .ok_or_else(|| AuthError::UnsupportedMechanism(name.to_string()))
    }

    /// Replace the credential authenticator.
    pub fn set_credential_authenticator(&self, authenticator: Arc<dyn CredentialAuthenticator>) {
        *self.credential_authenticator.write() = Some(authenticator);
    }

    /// Replace the credential store.
    pub fn set_credential_store(&self, store: Arc<dyn CredentialStore>) {
        *self.credential_store.write() = Some(store);
    }

    /// Get the credential store.
    #[must_use]
    pub fn credential_store(&self) -> Option<Arc<dyn CredentialStore>> {
        self.credential_store.read().clone()
    }

    /// Start a new authentication session for a mechanism.
    ///
    /// # Errors
    ///
    /// Returns an error if the mechanism is not supported.
    pub fn start_session(&self, mechanism: &str) -> AuthResult<SaslSession> {
        let mechanism = self.mechanism(mechanism)?;
        let mut session = SaslSession::new();
        session.set_mechanism(mechanism.name());
        Ok(session)
    }

    /// Feed one client message into a session started by [`Self::start_session`].
    pub fn authenticate_step(
        &self,
        conn: &ConnectionContext,
        session: &mut SaslSession,
        client_message: &[u8],
    ) -> SaslStepResult {
        let Some(name) = session.mechanism.clone() else {
            return SaslStepResult::Failed(AuthError::InvalidMessage(
                "session has no mechanism".to_string(),
            ));
        };
        let mechanism = match self.mechanism(&name) {
            Ok(mechanism) => mechanism,
            Err(e) => return SaslStepResult::Failed(e),
        };

        session.step_count += 1;
        debug!(
            mechanism = %name,
            step = session.step_count,
            connection_id = %conn.connection_id(),
            "SASL step"
        );
        mechanism.step(self, conn, client_message, session)
    }
}

impl CredentialVerifier for SaslServer {
    /// Verify with the installed authenticator, falling back to a
    /// store-backed check.
    fn verify_credential(
        &self,
        conn: &ConnectionContext,
        query: &CredentialQuery,
    ) -> AuthResult<bool> {
        let authenticator = self.credential_authenticator.read().clone();
        if let Some(authenticator) = authenticator {
            return authenticator.verify_credential(conn, query);
        }

        let store = self
            .credential_store()
            .ok_or(AuthError::NoCredentialAuthenticator)?;
        StoreCredentialAuthenticator::new(store).verify_credential(conn, query)
    }

    fn lookup_credential(&self, query: &CredentialQuery) -> AuthResult<Option<Credential>> {
        let store = self
            .credential_store()
            .ok_or(AuthError::NoCredentialAuthenticator)?;
        store.lookup_credential(query)
    }
}

fn build_mechanism(mechanism: SaslMechanism) -> Arc<dyn Mechanism> {
    match mechanism {
        SaslMechanism::Plain => Arc::new(PlainMechanism),
        SaslMechanism::ScramSha256 => Arc::new(ScramSha256Mechanism::new()),
        SaslMechanism::ScramSha512 => Arc::new(ScramSha512Mechanism::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CredentialConfig, UserCredential};
    use std::net::SocketAddr;

    fn conn() -> ConnectionContext {
        let addr: SocketAddr = "127.0.0.1:3306".parse().unwrap();
        ConnectionContext::new(addr, "conn-1")
    }

    fn test_config() -> SaslConfig {
        SaslConfig {
            enabled_mechanisms: vec![SaslMechanism::Plain],
            credentials: Some(CredentialConfig::Inline {
                users: vec![UserCredential {
                    username: "test_user".to_string(),
                    password: "test_pass".to_string(),
                    group: None,
                }],
            }),
        }
    }

    #[derive(Debug)]
    struct RejectAll;

    impl CredentialAuthenticator for RejectAll {
        fn verify_credential(
            &self,
            _conn: &ConnectionContext,
            _query: &CredentialQuery,
        ) -> AuthResult<bool> {
            Ok(false)
        }
    }

    #[test]
    fn test_default_server_offers_all_mechanisms() {
        let server = SaslServer::new();
        assert_eq!(
            server.mechanism_names(),
            vec!["PLAIN", "SCRAM-SHA-256", "SCRAM-SHA-512"]
        );
    }

    #[test]
    fn test_sasl_server_from_config() {
        let server = SaslServer::from_config(&test_config()).unwrap();
        assert_eq!(server.mechanism_names(), vec!["PLAIN"]);
        assert!(server.credential_store().is_some());
    }

    #[test]
    fn test_duplicate_mechanisms_collapse() {
        let server =
            SaslServer::with_mechanisms(&[SaslMechanism::Plain, SaslMechanism::Plain]).unwrap();
        assert_eq!(server.mechanism_names(), vec!["PLAIN"]);
    }

    #[test]
    fn test_no_mechanisms() {
        let result = SaslServer::with_mechanisms(&[]);
        assert!(matches!(result, Err(AuthError::UnsupportedMechanism(_))));
    }

    #[test]
    fn test_get_mechanism() {
        let server = SaslServer::from_config(&test_config()).unwrap();

        assert!(server.mechanism("PLAIN").is_ok());
        assert!(server.mechanism("plain").is_ok()); // Case insensitive
        assert!(matches!(
            server.mechanism("SCRAM-SHA-256"),
            Err(AuthError::UnsupportedMechanism(_))
        ));
    }

    #[test]
    fn test_start_session() {
        let server = SaslServer::from_config(&test_config()).unwrap();
        let session = server.start_session("plain").unwrap();
        assert_eq!(session.mechanism, Some("PLAIN".to_string()));
    }

    #[test]
    fn test_start_session_unsupported() {
        let server = SaslServer::from_config(&test_config()).unwrap();
        assert!(server.start_session("UNKNOWN").is_err());
    }

    #[test]
    fn test_full_authentication_flow() {
        let server = SaslServer::from_config(&test_config()).unwrap();
        let mut session = server.start_session("PLAIN").unwrap();

        let result = server.authenticate_step(&conn(), &mut session, b"\0test_user\0test_pass");

        assert!(matches!(result, SaslStepResult::Complete(_)));
        assert!(session.is_authenticated());
        assert_eq!(session.authenticated_user, Some("test_user".to_string()));
        assert_eq!(session.step_count, 1);
    }

    #[test]
    fn test_step_without_mechanism() {
        let server = SaslServer::new();
        let mut session = SaslSession::new();
        let result = server.authenticate_step(&conn(), &mut session, b"\0a\0b");
        assert!(matches!(
            result,
            SaslStepResult::Failed(AuthError::InvalidMessage(_))
        ));
    }

    #[test]
    fn test_verify_without_store_fails_explicitly() {
        let server = SaslServer::new();
        let query = CredentialQuery::new("test_user", "test_pass");
        let result = server.verify_credential(&conn(), &query);
        assert!(matches!(result, Err(AuthError::NoCredentialAuthenticator)));
    }

    #[test]
    fn test_verify_with_store() {
        let server = SaslServer::from_config(&test_config()).unwrap();
        let good = CredentialQuery::new("test_user", "test_pass");
        let bad = CredentialQuery::new("test_user", "nope");
        assert!(server.verify_credential(&conn(), &good).unwrap());
        assert!(!server.verify_credential(&conn(), &bad).unwrap());
    }

    #[test]
    fn test_authenticator_takes_precedence_over_store() {
        let server = SaslServer::from_config(&test_config()).unwrap();
        server.set_credential_authenticator(Arc::new(RejectAll));

        let query = CredentialQuery::new("test_user", "test_pass");
        assert!(!server.verify_credential(&conn(), &query).unwrap());
    }

    #[test]
    fn test_set_credential_store_last_write_wins() {
        let server = SaslServer::new();

        let mut first = InMemoryCredentialStore::new();
        first.add_user("alice", "one");
        server.set_credential_store(Arc::new(first));

        let mut second = InMemoryCredentialStore::new();
        second.add_user("alice", "two");
        server.set_credential_store(Arc::new(second));

        assert!(server
            .verify_credential(&conn(), &CredentialQuery::new("alice", "two"))
            .unwrap());
        assert!(!server
            .verify_credential(&conn(), &CredentialQuery::new("alice", "one"))
            .unwrap());
    }
}
