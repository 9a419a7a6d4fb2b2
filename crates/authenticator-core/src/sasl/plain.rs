//! SASL/PLAIN mechanism.
//!
//! SASL/PLAIN transmits credentials as cleartext (should only be used over TLS).
//! The authentication message format is: `[authzid]\0authcid\0password`

use tracing::{debug, warn};

use crate::auth::ConnectionContext;
use crate::error::AuthError;

use super::query::CredentialQuery;
use super::{CredentialVerifier, Mechanism, SaslSession, SaslStepResult};

/// SASL/PLAIN mechanism.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainMechanism;

impl PlainMechanism {
    /// Split a PLAIN message into (authzid, username, password).
    fn parse(client_message: &[u8]) -> Result<(String, String, String), AuthError> {
        let parts: Vec<&[u8]> = client_message.split(|&b| b == 0).collect();
        if parts.len() != 3 {
            return Err(AuthError::InvalidMessage(format!(
                "PLAIN message must have 3 parts, got {}",
                parts.len()
            )));
        }

        let field = |bytes: &[u8]| {
            String::from_utf8(bytes.to_vec())
                .map_err(|_| AuthError::InvalidMessage("PLAIN message is not UTF-8".to_string()))
        };

        let username = field(parts[1])?;
        if username.is_empty() {
            return Err(AuthError::InvalidMessage("PLAIN username is empty".to_string()));
        }
        Ok((field(parts[0])?, username, field(parts[2])?))
    }
}

impl Mechanism for PlainMechanism {
    fn name(&self) -> &'static str {
        "PLAIN"
    }

    fn step(
        &self,
        verifier: &dyn CredentialVerifier,
        conn: &ConnectionContext,
        client_message: &[u8],
        session: &mut SaslSession,
    ) -> SaslStepResult {
        let (authzid, username, password) = match Self::parse(client_message) {
            Ok(fields) => fields,
            Err(e) => {
                warn!(error = %e, "invalid PLAIN message");
                return SaslStepResult::Failed(e);
            }
        };

        if !authzid.is_empty() && authzid != username {
            warn!(
                username = %username,
                authzid = %authzid,
                "PLAIN authentication failed: authorization identity differs from username"
            );
            return SaslStepResult::Failed(AuthError::InvalidCredentials);
        }

        debug!(username = %username, "PLAIN authentication attempt");

        let query = CredentialQuery::builder()
            .username(username.clone())
            .password(password)
            .mechanism(self.name());
        let query = match query.build() {
            Ok(query) => query,
            Err(e) => return SaslStepResult::Failed(e),
        };

        match verifier.verify_credential(conn, &query) {
            Ok(true) => {
                debug!(username = %username, "PLAIN authentication successful");
                session.authenticated_user = Some(username);
                SaslStepResult::Complete(Vec::new())
            }
            Ok(false) => {
                warn!(username = %username, "PLAIN authentication failed: invalid credentials");
                SaslStepResult::Failed(AuthError::InvalidCredentials)
            }
            Err(e) => SaslStepResult::Failed(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sasl::SaslServer;
    use crate::sasl::credentials::InMemoryCredentialStore;
    use std::net::SocketAddr;
    use std::sync::Arc;

    fn conn() -> ConnectionContext {
        let addr: SocketAddr = "127.0.0.1:3306".parse().unwrap();
        ConnectionContext::new(addr, "conn-1")
    }

    fn create_server() -> SaslServer {
        let mut store = InMemoryCredentialStore::new();
        store.add_user("alice", "secret");
        store.add_user("bob", "password123");
        let server = SaslServer::new();
        server.set_credential_store(Arc::new(store));
        server
    }

    fn run(message: &[u8]) -> (SaslStepResult, SaslSession) {
        let server = create_server();
        let mut session = SaslSession::new();
        let result = PlainMechanism.step(&server, &conn(), message, &mut session);
        (result, session)
    }

    #[test]
    fn test_mechanism_name() {
        assert_eq!(PlainMechanism.name(), "PLAIN");
    }

    #[test]
    fn test_valid_credentials() {
        let (result, session) = run(b"\0alice\0secret");
        assert!(matches!(result, SaslStepResult::Complete(_)));
        assert_eq!(session.authenticated_user, Some("alice".to_string()));
    }

    #[test]
    fn test_valid_credentials_with_matching_authzid() {
        let (result, session) = run(b"bob\0bob\0password123");
        assert!(matches!(result, SaslStepResult::Complete(_)));
        assert_eq!(session.authenticated_user, Some("bob".to_string()));
    }

    #[test]
    fn test_foreign_authzid_rejected() {
        let (result, session) = run(b"alice\0bob\0password123");
        assert!(matches!(
            result,
            SaslStepResult::Failed(AuthError::InvalidCredentials)
        ));
        assert!(session.authenticated_user.is_none());
    }

    #[test]
    fn test_invalid_password() {
        let (result, session) = run(b"\0alice\0wrongpassword");
        assert!(matches!(
            result,
            SaslStepResult::Failed(AuthError::InvalidCredentials)
        ));
        assert!(session.authenticated_user.is_none());
    }

    #[test]
    fn test_unknown_user() {
        let (result, _) = run(b"\0unknown\0password");
        assert!(matches!(
            result,
            SaslStepResult::Failed(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_invalid_format_too_few_parts() {
        let (result, _) = run(b"username");
        assert!(matches!(
            result,
            SaslStepResult::Failed(AuthError::InvalidMessage(_))
        ));
    }

    #[test]
    fn test_empty_username() {
        let (result, _) = run(b"\0\0secret");
        assert!(matches!(
            result,
            SaslStepResult::Failed(AuthError::InvalidMessage(_))
        ));
    }

    #[test]
    fn test_missing_credential_side() {
        let server = SaslServer::new();
        let mut session = SaslSession::new();
        let result = PlainMechanism.step(&server, &conn(), b"\0alice\0secret", &mut session);
        assert!(matches!(
            result,
            SaslStepResult::Failed(AuthError::NoCredentialAuthenticator)
        ));
    }
}
