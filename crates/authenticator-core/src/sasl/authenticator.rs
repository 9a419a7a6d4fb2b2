//! Credential authenticators.
//!
//! A [`CredentialAuthenticator`] decides whether a [`CredentialQuery`] is
//! acceptable. The default, [`StoreCredentialAuthenticator`], compares the
//! query against a [`CredentialStore`]; hosting servers with their own user
//! database install a custom implementation instead.

use std::sync::Arc;

use subtle::ConstantTimeEq;
use tracing::{debug, warn};

use crate::auth::ConnectionContext;
use crate::error::AuthResult;

use super::credentials::CredentialStore;
use super::query::CredentialQuery;

/// Trait for credential verification.
pub trait CredentialAuthenticator: Send + Sync + std::fmt::Debug {
    /// Verify a client's credentials.
    ///
    /// Returns `Ok(false)` for rejected credentials; errors are reserved for
    /// failures of the verification machinery itself.
    fn verify_credential(
        &self,
        conn: &ConnectionContext,
        query: &CredentialQuery,
    ) -> AuthResult<bool>;
}

/// Credential authenticator backed by a [`CredentialStore`].
///
/// When the query carries an encrypt function the stored password is run
/// through it and compared with the query password; otherwise the two
/// passwords are compared directly.
#[derive(Debug)]
pub struct StoreCredentialAuthenticator {
    credential_store: Arc<dyn CredentialStore>,
}

impl StoreCredentialAuthenticator {
    #[must_use]
    pub fn new(credential_store: Arc<dyn CredentialStore>) -> Self {
        Self { credential_store }
    }

    pub fn credential_store(&self) -> &Arc<dyn CredentialStore> {
        &self.credential_store
    }
}

impl CredentialAuthenticator for StoreCredentialAuthenticator {
    fn verify_credential(
        &self,
        conn: &ConnectionContext,
        query: &CredentialQuery,
    ) -> AuthResult<bool> {
        let Some(credential) = self.credential_store.lookup_credential(query)? else {
            warn!(
                username = %query.username(),
                connection_id = %conn.connection_id(),
                "credential lookup failed: unknown user"
            );
            return Ok(false);
        };

        let expected = match query.encrypt_fn() {
            Some(encrypt) => encrypt(&credential.password)?,
            None => credential.password,
        };

        let verified = secrets_match(expected.as_bytes(), query.password().as_bytes());
        if verified {
            debug!(
                username = %query.username(),
                connection_id = %conn.connection_id(),
                "credential verified"
            );
        } else {
            warn!(
                username = %query.username(),
                connection_id = %conn.connection_id(),
                "credential rejected: password mismatch"
            );
        }
        Ok(verified)
    }
}

/// Constant-time comparison of two secrets. Only the length leaks.
pub(crate) fn secrets_match(expected: &[u8], provided: &[u8]) -> bool {
    expected.len() == provided.len() && bool::from(expected.ct_eq(provided))
}
