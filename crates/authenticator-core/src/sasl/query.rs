//! Credential queries.
//!
//! A [`CredentialQuery`] carries what a client presented (username, password
//! or a password digest, mechanism) to the credential side of the manager.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{AuthError, AuthResult};

/// Transforms a stored password into the form the client sent.
///
/// Wire protocols that never send the cleartext password (for example a
/// challenge scramble) install one of these so the stored password can be
/// compared against the client's digest.
pub type EncryptFn = Arc<dyn Fn(&str) -> AuthResult<String> + Send + Sync>;

/// A credential verification request.
#[derive(Clone)]
pub struct CredentialQuery {
    group: Option<String>,
    username: String,
    password: String,
    mechanism: Option<String>,
    encrypt_fn: Option<EncryptFn>,
    options: BTreeMap<String, String>,
}

impl CredentialQuery {
    /// Start building a query.
    #[must_use]
    pub fn builder() -> CredentialQueryBuilder {
        CredentialQueryBuilder::default()
    }

    /// Shorthand for a username/password query without group or mechanism.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            group: None,
            username: username.into(),
            password: password.into(),
            mechanism: None,
            encrypt_fn: None,
            options: BTreeMap::new(),
        }
    }

    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn mechanism(&self) -> Option<&str> {
        self.mechanism.as_deref()
    }

    pub fn encrypt_fn(&self) -> Option<&EncryptFn> {
        self.encrypt_fn.as_ref()
    }

    /// Get a protocol-specific option.
    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }
}

impl fmt::Debug for CredentialQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialQuery")
            .field("group", &self.group)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("mechanism", &self.mechanism)
            .field("encrypt_fn", &self.encrypt_fn.is_some())
            .field("options", &self.options)
            .finish()
    }
}

/// Builder for [`CredentialQuery`].
#[derive(Default)]
pub struct CredentialQueryBuilder {
    group: Option<String>,
    username: Option<String>,
    password: String,
    mechanism: Option<String>,
    encrypt_fn: Option<EncryptFn>,
    options: BTreeMap<String, String>,
}

impl CredentialQueryBuilder {
    #[must_use]
    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    #[must_use]
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    #[must_use]
    pub fn mechanism(mut self, mechanism: impl Into<String>) -> Self {
        self.mechanism = Some(mechanism.into());
        self
    }

    #[must_use]
    pub fn encrypt_fn<F>(mut self, encrypt_fn: F) -> Self
    where
        F: Fn(&str) -> AuthResult<String> + Send + Sync + 'static,
    {
        self.encrypt_fn = Some(Arc::new(encrypt_fn));
        self
    }

    #[must_use]
    pub fn option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Finish the query.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidMessage` if no username was set.
    pub fn build(self) -> AuthResult<CredentialQuery> {
        let username = self
            .username
            .ok_or_else(|| AuthError::InvalidMessage("query has no username".to_string()))?;

        Ok(CredentialQuery {
            group: self.group,
            username,
            password: self.password,
            mechanism: self.mechanism,
            encrypt_fn: self.encrypt_fn,
            options: self.options,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_sets_fields() {
        let query = CredentialQuery::builder()
            .group("sales")
            .username("alice")
            .password("secret")
            .mechanism("PLAIN")
            .option("auth_plugin", "caching_sha2_password")
            .build()
            .unwrap();

        assert_eq!(query.group(), Some("sales"));
        assert_eq!(query.username(), "alice");
        assert_eq!(query.password(), "secret");
        assert_eq!(query.mechanism(), Some("PLAIN"));
        assert_eq!(query.option("auth_plugin"), Some("caching_sha2_password"));
        assert!(query.encrypt_fn().is_none());
    }

    #[test]
    fn test_builder_requires_username() {
        let result = CredentialQuery::builder().password("secret").build();
        assert!(matches!(result, Err(AuthError::InvalidMessage(_))));
    }

    #[test]
    fn test_encrypt_fn_is_callable() {
        let query = CredentialQuery::builder()
            .username("alice")
            .encrypt_fn(|password| Ok(password.to_uppercase()))
            .build()
            .unwrap();

        let encrypt = query.encrypt_fn().unwrap();
        assert_eq!(encrypt("secret").unwrap(), "SECRET");
    }

    #[test]
    fn test_debug_redacts_password() {
        let query = CredentialQuery::new("alice", "hunter2");
        let rendered = format!("{query:?}");
        assert!(rendered.contains("alice"));
        assert!(!rendered.contains("hunter2"));
    }
}
