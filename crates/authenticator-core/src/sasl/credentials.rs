//! Credential storage for SASL authentication.
//!
//! This module provides credential storage backends queried by the
//! credential authenticator and by mechanisms that need the stored secret
//! (SCRAM derives its keys from it).

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::config::{CredentialConfig, UserCredential};
use crate::error::{AuthError, AuthResult};

use super::query::CredentialQuery;

/// A stored user credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    /// Optional group (database, tenant, ...) the user belongs to.
    pub group: Option<String>,
    /// The username.
    pub username: String,
    /// The password in the form the store keeps it.
    pub password: String,
}

impl Credential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            group: None,
            username: username.into(),
            password: password.into(),
        }
    }

    #[must_use]
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// A credential answers a query when the usernames are equal and, if
    /// both sides name a group, the groups are equal too.
    fn answers(&self, query: &CredentialQuery) -> bool {
        if self.username != query.username() {
            return false;
        }
        match (self.group.as_deref(), query.group()) {
            (Some(stored), Some(requested)) => stored == requested,
            _ => true,
        }
    }
}

/// Trait for credential storage backends.
pub trait CredentialStore: Send + Sync + std::fmt::Debug {
    /// Look up the credential answering `query`.
    ///
    /// Returns `Ok(None)` for an unknown user. Errors are reserved for
    /// backend failures.
    fn lookup_credential(&self, query: &CredentialQuery) -> AuthResult<Option<Credential>>;
}

/// In-memory credential store.
#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    credentials: HashMap<String, Vec<Credential>>,
}

impl InMemoryCredentialStore {
    /// Create a new in-memory credential store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add credentials for a user.
    pub fn add_user(&mut self, username: impl Into<String>, password: impl Into<String>) {
        self.add_credential(Credential::new(username, password));
    }

    /// Add a credential, keeping any existing credential for the same user
    /// in another group.
    pub fn add_credential(&mut self, credential: Credential) {
        let entries = self
            .credentials
            .entry(credential.username.clone())
            .or_default();
        entries.retain(|existing| existing.group != credential.group);
        entries.push(credential);
    }

    /// Create from a list of user credentials.
    #[must_use]
    pub fn from_users(users: &[UserCredential]) -> Self {
        let mut store = Self::new();
        for user in users {
            let mut credential = Credential::new(user.username.clone(), user.password());
            credential.group = user.group.clone();
            store.add_credential(credential);
        }
        store
    }

    /// Number of stored credentials.
    #[must_use]
    pub fn len(&self) -> usize {
        self.credentials.values().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn lookup_credential(&self, query: &CredentialQuery) -> AuthResult<Option<Credential>> {
        Ok(self
            .credentials
            .get(query.username())
            .and_then(|entries| entries.iter().find(|c| c.answers(query)))
            .cloned())
    }
}

/// File-based credential store.
///
/// Loads credentials from a file in the format:
/// ```text
/// username1:password1
/// group/username2:password2
/// ```
#[derive(Debug)]
pub struct FileCredentialStore {
    inner: InMemoryCredentialStore,
}

impl FileCredentialStore {
    /// Create a new file-based credential store.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> AuthResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AuthError::CredentialStore(format!(
                "failed to read credentials file '{}': {e}",
                path.display()
            ))
        })?;

        let mut inner = InMemoryCredentialStore::new();

        for (line_num, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((principal, password)) = line.split_once(':') else {
                return Err(AuthError::CredentialStore(format!(
                    "invalid credentials file format at line {}: expected '[group/]username:password'",
                    line_num + 1
                )));
            };

            let credential = match principal.split_once('/') {
                Some((group, username)) => Credential::new(username, password).with_group(group),
                None => Credential::new(principal, password),
            };

            if credential.username.is_empty() {
                return Err(AuthError::CredentialStore(format!(
                    "empty username at line {}",
                    line_num + 1
                )));
            }

            inner.add_credential(credential);
        }

        Ok(Self { inner })
    }
}

impl CredentialStore for FileCredentialStore {
    fn lookup_credential(&self, query: &CredentialQuery) -> AuthResult<Option<Credential>> {
        self.inner.lookup_credential(query)
    }
}

/// Create a credential store from configuration.
///
/// # Errors
///
/// Returns an error if the credential store cannot be created.
pub fn create_credential_store(config: &CredentialConfig) -> AuthResult<Arc<dyn CredentialStore>> {
    match config {
        CredentialConfig::Inline { users } => {
            Ok(Arc::new(InMemoryCredentialStore::from_users(users)))
        }
        CredentialConfig::File { file } => Ok(Arc::new(FileCredentialStore::load(file)?)),
    }
}
