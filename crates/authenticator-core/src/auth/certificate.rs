//! Client certificate authentication.
//!
//! A [`CertificateAuthenticator`] decides whether the peer certificates of a
//! completed TLS handshake identify an acceptable client. The built-in
//! [`CommonNameAuthenticator`] checks the subject Common Name of every peer
//! certificate against an [`IdentityPolicy`]:
//!
//! - `Unrestricted` accepts every connection
//! - `CommonName` requires an exact CN match
//! - `CommonNamePatterns` requires a CN matching one of the regexes
//!
//! # Example
//!
//! ```
//! use authenticator_core::auth::{CertificateAuthenticatorOption, CommonNameAuthenticator};
//!
//! let authenticator = CommonNameAuthenticator::with_options([
//!     CertificateAuthenticatorOption::CommonNameRegexp(vec!["^svc-.*-prod$".to_string()]),
//! ])
//! .unwrap();
//! assert!(authenticator.policy().matches("svc-billing-prod"));
//! assert!(!authenticator.policy().matches("svc-billing-dev"));
//! ```

use regex::Regex;
use rustls::pki_types::CertificateDer;
use rustls::ServerConnection;
use tracing::{debug, warn};
use x509_parser::prelude::parse_x509_certificate;

use crate::auth::ConnectionContext;
use crate::config::CertificatePolicyConfig;
use crate::error::{AuthError, AuthResult};

/// Borrowed view of the peer certificates of a completed TLS handshake.
#[derive(Debug, Clone, Copy)]
pub struct TlsConnectionState<'a> {
    peer_certificates: &'a [CertificateDer<'a>],
}

impl<'a> TlsConnectionState<'a> {
    /// Wrap a peer certificate chain, leaf first.
    pub fn new(peer_certificates: &'a [CertificateDer<'a>]) -> Self {
        Self { peer_certificates }
    }

    /// A state with no peer certificates.
    pub fn empty() -> Self {
        Self {
            peer_certificates: &[],
        }
    }

    /// Read the peer certificates from a server-side rustls connection.
    pub fn from_server_connection(conn: &'a ServerConnection) -> Self {
        match conn.peer_certificates() {
            Some(certs) => Self::new(certs),
            None => Self::empty(),
        }
    }

    pub fn peer_certificates(&self) -> &'a [CertificateDer<'a>] {
        self.peer_certificates
    }

    pub fn has_peer_certificates(&self) -> bool {
        !self.peer_certificates.is_empty()
    }

    /// Subject Common Names of the parseable peer certificates, in chain order.
    ///
    /// A certificate without a CN contributes an empty string.
    pub fn common_names(&self) -> Vec<String> {
        self.peer_certificates
            .iter()
            .enumerate()
            .filter_map(|(index, der)| match parse_x509_certificate(der.as_ref()) {
                Ok((_, cert)) => Some(
                    cert.subject()
                        .iter_common_name()
                        .next()
                        .and_then(|cn| cn.as_str().ok())
                        .unwrap_or_default()
                        .to_string(),
                ),
                Err(e) => {
                    warn!(index, error = %e, "skipping unparseable peer certificate");
                    None
                }
            })
            .collect()
    }
}

/// Trait for client certificate verification.
pub trait CertificateAuthenticator: Send + Sync + std::fmt::Debug {
    /// Verify the peer certificates of a TLS connection.
    ///
    /// Returns `Ok(false)` when the certificates are not acceptable.
    fn verify_certificate(
        &self,
        conn: &ConnectionContext,
        state: &TlsConnectionState<'_>,
    ) -> AuthResult<bool>;
}

/// Which certificate identities are accepted.
#[derive(Debug, Clone, Default)]
pub enum IdentityPolicy {
    /// Accept every connection, with or without certificates.
    #[default]
    Unrestricted,
    /// Accept when a certificate CN equals this name.
    CommonName(String),
    /// Accept when a certificate CN matches any of these patterns.
    /// An empty set accepts nothing.
    CommonNamePatterns(Vec<Regex>),
}

impl IdentityPolicy {
    /// Check a single Common Name against the policy.
    pub fn matches(&self, common_name: &str) -> bool {
        match self {
            Self::Unrestricted => true,
            Self::CommonName(name) => name == common_name,
            Self::CommonNamePatterns(patterns) => patterns.iter().any(|p| p.is_match(common_name)),
        }
    }

    /// Check a certificate chain: true on the first certificate that matches.
    pub fn matches_any<S: AsRef<str>>(&self, common_names: &[S]) -> bool {
        match self {
            Self::Unrestricted => true,
            _ => common_names.iter().any(|cn| self.matches(cn.as_ref())),
        }
    }
}

/// Construction option for [`CommonNameAuthenticator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertificateAuthenticatorOption {
    /// Require this exact Common Name. Empty means unrestricted.
    CommonName(String),
    /// Require a Common Name matching one of these regular expressions.
    CommonNameRegexp(Vec<String>),
}

fn compile_patterns<I, S>(patterns: I) -> AuthResult<Vec<Regex>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    patterns
        .into_iter()
        .map(|pattern| {
            let pattern = pattern.as_ref();
            Regex::new(pattern).map_err(|e| AuthError::InvalidPattern {
                pattern: pattern.to_string(),
                message: e.to_string(),
            })
        })
        .collect()
}

/// Certificate authenticator matching subject Common Names.
#[derive(Debug, Clone, Default)]
pub struct CommonNameAuthenticator {
    policy: IdentityPolicy,
}

impl CommonNameAuthenticator {
    /// Create an authenticator that accepts every connection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Require an exact Common Name.
    #[must_use]
    pub fn with_common_name(name: impl Into<String>) -> Self {
        let name = name.into();
        let policy = if name.is_empty() {
            IdentityPolicy::Unrestricted
        } else {
            IdentityPolicy::CommonName(name)
        };
        Self { policy }
    }

    /// Require a Common Name matching one of `patterns`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidPattern` for the first pattern that fails to
    /// compile.
    pub fn with_common_name_patterns<I, S>(patterns: I) -> AuthResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Ok(Self {
            policy: IdentityPolicy::CommonNamePatterns(compile_patterns(patterns)?),
        })
    }

    /// Build an authenticator by applying options in order.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidPattern` if any pattern fails to compile; no
    /// authenticator is produced in that case.
    pub fn with_options<I>(options: I) -> AuthResult<Self>
    where
        I: IntoIterator<Item = CertificateAuthenticatorOption>,
    {
        let mut policy = IdentityPolicy::Unrestricted;
        for option in options {
            policy = match option {
                CertificateAuthenticatorOption::CommonName(name) => {
                    Self::with_common_name(name).policy
                }
                CertificateAuthenticatorOption::CommonNameRegexp(patterns) => {
                    let compiled = compile_patterns(&patterns)?;
                    match policy {
                        IdentityPolicy::CommonNamePatterns(mut existing) => {
                            existing.extend(compiled);
                            IdentityPolicy::CommonNamePatterns(existing)
                        }
                        _ => IdentityPolicy::CommonNamePatterns(compiled),
                    }
                }
            };
        }
        Ok(Self { policy })
    }

    /// Build an authenticator from configuration.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidPattern` if a configured pattern is invalid.
    pub fn from_config(config: &CertificatePolicyConfig) -> AuthResult<Self> {
        let mut options = Vec::new();
        if let Some(name) = &config.common_name {
            options.push(CertificateAuthenticatorOption::CommonName(name.clone()));
        }
        if let Some(patterns) = &config.common_name_patterns {
            options.push(CertificateAuthenticatorOption::CommonNameRegexp(
                patterns.clone(),
            ));
        }
        Self::with_options(options)
    }

    pub fn policy(&self) -> &IdentityPolicy {
        &self.policy
    }
}

impl CertificateAuthenticator for CommonNameAuthenticator {
    fn verify_certificate(
        &self,
        conn: &ConnectionContext,
        state: &TlsConnectionState<'_>,
    ) -> AuthResult<bool> {
        if matches!(self.policy, IdentityPolicy::Unrestricted) {
            return Ok(true);
        }

        let common_names = state.common_names();
        let verified = self.policy.matches_any(&common_names);
        if verified {
            debug!(
                connection_id = %conn.connection_id(),
                "client certificate accepted"
            );
        } else {
            warn!(
                connection_id = %conn.connection_id(),
                client = %conn.client_address(),
                common_names = ?common_names,
                "client certificate rejected: no matching common name"
            );
        }
        Ok(verified)
    }
}
