//! Configuration types for the authentication manager.
//!
//! Configuration is loaded from YAML files and validated before use. A loaded
//! [`AuthConfig`] is immutable; it is turned into a ready-to-serve
//! [`AuthManager`](crate::auth::AuthManager) and
//! [`CertConfig`](crate::tls::CertConfig) once, before connections are
//! accepted.
//!
//! ```yaml
//! tls:
//!   client_auth: require_and_verify_client_cert
//!   cert_path: "/etc/ssl/server.crt"
//!   key_path: "/etc/ssl/server.key"
//!   ca_cert_paths: ["/etc/ssl/ca.crt"]
//! certificate:
//!   common_name_patterns: ["^svc-.*-prod$"]
//! sasl:
//!   enabled_mechanisms: [PLAIN, SCRAM-SHA-256]
//!   credentials:
//!     users:
//!       - username: "admin"
//!         password: "${ADMIN_PASSWORD}"
//! ```

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ConfigError, ConfigResult};

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AuthConfig {
    /// Server-side TLS settings. TLS is disabled when absent.
    #[serde(default)]
    pub tls: Option<TlsSettings>,

    /// Identity policy applied to peer certificates.
    #[serde(default)]
    pub certificate: CertificatePolicyConfig,

    /// SASL mechanisms and credential source.
    #[serde(default)]
    pub sasl: SaslConfig,
}

/// How the server treats client certificates during the TLS handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAuthType {
    /// Do not request a client certificate.
    NoClientCert,
    /// Request a client certificate but do not validate it.
    RequestClientCert,
    /// Require a client certificate but do not validate it.
    RequireAnyClientCert,
    /// Request a client certificate and verify it when one is presented.
    VerifyClientCertIfGiven,
    /// Require a client certificate signed by a configured root.
    #[default]
    RequireAndVerifyClientCert,
}

impl ClientAuthType {
    /// Check if the handshake asks the client for a certificate.
    #[must_use]
    pub fn requests_client_cert(&self) -> bool {
        !matches!(self, Self::NoClientCert)
    }

    /// Check if a handshake without a client certificate fails.
    #[must_use]
    pub fn requires_client_cert(&self) -> bool {
        matches!(
            self,
            Self::RequireAnyClientCert | Self::RequireAndVerifyClientCert
        )
    }

    /// Check if client certificates are verified against root certificates.
    #[must_use]
    pub fn verifies_client_cert(&self) -> bool {
        matches!(
            self,
            Self::VerifyClientCertIfGiven | Self::RequireAndVerifyClientCert
        )
    }
}

/// Server-side TLS settings, loaded from PEM files.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsSettings {
    /// Client certificate handling.
    #[serde(default)]
    pub client_auth: ClientAuthType,

    /// Path to the server certificate chain (PEM).
    pub cert_path: PathBuf,

    /// Path to the server private key (PEM).
    pub key_path: PathBuf,

    /// Paths to root certificates used to verify client certificates (PEM).
    #[serde(default)]
    pub ca_cert_paths: Vec<PathBuf>,
}

/// Identity policy for peer certificates.
///
/// At most one of the two fields may be set. With neither set every peer
/// certificate chain is accepted.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CertificatePolicyConfig {
    /// Exact subject common name a peer certificate must carry.
    #[serde(default)]
    pub common_name: Option<String>,

    /// Regular expressions; a peer certificate common name must match one.
    /// An empty list rejects every peer.
    #[serde(default)]
    pub common_name_patterns: Option<Vec<String>>,
}

/// SASL authentication mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum SaslMechanism {
    /// SASL/PLAIN - simple username/password authentication.
    #[serde(rename = "PLAIN")]
    Plain,
    /// SASL/SCRAM-SHA-256 - salted challenge-response authentication.
    #[serde(rename = "SCRAM-SHA-256")]
    ScramSha256,
    /// SASL/SCRAM-SHA-512 - salted challenge-response authentication.
    #[serde(rename = "SCRAM-SHA-512")]
    ScramSha512,
}

impl SaslMechanism {
    /// All built-in mechanisms, in advertisement order.
    pub const ALL: [SaslMechanism; 3] = [Self::Plain, Self::ScramSha256, Self::ScramSha512];

    /// Get the mechanism name as used in the SASL exchange.
    #[must_use]
    pub fn mechanism_name(&self) -> &'static str {
        match self {
            Self::Plain => "PLAIN",
            Self::ScramSha256 => "SCRAM-SHA-256",
            Self::ScramSha512 => "SCRAM-SHA-512",
        }
    }
}

/// SASL configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SaslConfig {
    /// Mechanisms offered to clients.
    #[serde(default = "default_enabled_mechanisms")]
    pub enabled_mechanisms: Vec<SaslMechanism>,

    /// Credential source. Credential verification fails until one is set.
    #[serde(default)]
    pub credentials: Option<CredentialConfig>,
}

impl Default for SaslConfig {
    fn default() -> Self {
        Self {
            enabled_mechanisms: default_enabled_mechanisms(),
            credentials: None,
        }
    }
}

/// Where user credentials come from.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum CredentialConfig {
    /// Users listed directly in the configuration file.
    Inline { users: Vec<UserCredential> },
    /// A `[group/]username:password` file.
    File { file: PathBuf },
}

/// A single user listed in the configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UserCredential {
    /// Username.
    pub username: String,

    /// Password. Supports environment variable expansion: "${DB_PASSWORD}"
    pub password: String,

    /// Optional group (database, tenant, ...) the user belongs to.
    #[serde(default)]
    pub group: Option<String>,
}

impl UserCredential {
    /// Get the password with environment variables expanded.
    #[must_use]
    pub fn password(&self) -> String {
        expand_env_vars(&self.password)
    }
}

/// Expand environment variables in a string.
///
/// Replaces `${VAR_NAME}` with the value of the environment variable `VAR_NAME`.
/// If the variable is not set, replaces with an empty string.
fn expand_env_vars(s: &str) -> String {
    let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid regex");
    re.replace_all(s, |caps: &regex::Captures| {
        std::env::var(&caps[1]).unwrap_or_default()
    })
    .to_string()
}

fn default_enabled_mechanisms() -> Vec<SaslMechanism> {
    SaslMechanism::ALL.to_vec()
}

// Configuration loading and validation

impl AuthConfig {
    /// Load configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if
    /// validation fails.
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            path: path.display().to_string(),
            source: e,
        })?;

        Self::from_str(&content)
    }

    /// Load configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if parsing or validation fails.
    pub fn from_str(content: &str) -> ConfigResult<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any validation check fails.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.certificate.common_name.is_some()
            && self.certificate.common_name_patterns.is_some()
        {
            return Err(ConfigError::Invalid(
                "certificate.common_name and certificate.common_name_patterns are mutually exclusive"
                    .to_string(),
            ));
        }

        if self.sasl.enabled_mechanisms.is_empty() {
            return Err(ConfigError::Invalid(
                "sasl.enabled_mechanisms must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}
