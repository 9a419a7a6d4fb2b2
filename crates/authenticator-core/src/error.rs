//! Domain error types for the authentication manager.
//!
//! Uses `thiserror` for ergonomic error definitions with proper context.
//!
//! A verification that simply does not match is not an error: it is reported
//! as `Ok(false)` by the verifying call. The types below cover configuration
//! failures, missing collaborators and malformed client input.

use thiserror::Error;

/// Errors raised while verifying credentials or certificates.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// The supplied credentials were rejected.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// A client message could not be parsed.
    #[error("invalid authentication message: {0}")]
    InvalidMessage(String),

    /// The requested SASL mechanism is not enabled.
    #[error("unsupported SASL mechanism: {0}")]
    UnsupportedMechanism(String),

    /// Neither a credential authenticator nor a credential store is configured.
    #[error("no credential authenticator or credential store configured")]
    NoCredentialAuthenticator,

    /// The credential store failed to load or answer a lookup.
    #[error("credential store error: {0}")]
    CredentialStore(String),

    /// A common name pattern did not compile.
    #[error("invalid common name pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    /// The query's encrypt function failed.
    #[error("password encryption failed: {0}")]
    Encrypt(String),
}

/// Errors related to TLS key material and configuration.
#[derive(Error, Debug)]
pub enum TlsError {
    /// A certificate file could not be read.
    #[error("failed to load certificate from '{path}': {message}")]
    CertificateLoad { path: String, message: String },

    /// A private key file could not be read or parsed.
    #[error("failed to load private key from '{path}': {message}")]
    PrivateKeyLoad { path: String, message: String },

    /// No PEM certificate was found in the input.
    #[error("no certificates found in {0}")]
    NoCertificates(String),

    /// No PEM private key was found in the input.
    #[error("no private key found in {0}")]
    NoPrivateKeys(String),

    /// rustls rejected the assembled configuration.
    #[error("TLS configuration error: {0}")]
    Config(String),

    /// The TLS handshake with a peer failed.
    #[error("TLS handshake failed: {0}")]
    Handshake(String),
}

/// Errors related to configuration parsing and validation.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file '{path}': {source}")]
    IoError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse YAML configuration.
    #[error("failed to parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    /// The configuration is structurally valid YAML but semantically wrong.
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// Building an authenticator from the configuration failed.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Building the TLS configuration failed.
    #[error(transparent)]
    Tls(#[from] TlsError),
}

/// Result type alias for verification operations.
pub type AuthResult<T> = std::result::Result<T, AuthError>;

/// Result type alias for TLS operations.
pub type TlsResult<T> = std::result::Result<T, TlsError>;

/// Result type alias for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
