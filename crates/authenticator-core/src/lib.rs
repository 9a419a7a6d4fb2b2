//! Authenticator Core Library
//!
//! This library authenticates incoming connections for a network server
//! (for example a database wire-protocol server). A connection is accepted
//! through a credential exchange, a peer certificate check, or both.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`auth`] - The authentication manager and certificate authenticators
//! - [`sasl`] - SASL mechanisms, credential stores and credential authenticators
//! - [`tls`] - Server TLS configuration builder and acceptor
//! - [`config`] - Configuration loading and validation
//! - [`error`] - Domain-specific error types
//!
//! # Example
//!
//! ```rust,ignore
//! use authenticator_core::auth::{AuthManager, AuthServer};
//! use authenticator_core::config::AuthConfig;
//!
//! // Load configuration
//! let config = AuthConfig::from_file("auth.yaml")?;
//!
//! // Build the manager once, before accepting connections
//! let manager = AuthManager::from_config(&config)?;
//! let allowed = manager.verify_credential(&conn, &query)?;
//! ```

#![forbid(unsafe_code)]

pub mod auth;
pub mod config;
pub mod error;
pub mod sasl;
pub mod tls;

// Re-export commonly used types
pub use auth::{
    AuthManager, AuthServer, CertificateAuthenticator, CommonNameAuthenticator,
    ConnectionContext, TlsConnectionState,
};
pub use config::{AuthConfig, ClientAuthType, SaslMechanism};
pub use error::{AuthError, AuthResult, ConfigError, TlsError, TlsResult};
pub use sasl::{CredentialAuthenticator, CredentialQuery, CredentialStore};
pub use tls::{CertConfig, ServerTlsConfig, TlsServerAcceptor};
