//! Connection authentication.
//!
//! This module provides the verification surface a hosting server calls
//! when a client connects:
//! - Credential verification through the SASL layer (see [`crate::sasl`])
//! - Peer certificate verification against a Common Name policy
//!
//! Both are reached through [`AuthManager`].
//!
//! # Failure semantics
//!
//! A credential check with no credential authenticator and no credential
//! store fails with `AuthError::NoCredentialAuthenticator`. A certificate
//! check with no certificate authenticator succeeds. A check that runs and
//! does not match returns `Ok(false)`.
//!
//! # Example Configuration
//!
//! ```yaml
//! certificate:
//!   # Exact match: common_name: "svc-A"
//!   common_name_patterns: ["^svc-.*-prod$"]
//! sasl:
//!   enabled_mechanisms: [SCRAM-SHA-256]
//!   credentials:
//!     file: "/etc/authenticator/users.txt"
//! ```

pub mod certificate;
pub mod context;
pub mod manager;

pub use certificate::{
    CertificateAuthenticator, CertificateAuthenticatorOption, CommonNameAuthenticator,
    IdentityPolicy, TlsConnectionState,
};
pub use context::ConnectionContext;
pub use manager::{AuthManager, AuthServer};
