//! Server-side TLS support.
//!
//! - **Configuration** (`cert_config` module): collect key material and
//!   build a cached rustls server configuration
//! - **Acceptor** (`server` module): accept client connections over TLS and
//!   expose their peer certificates
//!
//! # Usage
//!
//! ```rust,ignore
//! use authenticator_core::auth::{AuthManager, AuthServer, ConnectionContext};
//! use authenticator_core::tls::{CertConfig, TlsServerAcceptor};
//!
//! let mut cert_config = CertConfig::from_settings(&settings)?;
//! let tls = cert_config.tls_config()?.expect("TLS enabled");
//! let acceptor = TlsServerAcceptor::new(&tls);
//!
//! let (tcp, addr) = listener.accept().await?;
//! let stream = acceptor.accept(tcp).await?;
//! let conn = ConnectionContext::new(addr, "conn-1").with_tls(true);
//! let allowed = manager.verify_certificate(&conn, &TlsServerAcceptor::connection_state(&stream))?;
//! ```

pub mod cert_config;
pub mod server;
mod verifier;

pub use crate::config::ClientAuthType;
pub use cert_config::{CacheState, CertConfig, ServerTlsConfig, MIN_PROTOCOL_VERSION};
pub use server::{load_certificates, load_private_key, TlsServerAcceptor};
