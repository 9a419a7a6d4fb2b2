//! Per-connection context handed to every verification call.
//!
//! The hosting server creates one [`ConnectionContext`] when a client
//! connects and passes it to credential and certificate verification. The
//! authenticators here only read it (for logging and custom policies); they
//! never keep it past the call.
//!
//! # Example
//!
//! ```
//! use std::net::SocketAddr;
//! use authenticator_core::auth::ConnectionContext;
//!
//! let addr: SocketAddr = "192.168.1.100:45678".parse().unwrap();
//! let context = ConnectionContext::new(addr, "conn-1").with_tls(true);
//!
//! assert_eq!(context.client_address(), addr);
//! assert_eq!(context.connection_id(), "conn-1");
//! assert!(context.is_tls());
//! ```

use std::net::SocketAddr;

/// Context for a client connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionContext {
    /// Client's remote address.
    client_address: SocketAddr,
    /// Connection identifier (for logging/tracing).
    connection_id: String,
    /// Whether the connection completed a TLS handshake.
    tls: bool,
}

impl ConnectionContext {
    /// Create a context for a plaintext connection.
    pub fn new(client_address: SocketAddr, connection_id: impl Into<String>) -> Self {
        Self {
            client_address,
            connection_id: connection_id.into(),
            tls: false,
        }
    }

    /// Mark whether the connection is TLS-protected.
    #[must_use]
    pub fn with_tls(mut self, tls: bool) -> Self {
        self.tls = tls;
        self
    }

    /// Get the client's remote address.
    pub fn client_address(&self) -> SocketAddr {
        self.client_address
    }

    /// Get the connection identifier.
    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    /// Check if the connection completed a TLS handshake.
    pub fn is_tls(&self) -> bool {
        self.tls
    }
}
