//! SASL/SCRAM mechanisms.
//!
//! SCRAM (Salted Challenge Response Authentication Mechanism) proves
//! knowledge of the password without transmitting it. The server derives the
//! salted keys from the stored credential once per session.
//!
//! Supports:
//! - SCRAM-SHA-256 (RFC 7677)
//! - SCRAM-SHA-512
//!
//! Channel binding (`p=` GS2 flag) is not supported.

use std::marker::PhantomData;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use pbkdf2::pbkdf2_hmac;
use rand::distributions::Alphanumeric;
use rand::Rng;
use sha2::{Digest, Sha256, Sha512};
use tracing::{debug, warn};

use crate::auth::ConnectionContext;
use crate::error::AuthError;

use super::authenticator::secrets_match;
use super::query::CredentialQuery;
use super::{CredentialVerifier, Mechanism, SaslSession, SaslStepResult};

/// Minimum number of PBKDF2 iterations (per RFC 7677)
pub const MIN_ITERATIONS: u32 = 4096;

/// Salt length in bytes
pub const SALT_LENGTH: usize = 16;

/// Server nonce length in characters
pub const NONCE_LENGTH: usize = 24;

/// Hash algorithm for a SCRAM variant.
pub trait ScramHash: Send + Sync + std::fmt::Debug + 'static {
    /// The SASL mechanism name.
    const NAME: &'static str;

    fn hmac(key: &[u8], data: &[u8]) -> Vec<u8>;

    fn hash(data: &[u8]) -> Vec<u8>;

    /// `Hi()` from RFC 5802: PBKDF2 with this hash.
    fn salted_password(password: &[u8], salt: &[u8], iterations: u32) -> Vec<u8>;
}

macro_rules! scram_hash {
    ($name:ident, $digest:ty, $mechanism:literal) => {
        #[derive(Debug)]
        pub struct $name;

        impl ScramHash for $name {
            const NAME: &'static str = $mechanism;

            fn hmac(key: &[u8], data: &[u8]) -> Vec<u8> {
                let mut mac =
                    Hmac::<$digest>::new_from_slice(key).expect("HMAC can take key of any size");
                mac.update(data);
                mac.finalize().into_bytes().to_vec()
            }

            fn hash(data: &[u8]) -> Vec<u8> {
                <$digest>::digest(data).to_vec()
            }

            fn salted_password(password: &[u8], salt: &[u8], iterations: u32) -> Vec<u8> {
                let mut output = vec![0u8; <$digest>::output_size()];
                pbkdf2_hmac::<$digest>(password, salt, iterations, &mut output);
                output
            }
        }
    };
}

scram_hash!(ScramSha256, Sha256, "SCRAM-SHA-256");
scram_hash!(ScramSha512, Sha512, "SCRAM-SHA-512");

/// Keys derived from a stored password for one exchange.
#[derive(Debug, Clone)]
pub struct ScramKeys {
    pub salt: Vec<u8>,
    pub iterations: u32,
    /// `H(HMAC(SaltedPassword, "Client Key"))`
    pub stored_key: Vec<u8>,
    /// `HMAC(SaltedPassword, "Server Key")`
    pub server_key: Vec<u8>,
}

impl ScramKeys {
    /// Derive keys for `password` with the given salt and iteration count.
    pub fn derive<H: ScramHash>(password: &str, salt: &[u8], iterations: u32) -> Self {
        let salted_password = H::salted_password(password.as_bytes(), salt, iterations);
        let client_key = H::hmac(&salted_password, b"Client Key");
        Self {
            salt: salt.to_vec(),
            iterations,
            stored_key: H::hash(&client_key),
            server_key: H::hmac(&salted_password, b"Server Key"),
        }
    }
}

/// SCRAM session state for multi-step authentication.
#[derive(Debug, Default)]
pub struct ScramSessionState {
    /// GS2 header from the client-first message (e.g. `n,,`).
    pub gs2_header: String,
    /// Client's first message (without header).
    pub client_first_message_bare: String,
    /// Server's first message.
    pub server_first_message: String,
    /// Combined nonce (client + server).
    pub combined_nonce: String,
    /// Username being authenticated.
    pub username: String,
    /// Keys derived in the first step.
    pub keys: Option<ScramKeys>,
}

/// Parsed client-first-message.
#[derive(Debug, PartialEq, Eq)]
struct ClientFirst {
    gs2_header: String,
    bare: String,
    username: String,
    nonce: String,
}

/// Parse `gs2-header client-first-message-bare`.
fn parse_client_first(message: &str) -> Result<ClientFirst, AuthError> {
    let invalid = |reason: &str| AuthError::InvalidMessage(format!("SCRAM client-first: {reason}"));

    let mut header = message.splitn(3, ',');
    let cbind_flag = header.next().unwrap_or_default();
    let authzid = header.next().ok_or_else(|| invalid("missing GS2 header"))?;
    let bare = header.next().ok_or_else(|| invalid("missing GS2 header"))?;

    match cbind_flag {
        "n" | "y" => {}
        flag if flag.starts_with("p=") => {
            return Err(invalid("channel binding is not supported"));
        }
        _ => return Err(invalid("invalid channel binding flag")),
    }
    if !authzid.is_empty() && !authzid.starts_with("a=") {
        return Err(invalid("invalid authorization identity"));
    }

    let mut username = None;
    let mut nonce = None;
    for attribute in bare.split(',') {
        if let Some(value) = attribute.strip_prefix("n=") {
            username = Some(decode_saslname(value)?);
        } else if let Some(value) = attribute.strip_prefix("r=") {
            nonce = Some(value.to_string());
        }
    }

    let username = username
        .filter(|name| !name.is_empty())
        .ok_or_else(|| invalid("missing username"))?;
    let nonce = nonce
        .filter(|nonce| !nonce.is_empty())
        .ok_or_else(|| invalid("missing client nonce"))?;

    Ok(ClientFirst {
        gs2_header: format!("{cbind_flag},{authzid},"),
        bare: bare.to_string(),
        username,
        nonce,
    })
}

/// Decode `=2C` and `=3D` escapes in a SCRAM username.
fn decode_saslname(value: &str) -> Result<String, AuthError> {
    let mut decoded = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(pos) = rest.find('=') {
        decoded.push_str(&rest[..pos]);
        let escape = rest.get(pos..pos + 3);
        match escape {
            Some("=2C") => decoded.push(','),
            Some("=3D") => decoded.push('='),
            _ => {
                return Err(AuthError::InvalidMessage(
                    "SCRAM username contains an invalid escape".to_string(),
                ))
            }
        }
        rest = &rest[pos + 3..];
    }
    decoded.push_str(rest);
    Ok(decoded)
}

/// Parsed client-final-message.
#[derive(Debug)]
struct ClientFinal<'a> {
    without_proof: &'a str,
    channel_binding: Vec<u8>,
    nonce: &'a str,
    proof: Vec<u8>,
}

/// Parse `c=...,r=...[,extensions],p=...`.
fn parse_client_final(message: &str) -> Result<ClientFinal<'_>, AuthError> {
    let invalid = |reason: &str| AuthError::InvalidMessage(format!("SCRAM client-final: {reason}"));

    let idx = message.rfind(",p=").ok_or_else(|| invalid("missing client proof"))?;
    let without_proof = &message[..idx];
    let proof = BASE64
        .decode(&message[idx + 3..])
        .map_err(|_| invalid("invalid proof encoding"))?;

    let mut channel_binding = None;
    let mut nonce = None;
    for attribute in without_proof.split(',') {
        if let Some(value) = attribute.strip_prefix("c=") {
            channel_binding = Some(
                BASE64
                    .decode(value)
                    .map_err(|_| invalid("invalid channel binding encoding"))?,
            );
        } else if let Some(value) = attribute.strip_prefix("r=") {
            nonce = Some(value);
        }
    }

    Ok(ClientFinal {
        without_proof,
        channel_binding: channel_binding.ok_or_else(|| invalid("missing channel binding"))?,
        nonce: nonce.ok_or_else(|| invalid("missing nonce"))?,
        proof,
    })
}

fn generate_nonce() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(NONCE_LENGTH)
        .map(char::from)
        .collect()
}

fn generate_salt() -> Vec<u8> {
    let mut salt = vec![0u8; SALT_LENGTH];
    rand::thread_rng().fill(salt.as_mut_slice());
    salt
}

/// SCRAM server mechanism, generic over the hash.
#[derive(Debug)]
pub struct ScramMechanism<H: ScramHash> {
    iterations: u32,
    _marker: PhantomData<H>,
}

impl<H: ScramHash> Default for ScramMechanism<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: ScramHash> ScramMechanism<H> {
    #[must_use]
    pub fn new() -> Self {
        Self::with_iterations(MIN_ITERATIONS)
    }

    /// Use a custom PBKDF2 iteration count (clamped to [`MIN_ITERATIONS`]).
    #[must_use]
    pub fn with_iterations(iterations: u32) -> Self {
        Self {
            iterations: iterations.max(MIN_ITERATIONS),
            _marker: PhantomData,
        }
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    fn client_first(
        &self,
        verifier: &dyn CredentialVerifier,
        message: &str,
        state: &mut ScramSessionState,
    ) -> SaslStepResult {
        let first = match parse_client_first(message) {
            Ok(first) => first,
            Err(e) => return SaslStepResult::Failed(e),
        };

        let query = CredentialQuery::builder()
            .username(first.username.clone())
            .mechanism(H::NAME)
            .build();
        // An unknown user gets keys from a random password, so the exchange
        // looks the same as for a known user and fails at client-final.
        let password = match query.and_then(|q| verifier.lookup_credential(&q)) {
            Ok(Some(credential)) => credential.password,
            Ok(None) => {
                warn!(
                    username = %first.username,
                    mechanism = H::NAME,
                    "SCRAM: unknown user, continuing with simulated credentials"
                );
                generate_nonce()
            }
            Err(e) => return SaslStepResult::Failed(e),
        };

        let keys = ScramKeys::derive::<H>(&password, &generate_salt(), self.iterations);
        let combined_nonce = format!("{}{}", first.nonce, generate_nonce());
        let server_first = format!(
            "r={},s={},i={}",
            combined_nonce,
            BASE64.encode(&keys.salt),
            keys.iterations
        );

        *state = ScramSessionState {
            gs2_header: first.gs2_header,
            client_first_message_bare: first.bare,
            server_first_message: server_first.clone(),
            combined_nonce,
            username: first.username,
            keys: Some(keys),
        };

        debug!(
            username = %state.username,
            mechanism = H::NAME,
            "SCRAM: sending server-first-message"
        );
        SaslStepResult::Continue(server_first.into_bytes())
    }

    fn client_final(
        &self,
        message: &str,
        state: &ScramSessionState,
        keys: &ScramKeys,
    ) -> Result<String, AuthError> {
        let last = parse_client_final(message)?;

        if last.channel_binding != state.gs2_header.as_bytes() {
            warn!(username = %state.username, "SCRAM: channel binding mismatch");
            return Err(AuthError::InvalidCredentials);
        }
        if last.nonce != state.combined_nonce {
            warn!(username = %state.username, "SCRAM: nonce mismatch");
            return Err(AuthError::InvalidCredentials);
        }

        let auth_message = format!(
            "{},{},{}",
            state.client_first_message_bare, state.server_first_message, last.without_proof
        );

        // ClientKey = ClientProof XOR HMAC(StoredKey, AuthMessage)
        let client_signature = H::hmac(&keys.stored_key, auth_message.as_bytes());
        if last.proof.len() != client_signature.len() {
            return Err(AuthError::InvalidCredentials);
        }
        let client_key: Vec<u8> = last
            .proof
            .iter()
            .zip(&client_signature)
            .map(|(a, b)| a ^ b)
            .collect();

        if !secrets_match(&H::hash(&client_key), &keys.stored_key) {
            warn!(username = %state.username, "SCRAM: authentication failed");
            return Err(AuthError::InvalidCredentials);
        }

        let server_signature = H::hmac(&keys.server_key, auth_message.as_bytes());
        Ok(format!("v={}", BASE64.encode(server_signature)))
    }
}

impl<H: ScramHash> Mechanism for ScramMechanism<H> {
    fn name(&self) -> &'static str {
        H::NAME
    }

    fn step(
        &self,
        verifier: &dyn CredentialVerifier,
        _conn: &ConnectionContext,
        client_message: &[u8],
        session: &mut SaslSession,
    ) -> SaslStepResult {
        let Ok(message) = std::str::from_utf8(client_message) else {
            return SaslStepResult::Failed(AuthError::InvalidMessage(
                "invalid UTF-8 in SCRAM message".to_string(),
            ));
        };

        let state = session.scram_state.get_or_insert_with(ScramSessionState::default);
        let Some(keys) = state.keys.clone() else {
            return self.client_first(verifier, message, state);
        };

        match self.client_final(message, state, &keys) {
            Ok(server_final) => {
                debug!(
                    username = %state.username,
                    mechanism = H::NAME,
                    "SCRAM: authentication successful"
                );
                session.authenticated_user = Some(state.username.clone());
                session.scram_state = None;
                SaslStepResult::Complete(server_final.into_bytes())
            }
            Err(e) => {
                session.scram_state = None;
                SaslStepResult::Failed(e)
            }
        }
    }
}

pub type ScramSha256Mechanism = ScramMechanism<ScramSha256>;
pub type ScramSha512Mechanism = ScramMechanism<ScramSha512>;
