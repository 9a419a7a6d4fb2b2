//! Shared test PKI: a CA plus server and client certificates it signs.

#![allow(dead_code)]

use std::net::SocketAddr;

use authenticator_core::auth::ConnectionContext;
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DistinguishedName, DnType, IsCa, KeyPair,
};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};

/// A certificate and its private key.
pub struct Identity {
    pub cert: Certificate,
    pub key: KeyPair,
}

impl Identity {
    pub fn cert_pem(&self) -> String {
        self.cert.pem()
    }

    pub fn key_pem(&self) -> String {
        self.key.serialize_pem()
    }

    pub fn cert_der(&self) -> CertificateDer<'static> {
        self.cert.der().clone()
    }

    pub fn key_der(&self) -> PrivateKeyDer<'static> {
        PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(self.key.serialize_der()))
    }
}

fn params(common_name: &str, subject_alt_names: Vec<String>) -> CertificateParams {
    let mut params = CertificateParams::new(subject_alt_names).unwrap();
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, common_name);
    params.distinguished_name = dn;
    params
}

/// A self-signed certificate authority.
pub fn ca(common_name: &str) -> Identity {
    let key = KeyPair::generate().unwrap();
    let mut ca_params = params(common_name, Vec::new());
    ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    let cert = ca_params.self_signed(&key).unwrap();
    Identity { cert, key }
}

/// A leaf certificate signed by `issuer`.
pub fn leaf(issuer: &Identity, common_name: &str, subject_alt_names: &[&str]) -> Identity {
    let key = KeyPair::generate().unwrap();
    let sans = subject_alt_names.iter().map(|s| s.to_string()).collect();
    let cert = params(common_name, sans)
        .signed_by(&key, &issuer.cert, &issuer.key)
        .unwrap();
    Identity { cert, key }
}

/// A self-signed leaf certificate.
pub fn self_signed(common_name: &str) -> Identity {
    let key = KeyPair::generate().unwrap();
    let cert = params(common_name, Vec::new()).self_signed(&key).unwrap();
    Identity { cert, key }
}

pub fn connection(id: &str) -> ConnectionContext {
    let addr: SocketAddr = "192.0.2.10:40000".parse().unwrap();
    ConnectionContext::new(addr, id).with_tls(true)
}
