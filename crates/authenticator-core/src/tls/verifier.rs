//! Client certificate verifiers that bypass chain validation.
//!
//! Used for the client-auth modes webpki cannot express: requesting a
//! certificate without validating it, and verifying against an empty root
//! store (every presented certificate is rejected).

use std::sync::Arc;

use rustls::client::danger::HandshakeSignatureValid;
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, UnixTime};
use rustls::server::danger::{ClientCertVerified, ClientCertVerifier};
use rustls::{CertificateError, DigitallySignedStruct, DistinguishedName, Error, SignatureScheme};

/// What to do with a presented client certificate chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ChainDecision {
    Accept,
    Reject,
}

/// A client certificate verifier that decides without consulting any root.
///
/// Handshake signatures are still checked, so a client must hold the key for
/// the certificate it presents.
#[derive(Debug)]
pub(crate) struct UnverifiedClientCert {
    provider: Arc<CryptoProvider>,
    mandatory: bool,
    decision: ChainDecision,
}

impl UnverifiedClientCert {
    pub(crate) fn accept_any(provider: Arc<CryptoProvider>, mandatory: bool) -> Arc<Self> {
        Arc::new(Self {
            provider,
            mandatory,
            decision: ChainDecision::Accept,
        })
    }

    pub(crate) fn reject_all(provider: Arc<CryptoProvider>, mandatory: bool) -> Arc<Self> {
        Arc::new(Self {
            provider,
            mandatory,
            decision: ChainDecision::Reject,
        })
    }
}

impl ClientCertVerifier for UnverifiedClientCert {
    fn client_auth_mandatory(&self) -> bool {
        self.mandatory
    }

    fn root_hint_subjects(&self) -> &[DistinguishedName] {
        &[]
    }

    fn verify_client_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _now: UnixTime,
    ) -> Result<ClientCertVerified, Error> {
        match self.decision {
            ChainDecision::Accept => Ok(ClientCertVerified::assertion()),
            ChainDecision::Reject => {
                Err(Error::InvalidCertificate(CertificateError::UnknownIssuer))
            }
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, Error> {
        verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, Error> {
        verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcgen::{CertificateParams, KeyPair};

    fn provider() -> Arc<CryptoProvider> {
        Arc::new(rustls::crypto::ring::default_provider())
    }

    fn cert() -> CertificateDer<'static> {
        let key = KeyPair::generate().unwrap();
        let params = CertificateParams::new(vec!["client".to_string()]).unwrap();
        params.self_signed(&key).unwrap().der().clone()
    }

    #[test]
    fn test_accept_any() {
        let verifier = UnverifiedClientCert::accept_any(provider(), true);
        assert!(verifier.offer_client_auth());
        assert!(verifier.client_auth_mandatory());
        assert!(verifier
            .verify_client_cert(&cert(), &[], UnixTime::now())
            .is_ok());
    }

    #[test]
    fn test_reject_all() {
        let verifier = UnverifiedClientCert::reject_all(provider(), false);
        assert!(verifier.offer_client_auth());
        assert!(!verifier.client_auth_mandatory());
        assert!(matches!(
            verifier.verify_client_cert(&cert(), &[], UnixTime::now()),
            Err(Error::InvalidCertificate(CertificateError::UnknownIssuer))
        ));
    }

    #[test]
    fn test_supported_schemes_follow_provider() {
        let verifier = UnverifiedClientCert::accept_any(provider(), false);
        assert!(!verifier.supported_verify_schemes().is_empty());
    }
}
