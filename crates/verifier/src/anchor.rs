use x509_verifier_rust_crypto::Cert;

use crate::error::describe;
use crate::pem::{decode_pem, CERTIFICATE_LABEL};
use crate::VerifyError;

/// AWS public certificate for the PKCS#7 instance identity signature.
///
/// This cert is self-signed using DSA with SHA1 and covers the standard AWS
/// regions. It was retrieved from the EC2 documentation over TLS.
/// Serial: 00:96:BA:48:D9:E5:5E:1A:67
pub const AWS_PKCS7_CERT_PEM: &str = include_str!("../certs/aws-pkcs7.pem");

/// A certificate that passed its self-signature check.
///
/// Holds the DER encoding only; [`TrustAnchor::cert`] re-parses on demand so
/// the anchor can be owned and passed around freely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustAnchor {
    der: Vec<u8>,
}

impl TrustAnchor {
    /// Decodes and checks the certificate compiled into this build.
    pub fn pinned() -> Result<Self, VerifyError> {
        decode_certificate(AWS_PKCS7_CERT_PEM.as_bytes())
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }

    pub fn cert(&self) -> Result<Cert<'_>, VerifyError> {
        Cert::parse_der(&self.der).map_err(|err| VerifyError::Parse(describe(&err)))
    }
}

/// Extracts a PEM-encoded X.509 certificate and checks that it is self-signed.
pub fn decode_certificate(pem: &[u8]) -> Result<TrustAnchor, VerifyError> {
    let der = decode_pem(pem, CERTIFICATE_LABEL)?;

    let self_signed = {
        let cert = Cert::parse_der(&der).map_err(|err| VerifyError::Parse(describe(&err)))?;
        cert.is_self_signed()
    };

    // should be self-signed, so at least check that
    match self_signed {
        Ok(true) => {}
        Ok(false) => {
            return Err(VerifyError::Trust(
                "certificate signature does not verify under its own key".to_string(),
            ))
        }
        Err(err) => {
            return Err(VerifyError::Trust(format!(
                "couldn't verify self-signed certificate: {}",
                describe(&err)
            )))
        }
    }

    Ok(TrustAnchor { der })
}
