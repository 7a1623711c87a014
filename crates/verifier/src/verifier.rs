use x509_verifier_rust_crypto::{verify_signature, Cert, DigestAlgo, SigAlgo};

use crate::error::describe;
use crate::{SignedEnvelope, SignerId, SignerRecord, TrustAnchor, VerifyError};

/// Overwrites whatever certificates the envelope carried with the anchor alone.
pub fn substitute_anchor(envelope: &mut SignedEnvelope, anchor: &TrustAnchor) {
    envelope.replace_certificates(vec![anchor.der().to_vec()]);
}

/// Verifies every signer of `envelope` against `anchor` and returns the
/// signed content.
///
/// Certificates embedded in the envelope are never consulted: they are
/// replaced by the anchor before any signer is resolved, so a forged blob
/// cannot bring its own signing certificate.
pub fn verify(mut envelope: SignedEnvelope, anchor: &TrustAnchor) -> Result<Vec<u8>, VerifyError> {
    // No matter what was in the PKCS7 blob, we only use the supplied certificate.
    substitute_anchor(&mut envelope, anchor);
    verify_signers(&envelope)?;
    Ok(envelope.content)
}

fn verify_signers(envelope: &SignedEnvelope) -> Result<(), VerifyError> {
    if envelope.signers.is_empty() {
        return Err(VerifyError::Trust("envelope has no signers".to_string()));
    }

    let candidates = envelope
        .certificates()
        .iter()
        .map(|der| Cert::parse_der(der))
        .collect::<anyhow::Result<Vec<_>>>()
        .map_err(|err| VerifyError::Parse(describe(&err)))?;

    for (idx, signer) in envelope.signers.iter().enumerate() {
        verify_signer(envelope, signer, &candidates).map_err(|err| {
            err.prefixed(format_args!(
                "signer [{}/{}]",
                idx + 1,
                envelope.signers.len()
            ))
        })?;
    }
    Ok(())
}

fn resolve_certificate<'c, 'a>(
    signer: &SignerRecord,
    candidates: &'c [Cert<'a>],
) -> Result<&'c Cert<'a>, VerifyError> {
    match &signer.sid {
        SignerId::IssuerAndSerial { issuer, serial } => candidates
            .iter()
            .find(|cert| cert.matches_issuer_serial(issuer, serial))
            .ok_or_else(|| {
                VerifyError::Trust(format!(
                    "signer certificate (serial {}) is not the pinned certificate",
                    hex::encode(serial)
                ))
            }),
        SignerId::SubjectKeyId(ski) => Err(VerifyError::Trust(format!(
            "signer referenced by subject key identifier {}, only issuer and serial number are accepted",
            hex::encode(ski)
        ))),
    }
}

fn verify_signer(
    envelope: &SignedEnvelope,
    signer: &SignerRecord,
    candidates: &[Cert<'_>],
) -> Result<(), VerifyError> {
    let cert = resolve_certificate(signer, candidates)?;

    let digest_algo = DigestAlgo::from_oid_str(&signer.digest_algorithm)
        .map_err(|err| VerifyError::Signature(describe(&err)))?;
    let sig_algo = SigAlgo::from_parts(&signer.signature_algorithm, digest_algo)
        .map_err(|err| VerifyError::Signature(describe(&err)))?;
    let key = cert.pubkey();
    sig_algo
        .check_compatible_with(&key.algo)
        .map_err(|err| VerifyError::Signature(describe(&err)))?;

    let message: &[u8] = match &signer.signed_attrs {
        Some(attrs) => {
            match attrs.content_type.as_deref() {
                Some(content_type) if content_type == envelope.content_type => {}
                Some(content_type) => {
                    return Err(VerifyError::Integrity(format!(
                        "signed content type {} does not match envelope content type {}",
                        content_type, envelope.content_type
                    )))
                }
                None => {
                    return Err(VerifyError::Integrity(
                        "signed attributes lack a content type".to_string(),
                    ))
                }
            }

            let expected = attrs.message_digest.as_deref().ok_or_else(|| {
                VerifyError::Integrity("signed attributes lack a message digest".to_string())
            })?;
            let actual = digest_algo.digest(&envelope.content);
            if expected != actual.as_slice() {
                return Err(VerifyError::Integrity(format!(
                    "content digest {} does not match signed digest {}",
                    hex::encode(&actual),
                    hex::encode(expected)
                )));
            }

            if let Some(signing_time) = attrs.signing_time {
                let timestamp = i64::try_from(signing_time).map_err(|_| {
                    VerifyError::Trust(format!("signing time {} out of range", signing_time))
                })?;
                cert.check_valid_at_timestamp(timestamp)
                    .map_err(|err| VerifyError::Trust(describe(&err)))?;
            }

            &attrs.der
        }
        None => &envelope.content,
    };

    match verify_signature(key, sig_algo, &signer.signature, message) {
        Ok(true) => Ok(()),
        Ok(false) => Err(VerifyError::Signature(
            "signature does not verify under the pinned certificate".to_string(),
        )),
        Err(err) => Err(VerifyError::Signature(describe(&err))),
    }
}

#[cfg(test)]
mod tests {
    use base64::prelude::*;

    use super::*;
    use crate::{decode_certificate, decode_envelope};

    fn anchor(name: &str) -> TrustAnchor {
        let pem = std::fs::read(format!("./samples/{}.pem", name)).unwrap();
        decode_certificate(&pem).unwrap()
    }

    fn envelope(name: &str) -> SignedEnvelope {
        let raw = std::fs::read(format!("./samples/{}.p7", name)).unwrap();
        decode_envelope(&raw).unwrap()
    }

    fn document() -> Vec<u8> {
        std::fs::read("./samples/document.json").unwrap()
    }

    #[test]
    fn test_verify_ber_sha1() {
        let content = verify(envelope("dsa_sha1_ber"), &anchor("anchor")).unwrap();
        assert_eq!(content, document());
    }

    #[test]
    fn test_verify_der_sha256() {
        let content = verify(envelope("dsa_sha256_der"), &anchor("anchor")).unwrap();
        assert_eq!(content, document());
    }

    #[test]
    fn test_verify_without_signed_attributes() {
        let content = verify(envelope("dsa_noattr"), &anchor("anchor")).unwrap();
        assert_eq!(content, document());
    }

    #[test]
    fn test_verify_rsa_and_ecdsa_signers() {
        let content = verify(envelope("rsa_sha256"), &anchor("rsa_cert")).unwrap();
        assert_eq!(content, document());
        let content = verify(envelope("ec_sha256"), &anchor("ec_cert")).unwrap();
        assert_eq!(content, document());
    }

    #[test]
    fn test_foreign_certificates_are_replaced() {
        let anchor = anchor("anchor");
        let mut envelope = envelope("foreign_certs");
        assert_eq!(envelope.certificates().len(), 3);
        substitute_anchor(&mut envelope, &anchor);
        assert_eq!(envelope.certificates(), &[anchor.der().to_vec()]);

        let content = verify(envelope, &anchor).unwrap();
        assert_eq!(content, document());
    }

    #[test]
    fn test_duplicate_embedded_certificates() {
        let content = verify(envelope("duplicate_certs"), &anchor("anchor")).unwrap();
        assert_eq!(content, document());
    }

    #[test]
    fn test_embedded_impostor_is_ignored() {
        // signed by a key whose certificate copies the anchor's issuer and
        // serial, and that certificate is embedded in the envelope
        let err = verify(envelope("impostor"), &anchor("anchor")).unwrap_err();
        assert!(matches!(err, VerifyError::Signature(_)), "{err}");
        assert!(err.message().starts_with("signer [1/"), "{err}");
    }

    #[test]
    fn test_impostor_anchor_rejected() {
        let err = verify(envelope("dsa_sha1_ber"), &anchor("impostor_cert")).unwrap_err();
        assert!(matches!(err, VerifyError::Signature(_)), "{err}");
    }

    #[test]
    fn test_unrelated_anchor_is_trust_error() {
        let err = verify(envelope("dsa_sha1_ber"), &anchor("rsa_cert")).unwrap_err();
        assert!(matches!(err, VerifyError::Trust(_)), "{err}");

        let err = verify(envelope("rsa_sha256"), &anchor("anchor")).unwrap_err();
        assert!(matches!(err, VerifyError::Trust(_)), "{err}");

        let pinned = TrustAnchor::pinned().unwrap();
        let err = verify(envelope("dsa_sha1_ber"), &pinned).unwrap_err();
        assert!(matches!(err, VerifyError::Trust(_)), "{err}");
    }

    #[test]
    fn test_every_signer_must_verify() {
        for name in ["anchor", "rsa_cert"] {
            let err = verify(envelope("multi"), &anchor(name)).unwrap_err();
            assert!(matches!(err, VerifyError::Trust(_)), "{err}");
        }
    }

    #[test]
    fn test_no_signers() {
        let mut envelope = envelope("dsa_sha1_ber");
        envelope.signers.clear();
        let err = verify(envelope, &anchor("anchor")).unwrap_err();
        assert!(matches!(err, VerifyError::Trust(_)), "{err}");
    }

    #[test]
    fn test_tampered_content() {
        let mut signed = envelope("dsa_sha1_ber");
        signed.content[20] ^= 0x01;
        let err = verify(signed, &anchor("anchor")).unwrap_err();
        assert!(matches!(err, VerifyError::Integrity(_)), "{err}");

        let mut unattributed = envelope("dsa_noattr");
        unattributed.content[20] ^= 0x01;
        let err = verify(unattributed, &anchor("anchor")).unwrap_err();
        assert!(matches!(err, VerifyError::Signature(_)), "{err}");
    }

    #[test]
    fn test_tampered_wire_bytes() {
        let raw = std::fs::read("./samples/dsa_sha1_ber.p7").unwrap();
        let joined: Vec<u8> = raw.into_iter().filter(|b| !b.is_ascii_whitespace()).collect();
        let mut ber = BASE64_STANDARD.decode(&joined).unwrap();

        let document = document();
        let offset = ber
            .windows(document.len())
            .position(|window| window == document.as_slice())
            .unwrap();
        // first "2" of the account id becomes "3"
        let target = offset + document.iter().position(|b| *b == b'2').unwrap();
        ber[target] ^= 0x01;

        let tampered = BASE64_STANDARD.encode(&ber);
        let envelope = decode_envelope(tampered.as_bytes()).unwrap();
        let err = verify(envelope, &anchor("anchor")).unwrap_err();
        assert!(
            matches!(err, VerifyError::Integrity(_) | VerifyError::Signature(_)),
            "{err}"
        );
    }

    #[test]
    fn test_tampered_signature() {
        let mut envelope = envelope("dsa_sha256_der");
        let last = envelope.signers[0].signature.len() - 1;
        envelope.signers[0].signature[last] ^= 0x01;
        let err = verify(envelope, &anchor("anchor")).unwrap_err();
        assert!(matches!(err, VerifyError::Signature(_)), "{err}");
    }

    #[test]
    fn test_unsupported_algorithms() {
        let mut envelope = envelope("dsa_sha1_ber");
        envelope.signers[0].digest_algorithm = "1.2.840.113549.2.5".to_string();
        let err = verify(envelope, &anchor("anchor")).unwrap_err();
        assert!(matches!(err, VerifyError::Signature(_)), "{err}");

        // declared digest disagrees with the combined signature algorithm
        let mut envelope = self::envelope("dsa_sha1_ber");
        envelope.signers[0].digest_algorithm =
            x509_verifier_rust_crypto::constants::OID_SHA256.to_string();
        let err = verify(envelope, &anchor("anchor")).unwrap_err();
        assert!(matches!(err, VerifyError::Signature(_)), "{err}");
    }

    #[test]
    fn test_content_type_mismatch() {
        let mut envelope = envelope("dsa_sha1_ber");
        envelope.content_type = "1.2.840.113549.1.7.5".to_string();
        let err = verify(envelope, &anchor("anchor")).unwrap_err();
        assert!(matches!(err, VerifyError::Integrity(_)), "{err}");
    }

    #[test]
    fn test_signing_time_outside_anchor_validity() {
        let mut envelope = envelope("dsa_sha1_ber");
        if let Some(attrs) = envelope.signers[0].signed_attrs.as_mut() {
            attrs.signing_time = Some(0);
        }
        let err = verify(envelope, &anchor("anchor")).unwrap_err();
        assert!(matches!(err, VerifyError::Trust(_)), "{err}");
    }
}
