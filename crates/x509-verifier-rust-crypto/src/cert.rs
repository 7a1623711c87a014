use crate::verify_signature;
use crate::KeyAlgo;
use crate::PubKey;
use crate::SigAlgo;

use alloy_primitives::B256;
use anyhow::anyhow;
use sha2::Sha256;
use x509_parser::prelude::*;

#[derive(Debug, PartialEq, Clone)]
pub struct Cert<'a> {
    pub raw: X509Certificate<'a>,
    pub bytes: &'a [u8],
    pubkey_algo: KeyAlgo,
}

impl<'a> Cert<'a> {
    pub fn parse_der(bytes: &'a [u8]) -> anyhow::Result<Self> {
        let (remain, raw) = X509Certificate::from_der(bytes)
            .map_err(|err| anyhow!("parse cert failed: {:?}", err))?;
        if !remain.is_empty() {
            return Err(anyhow!("parse cert not consume all bytes"));
        }
        let pubkey_algo = KeyAlgo::from_spki(raw.public_key())?;
        Ok(Self {
            raw,
            bytes,
            pubkey_algo,
        })
    }

    pub fn validity(&self) -> (ASN1Time, ASN1Time) {
        let validity = &self.raw.validity;
        (validity.not_before, validity.not_after)
    }

    pub fn check_valid(&self, time: ASN1Time) -> anyhow::Result<()> {
        let validity = &self.raw.validity;
        if !validity.is_valid_at(time) {
            Err(anyhow!(
                "certificate is not valid at time: {}({}), range: {}({}) - {}({})",
                time,
                time.timestamp(),
                validity.not_before,
                validity.not_before.timestamp(),
                validity.not_after,
                validity.not_after.timestamp(),
            ))
        } else {
            Ok(())
        }
    }

    pub fn check_valid_at_timestamp(&self, timestamp: i64) -> anyhow::Result<()> {
        let time = ASN1Time::from_timestamp(timestamp)
            .map_err(|_| anyhow!("invalid timestamp: {}", timestamp))?;
        self.check_valid(time)
    }

    pub fn digest(&self) -> B256 {
        sha256(self.bytes)
    }

    pub fn pubkey_algo(&self) -> KeyAlgo {
        self.pubkey_algo
    }

    pub fn sig_algo(&self) -> anyhow::Result<SigAlgo> {
        SigAlgo::from_oid_str(&self.raw.signature_algorithm.oid().to_id_string())
    }

    pub fn pubkey(&self) -> PubKey<'_> {
        let info = self.raw.public_key();
        PubKey {
            algo: self.pubkey_algo,
            val: info.subject_public_key.as_ref(),
            spki: info.raw,
        }
    }

    pub fn signature(&self) -> &[u8] {
        self.raw.signature_value.as_ref()
    }

    pub fn tbs_certificate(&self) -> &[u8] {
        self.raw.tbs_certificate.as_ref()
    }

    /// DER encoding of the issuer name, exactly as it appears in the certificate.
    pub fn issuer_raw(&self) -> &'a [u8] {
        self.raw.tbs_certificate.issuer.as_raw()
    }

    /// Content octets of the serial number INTEGER, including any leading zero.
    pub fn serial_raw(&self) -> &'a [u8] {
        self.raw.tbs_certificate.raw_serial()
    }

    pub fn serial_hex(&self) -> String {
        hex::encode(self.serial_raw())
    }

    /// Byte-for-byte comparison against an issuer-and-serial-number reference.
    pub fn matches_issuer_serial(&self, issuer: &[u8], serial: &[u8]) -> bool {
        self.issuer_raw() == issuer && self.serial_raw() == serial
    }

    /// Checks the signature of this certificate against `issuer`, or against
    /// its own key when `issuer` is `None`.
    pub fn verify(&self, issuer: Option<&Self>) -> anyhow::Result<bool> {
        let issuer_key = issuer.unwrap_or(self).pubkey();
        let sig_algo = self.sig_algo()?;

        sig_algo.check_compatible_with(&issuer_key.algo)?;

        verify_signature(issuer_key, sig_algo, self.signature(), self.tbs_certificate())
    }

    pub fn is_self_signed(&self) -> anyhow::Result<bool> {
        self.verify(None)
    }
}

pub fn sha256(bytes: &[u8]) -> B256 {
    use sha2::Digest;
    let digest: [u8; 32] = Sha256::digest(bytes).into();
    digest.into()
}
