use anyhow::anyhow;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::Pkcs1v15Sign;
use rsa::RsaPublicKey;
use sha1::Sha1;
use sha2::{Sha256, Sha384, Sha512};
use signature::hazmat::PrehashVerifier;
use spki::DecodePublicKey;
use x509_parser::x509::SubjectPublicKeyInfo;

use crate::constants::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EcCurve {
    P256,
    P384,
}

impl EcCurve {
    /// The curve is inferred from the size of the SEC1 encoded point,
    /// compressed or not.
    pub fn from_point_len(len: usize) -> anyhow::Result<Self> {
        Ok(match len {
            33 | 65 => EcCurve::P256,
            49 | 97 => EcCurve::P384,
            len => return Err(anyhow!("unsupported ec point length: {}", len)),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAlgo {
    RSA,
    ECDSA(EcCurve),
    DSA,
}

impl KeyAlgo {
    pub fn from_spki(info: &SubjectPublicKeyInfo<'_>) -> anyhow::Result<Self> {
        let oid = info.algorithm.oid().to_id_string();
        Ok(match oid.as_str() {
            OID_RSA_ENCRYPTION => KeyAlgo::RSA,
            OID_DSA => KeyAlgo::DSA,
            OID_EC_PUBLIC_KEY => {
                KeyAlgo::ECDSA(EcCurve::from_point_len(info.subject_public_key.as_ref().len())?)
            }
            other => return Err(anyhow!("unsupported public key algorithm: {}", other)),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestAlgo {
    SHA1,
    SHA256,
    SHA384,
    SHA512,
}

impl DigestAlgo {
    pub fn from_oid_str(oid: &str) -> anyhow::Result<Self> {
        Ok(match oid {
            OID_SHA1 => DigestAlgo::SHA1,
            OID_SHA256 => DigestAlgo::SHA256,
            OID_SHA384 => DigestAlgo::SHA384,
            OID_SHA512 => DigestAlgo::SHA512,
            other => return Err(anyhow!("unsupported digest algorithm: {}", other)),
        })
    }

    pub fn digest(&self, bytes: &[u8]) -> Vec<u8> {
        use sha2::Digest;
        match self {
            DigestAlgo::SHA1 => Sha1::digest(bytes).to_vec(),
            DigestAlgo::SHA256 => Sha256::digest(bytes).to_vec(),
            DigestAlgo::SHA384 => Sha384::digest(bytes).to_vec(),
            DigestAlgo::SHA512 => Sha512::digest(bytes).to_vec(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigAlgo {
    RsaSHA1,
    RsaSHA256,
    RsaSHA384,
    RsaSHA512,
    EcdsaSHA256,
    EcdsaSHA384,
    DsaSHA1,
    DsaSHA256,
}

impl SigAlgo {
    /// Resolves a combined signature algorithm identifier such as
    /// `sha256WithRSAEncryption`.
    pub fn from_oid_str(oid: &str) -> anyhow::Result<Self> {
        Ok(match oid {
            OID_SHA1_WITH_RSA => SigAlgo::RsaSHA1,
            OID_SHA256_WITH_RSA => SigAlgo::RsaSHA256,
            OID_SHA384_WITH_RSA => SigAlgo::RsaSHA384,
            OID_SHA512_WITH_RSA => SigAlgo::RsaSHA512,
            OID_ECDSA_WITH_SHA256 => SigAlgo::EcdsaSHA256,
            OID_ECDSA_WITH_SHA384 => SigAlgo::EcdsaSHA384,
            OID_DSA_WITH_SHA1 => SigAlgo::DsaSHA1,
            OID_DSA_WITH_SHA256 => SigAlgo::DsaSHA256,
            other => return Err(anyhow!("unsupported signature algorithm: {}", other)),
        })
    }

    /// Resolves the pair carried by a PKCS#7 signer info. The signature
    /// algorithm may name only the key type, in which case the digest
    /// algorithm completes it. A combined identifier must agree with the
    /// declared digest.
    pub fn from_parts(sig_oid: &str, digest: DigestAlgo) -> anyhow::Result<Self> {
        let algo = match sig_oid {
            OID_RSA_ENCRYPTION => match digest {
                DigestAlgo::SHA1 => SigAlgo::RsaSHA1,
                DigestAlgo::SHA256 => SigAlgo::RsaSHA256,
                DigestAlgo::SHA384 => SigAlgo::RsaSHA384,
                DigestAlgo::SHA512 => SigAlgo::RsaSHA512,
            },
            OID_EC_PUBLIC_KEY => match digest {
                DigestAlgo::SHA256 => SigAlgo::EcdsaSHA256,
                DigestAlgo::SHA384 => SigAlgo::EcdsaSHA384,
                digest => return Err(anyhow!("unsupported ecdsa digest: {:?}", digest)),
            },
            OID_DSA => match digest {
                DigestAlgo::SHA1 => SigAlgo::DsaSHA1,
                DigestAlgo::SHA256 => SigAlgo::DsaSHA256,
                digest => return Err(anyhow!("unsupported dsa digest: {:?}", digest)),
            },
            oid => SigAlgo::from_oid_str(oid)?,
        };
        if algo.digest_algo() != digest {
            return Err(anyhow!(
                "signature algorithm {:?} does not match digest algorithm {:?}",
                algo,
                digest
            ));
        }
        Ok(algo)
    }

    pub fn digest_algo(&self) -> DigestAlgo {
        match self {
            SigAlgo::RsaSHA1 | SigAlgo::DsaSHA1 => DigestAlgo::SHA1,
            SigAlgo::RsaSHA256 | SigAlgo::EcdsaSHA256 | SigAlgo::DsaSHA256 => DigestAlgo::SHA256,
            SigAlgo::RsaSHA384 | SigAlgo::EcdsaSHA384 => DigestAlgo::SHA384,
            SigAlgo::RsaSHA512 => DigestAlgo::SHA512,
        }
    }

    pub fn check_compatible_with(&self, key: &KeyAlgo) -> anyhow::Result<()> {
        let compatible = match self {
            SigAlgo::RsaSHA1 | SigAlgo::RsaSHA256 | SigAlgo::RsaSHA384 | SigAlgo::RsaSHA512 => {
                matches!(key, KeyAlgo::RSA)
            }
            SigAlgo::EcdsaSHA256 | SigAlgo::EcdsaSHA384 => matches!(key, KeyAlgo::ECDSA(_)),
            SigAlgo::DsaSHA1 | SigAlgo::DsaSHA256 => matches!(key, KeyAlgo::DSA),
        };
        if !compatible {
            return Err(anyhow!(
                "signature algorithm {:?} is not compatible with key {:?}",
                self,
                key
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct PubKey<'a> {
    pub algo: KeyAlgo,
    /// subjectPublicKey bit string contents
    pub val: &'a [u8],
    /// the whole SubjectPublicKeyInfo, DSA domain parameters live outside `val`
    pub spki: &'a [u8],
}

/// Hashes `msg` with the digest bound to `sig_algo` and checks `sig` against it.
///
/// Returns `Ok(false)` when the signature is well formed enough to be checked
/// but does not verify, or cannot be decoded at all. Errors are reserved for
/// unusable keys and algorithm mismatches.
pub fn verify_signature(
    key: PubKey<'_>,
    sig_algo: SigAlgo,
    sig: &[u8],
    msg: &[u8],
) -> anyhow::Result<bool> {
    sig_algo.check_compatible_with(&key.algo)?;
    let prehash = sig_algo.digest_algo().digest(msg);
    verify_prehashed(&key, sig_algo, sig, &prehash)
}

pub fn verify_prehashed(
    key: &PubKey<'_>,
    sig_algo: SigAlgo,
    sig: &[u8],
    prehash: &[u8],
) -> anyhow::Result<bool> {
    Ok(match key.algo {
        KeyAlgo::RSA => {
            let pubkey = RsaPublicKey::from_pkcs1_der(key.val)
                .map_err(|err| anyhow!("invalid rsa public key: {}", err))?;
            let scheme = match sig_algo.digest_algo() {
                DigestAlgo::SHA1 => Pkcs1v15Sign::new::<Sha1>(),
                DigestAlgo::SHA256 => Pkcs1v15Sign::new::<Sha256>(),
                DigestAlgo::SHA384 => Pkcs1v15Sign::new::<Sha384>(),
                DigestAlgo::SHA512 => Pkcs1v15Sign::new::<Sha512>(),
            };
            pubkey.verify(scheme, prehash, sig).is_ok()
        }
        KeyAlgo::ECDSA(EcCurve::P256) => {
            let pubkey = p256::ecdsa::VerifyingKey::from_sec1_bytes(key.val)
                .map_err(|err| anyhow!("invalid p256 public key: {}", err))?;
            match p256::ecdsa::Signature::from_der(sig) {
                Ok(sig) => pubkey.verify_prehash(prehash, &sig).is_ok(),
                Err(_) => false,
            }
        }
        KeyAlgo::ECDSA(EcCurve::P384) => {
            let pubkey = p384::ecdsa::VerifyingKey::from_sec1_bytes(key.val)
                .map_err(|err| anyhow!("invalid p384 public key: {}", err))?;
            match p384::ecdsa::Signature::from_der(sig) {
                Ok(sig) => pubkey.verify_prehash(prehash, &sig).is_ok(),
                Err(_) => false,
            }
        }
        KeyAlgo::DSA => {
            let pubkey = dsa::VerifyingKey::from_public_key_der(key.spki)
                .map_err(|err| anyhow!("invalid dsa public key: {}", err))?;
            // FIPS 186-4: only the leftmost bits of the digest, up to the size of q
            let q_len = (pubkey.components().q().bits() + 7) / 8;
            let prehash = &prehash[..prehash.len().min(q_len)];
            match dsa::Signature::try_from(sig) {
                Ok(sig) => pubkey.verify_prehash(prehash, &sig).is_ok(),
                Err(_) => false,
            }
        }
    })
}
