//! Dotted object identifiers understood by the verifier.
//!
//! Algorithms are matched by their dotted string form so that identifiers
//! coming from `x509-parser` and from the RustCrypto `der` stack compare the
//! same way.

// Public key algorithms
pub const OID_RSA_ENCRYPTION: &str = "1.2.840.113549.1.1.1";
pub const OID_EC_PUBLIC_KEY: &str = "1.2.840.10045.2.1";
pub const OID_DSA: &str = "1.2.840.10040.4.1";

// Digest algorithms
pub const OID_SHA1: &str = "1.3.14.3.2.26";
pub const OID_SHA256: &str = "2.16.840.1.101.3.4.2.1";
pub const OID_SHA384: &str = "2.16.840.1.101.3.4.2.2";
pub const OID_SHA512: &str = "2.16.840.1.101.3.4.2.3";

// Signature algorithms
pub const OID_SHA1_WITH_RSA: &str = "1.2.840.113549.1.1.5";
pub const OID_SHA256_WITH_RSA: &str = "1.2.840.113549.1.1.11";
pub const OID_SHA384_WITH_RSA: &str = "1.2.840.113549.1.1.12";
pub const OID_SHA512_WITH_RSA: &str = "1.2.840.113549.1.1.13";
pub const OID_ECDSA_WITH_SHA256: &str = "1.2.840.10045.4.3.2";
pub const OID_ECDSA_WITH_SHA384: &str = "1.2.840.10045.4.3.3";
pub const OID_DSA_WITH_SHA1: &str = "1.2.840.10040.4.3";
pub const OID_DSA_WITH_SHA256: &str = "2.16.840.1.101.3.4.3.2";

// PKCS#7 / CMS
pub const OID_PKCS7_DATA: &str = "1.2.840.113549.1.7.1";
pub const OID_PKCS7_SIGNED_DATA: &str = "1.2.840.113549.1.7.2";
pub const OID_ATTR_CONTENT_TYPE: &str = "1.2.840.113549.1.9.3";
pub const OID_ATTR_MESSAGE_DIGEST: &str = "1.2.840.113549.1.9.4";
pub const OID_ATTR_SIGNING_TIME: &str = "1.2.840.113549.1.9.5";
