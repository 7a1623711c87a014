use anyhow::{anyhow, bail, Context};
use cms::content_info::{CmsVersion, ContentInfo};
use cms::signed_data::{EncapsulatedContentInfo, SignerIdentifier};
use der::asn1::{Any, ObjectIdentifier, OctetString};
use der::{
    Decode, DecodeOwned, DecodeValue, Encode, FixedTag, Header, Reader, SliceReader, Tag, TagNumber,
    Tagged,
};
use x509_cert::attr::Attribute;
use x509_cert::spki::AlgorithmIdentifierOwned;
use x509_cert::time::Time;
use x509_verifier_rust_crypto::constants::*;

use crate::error::describe;
use crate::{ber, pem, VerifyError};

/// How a signer info points at its certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignerId {
    /// DER encoded issuer `Name` and the serial number content octets.
    IssuerAndSerial { issuer: Vec<u8>, serial: Vec<u8> },
    SubjectKeyId(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedAttrs {
    /// DER of the attributes re-tagged as a SET, which is what gets signed.
    pub der: Vec<u8>,
    pub content_type: Option<String>,
    pub message_digest: Option<Vec<u8>>,
    /// seconds since the unix epoch
    pub signing_time: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignerRecord {
    pub sid: SignerId,
    pub digest_algorithm: String,
    pub signature_algorithm: String,
    pub signed_attrs: Option<SignedAttrs>,
    pub signature: Vec<u8>,
}

/// A decoded PKCS#7 `SignedData` with attached content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedEnvelope {
    certificates: Vec<Vec<u8>>,
    pub signers: Vec<SignerRecord>,
    pub content_type: String,
    pub content: Vec<u8>,
}

/// Formats and decodes a stripped PKCS#7 document.
pub fn decode_envelope(raw: &[u8]) -> Result<SignedEnvelope, VerifyError> {
    let ber = pem::decode_stripped_pkcs7(raw)?;
    SignedEnvelope::from_ber(&ber).map_err(|err| VerifyError::Parse(describe(&err)))
}

impl SignedEnvelope {
    pub fn from_ber(ber: &[u8]) -> anyhow::Result<Self> {
        let der = ber::to_der(ber).context("normalize BER")?;
        Self::from_der(&der)
    }

    pub fn from_der(der: &[u8]) -> anyhow::Result<Self> {
        let content_info =
            ContentInfo::from_der(der).map_err(|err| anyhow!("parse ContentInfo: {}", err))?;
        let content_info_type = content_info.content_type.to_string();
        if content_info_type != OID_PKCS7_SIGNED_DATA {
            bail!("content type {} is not signedData", content_info_type);
        }
        let signed_data = content_info
            .content
            .decode_as::<SignedDataFrame>()
            .map_err(|err| anyhow!("parse SignedData: {}", err))?;

        let encap = &signed_data.encap_content_info;
        let content = match &encap.econtent {
            Some(econtent) => econtent
                .decode_as::<OctetString>()
                .map_err(|err| anyhow!("parse encapsulated content: {}", err))?
                .as_bytes()
                .to_vec(),
            None => bail!("envelope has no encapsulated content"),
        };

        let signers = signed_data
            .signer_infos
            .iter()
            .enumerate()
            .map(|(idx, info)| {
                SignerRecord::from_frame(info).with_context(|| format!("signer info [{}]", idx))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(Self {
            certificates: signed_data.certificates,
            signers,
            content_type: encap.econtent_type.to_string(),
            content,
        })
    }

    /// Certificates the envelope currently offers for signer resolution.
    pub fn certificates(&self) -> &[Vec<u8>] {
        &self.certificates
    }

    /// Discards every certificate the envelope carried.
    pub fn replace_certificates(&mut self, certificates: Vec<Vec<u8>>) {
        self.certificates = certificates;
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }
}

/// `SignedData` read field by field. Embedded certificates are kept as raw
/// TLVs and the CRL set is skipped, so SET OF ordering or duplicates in
/// either never reject an envelope.
struct SignedDataFrame {
    encap_content_info: EncapsulatedContentInfo,
    certificates: Vec<Vec<u8>>,
    signer_infos: Vec<SignerInfoFrame>,
}

impl FixedTag for SignedDataFrame {
    const TAG: Tag = Tag::Sequence;
}

impl<'a> DecodeValue<'a> for SignedDataFrame {
    fn decode_value<R: Reader<'a>>(reader: &mut R, header: Header) -> der::Result<Self> {
        reader.read_nested(header.length, |reader| {
            let _version: CmsVersion = reader.decode()?;
            let _digest_algorithms: Any = reader.decode()?;
            let encap_content_info: EncapsulatedContentInfo = reader.decode()?;

            let mut certificates = Vec::new();
            if let Some(set) = context_field(reader, TagNumber::N0)? {
                // other certificate choices (attribute certs, ...) are ignored
                for choice in elements::<Any>(set.value())? {
                    if choice.tag() == Tag::Sequence {
                        certificates.push(choice.to_der()?);
                    }
                }
            }
            let _crls = context_field(reader, TagNumber::N1)?;

            let signer_infos: Any = reader.decode()?;
            signer_infos.tag().assert_eq(Tag::Set)?;
            let signer_infos = elements::<SignerInfoFrame>(signer_infos.value())?;

            Ok(Self {
                encap_content_info,
                certificates,
                signer_infos,
            })
        })
    }
}

/// `SignerInfo` keeping the signed attributes exactly as encoded.
struct SignerInfoFrame {
    sid: SignerIdentifier,
    digest_alg: AlgorithmIdentifierOwned,
    /// contents of the `[0] IMPLICIT` signed attributes
    signed_attrs: Option<Vec<u8>>,
    signature_algorithm: AlgorithmIdentifierOwned,
    signature: OctetString,
}

impl FixedTag for SignerInfoFrame {
    const TAG: Tag = Tag::Sequence;
}

impl<'a> DecodeValue<'a> for SignerInfoFrame {
    fn decode_value<R: Reader<'a>>(reader: &mut R, header: Header) -> der::Result<Self> {
        reader.read_nested(header.length, |reader| {
            let _version: CmsVersion = reader.decode()?;
            let sid: SignerIdentifier = reader.decode()?;
            let digest_alg: AlgorithmIdentifierOwned = reader.decode()?;
            let signed_attrs =
                context_field(reader, TagNumber::N0)?.map(|attrs| attrs.value().to_vec());
            let signature_algorithm: AlgorithmIdentifierOwned = reader.decode()?;
            let signature: OctetString = reader.decode()?;
            let _unsigned_attrs = context_field(reader, TagNumber::N1)?;
            Ok(Self {
                sid,
                digest_alg,
                signed_attrs,
                signature_algorithm,
                signature,
            })
        })
    }
}

/// Reads an optional context-specific field with the given tag number.
fn context_field<'a, R: Reader<'a>>(
    reader: &mut R,
    number: TagNumber,
) -> der::Result<Option<Any>> {
    if reader.is_finished() {
        return Ok(None);
    }
    match reader.peek_tag()? {
        Tag::ContextSpecific { number: found, .. } if found == number => {
            reader.decode().map(Some)
        }
        _ => Ok(None),
    }
}

/// Decodes every element of a SET OF body in encoded order.
fn elements<T: DecodeOwned>(bytes: &[u8]) -> der::Result<Vec<T>> {
    let mut reader = SliceReader::new(bytes)?;
    let mut items = Vec::new();
    while !reader.is_finished() {
        items.push(reader.decode()?);
    }
    Ok(items)
}

impl SignerRecord {
    fn from_frame(info: &SignerInfoFrame) -> anyhow::Result<Self> {
        let sid = match &info.sid {
            SignerIdentifier::IssuerAndSerialNumber(isn) => SignerId::IssuerAndSerial {
                issuer: isn
                    .issuer
                    .to_der()
                    .map_err(|err| anyhow!("encode issuer: {}", err))?,
                serial: isn.serial_number.as_bytes().to_vec(),
            },
            SignerIdentifier::SubjectKeyIdentifier(ski) => {
                SignerId::SubjectKeyId(ski.0.as_bytes().to_vec())
            }
        };

        let signed_attrs = match &info.signed_attrs {
            Some(attrs) => Some(SignedAttrs::from_encoded(attrs)?),
            None => None,
        };

        Ok(Self {
            sid,
            digest_algorithm: info.digest_alg.oid.to_string(),
            signature_algorithm: info.signature_algorithm.oid.to_string(),
            signed_attrs,
            signature: info.signature.as_bytes().to_vec(),
        })
    }
}

impl SignedAttrs {
    /// `body` is the content of the `[0] IMPLICIT` field.
    fn from_encoded(body: &[u8]) -> anyhow::Result<Self> {
        let der = Any::new(Tag::Set, body)
            .and_then(|set| set.to_der())
            .map_err(|err| anyhow!("encode signed attributes: {}", err))?;
        let attrs = elements::<Attribute>(body)
            .map_err(|err| anyhow!("parse signed attributes: {}", err))?;

        let mut content_type = None;
        let mut message_digest = None;
        let mut signing_time = None;
        for attr in attrs.iter() {
            let oid = attr.oid.to_string();
            if !matches!(
                oid.as_str(),
                OID_ATTR_CONTENT_TYPE | OID_ATTR_MESSAGE_DIGEST | OID_ATTR_SIGNING_TIME
            ) {
                continue;
            }
            // these attributes are single valued
            if attr.values.len() != 1 {
                bail!("attribute {} has {} values", oid, attr.values.len());
            }
            let value = attr
                .values
                .iter()
                .next()
                .ok_or_else(|| anyhow!("attribute {} has no value", oid))?;
            match oid.as_str() {
                OID_ATTR_CONTENT_TYPE => {
                    let value = value
                        .decode_as::<ObjectIdentifier>()
                        .map_err(|err| anyhow!("parse contentType attribute: {}", err))?;
                    content_type = Some(value.to_string());
                }
                OID_ATTR_MESSAGE_DIGEST => {
                    let value = value
                        .decode_as::<OctetString>()
                        .map_err(|err| anyhow!("parse messageDigest attribute: {}", err))?;
                    message_digest = Some(value.as_bytes().to_vec());
                }
                _ => {
                    let time = value
                        .to_der()
                        .and_then(|der| Time::from_der(&der))
                        .map_err(|err| anyhow!("parse signingTime attribute: {}", err))?;
                    signing_time = Some(time.to_unix_duration().as_secs());
                }
            }
        }

        Ok(Self {
            der,
            content_type,
            message_digest,
            signing_time,
        })
    }
}
