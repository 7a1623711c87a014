//! BER to DER normalization.
//!
//! The metadata service produces its PKCS#7 blob with a streaming encoder:
//! indefinite lengths everywhere and the content wrapped in a constructed
//! OCTET STRING. The `der` decoder only accepts DER, so the blob is rewritten
//! first. Element identifiers and primitive contents are kept as is.

use anyhow::{anyhow, bail};
use x509_verifier_rust_crypto::x509_parser::der_parser::asn1_rs::{Any, Class, FromBer, Tag};

const MAX_DEPTH: usize = 64;
const TAG_OCTET_STRING: u8 = 0x04;

pub fn to_der(input: &[u8]) -> anyhow::Result<Vec<u8>> {
    let (rest, element) =
        Any::from_ber(input).map_err(|err| anyhow!("parse BER element: {:?}", err))?;
    if !rest.is_empty() {
        bail!("{} trailing bytes after BER element", rest.len());
    }
    let mut out = Vec::with_capacity(input.len());
    encode(&element, &mut out, 0)?;
    Ok(out)
}

/// Splits the contents of a constructed element into its children. For the
/// indefinite form the end-of-contents marker is already stripped.
fn children(mut data: &[u8]) -> anyhow::Result<Vec<Any<'_>>> {
    let mut items = Vec::new();
    while !data.is_empty() {
        let (rest, item) =
            Any::from_ber(data).map_err(|err| anyhow!("parse BER element: {:?}", err))?;
        items.push(item);
        data = rest;
    }
    Ok(items)
}

fn is_octet_string(element: &Any<'_>) -> bool {
    element.header.class() == Class::Universal && element.header.tag() == Tag::OctetString
}

fn encode(element: &Any<'_>, out: &mut Vec<u8>, depth: usize) -> anyhow::Result<()> {
    if depth > MAX_DEPTH {
        bail!("BER nesting deeper than {}", MAX_DEPTH);
    }

    if !element.header.is_constructed() {
        let ident = element
            .header
            .raw_tag()
            .ok_or_else(|| anyhow!("BER element without identifier"))?;
        out.extend_from_slice(ident);
        write_length(out, element.data.len());
        out.extend_from_slice(element.data);
        return Ok(());
    }

    // DER forbids segmented strings
    if is_octet_string(element) {
        let mut octets = Vec::new();
        collect_octets(element.data, &mut octets, depth + 1)?;
        out.push(TAG_OCTET_STRING);
        write_length(out, octets.len());
        out.extend_from_slice(&octets);
        return Ok(());
    }

    let ident = element
        .header
        .raw_tag()
        .ok_or_else(|| anyhow!("BER element without identifier"))?;
    let mut inner = Vec::new();
    for child in children(element.data)? {
        encode(&child, &mut inner, depth + 1)?;
    }
    out.extend_from_slice(ident);
    write_length(out, inner.len());
    out.extend_from_slice(&inner);
    Ok(())
}

fn collect_octets(data: &[u8], out: &mut Vec<u8>, depth: usize) -> anyhow::Result<()> {
    if depth > MAX_DEPTH {
        bail!("BER nesting deeper than {}", MAX_DEPTH);
    }
    for segment in children(data)? {
        if !is_octet_string(&segment) {
            bail!("constructed OCTET STRING holds a non OCTET STRING segment");
        }
        if segment.header.is_constructed() {
            collect_octets(segment.data, out, depth + 1)?;
        } else {
            out.extend_from_slice(segment.data);
        }
    }
    Ok(())
}

fn write_length(out: &mut Vec<u8>, len: usize) {
    if len < 0x80 {
        out.push(len as u8);
        return;
    }
    let bytes = len.to_be_bytes();
    let skip = bytes.iter().take_while(|byte| **byte == 0).count();
    out.push(0x80 | (bytes.len() - skip) as u8);
    out.extend_from_slice(&bytes[skip..]);
}
