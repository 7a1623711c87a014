use x509_verifier_rust_crypto::x509_parser::pem::Pem;

use crate::VerifyError;

pub const CERTIFICATE_LABEL: &str = "CERTIFICATE";
pub const PKCS7_LABEL: &str = "PKCS7";

/// Decodes the first armored block of `input` and checks its label.
pub fn decode_pem(input: &[u8], label: &str) -> Result<Vec<u8>, VerifyError> {
    let pem = match Pem::iter_from_buffer(input).next() {
        Some(Ok(pem)) => pem,
        Some(Err(err)) => {
            return Err(VerifyError::Decode(format!(
                "could not decode PEM block: {:?}",
                err
            )))
        }
        None => return Err(VerifyError::Decode("no PEM block found".to_string())),
    };
    if pem.label != label {
        return Err(VerifyError::Decode(format!(
            "could not decode PEM block type {}, expected {}",
            pem.label, label
        )));
    }
    if pem.contents.is_empty() {
        return Err(VerifyError::Decode(format!("empty {} block", label)));
    }
    Ok(pem.contents)
}

/// Wraps a stripped base64 body, as served by the metadata service, in
/// `PKCS7` armor and decodes it.
pub fn decode_stripped_pkcs7(body: &[u8]) -> Result<Vec<u8>, VerifyError> {
    let mut armored = Vec::with_capacity(body.len() + 48);
    armored.extend_from_slice(b"-----BEGIN PKCS7-----\n");
    armored.extend_from_slice(body);
    armored.extend_from_slice(b"\n-----END PKCS7-----\n");
    decode_pem(&armored, PKCS7_LABEL)
}
