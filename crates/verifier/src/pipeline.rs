use std::fmt;

use thiserror::Error;
use tracing::debug;

use crate::{decode_certificate, decode_envelope, verify, Fetch, VerifyError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    DecodeAnchor,
    FetchDocument,
    DecodeEnvelope,
    VerifySignature,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::DecodeAnchor => "decode anchor",
            Stage::FetchDocument => "fetch document",
            Stage::DecodeEnvelope => "decode envelope",
            Stage::VerifySignature => "verify signature",
        })
    }
}

/// A [`VerifyError`] tagged with the stage that raised it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{stage}: {error}")]
pub struct StageError {
    pub stage: Stage,
    #[source]
    pub error: VerifyError,
}

impl StageError {
    fn at(stage: Stage) -> impl FnOnce(VerifyError) -> Self {
        move |error| Self { stage, error }
    }
}

/// Decodes the anchor, fetches the envelope at `path`, and returns the
/// content once every signer verifies against the anchor.
pub fn run<F: Fetch + ?Sized>(
    anchor_pem: &[u8],
    fetcher: &F,
    path: &str,
) -> Result<Vec<u8>, StageError> {
    let anchor = decode_certificate(anchor_pem).map_err(StageError::at(Stage::DecodeAnchor))?;
    debug!(anchor_len = anchor.der().len(), "trust anchor decoded");

    let raw = fetcher
        .fetch(path)
        .map_err(StageError::at(Stage::FetchDocument))?;
    debug!(path, len = raw.len(), "document fetched");

    let envelope = decode_envelope(&raw).map_err(StageError::at(Stage::DecodeEnvelope))?;
    debug!(
        signers = envelope.signers.len(),
        embedded_certs = envelope.certificates().len(),
        "envelope decoded"
    );

    let content = verify(envelope, &anchor).map_err(StageError::at(Stage::VerifySignature))?;
    debug!(len = content.len(), "signature verified");

    Ok(content)
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::{ErrorKind, AWS_PKCS7_CERT_PEM, DEFAULT_PKCS7_PATH};

    struct SampleFetcher {
        result: Result<Vec<u8>, VerifyError>,
        requested: RefCell<Vec<String>>,
    }

    impl SampleFetcher {
        fn sample(name: &str) -> Self {
            Self::with(Ok(std::fs::read(format!("./samples/{}.p7", name)).unwrap()))
        }

        fn with(result: Result<Vec<u8>, VerifyError>) -> Self {
            Self {
                result,
                requested: RefCell::new(Vec::new()),
            }
        }
    }

    impl Fetch for SampleFetcher {
        fn fetch(&self, path: &str) -> Result<Vec<u8>, VerifyError> {
            self.requested.borrow_mut().push(path.to_string());
            self.result.clone()
        }
    }

    fn sample_anchor() -> Vec<u8> {
        std::fs::read("./samples/anchor.pem").unwrap()
    }

    #[test]
    fn test_run_success() {
        let fetcher = SampleFetcher::sample("dsa_sha1_ber");
        let content = run(&sample_anchor(), &fetcher, DEFAULT_PKCS7_PATH).unwrap();
        assert_eq!(content, std::fs::read("./samples/document.json").unwrap());
        assert_eq!(*fetcher.requested.borrow(), vec![DEFAULT_PKCS7_PATH.to_string()]);
    }

    #[test]
    fn test_bad_anchor_skips_fetch() {
        let fetcher = SampleFetcher::sample("dsa_sha1_ber");
        let not_self_signed = std::fs::read("./samples/not_self_signed.pem").unwrap();
        let err = run(&not_self_signed, &fetcher, DEFAULT_PKCS7_PATH).unwrap_err();
        assert_eq!(err.stage, Stage::DecodeAnchor);
        assert_eq!(err.error.kind(), ErrorKind::Trust);
        assert!(fetcher.requested.borrow().is_empty());
    }

    #[test]
    fn test_transport_failure() {
        let fetcher = SampleFetcher::with(Err(VerifyError::Transport("timed out".to_string())));
        let err = run(&sample_anchor(), &fetcher, DEFAULT_PKCS7_PATH).unwrap_err();
        assert_eq!(err.stage, Stage::FetchDocument);
        assert!(err.error.is_retryable());
        assert_eq!(
            err.to_string(),
            "fetch document: transport error: timed out"
        );
    }

    #[test]
    fn test_empty_document() {
        let fetcher = SampleFetcher::with(Ok(Vec::new()));
        let err = run(&sample_anchor(), &fetcher, DEFAULT_PKCS7_PATH).unwrap_err();
        assert_eq!(err.stage, Stage::DecodeEnvelope);
        assert_eq!(err.error.kind(), ErrorKind::Decode);
    }

    #[test]
    fn test_pinned_anchor_rejects_foreign_signer() {
        let fetcher = SampleFetcher::sample("dsa_sha1_ber");
        let err = run(AWS_PKCS7_CERT_PEM.as_bytes(), &fetcher, DEFAULT_PKCS7_PATH).unwrap_err();
        assert_eq!(err.stage, Stage::VerifySignature);
        assert_eq!(err.error.kind(), ErrorKind::Trust);
    }

    #[test]
    fn test_impostor_envelope() {
        let fetcher = SampleFetcher::sample("impostor");
        let err = run(&sample_anchor(), &fetcher, DEFAULT_PKCS7_PATH).unwrap_err();
        assert_eq!(err.stage, Stage::VerifySignature);
        assert_eq!(err.error.kind(), ErrorKind::Signature);
    }
}
