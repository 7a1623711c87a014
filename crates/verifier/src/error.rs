use std::fmt;

use thiserror::Error;

/// Why a verification run was rejected.
///
/// Variants carry a human readable cause. Only [`VerifyError::Transport`] is
/// worth retrying; every other kind is a property of the bytes or of the
/// pinned certificate and will fail the same way again.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    /// Missing or malformed PEM armor, or an unexpected block label.
    #[error("decode error: {0}")]
    Decode(String),
    /// The armored payload is not a valid certificate or signed-data structure.
    #[error("parse error: {0}")]
    Parse(String),
    /// The certificate is not self-signed, or no signer matches the pinned anchor.
    #[error("trust error: {0}")]
    Trust(String),
    /// The content does not match the digest the signer committed to.
    #[error("integrity error: {0}")]
    Integrity(String),
    /// The signature does not verify under the pinned anchor's key.
    #[error("signature error: {0}")]
    Signature(String),
    /// The document could not be fetched.
    #[error("transport error: {0}")]
    Transport(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Decode,
    Parse,
    Trust,
    Integrity,
    Signature,
    Transport,
}

impl ErrorKind {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Transport)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorKind::Decode => "decode",
            ErrorKind::Parse => "parse",
            ErrorKind::Trust => "trust",
            ErrorKind::Integrity => "integrity",
            ErrorKind::Signature => "signature",
            ErrorKind::Transport => "transport",
        })
    }
}

impl VerifyError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            VerifyError::Decode(_) => ErrorKind::Decode,
            VerifyError::Parse(_) => ErrorKind::Parse,
            VerifyError::Trust(_) => ErrorKind::Trust,
            VerifyError::Integrity(_) => ErrorKind::Integrity,
            VerifyError::Signature(_) => ErrorKind::Signature,
            VerifyError::Transport(_) => ErrorKind::Transport,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    /// The cause without the kind prefix.
    pub fn message(&self) -> &str {
        match self {
            VerifyError::Decode(msg)
            | VerifyError::Parse(msg)
            | VerifyError::Trust(msg)
            | VerifyError::Integrity(msg)
            | VerifyError::Signature(msg)
            | VerifyError::Transport(msg) => msg,
        }
    }

    /// Prepends `prefix` to the message, keeping the kind.
    pub fn prefixed(self, prefix: impl fmt::Display) -> Self {
        let wrap = |msg: String| format!("{}: {}", prefix, msg);
        match self {
            VerifyError::Decode(msg) => VerifyError::Decode(wrap(msg)),
            VerifyError::Parse(msg) => VerifyError::Parse(wrap(msg)),
            VerifyError::Trust(msg) => VerifyError::Trust(wrap(msg)),
            VerifyError::Integrity(msg) => VerifyError::Integrity(wrap(msg)),
            VerifyError::Signature(msg) => VerifyError::Signature(wrap(msg)),
            VerifyError::Transport(msg) => VerifyError::Transport(wrap(msg)),
        }
    }
}

/// Wraps an `anyhow` error from the certificate layer, keeping its context chain.
pub(crate) fn describe(err: &anyhow::Error) -> String {
    format!("{:#}", err)
}
