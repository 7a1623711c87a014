use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use aws_instance_identity_verifier::{
    run, Fetch, Stage, StageError, VerifyError, AWS_PKCS7_CERT_PEM, DEFAULT_PKCS7_PATH,
};
use clap::Args;

use crate::utils::ImdsArgs;

#[derive(Args, Debug)]
pub struct VerifyCli {
    #[command(flatten)]
    imds: ImdsArgs,

    /// Metadata path of the PKCS#7 signature
    #[arg(long, env = "IID_PKCS7_PATH", default_value = DEFAULT_PKCS7_PATH)]
    path: String,

    /// Verify a captured PKCS#7 body instead of querying the metadata service
    #[arg(long)]
    input: Option<PathBuf>,
}

impl VerifyCli {
    pub fn run(&self) -> ExitCode {
        report(
            self.verify(),
            &mut std::io::stdout().lock(),
            &mut std::io::stderr().lock(),
        )
    }

    fn verify(&self) -> Result<Vec<u8>, StageError> {
        let anchor_pem = AWS_PKCS7_CERT_PEM.as_bytes();
        match &self.input {
            Some(file) => run(anchor_pem, &FileFetcher { file: file.clone() }, &self.path),
            None => {
                let client = self.imds.client().map_err(|error| StageError {
                    stage: Stage::FetchDocument,
                    error,
                })?;
                tracing::debug!(config = ?client.config(), "querying instance metadata service");
                run(anchor_pem, &client, &self.path)
            }
        }
    }
}

/// Prints the verified document followed by a newline, or a single
/// `error: <stage>: <kind>: <cause>` line.
fn report(
    result: Result<Vec<u8>, StageError>,
    stdout: &mut impl Write,
    stderr: &mut impl Write,
) -> ExitCode {
    let content = match result {
        Ok(content) => content,
        Err(err) => {
            let _ = writeln!(
                stderr,
                "error: {}: {}: {}",
                err.stage,
                err.error.kind(),
                err.error.message()
            );
            return ExitCode::FAILURE;
        }
    };

    match stdout
        .write_all(&content)
        .and_then(|_| stdout.write_all(b"\n"))
        .and_then(|_| stdout.flush())
    {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let _ = writeln!(stderr, "error: write document: {}", err);
            ExitCode::FAILURE
        }
    }
}

/// Serves a previously captured envelope for any metadata path.
pub struct FileFetcher {
    pub file: PathBuf,
}

impl Fetch for FileFetcher {
    fn fetch(&self, path: &str) -> Result<Vec<u8>, VerifyError> {
        tracing::debug!(file = %self.file.display(), path, "reading captured envelope");
        std::fs::read(&self.file)
            .map_err(|err| VerifyError::Transport(format!("read {}: {}", self.file.display(), err)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLES: &str = "../verifier/samples";

    fn sample_run(envelope: &str) -> Result<Vec<u8>, StageError> {
        let anchor = std::fs::read(format!("{}/anchor.pem", SAMPLES)).unwrap();
        let fetcher = FileFetcher {
            file: PathBuf::from(format!("{}/{}.p7", SAMPLES, envelope)),
        };
        run(&anchor, &fetcher, DEFAULT_PKCS7_PATH)
    }

    #[test]
    fn test_report_verified_document() {
        let (mut stdout, mut stderr) = (Vec::new(), Vec::new());
        let code = report(sample_run("dsa_sha1_ber"), &mut stdout, &mut stderr);
        assert_eq!(code, ExitCode::SUCCESS);

        let mut expected = std::fs::read(format!("{}/document.json", SAMPLES)).unwrap();
        expected.push(b'\n');
        assert_eq!(stdout, expected);
        assert!(stderr.is_empty());
    }

    #[test]
    fn test_report_failure_line() {
        let (mut stdout, mut stderr) = (Vec::new(), Vec::new());
        let code = report(sample_run("impostor"), &mut stdout, &mut stderr);
        assert_eq!(code, ExitCode::FAILURE);
        assert!(stdout.is_empty());

        let line = String::from_utf8(stderr).unwrap();
        assert!(line.starts_with("error: verify signature: signature: "), "{line}");
        assert_eq!(line.lines().count(), 1);
    }

    #[test]
    fn test_file_fetcher_missing_file() {
        let fetcher = FileFetcher {
            file: PathBuf::from("does/not/exist.p7"),
        };
        let err = fetcher.fetch(DEFAULT_PKCS7_PATH).unwrap_err();
        assert!(err.is_retryable(), "{err}");
    }
}
