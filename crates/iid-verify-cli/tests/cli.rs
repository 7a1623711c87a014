#![allow(deprecated)] // cargo_bin is deprecated but still supported by assert_cmd

use assert_cmd::Command;
use predicates::prelude::*;

fn iid_verify() -> Command {
    let mut cmd = Command::cargo_bin("iid-verify").unwrap();
    cmd.env_remove("IMDS_ENDPOINT")
        .env_remove("IID_PKCS7_PATH")
        .env_remove("IMDS_TIMEOUT_SECS")
        .env_remove("IMDS_V1")
        .env_remove("IMDS_TOKEN_TTL_SECS")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_foreign_envelope_is_untrusted() {
    // signed by a test key, not the pinned AWS certificate
    iid_verify()
        .args(["--input", "../verifier/samples/dsa_sha1_ber.p7"])
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::starts_with(
            "error: verify signature: trust: ",
        ));
}

#[test]
fn test_missing_input_is_transport_error() {
    iid_verify()
        .args(["--input", "does/not/exist.p7"])
        .assert()
        .code(1)
        .stderr(predicate::str::starts_with("error: fetch document: transport: "));
}

#[test]
fn test_garbage_input_is_decode_error() {
    let dir = std::env::temp_dir().join(format!("iid-verify-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let file = dir.join("garbage.p7");
    std::fs::write(&file, "%%% not base64 %%%").unwrap();

    iid_verify()
        .arg("--input")
        .arg(&file)
        .assert()
        .code(1)
        .stderr(predicate::str::starts_with("error: decode envelope: decode: "));
}

#[test]
fn test_unreachable_endpoint() {
    iid_verify()
        .args(["--endpoint", "http://127.0.0.1:9", "--timeout-secs", "2", "--imds-v1"])
        .assert()
        .code(1)
        .stderr(predicate::str::starts_with("error: fetch document: transport: "));
}

#[test]
fn test_debug_anchor() {
    iid_verify()
        .args(["debug", "anchor"])
        .assert()
        .success()
        .stderr(predicate::str::contains("0096ba48d9e55e1a67"));
}

#[test]
fn test_debug_doc_rejects_foreign_envelope() {
    iid_verify()
        .args(["debug", "doc", "--pkcs7", "../verifier/samples/dsa_sha256_der.p7"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Embedded Certs: 1"))
        .stderr(predicate::str::contains("trust error"));
}
