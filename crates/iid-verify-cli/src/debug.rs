use std::path::PathBuf;

use anyhow::Context;
use aws_instance_identity_verifier::{
    decode_envelope, verify, InstanceIdentityDocument, SignerId, TrustAnchor,
};
use clap::{Args, Subcommand};
use x509_verifier_rust_crypto::x509_parser::time::ASN1Time;

#[derive(Subcommand)]
pub enum DebugCli {
    /// Show the pinned AWS certificate
    Anchor,
    /// Inspect and verify a captured PKCS#7 body
    Doc(DebugDocCli),
}

impl DebugCli {
    pub fn run(&self) -> anyhow::Result<()> {
        match self {
            DebugCli::Anchor => log_anchor(),
            DebugCli::Doc(cli) => cli.run(),
        }
    }
}

fn log_anchor() -> anyhow::Result<()> {
    let anchor = TrustAnchor::pinned()?;
    let cert = anchor.cert()?;
    tracing::info!("Anchor:");
    tracing::info!("\tSubject: {}", cert.raw.subject());
    tracing::info!("\tSerial: {}", cert.serial_hex());
    tracing::info!("\tKey: {:?}", cert.pubkey_algo());
    tracing::info!("\tSignature: {:?}", cert.sig_algo()?);
    let (start, end) = cert.validity();
    tracing::info!(
        "\tValid: {start}({}) - {end}({})",
        start.timestamp(),
        end.timestamp()
    );
    tracing::info!("\tDigest: {}", cert.digest());
    Ok(())
}

#[derive(Args)]
pub struct DebugDocCli {
    #[clap(long)]
    pkcs7: PathBuf,
}

impl DebugDocCli {
    pub fn run(&self) -> anyhow::Result<()> {
        let raw = std::fs::read(&self.pkcs7)
            .with_context(|| format!("read {}", self.pkcs7.display()))?;
        let envelope = decode_envelope(&raw)?;
        tracing::info!("Envelope:");
        tracing::info!("\tContent Type: {}", envelope.content_type);
        tracing::info!("\tEmbedded Certs: {}", envelope.certificates().len());
        for (idx, signer) in envelope.signers.iter().enumerate() {
            match &signer.sid {
                SignerId::IssuerAndSerial { serial, .. } => {
                    tracing::info!("\t[{idx}] Serial: {}", hex::encode(serial))
                }
                SignerId::SubjectKeyId(ski) => {
                    tracing::info!("\t[{idx}] Subject Key Id: {}", hex::encode(ski))
                }
            }
            tracing::info!(
                "\t    Algorithms: {} / {}",
                signer.digest_algorithm,
                signer.signature_algorithm
            );
            if let Some(signing_time) = signer.signed_attrs.as_ref().and_then(|a| a.signing_time) {
                let time = ASN1Time::from_timestamp(i64::try_from(signing_time)?)?;
                tracing::info!("\t    Signed: {time}({signing_time})");
            }
        }

        let anchor = TrustAnchor::pinned()?;
        let content = verify(envelope, &anchor)?;
        let doc = InstanceIdentityDocument::parse(&content)?;
        tracing::info!("Doc:");
        tracing::info!("\tAccount ID: {}", doc.account_id);
        tracing::info!("\tInstance ID: {}", doc.instance_id);
        tracing::info!("\tInstance Type: {}", doc.instance_type);
        tracing::info!("\tImage ID: {}", doc.image_id);
        tracing::info!("\tRegion: {} ({})", doc.region, doc.availability_zone);
        tracing::info!("\tArchitecture: {}", doc.architecture);
        if let Some(ip) = &doc.private_ip {
            tracing::info!("\tPrivate IP: {}", ip);
        }
        if let Some(pending_time) = &doc.pending_time {
            tracing::info!("\tPending Time: {}", pending_time);
        }
        if let Some(codes) = &doc.marketplace_product_codes {
            tracing::info!("\tMarketplace Codes: {}", codes.join(", "));
        }
        Ok(())
    }
}
