use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::filter::{EnvFilter, LevelFilter};

mod debug;
use debug::DebugCli;

mod utils;

mod verify;
use verify::VerifyCli;

/// Fetches the EC2 instance identity document and verifies its PKCS#7
/// signature against the pinned AWS certificate.
#[derive(Parser)]
#[command(name = "iid-verify")]
#[command(version = "0.1.0")]
#[command(args_conflicts_with_subcommands = true)]
struct IidVerifyCli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    verify: VerifyCli,
}

#[derive(Subcommand)]
enum Commands {
    #[command(subcommand)]
    Debug(DebugCli),
}

fn main() -> ExitCode {
    // stdout carries the verified document only
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let cli = IidVerifyCli::parse();
    match &cli.command {
        Some(Commands::Debug(cli)) => match cli.run() {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                eprintln!("error: {:#}", err);
                ExitCode::FAILURE
            }
        },
        None => cli.verify.run(),
    }
}
