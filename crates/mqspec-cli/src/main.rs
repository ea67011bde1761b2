//! mqspec
//!
//! Provisions a message-queue compute cluster with its network and IAM
//! access topology.

use std::process::ExitCode;

use clap::Parser;
use tracing::error;

use mqspec_cli::Cli;
use mqspec_common::telemetry::init_logging;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.log_format.into()) {
        eprintln!("error: {}", e);
        return ExitCode::FAILURE;
    }

    match cli.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "mqspec failed");
            eprintln!("error: {}", e);
            ExitCode::from(e.exit_code())
        }
    }
}
