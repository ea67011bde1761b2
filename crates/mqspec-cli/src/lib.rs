//! mqspec CLI library

pub mod commands;
pub mod config;
pub mod error;
pub mod key_pair;

pub use error::{Error, Result};

use clap::{Parser, Subcommand, ValueEnum};

use mqspec_common::telemetry::LogFormat;

/// mqspec - message-queue cluster provisioning
#[derive(Parser, Debug)]
#[command(name = "mqspec")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Log line format on stderr
    #[arg(long, global = true, value_enum, default_value_t = LogFormatArg::Text)]
    pub log_format: LogFormatArg,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Find or create a cluster and build its network and access topology
    Provision(commands::provision::ProvisionArgs),
    /// List available recipes
    Recipes,
}

/// `--log-format` values
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormatArg {
    /// Human-readable lines
    Text,
    /// One JSON object per line
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Text => LogFormat::Text,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

impl Cli {
    /// Run the CLI command
    pub async fn run(self) -> Result<()> {
        match self.command {
            Commands::Provision(args) => commands::provision::run(args).await,
            Commands::Recipes => commands::recipes::run(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn log_format_is_global() {
        let cli = Cli::try_parse_from(["mqspec", "recipes", "--log-format", "json"]).unwrap();
        assert_eq!(cli.log_format, LogFormatArg::Json);
        assert!(matches!(cli.command, Commands::Recipes));
    }

    #[test]
    fn provision_requires_key_pair() {
        if std::env::var_os("MQSPEC_KEY_PAIR").is_some() {
            return;
        }
        let err = Cli::try_parse_from(["mqspec", "provision"]).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
