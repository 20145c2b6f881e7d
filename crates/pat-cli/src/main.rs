//! PAT CLI (`pat-cli`)
//!
//! Operator tool that stores a personal access token and exchanges it with
//! the identity provider for an API access token.

use clap::{Parser, Subcommand};
use common::token_exchange::ExchangeClient;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod settings;

use settings::Settings;

#[derive(Parser)]
#[command(name = "pat-cli")]
#[command(author, version, about = "Personal access token tool for the authentication gateway", long_about = None)]
struct Cli {
    /// Settings file (default is $HOME/.logto-playground.yaml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the stored personal access token
    Pat {
        #[command(subcommand)]
        action: PatAction,
    },

    /// Deployment helpers
    Deploy {
        #[command(subcommand)]
        action: DeployAction,
    },
}

#[derive(Subcommand)]
enum PatAction {
    /// Add or replace the stored personal access token
    Add { token: String },
}

#[derive(Subcommand)]
enum DeployAction {
    /// Exchange the stored PAT for an access token and print it
    Test,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    // Diagnostics go to stderr so stdout stays machine-readable
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let settings_path = match cli.config {
        Some(path) => path,
        None => settings::default_path()?,
    };

    let mut stdout = std::io::stdout().lock();
    let mut stderr = std::io::stderr().lock();

    match cli.command {
        Commands::Pat {
            action: PatAction::Add { token },
        } => commands::pat::add(&settings_path, &token, &mut stdout),
        Commands::Deploy {
            action: DeployAction::Test,
        } => {
            let settings = Settings::load(&settings_path)?;
            let client = ExchangeClient::new()?;
            commands::deploy::test(&settings_path, &settings, &client, &mut stdout, &mut stderr)
                .await
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_pat_add() {
        let cli = Cli::try_parse_from(["pat-cli", "pat", "add", "pat_abc"]).unwrap();

        assert!(cli.config.is_none());
        assert!(matches!(
            cli.command,
            Commands::Pat { action: PatAction::Add { token } } if token == "pat_abc"
        ));
    }

    #[test]
    fn test_parse_deploy_test_with_config() {
        let cli =
            Cli::try_parse_from(["pat-cli", "deploy", "test", "--config", "/tmp/s.yaml"]).unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("/tmp/s.yaml")));
        assert!(matches!(
            cli.command,
            Commands::Deploy {
                action: DeployAction::Test
            }
        ));
    }

    #[test]
    fn test_pat_add_requires_token() {
        assert!(Cli::try_parse_from(["pat-cli", "pat", "add"]).is_err());
    }
}
