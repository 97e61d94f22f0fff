//! Bazaarly - conversational marketplace assistant
//!
//! Main entry point for the Bazaarly CLI.

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use bazaarly::cli::{Cli, Commands, ConfigCommand, SessionCommand};
use bazaarly::commands;
use bazaarly::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();
    init_tracing(cli.verbose);

    let config = Config::load(&cli.config)?;

    match cli.command {
        Commands::Chat { user, platform } => {
            tracing::info!(user = %user, platform = %platform, "Starting interactive chat");
            commands::chat::run_chat(config, user, platform).await?;
            Ok(())
        }
        Commands::Listings { user } => {
            commands::listings::run_listings(config, user)?;
            Ok(())
        }
        Commands::Sessions { command } => match command {
            SessionCommand::Cleanup => {
                commands::sessions::run_cleanup(config)?;
                Ok(())
            }
        },
        Commands::Config { command } => match command {
            ConfigCommand::Init => {
                let default = Config::default();
                default.save(&cli.config)?;
                println!("Wrote default configuration to {}", cli.config);
                Ok(())
            }
            ConfigCommand::Validate => {
                config.validate()?;
                println!("Configuration is valid.");
                Ok(())
            }
        },
    }
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "bazaarly=debug" } else { "bazaarly=info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
