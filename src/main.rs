//! Noor - streaming assistant proxy and client
//!
#![doc = "Main entry point for the Noor application."]

use anyhow::Result;

use noor::cli::{Cli, Commands};
use noor::commands;
use noor::config::Config;
use noor::logging::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Load configuration and apply the subcommand's overrides
    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let mut config = Config::load(config_path, &cli)?;
    commands::apply_command_overrides(&mut config, &cli.command);

    init_logging(&config.logging)?;

    // Validate configuration
    config.validate()?;

    // Execute command
    match cli.command {
        Commands::Serve { .. } => {
            commands::serve::run_serve(config).await?;
            Ok(())
        }
        Commands::Chat { .. } => {
            tracing::info!("Starting interactive chat mode");
            commands::chat::run_chat(config).await?;
            Ok(())
        }
        Commands::Quota => {
            commands::quota::show_quota(&config)?;
            Ok(())
        }
        Commands::DeviceId => {
            commands::device::show_device_id()?;
            Ok(())
        }
    }
}
