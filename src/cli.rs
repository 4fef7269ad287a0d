//! Command-line interface definition for Noor
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands to run the proxy and to chat through it.

use clap::{Parser, Subcommand};

/// Noor - streaming assistant proxy and client
#[derive(Parser, Debug, Clone)]
#[command(name = "noor")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for Noor
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the streaming proxy
    Serve {
        /// Override the bind address from config (host:port)
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Start an interactive chat through the proxy
    Chat {
        /// Override the proxy chat endpoint URL
        #[arg(short, long)]
        endpoint: Option<String>,

        /// Skip incremental reads and always use the simulated reveal
        #[arg(long)]
        no_stream: bool,
    },

    /// Show today's local message count
    Quota,

    /// Print this installation's device identifier, creating it if needed
    DeviceId,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            config: Some("config/config.yaml".to_string()),
            verbose: false,
            command: Commands::Quota,
        }
    }
}
