/*!
Command handlers for the CLI

This module provides command handlers invoked by the CLI entrypoint.

It exposes four top-level command modules:

- `serve`  -- Run the streaming proxy
- `chat`   -- Interactive chat through the proxy
- `quota`  -- Show the local daily counter
- `device` -- Print the device identifier

The handlers stay thin and delegate to the library components.
*/

use crate::config::Config;
use crate::error::Result;
use crate::quota::CountInfo;
use colored::Colorize;

/// Apply per-command CLI overrides on top of the loaded configuration
///
/// # Arguments
///
/// * `config` - Configuration to modify in place
/// * `command` - The parsed subcommand
///
/// # Examples
///
/// ```
/// use noor::cli::Commands;
/// use noor::commands::apply_command_overrides;
/// use noor::config::Config;
///
/// let mut config = Config::default();
/// let command = Commands::Chat {
///     endpoint: Some("http://10.0.0.2:8787/v1/chat".to_string()),
///     no_stream: true,
/// };
/// apply_command_overrides(&mut config, &command);
/// assert_eq!(config.client.endpoint, "http://10.0.0.2:8787/v1/chat");
/// assert!(!config.client.incremental_reads);
/// ```
pub fn apply_command_overrides(config: &mut Config, command: &crate::cli::Commands) {
    use crate::cli::Commands;

    match command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.proxy.bind_address = bind.clone();
            }
        }
        Commands::Chat {
            endpoint,
            no_stream,
        } => {
            if let Some(endpoint) = endpoint {
                config.client.endpoint = endpoint.clone();
            }
            if *no_stream {
                config.client.incremental_reads = false;
            }
        }
        Commands::Quota | Commands::DeviceId => {}
    }
}

/// One-line summary of the local counter
fn format_count_info(info: &CountInfo, daily_limit: u32) -> String {
    format!(
        "{} of {} messages used today, {} remaining",
        info.count, daily_limit, info.remaining
    )
}

fn print_count_info(info: &CountInfo, daily_limit: u32) {
    let line = format_count_info(info, daily_limit);
    if info.is_limit_reached {
        println!("{}", line.red());
    } else if info.should_warn {
        println!("{}", line.yellow());
    } else {
        println!("{}", line.cyan());
    }
}

// Proxy command handler
pub mod serve {
    //! Runs the streaming proxy until Ctrl-C.

    use super::*;

    /// Start the proxy
    ///
    /// # Errors
    ///
    /// Returns an error if the quota database cannot be opened or the bind
    /// address is unavailable.
    pub async fn run_serve(config: Config) -> Result<()> {
        tracing::info!("Starting proxy on {}", config.proxy.bind_address);
        crate::proxy::serve(&config).await
    }
}

// Chat command handler
pub mod chat {
    //! Interactive chat mode handler.
    //!
    //! Builds a `StreamClient` and a `ChatController`, then runs a
    //! readline-based loop. Reply fragments are printed as they arrive;
    //! Ctrl-C during a reply stops it and keeps what was shown.

    use super::*;
    use crate::chat::{ChatController, ChatEvent};
    use crate::client::StreamClient;
    use rustyline::error::ReadlineError;
    use rustyline::DefaultEditor;
    use std::io::Write;
    use std::sync::Arc;
    use tokio::sync::mpsc::UnboundedReceiver;

    /// Input lines the loop handles itself
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum LocalCommand {
        /// Leave the chat
        Quit,
        /// Show the local counter
        Quota,
        /// Show available commands
        Help,
    }

    /// Recognize a loop-local command
    ///
    /// # Examples
    ///
    /// ```
    /// use noor::commands::chat::{parse_local_command, LocalCommand};
    ///
    /// assert_eq!(parse_local_command("/quit"), Some(LocalCommand::Quit));
    /// assert_eq!(parse_local_command("What is wudu?"), None);
    /// ```
    pub fn parse_local_command(input: &str) -> Option<LocalCommand> {
        match input.trim().to_lowercase().as_str() {
            "/quit" | "/exit" | "exit" | "quit" => Some(LocalCommand::Quit),
            "/quota" => Some(LocalCommand::Quota),
            "/help" => Some(LocalCommand::Help),
            _ => None,
        }
    }

    /// Start interactive chat mode
    ///
    /// # Arguments
    ///
    /// * `config` - Global configuration (consumed)
    ///
    /// # Errors
    ///
    /// Returns an error if the client cannot be built or the terminal cannot
    /// be put into line-editing mode.
    pub async fn run_chat(config: Config) -> Result<()> {
        tracing::info!("Starting interactive chat with {}", config.client.endpoint);

        let daily_limit = config.client.daily_limit;
        let client = Arc::new(StreamClient::from_config(&config)?);
        let (controller, mut events) = ChatController::new(client);

        let mut rl = DefaultEditor::new()?;
        print_welcome_banner(&config);

        loop {
            let prompt = format!("{} ", "you>".green().bold());
            match rl.readline(&prompt) {
                Ok(line) => {
                    let input = line.trim();
                    if input.is_empty() {
                        continue;
                    }
                    let _ = rl.add_history_entry(input);

                    match parse_local_command(input) {
                        Some(LocalCommand::Quit) => break,
                        Some(LocalCommand::Quota) => {
                            match controller.count_info() {
                                Ok(info) => print_count_info(&info, daily_limit),
                                Err(e) => eprintln!("{}", format!("Error: {}", e).red()),
                            }
                            continue;
                        }
                        Some(LocalCommand::Help) => {
                            print_help();
                            continue;
                        }
                        None => {}
                    }

                    let Some(session) = controller.submit(input) else {
                        continue;
                    };
                    render_turn(&controller, &mut events, session).await;

                    if let Ok(info) = controller.count_info() {
                        if info.should_warn {
                            println!(
                                "{}\n",
                                format!("{} messages left today", info.remaining).yellow()
                            );
                        }
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("CTRL-C");
                    break;
                }
                Err(ReadlineError::Eof) => {
                    println!("CTRL-D");
                    break;
                }
                Err(err) => {
                    tracing::error!("Readline error: {:?}", err);
                    break;
                }
            }
        }

        println!("Goodbye!");
        Ok(())
    }

    /// Print events for `session` until the turn ends
    async fn render_turn(
        controller: &ChatController,
        events: &mut UnboundedReceiver<ChatEvent>,
        session: u64,
    ) {
        let mut stdout = std::io::stdout();
        let mut stopped = false;
        print!("{} ", "noor>".blue().bold());
        let _ = stdout.flush();

        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else {
                        println!();
                        break;
                    };
                    match event {
                        ChatEvent::Delta { session: s, text } if s == session => {
                            print!("{}", text);
                            let _ = stdout.flush();
                        }
                        ChatEvent::Committed { session: s, .. } if s == session => {
                            println!("\n");
                            break;
                        }
                        ChatEvent::Discarded { session: s } if s == session => {
                            if stopped {
                                println!("\n");
                            } else {
                                println!("{}\n", "(no reply)".dimmed());
                            }
                            break;
                        }
                        ChatEvent::Failed { session: s, error } if s == session => {
                            println!();
                            eprintln!("{}\n", error.to_string().red());
                            break;
                        }
                        _ => {}
                    }
                }
                signal = tokio::signal::ctrl_c(), if !stopped => {
                    if let Err(e) = signal {
                        tracing::warn!("Failed to listen for Ctrl-C: {}", e);
                    }
                    stopped = true;
                    controller.stop();
                }
            }
        }
    }

    fn print_welcome_banner(config: &Config) {
        println!("\n{}", "Noor - Islamic knowledge assistant".bold());
        println!("Connected to {}", config.client.endpoint.cyan());
        if !config.client.incremental_reads {
            println!("{}", "Incremental reads disabled; replies are revealed locally".dimmed());
        }
        println!("Type '/help' for available commands, '/quit' to leave\n");
    }

    fn print_help() {
        println!("\n{}", "Commands:".bold());
        println!("  /quota   Show today's message count");
        println!("  /help    Show this help");
        println!("  /quit    Leave the chat (also /exit)");
        println!("\nPress Ctrl-C while a reply is arriving to stop it.\n");
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_parse_local_command_quit_variants() {
            for input in ["/quit", "/exit", "exit", "QUIT", "  /Quit  "] {
                assert_eq!(parse_local_command(input), Some(LocalCommand::Quit));
            }
        }

        #[test]
        fn test_parse_local_command_quota_and_help() {
            assert_eq!(parse_local_command("/quota"), Some(LocalCommand::Quota));
            assert_eq!(parse_local_command("/help"), Some(LocalCommand::Help));
        }

        #[test]
        fn test_parse_local_command_passes_questions_through() {
            assert_eq!(parse_local_command("What breaks the fast?"), None);
            assert_eq!(parse_local_command("/unknown"), None);
        }
    }
}

// Local quota command handler
pub mod quota {
    //! Prints the local daily counter without touching the network.

    use super::*;
    use crate::quota::LocalQuota;

    /// Show today's local count
    ///
    /// # Errors
    ///
    /// Returns an error if the local state directory cannot be opened.
    pub fn show_quota(config: &Config) -> Result<()> {
        let dir = config.client_state_dir()?;
        tracing::debug!("Reading local quota from {}", dir.display());
        let quota = LocalQuota::open(
            &dir,
            config.client.daily_limit,
            config.client.warn_threshold,
        )?;
        print_count_info(&quota.count_info()?, quota.daily_limit());
        Ok(())
    }
}

// Device identity command handler
pub mod device {
    //! Prints the persistent device identifier.

    use super::*;
    use crate::identity::DeviceIdentity;

    /// Print the device id, creating and storing it on first use
    ///
    /// # Errors
    ///
    /// Returns an error if the OS credential store is unavailable.
    pub fn show_device_id() -> Result<()> {
        let id = DeviceIdentity::keyring().device_id()?;
        println!("{}", id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Commands;

    #[test]
    fn test_serve_override_replaces_bind_address() {
        let mut config = Config::default();
        apply_command_overrides(
            &mut config,
            &Commands::Serve {
                bind: Some("0.0.0.0:9000".to_string()),
            },
        );
        assert_eq!(config.proxy.bind_address, "0.0.0.0:9000");
    }

    #[test]
    fn test_chat_without_overrides_keeps_config() {
        let mut config = Config::default();
        let endpoint = config.client.endpoint.clone();
        apply_command_overrides(
            &mut config,
            &Commands::Chat {
                endpoint: None,
                no_stream: false,
            },
        );
        assert_eq!(config.client.endpoint, endpoint);
        assert!(config.client.incremental_reads);
    }

    #[test]
    fn test_format_count_info() {
        let info = CountInfo {
            count: 17,
            remaining: 3,
            is_limit_reached: false,
            should_warn: true,
        };
        assert_eq!(
            format_count_info(&info, 20),
            "17 of 20 messages used today, 3 remaining"
        );
    }
}
