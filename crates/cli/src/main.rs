//! Mnemos CLI, the main entry point.
//!
//! Commands:
//! - `chat`      Talk to the character (interactive or single message)
//! - `sessions`  List, show or delete stored sessions
//! - `extract`   Run sidecar extraction on text from stdin
//! - `compress`  Force long-term memory compression for a session
//! - `config`    Show, locate, validate or print default configuration

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "mnemos",
    about = "Mnemos: context memory for long-running roleplay conversations",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the character
    Chat {
        /// Session to continue (created on first contact)
        #[arg(short, long, default_value = "default")]
        session: String,

        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Manage stored sessions
    Sessions {
        #[command(subcommand)]
        action: SessionsAction,
    },

    /// Extract the sidecar from text read on stdin
    Extract,

    /// Compress a session's long-term memory now
    Compress {
        #[arg(short, long)]
        session: String,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum SessionsAction {
    /// List sessions, most recent first
    List,
    /// Print a session snapshot as JSON
    Show { session: String },
    /// Delete a session
    Delete { session: String },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Print the config file path
    Path,
    /// Validate the config file
    Validate,
    /// Print a default config file
    Defaults,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Chat { session, message } => commands::chat::run(&session, message).await?,
        Commands::Sessions { action } => match action {
            SessionsAction::List => commands::sessions::list().await?,
            SessionsAction::Show { session } => commands::sessions::show(&session).await?,
            SessionsAction::Delete { session } => commands::sessions::delete(&session).await?,
        },
        Commands::Extract => commands::extract::run().await?,
        Commands::Compress { session } => commands::compress::run(&session).await?,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show().await?,
            ConfigAction::Path => commands::config_cmd::path().await?,
            ConfigAction::Validate => commands::config_cmd::validate().await?,
            ConfigAction::Defaults => commands::config_cmd::defaults().await?,
        },
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_defaults_to_the_default_session() {
        let cli = Cli::try_parse_from(["mnemos", "chat"]).unwrap();
        match cli.command {
            Commands::Chat { session, message } => {
                assert_eq!(session, "default");
                assert!(message.is_none());
            }
            _ => panic!("expected chat"),
        }
    }

    #[test]
    fn verbose_is_global() {
        let cli = Cli::try_parse_from(["mnemos", "sessions", "show", "s1", "-v"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(
            cli.command,
            Commands::Sessions {
                action: SessionsAction::Show { .. }
            }
        ));
    }

    #[test]
    fn compress_requires_a_session() {
        assert!(Cli::try_parse_from(["mnemos", "compress"]).is_err());
        assert!(Cli::try_parse_from(["mnemos", "compress", "--session", "s1"]).is_ok());
    }
}
