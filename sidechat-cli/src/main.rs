//! Main entry point for the Sidechat command-line client.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use dotenv::dotenv;
use shared::config::{Config, ConfigOverrides};

mod api;
mod commands;
mod logging;

use commands::{
    ask::AskArgs, config::ConfigFormat, messages::MessagesArgs, read::ReadArgs,
    session::SessionCommand, unread::UnreadArgs,
};

/// Sidechat CLI
#[derive(Parser)]
#[command(name = "sidechat", version)]
#[command(about = "Command-line client for Sidechat group chats and the AI assistant", long_about = None)]
struct Cli {
    /// Path to a configuration file (yaml or json)
    #[arg(
        long,
        short,
        global = true,
        help = "Path to the configuration file (e.g., sidechat.yaml or sidechat.json). If not provided, defaults and SIDECHAT_* variables are used."
    )]
    config: Option<PathBuf>,

    /// Backend base URL, overriding the configuration
    #[arg(
        long,
        global = true,
        help = "Sidechat backend base URL (e.g., http://localhost:8000). Overrides the configuration file and SIDECHAT_SERVER_URL."
    )]
    server: Option<String>,

    /// Log level or filter directive, overriding the configuration
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Subcommands for the Sidechat CLI
#[derive(Subcommand)]
enum Commands {
    /// Ask the AI assistant and stream its answer
    Ask(AskArgs),

    /// Show unread counts for your groups and threads
    Unread(UnreadArgs),

    /// Mark a conversation as read
    Read(ReadArgs),

    /// List the messages of a conversation
    Messages(MessagesArgs),

    /// Sign in, sign out or show the current account
    Session {
        #[command(subcommand)]
        command: SessionCommand,
    },

    /// Generate a configuration file
    Config {
        /// Format of the configuration file to generate. Defaults to yaml.
        #[arg(
            long,
            short,
            value_enum,
            default_value_t = ConfigFormat::Yaml,
            help = "Format of the configuration file to generate (yaml or json). Defaults to yaml."
        )]
        format: ConfigFormat,

        /// Where to write the file
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Generate shell completion scripts for the CLI
    Completion {
        /// The shell type for which to generate the completion script (e.g., bash, zsh, fish, powershell)
        #[arg(
            long,
            short,
            value_enum,
            help = "The shell type for which to generate the completion script (e.g., bash, zsh, fish, powershell)"
        )]
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let Cli {
        config,
        server,
        log_level,
        command,
    } = Cli::parse();

    match command {
        Commands::Completion { shell } => {
            commands::completion::generate_completion(shell);
            Ok(())
        }
        Commands::Config { format, output } => {
            commands::config::generate_config(format, output)?;
            Ok(())
        }
        command => {
            let overrides = ConfigOverrides {
                server_url: server,
                log_level,
                ..ConfigOverrides::default()
            };
            let config = Config::load_config(config.as_deref(), &overrides)?;
            logging::init(&config.log_level)?;
            run(command, &config).await
        }
    }
}

async fn run(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Ask(args) => commands::ask::run(args, config).await,
        Commands::Unread(args) => commands::unread::run(args, config).await,
        Commands::Read(args) => commands::read::run(args, config),
        Commands::Messages(args) => commands::messages::run(args, config).await,
        Commands::Session { command } => commands::session::run(command, config).await,
        Commands::Completion { .. } | Commands::Config { .. } => Ok(()),
    }
}
