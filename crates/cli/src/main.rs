//! personachat CLI: the main entry point.
//!
//! Commands:
//! - `chat`      : Interactive chat with a configured character
//! - `ask`       : Send a single message
//! - `estimate`  : Predict a turn's token cost without calling the model
//! - `history`   : List or clear a session's audit history
//! - `pricing`   : Show the pricing table or price a token count
//! - `config`    : Initialize, show or locate the configuration
//! - `characters`: List configured characters

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod bootstrap;
mod commands;

#[derive(Parser)]
#[command(
    name = "personachat",
    about = "personachat: in-character chat under a token budget",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Config file (defaults to ~/.personachat/config.toml)
    #[arg(short, long, global = true, env = "PERSONACHAT_CONFIG")]
    config: Option<PathBuf>,
}

/// Who is talking to which character.
#[derive(clap::Args, Clone)]
pub struct Speaker {
    /// Character id
    #[arg(short = 'C', long)]
    pub character: i64,

    /// Caller identity
    #[arg(short, long, default_value = "local")]
    pub user: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat interactively with a character
    Chat {
        #[command(flatten)]
        speaker: Speaker,

        /// Skip the budget gate and turn events (operator test chat)
        #[arg(long)]
        unmetered: bool,
    },

    /// Send a single message and print the reply
    Ask {
        #[command(flatten)]
        speaker: Speaker,

        /// The message
        message: String,

        /// Skip the budget gate and turn events (operator test chat)
        #[arg(long)]
        unmetered: bool,

        /// Print the reply and its usage as JSON
        #[arg(long)]
        json: bool,
    },

    /// Predict the token cost of a message without calling the model
    Estimate {
        #[command(flatten)]
        speaker: Speaker,

        /// The message
        message: String,
    },

    /// Inspect or clear session history
    History {
        #[command(subcommand)]
        action: commands::history::HistoryAction,
    },

    /// Show model pricing, or price a token count
    Pricing {
        /// Model to price
        model: Option<String>,

        /// Prompt tokens
        #[arg(long, default_value_t = 0)]
        prompt_tokens: u64,

        /// Completion tokens
        #[arg(long, default_value_t = 0)]
        completion_tokens: u64,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: commands::config_cmd::ConfigAction,
    },

    /// List configured characters
    Characters,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "warn" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
    }

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Chat { speaker, unmetered } => {
            commands::chat::interactive(config_path, speaker, unmetered).await?
        }
        Commands::Ask {
            speaker,
            message,
            unmetered,
            json,
        } => commands::chat::ask(config_path, speaker, message, unmetered, json).await?,
        Commands::Estimate { speaker, message } => {
            commands::estimate::run(config_path, speaker, message).await?
        }
        Commands::History { action } => commands::history::run(config_path, action).await?,
        Commands::Pricing {
            model,
            prompt_tokens,
            completion_tokens,
        } => commands::pricing::run(config_path, model, prompt_tokens, completion_tokens)?,
        Commands::Config { action } => commands::config_cmd::run(config_path, action)?,
        Commands::Characters => commands::characters::run(config_path)?,
    }

    Ok(())
}
