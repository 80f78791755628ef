pub mod check;
pub mod config;
pub mod run;

use clap::{Parser, Subcommand};

/// Gambit — an agent-loop orchestrator core.
#[derive(Debug, Parser)]
#[command(name = "gambit", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Load a deck and report whether it's runnable.
    Check {
        /// Path to the deck's entry file.
        deck: String,
    },
    /// Run a deck once and print the result.
    Run {
        /// Path to the deck's entry file.
        deck: String,
        /// Message to seed as the initial user turn.
        #[arg(long)]
        message: Option<String>,
        /// Initial structured input, as a JSON literal or a bare string.
        #[arg(long)]
        init: Option<String>,
        /// Session id to continue (omit to start a fresh session).
        #[arg(long)]
        session: Option<String>,
    },
    /// Removed. Project bootstrapping now lives in `gambit serve`.
    Init,
    /// Inspect or validate the project configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the project config and report any issues.
    Validate,
}

/// Load configuration from the path named by `GAMBIT_CONFIG` (or
/// `gambit.toml` by default). Returns the parsed [`Config`] and the path
/// that was used.
pub fn load_config() -> anyhow::Result<(gambit_domain::config::Config, String)> {
    let config_path = std::env::var("GAMBIT_CONFIG").unwrap_or_else(|_| "gambit.toml".into());

    let config = gambit_domain::config::Config::load(&config_path)
        .map_err(|e| anyhow::anyhow!("loading {config_path}: {e}"))?;

    Ok((config, config_path))
}
