mod cli;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command, ConfigCommand};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = Cli::parse();

    match args.command {
        Command::Check { deck } => {
            let (config, _config_path) = cli::load_config()?;
            let ok = cli::check::run(&config, &deck);
            if !ok {
                std::process::exit(1);
            }
            Ok(())
        }
        Command::Run { deck, message, init, session } => {
            let (config, _config_path) = cli::load_config()?;
            let code = cli::run::run(&config, cli::run::RunArgs { deck, message, init, session }).await?;
            if code != 0 {
                std::process::exit(code);
            }
            Ok(())
        }
        Command::Init => {
            eprintln!("`gambit init` has been removed; project bootstrapping now lives in `gambit serve`.");
            std::process::exit(1);
        }
        Command::Config(ConfigCommand::Validate) => {
            let (config, config_path) = cli::load_config()?;
            let ok = cli::config::validate(&config, &config_path);
            if !ok {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}

/// Initialize structured tracing for CLI invocations.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,gambit_cli=debug")),
        )
        .init();
}
