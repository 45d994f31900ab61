//! Phoneline CLI - Failing Phone Line Playback
//!
//! Command-line interface for the Phoneline degradation engine.

use anyhow::Context;
use clap::Parser;
use env_logger::Env;
use log::{error, info};

use phoneline::cli::{commands, Cli, Commands};
use phoneline::config::PhonelineConfig;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logger
    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_filter)).init();

    info!("Phoneline v{}", env!("CARGO_PKG_VERSION"));

    let config = match &cli.config {
        Some(path) => PhonelineConfig::from_json_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => PhonelineConfig::default(),
    };

    match cli.command {
        Some(cmd) => handle_command(cmd, &config),
        None => {
            println!("Phoneline v{}", env!("CARGO_PKG_VERSION"));
            println!("Use --help for available commands");
            Ok(())
        }
    }
}

fn handle_command(cmd: Commands, config: &PhonelineConfig) -> anyhow::Result<()> {
    let result = match cmd {
        Commands::Play { input, out } => commands::play(&input, out.as_deref(), config),
        Commands::Curve { steps } => commands::print_curve(steps),
        Commands::PrintConfig => commands::print_config(config),
    };

    result.map_err(|err| {
        eprintln!("{}", err.friendly_message());
        for suggestion in err.recovery_suggestions() {
            eprintln!("  - {}", suggestion);
        }
        if !err.is_recoverable() {
            error!("[{}] {}", err.error_code(), err);
        }
        anyhow::Error::new(err).context("phoneline command failed")
    })
}
