mod args;
mod commands;

use anyhow::{Context, Result};
use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use ytmp3_core::config::{LogLevel, Settings, SettingsOverrides};

use args::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let overrides = match &cli.command {
        Commands::Download { options } => options.overrides(),
        _ => SettingsOverrides::default(),
    };
    let settings = Settings::load(cli.config.as_deref(), &overrides)
        .context("Failed to load configuration")?;

    init_logging(cli.verbose, &settings)?;

    match cli.command {
        Commands::Download { options } => commands::download::run(&options, &settings).await,
        Commands::Doctor => commands::doctor::run(&settings).await,
        Commands::Config => commands::config::run(&settings, cli.config.as_deref()).await,
    }
}

/// `RUST_LOG` wins, then the `-v` count, then the configured log level
fn init_logging(verbose: u8, settings: &Settings) -> Result<()> {
    let configured: LogLevel = settings.log_level.parse()?;

    let filter = match verbose {
        0 => format!("ytmp3={configured},ytmp3_core={configured}"),
        1 => "ytmp3=debug,ytmp3_core=debug".to_string(),
        2 => "ytmp3=trace,ytmp3_core=trace".to_string(),
        _ => "trace".to_string(),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).without_time())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    Ok(())
}
