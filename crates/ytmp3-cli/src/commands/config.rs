use anyhow::{Context, Result};
use std::path::Path;
use std::process::ExitCode;
use ytmp3_core::config::{default_config_file, Settings, ENV_PREFIX};

pub async fn run(settings: &Settings, config_path: Option<&Path>) -> Result<ExitCode> {
    println!("ytmp3 configuration\n");

    let rendered = toml::to_string_pretty(settings).context("Failed to render settings")?;
    print!("{}", rendered);
    if settings.temp_dir.is_none() {
        println!("# temp_dir = (hidden directory inside output_dir)");
    }
    if settings.yt_dlp.is_none() {
        println!("# yt_dlp = (auto-detect)");
    }
    if settings.ffmpeg.is_none() {
        println!("# ffmpeg = (auto-detect)");
    }

    // Show config file locations
    println!("\nConfig sources (later entries win):");
    println!("  1. Built-in defaults");
    if let Some(p) = default_config_file() {
        let state = if p.exists() { "found" } else { "not present" };
        println!("  2. {} ({})", p.display(), state);
    }
    if let Some(p) = config_path {
        println!("  3. {} (specified)", p.display());
    }
    println!("  4. Environment variables ({}*)", ENV_PREFIX);
    println!("  5. Command-line flags");

    Ok(ExitCode::SUCCESS)
}
