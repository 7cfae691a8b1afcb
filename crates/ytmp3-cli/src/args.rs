use clap::{Parser, Subcommand};
use std::path::PathBuf;
use ytmp3_core::config::{parse_url_lines, parse_urls, SettingsOverrides};

#[derive(Parser)]
#[command(name = "ytmp3")]
#[command(author, version, about = "Batch YouTube to MP3 downloader")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose output (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Config file path
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Download URLs and convert them to MP3
    Download {
        #[command(flatten)]
        options: DownloadOptions,
    },

    /// Check external dependencies
    Doctor,

    /// Show configuration
    Config,
}

#[derive(clap::Args, Clone, Debug, Default)]
pub struct DownloadOptions {
    /// Comma-separated YouTube URLs
    #[arg(short, long, required_unless_present = "input")]
    pub urls: Option<String>,

    /// File containing URLs (one per line, # for comments)
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Target bitrate in kbps (1-320)
    #[arg(short, long)]
    pub bitrate: Option<u32>,

    /// Channel count: 1 (mono) or 2 (stereo)
    #[arg(short, long)]
    pub channels: Option<u8>,

    /// Sample rate in Hz
    #[arg(short, long)]
    pub sample_rate: Option<u32>,

    /// Output directory
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Maximum downloads in flight
    #[arg(short = 'j', long)]
    pub max_concurrent: Option<usize>,

    /// Keep staging files (for debugging)
    #[arg(long)]
    pub keep_temp: bool,

    /// Replace existing output files
    #[arg(long)]
    pub overwrite: bool,
}

impl DownloadOptions {
    /// Flags that override lower configuration layers
    pub fn overrides(&self) -> SettingsOverrides {
        SettingsOverrides {
            bitrate: self.bitrate,
            channels: self.channels,
            sample_rate: self.sample_rate,
            output_dir: self.output_dir.clone(),
            max_concurrent_downloads: self.max_concurrent,
            keep_temp: self.keep_temp.then_some(true),
            overwrite: self.overwrite.then_some(true),
        }
    }

    /// URLs from `--urls`, then from `--input` content
    pub fn collect_urls(&self, input_content: Option<&str>) -> Vec<String> {
        let mut urls = self.urls.as_deref().map(parse_urls).unwrap_or_default();
        if let Some(content) = input_content {
            urls.extend(parse_url_lines(content));
        }
        urls
    }
}
