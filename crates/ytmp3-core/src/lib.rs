//! ytmp3-core: Batch YouTube to MP3 pipeline built on yt-dlp and FFmpeg

pub mod batch;
pub mod config;
pub mod downloader;
pub mod encoder;
pub mod error;
pub mod metadata;
pub mod pipeline;
pub mod process;
pub mod sanitize;

#[cfg(all(test, unix))]
mod test_support;

pub use batch::{run_batch, BatchReport, UrlOutcome};
pub use config::{AudioParams, DownloadConfig, Settings, SettingsOverrides, ToolPaths};
pub use error::{Result, Ytmp3Error};
pub use pipeline::{Pipeline, PipelineStage};
