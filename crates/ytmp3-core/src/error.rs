//! Error types for ytmp3-core

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Ytmp3Error>;

#[derive(Error, Debug)]
pub enum Ytmp3Error {
    #[error("Download failed: {0}")]
    Download(#[from] DownloadError),

    #[error("Tag cleaning failed: {0}")]
    Metadata(#[from] MetadataError),

    #[error("Encode failed: {0}")]
    Encode(#[from] EncodeError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cancelled")]
    Cancelled,

    #[error("No URLs to process")]
    EmptyBatch,
}

impl Ytmp3Error {
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Ytmp3Error::Cancelled
                | Ytmp3Error::Download(DownloadError::Process(ProcessError::Cancelled))
                | Ytmp3Error::Encode(EncodeError::Process(ProcessError::Cancelled))
        )
    }
}

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("failed to start {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("yt-dlp failed with exit code {code:?}: {output}")]
    YtDlpFailed { code: Option<i32>, output: String },

    #[error("no audio file produced: {0}")]
    NoOutput(String),

    #[error("ambiguous output, several audio files found: {0:?}")]
    AmbiguousOutput(Vec<PathBuf>),

    #[error("{0}")]
    Process(#[from] ProcessError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("failed to open tag container of {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: lofty::error::LoftyError,
    },

    #[error("failed to save tag container of {path}: {source}")]
    Save {
        path: PathBuf,
        #[source]
        source: lofty::error::LoftyError,
    },

    #[error("tag cleaning task failed: {0}")]
    Task(String),
}

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("FFmpeg encoding failed with exit code {code:?}: {output}")]
    FfmpegFailed { code: Option<i32>, output: String },

    #[error("failed to read encoded stream of {path}: {source}")]
    Probe {
        path: PathBuf,
        #[source]
        source: lofty::error::LoftyError,
    },

    #[error("encoded {field} is {actual}, expected {expected}")]
    Mismatch {
        field: &'static str,
        expected: u32,
        actual: u32,
    },

    #[error("{0}")]
    Process(#[from] ProcessError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    LoadError(String),

    #[error("Invalid config value: {0}")]
    InvalidValue(String),

    #[error("{tool} not found: {detail}")]
    ToolNotFound { tool: &'static str, detail: String },

    #[error("No URLs provided")]
    NoUrls,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
