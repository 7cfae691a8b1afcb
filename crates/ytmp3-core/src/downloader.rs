//! YouTube audio extraction using yt-dlp

use crate::config::AudioParams;
use crate::error::DownloadError;
use crate::process::run_tool;
use serde::Deserialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Extension of every file the pipeline produces.
pub const AUDIO_EXTENSION: &str = "mp3";

/// JSON printed by yt-dlp once post-processing has moved the file into place.
const PRINT_AFTER_MOVE: &str = "after_move:%(.{id,title,filepath})j";

#[derive(Debug)]
pub struct Downloader {
    yt_dlp_path: PathBuf,
    ffmpeg_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VideoMetadata {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub filepath: Option<PathBuf>,
}

#[derive(Debug)]
pub struct Extraction {
    pub audio_path: PathBuf,
    pub title: String,
    pub id: Option<String>,
}

impl Downloader {
    pub fn new(yt_dlp_path: PathBuf, ffmpeg_path: PathBuf) -> Self {
        Self {
            yt_dlp_path,
            ffmpeg_path,
        }
    }

    /// Extract the audio track of `url` as MP3 into `staging`
    pub async fn extract(
        &self,
        url: &str,
        staging: &Path,
        audio: AudioParams,
        cancel: &CancellationToken,
    ) -> Result<Extraction, DownloadError> {
        info!("Extracting audio from: {}", url);

        let token = new_token();
        let args = self.extract_args(url, staging, &token, audio);
        let output = run_tool(&self.yt_dlp_path, &args, cancel).await?;

        if !output.success() {
            debug!("yt-dlp output: {}", output.combined());
            return Err(DownloadError::YtDlpFailed {
                code: output.status.code(),
                output: output.combined(),
            });
        }

        let reported = parse_reported(&output.stdout);
        let audio_path = locate_output(
            staging,
            &token,
            reported.as_ref().and_then(|m| m.filepath.as_deref()),
        )
        .await
        .map_err(|e| match e {
            DownloadError::NoOutput(_) => DownloadError::NoOutput(output.combined()),
            other => other,
        })?;

        let title = reported
            .as_ref()
            .and_then(|m| m.title.clone())
            .unwrap_or_else(|| title_from_file_name(&audio_path, &token));

        debug!("Extracted: {} -> {}", title, audio_path.display());

        Ok(Extraction {
            audio_path,
            title,
            id: reported.and_then(|m| m.id),
        })
    }

    pub fn extract_args(
        &self,
        url: &str,
        staging: &Path,
        token: &str,
        audio: AudioParams,
    ) -> Vec<OsString> {
        let template = staging.join(format!("%(title).150B.{token}.%(ext)s"));

        let mut args: Vec<OsString> = [
            "--extract-audio",
            "--audio-format",
            AUDIO_EXTENSION,
        ]
        .iter()
        .map(OsString::from)
        .collect();

        args.push("--audio-quality".into());
        args.push(format!("{}K", audio.bitrate_kbps()).into());
        args.extend(
            [
                "--no-playlist",
                "--embed-metadata",
                "--no-simulate",
                "--print",
                PRINT_AFTER_MOVE,
            ]
            .iter()
            .map(OsString::from),
        );
        args.push("--ffmpeg-location".into());
        args.push(self.ffmpeg_path.clone().into_os_string());
        args.push("-o".into());
        args.push(template.into_os_string());
        // URLs may start with '-'
        args.push("--".into());
        args.push(url.into());
        args
    }
}

fn new_token() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..12].to_string()
}

/// Last JSON object printed on stdout, if any
fn parse_reported(stdout: &str) -> Option<VideoMetadata> {
    stdout
        .lines()
        .rev()
        .map(str::trim)
        .filter(|l| l.starts_with('{'))
        .find_map(|l| serde_json::from_str(l).ok())
}

/// Find the file produced for `token` inside `staging`.
///
/// The path reported by yt-dlp wins when it exists inside `staging`;
/// otherwise the directory is scanned for exactly one `*.<token>.mp3`.
pub async fn locate_output(
    staging: &Path,
    token: &str,
    reported: Option<&Path>,
) -> Result<PathBuf, DownloadError> {
    if let Some(path) = reported {
        if path.starts_with(staging) && tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Ok(path.to_path_buf());
        }
        debug!("Reported path {} not found, scanning", path.display());
    }

    let suffix = format!(".{token}.{AUDIO_EXTENSION}");
    let mut found = Vec::new();
    let mut entries = tokio::fs::read_dir(staging).await?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_name().to_string_lossy().ends_with(&suffix)
            && entry.file_type().await?.is_file()
        {
            found.push(entry.path());
        }
    }

    if found.len() > 1 {
        found.sort();
        return Err(DownloadError::AmbiguousOutput(found));
    }
    found
        .pop()
        .ok_or_else(|| DownloadError::NoOutput(String::new()))
}

fn title_from_file_name(path: &Path, token: &str) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let suffix = format!(".{token}.{AUDIO_EXTENSION}");
    name.strip_suffix(&suffix).unwrap_or(&name).to_string()
}
