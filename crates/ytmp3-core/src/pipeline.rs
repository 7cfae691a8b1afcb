//! Per-URL pipeline: extract, locate, rename, clean tags, re-encode, publish
//!
//! Each run works inside its own staging directory, so nothing but a
//! finished file ever appears in the output directory.

use crate::batch::{self, BatchReport};
use crate::config::{DownloadConfig, ToolPaths};
use crate::downloader::{Downloader, AUDIO_EXTENSION};
use crate::encoder::{self, Encoder};
use crate::error::{Result, Ytmp3Error};
use crate::metadata;
use crate::sanitize::file_name_for_title;

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Pipeline progress stages
#[derive(Debug, Clone)]
pub enum PipelineStage {
    Extracting { url: String },
    Renaming { file_name: String },
    CleaningTags,
    Encoding { audio: String },
    Publishing,
    Complete { output: PathBuf, duration: Duration },
    Failed { stage: String, error: String },
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineStage::Extracting { .. } => write!(f, "Extracting audio..."),
            PipelineStage::Renaming { file_name } => write!(f, "Renaming to {}", file_name),
            PipelineStage::CleaningTags => write!(f, "Cleaning tags..."),
            PipelineStage::Encoding { audio } => write!(f, "Re-encoding ({})...", audio),
            PipelineStage::Publishing => write!(f, "Publishing..."),
            PipelineStage::Complete { output, duration } => write!(
                f,
                "Done: {} ({:.1}s)",
                output.display(),
                duration.as_secs_f32()
            ),
            PipelineStage::Failed { stage, error } => write!(f, "Failed at {}: {}", stage, error),
        }
    }
}

/// Main processing pipeline, shared by every URL of a batch
pub struct Pipeline {
    config: DownloadConfig,
    downloader: Downloader,
    encoder: Encoder,
    publish_lock: Mutex<()>,
}

impl Pipeline {
    pub fn new(config: DownloadConfig, tools: ToolPaths) -> Self {
        Self {
            config,
            downloader: Downloader::new(tools.yt_dlp, tools.ffmpeg.clone()),
            encoder: Encoder::new(tools.ffmpeg),
            publish_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &DownloadConfig {
        &self.config
    }

    /// Process one URL, returning the published file
    pub async fn run(
        &self,
        url: &str,
        cancel: &CancellationToken,
        progress_tx: mpsc::Sender<PipelineStage>,
    ) -> Result<PathBuf> {
        check_cancelled(cancel)?;
        let start_time = Instant::now();

        let staging = tempfile::Builder::new()
            .prefix(".ytmp3-")
            .tempdir_in(self.config.staging_root())?;
        let staging_path = staging.path().to_path_buf();

        info!("Starting pipeline for: {}", url);
        debug!("Staging directory: {}", staging_path.display());

        let result = self
            .process(url, &staging_path, cancel, &progress_tx)
            .await
            .map_err(|e| {
                if e.is_cancelled() || cancel.is_cancelled() {
                    Ytmp3Error::Cancelled
                } else {
                    e
                }
            });

        if let Ok(ref output) = result {
            let duration = start_time.elapsed();
            info!("Pipeline complete: {} ({:.1}s)", output.display(), duration.as_secs_f32());
            let _ = progress_tx
                .send(PipelineStage::Complete {
                    output: output.clone(),
                    duration,
                })
                .await;
        }

        if self.config.keep_temp() {
            // Prevent cleanup by forgetting the temp dir
            std::mem::forget(staging);
            info!("Staging files kept at: {}", staging_path.display());
        } else {
            drop(staging);
        }

        result
    }

    async fn process(
        &self,
        url: &str,
        staging: &Path,
        cancel: &CancellationToken,
        progress_tx: &mpsc::Sender<PipelineStage>,
    ) -> Result<PathBuf> {
        let audio = self.config.audio();
        let failed = |stage: &str, e: Ytmp3Error| {
            let _ = progress_tx.try_send(PipelineStage::Failed {
                stage: stage.to_string(),
                error: e.to_string(),
            });
            e
        };

        // 1-2. Extract and locate the produced file
        let _ = progress_tx
            .send(PipelineStage::Extracting {
                url: url.to_string(),
            })
            .await;
        let extraction = self
            .downloader
            .extract(url, staging, audio, cancel)
            .await
            .map_err(|e| failed("extract", e.into()))?;

        // 3. Sanitize filename
        let file_name = file_name_for_title(&extraction.title, AUDIO_EXTENSION);
        let _ = progress_tx
            .send(PipelineStage::Renaming {
                file_name: file_name.clone(),
            })
            .await;
        let audio_path = rename_sanitized(&extraction.audio_path, &file_name)
            .await
            .map_err(|e| failed("rename", e.into()))?;

        // 4. Clean tags
        check_cancelled(cancel)?;
        let _ = progress_tx.send(PipelineStage::CleaningTags).await;
        metadata::clean_file_tags_blocking(audio_path.clone())
            .await
            .map_err(|e| failed("tags", e.into()))?;

        // 5. Re-encode to the target parameters
        let _ = progress_tx
            .send(PipelineStage::Encoding {
                audio: audio.to_string(),
            })
            .await;
        if let Err(e) = self.encoder.reencode(&audio_path, audio, cancel).await {
            let e = Ytmp3Error::from(e);
            if !e.is_cancelled() && !cancel.is_cancelled() {
                // Pre-transcode audio is published; the URL still counts as failed
                match self.publish(&audio_path, &file_name).await {
                    Ok(kept) => warn!("Re-encode failed, kept original audio: {}", kept.display()),
                    Err(pe) => warn!("Re-encode failed and original audio not kept: {}", pe),
                }
            }
            return Err(failed("encode", e));
        }
        encoder::verify(&audio_path, audio).map_err(|e| failed("verify", e.into()))?;

        // 6. Move into the output directory
        check_cancelled(cancel)?;
        let _ = progress_tx.send(PipelineStage::Publishing).await;
        self.publish(&audio_path, &file_name)
            .await
            .map_err(|e| failed("publish", e.into()))
    }

    async fn publish(&self, audio_path: &Path, file_name: &str) -> std::io::Result<PathBuf> {
        let _guard = self.publish_lock.lock().await;

        let output_dir = self.config.output_dir();
        let destination = if self.config.overwrite() {
            output_dir.join(file_name)
        } else {
            free_destination(output_dir, file_name).await?
        };

        move_into_place(audio_path, &destination).await?;
        Ok(destination)
    }

    /// Process every configured URL without progress reporting
    pub async fn download_all(&self, cancel: &CancellationToken) -> Result<BatchReport> {
        batch::run_batch(
            self.config.urls(),
            self.config.max_concurrent_downloads(),
            cancel,
            |_, url| async move {
                // Receiver dropped: progress sends fail fast instead of blocking
                let (tx, _) = mpsc::channel(1);
                self.run(&url, cancel, tx).await
            },
        )
        .await
    }
}

fn check_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(Ytmp3Error::Cancelled)
    } else {
        Ok(())
    }
}

/// Rename `path` to `file_name` within its directory
async fn rename_sanitized(path: &Path, file_name: &str) -> std::io::Result<PathBuf> {
    let target = path.with_file_name(file_name);
    if target != path {
        debug!("Renaming {} -> {}", path.display(), target.display());
        tokio::fs::rename(path, &target).await?;
    }
    Ok(target)
}

/// `dir/file_name`, or `dir/<stem>_<n>.<ext>` for the first free `n >= 2`
async fn free_destination(dir: &Path, file_name: &str) -> std::io::Result<PathBuf> {
    let candidate = dir.join(file_name);
    if !tokio::fs::try_exists(&candidate).await? {
        return Ok(candidate);
    }

    let name = Path::new(file_name);
    let stem = name
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = name
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| AUDIO_EXTENSION.to_string());

    let mut n = 2;
    loop {
        let candidate = dir.join(format!("{stem}_{n}.{extension}"));
        if !tokio::fs::try_exists(&candidate).await? {
            return Ok(candidate);
        }
        n += 1;
    }
}

/// Rename `src` to `dest`; across filesystems, copy to a hidden sibling of
/// `dest` first so `dest` never holds a partial file.
async fn move_into_place(src: &Path, dest: &Path) -> std::io::Result<()> {
    let err = match tokio::fs::rename(src, dest).await {
        Ok(()) => return Ok(()),
        Err(e) => e,
    };
    debug!("Rename failed ({}), copying instead", err);

    let file_name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let partial = dest.with_file_name(format!(".{file_name}.part"));

    let copied = match tokio::fs::copy(src, &partial).await {
        Ok(_) => tokio::fs::rename(&partial, dest).await,
        Err(e) => Err(e),
    };
    if let Err(e) = copied {
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(e);
    }
    tokio::fs::remove_file(src).await
}
