//! MP3 re-encoding using FFmpeg

use crate::config::AudioParams;
use crate::error::EncodeError;
use crate::process::run_tool;
use lofty::{file::AudioFile, read_from_path};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug)]
pub struct Encoder {
    ffmpeg_path: PathBuf,
}

impl Encoder {
    pub fn new(ffmpeg_path: PathBuf) -> Self {
        Self { ffmpeg_path }
    }

    /// Re-encode `path` in place so it matches `audio` exactly.
    ///
    /// Output goes to a sibling temp file that then replaces the original.
    /// On failure the original is left untouched and the sibling removed.
    pub async fn reencode(
        &self,
        path: &Path,
        audio: AudioParams,
        cancel: &CancellationToken,
    ) -> Result<(), EncodeError> {
        info!("Re-encoding to {}", audio);

        let tmp = temp_sibling(path);
        let args = Self::reencode_args(path, &tmp, audio);

        let result = match run_tool(&self.ffmpeg_path, &args, cancel).await {
            Ok(output) if output.success() => Ok(()),
            Ok(output) => Err(EncodeError::FfmpegFailed {
                code: output.status.code(),
                output: output.combined(),
            }),
            Err(e) => Err(e.into()),
        };

        if let Err(e) = result {
            if let Err(rm) = tokio::fs::remove_file(&tmp).await {
                if rm.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to remove {}: {}", tmp.display(), rm);
                }
            }
            return Err(e);
        }

        tokio::fs::rename(&tmp, path).await?;
        debug!("Re-encoded: {}", path.display());
        Ok(())
    }

    pub fn reencode_args(input: &Path, output: &Path, audio: AudioParams) -> Vec<OsString> {
        let mut args: Vec<OsString> = ["-hide_banner", "-loglevel", "error", "-y", "-i"]
            .iter()
            .map(OsString::from)
            .collect();
        args.push(input.as_os_str().to_owned());

        let settings = [
            "-map".to_string(),
            "0:a".to_string(),
            "-ar".to_string(),
            audio.sample_rate().to_string(),
            "-ac".to_string(),
            audio.channels().to_string(),
            "-c:a".to_string(),
            "libmp3lame".to_string(),
            "-b:a".to_string(),
            format!("{}k", audio.bitrate_kbps()),
            // Drop long free-text fields that tag cleaning does not cover
            "-metadata".to_string(),
            "description=".to_string(),
            "-metadata".to_string(),
            "synopsis=".to_string(),
            "-f".to_string(),
            "mp3".to_string(),
        ];
        args.extend(settings.into_iter().map(OsString::from));
        args.push(output.as_os_str().to_owned());
        args
    }
}

/// `<stem>.transcode.mp3` next to `path`
fn temp_sibling(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{stem}.transcode.mp3"))
}

/// MPEG-1 Layer III bitrates (32, 44.1 and 48 kHz)
const MPEG1_BITRATES: &[u32] = &[32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320];
/// MPEG-2 Layer III bitrates (16, 22.05 and 24 kHz)
const MPEG2_BITRATES: &[u32] = &[8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160];
/// MPEG-2.5 Layer III bitrates (8, 11.025 and 12 kHz)
const MPEG25_BITRATES: &[u32] = &[8, 16, 24, 32, 40, 48, 56, 64];

/// Allowed drift between the configured and the encoded bitrate, in kbps.
const BITRATE_TOLERANCE_KBPS: u32 = 2;

/// Frame bitrate LAME writes when asked for `audio`'s CBR bitrate: the
/// nearest legal value for the sample rate, the lower one on ties.
pub fn encoded_bitrate(audio: AudioParams) -> u32 {
    let table = match audio.sample_rate() {
        32_000.. => MPEG1_BITRATES,
        16_000..=31_999 => MPEG2_BITRATES,
        _ => MPEG25_BITRATES,
    };
    let requested = audio.bitrate_kbps();
    table
        .iter()
        .copied()
        .fold(table[0], |best, candidate| {
            if candidate.abs_diff(requested) < best.abs_diff(requested) {
                candidate
            } else {
                best
            }
        })
}

/// Check that the encoded stream carries the configured sample rate, channel
/// count and bitrate.
pub fn verify(path: &Path, audio: AudioParams) -> Result<(), EncodeError> {
    let tagged_file = read_from_path(path).map_err(|source| EncodeError::Probe {
        path: path.to_path_buf(),
        source,
    })?;
    let properties = tagged_file.properties();

    let sample_rate = properties.sample_rate().unwrap_or(0);
    if sample_rate != audio.sample_rate() {
        return Err(EncodeError::Mismatch {
            field: "sample rate",
            expected: audio.sample_rate(),
            actual: sample_rate,
        });
    }

    let channels = properties.channels().unwrap_or(0);
    if channels != audio.channels() {
        return Err(EncodeError::Mismatch {
            field: "channel count",
            expected: u32::from(audio.channels()),
            actual: u32::from(channels),
        });
    }

    let expected = encoded_bitrate(audio);
    let bitrate = properties.audio_bitrate().unwrap_or(0);
    if bitrate.abs_diff(expected) > BITRATE_TOLERANCE_KBPS {
        return Err(EncodeError::Mismatch {
            field: "bitrate",
            expected,
            actual: bitrate,
        });
    }
    if expected != audio.bitrate_kbps() {
        debug!(
            "Configured {} kbps, nearest MPEG bitrate is {} kbps",
            audio.bitrate_kbps(),
            expected
        );
    }

    Ok(())
}
