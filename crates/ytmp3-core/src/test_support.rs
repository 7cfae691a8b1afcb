//! Fake yt-dlp/ffmpeg scripts and MP3 fixtures for pipeline tests

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// One MPEG-1 Layer III frame header: 128 kbps, 44100 Hz, joint stereo.
const FRAME_HEADER: [u8; 4] = [0xFF, 0xFB, 0x90, 0x44];
const FRAME_LEN: usize = 417;

pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    let mut perms = fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).unwrap();
    path
}

fn syncsafe(n: usize) -> [u8; 4] {
    [
        ((n >> 21) & 0x7F) as u8,
        ((n >> 14) & 0x7F) as u8,
        ((n >> 7) & 0x7F) as u8,
        (n & 0x7F) as u8,
    ]
}

fn id3v24_frame(id: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut frame = id.to_vec();
    frame.extend(syncsafe(body.len()));
    frame.extend([0, 0]);
    frame.extend(body);
    frame
}

/// A tiny but valid MP3: optional ID3v2.4 title/comment, then silent frames.
pub fn write_mp3(path: &Path, title: Option<&str>, comment: Option<&str>) {
    let mut frames = Vec::new();
    if let Some(title) = title {
        let mut body = vec![0x03];
        body.extend(title.as_bytes());
        frames.extend(id3v24_frame(b"TIT2", &body));
    }
    if let Some(comment) = comment {
        let mut body = vec![0x03];
        body.extend(b"eng");
        body.push(0x00);
        body.extend(comment.as_bytes());
        frames.extend(id3v24_frame(b"COMM", &body));
    }

    let mut data = Vec::new();
    if !frames.is_empty() {
        data.extend(b"ID3");
        data.extend([4, 0, 0]);
        data.extend(syncsafe(frames.len()));
        data.extend(frames);
    }
    for _ in 0..20 {
        data.extend(FRAME_HEADER);
        data.extend(std::iter::repeat(0u8).take(FRAME_LEN - FRAME_HEADER.len()));
    }
    fs::write(path, data).unwrap();
}

/// Fake yt-dlp: copies `fixture` to the `-o` template (title replaced by
/// `file_title`) and prints the JSON line. URLs containing `broken` fail,
/// URLs containing `slow` hang.
pub fn fake_yt_dlp(dir: &Path, file_title: &str, json_title: &str, fixture: &Path) -> PathBuf {
    let body = r#"
out=""
url=""
while [ $# -gt 0 ]; do
  case "$1" in
    -o) shift; out="$1" ;;
    *) url="$1" ;;
  esac
  shift
done
case "$url" in
  *broken*) echo "ERROR: [youtube] broken: Video unavailable" >&2; exit 1 ;;
  *slow*) sleep 30 ;;
esac
path=$(printf '%s' "$out" | sed -e 's/%(title)\.150B/@FILE_TITLE@/' -e 's/%(ext)s/mp3/')
cp "@FIXTURE@" "$path"
echo "[ExtractAudio] noise"
printf '{"id": "abc123", "title": "%s", "filepath": "%s"}\n' "@JSON_TITLE@" "$path"
"#
    .replace("@FILE_TITLE@", file_title)
    .replace("@JSON_TITLE@", json_title)
    .replace("@FIXTURE@", &fixture.display().to_string());
    write_script(dir, "yt-dlp", &body)
}

/// Fake ffmpeg: copies the `-i` input to the last argument and records the
/// arguments in `ffmpeg-args.txt` next to the script.
pub fn fake_ffmpeg(dir: &Path) -> PathBuf {
    let body = r#"
for arg in "$@"; do last="$arg"; done
printf '%s\n' "$@" > "$(dirname "$0")/ffmpeg-args.txt"
while [ $# -gt 0 ]; do
  if [ "$1" = "-i" ]; then shift; in="$1"; fi
  shift
done
cp "$in" "$last"
"#;
    write_script(dir, "ffmpeg", body)
}

pub fn failing_ffmpeg(dir: &Path) -> PathBuf {
    write_script(
        dir,
        "ffmpeg",
        r#"echo "Unknown encoder 'libmp3lame'" >&2; exit 1"#,
    )
}

/// Audio files directly inside `dir`.
pub fn mp3_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.extension().is_some_and(|e| e == "mp3"))
        .collect();
    files.sort();
    files
}
