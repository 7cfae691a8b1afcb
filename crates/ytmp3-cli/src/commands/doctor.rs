use anyhow::Result;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitCode};
use which::which;
use ytmp3_core::config::{Settings, ENV_PREFIX};

pub async fn run(settings: &Settings) -> Result<ExitCode> {
    println!("ytmp3 dependency check\n");

    let mut all_ok = true;

    // Check yt-dlp
    print!("yt-dlp:        ");
    match locate("yt-dlp", settings.yt_dlp.as_deref()) {
        Some(path) => match Command::new(&path).arg("--version").output() {
            Ok(out) => {
                let v = String::from_utf8_lossy(&out.stdout);
                println!("OK ({}, {})", v.trim(), path.display());
            }
            Err(_) => {
                println!("FOUND but failed to get version");
                all_ok = false;
            }
        },
        None => {
            println!("NOT FOUND");
            println!("               Install with: pip install yt-dlp");
            println!("               or set {}YT_DLP", ENV_PREFIX);
            all_ok = false;
        }
    }

    // Check FFmpeg and its MP3 encoder
    print!("ffmpeg:        ");
    match locate("ffmpeg", settings.ffmpeg.as_deref()) {
        Some(path) => {
            match Command::new(&path).arg("-version").output() {
                Ok(out) => {
                    println!("OK ({}, {})", ffmpeg_version(&out.stdout), path.display());
                }
                Err(_) => {
                    println!("FOUND but failed to get version");
                    all_ok = false;
                }
            }

            print!("  libmp3lame:  ");
            let encoders = Command::new(&path)
                .args(["-hide_banner", "-encoders"])
                .output();
            match encoders {
                Ok(out) if has_encoder(&out.stdout, "libmp3lame") => println!("OK"),
                _ => {
                    println!("NOT AVAILABLE");
                    println!("               Install an FFmpeg build with LAME support");
                    all_ok = false;
                }
            }
        }
        None => {
            println!("NOT FOUND");
            println!("               Install with: brew install ffmpeg (or apt install ffmpeg)");
            println!("               or set {}FFMPEG", ENV_PREFIX);
            all_ok = false;
        }
    }

    println!();
    if all_ok {
        println!("All dependencies OK!");
        Ok(ExitCode::SUCCESS)
    } else {
        println!("Some dependencies are missing. See above for installation instructions.");
        Ok(ExitCode::FAILURE)
    }
}

fn locate(tool: &str, configured: Option<&Path>) -> Option<PathBuf> {
    which(configured.unwrap_or_else(|| Path::new(tool))).ok()
}

/// Third word of `ffmpeg -version`'s first line
fn ffmpeg_version(stdout: &[u8]) -> String {
    String::from_utf8_lossy(stdout)
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(2))
        .unwrap_or("unknown")
        .to_string()
}

fn has_encoder(stdout: &[u8], name: &str) -> bool {
    String::from_utf8_lossy(stdout)
        .lines()
        .any(|line| line.split_whitespace().nth(1) == Some(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ffmpeg_version() {
        let out = b"ffmpeg version 6.1.1-3ubuntu5 Copyright (c) 2000-2023\nbuilt with gcc\n";
        assert_eq!(ffmpeg_version(out), "6.1.1-3ubuntu5");
        assert_eq!(ffmpeg_version(b""), "unknown");
    }

    #[test]
    fn test_has_encoder() {
        let out = b"Encoders:\n V..... = Video\n ------\n \
                    A....D libmp3lame           libmp3lame MP3 (MPEG audio layer 3)\n \
                    A....D aac                  AAC (Advanced Audio Coding)\n";
        assert!(has_encoder(out, "libmp3lame"));
        assert!(!has_encoder(out, "libopus"));
    }
}
