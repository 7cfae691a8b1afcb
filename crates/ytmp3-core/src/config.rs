//! Configuration management for ytmp3

use crate::error::ConfigError;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Prefix of every environment variable read by ytmp3.
pub const ENV_PREFIX: &str = "YTMP3_";

/// Raw layered settings: defaults, config file, environment, CLI overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Target bitrate in kbps (1-320)
    pub bitrate: u32,
    /// Channel count: 1 (mono) or 2 (stereo)
    pub channels: u8,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Directory receiving the finished MP3 files
    pub output_dir: PathBuf,
    /// Upper bound on downloads in flight
    pub max_concurrent_downloads: usize,
    /// Staging location (a hidden directory inside `output_dir` if not set)
    pub temp_dir: Option<PathBuf>,
    /// One of debug, info, warn, error
    pub log_level: String,
    /// Keep staging directories after processing
    pub keep_temp: bool,
    /// Replace existing files instead of picking a free name
    pub overwrite: bool,
    /// Path to yt-dlp binary (auto-detected if not set)
    pub yt_dlp: Option<PathBuf>,
    /// Path to FFmpeg binary (auto-detected if not set)
    pub ffmpeg: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bitrate: 320,
            channels: 2,
            sample_rate: 48000,
            output_dir: PathBuf::from("./downloads"),
            max_concurrent_downloads: 1,
            temp_dir: None,
            log_level: "info".to_string(),
            keep_temp: false,
            overwrite: false,
            yt_dlp: None,
            ffmpeg: None,
        }
    }
}

/// Values given on the command line; unset fields leave lower layers alone.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SettingsOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bitrate: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channels: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_concurrent_downloads: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keep_temp: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overwrite: Option<bool>,
}

impl Settings {
    /// Load settings from defaults, config files, environment and overrides
    pub fn load(
        config_file: Option<&Path>,
        overrides: &SettingsOverrides,
    ) -> Result<Self, ConfigError> {
        Self::figment(config_file, overrides)
            .extract()
            .map_err(|e| ConfigError::LoadError(e.to_string()))
    }

    pub fn figment(config_file: Option<&Path>, overrides: &SettingsOverrides) -> Figment {
        Self::layered(default_config_file().as_deref(), config_file, overrides)
    }

    fn layered(
        user_file: Option<&Path>,
        config_file: Option<&Path>,
        overrides: &SettingsOverrides,
    ) -> Figment {
        let mut figment = Figment::new().merge(Serialized::defaults(Settings::default()));

        if let Some(path) = user_file.filter(|p| p.exists()) {
            figment = figment.merge(Toml::file(path));
        }

        if let Some(path) = config_file {
            figment = figment.merge(Toml::file(path));
        }

        figment
            .merge(Env::prefixed(ENV_PREFIX))
            .merge(Serialized::defaults(overrides.clone()))
    }
}

/// `<config_dir>/ytmp3/config.toml`, if the platform has a config dir
pub fn default_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("ytmp3/config.toml"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        }
    }
}

impl FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            other => Err(ConfigError::InvalidValue(format!(
                "log level {other:?} must be one of debug, info, warn, error"
            ))),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated target audio parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioParams {
    bitrate_kbps: u32,
    channels: u8,
    sample_rate: u32,
}

impl AudioParams {
    pub const MAX_BITRATE_KBPS: u32 = 320;

    pub fn new(bitrate_kbps: u32, channels: u8, sample_rate: u32) -> Result<Self, ConfigError> {
        if bitrate_kbps == 0 || bitrate_kbps > Self::MAX_BITRATE_KBPS {
            return Err(ConfigError::InvalidValue(format!(
                "bitrate {bitrate_kbps} must be between 1 and {} kbps",
                Self::MAX_BITRATE_KBPS
            )));
        }
        if channels != 1 && channels != 2 {
            return Err(ConfigError::InvalidValue(format!(
                "channels {channels} must be either 1 (mono) or 2 (stereo)"
            )));
        }
        if sample_rate == 0 {
            return Err(ConfigError::InvalidValue(
                "sample rate must be greater than 0".to_string(),
            ));
        }

        Ok(Self {
            bitrate_kbps,
            channels,
            sample_rate,
        })
    }

    pub fn bitrate_kbps(&self) -> u32 {
        self.bitrate_kbps
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

impl fmt::Display for AudioParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} kbps, {} ch, {} Hz",
            self.bitrate_kbps, self.channels, self.sample_rate
        )
    }
}

/// Immutable configuration consumed by the pipeline and batch orchestrator.
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    audio: AudioParams,
    output_dir: PathBuf,
    urls: Vec<String>,
    max_concurrent_downloads: usize,
    temp_dir: Option<PathBuf>,
    keep_temp: bool,
    overwrite: bool,
    log_level: LogLevel,
}

impl DownloadConfig {
    pub fn new(settings: &Settings, urls: Vec<String>) -> Result<Self, ConfigError> {
        let audio = AudioParams::new(settings.bitrate, settings.channels, settings.sample_rate)?;

        if settings.output_dir.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue(
                "output directory cannot be empty".to_string(),
            ));
        }
        let output_dir = std::path::absolute(&settings.output_dir)?;

        if settings.max_concurrent_downloads == 0 {
            return Err(ConfigError::InvalidValue(
                "max concurrent downloads must be greater than 0".to_string(),
            ));
        }

        let log_level = settings.log_level.parse()?;

        let temp_dir = settings
            .temp_dir
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
            .map(std::path::absolute)
            .transpose()?;

        if urls.is_empty() {
            return Err(ConfigError::NoUrls);
        }

        Ok(Self {
            audio,
            output_dir,
            urls,
            max_concurrent_downloads: settings.max_concurrent_downloads,
            temp_dir,
            keep_temp: settings.keep_temp,
            overwrite: settings.overwrite,
            log_level,
        })
    }

    /// Create the output directory (and the staging root) if missing
    pub async fn create_dirs(&self) -> Result<(), ConfigError> {
        tokio::fs::create_dir_all(&self.output_dir).await?;
        if let Some(ref temp_dir) = self.temp_dir {
            tokio::fs::create_dir_all(temp_dir).await?;
        }
        Ok(())
    }

    pub fn audio(&self) -> AudioParams {
        self.audio
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    pub fn max_concurrent_downloads(&self) -> usize {
        self.max_concurrent_downloads
    }

    /// Where per-URL staging directories are created
    pub fn staging_root(&self) -> &Path {
        self.temp_dir.as_deref().unwrap_or(&self.output_dir)
    }

    pub fn keep_temp(&self) -> bool {
        self.keep_temp
    }

    pub fn overwrite(&self) -> bool {
        self.overwrite
    }

    pub fn log_level(&self) -> LogLevel {
        self.log_level
    }
}

/// Resolved external tool locations.
#[derive(Debug, Clone)]
pub struct ToolPaths {
    pub yt_dlp: PathBuf,
    pub ffmpeg: PathBuf,
}

impl ToolPaths {
    /// Resolve yt-dlp and FFmpeg from settings, falling back to `PATH`
    pub fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        Ok(Self {
            yt_dlp: resolve_tool("yt-dlp", "YT_DLP", settings.yt_dlp.as_deref())?,
            ffmpeg: resolve_tool("ffmpeg", "FFMPEG", settings.ffmpeg.as_deref())?,
        })
    }
}

fn resolve_tool(
    tool: &'static str,
    env_suffix: &str,
    configured: Option<&Path>,
) -> Result<PathBuf, ConfigError> {
    let candidate = configured.unwrap_or_else(|| Path::new(tool));
    which::which(candidate).map_err(|e| ConfigError::ToolNotFound {
        tool,
        detail: format!(
            "{} ({e}); install it or set {ENV_PREFIX}{env_suffix}",
            candidate.display()
        ),
    })
}

/// Split a comma-separated URL list, dropping blanks
pub fn parse_urls(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .map(String::from)
        .collect()
}

/// Read URLs from file content: one per line, `#` starts a comment line
pub fn parse_url_lines(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    fn settings_with(bitrate: u32, channels: u8) -> Settings {
        Settings {
            bitrate,
            channels,
            ..Settings::default()
        }
    }

    fn urls() -> Vec<String> {
        vec!["https://youtu.be/dQw4w9WgXcQ".to_string()]
    }

    #[test]
    fn test_bitrate_range() {
        assert!(DownloadConfig::new(&settings_with(0, 2), urls()).is_err());
        assert!(DownloadConfig::new(&settings_with(321, 2), urls()).is_err());
        assert!(DownloadConfig::new(&settings_with(1, 2), urls()).is_ok());
        assert!(DownloadConfig::new(&settings_with(320, 2), urls()).is_ok());
    }

    #[test]
    fn test_channel_count() {
        assert!(DownloadConfig::new(&settings_with(320, 3), urls()).is_err());
        assert!(DownloadConfig::new(&settings_with(320, 0), urls()).is_err());
        assert!(DownloadConfig::new(&settings_with(320, 1), urls()).is_ok());
        assert!(DownloadConfig::new(&settings_with(320, 2), urls()).is_ok());
    }

    #[test]
    fn test_other_invalid_values() {
        let mut settings = Settings::default();
        settings.sample_rate = 0;
        assert!(DownloadConfig::new(&settings, urls()).is_err());

        let mut settings = Settings::default();
        settings.output_dir = PathBuf::new();
        assert!(DownloadConfig::new(&settings, urls()).is_err());

        let mut settings = Settings::default();
        settings.max_concurrent_downloads = 0;
        assert!(DownloadConfig::new(&settings, urls()).is_err());

        let mut settings = Settings::default();
        settings.log_level = "verbose".to_string();
        assert!(DownloadConfig::new(&settings, urls()).is_err());

        assert!(matches!(
            DownloadConfig::new(&Settings::default(), Vec::new()),
            Err(ConfigError::NoUrls)
        ));
    }

    #[test]
    fn test_output_dir_is_absolute() {
        let config = DownloadConfig::new(&Settings::default(), urls()).unwrap();
        assert!(config.output_dir().is_absolute());
        assert!(config.output_dir().ends_with("downloads"));
        assert_eq!(config.staging_root(), config.output_dir());
        assert_eq!(config.log_level(), LogLevel::Info);
    }

    #[test]
    fn test_empty_temp_dir_means_unset() {
        let mut settings = Settings::default();
        settings.temp_dir = Some(PathBuf::new());
        let config = DownloadConfig::new(&settings, urls()).unwrap();
        assert_eq!(config.staging_root(), config.output_dir());
    }

    #[test]
    fn test_log_level_parse() {
        assert_eq!("DEBUG".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert_eq!(" warn ".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert!("trace".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_parse_urls() {
        assert_eq!(
            parse_urls("https://a, https://b ,,https://c,"),
            vec!["https://a", "https://b", "https://c"]
        );
        assert!(parse_urls("").is_empty());
    }

    #[test]
    fn test_parse_url_lines() {
        let content = "# favourites\nhttps://a\n\n  https://b  \n#https://c\n";
        assert_eq!(parse_url_lines(content), vec!["https://a", "https://b"]);
    }

    #[test]
    fn test_env_overrides_defaults() {
        Jail::expect_with(|jail| {
            jail.set_env("YTMP3_BITRATE", 192);
            jail.set_env("YTMP3_SAMPLE_RATE", 44100);
            jail.set_env("YTMP3_MAX_CONCURRENT_DOWNLOADS", 3);
            jail.set_env("YTMP3_OUTPUT_DIR", "music");

            let settings: Settings =
                Settings::layered(None, None, &SettingsOverrides::default()).extract()?;
            assert_eq!(settings.bitrate, 192);
            assert_eq!(settings.sample_rate, 44100);
            assert_eq!(settings.max_concurrent_downloads, 3);
            assert_eq!(settings.output_dir, PathBuf::from("music"));
            assert_eq!(settings.channels, 2);
            assert_eq!(settings.log_level, "info");
            Ok(())
        });
    }

    #[test]
    fn test_layer_precedence() {
        Jail::expect_with(|jail| {
            jail.create_file("ytmp3.toml", "bitrate = 256\nchannels = 1\nsample_rate = 22050")?;
            jail.set_env("YTMP3_BITRATE", 128);

            let from_file: Settings = Settings::layered(
                None,
                Some(Path::new("ytmp3.toml")),
                &SettingsOverrides::default(),
            )
            .extract()?;
            assert_eq!(from_file.bitrate, 128);
            assert_eq!(from_file.channels, 1);
            assert_eq!(from_file.sample_rate, 22050);

            let overrides = SettingsOverrides {
                bitrate: Some(64),
                sample_rate: Some(16000),
                ..SettingsOverrides::default()
            };
            let from_flags: Settings =
                Settings::layered(None, Some(Path::new("ytmp3.toml")), &overrides).extract()?;
            assert_eq!(from_flags.bitrate, 64);
            assert_eq!(from_flags.sample_rate, 16000);
            assert_eq!(from_flags.channels, 1);
            Ok(())
        });
    }

    #[test]
    fn test_missing_tool_is_reported() {
        let settings = Settings {
            yt_dlp: Some(PathBuf::from("/nonexistent/ytmp3-test/yt-dlp")),
            ..Settings::default()
        };
        let err = ToolPaths::resolve(&settings).unwrap_err();
        assert!(matches!(err, ConfigError::ToolNotFound { tool: "yt-dlp", .. }));
    }
}
