//! Application configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{FramecastError, FramecastResult};

/// Global application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// External renderer settings.
    pub renderer: RendererConfig,

    /// Default video export settings.
    pub video: VideoDefaults,

    /// Media download settings.
    pub download: DownloadConfig,

    /// External encoder binaries.
    pub encoder: EncoderConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// How to launch and talk to the external renderer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Renderer executable speaking the JSON-lines remote-control protocol.
    pub command: String,

    /// Extra arguments passed to every renderer process.
    pub args: Vec<String>,

    /// License key forwarded to the renderer client.
    pub key: Option<String>,

    /// Client page URL the renderer should load instead of its bundled one.
    pub client_url: Option<String>,

    /// Upper bound for a single remote call, in milliseconds.
    pub protocol_timeout_ms: u64,

    /// Create a fresh session per job instead of sharing one.
    pub parallel_sessions: bool,
}

/// Default parameters for video export.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoDefaults {
    /// Output frame rate.
    pub fps: f64,

    /// Number of renderer sessions rendering frames concurrently.
    pub parallel: usize,

    /// Pixel ratio used for frame rendering.
    pub pixel_ratio: f64,

    /// Mime type of the intermediate frame images.
    pub frame_mime: String,
}

/// How remote media referenced by a document is rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RewriteMode {
    /// Replace sources with `file://` URLs of the downloaded copies.
    #[default]
    FileUrl,
    /// Inline downloaded copies as base64 data URLs.
    DataUrl,
}

/// Media download settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Maximum attempts per URL.
    pub attempts: u32,

    /// Delay before the second attempt; doubles afterwards.
    pub backoff_base_ms: u64,

    /// Upper bound for a single backoff delay.
    pub backoff_max_ms: u64,

    /// Re-encode downloaded videos to webm before rendering.
    pub normalize_video: bool,

    /// How rewritten sources are expressed.
    pub rewrite: RewriteMode,
}

/// External encoder binaries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    pub ffmpeg: String,
    pub ffprobe: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "framecast_session=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            command: "framecast-renderer".to_string(),
            args: Vec::new(),
            key: None,
            client_url: None,
            protocol_timeout_ms: 180_000,
            parallel_sessions: false,
        }
    }
}

impl Default for VideoDefaults {
    fn default() -> Self {
        Self {
            fps: 15.0,
            parallel: 5,
            pixel_ratio: 0.5,
            frame_mime: "image/png".to_string(),
        }
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff_base_ms: 500,
            backoff_max_ms: 8_000,
            normalize_video: false,
            rewrite: RewriteMode::FileUrl,
        }
    }
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        let config_path = config_file_path();
        if config_path.exists() {
            match Self::load_from(&config_path) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!("Failed to load config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Load config from an explicit file. Missing sections use defaults.
    pub fn load_from(path: &Path) -> FramecastResult<Self> {
        if !path.exists() {
            return Err(FramecastError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        let config_path = config_file_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }

    /// Reject values the export pipeline cannot work with.
    pub fn validate(&self) -> FramecastResult<()> {
        if !(self.video.fps > 0.0) {
            return Err(FramecastError::config("video.fps must be positive"));
        }
        if self.video.parallel == 0 {
            return Err(FramecastError::config("video.parallel must be at least 1"));
        }
        if self.download.attempts == 0 {
            return Err(FramecastError::config(
                "download.attempts must be at least 1",
            ));
        }
        if self.renderer.command.trim().is_empty() {
            return Err(FramecastError::config("renderer.command is empty"));
        }
        Ok(())
    }
}

/// Standard config file location.
fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("framecast").join("config.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_export_defaults() {
        let config = AppConfig::default();
        assert!((config.video.fps - 15.0).abs() < 1e-9);
        assert_eq!(config.video.parallel, 5);
        assert_eq!(config.download.attempts, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_uses_section_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "video": { "fps": 30 } }"#).unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert!((config.video.fps - 30.0).abs() < 1e-9);
        assert_eq!(config.video.parallel, 5);
        assert_eq!(config.encoder.ffmpeg, "ffmpeg");
        assert_eq!(config.download.rewrite, RewriteMode::FileUrl);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "video": { "parallel": 0 } }"#).unwrap();

        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, FramecastError::Config { .. }));
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = AppConfig::load_from(Path::new("/nonexistent/framecast.json")).unwrap_err();
        assert!(matches!(err, FramecastError::FileNotFound { .. }));
    }
}
