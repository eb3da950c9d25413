//! Error types shared across Framecast crates.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Classification of an asynchronous asset failure reported by a renderer.
///
/// Renderers are expected to send the kind explicitly. When they only send a
/// human-readable message, [`AssetErrorKind::classify`] is used as a fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetErrorKind {
    /// An image could not be fetched or decoded.
    Image,
    /// A font failed to load or timed out while loading.
    Font,
    /// A video source could not be fetched or decoded.
    Video,
    /// The per-job asset load timeout was exceeded.
    Timeout,
    /// Anything else raised from deferred renderer work.
    Other,
}

impl AssetErrorKind {
    /// Best-effort classification of a renderer message.
    pub fn classify(message: &str) -> Self {
        let lower = message.to_ascii_lowercase();
        if lower.contains("font") {
            Self::Font
        } else if lower.contains("timeout") || lower.contains("timed out") {
            Self::Timeout
        } else if lower.contains("image") {
            Self::Image
        } else if lower.contains("video") {
            Self::Video
        } else {
            Self::Other
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Font => "font",
            Self::Video => "video",
            Self::Timeout => "timeout",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for AssetErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level error type for Framecast operations.
#[derive(Debug, thiserror::Error)]
pub enum FramecastError {
    #[error("Session is busy: another job is already running on session {session_id}")]
    Busy { session_id: u64 },

    #[error("Asset error ({kind}): {message}")]
    Asset {
        kind: AssetErrorKind,
        message: String,
    },

    #[error("Timeout: {message}")]
    Timeout { message: String },

    #[error("Renderer navigation/process error: {message}")]
    Navigation { message: String },

    #[error("Precondition failed: {message}")]
    Precondition { message: String },

    #[error("Download of {url} failed after {attempts} attempt(s): {message}")]
    Download {
        url: String,
        attempts: u32,
        message: String,
    },

    #[error("Encoder error: {message} (status: {status})\n{stderr}")]
    Encoder {
        message: String,
        status: String,
        stdout: String,
        stderr: String,
    },

    #[error("Session error: {message}")]
    Session { message: String },

    #[error("Render error: {message}")]
    Render { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Export cancelled")]
    Cancelled,

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using FramecastError.
pub type FramecastResult<T> = Result<T, FramecastError>;

impl FramecastError {
    pub fn asset(kind: AssetErrorKind, msg: impl Into<String>) -> Self {
        Self::Asset {
            kind,
            message: msg.into(),
        }
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout {
            message: msg.into(),
        }
    }

    pub fn navigation(msg: impl Into<String>) -> Self {
        Self::Navigation {
            message: msg.into(),
        }
    }

    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::Precondition {
            message: msg.into(),
        }
    }

    pub fn session(msg: impl Into<String>) -> Self {
        Self::Session {
            message: msg.into(),
        }
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Navigation and process failures are fatal regardless of skip flags.
    pub fn is_navigation(&self) -> bool {
        matches!(self, Self::Navigation { .. })
    }

    /// Asset kind if this error came from the renderer's error channel.
    pub fn asset_kind(&self) -> Option<AssetErrorKind> {
        match self {
            Self::Asset { kind, .. } => Some(*kind),
            Self::Timeout { .. } => Some(AssetErrorKind::Timeout),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_font_timeout_is_font() {
        assert_eq!(
            AssetErrorKind::classify("Timeout for loading font Roboto"),
            AssetErrorKind::Font
        );
    }

    #[test]
    fn test_classify_generic_timeout() {
        assert_eq!(
            AssetErrorKind::classify("Asset load timed out after 1ms"),
            AssetErrorKind::Timeout
        );
    }

    #[test]
    fn test_classify_image_and_fallback() {
        assert_eq!(
            AssetErrorKind::classify("Can not load image https://x/y.png"),
            AssetErrorKind::Image
        );
        assert_eq!(
            AssetErrorKind::classify("something else broke"),
            AssetErrorKind::Other
        );
    }

    #[test]
    fn test_encoder_error_display_includes_stderr() {
        let err = FramecastError::Encoder {
            message: "ffmpeg exited".to_string(),
            status: "exit status: 1".to_string(),
            stdout: String::new(),
            stderr: "Stream specifier ':a' matches no streams".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("matches no streams"));
        assert!(text.contains("exit status: 1"));
    }

    #[test]
    fn test_asset_kind_of_timeout() {
        let err = FramecastError::timeout("assets took too long");
        assert_eq!(err.asset_kind(), Some(AssetErrorKind::Timeout));
        assert!(!err.is_navigation());
    }
}
