//! Document and page types.
//!
//! A document is the top-level JSON scene graph: ordered pages, each with a
//! duration and an element tree, plus document-level audio overlays.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use framecast_common::error::FramecastError;

use crate::element::{full_fraction, walk_elements, walk_elements_mut, Element, MediaKind};

/// Page duration used when a page does not specify one.
pub const DEFAULT_PAGE_DURATION_MS: f64 = 5000.0;

/// Top-level design document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,

    /// Pages in timeline order.
    #[serde(default)]
    pub pages: Vec<Page>,

    /// Document-level audio overlays.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub audios: Vec<AudioTrack>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A single page of the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    #[serde(default)]
    pub id: String,

    /// Page duration in milliseconds.
    #[serde(default = "default_page_duration")]
    pub duration: f64,

    #[serde(default)]
    pub children: Vec<Element>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Document-level audio overlay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioTrack {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub src: Option<String>,

    /// Trim start as a fraction of the natural duration.
    #[serde(default)]
    pub start_time: f64,

    /// Trim end as a fraction of the natural duration.
    #[serde(default = "full_fraction")]
    pub end_time: f64,

    /// Natural duration in milliseconds (0 when unknown).
    #[serde(default)]
    pub duration: f64,

    #[serde(default = "full_fraction")]
    pub volume: f64,

    /// Offset on the output timeline, in milliseconds.
    #[serde(default)]
    pub delay: f64,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_page_duration() -> f64 {
    DEFAULT_PAGE_DURATION_MS
}

/// Where a media reference lives in the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaOwner {
    /// Placed on the page with this index.
    Page(usize),
    /// One of the document-level `audios`.
    Document,
}

/// A flattened view of one media source and its timing.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaRef {
    pub kind: MediaKind,
    pub owner: MediaOwner,
    pub id: String,
    pub src: String,
    pub start_fraction: f64,
    pub end_fraction: f64,
    pub natural_duration_ms: f64,
    pub volume: f64,
    /// Explicit output offset; only document-level tracks carry one.
    pub delay_ms: f64,
}

impl Page {
    pub fn new(id: impl Into<String>, duration_ms: f64) -> Self {
        Self {
            id: id.into(),
            duration: duration_ms,
            children: Vec::new(),
            extra: Map::new(),
        }
    }
}

impl AudioTrack {
    pub fn new(id: impl Into<String>, src: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            src: Some(src.into()),
            start_time: 0.0,
            end_time: 1.0,
            duration: 0.0,
            volume: 1.0,
            delay: 0.0,
            extra: Map::new(),
        }
    }
}

impl Document {
    /// Create an empty document with the given pages.
    pub fn with_pages(pages: Vec<Page>) -> Self {
        Self {
            width: None,
            height: None,
            pages,
            audios: Vec::new(),
            extra: Map::new(),
        }
    }

    /// Parse a document from a JSON string.
    pub fn from_json_str(json: &str) -> Result<Self, DocumentError> {
        serde_json::from_str(json).map_err(|source| DocumentError::ParseError {
            path: None,
            source,
        })
    }

    /// Load a document from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DocumentError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| DocumentError::IoError {
            path: path.to_path_buf(),
            source: e,
        })?;
        serde_json::from_str(&content).map_err(|source| DocumentError::ParseError {
            path: Some(path.to_path_buf()),
            source,
        })
    }

    /// Serialize back to the JSON shape the renderer expects.
    pub fn to_json_value(&self) -> Result<Value, DocumentError> {
        serde_json::to_value(self).map_err(|source| DocumentError::ParseError { path: None, source })
    }

    /// Sum of all page durations, in milliseconds.
    pub fn total_duration_ms(&self) -> f64 {
        self.pages.iter().map(|p| p.duration.max(0.0)).sum()
    }

    /// Every video/audio source in the document, pages first (in timeline
    /// order, depth-first within a page), then document-level audios.
    pub fn media_refs(&self) -> Vec<MediaRef> {
        let mut refs = Vec::new();
        for (index, page) in self.pages.iter().enumerate() {
            walk_elements(&page.children, &mut |element| {
                let Some((kind, media)) = element.media() else {
                    return;
                };
                let Some(src) = media.src.as_ref() else {
                    return;
                };
                refs.push(MediaRef {
                    kind,
                    owner: MediaOwner::Page(index),
                    id: media.id.clone(),
                    src: src.clone(),
                    start_fraction: media.start_time,
                    end_fraction: media.end_time,
                    natural_duration_ms: media.duration,
                    volume: media.volume,
                    delay_ms: 0.0,
                });
            });
        }
        for track in &self.audios {
            let Some(src) = track.src.as_ref() else {
                continue;
            };
            refs.push(MediaRef {
                kind: MediaKind::Audio,
                owner: MediaOwner::Document,
                id: track.id.clone(),
                src: src.clone(),
                start_fraction: track.start_time,
                end_fraction: track.end_time,
                natural_duration_ms: track.duration,
                volume: track.volume,
                delay_ms: track.delay,
            });
        }
        refs
    }

    /// Replace media sources in place. `rewrite` returns the new source, or
    /// `None` to leave it unchanged. Returns the number of sources replaced.
    pub fn rewrite_media_sources(&mut self, mut rewrite: impl FnMut(&str) -> Option<String>) -> usize {
        let mut replaced = 0usize;
        for page in &mut self.pages {
            walk_elements_mut(&mut page.children, &mut |element| {
                if let Some((_, media)) = element.media_mut() {
                    if let Some(next) = media.src.as_deref().and_then(&mut rewrite) {
                        media.src = Some(next);
                        replaced += 1;
                    }
                }
            });
        }
        for track in &mut self.audios {
            if let Some(next) = track.src.as_deref().and_then(&mut rewrite) {
                track.src = Some(next);
                replaced += 1;
            }
        }
        replaced
    }
}

/// Errors that can occur when loading documents.
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Parse error{}: {source}", path.as_ref().map(|p| format!(" in {}", p.display())).unwrap_or_default())]
    ParseError {
        path: Option<PathBuf>,
        source: serde_json::Error,
    },
}

impl From<DocumentError> for FramecastError {
    fn from(err: DocumentError) -> Self {
        match err {
            DocumentError::IoError { path, source } if source.kind() == std::io::ErrorKind::NotFound => {
                FramecastError::FileNotFound { path }
            }
            DocumentError::IoError { source, .. } => FramecastError::Io(source),
            DocumentError::ParseError { source, .. } => FramecastError::Json(source),
        }
    }
}
