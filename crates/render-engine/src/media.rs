//! Media asset preparation for video export.
//!
//! Before any frame is rendered, every remote video/audio source in the
//! document is downloaded once into a scratch directory and the document
//! copy is rewritten to point at the local files. The renderer then never
//! touches the network, and the multiplexer can read the same files.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64::Engine as _;
use futures_util::StreamExt;
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;

use framecast_common::clock::backoff_delay;
use framecast_common::config::{DownloadConfig, RewriteMode};
use framecast_common::error::{FramecastError, FramecastResult};
use framecast_document::{Document, MediaKind};

use crate::encoder::Encoder;
use crate::fetch::Fetcher;

/// Content types with a known file extension.
const CONTENT_TYPE_EXTENSIONS: &[(&str, &str)] = &[
    ("video/mp4", "mp4"),
    ("video/webm", "webm"),
    ("video/quicktime", "mov"),
    ("video/x-matroska", "mkv"),
    ("video/ogg", "ogv"),
    ("audio/mpeg", "mp3"),
    ("audio/mp3", "mp3"),
    ("audio/mp4", "m4a"),
    ("audio/aac", "aac"),
    ("audio/wav", "wav"),
    ("audio/x-wav", "wav"),
    ("audio/wave", "wav"),
    ("audio/ogg", "ogg"),
    ("audio/webm", "weba"),
    ("audio/flac", "flac"),
    ("image/png", "png"),
    ("image/jpeg", "jpg"),
    ("image/gif", "gif"),
    ("image/webp", "webp"),
    ("image/svg+xml", "svg"),
    ("font/ttf", "ttf"),
    ("font/otf", "otf"),
    ("font/woff", "woff"),
    ("font/woff2", "woff2"),
    ("application/vnd.ms-fontobject", "eot"),
];

/// Extension used when neither the URL nor the content type tells.
pub const FALLBACK_EXTENSION: &str = "bin";

/// Whether `src` must be downloaded. Only `http(s)` sources are remote.
pub fn is_remote(src: &str) -> bool {
    let lower = src.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// File extension for a downloaded resource: the URL path's extension when
/// it has one, else the content type's, else [`FALLBACK_EXTENSION`].
pub fn extension_for(url: &str, content_type: Option<&str>) -> String {
    if let Some(ext) = url_extension(url) {
        return ext;
    }
    content_type
        .and_then(extension_for_mime)
        .unwrap_or(FALLBACK_EXTENSION)
        .to_string()
}

/// File extension for a mime type, if known.
pub fn extension_for_mime(mime: &str) -> Option<&'static str> {
    CONTENT_TYPE_EXTENSIONS
        .iter()
        .find(|(known, _)| *known == mime)
        .map(|(_, ext)| *ext)
}

/// Mime type for a file extension, if known.
pub fn mime_for_extension(ext: &str) -> Option<&'static str> {
    let ext = ext.to_ascii_lowercase();
    let ext = match ext.as_str() {
        "jpeg" => "jpg",
        other => other,
    };
    CONTENT_TYPE_EXTENSIONS
        .iter()
        .find(|(_, known)| *known == ext)
        .map(|(mime, _)| *mime)
}

pub(crate) fn url_extension(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.next_back()?;
    let (_, ext) = segment.rsplit_once('.')?;
    let valid = !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric());
    valid.then(|| ext.to_ascii_lowercase())
}

/// Removes the preparer's scratch directory.
///
/// Cloneable; the first `cleanup()` call removes the directory and later
/// calls do nothing. If never called, the directory goes away when the last
/// handle is dropped.
#[derive(Debug, Clone, Default)]
pub struct MediaCleanup {
    dir: Arc<Mutex<Option<TempDir>>>,
}

impl MediaCleanup {
    fn new(dir: TempDir) -> Self {
        Self {
            dir: Arc::new(Mutex::new(Some(dir))),
        }
    }

    /// Scratch directory, while it still exists.
    pub fn path(&self) -> Option<PathBuf> {
        self.dir
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|dir| dir.path().to_path_buf())
    }

    pub fn is_cleaned(&self) -> bool {
        self.path().is_none()
    }

    pub fn cleanup(&self) -> FramecastResult<()> {
        let dir = self.dir.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(dir) = dir {
            let path = dir.path().to_path_buf();
            dir.close()?;
            tracing::debug!(path = %path.display(), "Removed media directory");
        }
        Ok(())
    }
}

/// A document whose remote media point at local copies.
#[derive(Debug)]
pub struct PreparedDocument {
    document: Document,
    /// Original and rewritten source -> local file.
    local_files: HashMap<String, PathBuf>,
    downloads: usize,
    cleanup: MediaCleanup,
}

impl PreparedDocument {
    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Number of distinct URLs downloaded.
    pub fn download_count(&self) -> usize {
        self.downloads
    }

    /// Local file backing a media source, if there is one.
    ///
    /// Accepts downloaded sources in their original or rewritten form, plus
    /// sources that were already `file://` URLs or plain paths.
    pub fn local_path(&self, src: &str) -> Option<PathBuf> {
        if let Some(path) = self.local_files.get(src) {
            return Some(path.clone());
        }
        if src.starts_with("file:") {
            return url::Url::parse(src).ok()?.to_file_path().ok();
        }
        if src.starts_with("data:") || src.starts_with("blob:") || is_remote(src) {
            return None;
        }
        let path = PathBuf::from(src);
        path.is_file().then_some(path)
    }

    pub fn cleanup_handle(&self) -> MediaCleanup {
        self.cleanup.clone()
    }

    pub fn cleanup(&self) -> FramecastResult<()> {
        self.cleanup.cleanup()
    }
}

/// Downloads remote media and rewrites a document copy.
pub struct MediaPreparer {
    fetcher: Arc<dyn Fetcher>,
    encoder: Option<Arc<dyn Encoder>>,
    config: DownloadConfig,
}

struct Downloaded {
    path: PathBuf,
    content_type: Option<String>,
}

impl MediaPreparer {
    pub fn new(fetcher: Arc<dyn Fetcher>, config: DownloadConfig) -> Self {
        Self {
            fetcher,
            encoder: None,
            config,
        }
    }

    /// Encoder used to normalize videos when `normalize_video` is set.
    pub fn with_encoder(mut self, encoder: Arc<dyn Encoder>) -> Self {
        self.encoder = Some(encoder);
        self
    }

    pub async fn prepare(&self, source: &Document) -> FramecastResult<PreparedDocument> {
        let mut document = source.clone();

        let mut kinds: HashMap<String, MediaKind> = HashMap::new();
        let mut plan: Vec<String> = Vec::new();
        let mut seen = HashSet::new();
        for media in document.media_refs() {
            if !is_remote(&media.src) {
                continue;
            }
            if media.kind == MediaKind::Video {
                kinds.insert(media.src.clone(), MediaKind::Video);
            } else {
                kinds.entry(media.src.clone()).or_insert(media.kind);
            }
            if seen.insert(media.src.clone()) {
                plan.push(media.src);
            }
        }

        if plan.is_empty() {
            return Ok(PreparedDocument {
                document,
                local_files: HashMap::new(),
                downloads: 0,
                cleanup: MediaCleanup::default(),
            });
        }

        let dir = tempfile::Builder::new()
            .prefix("framecast-media-")
            .tempdir()?;
        let dir_path = dir.path().to_path_buf();
        let cleanup = MediaCleanup::new(dir);
        tracing::info!(sources = plan.len(), dir = %dir_path.display(), "Preparing media");

        let mut local_files = HashMap::new();
        let mut replacements = HashMap::new();
        for (n, url) in plan.iter().enumerate() {
            let stem = format!("media-{n}");
            // Any failure leaves `cleanup` to remove the directory on drop.
            let downloaded = self.download(url, &dir_path, &stem).await?;
            let mut path = downloaded.path;
            let mut content_type = downloaded.content_type;

            if self.config.normalize_video && kinds.get(url) == Some(&MediaKind::Video) {
                if let Some(encoder) = &self.encoder {
                    let webm = dir_path.join(format!("{stem}.webm"));
                    if webm != path {
                        tracing::debug!(url = %url, "Normalizing video to webm");
                        encoder.transcode_to_webm(&path, &webm).await?;
                        path = webm;
                        content_type = Some("video/webm".to_string());
                    }
                } else {
                    tracing::warn!(url = %url, "Video normalization requested without an encoder");
                }
            }

            let rewritten = self.rewritten_source(&path, content_type.as_deref()).await?;
            local_files.insert(url.clone(), path.clone());
            local_files.insert(rewritten.clone(), path);
            replacements.insert(url.clone(), rewritten);
        }

        let rewritten = document.rewrite_media_sources(|src| replacements.get(src).cloned());
        tracing::info!(
            downloads = plan.len(),
            rewritten,
            "Media prepared"
        );

        Ok(PreparedDocument {
            document,
            local_files,
            downloads: plan.len(),
            cleanup,
        })
    }

    async fn download(&self, url: &str, dir: &Path, stem: &str) -> FramecastResult<Downloaded> {
        let attempts = self.config.attempts.max(1);
        let base = Duration::from_millis(self.config.backoff_base_ms);
        let max = Duration::from_millis(self.config.backoff_max_ms);

        let mut last_error = String::new();
        for attempt in 0..attempts {
            match self.try_download(url, dir, stem).await {
                Ok(downloaded) => {
                    tracing::debug!(url = %url, path = %downloaded.path.display(), "Downloaded media");
                    return Ok(downloaded);
                }
                Err(err) => {
                    last_error = err.to_string();
                    if attempt + 1 < attempts {
                        let wait = backoff_delay(attempt, base, max);
                        tracing::warn!(
                            url = %url,
                            attempt = attempt + 1,
                            wait = ?wait,
                            error = %err,
                            "Retrying download"
                        );
                        if !wait.is_zero() {
                            tokio::time::sleep(wait).await;
                        }
                    }
                }
            }
        }
        Err(FramecastError::Download {
            url: url.to_string(),
            attempts,
            message: last_error,
        })
    }

    async fn try_download(&self, url: &str, dir: &Path, stem: &str) -> FramecastResult<Downloaded> {
        let response = self.fetcher.fetch(url).await?;
        let ext = extension_for(url, response.content_type.as_deref());
        let path = dir.join(format!("{stem}.{ext}"));

        let written = write_stream(&path, response.body).await;
        if let Err(err) = written {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %path.display(), "Failed to remove partial download: {}", e);
                }
            }
            return Err(err);
        }
        Ok(Downloaded {
            path,
            content_type: response.content_type,
        })
    }

    async fn rewritten_source(
        &self,
        path: &Path,
        content_type: Option<&str>,
    ) -> FramecastResult<String> {
        match self.config.rewrite {
            RewriteMode::FileUrl => Ok(file_url(path)),
            RewriteMode::DataUrl => {
                let bytes = tokio::fs::read(path).await?;
                let mime = content_type
                    .filter(|ct| !ct.is_empty())
                    .or_else(|| {
                        path.extension()
                            .and_then(|e| e.to_str())
                            .and_then(mime_for_extension)
                    })
                    .unwrap_or("application/octet-stream");
                Ok(data_url(mime, &bytes))
            }
        }
    }
}

async fn write_stream(path: &Path, mut body: crate::fetch::ByteStream) -> FramecastResult<()> {
    let mut file = tokio::fs::File::create(path).await?;
    while let Some(chunk) = body.next().await {
        file.write_all(&chunk?).await?;
    }
    file.flush().await?;
    Ok(())
}

/// `file://` URL for a local path.
pub fn file_url(path: &Path) -> String {
    url::Url::from_file_path(path)
        .map(|url| url.to_string())
        .unwrap_or_else(|_| format!("file://{}", path.display()))
}

/// Base64 data URL.
pub fn data_url(mime: &str, bytes: &[u8]) -> String {
    format!(
        "data:{mime};base64,{}",
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_detection() {
        assert!(is_remote("https://cdn.example.com/a.mp4"));
        assert!(is_remote("HTTP://cdn.example.com/a.mp4"));
        assert!(!is_remote("data:video/mp4;base64,AAAA"));
        assert!(!is_remote("file:///tmp/a.mp4"));
        assert!(!is_remote("blob:https://example.com/123"));
        assert!(!is_remote("/tmp/a.mp4"));
    }

    #[test]
    fn test_extension_from_url_path() {
        assert_eq!(extension_for("https://x.com/v/clip.MP4?sig=1", Some("video/webm")), "mp4");
        assert_eq!(extension_for("https://x.com/v/clip", Some("video/webm")), "webm");
        assert_eq!(extension_for("https://x.com/v/clip", Some("application/x-unknown")), "bin");
        assert_eq!(extension_for("https://x.com/v/", None), "bin");
        assert_eq!(extension_for("https://x.com/v/archive.tar-gz", Some("audio/mpeg")), "mp3");
    }

    #[test]
    fn test_mime_for_extension() {
        assert_eq!(mime_for_extension("JPEG"), Some("image/jpeg"));
        assert_eq!(mime_for_extension("webm"), Some("video/webm"));
        assert_eq!(mime_for_extension("xyz"), None);
    }

    #[test]
    fn test_cleanup_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_path_buf();
        std::fs::write(path.join("media-0.mp4"), b"x").unwrap();

        let cleanup = MediaCleanup::new(dir);
        let other = cleanup.clone();
        cleanup.cleanup().unwrap();
        assert!(!path.exists());
        assert!(cleanup.is_cleaned());
        other.cleanup().unwrap();
        cleanup.cleanup().unwrap();
    }

    #[test]
    fn test_data_url() {
        assert_eq!(data_url("audio/mpeg", b"hello"), "data:audio/mpeg;base64,aGVsbG8=");
    }

    #[cfg(unix)]
    #[test]
    fn test_file_url() {
        assert_eq!(file_url(Path::new("/tmp/a b.mp4")), "file:///tmp/a%20b.mp4");
    }
}
