//! The renderer session capability surface.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use framecast_common::error::FramecastResult;
use framecast_document::Document;

use crate::capture::AssetError;
use crate::options::RenderOptions;

/// Identifier of a session, unique within a process.
pub type SessionId = u64;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate a fresh session id.
pub fn next_session_id() -> SessionId {
    NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed)
}

/// Receiving half of a session's asset-error channel.
pub type AssetErrorReceiver = mpsc::UnboundedReceiver<AssetError>;

/// Sending half of a session's asset-error channel.
pub type AssetErrorSender = mpsc::UnboundedSender<AssetError>;

/// Multi-page document formats a session can export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Pdf,
    Gif,
}

impl DocumentFormat {
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Gif => "image/gif",
        }
    }
}

/// A single configuration call issued into a session before a job runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", content = "value", rename_all = "camelCase")]
pub enum SessionSetting {
    AssetLoadTimeout(u64),
    FontLoadTimeout(u64),
    HtmlTextRenderEnabled(bool),
    TextVerticalResizeEnabled(bool),
    TextSplitAllowed(bool),
    /// Text overflow policy, e.g. `"change-font-size"` or `"resize"`.
    TextOverflow(String),
    /// Pixel ratio applied to the loaded elements.
    ElementsPixelRatio(f64),
}

/// Parameters for rendering one raster frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameRequest {
    /// Timeline position in milliseconds. `None` renders the current state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_ms: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_id: Option<String>,

    pub pixel_ratio: f64,

    pub mime_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<f64>,

    #[serde(default)]
    pub ignore_background: bool,

    #[serde(default)]
    pub include_bleed: bool,
}

impl FrameRequest {
    /// Build a request from caller options, using `default_pixel_ratio` when
    /// the options do not set one.
    pub fn from_options(options: &RenderOptions, default_pixel_ratio: f64) -> Self {
        Self {
            time_ms: None,
            page_id: options.page_id.clone(),
            pixel_ratio: options.pixel_ratio.unwrap_or(default_pixel_ratio),
            mime_type: options.mime_type().to_string(),
            quality: options.quality,
            ignore_background: options.ignore_background.unwrap_or(false),
            include_bleed: options.include_bleed.unwrap_or(false),
        }
    }

    pub fn at(mut self, time_ms: f64, page_id: Option<String>) -> Self {
        self.time_ms = Some(time_ms);
        self.page_id = page_id;
        self
    }
}

/// One addressable renderer context.
///
/// All methods take `&self`; implementations serialize access internally.
/// The [`JobRunner`](crate::runner::JobRunner) guarantees that at most one
/// job drives a session at a time.
#[async_trait::async_trait]
pub trait Session: Send + Sync {
    fn id(&self) -> SessionId;

    /// Load a document and wait until its assets settle.
    async fn load(&self, document: &Document) -> FramecastResult<()>;

    async fn configure(&self, setting: SessionSetting) -> FramecastResult<()>;

    /// Move the timeline to `time_ms` and wait for the renderer to settle.
    async fn seek(&self, time_ms: f64) -> FramecastResult<()>;

    /// Render one raster frame and return the encoded image bytes.
    async fn render_frame(&self, request: &FrameRequest) -> FramecastResult<Vec<u8>>;

    /// Export the loaded document as a multi-page artifact.
    async fn export_document(
        &self,
        format: DocumentFormat,
        options: &RenderOptions,
    ) -> FramecastResult<Vec<u8>>;

    /// Evaluate a named renderer-side function with JSON arguments.
    async fn evaluate(&self, function: &str, args: Vec<Value>) -> FramecastResult<Value>;

    /// Subscribe to asynchronous asset errors. Installing a new sink
    /// replaces the previous one.
    async fn install_error_sink(&self) -> FramecastResult<AssetErrorReceiver>;

    async fn close(&self) -> FramecastResult<()>;
}

/// Creates brand-new sessions.
#[async_trait::async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(&self) -> FramecastResult<Arc<dyn Session>>;
}
