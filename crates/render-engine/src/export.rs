//! Single-artifact exports and export progress reporting.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use base64::Engine as _;
use serde_json::Value;

use framecast_common::error::FramecastResult;
use framecast_document::Document;
use framecast_session::{DocumentFormat, FrameRequest, JobRunner, RenderOptions, SessionSetting};

use crate::media::data_url;

/// Pixel ratio for still images when the caller does not set one.
pub const DEFAULT_IMAGE_PIXEL_RATIO: f64 = 1.0;

/// Progress callback for long-running exports.
///
/// Called from render tasks; must be cheap. A panic inside the callback is
/// caught and logged.
pub type ProgressCallback = Arc<dyn Fn(ExportProgress) + Send + Sync>;

/// Export progress report.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportProgress {
    /// Current progress [0.0, 1.0].
    pub progress: f64,

    /// Frames rendered so far.
    pub frames_rendered: u64,

    /// Total frames to render.
    pub total_frames: u64,

    /// Estimated time remaining in seconds.
    pub eta_secs: f64,

    /// Render time of the frame that triggered this report.
    pub frame_render_ms: Option<f64>,

    /// Current stage.
    pub stage: ExportStage,
}

/// Stages of the export process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportStage {
    Preparing,
    Rendering,
    Encoding,
    Finalizing,
    Complete,
    Failed,
}

impl ExportProgress {
    pub fn stage(stage: ExportStage, total_frames: u64) -> Self {
        let done = matches!(stage, ExportStage::Complete);
        Self {
            progress: if done { 1.0 } else { 0.0 },
            frames_rendered: if done { total_frames } else { 0 },
            total_frames,
            eta_secs: 0.0,
            frame_render_ms: None,
            stage,
        }
    }
}

/// Deliver `progress` to `callback`, if any, without letting it unwind into
/// the export.
pub fn report_progress(callback: Option<&ProgressCallback>, progress: ExportProgress) {
    let Some(callback) = callback else {
        return;
    };
    let stage = progress.stage;
    if std::panic::catch_unwind(AssertUnwindSafe(|| callback(progress))).is_err() {
        tracing::warn!(?stage, "Progress callback panicked");
    }
}

/// Still image, PDF, GIF and custom-function exports.
///
/// Every call is one job on the runner: load the document, apply settings,
/// export.
#[derive(Clone)]
pub struct Exporter {
    runner: Arc<JobRunner>,
}

impl Exporter {
    pub fn new(runner: Arc<JobRunner>) -> Self {
        Self { runner }
    }

    pub fn runner(&self) -> &JobRunner {
        &self.runner
    }

    /// Render a still image and return the encoded bytes.
    pub async fn to_blob(&self, document: &Document, options: &RenderOptions) -> FramecastResult<Vec<u8>> {
        let pixel_ratio = options.pixel_ratio.unwrap_or(DEFAULT_IMAGE_PIXEL_RATIO);
        let request = FrameRequest::from_options(options, DEFAULT_IMAGE_PIXEL_RATIO);
        tracing::debug!(pixel_ratio, mime = %request.mime_type, "Exporting image");

        self.runner
            .run(options, |ctx| async move {
                ctx.session.load(document).await?;
                ctx.session
                    .configure(SessionSetting::ElementsPixelRatio(pixel_ratio))
                    .await?;
                ctx.session.render_frame(&request).await
            })
            .await
    }

    pub async fn to_data_url(&self, document: &Document, options: &RenderOptions) -> FramecastResult<String> {
        let bytes = self.to_blob(document, options).await?;
        Ok(data_url(options.mime_type(), &bytes))
    }

    pub async fn to_image_base64(&self, document: &Document, options: &RenderOptions) -> FramecastResult<String> {
        let bytes = self.to_blob(document, options).await?;
        Ok(encode(&bytes))
    }

    /// Export every page (or `options.page_ids`) as one PDF or GIF.
    pub async fn to_document_bytes(
        &self,
        document: &Document,
        format: DocumentFormat,
        options: &RenderOptions,
    ) -> FramecastResult<Vec<u8>> {
        tracing::debug!(?format, "Exporting document");
        self.runner
            .run(options, |ctx| async move {
                ctx.session.load(document).await?;
                ctx.session.export_document(format, &ctx.options).await
            })
            .await
    }

    pub async fn to_pdf_data_url(&self, document: &Document, options: &RenderOptions) -> FramecastResult<String> {
        let bytes = self.to_document_bytes(document, DocumentFormat::Pdf, options).await?;
        Ok(data_url(DocumentFormat::Pdf.mime_type(), &bytes))
    }

    pub async fn to_pdf_base64(&self, document: &Document, options: &RenderOptions) -> FramecastResult<String> {
        let bytes = self.to_document_bytes(document, DocumentFormat::Pdf, options).await?;
        Ok(encode(&bytes))
    }

    pub async fn to_gif_data_url(&self, document: &Document, options: &RenderOptions) -> FramecastResult<String> {
        let bytes = self.to_document_bytes(document, DocumentFormat::Gif, options).await?;
        Ok(data_url(DocumentFormat::Gif.mime_type(), &bytes))
    }

    pub async fn to_gif_base64(&self, document: &Document, options: &RenderOptions) -> FramecastResult<String> {
        let bytes = self.to_document_bytes(document, DocumentFormat::Gif, options).await?;
        Ok(encode(&bytes))
    }

    /// Evaluate a renderer-side function, optionally after loading a
    /// document, and return its JSON result.
    pub async fn run_custom(
        &self,
        document: Option<&Document>,
        function: &str,
        args: Vec<Value>,
        options: &RenderOptions,
    ) -> FramecastResult<Value> {
        self.runner
            .run(options, |ctx| async move {
                if let Some(document) = document {
                    ctx.session.load(document).await?;
                }
                ctx.session.evaluate(function, args).await
            })
            .await
    }
}

fn encode(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}
