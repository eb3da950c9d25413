//! Parallel video export.
//!
//! # Pipeline
//!
//! ```text
//! document ── MediaPreparer ── local media ──────────────────────┐
//!                 │                                              │
//!             FramePlan ── chunk 0 ── session 0 ── frames/0..k   │
//!                      ├── chunk 1 ── session 1 ── frames/k..    ├── MuxPlan ── out.mp4
//!                      └── chunk N ── session N ── frames/..n ───┘
//! ```
//!
//! Each chunk renders on its own renderer session. The first failing chunk
//! raises a stop flag; siblings notice it at their next frame boundary.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tempfile::TempDir;
use tokio::task::JoinSet;

use framecast_common::clock::{ExportClock, FrameTimer};
use framecast_common::config::{DownloadConfig, VideoDefaults};
use framecast_common::error::{FramecastError, FramecastResult};
use framecast_document::{Document, Timeline};
use framecast_session::{
    FrameRequest, JobRunner, RenderOptions, RunnerConfig, SessionFactory, SessionMode, SessionSetting,
};

use crate::encoder::Encoder;
use crate::export::{report_progress, ExportProgress, ExportStage, ProgressCallback};
use crate::fetch::Fetcher;
use crate::media::{extension_for_mime, MediaPreparer, PreparedDocument};
use crate::mux::{Container, FrameSequence, MuxPlan};
use crate::scheduler::{Frame, FramePlan, PageCursor};

pub const DEFAULT_FPS: f64 = 15.0;
pub const DEFAULT_PARALLEL: usize = 5;
pub const DEFAULT_FRAME_PIXEL_RATIO: f64 = 0.5;

/// Text overflow mode applied whenever a new page becomes active.
pub const ACTIVE_PAGE_TEXT_OVERFLOW: &str = "resize";

/// Parameters of one video export.
#[derive(Clone)]
pub struct VideoExportOptions {
    /// Output file; its extension selects the container.
    pub out: PathBuf,

    pub fps: f64,

    /// Number of renderer sessions working at once.
    pub parallel: usize,

    /// Frame render options. The pixel ratio defaults to
    /// [`DEFAULT_FRAME_PIXEL_RATIO`].
    pub render: RenderOptions,

    /// Write frames here and keep them, instead of a temporary directory.
    pub keep_frames_dir: Option<PathBuf>,

    /// Probe audio inputs and drop those without an audio stream.
    pub probe_audio: bool,

    pub progress: Option<ProgressCallback>,

    /// Set to abort the export at the next frame boundary.
    pub cancel: Arc<AtomicBool>,
}

impl VideoExportOptions {
    pub fn new(out: impl Into<PathBuf>) -> Self {
        Self {
            out: out.into(),
            fps: DEFAULT_FPS,
            parallel: DEFAULT_PARALLEL,
            render: RenderOptions::default(),
            keep_frames_dir: None,
            probe_audio: true,
            progress: None,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Options seeded from the configured video defaults.
    pub fn from_defaults(out: impl Into<PathBuf>, defaults: &VideoDefaults) -> Self {
        let mut options = Self::new(out);
        options.fps = defaults.fps;
        options.parallel = defaults.parallel;
        options.render.pixel_ratio = Some(defaults.pixel_ratio);
        options.render.mime_type = Some(defaults.frame_mime.clone());
        options
    }
}

/// Summary of a finished export.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoExportReport {
    pub output: PathBuf,
    pub frames: usize,
    pub chunks: usize,
    pub duration_ms: f64,
    pub downloads: usize,
    pub audio_inputs: usize,
    /// Wall-clock start (RFC 3339).
    pub started_at: String,
    pub elapsed_secs: f64,
}

/// Renders documents to video files.
pub struct VideoExporter {
    factory: Arc<dyn SessionFactory>,
    fetcher: Arc<dyn Fetcher>,
    encoder: Arc<dyn Encoder>,
    download: DownloadConfig,
    profile: bool,
}

/// How a chunk finished without error.
enum ChunkOutcome {
    Completed(usize),
    /// A sibling failed first.
    Stopped,
}

/// State shared by every chunk of one export.
#[derive(Clone)]
struct ChunkShared {
    runner: Arc<JobRunner>,
    document: Arc<Document>,
    sequence: FrameSequence,
    request: FrameRequest,
    options: RenderOptions,
    stop: Arc<AtomicBool>,
    cancel: Arc<AtomicBool>,
    rendered: Arc<AtomicU64>,
    total: u64,
    progress: Option<ProgressCallback>,
    clock: ExportClock,
}

impl VideoExporter {
    pub fn new(
        factory: Arc<dyn SessionFactory>,
        fetcher: Arc<dyn Fetcher>,
        encoder: Arc<dyn Encoder>,
    ) -> Self {
        Self {
            factory,
            fetcher,
            encoder,
            download: DownloadConfig::default(),
            profile: false,
        }
    }

    pub fn with_download_config(mut self, download: DownloadConfig) -> Self {
        self.download = download;
        self
    }

    /// Log per-chunk job timing.
    pub fn with_profiling(mut self, profile: bool) -> Self {
        self.profile = profile;
        self
    }

    pub async fn export(
        &self,
        document: &Document,
        options: VideoExportOptions,
    ) -> FramecastResult<VideoExportReport> {
        let clock = ExportClock::start();
        let timeline = Timeline::from_document(document);
        // Both reject before anything is downloaded or rendered.
        let plan = FramePlan::new(&timeline, options.fps, options.parallel)?;
        let container = Container::from_path(&options.out)?;

        tracing::info!(
            output = %options.out.display(),
            frames = plan.frame_count(),
            chunks = plan.chunk_count(),
            fps = options.fps,
            duration_ms = plan.duration_ms(),
            "Starting video export"
        );
        let total = plan.frame_count() as u64;
        report_progress(
            options.progress.as_ref(),
            ExportProgress::stage(ExportStage::Preparing, total),
        );

        let preparer = MediaPreparer::new(Arc::clone(&self.fetcher), self.download.clone())
            .with_encoder(Arc::clone(&self.encoder));
        let prepared = match preparer.prepare(document).await {
            Ok(prepared) => prepared,
            Err(e) => {
                report_progress(
                    options.progress.as_ref(),
                    ExportProgress::stage(ExportStage::Failed, total),
                );
                return Err(e);
            }
        };

        let outcome = self
            .render_and_mux(&prepared, &timeline, &plan, container, &options, &clock)
            .await;
        if let Err(e) = prepared.cleanup() {
            tracing::warn!("Failed to remove downloaded media: {}", e);
        }

        match outcome {
            Ok(audio_inputs) => {
                report_progress(
                    options.progress.as_ref(),
                    ExportProgress::stage(ExportStage::Complete, total),
                );
                let report = VideoExportReport {
                    output: options.out.clone(),
                    frames: plan.frame_count(),
                    chunks: plan.chunk_count(),
                    duration_ms: plan.duration_ms(),
                    downloads: prepared.download_count(),
                    audio_inputs,
                    started_at: clock.epoch_wall().to_string(),
                    elapsed_secs: clock.elapsed_secs(),
                };
                tracing::info!(
                    output = %report.output.display(),
                    elapsed_secs = report.elapsed_secs,
                    "Video export finished"
                );
                Ok(report)
            }
            Err(e) => {
                tracing::error!("Video export failed: {}", e);
                report_progress(
                    options.progress.as_ref(),
                    ExportProgress::stage(ExportStage::Failed, total),
                );
                Err(e)
            }
        }
    }

    /// Render every frame, then encode. Returns the number of audio inputs.
    async fn render_and_mux(
        &self,
        prepared: &PreparedDocument,
        timeline: &Timeline,
        plan: &FramePlan,
        container: Container,
        options: &VideoExportOptions,
        clock: &ExportClock,
    ) -> FramecastResult<usize> {
        let (frames_dir, scratch) = frames_dir(options.keep_frames_dir.as_deref())?;
        let request = FrameRequest::from_options(&options.render, DEFAULT_FRAME_PIXEL_RATIO);
        let sequence = FrameSequence {
            dir: frames_dir,
            extension: extension_for_mime(&request.mime_type)
                .unwrap_or("png")
                .to_string(),
            fps: plan.fps(),
        };

        self.render_frames(prepared, plan, &sequence, request, options, clock)
            .await?;

        report_progress(
            options.progress.as_ref(),
            ExportProgress {
                progress: 1.0,
                frames_rendered: plan.frame_count() as u64,
                total_frames: plan.frame_count() as u64,
                eta_secs: 0.0,
                frame_render_ms: None,
                stage: ExportStage::Encoding,
            },
        );
        let probe = options.probe_audio.then_some(self.encoder.as_ref());
        let mux = MuxPlan::build(prepared, timeline, sequence, &options.out, container, probe).await?;
        mux.run(self.encoder.as_ref()).await?;

        report_progress(
            options.progress.as_ref(),
            ExportProgress::stage(ExportStage::Finalizing, plan.frame_count() as u64),
        );
        if let Some(scratch) = scratch {
            scratch.close()?;
        }
        Ok(mux.inputs.len())
    }

    async fn render_frames(
        &self,
        prepared: &PreparedDocument,
        plan: &FramePlan,
        sequence: &FrameSequence,
        request: FrameRequest,
        options: &VideoExportOptions,
        clock: &ExportClock,
    ) -> FramecastResult<()> {
        let runner = JobRunner::connect(
            Arc::clone(&self.factory),
            RunnerConfig {
                mode: SessionMode::Parallel,
                profile: self.profile,
            },
        )
        .await?;

        let shared = ChunkShared {
            runner: Arc::new(runner),
            document: Arc::new(prepared.document().clone()),
            sequence: sequence.clone(),
            request,
            options: options.render.clone(),
            stop: Arc::new(AtomicBool::new(false)),
            cancel: Arc::clone(&options.cancel),
            rendered: Arc::new(AtomicU64::new(0)),
            total: plan.frame_count() as u64,
            progress: options.progress.clone(),
            clock: clock.clone(),
        };

        let mut tasks = JoinSet::new();
        for (index, chunk) in plan.chunks().enumerate() {
            let shared = shared.clone();
            let frames = chunk.to_vec();
            tasks.spawn(async move {
                let result = render_chunk(&shared, index, frames).await;
                if result.is_err() {
                    shared.stop.store(true, Ordering::SeqCst);
                }
                (index, result)
            });
        }

        let mut first_error: Option<FramecastError> = None;
        while let Some(joined) = tasks.join_next().await {
            let (index, result) = match joined {
                Ok(done) => done,
                Err(e) => {
                    shared.stop.store(true, Ordering::SeqCst);
                    (usize::MAX, Err(FramecastError::render(format!("render task failed: {e}"))))
                }
            };
            match result {
                Ok(ChunkOutcome::Completed(frames)) => {
                    tracing::debug!(chunk = index, frames, "Chunk rendered");
                }
                Ok(ChunkOutcome::Stopped) => {
                    tracing::debug!(chunk = index, "Chunk stopped early");
                }
                Err(e) => {
                    if first_error.is_none() {
                        tracing::warn!(chunk = index, "Chunk failed: {}", e);
                        first_error = Some(e);
                    } else {
                        tracing::debug!(chunk = index, "Chunk also failed: {}", e);
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

async fn render_chunk(
    shared: &ChunkShared,
    index: usize,
    frames: Vec<Frame>,
) -> FramecastResult<ChunkOutcome> {
    if frames.is_empty() {
        return Ok(ChunkOutcome::Completed(0));
    }
    tracing::debug!(
        chunk = index,
        first = frames[0].index,
        count = frames.len(),
        "Rendering chunk"
    );

    shared
        .runner
        .run(&shared.options, |ctx| async move {
            ctx.session.load(&shared.document).await?;
            ctx.errors.check()?;

            let mut cursor = PageCursor::new();
            for frame in &frames {
                if shared.cancel.load(Ordering::SeqCst) {
                    return Err(FramecastError::Cancelled);
                }
                if shared.stop.load(Ordering::SeqCst) {
                    return Ok(ChunkOutcome::Stopped);
                }

                let (next, activate) = cursor.step(frame.page_index);
                cursor = next;
                if activate {
                    ctx.session.seek(frame.time_ms).await?;
                    ctx.session
                        .configure(SessionSetting::TextOverflow(
                            ACTIVE_PAGE_TEXT_OVERFLOW.to_string(),
                        ))
                        .await?;
                }

                let timer = FrameTimer::start();
                let request = shared
                    .request
                    .clone()
                    .at(frame.time_ms, frame.page_id.clone());
                let bytes = ctx.session.render_frame(&request).await?;
                let frame_render_ms = timer.elapsed_ms();
                tokio::fs::write(shared.sequence.frame_path(frame.index), bytes).await?;

                let done = shared.rendered.fetch_add(1, Ordering::SeqCst) + 1;
                let progress = done as f64 / shared.total as f64;
                report_progress(
                    shared.progress.as_ref(),
                    ExportProgress {
                        progress,
                        frames_rendered: done,
                        total_frames: shared.total,
                        eta_secs: shared.clock.eta_secs(progress),
                        frame_render_ms: Some(frame_render_ms),
                        stage: ExportStage::Rendering,
                    },
                );

                ctx.errors.check()?;
            }
            Ok(ChunkOutcome::Completed(frames.len()))
        })
        .await
}

/// Directory for frame images, plus the scratch handle when it is temporary.
fn frames_dir(keep: Option<&Path>) -> FramecastResult<(PathBuf, Option<TempDir>)> {
    match keep {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            Ok((dir.to_path_buf(), None))
        }
        None => {
            let scratch = tempfile::Builder::new()
                .prefix("framecast-frames-")
                .tempdir()?;
            Ok((scratch.path().to_path_buf(), Some(scratch)))
        }
    }
}
