//! Render a document to video.

use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use framecast_common::config::AppConfig;
use framecast_render_engine::{
    ExportProgress, ExportStage, FfmpegEncoder, HttpFetcher, ProgressCallback, VideoExportOptions,
    VideoExporter,
};

use super::{load_document, session_factory};

pub struct VideoArgs {
    pub fps: Option<f64>,
    pub parallel: Option<usize>,
    pub pixel_ratio: Option<f64>,
    pub keep_frames: Option<PathBuf>,
    pub skip_font_error: bool,
    pub skip_image_error: bool,
}

pub async fn run(
    config: &AppConfig,
    path: PathBuf,
    output: PathBuf,
    args: VideoArgs,
) -> anyhow::Result<()> {
    let document = load_document(&path)?;

    let encoder = FfmpegEncoder::new(&config.encoder);
    if !encoder.is_available() {
        anyhow::bail!(
            "{} not found. Install ffmpeg or set encoder.ffmpeg in the config",
            config.encoder.ffmpeg
        );
    }

    let mut options = VideoExportOptions::from_defaults(&output, &config.video);
    if let Some(fps) = args.fps {
        options.fps = fps;
    }
    if let Some(parallel) = args.parallel {
        options.parallel = parallel;
    }
    if args.pixel_ratio.is_some() {
        options.render.pixel_ratio = args.pixel_ratio;
    }
    options.render.skip_font_error = args.skip_font_error;
    options.render.skip_image_error = args.skip_image_error;
    options.keep_frames_dir = args.keep_frames;

    let progress: ProgressCallback = Arc::new(|p: ExportProgress| {
        if p.stage == ExportStage::Rendering {
            print!(
                "\r  Rendering: {:.1}% ({}/{} frames, ETA: {:.0}s)  ",
                p.progress * 100.0,
                p.frames_rendered,
                p.total_frames,
                p.eta_secs,
            );
            std::io::stdout().flush().ok();
        } else if p.stage == ExportStage::Encoding {
            println!("\n  Encoding video");
        }
    });
    options.progress = Some(progress);

    let cancel = Arc::clone(&options.cancel);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nCancelling after the current frames...");
            cancel.store(true, Ordering::SeqCst);
        }
    });

    println!("Exporting video: {}", path.display());
    println!("  Output: {}", output.display());
    println!("  FPS: {}, parallel sessions: {}", options.fps, options.parallel);

    let exporter = VideoExporter::new(
        session_factory(config),
        Arc::new(HttpFetcher::new()?),
        Arc::new(encoder),
    )
    .with_download_config(config.download.clone());

    match exporter.export(&document, options).await {
        Ok(report) => {
            println!(
                "\nExport complete: {} ({} frames, {:.1}s)",
                report.output.display(),
                report.frames,
                report.elapsed_secs
            );
            Ok(())
        }
        Err(e) => {
            println!();
            Err(anyhow::anyhow!("Export failed: {e}"))
        }
    }
}
