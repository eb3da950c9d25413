//! Show document information.

use std::path::PathBuf;

use framecast_common::config::AppConfig;
use framecast_document::{MediaKind, MediaOwner, Timeline};
use framecast_render_engine::FramePlan;

use super::load_document;

pub fn run(
    config: &AppConfig,
    path: PathBuf,
    fps: Option<f64>,
    parallel: Option<usize>,
) -> anyhow::Result<()> {
    let document = load_document(&path)?;
    let timeline = Timeline::from_document(&document);

    println!("Document: {}", path.display());
    if let (Some(w), Some(h)) = (document.width, document.height) {
        println!("  Size: {w}x{h}");
    }
    println!(
        "  Duration: {:.3}s",
        timeline.total_duration_ms() / 1000.0
    );
    println!();

    println!("Pages:");
    for span in timeline.spans() {
        println!(
            "  {} ({}) {:.0}ms - {:.0}ms",
            span.index,
            span.id,
            span.start_ms,
            span.end_ms()
        );
    }
    println!();

    let media = document.media_refs();
    println!("Media ({}):", media.len());
    for m in &media {
        let kind = match m.kind {
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
        };
        let owner = match m.owner {
            MediaOwner::Page(index) => format!("page {index}"),
            MediaOwner::Document => "document".to_string(),
        };
        println!(
            "  {kind} {} on {owner}: {} (trim {:.2}-{:.2}, volume {})",
            m.id, m.src, m.start_fraction, m.end_fraction, m.volume
        );
    }
    println!();

    let fps = fps.unwrap_or(config.video.fps);
    let parallel = parallel.unwrap_or(config.video.parallel);
    println!("Frame plan @ {fps}fps, {parallel} sessions:");
    match FramePlan::new(&timeline, fps, parallel) {
        Ok(plan) => {
            println!("  Frames: {}", plan.frame_count());
            println!(
                "  Chunks: {} of up to {} frames",
                plan.chunk_count(),
                plan.chunk_size()
            );
        }
        Err(e) => println!("  Not exportable: {e}"),
    }

    Ok(())
}
