pub mod backup;
pub mod check;
pub mod gif;
pub mod image;
pub mod info;
pub mod pdf;
pub mod video;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;

use framecast_common::config::AppConfig;
use framecast_document::Document;
use framecast_render_engine::Exporter;
use framecast_session::{JobRunner, RemoteSessionFactory, RunnerConfig, SessionMode};

pub(crate) fn load_document(path: &Path) -> anyhow::Result<Document> {
    Document::load(path).with_context(|| format!("Failed to load document {}", path.display()))
}

pub(crate) fn session_factory(config: &AppConfig) -> Arc<RemoteSessionFactory> {
    Arc::new(RemoteSessionFactory::new(config.renderer.clone()))
}

/// Exporter over the configured renderer.
pub(crate) async fn connect_exporter(config: &AppConfig) -> anyhow::Result<Exporter> {
    let mode = if config.renderer.parallel_sessions {
        SessionMode::Parallel
    } else {
        SessionMode::Shared
    };
    let runner = JobRunner::connect(session_factory(config), RunnerConfig::new(mode))
        .await
        .context("Failed to start renderer")?;
    Ok(Exporter::new(Arc::new(runner)))
}

pub(crate) fn write_output(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, bytes).with_context(|| format!("Failed to write {}", path.display()))
}
