//! Export an animated GIF.

use std::path::PathBuf;

use framecast_common::config::AppConfig;
use framecast_session::{DocumentFormat, RenderOptions};

use super::{connect_exporter, load_document, write_output};

pub async fn run(
    config: &AppConfig,
    path: PathBuf,
    output: PathBuf,
    pixel_ratio: Option<f64>,
) -> anyhow::Result<()> {
    let document = load_document(&path)?;
    let options = RenderOptions {
        pixel_ratio,
        ..RenderOptions::default()
    };

    let exporter = connect_exporter(config).await?;
    let result = exporter
        .to_document_bytes(&document, DocumentFormat::Gif, &options)
        .await;
    exporter.runner().close().await?;

    let bytes = result?;
    write_output(&output, &bytes)?;
    println!("GIF written: {} ({} bytes)", output.display(), bytes.len());
    Ok(())
}
