//! Export pages as a PDF.

use std::path::PathBuf;

use framecast_common::config::AppConfig;
use framecast_session::{DocumentFormat, PdfUnit, RenderOptions};

use super::{connect_exporter, load_document, write_output};

pub async fn run(
    config: &AppConfig,
    path: PathBuf,
    output: PathBuf,
    dpi: Option<f64>,
    unit: Option<PdfUnit>,
    page_ids: Vec<String>,
) -> anyhow::Result<()> {
    let document = load_document(&path)?;
    let options = RenderOptions {
        dpi,
        unit,
        page_ids: (!page_ids.is_empty()).then_some(page_ids),
        ..RenderOptions::default()
    };

    let exporter = connect_exporter(config).await?;
    let result = exporter
        .to_document_bytes(&document, DocumentFormat::Pdf, &options)
        .await;
    exporter.runner().close().await?;

    let bytes = result?;
    write_output(&output, &bytes)?;
    println!("PDF written: {} ({} bytes)", output.display(), bytes.len());
    Ok(())
}
