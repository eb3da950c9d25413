//! Inline remote assets so a document renders offline.

use std::path::PathBuf;

use anyhow::Context;

use framecast_render_engine::{inline_remote_assets, HttpFetcher};

use super::write_output;

pub async fn run(path: PathBuf, output: PathBuf) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let mut document: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    let fetcher = HttpFetcher::new()?;
    let report = inline_remote_assets(&mut document, &fetcher).await;

    write_output(&output, serde_json::to_string_pretty(&document)?.as_bytes())?;
    println!("Backup written: {}", output.display());
    println!("  Inlined assets: {}", report.inlined);
    if !report.failed.is_empty() {
        println!("  Kept as URLs ({}):", report.failed.len());
        for url in &report.failed {
            println!("    {url}");
        }
    }
    Ok(())
}
