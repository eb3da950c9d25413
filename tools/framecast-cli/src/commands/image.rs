//! Render a still image.

use std::path::PathBuf;

use framecast_common::config::AppConfig;
use framecast_session::RenderOptions;

use super::{connect_exporter, load_document, write_output};

pub struct ImageArgs {
    pub pixel_ratio: Option<f64>,
    pub mime: Option<String>,
    pub quality: Option<f64>,
    pub page_id: Option<String>,
    pub skip_font_error: bool,
    pub skip_image_error: bool,
}

pub async fn run(
    config: &AppConfig,
    path: PathBuf,
    output: PathBuf,
    args: ImageArgs,
) -> anyhow::Result<()> {
    let document = load_document(&path)?;
    let options = RenderOptions {
        pixel_ratio: args.pixel_ratio,
        mime_type: args.mime,
        quality: args.quality,
        page_id: args.page_id,
        skip_font_error: args.skip_font_error,
        skip_image_error: args.skip_image_error,
        ..RenderOptions::default()
    };

    let exporter = connect_exporter(config).await?;
    let result = exporter.to_blob(&document, &options).await;
    exporter.runner().close().await?;

    let bytes = result?;
    write_output(&output, &bytes)?;
    println!("Image written: {} ({} bytes)", output.display(), bytes.len());
    Ok(())
}
