//! Framecast CLI: export design documents from the command line.
//!
//! Usage:
//!   framecast image <DOC> -o out.png   Render a still image
//!   framecast pdf <DOC> -o out.pdf     Export all pages as a PDF
//!   framecast gif <DOC> -o out.gif     Export an animated GIF
//!   framecast video <DOC> -o out.mp4   Render a video with audio
//!   framecast backup <DOC> -o out.json Inline remote assets for offline use
//!   framecast info <DOC>               Show pages, media and the frame plan
//!   framecast check                    Check external tools

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use framecast_common::config::AppConfig;
use framecast_session::PdfUnit;

mod commands;

#[derive(Parser)]
#[command(
    name = "framecast",
    about = "Export design documents to images, PDFs, GIFs and videos",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to $XDG_CONFIG_HOME/framecast/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a still image
    Image {
        /// Path to the document JSON
        document: PathBuf,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Pixel ratio (default 1)
        #[arg(long)]
        pixel_ratio: Option<f64>,

        /// Image mime type, e.g. image/png or image/jpeg
        #[arg(long)]
        mime: Option<String>,

        /// Encoder quality for lossy formats [0.0, 1.0]
        #[arg(long)]
        quality: Option<f64>,

        /// Render this page instead of the first one
        #[arg(long)]
        page_id: Option<String>,

        /// Ignore fonts that fail to load
        #[arg(long)]
        skip_font_error: bool,

        /// Ignore images that fail to load
        #[arg(long)]
        skip_image_error: bool,
    },

    /// Export pages as a PDF
    Pdf {
        /// Path to the document JSON
        document: PathBuf,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Raster resolution for the PDF
        #[arg(long)]
        dpi: Option<f64>,

        /// Page size unit: pt, mm, cm or in
        #[arg(long)]
        unit: Option<PdfUnit>,

        /// Export only these pages
        #[arg(long = "page-id")]
        page_ids: Vec<String>,
    },

    /// Export an animated GIF
    Gif {
        /// Path to the document JSON
        document: PathBuf,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Pixel ratio
        #[arg(long)]
        pixel_ratio: Option<f64>,
    },

    /// Render a video
    Video {
        /// Path to the document JSON
        document: PathBuf,

        /// Output file path (.mp4, .mov, .mkv or .webm)
        #[arg(short, long)]
        output: PathBuf,

        /// Frames per second
        #[arg(long)]
        fps: Option<f64>,

        /// Number of renderer sessions working in parallel
        #[arg(long)]
        parallel: Option<usize>,

        /// Frame pixel ratio
        #[arg(long)]
        pixel_ratio: Option<f64>,

        /// Keep rendered frames in this directory
        #[arg(long)]
        keep_frames: Option<PathBuf>,

        /// Ignore fonts that fail to load
        #[arg(long)]
        skip_font_error: bool,

        /// Ignore images that fail to load
        #[arg(long)]
        skip_image_error: bool,
    },

    /// Replace remote asset URLs with data URLs
    Backup {
        /// Path to the document JSON
        document: PathBuf,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Show document information
    Info {
        /// Path to the document JSON
        document: PathBuf,

        /// Frames per second for the frame plan
        #[arg(long)]
        fps: Option<f64>,

        /// Parallel sessions for the frame plan
        #[arg(long)]
        parallel: Option<usize>,
    },

    /// Check external tools
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load(),
    };
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    framecast_common::logging::init_logging(&config.logging);

    match cli.command {
        Commands::Image {
            document,
            output,
            pixel_ratio,
            mime,
            quality,
            page_id,
            skip_font_error,
            skip_image_error,
        } => {
            commands::image::run(
                &config,
                document,
                output,
                commands::image::ImageArgs {
                    pixel_ratio,
                    mime,
                    quality,
                    page_id,
                    skip_font_error,
                    skip_image_error,
                },
            )
            .await
        }
        Commands::Pdf {
            document,
            output,
            dpi,
            unit,
            page_ids,
        } => commands::pdf::run(&config, document, output, dpi, unit, page_ids).await,
        Commands::Gif {
            document,
            output,
            pixel_ratio,
        } => commands::gif::run(&config, document, output, pixel_ratio).await,
        Commands::Video {
            document,
            output,
            fps,
            parallel,
            pixel_ratio,
            keep_frames,
            skip_font_error,
            skip_image_error,
        } => {
            commands::video::run(
                &config,
                document,
                output,
                commands::video::VideoArgs {
                    fps,
                    parallel,
                    pixel_ratio,
                    keep_frames,
                    skip_font_error,
                    skip_image_error,
                },
            )
            .await
        }
        Commands::Backup { document, output } => commands::backup::run(document, output).await,
        Commands::Info {
            document,
            fps,
            parallel,
        } => commands::info::run(&config, document, fps, parallel),
        Commands::Check => commands::check::run(&config),
    }
}
