//! Framecast Render Engine
//!
//! Turns documents into artifacts by driving renderer sessions:
//! still images, PDFs and GIFs through a single job each, and videos
//! through a parallel frame pipeline.
//!
//! # Video Pipeline
//!
//! ```text
//! document ──┐
//!            ├── Media preparation (download, rewrite sources)
//! fetcher ───┘         │
//!                      ├── Frame plan (timestamps, pages, chunks)
//!                      │         │
//!                      │         ├── chunk × N sessions ── frames/<i>.png
//!                      │         │
//!                      └─────────┴── Mux (frames + timed audio)
//!                                              │
//!                                              ▼
//!                                          output.mp4
//! ```

pub mod backup;
pub mod encoder;
pub mod export;
pub mod fetch;
pub mod media;
pub mod mux;
pub mod scheduler;
pub mod video;

pub use backup::{inline_remote_assets, BackupReport};
pub use encoder::{Encoder, EncoderOutput, FfmpegEncoder};
pub use export::*;
pub use fetch::{FetchResponse, Fetcher, HttpFetcher};
pub use media::{MediaCleanup, MediaPreparer, PreparedDocument};
pub use mux::{AudioInput, Container, FrameSequence, MuxPlan};
pub use scheduler::{Frame, FramePlan, PageCursor};
pub use video::{VideoExportOptions, VideoExportReport, VideoExporter};
