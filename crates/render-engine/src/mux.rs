//! Audio/video multiplexing.
//!
//! Builds the encoder invocation that turns the rendered image sequence and
//! the document's timed audio sources into one container file.

use std::path::{Path, PathBuf};

use framecast_common::error::{FramecastError, FramecastResult};
use framecast_document::{MediaOwner, MediaRef, Timeline};

use crate::encoder::Encoder;
use crate::media::PreparedDocument;

/// Sample rate of the mixed audio track.
pub const MIX_SAMPLE_RATE: u32 = 44_100;

/// One audio input of the mix, aligned on the output timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioInput {
    pub path: PathBuf,

    /// Seek into the source before reading.
    pub input_start_sec: f64,

    /// Amount of source to read; `None` reads to the end.
    pub input_duration_sec: Option<f64>,

    /// Where the input starts on the output timeline.
    pub output_offset_ms: f64,

    pub volume: f64,
}

/// Numbered frame images on disk: `<dir>/<index>.<ext>`, starting at 0.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSequence {
    pub dir: PathBuf,
    pub extension: String,
    pub fps: f64,
}

impl FrameSequence {
    pub fn frame_path(&self, index: usize) -> PathBuf {
        self.dir.join(format!("{index}.{}", self.extension))
    }

    fn pattern(&self) -> PathBuf {
        self.dir.join(format!("%d.{}", self.extension))
    }
}

/// Container family, picked from the output extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    Mp4,
    Mov,
    Mkv,
    Webm,
}

impl Container {
    pub fn from_path(path: &Path) -> FramecastResult<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "mp4" => Ok(Self::Mp4),
            "mov" => Ok(Self::Mov),
            "mkv" => Ok(Self::Mkv),
            "webm" => Ok(Self::Webm),
            other => Err(FramecastError::config(format!(
                "unsupported video container {other:?} for {}",
                path.display()
            ))),
        }
    }

    fn video_codec_args(self) -> Vec<&'static str> {
        let codec = match self {
            Self::Webm => "libvpx-vp9",
            _ => "libx264",
        };
        vec![
            "-c:v",
            codec,
            "-pix_fmt",
            "yuv420p",
            "-vf",
            "scale=trunc(iw/2)*2:trunc(ih/2)*2",
        ]
    }

    fn audio_codec_args(self) -> Vec<&'static str> {
        match self {
            Self::Webm => vec!["-c:a", "libopus", "-b:a", "128k"],
            _ => vec!["-c:a", "aac", "-b:a", "192k"],
        }
    }
}

/// Align a page-placed clip: trimmed by its fractions, cut at the page end,
/// and started at the page's start time.
pub fn align_clip(media: &MediaRef, page_start_ms: f64, page_duration_ms: f64) -> (f64, Option<f64>, f64) {
    let page_sec = page_duration_ms.max(0.0) / 1000.0;
    if media.natural_duration_ms <= 0.0 {
        return (0.0, Some(page_sec), page_start_ms);
    }
    let (start, trimmed) = trim_window(media);
    (start, Some(trimmed.min(page_sec)), page_start_ms)
}

/// Align a document-level track: trimmed by its own fractions only, started
/// at its delay.
pub fn align_track(media: &MediaRef) -> (f64, Option<f64>, f64) {
    let offset = media.delay_ms.max(0.0);
    if media.natural_duration_ms <= 0.0 {
        return (0.0, None, offset);
    }
    let (start, trimmed) = trim_window(media);
    (start, Some(trimmed), offset)
}

/// Seek and length in seconds selected by the trim fractions, each clamped
/// to `[0, 1]`.
fn trim_window(media: &MediaRef) -> (f64, f64) {
    let natural_sec = media.natural_duration_ms / 1000.0;
    let start_fraction = media.start_fraction.clamp(0.0, 1.0);
    let end_fraction = media.end_fraction.clamp(0.0, 1.0);
    let start = natural_sec * start_fraction;
    let trimmed = natural_sec * (end_fraction - start_fraction).max(0.0);
    (start, trimmed)
}

/// Everything needed to run the final encode.
#[derive(Debug, Clone)]
pub struct MuxPlan {
    pub frames: FrameSequence,
    pub duration_ms: f64,
    pub inputs: Vec<AudioInput>,
    pub output: PathBuf,
    container: Container,
}

impl MuxPlan {
    /// Collect and align the audio inputs of `prepared`.
    ///
    /// With an encoder, each input is probed and dropped if it has no audio
    /// stream. A failed probe keeps the input.
    pub async fn build(
        prepared: &PreparedDocument,
        timeline: &Timeline,
        frames: FrameSequence,
        output: &Path,
        container: Container,
        probe: Option<&dyn Encoder>,
    ) -> FramecastResult<Self> {
        let mut inputs = Vec::new();

        for media in prepared.document().media_refs() {
            let Some(path) = prepared.local_path(&media.src) else {
                tracing::warn!(id = %media.id, src = %media.src, "No local file for media, skipping its audio");
                continue;
            };
            let (input_start_sec, input_duration_sec, output_offset_ms) = match media.owner {
                MediaOwner::Page(index) => {
                    let Some(span) = timeline.span(index) else {
                        continue;
                    };
                    align_clip(&media, span.start_ms, span.duration_ms)
                }
                MediaOwner::Document => align_track(&media),
            };
            if input_duration_sec == Some(0.0) {
                tracing::debug!(id = %media.id, "Empty clip, skipping its audio");
                continue;
            }

            if let Some(encoder) = probe {
                match encoder.probe_has_audio(&path).await {
                    Ok(true) => {}
                    Ok(false) => {
                        tracing::debug!(id = %media.id, path = %path.display(), "No audio stream");
                        continue;
                    }
                    Err(e) => {
                        tracing::warn!(id = %media.id, "Audio probe failed, keeping input: {}", e);
                    }
                }
            }

            inputs.push(AudioInput {
                path,
                input_start_sec,
                input_duration_sec,
                output_offset_ms,
                volume: media.volume,
            });
        }

        Ok(Self {
            frames,
            duration_ms: timeline.total_duration_ms(),
            inputs,
            output: output.to_path_buf(),
            container,
        })
    }

    pub fn container(&self) -> Container {
        self.container
    }

    /// Audio mixing graph, `None` when there is nothing to mix.
    pub fn filter_graph(&self) -> Option<String> {
        if self.inputs.is_empty() {
            return None;
        }
        let total = secs(self.duration_ms / 1000.0);
        let mut graph = String::new();
        let mut labels = String::new();
        for (n, input) in self.inputs.iter().enumerate() {
            // Input 0 is the frame sequence.
            let stream = n + 1;
            let delay = input.output_offset_ms.max(0.0).round() as u64;
            graph.push_str(&format!(
                "[{stream}:a]adelay={delay}|{delay},volume={},apad=whole_dur={total}[a{n}];",
                input.volume
            ));
            labels.push_str(&format!("[a{n}]"));
        }
        graph.push_str(&format!(
            "{labels}amix=inputs={}:duration=longest:normalize=0,aresample={MIX_SAMPLE_RATE},aformat=channel_layouts=stereo[aout]",
            self.inputs.len()
        ));
        Some(graph)
    }

    /// Full encoder argument list.
    pub fn args(&self) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "-y".into(),
            "-framerate".into(),
            self.frames.fps.to_string(),
            "-start_number".into(),
            "0".into(),
            "-i".into(),
            self.frames.pattern().display().to_string(),
        ];

        for input in &self.inputs {
            args.push("-ss".into());
            args.push(secs(input.input_start_sec));
            if let Some(duration) = input.input_duration_sec {
                args.push("-t".into());
                args.push(secs(duration));
            }
            args.push("-i".into());
            args.push(input.path.display().to_string());
        }

        match self.filter_graph() {
            Some(graph) => {
                args.push("-filter_complex".to_string());
                args.push(graph);
                args.extend(["-map", "0:v", "-map", "[aout]"].map(String::from));
            }
            None => {
                args.extend(["-map", "0:v", "-an"].map(String::from));
            }
        }

        args.extend(self.container.video_codec_args().into_iter().map(String::from));
        if !self.inputs.is_empty() {
            args.extend(self.container.audio_codec_args().into_iter().map(String::from));
        }
        if self.container == Container::Mp4 {
            args.extend(["-movflags", "+faststart"].map(String::from));
        }
        args.push("-t".into());
        args.push(secs(self.duration_ms / 1000.0));
        args.push(self.output.display().to_string());
        args
    }

    /// Run the encode.
    pub async fn run(&self, encoder: &dyn Encoder) -> FramecastResult<()> {
        tracing::info!(
            output = %self.output.display(),
            audio_inputs = self.inputs.len(),
            "Encoding video"
        );
        if let Some(parent) = self.output.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        encoder.encode(&self.args()).await?;
        Ok(())
    }
}

fn secs(value: f64) -> String {
    let text = format!("{value:.3}");
    let text = text.trim_end_matches('0').trim_end_matches('.');
    if text.is_empty() || text == "-" || text == "-0" {
        "0".to_string()
    } else {
        text.to_string()
    }
}
