//! External encoder invocation.

use std::path::Path;
use std::process::{Command, Stdio};

use framecast_common::config::EncoderConfig;
use framecast_common::error::{FramecastError, FramecastResult};

/// Captured output of a successful encoder run.
#[derive(Debug, Clone, Default)]
pub struct EncoderOutput {
    pub stdout: String,
    pub stderr: String,
}

/// A black-box encoder driven by command-line arguments.
#[async_trait::async_trait]
pub trait Encoder: Send + Sync {
    /// Whether `path` contains at least one audio stream.
    async fn probe_has_audio(&self, path: &Path) -> FramecastResult<bool>;

    /// Run the encoder with `args`. Non-zero exit is an
    /// [`FramecastError::Encoder`] carrying stdout and stderr.
    async fn encode(&self, args: &[String]) -> FramecastResult<EncoderOutput>;

    /// Re-encode a video to webm (VP8, crf 30, 1000k).
    async fn transcode_to_webm(&self, input: &Path, output: &Path) -> FramecastResult<()> {
        self.encode(&webm_transcode_args(input, output)).await?;
        Ok(())
    }
}

/// Arguments for the intermediate webm transcode.
pub fn webm_transcode_args(input: &Path, output: &Path) -> Vec<String> {
    vec![
        "-y".to_string(),
        "-i".to_string(),
        input.display().to_string(),
        "-c:v".to_string(),
        "libvpx".to_string(),
        "-crf".to_string(),
        "30".to_string(),
        "-b:v".to_string(),
        "1000k".to_string(),
        output.display().to_string(),
    ]
}

/// [`Encoder`] running `ffmpeg` and `ffprobe` as child processes.
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    ffmpeg: String,
    ffprobe: String,
}

impl FfmpegEncoder {
    pub fn new(config: &EncoderConfig) -> Self {
        Self {
            ffmpeg: config.ffmpeg.clone(),
            ffprobe: config.ffprobe.clone(),
        }
    }

    pub fn is_available(&self) -> bool {
        command_exists(&self.ffmpeg)
    }
}

impl Default for FfmpegEncoder {
    fn default() -> Self {
        Self::new(&EncoderConfig::default())
    }
}

#[async_trait::async_trait]
impl Encoder for FfmpegEncoder {
    async fn probe_has_audio(&self, path: &Path) -> FramecastResult<bool> {
        let output = tokio::process::Command::new(&self.ffprobe)
            .args([
                "-v",
                "error",
                "-select_streams",
                "a",
                "-show_entries",
                "stream=index",
                "-of",
                "csv=p=0",
            ])
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| FramecastError::Encoder {
                message: format!("Failed to start {}: {e}", self.ffprobe),
                status: "not started".to_string(),
                stdout: String::new(),
                stderr: String::new(),
            })?;

        if !output.status.success() {
            return Err(FramecastError::Encoder {
                message: format!("ffprobe failed for {}", path.display()),
                status: output.status.to_string(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(!String::from_utf8_lossy(&output.stdout).trim().is_empty())
    }

    async fn encode(&self, args: &[String]) -> FramecastResult<EncoderOutput> {
        tracing::debug!(args = ?args, "Running ffmpeg");
        let started = std::time::Instant::now();

        // `output()` drains stdout and stderr concurrently, so a chatty
        // encoder cannot block on a full pipe.
        let output = tokio::process::Command::new(&self.ffmpeg)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| FramecastError::Encoder {
                message: format!("Failed to start {}: {e}", self.ffmpeg),
                status: "not started".to_string(),
                stdout: String::new(),
                stderr: String::new(),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if !output.status.success() {
            return Err(FramecastError::Encoder {
                message: "ffmpeg exited with an error".to_string(),
                status: output.status.to_string(),
                stdout,
                stderr: stderr.trim().to_string(),
            });
        }

        tracing::info!(
            elapsed_secs = started.elapsed().as_secs_f64(),
            "ffmpeg finished"
        );
        Ok(EncoderOutput { stdout, stderr })
    }
}

/// Whether `binary` resolves on `PATH` (or is an existing path).
pub fn command_exists(binary: &str) -> bool {
    if binary.contains('/') {
        return Path::new(binary).is_file();
    }
    Command::new("sh")
        .arg("-c")
        .arg(format!("command -v {binary} >/dev/null 2>&1"))
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}
