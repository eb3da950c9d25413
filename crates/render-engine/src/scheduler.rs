//! Frame scheduling for video export.
//!
//! Turns a page timeline, a frame rate, and a parallelism level into the
//! list of frames to render and contiguous chunks of those frames, one per
//! renderer session.

use framecast_common::error::{FramecastError, FramecastResult};
use framecast_document::Timeline;

/// One frame of the output video.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Global frame index; also the frame's file name.
    pub index: usize,

    /// Timeline position sampled for this frame, in milliseconds.
    pub time_ms: f64,

    /// Index of the page active at `time_ms`.
    pub page_index: Option<usize>,

    pub page_id: Option<String>,
}

/// The frames of one export, partitioned into chunks.
#[derive(Debug, Clone)]
pub struct FramePlan {
    fps: f64,
    duration_ms: f64,
    chunk_size: usize,
    frames: Vec<Frame>,
}

/// Number of frames for a timeline of `duration_ms` at `fps`. Never zero.
pub fn frame_count(duration_ms: f64, fps: f64) -> usize {
    let count = (duration_ms / 1000.0 * fps).floor();
    if count >= 1.0 {
        count as usize
    } else {
        1
    }
}

/// Timestamp sampled for frame `index`.
///
/// The first frame samples 1 ms so enter animations have started; the last
/// frame samples `duration - 1` so the final state is captured before the
/// timeline ends.
pub fn frame_time_ms(index: usize, frame_count: usize, fps: f64, duration_ms: f64) -> f64 {
    let mut time = index as f64 * (1000.0 / fps);
    if index == 0 {
        time = 1.0;
    }
    if index + 1 == frame_count {
        time = duration_ms - 1.0;
    }
    time
}

impl FramePlan {
    pub fn new(timeline: &Timeline, fps: f64, parallelism: usize) -> FramecastResult<Self> {
        if !(fps > 0.0) || !fps.is_finite() {
            return Err(FramecastError::config(format!(
                "fps must be a positive number, got {fps}"
            )));
        }
        if parallelism == 0 {
            return Err(FramecastError::config("parallelism must be at least 1"));
        }
        let duration_ms = timeline.total_duration_ms();
        if !(duration_ms > 0.0) {
            return Err(FramecastError::precondition(
                "document has zero total duration",
            ));
        }

        let count = frame_count(duration_ms, fps);
        let frames = (0..count)
            .map(|index| {
                let time_ms = frame_time_ms(index, count, fps, duration_ms);
                let span = timeline.page_at(time_ms);
                Frame {
                    index,
                    time_ms,
                    page_index: span.map(|s| s.index),
                    page_id: span.map(|s| s.id.clone()),
                }
            })
            .collect();

        Ok(Self {
            fps,
            duration_ms,
            chunk_size: count.div_ceil(parallelism),
            frames,
        })
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    pub fn duration_ms(&self) -> f64 {
        self.duration_ms
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Maximum number of frames per chunk.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Contiguous, non-overlapping chunks in index order.
    pub fn chunks(&self) -> std::slice::Chunks<'_, Frame> {
        self.frames.chunks(self.chunk_size)
    }

    pub fn chunk_count(&self) -> usize {
        self.frames.len().div_ceil(self.chunk_size)
    }
}

/// The page last activated within a chunk.
///
/// Threaded through the chunk loop so a page is only re-activated when the
/// active page changes; the first frame of a chunk always activates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageCursor {
    last: Option<Option<usize>>,
}

impl PageCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move to `page_index`, returning the next cursor and whether the page
    /// must be activated.
    pub fn step(self, page_index: Option<usize>) -> (Self, bool) {
        let changed = self.last != Some(page_index);
        (
            Self {
                last: Some(page_index),
            },
            changed,
        )
    }
}
