//! Frame ingestion.
//!
//! A frame source yields an ordered, finite sequence of frames and exposes the
//! stream's frame rate and total duration up front:
//! - Local video files (feature: ingest-file-ffmpeg)
//! - Synthetic `stub://` sources (dry runs and tests)
//!
//! Sources never reorder frames. End of input is `Ok(None)`. A read or decode
//! error is returned as `Err` and the next call resumes after the bad data,
//! so a corrupt packet costs its frames and nothing else.

pub mod file;
#[cfg(feature = "ingest-file-ffmpeg")]
pub(crate) mod file_ffmpeg;

pub use file::{FileConfig, FileSource, FileStats};

use anyhow::Result;

use crate::frame::Frame;

/// An ordered, finite frame stream.
pub trait FrameSource {
    /// Frames per second of the stream.
    fn fps(&self) -> f64;

    /// Total duration of the stream in seconds.
    fn duration(&self) -> f64;

    /// Next frame in order, or `None` at end of input.
    fn next_frame(&mut self) -> Result<Option<Frame>>;
}

/// In-memory source over pre-built frames.
///
/// Frames are re-indexed in order starting at 1, so the caller only supplies
/// pixel data and dimensions.
pub struct MemorySource {
    frames: std::collections::VecDeque<(Vec<u8>, u32, u32)>,
    fps: f64,
    duration: f64,
    next_index: u64,
}

impl MemorySource {
    pub fn new(frames: Vec<(Vec<u8>, u32, u32)>, fps: f64) -> Self {
        let duration = if fps > 0.0 {
            frames.len() as f64 / fps
        } else {
            0.0
        };
        Self {
            frames: frames.into(),
            fps,
            duration,
            next_index: 1,
        }
    }

    /// `count` blank frames of the given size.
    pub fn blank(count: usize, width: u32, height: u32, fps: f64) -> Self {
        let len = (width as usize) * (height as usize) * 3;
        Self::new(vec![(vec![0u8; len], width, height); count], fps)
    }

    /// Override the reported duration (container duration can exceed the
    /// decoded frame span).
    pub fn with_duration(mut self, duration: f64) -> Self {
        self.duration = duration;
        self
    }
}

impl FrameSource for MemorySource {
    fn fps(&self) -> f64 {
        self.fps
    }

    fn duration(&self) -> f64 {
        self.duration
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let Some((data, width, height)) = self.frames.pop_front() else {
            return Ok(None);
        };
        let frame = Frame::new(data, width, height, self.next_index, self.fps);
        self.next_index += 1;
        Ok(Some(frame))
    }
}
