//! Decoded frames and the read-only view detectors receive.
//!
//! - `Frame`: one decoded picture with its position on the source timeline.
//! - `FrameView`: borrowed view handed to detector backends.
//! - `FrameStamp`: index + timestamp, what the event buffer keeps per frame.
//!
//! Pixel data is packed RGB24. Frames are immutable once produced; the
//! pipeline drops each frame after it has been evaluated.

use anyhow::{anyhow, Result};

/// A decoded frame. Indices start at 1 and increase by one per decoded frame.
pub struct Frame {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub index: u64,
    /// Seconds on the source timeline (`index / fps`).
    pub timestamp: f64,
}

impl Frame {
    /// Build a frame at `index` for a source running at `fps`.
    ///
    /// The pixel length is checked against the dimensions; a mismatch is
    /// reported as an error by detectors, not here, so that malformed frames
    /// still flow through the pipeline and count toward the timeline.
    pub fn new(data: Vec<u8>, width: u32, height: u32, index: u64, fps: f64) -> Self {
        let timestamp = if fps > 0.0 { index as f64 / fps } else { 0.0 };
        Self {
            data,
            width,
            height,
            index,
            timestamp,
        }
    }

    pub fn view(&self) -> FrameView<'_> {
        FrameView { frame: self }
    }

    pub fn stamp(&self) -> FrameStamp {
        FrameStamp {
            index: self.index,
            timestamp: self.timestamp,
        }
    }

    pub(crate) fn byte_len(&self) -> usize {
        self.data.len()
    }
}

/// Read-only view of a frame for detector backends.
#[derive(Clone, Copy)]
pub struct FrameView<'a> {
    frame: &'a Frame,
}

impl<'a> FrameView<'a> {
    pub fn width(&self) -> u32 {
        self.frame.width
    }

    pub fn height(&self) -> u32 {
        self.frame.height
    }

    pub fn index(&self) -> u64 {
        self.frame.index
    }

    pub fn timestamp(&self) -> f64 {
        self.frame.timestamp
    }

    pub fn pixels(&self) -> &'a [u8] {
        &self.frame.data
    }

    /// Pixels as validated RGB24, or an error when the buffer does not match
    /// the declared dimensions.
    pub fn rgb(&self) -> Result<&'a [u8]> {
        let expected = self
            .frame
            .width
            .checked_mul(self.frame.height)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("RGB frame dimensions overflow"))? as usize;
        if self.frame.data.len() != expected {
            return Err(anyhow!(
                "RGB frame length mismatch: expected {}, got {}",
                expected,
                self.frame.data.len()
            ));
        }
        Ok(&self.frame.data)
    }
}

/// Position of a frame on the source timeline.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameStamp {
    pub index: u64,
    pub timestamp: f64,
}
