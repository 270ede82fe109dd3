//! Segment encoding.
//!
//! An encoder re-materializes a `Segment` of the source video into an output
//! file. Encoding happens either inline, blocking the frame loop until the
//! file is written, or on a single background worker (see `queue`).
//!
//! Output naming:
//! - `Single`: every segment is written to the same path, so only the last
//!   segment of a run remains on disk.
//! - `PerSegment`: the segment window is appended to the file stem.
//!
//! Output files are written in place. An interrupted encode can leave a
//! partial file behind; consumers must check completeness themselves.

pub mod ffmpeg;
pub mod queue;

pub use self::ffmpeg::{probe_ffmpeg, FfmpegEncoder, FfmpegSettings};
pub use queue::BackgroundEncoder;

use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::event::Segment;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputNaming {
    #[default]
    Single,
    PerSegment,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncodeMode {
    #[default]
    Inline,
    Background,
}

/// Where segments of a run are written.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputTarget {
    pub path: PathBuf,
    pub naming: OutputNaming,
}

impl OutputTarget {
    pub fn new(path: impl Into<PathBuf>, naming: OutputNaming) -> Self {
        Self {
            path: path.into(),
            naming,
        }
    }

    /// Output file for `segment`.
    pub fn path_for(&self, segment: &Segment) -> PathBuf {
        match self.naming {
            OutputNaming::Single => self.path.clone(),
            OutputNaming::PerSegment => {
                let stem = self
                    .path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "segment".to_string());
                let mut name = format!(
                    "{}_{}-{}",
                    stem,
                    millis(segment.start_time),
                    millis(segment.end_time)
                );
                if let Some(ext) = self.path.extension() {
                    name.push('.');
                    name.push_str(&ext.to_string_lossy());
                }
                self.path.with_file_name(name)
            }
        }
    }

    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }
}

fn millis(seconds: f64) -> u64 {
    (seconds.max(0.0) * 1000.0).round() as u64
}

/// A segment accepted by a queued encoder whose file was never written.
#[derive(Clone, Debug, PartialEq)]
pub struct LostSegment {
    pub segment: Segment,
    pub reason: String,
}

/// Outcome of work reported when an encoder is drained.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EncodeStats {
    pub written: u64,
    /// Accepted segments that failed, in acceptance order.
    pub lost: Vec<LostSegment>,
}

impl EncodeStats {
    pub fn failed(&self) -> u64 {
        self.lost.len() as u64
    }
}

/// Writes segments of the source video to output files.
pub trait SegmentEncoder: Send {
    /// Encode `segment` and return the output path.
    ///
    /// Queued encoders return the planned path as soon as the segment is
    /// accepted; their failures are only reported through `drain`.
    fn encode(&mut self, segment: &Segment) -> Result<PathBuf>;

    /// Output location of this encoder.
    fn target(&self) -> OutputTarget;

    /// Wait for outstanding work. Returns counters for work that was not
    /// reported through `encode`.
    fn drain(&mut self) -> EncodeStats {
        EncodeStats::default()
    }
}

impl<E: SegmentEncoder + ?Sized> SegmentEncoder for Box<E> {
    fn encode(&mut self, segment: &Segment) -> Result<PathBuf> {
        (**self).encode(segment)
    }

    fn target(&self) -> OutputTarget {
        (**self).target()
    }

    fn drain(&mut self) -> EncodeStats {
        (**self).drain()
    }
}

/// Encoder that only logs the segments it is given. Used for synthetic
/// inputs, which have no file to cut from.
pub struct DryRunEncoder {
    target: OutputTarget,
}

impl DryRunEncoder {
    pub fn new(target: OutputTarget) -> Self {
        Self { target }
    }
}

impl SegmentEncoder for DryRunEncoder {
    fn encode(&mut self, segment: &Segment) -> Result<PathBuf> {
        let path = self.target.path_for(segment);
        log::info!(
            "dry run: would write {:.2}s - {:.2}s to {}",
            segment.start_time,
            segment.end_time,
            path.display()
        );
        Ok(path)
    }

    fn target(&self) -> OutputTarget {
        self.target.clone()
    }
}

/// Default output file name for an input path:
/// `PROCESSED_<parent directory>_<file name>`.
pub fn default_output_name(input: &str) -> String {
    if let Some(name) = input.strip_prefix("stub://") {
        let name = if name.is_empty() { "stub" } else { name };
        return format!("PROCESSED_stub_{}.mp4", name.replace('/', "_"));
    }
    let path = Path::new(input);
    let file = path
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output.mp4".to_string());
    let parent = path
        .parent()
        .and_then(|p| p.file_name())
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("PROCESSED_{}_{}", parent, file)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEGMENT: Segment = Segment {
        start_time: 0.5,
        end_time: 11.25,
    };

    #[test]
    fn single_naming_reuses_one_path() {
        let target = OutputTarget::new("/out/PROCESSED_in_a.mp4", OutputNaming::Single);
        let other = Segment {
            start_time: 20.0,
            end_time: 30.0,
        };
        assert_eq!(target.path_for(&SEGMENT), target.path_for(&other));
        assert_eq!(target.dir(), Path::new("/out"));
    }

    #[test]
    fn per_segment_naming_appends_window() {
        let target = OutputTarget::new("/out/PROCESSED_in_a.mp4", OutputNaming::PerSegment);
        assert_eq!(
            target.path_for(&SEGMENT),
            PathBuf::from("/out/PROCESSED_in_a_500-11250.mp4")
        );
    }

    #[test]
    fn dry_run_plans_paths_without_writing() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let target = OutputTarget::new(dir.path().join("clip.mp4"), OutputNaming::PerSegment);
        let mut encoder: Box<dyn SegmentEncoder> = Box::new(DryRunEncoder::new(target));
        let path = encoder.encode(&SEGMENT)?;
        assert_eq!(path, dir.path().join("clip_500-11250.mp4"));
        assert!(!path.exists());
        assert_eq!(encoder.drain(), EncodeStats::default());
        Ok(())
    }

    #[test]
    fn default_output_name_uses_parent_and_file() {
        assert_eq!(
            default_output_name("/data/Input_videos/VID_1.mp4"),
            "PROCESSED_Input_videos_VID_1.mp4"
        );
        assert_eq!(default_output_name("stub://demo"), "PROCESSED_stub_demo.mp4");
    }
}
