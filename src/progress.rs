//! Progress snapshots for external monitors.
//!
//! The reporter overwrites one small JSON file every `every` processed
//! frames. There is no locking or acknowledgment; readers may observe a
//! partially written file and must treat it as "no snapshot yet".

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::ClipperError;

pub const DEFAULT_PROGRESS_EVERY: u64 = 100;

/// One status snapshot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// Position in the source, percent in `[0, 100]`.
    pub progress: f64,
    /// Bounding boxes returned by the detector since the run started.
    pub detections: u64,
    /// Frames processed per wall-clock second.
    pub fps: f64,
}

impl ProgressSnapshot {
    /// Read the last snapshot written to `path`.
    ///
    /// Returns `None` when the file is missing, torn or not a snapshot.
    pub fn read(path: &Path) -> Option<Self> {
        let raw = std::fs::read_to_string(path).ok()?;
        serde_json::from_str(&raw).ok()
    }
}

/// Percent of `duration` covered at `timestamp`.
pub fn progress_percent(timestamp: f64, duration: f64) -> f64 {
    if duration.is_nan() || duration <= 0.0 || !timestamp.is_finite() {
        return 0.0;
    }
    (timestamp / duration * 100.0).clamp(0.0, 100.0)
}

pub struct ProgressReporter {
    path: PathBuf,
    every: u64,
    started: Instant,
    written: u64,
}

impl ProgressReporter {
    pub fn new(path: impl Into<PathBuf>, every: u64) -> Self {
        Self {
            path: path.into(),
            every: every.max(1),
            started: Instant::now(),
            written: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Snapshots successfully written so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Called once per processed frame. Writes a snapshot when
    /// `frames_processed` is a multiple of the cadence.
    pub fn on_frame(
        &mut self,
        frames_processed: u64,
        timestamp: f64,
        duration: f64,
        detections: u64,
    ) -> Option<ProgressSnapshot> {
        if frames_processed == 0 || frames_processed % self.every != 0 {
            return None;
        }
        let elapsed = self.started.elapsed().as_secs_f64();
        let fps = if elapsed > 0.0 {
            frames_processed as f64 / elapsed
        } else {
            0.0
        };
        let snapshot = ProgressSnapshot {
            progress: progress_percent(timestamp, duration),
            detections,
            fps,
        };
        self.publish(&snapshot);
        Some(snapshot)
    }

    /// Write `snapshot`, swallowing failures.
    pub fn publish(&mut self, snapshot: &ProgressSnapshot) {
        match self.write(snapshot) {
            Ok(()) => {
                self.written += 1;
                log::debug!(
                    "progress {:.1}% detections={} fps={:.1}",
                    snapshot.progress,
                    snapshot.detections,
                    snapshot.fps
                );
            }
            Err(e) => {
                let err = ClipperError::Telemetry(format!("{e:#}"));
                log::debug!("{}", err);
            }
        }
    }

    fn write(&self, snapshot: &ProgressSnapshot) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create progress directory {}", parent.display()))?;
        }
        let body = serde_json::to_string(snapshot)?;
        std::fs::write(&self.path, body)
            .with_context(|| format!("write progress snapshot {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_is_clamped() {
        assert_eq!(progress_percent(5.0, 10.0), 50.0);
        assert_eq!(progress_percent(12.0, 10.0), 100.0);
        assert_eq!(progress_percent(-1.0, 10.0), 0.0);
        assert_eq!(progress_percent(1.0, 0.0), 0.0);
    }

    #[test]
    fn reporter_writes_on_cadence() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("logs").join("progress.log");
        let mut reporter = ProgressReporter::new(&path, 100);

        assert!(reporter.on_frame(99, 3.3, 10.0, 4).is_none());
        assert!(ProgressSnapshot::read(&path).is_none());

        reporter.on_frame(100, 3.0, 10.0, 7).expect("snapshot");
        assert_eq!(reporter.written(), 1);
        let read = ProgressSnapshot::read(&path).expect("readable snapshot");
        assert_eq!(read.detections, 7);
        assert!((read.progress - 30.0).abs() < 1e-9);
        assert!(read.fps >= 0.0);
    }

    #[test]
    fn torn_snapshot_reads_as_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("progress.log");
        std::fs::write(&path, "{\"progress\": 12.5, \"detec").expect("write");
        assert!(ProgressSnapshot::read(&path).is_none());
    }

    #[test]
    fn write_failures_are_swallowed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").expect("write");
        let mut reporter = ProgressReporter::new(blocker.join("progress.log"), 1);
        assert!(reporter.on_frame(1, 0.1, 1.0, 0).is_some());
        assert_eq!(reporter.written(), 0);
    }
}
