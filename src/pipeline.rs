//! Frame loop tying the components together.
//!
//! Per frame, strictly in order:
//! 1. detect faces, then hands;
//! 2. evaluate the tracker against the run's single `TrackedState`;
//! 3. feed the verdict to the event buffer;
//! 4. encode the segment of a closed, qualifying event;
//! 5. publish a progress snapshot on cadence.
//!
//! Only startup can fail. Once frames flow, detector faults, encode failures
//! and telemetry failures are logged and the run continues. A failed read
//! from the source is skipped; `MAX_CONSECUTIVE_SOURCE_ERRORS` failures in a
//! row end the run like end of input.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};

use crate::detect::{RegionClass, RegionDetector};
use crate::encode::SegmentEncoder;
use crate::error::{init_failure, ClipperError};
use crate::event::{BufferStep, ClosedEvent, EventBuffer, Segment, SegmentPolicy};
use crate::ingest::FrameSource;
use crate::progress::ProgressReporter;
use crate::tracker::{self, TrackedState};

/// Failed reads in a row after which the source is given up.
pub const MAX_CONSECUTIVE_SOURCE_ERRORS: u32 = 8;

/// What became of one emitted segment.
#[derive(Clone, Debug, PartialEq)]
pub enum SegmentOutcome {
    /// Output file of the segment. Repeated paths mean the segment
    /// overwrote an earlier one.
    Written(PathBuf),
    /// The encode failed; no file holds this segment.
    Lost(String),
}

impl SegmentOutcome {
    pub fn path(&self) -> Option<&Path> {
        match self {
            SegmentOutcome::Written(path) => Some(path),
            SegmentOutcome::Lost(_) => None,
        }
    }
}

/// Counters and outputs of one run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RunSummary {
    pub frames: u64,
    /// Bounding boxes returned by the detector, both classes.
    pub detections: u64,
    pub events_opened: u64,
    /// Segments handed to the encoder, in emission order.
    pub segments: Vec<Segment>,
    /// Closed events that produced no segment.
    pub events_discarded: u64,
    /// One entry per segment, at the same index as in `segments`.
    pub outcomes: Vec<SegmentOutcome>,
    pub encode_failures: u64,
    pub detector_failures: u64,
    /// Failed source reads that were skipped.
    pub source_errors: u64,
    /// The source failed before end of input.
    pub source_error: Option<String>,
}

impl RunSummary {
    /// Segments paired with their outcome, in emission order.
    pub fn segment_outcomes(&self) -> impl Iterator<Item = (&Segment, &SegmentOutcome)> {
        self.segments.iter().zip(&self.outcomes)
    }

    /// Paths of segments that were written.
    pub fn written(&self) -> Vec<&Path> {
        self.outcomes.iter().filter_map(SegmentOutcome::path).collect()
    }

    fn mark_lost(&mut self, segment: &Segment, reason: String) {
        let position = self.segments.iter().zip(&self.outcomes).position(|(s, outcome)| {
            s == segment && matches!(outcome, SegmentOutcome::Written(_))
        });
        match position {
            Some(index) => self.outcomes[index] = SegmentOutcome::Lost(reason),
            None => log::warn!(
                "encoder reported an unknown segment {:.3}s - {:.3}s as lost",
                segment.start_time,
                segment.end_time
            ),
        }
    }
}

pub struct Pipeline<S: FrameSource> {
    source: S,
    detector: RegionDetector,
    encoder: Box<dyn SegmentEncoder>,
    buffer: EventBuffer,
    reporter: Option<ProgressReporter>,
    state: TrackedState,
    summary: RunSummary,
}

impl<S: FrameSource> Pipeline<S> {
    pub fn new(
        source: S,
        detector: RegionDetector,
        encoder: Box<dyn SegmentEncoder>,
        policy: SegmentPolicy,
    ) -> Result<Self> {
        let fps = source.fps();
        if !fps.is_finite() || fps <= 0.0 {
            return Err(init_failure(anyhow!("source reports invalid frame rate {}", fps)));
        }
        let duration = source.duration();
        if !duration.is_finite() || duration < 0.0 {
            return Err(init_failure(anyhow!(
                "source reports invalid duration {}",
                duration
            )));
        }
        Ok(Self {
            buffer: EventBuffer::new(fps, duration, policy),
            source,
            detector,
            encoder,
            reporter: None,
            state: TrackedState::new(),
            summary: RunSummary::default(),
        })
    }

    pub fn with_progress(mut self, reporter: ProgressReporter) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Consume the source to the end and return the run summary.
    pub fn run(mut self) -> RunSummary {
        let duration = self.source.duration();
        log::info!(
            "processing {:.2}s at {:.2} fps (backends: {})",
            duration,
            self.source.fps(),
            self.detector.backends().join(", ")
        );

        let mut failed_reads = 0;
        loop {
            let frame = match self.source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) => {
                    failed_reads += 1;
                    if failed_reads >= MAX_CONSECUTIVE_SOURCE_ERRORS {
                        log::error!(
                            "frame source failed {} times in a row after {} frames: {:#}",
                            failed_reads,
                            self.summary.frames,
                            e
                        );
                        self.summary.source_error = Some(format!("{e:#}"));
                        break;
                    }
                    self.summary.source_errors += 1;
                    log::warn!(
                        "skipping unreadable input after {} frames: {:#}",
                        self.summary.frames,
                        e
                    );
                    continue;
                }
            };
            failed_reads = 0;
            self.summary.frames += 1;

            let view = frame.view();
            let faces = self.detector.detect(&view, RegionClass::Face);
            let hands = self.detector.detect(&view, RegionClass::Hand);
            self.summary.detections += (faces.len() + hands.len()) as u64;

            let evaluation = tracker::evaluate(self.state, &faces, &hands);
            self.state = evaluation.state;

            match self.buffer.push(frame.stamp(), evaluation.approaching) {
                BufferStep::Opened { start_time } => {
                    self.summary.events_opened += 1;
                    log::debug!(
                        "approach at frame {} ({:.3}s), distance {:?}",
                        frame.index,
                        start_time,
                        evaluation.distance
                    );
                }
                BufferStep::Closed(closed) => self.handle_closed(closed),
                BufferStep::Idle | BufferStep::Extended { .. } => {}
            }

            if let Some(reporter) = self.reporter.as_mut() {
                reporter.on_frame(
                    self.summary.frames,
                    frame.timestamp,
                    duration,
                    self.summary.detections,
                );
            }
        }

        if let Some(closed) = self.buffer.finish() {
            self.handle_closed(closed);
        }

        let drained = self.encoder.drain();
        self.summary.encode_failures += drained.failed();
        for lost in drained.lost {
            self.summary.mark_lost(&lost.segment, lost.reason);
        }
        self.summary.detector_failures = self.detector.failures();

        log::info!(
            "run finished: {} frames, {} detections, {} events, {} segments, {} encode failures",
            self.summary.frames,
            self.summary.detections,
            self.summary.events_opened,
            self.summary.segments.len(),
            self.summary.encode_failures
        );
        self.summary
    }

    fn handle_closed(&mut self, closed: ClosedEvent) {
        let Some(segment) = closed.segment else {
            self.summary.events_discarded += 1;
            return;
        };
        log::info!(
            "segment {:.3}s - {:.3}s from event at {:.3}s ({} frames)",
            segment.start_time,
            segment.end_time,
            closed.start_time,
            closed.buffered
        );
        let outcome = match self.encoder.encode(&segment) {
            Ok(path) => SegmentOutcome::Written(path),
            Err(e) => {
                self.summary.encode_failures += 1;
                let err = match e.downcast::<ClipperError>() {
                    Ok(kind) => kind,
                    Err(other) => ClipperError::Encoding(format!("{other:#}")),
                };
                log::error!(
                    "segment {:.3}s - {:.3}s lost: {}",
                    segment.start_time,
                    segment.end_time,
                    err
                );
                SegmentOutcome::Lost(err.to_string())
            }
        };
        self.summary.segments.push(segment);
        self.summary.outcomes.push(outcome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{BackendRegistry, ScriptedBackend};
    use crate::encode::{OutputNaming, OutputTarget};
    use crate::ingest::MemorySource;

    struct NullEncoder(OutputTarget);

    impl SegmentEncoder for NullEncoder {
        fn encode(&mut self, segment: &Segment) -> Result<PathBuf> {
            Ok(self.0.path_for(segment))
        }

        fn target(&self) -> OutputTarget {
            self.0.clone()
        }
    }

    fn detector() -> Result<RegionDetector> {
        let mut registry = BackendRegistry::new();
        registry.register(ScriptedBackend::new());
        RegionDetector::new(registry)
    }

    fn encoder() -> Box<dyn SegmentEncoder> {
        Box::new(NullEncoder(OutputTarget::new("/out/a.mp4", OutputNaming::Single)))
    }

    #[test]
    fn zero_fps_source_is_rejected_at_startup() -> Result<()> {
        let source = MemorySource::blank(3, 2, 2, 0.0);
        let err = Pipeline::new(source, detector()?, encoder(), SegmentPolicy::default())
            .err()
            .expect("invalid fps");
        assert!(err
            .downcast_ref::<ClipperError>()
            .is_some_and(ClipperError::is_fatal));
        Ok(())
    }

    /// Fails the reads listed in `fail_on` (1-based call numbers).
    struct FlakySource {
        inner: MemorySource,
        calls: u32,
        fail_on: Vec<u32>,
    }

    impl FrameSource for FlakySource {
        fn fps(&self) -> f64 {
            self.inner.fps()
        }

        fn duration(&self) -> f64 {
            self.inner.duration()
        }

        fn next_frame(&mut self) -> Result<Option<crate::frame::Frame>> {
            self.calls += 1;
            if self.fail_on.contains(&self.calls) {
                return Err(anyhow!("corrupt packet"));
            }
            self.inner.next_frame()
        }
    }

    #[test]
    fn isolated_source_errors_are_skipped() -> Result<()> {
        let source = FlakySource {
            inner: MemorySource::blank(10, 2, 2, 30.0),
            calls: 0,
            fail_on: vec![3, 7, 8],
        };
        let summary =
            Pipeline::new(source, detector()?, encoder(), SegmentPolicy::default())?.run();
        assert_eq!(summary.frames, 10);
        assert_eq!(summary.source_errors, 3);
        assert_eq!(summary.source_error, None);
        Ok(())
    }

    #[test]
    fn persistent_source_errors_end_the_run() -> Result<()> {
        let source = FlakySource {
            inner: MemorySource::blank(20, 2, 2, 30.0),
            calls: 0,
            fail_on: (5..100).collect(),
        };
        let summary =
            Pipeline::new(source, detector()?, encoder(), SegmentPolicy::default())?.run();
        assert_eq!(summary.frames, 4);
        assert_eq!(summary.source_errors, u64::from(MAX_CONSECUTIVE_SOURCE_ERRORS) - 1);
        assert_eq!(summary.source_error.as_deref(), Some("corrupt packet"));
        Ok(())
    }

    #[test]
    fn empty_detections_produce_an_idle_run() -> Result<()> {
        let source = MemorySource::blank(45, 2, 2, 30.0);
        let summary =
            Pipeline::new(source, detector()?, encoder(), SegmentPolicy::default())?.run();
        assert_eq!(summary.frames, 45);
        assert_eq!(summary.detections, 0);
        assert_eq!(summary.events_opened, 0);
        assert!(summary.segments.is_empty());
        Ok(())
    }
}
