//! Approach-event buffering and segment assembly.
//!
//! `EventBuffer` is a two-state machine fed once per frame with the tracker
//! verdict:
//!
//! - `Idle -> Active` on the first approaching frame. The event's start time
//!   is that frame's timestamp and the frame is buffered.
//! - `Active`: approaching frames are appended. The first non-approaching
//!   frame closes the event and is not buffered.
//! - On close, an event with at least `fps * min_event_seconds` buffered
//!   frames yields a `Segment` around its start; shorter events are dropped.
//!
//! At most one event exists at a time. An event still open when the input
//! ends is dropped unless `flush_on_end` is set.

use serde::{Deserialize, Serialize};

use crate::frame::FrameStamp;

/// Extraction window parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentPolicy {
    /// Seconds before the event start.
    pub lead_in: f64,
    /// Seconds after the event start.
    pub lead_out: f64,
    /// Minimum buffered duration, in seconds of frames, for an event to
    /// produce a segment.
    pub min_event_seconds: f64,
    /// Close an event still open at end of input like a normal closure.
    pub flush_on_end: bool,
}

impl Default for SegmentPolicy {
    fn default() -> Self {
        Self {
            lead_in: 1.0,
            lead_out: 10.0,
            min_event_seconds: 1.0,
            flush_on_end: false,
        }
    }
}

/// Time window on the source timeline selected for extraction.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start_time: f64,
    pub end_time: f64,
}

impl Segment {
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }
}

/// A closed event and what came of it.
#[derive(Clone, Debug, PartialEq)]
pub struct ClosedEvent {
    pub start_time: f64,
    pub buffered: usize,
    /// `None` when the event was too short or its window was empty.
    pub segment: Option<Segment>,
}

/// What one frame did to the buffer.
#[derive(Clone, Debug, PartialEq)]
pub enum BufferStep {
    Idle,
    Opened { start_time: f64 },
    Extended { buffered: usize },
    Closed(ClosedEvent),
}

enum EventState {
    Idle,
    Active {
        start_time: f64,
        frames: Vec<FrameStamp>,
    },
}

pub struct EventBuffer {
    fps: f64,
    duration: f64,
    policy: SegmentPolicy,
    state: EventState,
    last_start_time: Option<f64>,
}

impl EventBuffer {
    pub fn new(fps: f64, duration: f64, policy: SegmentPolicy) -> Self {
        Self {
            fps,
            duration,
            policy,
            state: EventState::Idle,
            last_start_time: None,
        }
    }

    /// Feed one frame and its tracker verdict.
    pub fn push(&mut self, stamp: FrameStamp, approaching: bool) -> BufferStep {
        if let EventState::Active { frames, .. } = &mut self.state {
            if approaching {
                frames.push(stamp);
                return BufferStep::Extended {
                    buffered: frames.len(),
                };
            }
            let closed = self.close();
            log::debug!(
                "event closed at frame {} after {} frames",
                stamp.index,
                closed.buffered
            );
            return BufferStep::Closed(closed);
        }

        if !approaching {
            return BufferStep::Idle;
        }

        let start_time = stamp.timestamp;
        debug_assert!(
            self.last_start_time.map_or(true, |last| last <= start_time),
            "event start times must not decrease"
        );
        self.last_start_time = Some(start_time);
        self.state = EventState::Active {
            start_time,
            frames: vec![stamp],
        };
        log::debug!("event opened at frame {} ({:.3}s)", stamp.index, start_time);
        BufferStep::Opened { start_time }
    }

    /// End of input. Returns the trailing event only when `flush_on_end` is
    /// set; otherwise an open event is dropped.
    pub fn finish(&mut self) -> Option<ClosedEvent> {
        if !self.is_active() {
            return None;
        }
        if self.policy.flush_on_end {
            return Some(self.close());
        }
        log::info!(
            "input ended during an open event ({} frames buffered); no segment emitted",
            self.buffered()
        );
        self.state = EventState::Idle;
        None
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, EventState::Active { .. })
    }

    /// Frames buffered by the open event (0 when idle).
    pub fn buffered(&self) -> usize {
        match &self.state {
            EventState::Idle => 0,
            EventState::Active { frames, .. } => frames.len(),
        }
    }

    /// Start time of the open event.
    pub fn start_time(&self) -> Option<f64> {
        match &self.state {
            EventState::Idle => None,
            EventState::Active { start_time, .. } => Some(*start_time),
        }
    }

    /// Buffered frames needed for an event to qualify.
    pub fn min_frames(&self) -> f64 {
        self.fps * self.policy.min_event_seconds
    }

    fn close(&mut self) -> ClosedEvent {
        let state = std::mem::replace(&mut self.state, EventState::Idle);
        let EventState::Active { start_time, frames } = state else {
            unreachable!("close called while idle");
        };
        let buffered = frames.len();

        let segment = if (buffered as f64) >= self.min_frames() {
            self.window(start_time)
        } else {
            log::debug!(
                "event at {:.3}s discarded: {} frames < {:.1}",
                start_time,
                buffered,
                self.min_frames()
            );
            None
        };

        ClosedEvent {
            start_time,
            buffered,
            segment,
        }
    }

    fn window(&self, start_time: f64) -> Option<Segment> {
        let start = (start_time - self.policy.lead_in).max(0.0);
        let end = (start_time + self.policy.lead_out).min(self.duration);
        if end <= start {
            log::warn!(
                "event at {:.3}s yields an empty window [{:.3}, {:.3}]; skipped",
                start_time,
                start,
                end
            );
            return None;
        }
        Some(Segment {
            start_time: start,
            end_time: end,
        })
    }
}
