//! Approach-event clipper
//!
//! Finds moments in a video where a hand moves toward a face and cuts the
//! surrounding footage into new files.
//!
//! # Pipeline
//!
//! Frames are processed strictly in order, one at a time:
//!
//! 1. **Frame source** (`ingest`): decodes the input and reports frame rate
//!    and duration.
//! 2. **Region detector** (`detect`): finds faces and hands in the frame.
//!    Failures degrade to "nothing found".
//! 3. **Proximity tracker** (`tracker`): compares the face/hand centroid
//!    distance against the previous frame.
//! 4. **Event buffer** (`event`): turns consecutive approaching frames into
//!    events and qualifying events into segments.
//! 5. **Segment encoder** (`encode`): re-encodes each segment from the
//!    source with ffmpeg.
//!
//! A progress snapshot (`progress`) is written every 100 frames for external
//! monitors.
//!
//! # Module Structure
//!
//! - `config`: layered configuration (file, environment, validation)
//! - `error`: failure classes of a run
//! - `frame`: decoded frames and the read-only detector view
//! - `logging`: stderr logger with an optional mirrored log file
//! - `pipeline`: the frame loop and run summary
//! - `telemetry`: optional host queries (GPU and CPU utilization)
//! - `ui`: console stages for the binary

pub mod config;
pub mod detect;
pub mod encode;
pub mod error;
pub mod event;
pub mod frame;
pub mod ingest;
pub mod logging;
pub mod pipeline;
pub mod progress;
pub mod telemetry;
pub mod tracker;
pub mod ui;

pub use config::ClipperConfig;
pub use detect::{BackendRegistry, BoundingBox, DetectorBackend, RegionClass, RegionDetector};
pub use encode::{
    BackgroundEncoder, DryRunEncoder, EncodeMode, FfmpegEncoder, OutputNaming, OutputTarget,
    SegmentEncoder,
};
pub use error::ClipperError;
pub use event::{EventBuffer, Segment, SegmentPolicy};
pub use frame::{Frame, FrameStamp, FrameView};
pub use ingest::{FileSource, FrameSource, MemorySource};
pub use pipeline::{Pipeline, RunSummary, SegmentOutcome};
pub use progress::{ProgressReporter, ProgressSnapshot};
pub use tracker::{evaluate, TrackedState};
