use anyhow::Result;

use crate::detect::result::{BoundingBox, RegionClass};
use crate::frame::FrameView;

/// Detector backend trait.
///
/// A backend finds regions of one or more classes in a frame. Backends may
/// fail; the `RegionDetector` in front of them turns failures into empty
/// results so that a single bad frame never stops a run.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Returns true when the backend can find regions of `class`.
    fn supports(&self, class: RegionClass) -> bool;

    /// Run detection on a frame.
    ///
    /// Returned boxes must carry `class` and be in frame pixel coordinates.
    /// No ordering is implied.
    fn detect(&mut self, frame: &FrameView<'_>, class: RegionClass) -> Result<Vec<BoundingBox>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
