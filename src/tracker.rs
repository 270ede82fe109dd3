//! Face/hand proximity tracking.
//!
//! The tracker decides, frame by frame, whether a hand is approaching a face.
//! It is a pure value transform: `evaluate` takes the previous `TrackedState`
//! and the current detections, and returns the verdict together with the next
//! state. The caller owns the single state value for a run and replaces it
//! with the returned one after every frame.
//!
//! When several boxes of a class are present only the first one is used.
//! This tie-break depends on detector output order and is not stable across
//! frames; there is no cross-frame matching of boxes.

use crate::detect::BoundingBox;

/// Last face/hand pair seen together in one frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TrackedState {
    face: Option<BoundingBox>,
    hand: Option<BoundingBox>,
}

impl TrackedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn face(&self) -> Option<&BoundingBox> {
        self.face.as_ref()
    }

    pub fn hand(&self) -> Option<&BoundingBox> {
        self.hand.as_ref()
    }

    /// Centroid distance of the stored pair, if both boxes are stored.
    pub fn distance(&self) -> Option<f64> {
        match (&self.face, &self.hand) {
            (Some(face), Some(hand)) => Some(face.centroid_distance(hand)),
            _ => None,
        }
    }
}

/// Result of one tracker evaluation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Evaluation {
    pub approaching: bool,
    pub state: TrackedState,
    /// Current centroid distance, when both classes were present.
    pub distance: Option<f64>,
}

/// Decide whether the hand is approaching the face.
///
/// - Either set empty: `false`, state unchanged.
/// - Otherwise the first box of each set is used; the verdict is `true` iff
///   the current centroid distance is strictly smaller than the distance of
///   the stored pair. With no stored pair the verdict is `false`.
/// - Whenever both boxes are present, the returned state holds them.
pub fn evaluate(state: TrackedState, faces: &[BoundingBox], hands: &[BoundingBox]) -> Evaluation {
    let (Some(face), Some(hand)) = (faces.first(), hands.first()) else {
        return Evaluation {
            approaching: false,
            state,
            distance: None,
        };
    };

    let current = face.centroid_distance(hand);
    let approaching = state.distance().is_some_and(|previous| current < previous);

    Evaluation {
        approaching,
        state: TrackedState {
            face: Some(*face),
            hand: Some(*hand),
        },
        distance: Some(current),
    }
}
