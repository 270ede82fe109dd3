use serde::{Deserialize, Serialize};

/// Visual region classes the pipeline tracks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegionClass {
    Face,
    Hand,
}

impl RegionClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegionClass::Face => "face",
            RegionClass::Hand => "hand",
        }
    }
}

/// Axis-aligned box in frame pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub class: RegionClass,
}

impl BoundingBox {
    pub fn new(class: RegionClass, x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            class,
        }
    }

    pub fn centroid(&self) -> (f64, f64) {
        (
            self.x as f64 + self.width as f64 / 2.0,
            self.y as f64 + self.height as f64 / 2.0,
        )
    }

    /// Euclidean distance between the centroids of two boxes.
    pub fn centroid_distance(&self, other: &BoundingBox) -> f64 {
        let (ax, ay) = self.centroid();
        let (bx, by) = other.centroid();
        (ax - bx).hypot(ay - by)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centroid_distance_is_euclidean() {
        let face = BoundingBox::new(RegionClass::Face, 0.0, 0.0, 10.0, 10.0);
        let hand = BoundingBox::new(RegionClass::Hand, 30.0, 40.0, 10.0, 10.0);
        assert_eq!(face.centroid(), (5.0, 5.0));
        assert!((face.centroid_distance(&hand) - 50.0).abs() < 1e-9);
        assert_eq!(face.centroid_distance(&hand), hand.centroid_distance(&face));
    }
}
