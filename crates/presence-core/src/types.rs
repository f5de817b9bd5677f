use serde::{Deserialize, Serialize};

/// Five facial landmarks in detector order: left eye, right eye, nose,
/// left mouth corner, right mouth corner.
pub type Landmarks = [(f32, f32); 5];

/// Axis-aligned face box in frame pixel coordinates (`x2`/`y2` exclusive).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    /// True when the box encloses no pixels once truncated to integer coordinates.
    pub fn is_empty(&self) -> bool {
        (self.x2 as i64) <= (self.x1 as i64) || (self.y2 as i64) <= (self.y1 as i64)
    }
}

/// One face reported by the external detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub confidence: f32,
    #[serde(default)]
    pub landmarks: Option<Landmarks>,
}

/// Landmark set with the two eye centres placed and every other point at the origin.
#[cfg(test)]
pub(crate) fn landmarks_with_eyes(left: (f32, f32), right: (f32, f32)) -> Landmarks {
    [left, right, (0.0, 0.0), (0.0, 0.0), (0.0, 0.0)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_box_dimensions() {
        let b = BoundingBox::new(10.0, 20.0, 50.0, 100.0);
        assert_eq!(b.width(), 40.0);
        assert_eq!(b.height(), 80.0);
        assert!(!b.is_empty());
    }

    #[test]
    fn test_box_empty_after_truncation() {
        // 10.2 and 10.9 both truncate to 10: zero columns
        assert!(BoundingBox::new(10.2, 0.0, 10.9, 50.0).is_empty());
        assert!(BoundingBox::new(0.0, 30.0, 50.0, 30.0).is_empty());
        assert!(BoundingBox::new(40.0, 0.0, 10.0, 50.0).is_empty());
    }

    #[test]
    fn test_detection_landmarks_default_to_none() {
        let det: Detection = toml::from_str(
            r#"
            confidence = 0.99
            [bbox]
            x1 = 0.0
            y1 = 0.0
            x2 = 10.0
            y2 = 10.0
            "#,
        )
        .unwrap();
        assert!(det.landmarks.is_none());
        assert!((det.confidence - 0.99).abs() < 1e-6);
    }
}
