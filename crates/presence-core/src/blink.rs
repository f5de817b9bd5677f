//! Coarse blink detection from 5-point landmarks.
//!
//! Five-point detector landmarks carry no eyelid geometry, so a true eye
//! aspect ratio cannot be computed from them. Instead the distance between
//! the two eye centres is tracked over a short window: a still photograph
//! keeps it constant, while a live subject's blinks and head motion make it
//! fluctuate.

use crate::imgops::mean_variance;
use crate::types::Landmarks;
use std::collections::VecDeque;

/// Number of eye distances kept in the rolling window.
pub const BLINK_HISTORY_CAPACITY: usize = 10;

/// Samples required before the window variance is considered.
pub const MIN_BLINK_SAMPLES: usize = 5;

/// Window variance (px²) above which a blink is reported.
pub const BLINK_VARIANCE_THRESHOLD: f64 = 10.0;

/// Bounded FIFO of eye distances; the oldest value is evicted on overflow.
#[derive(Debug, Clone)]
pub struct EyeDistanceHistory {
    values: VecDeque<f64>,
    capacity: usize,
}

impl Default for EyeDistanceHistory {
    fn default() -> Self {
        Self::with_capacity(BLINK_HISTORY_CAPACITY)
    }
}

impl EyeDistanceHistory {
    /// Window holding at most `capacity` values (at least one).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, distance: f64) {
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(distance);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Values in arrival order, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.values.iter().copied()
    }

    /// Population variance of the whole window (0 when empty).
    pub fn variance(&self) -> f64 {
        mean_variance(self.iter()).1
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }
}

/// Result of one blink-detect call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlinkObservation {
    pub is_blinking: bool,
    pub blink_detected: bool,
}

/// Stateful blink scorer owning one eye-distance window.
#[derive(Debug, Clone, Default)]
pub struct BlinkDetector {
    history: EyeDistanceHistory,
}

impl BlinkDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the eye distance from `landmarks` and evaluate the window.
    ///
    /// Absent landmarks leave the history untouched and report no blink.
    pub fn detect(&mut self, landmarks: Option<&Landmarks>) -> BlinkObservation {
        let Some(lm) = landmarks else {
            return BlinkObservation::default();
        };

        let distance = point_distance(lm[0], lm[1]);
        self.history.push(distance);

        if self.history.len() < MIN_BLINK_SAMPLES {
            return BlinkObservation::default();
        }

        let variance = self.history.variance();
        let blinked = variance > BLINK_VARIANCE_THRESHOLD;
        tracing::debug!(
            distance,
            variance,
            samples = self.history.len(),
            blinked,
            "blink window"
        );
        BlinkObservation {
            is_blinking: blinked,
            blink_detected: blinked,
        }
    }

    pub fn history(&self) -> &EyeDistanceHistory {
        &self.history
    }

    /// Forget all recorded distances (new subject or session).
    pub fn reset(&mut self) {
        self.history.clear();
    }
}

fn point_distance(a: (f32, f32), b: (f32, f32)) -> f64 {
    let dx = f64::from(a.0) - f64::from(b.0);
    let dy = f64::from(a.1) - f64::from(b.1);
    (dx * dx + dy * dy).sqrt()
}

/// Eye aspect ratio over six eye-contour points `p1..p6`:
/// `(|p2-p6| + |p3-p5|) / (2 |p1-p4|)`.
///
/// Returns 0 for fewer than six points or a degenerate horizontal span.
pub fn eye_aspect_ratio(eye: &[(f32, f32)]) -> f32 {
    if eye.len() < 6 {
        return 0.0;
    }
    let vertical1 = point_distance(eye[1], eye[5]);
    let vertical2 = point_distance(eye[2], eye[4]);
    let horizontal = point_distance(eye[0], eye[3]);
    if horizontal == 0.0 {
        return 0.0;
    }
    ((vertical1 + vertical2) / (2.0 * horizontal)) as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::landmarks_with_eyes;

    /// Landmarks whose eye distance is exactly `d`.
    fn eyes_apart(d: f32) -> Landmarks {
        landmarks_with_eyes((100.0, 50.0), (100.0 + d, 50.0))
    }

    #[test]
    fn test_history_keeps_latest_ten() {
        let mut detector = BlinkDetector::new();
        for i in 0..15 {
            detector.detect(Some(&eyes_apart(40.0 + i as f32)));
        }
        let values: Vec<f64> = detector.history().iter().collect();
        let expected: Vec<f64> = (5..15).map(|i| 40.0 + i as f64).collect();
        assert_eq!(values, expected);
    }

    #[test]
    fn test_zero_capacity_history_stays_bounded() {
        let mut history = EyeDistanceHistory::with_capacity(0);
        assert_eq!(history.capacity(), 1);
        history.push(40.0);
        history.push(41.0);
        assert_eq!(history.len(), 1);
        assert_eq!(history.iter().collect::<Vec<_>>(), vec![41.0]);
    }

    #[test]
    fn test_absent_landmarks_leave_history_untouched() {
        let mut detector = BlinkDetector::new();
        detector.detect(Some(&eyes_apart(40.0)));
        let obs = detector.detect(None);
        assert_eq!(obs, BlinkObservation::default());
        assert_eq!(detector.history().len(), 1);
    }

    #[test]
    fn test_identical_distances_no_blink() {
        let mut detector = BlinkDetector::new();
        let mut obs = BlinkObservation::default();
        for _ in 0..5 {
            obs = detector.detect(Some(&eyes_apart(40.0)));
        }
        assert_eq!(
            obs,
            BlinkObservation {
                is_blinking: false,
                blink_detected: false
            }
        );
    }

    #[test]
    fn test_needs_five_samples() {
        // Distances 30, 50, 30, 50: variance 100 but only four samples.
        let mut detector = BlinkDetector::new();
        for d in [30.0, 50.0, 30.0, 50.0] {
            let obs = detector.detect(Some(&eyes_apart(d)));
            assert!(!obs.blink_detected);
        }
        let obs = detector.detect(Some(&eyes_apart(30.0)));
        assert!(obs.is_blinking);
        assert!(obs.blink_detected);
    }

    #[test]
    fn test_variance_threshold_is_strict() {
        // 38, 42 alternating: deviations of ±2 give variance below 10.
        let mut detector = BlinkDetector::new();
        let mut obs = BlinkObservation::default();
        for d in [38.0, 42.0, 38.0, 42.0, 38.0, 42.0] {
            obs = detector.detect(Some(&eyes_apart(d)));
        }
        assert!(detector.history().variance() < BLINK_VARIANCE_THRESHOLD);
        assert!(!obs.blink_detected);
    }

    #[test]
    fn test_diagonal_eye_distance() {
        let mut detector = BlinkDetector::new();
        detector.detect(Some(&landmarks_with_eyes((0.0, 0.0), (3.0, 4.0))));
        let d: Vec<f64> = detector.history().iter().collect();
        assert!((d[0] - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_reset_clears_history() {
        let mut detector = BlinkDetector::new();
        for d in [30.0, 50.0, 30.0] {
            detector.detect(Some(&eyes_apart(d)));
        }
        detector.reset();
        assert!(detector.history().is_empty());
        assert_eq!(detector.history().capacity(), BLINK_HISTORY_CAPACITY);
    }

    #[test]
    fn test_eye_aspect_ratio() {
        // Horizontal span 4, both vertical spans 2 → (2 + 2) / 8 = 0.5
        let eye = [
            (0.0, 0.0),
            (1.0, 1.0),
            (3.0, 1.0),
            (4.0, 0.0),
            (3.0, -1.0),
            (1.0, -1.0),
        ];
        assert!((eye_aspect_ratio(&eye) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_eye_aspect_ratio_degenerate() {
        assert_eq!(eye_aspect_ratio(&[(0.0, 0.0); 5]), 0.0);
        assert_eq!(eye_aspect_ratio(&[(1.0, 1.0); 6]), 0.0);
    }
}
