//! Motion liveness analysis from dense optical flow.
//!
//! A live face shows small, irregular movements in many directions. A replayed
//! video or a photo moved by hand tends to produce a uniform flow field: low
//! magnitude variance and a narrow angle distribution.

use crate::flow::{farneback, FarnebackParams};
use crate::imgops::{gray_plane, mean_variance, to_gray};
use image::imageops::{self, FilterType};
use image::RgbImage;

/// Sub-score returned when there is no usable previous frame.
pub const NEUTRAL_MOTION_SCORE: f64 = 0.5;

const ANGLE_BINS: usize = 36;
const SMOOTHING: f64 = 1e-6;

const VARIANCE_SCALE: f64 = 10.0;
const ENTROPY_SCALE: f64 = 5.0;
const MAGNITUDE_SCALE: f64 = 5.0;

const VARIANCE_WEIGHT: f64 = 0.4;
const ENTROPY_WEIGHT: f64 = 0.3;
const MAGNITUDE_WEIGHT: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionAnalysis {
    /// Population variance of the per-pixel flow magnitude.
    pub magnitude_variance: f64,
    /// Shannon entropy (bits) of the 36-bin flow angle histogram.
    pub angle_entropy: f64,
    /// Mean per-pixel flow magnitude.
    pub mean_magnitude: f64,
}

impl MotionAnalysis {
    pub fn variance_score(&self) -> f64 {
        (self.magnitude_variance / VARIANCE_SCALE).clamp(0.0, 1.0)
    }

    pub fn entropy_score(&self) -> f64 {
        (self.angle_entropy / ENTROPY_SCALE).clamp(0.0, 1.0)
    }

    pub fn magnitude_score(&self) -> f64 {
        (self.mean_magnitude / MAGNITUDE_SCALE).clamp(0.0, 1.0)
    }

    pub fn score(&self) -> f64 {
        VARIANCE_WEIGHT * self.variance_score()
            + ENTROPY_WEIGHT * self.entropy_score()
            + MAGNITUDE_WEIGHT * self.magnitude_score()
    }
}

/// Measure flow statistics from `previous` to `current`.
///
/// `previous` is resized to `current`'s dimensions when they differ. Returns
/// `None` when either frame is empty.
pub fn analyze(current: &RgbImage, previous: &RgbImage) -> Option<MotionAnalysis> {
    if current.width() == 0 || current.height() == 0 {
        return None;
    }
    if previous.width() == 0 || previous.height() == 0 {
        return None;
    }

    let next_gray = to_gray(current);
    let mut prev_gray = to_gray(previous);
    if prev_gray.dimensions() != next_gray.dimensions() {
        tracing::warn!(
            previous = ?prev_gray.dimensions(),
            current = ?next_gray.dimensions(),
            "resizing previous frame for optical flow"
        );
        prev_gray = imageops::resize(
            &prev_gray,
            next_gray.width(),
            next_gray.height(),
            FilterType::Triangle,
        );
    }

    let flow = farneback(
        &gray_plane(&prev_gray),
        &gray_plane(&next_gray),
        &FarnebackParams::default(),
    );
    let (magnitude, angle) = flow.to_polar();

    let (mean_magnitude, magnitude_variance) = mean_variance(magnitude.iter().copied());
    let angle_entropy = angle_entropy(&angle);

    let analysis = MotionAnalysis {
        magnitude_variance,
        angle_entropy,
        mean_magnitude,
    };
    tracing::debug!(
        magnitude_variance,
        angle_entropy,
        mean_magnitude,
        score = analysis.score(),
        "motion analysis"
    );
    Some(analysis)
}

/// Motion liveness sub-score; neutral when there is no usable previous frame.
pub fn motion_score(current: &RgbImage, previous: Option<&RgbImage>) -> f64 {
    previous
        .and_then(|prev| analyze(current, prev))
        .map_or(NEUTRAL_MOTION_SCORE, |a| a.score())
}

/// Entropy (bits) of angles in `[0, 2π)` over 36 equal bins, with additive
/// smoothing so empty bins contribute nothing.
pub fn angle_entropy(angles: &[f64]) -> f64 {
    let two_pi = 2.0 * std::f64::consts::PI;
    let mut hist = [0u64; ANGLE_BINS];
    for &a in angles {
        if !(0.0..two_pi).contains(&a) {
            continue;
        }
        let bin = ((a / two_pi * ANGLE_BINS as f64) as usize).min(ANGLE_BINS - 1);
        hist[bin] += 1;
    }

    let total: u64 = hist.iter().sum();
    let denom = total as f64 + SMOOTHING;
    let entropy = -hist
        .iter()
        .map(|&c| {
            let p = c as f64 / denom;
            p * (p + SMOOTHING).log2()
        })
        .sum::<f64>();
    // A single full bin gives p + smoothing > 1 and a tiny negative sum.
    entropy.max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn textured(w: u32, h: u32, shift: f32) -> RgbImage {
        RgbImage::from_fn(w, h, |x, y| {
            let xf = x as f32 - shift;
            let yf = y as f32;
            let v = 128.0 + 60.0 * (xf * 0.35).sin() * (yf * 0.27).cos() + 30.0 * ((xf + yf) * 0.19).sin();
            let v = v.clamp(0.0, 255.0) as u8;
            Rgb([v, v, v])
        })
    }

    #[test]
    fn test_no_previous_frame_is_neutral() {
        let img = textured(48, 48, 0.0);
        assert_eq!(motion_score(&img, None), NEUTRAL_MOTION_SCORE);
        let black = RgbImage::new(10, 10);
        assert_eq!(motion_score(&black, None), NEUTRAL_MOTION_SCORE);
    }

    #[test]
    fn test_empty_previous_frame_is_neutral() {
        let img = textured(48, 48, 0.0);
        let empty = RgbImage::new(0, 0);
        assert_eq!(motion_score(&img, Some(&empty)), NEUTRAL_MOTION_SCORE);
    }

    #[test]
    fn test_identical_frames_score_near_zero() {
        let img = textured(64, 64, 0.0);
        let a = analyze(&img, &img).unwrap();
        assert_eq!(a.mean_magnitude, 0.0);
        assert_eq!(a.magnitude_variance, 0.0);
        assert!((0.0..1e-4).contains(&a.angle_entropy), "entropy {}", a.angle_entropy);
        assert!((0.0..1e-4).contains(&a.score()), "score {}", a.score());
        let s = motion_score(&img, Some(&img));
        assert!((0.0..1e-4).contains(&s), "score {s}");
    }

    #[test]
    fn test_sub_scores_never_negative() {
        let a = MotionAnalysis {
            magnitude_variance: -1e-9,
            angle_entropy: -1.4e-6,
            mean_magnitude: 0.0,
        };
        assert_eq!(a.variance_score(), 0.0);
        assert_eq!(a.entropy_score(), 0.0);
        assert_eq!(a.score(), 0.0);
    }

    #[test]
    fn test_mismatched_previous_is_resized() {
        let current = textured(64, 48, 0.0);
        let previous = textured(128, 96, 0.0);
        let a = analyze(&current, &previous).unwrap();
        assert!((0.0..=1.0).contains(&a.score()));
    }

    #[test]
    fn test_shift_registers_motion() {
        let prev = textured(80, 64, 0.0);
        let next = textured(80, 64, 2.0);
        let a = analyze(&next, &prev).unwrap();
        assert!(a.mean_magnitude > 0.5, "mean magnitude {}", a.mean_magnitude);
        let s = a.score();
        assert!((0.0..=1.0).contains(&s));
    }

    #[test]
    fn test_entropy_single_bin_is_zero() {
        let e = angle_entropy(&vec![0.1; 100]);
        assert!((0.0..1e-4).contains(&e), "entropy {e}");
    }

    #[test]
    fn test_entropy_uniform_bins() {
        let two_pi = 2.0 * std::f64::consts::PI;
        let angles: Vec<f64> = (0..36 * 10)
            .map(|i| (i as f64 + 0.5) / 360.0 * two_pi)
            .collect();
        let e = angle_entropy(&angles);
        assert!((e - 36f64.log2()).abs() < 1e-3, "entropy {e}");
    }

    #[test]
    fn test_entropy_empty() {
        assert_eq!(angle_entropy(&[]), 0.0);
    }
}
