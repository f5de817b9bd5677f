//! Depth and shading liveness analysis.
//!
//! A real face is a 3-D surface under directional light: it has strong
//! intensity gradients, an unbalanced split between shadow and highlight,
//! and a fragmented binary structure. A flat reproduction is smoother and
//! more evenly lit.

use crate::contours::count_contours;
use crate::imgops::{gray_plane, mean_variance, sobel, to_gray, Axis, Border};
use image::{GrayImage, Luma, RgbImage};

const SOBEL_APERTURE: usize = 5;
const GRADIENT_SCALE: f64 = 50.0;
const CONTRAST_GAIN: f64 = 5.0;
const CONTOUR_SCALE: f64 = 100.0;

const GRADIENT_WEIGHT: f64 = 0.4;
const CONTRAST_WEIGHT: f64 = 0.3;
const CONTOUR_WEIGHT: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthAnalysis {
    /// Mean Euclidean magnitude of the 5×5 Sobel gradient.
    pub mean_gradient: f64,
    /// Fraction of pixels at or below the Otsu threshold.
    pub dark_ratio: f64,
    /// Fraction of pixels above the Otsu threshold.
    pub bright_ratio: f64,
    /// Outer plus hole borders in the Otsu-binarized crop.
    pub contour_count: usize,
}

impl DepthAnalysis {
    pub fn gradient_score(&self) -> f64 {
        (self.mean_gradient / GRADIENT_SCALE).clamp(0.0, 1.0)
    }

    pub fn contrast_score(&self) -> f64 {
        ((self.dark_ratio - self.bright_ratio).abs() * CONTRAST_GAIN).clamp(0.0, 1.0)
    }

    pub fn contour_score(&self) -> f64 {
        (self.contour_count as f64 / CONTOUR_SCALE).clamp(0.0, 1.0)
    }

    pub fn score(&self) -> f64 {
        GRADIENT_WEIGHT * self.gradient_score()
            + CONTRAST_WEIGHT * self.contrast_score()
            + CONTOUR_WEIGHT * self.contour_score()
    }
}

pub fn analyze(face: &RgbImage) -> DepthAnalysis {
    let gray = to_gray(face);
    let plane = gray_plane(&gray);

    let gx = sobel(&plane, Axis::X, SOBEL_APERTURE, Border::Reflect101);
    let gy = sobel(&plane, Axis::Y, SOBEL_APERTURE, Border::Reflect101);
    let (mean_gradient, _) = mean_variance(
        gx.iter()
            .zip(gy.iter())
            .map(|(x, y)| (x * x + y * y).sqrt()),
    );

    let threshold = otsu_threshold(&gray);
    let binary = binarize(&gray, threshold);
    let total = (gray.width() as f64) * (gray.height() as f64);
    let bright = binary.pixels().filter(|p| p.0[0] == 255).count() as f64;
    let bright_ratio = bright / total;
    let dark_ratio = (total - bright) / total;

    let contour_count = count_contours(&binary).total();

    let analysis = DepthAnalysis {
        mean_gradient,
        dark_ratio,
        bright_ratio,
        contour_count,
    };
    tracing::debug!(
        mean_gradient,
        threshold,
        dark_ratio,
        bright_ratio,
        contour_count,
        score = analysis.score(),
        "depth analysis"
    );
    analysis
}

/// Depth liveness sub-score for a face crop.
pub fn depth_score(face: &RgbImage) -> f64 {
    analyze(face).score()
}

/// Otsu's threshold: the level maximizing between-class variance.
pub fn otsu_threshold(gray: &GrayImage) -> u8 {
    let mut hist = [0u64; 256];
    for p in gray.pixels() {
        hist[p.0[0] as usize] += 1;
    }
    let n = gray.pixels().len() as f64;
    if n == 0.0 {
        return 0;
    }

    let mu: f64 = hist
        .iter()
        .enumerate()
        .map(|(i, &c)| i as f64 * c as f64 / n)
        .sum();

    let eps = f32::EPSILON as f64;
    let (mut q1, mut mu1) = (0.0f64, 0.0f64);
    let (mut max_sigma, mut max_val) = (0.0f64, 0u8);

    for (i, &c) in hist.iter().enumerate() {
        let p_i = c as f64 / n;
        mu1 *= q1;
        q1 += p_i;
        let q2 = 1.0 - q1;

        if q1.min(q2) < eps || q1.max(q2) > 1.0 - eps {
            continue;
        }

        mu1 = (mu1 + i as f64 * p_i) / q1;
        let mu2 = (mu - q1 * mu1) / q2;
        let sigma = q1 * q2 * (mu1 - mu2) * (mu1 - mu2);
        if sigma > max_sigma {
            max_sigma = sigma;
            max_val = i as u8;
        }
    }

    max_val
}

/// 255 where `gray > threshold`, else 0.
pub fn binarize(gray: &GrayImage, threshold: u8) -> GrayImage {
    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        if gray.get_pixel(x, y).0[0] > threshold {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}
