//! Micro-texture liveness analysis.
//!
//! Printed photographs and screens flatten the fine texture of skin: local
//! binary patterns vary less, the spectrum loses high-frequency energy, there
//! are fewer edges and the colour distribution is narrower. Each cue is
//! normalized and capped at 1.0 before the equal-weight sum.

use crate::edges::canny;
use crate::imgops::{mean_variance, rgb_to_hsv, to_gray};
use image::{GrayImage, RgbImage};

const LBP_VARIANCE_SCALE: f64 = 1000.0;
const HIGH_FREQ_RATIO_GAIN: f64 = 10.0;
const EDGE_DENSITY_GAIN: f64 = 20.0;
const HISTOGRAM_VARIANCE_SCALE: f64 = 10000.0;
const SUB_SCORE_WEIGHT: f64 = 0.25;

const CANNY_LOW: f64 = 50.0;
const CANNY_HIGH: f64 = 150.0;

const HUE_BINS: usize = 50;
const HUE_RANGE: f64 = 180.0;
const SAT_BINS: usize = 60;
const SAT_RANGE: f64 = 256.0;

/// Raw texture measurements for one face crop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextureAnalysis {
    /// Population variance of the 8-neighbour LBP codes.
    pub lbp_variance: f64,
    /// Share of spectral magnitude in the top and bottom quarter-height bands.
    pub high_freq_ratio: f64,
    /// Fraction of pixels marked as Canny edges.
    pub edge_density: f64,
    /// Population variance of the hue × saturation histogram bin counts.
    pub histogram_variance: f64,
}

impl TextureAnalysis {
    pub fn lbp_score(&self) -> f64 {
        (self.lbp_variance / LBP_VARIANCE_SCALE).clamp(0.0, 1.0)
    }

    pub fn frequency_score(&self) -> f64 {
        (self.high_freq_ratio * HIGH_FREQ_RATIO_GAIN).clamp(0.0, 1.0)
    }

    pub fn edge_score(&self) -> f64 {
        (self.edge_density * EDGE_DENSITY_GAIN).clamp(0.0, 1.0)
    }

    pub fn color_score(&self) -> f64 {
        (self.histogram_variance / HISTOGRAM_VARIANCE_SCALE).clamp(0.0, 1.0)
    }

    /// Weighted liveness sub-score in `[0, 1]`.
    pub fn score(&self) -> f64 {
        SUB_SCORE_WEIGHT
            * (self.lbp_score() + self.frequency_score() + self.edge_score() + self.color_score())
    }
}

/// Measure all four texture cues. The crop must be non-empty.
pub fn analyze(face: &RgbImage) -> TextureAnalysis {
    let gray = to_gray(face);
    let pixels = (gray.width() as f64) * (gray.height() as f64);

    let (_, lbp_variance) = mean_variance(lbp_codes(&gray).into_iter().map(f64::from));
    let high_freq_ratio = high_frequency_ratio(&gray);

    let edges = canny(&gray, CANNY_LOW, CANNY_HIGH);
    let edge_pixels = edges.pixels().filter(|p| p.0[0] > 0).count();
    let edge_density = edge_pixels as f64 / pixels;

    let histogram = hue_saturation_histogram(face);
    let (_, histogram_variance) = mean_variance(histogram.into_iter().map(f64::from));

    let analysis = TextureAnalysis {
        lbp_variance,
        high_freq_ratio,
        edge_density,
        histogram_variance,
    };
    tracing::debug!(
        lbp_variance,
        high_freq_ratio,
        edge_density,
        histogram_variance,
        score = analysis.score(),
        "texture analysis"
    );
    analysis
}

/// Texture liveness sub-score for a face crop.
pub fn texture_score(face: &RgbImage) -> f64 {
    analyze(face).score()
}

/// 8-neighbour local binary pattern codes for every interior pixel, in
/// row-major order. Bit 7 is the top-left neighbour, then clockwise; a bit is
/// set when the neighbour is strictly brighter than the centre.
pub fn lbp_codes(gray: &GrayImage) -> Vec<u8> {
    let (w, h) = gray.dimensions();
    if w < 3 || h < 3 {
        return Vec::new();
    }

    // (dx, dy) for bits 7..=0
    const NEIGHBOURS: [(i32, i32); 8] = [
        (-1, -1),
        (0, -1),
        (1, -1),
        (1, 0),
        (1, 1),
        (0, 1),
        (-1, 1),
        (-1, 0),
    ];

    let px = |x: u32, y: u32| gray.get_pixel(x, y).0[0];
    let mut codes = Vec::with_capacity(((w - 2) * (h - 2)) as usize);
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let center = px(x, y);
            let mut code = 0u8;
            for (i, (dx, dy)) in NEIGHBOURS.iter().enumerate() {
                let n = px((x as i32 + dx) as u32, (y as i32 + dy) as u32);
                if n > center {
                    code |= 1 << (7 - i);
                }
            }
            codes.push(code);
        }
    }
    codes
}

/// Ratio of 2-D DFT magnitude found in the outer row bands of the
/// centre-shifted spectrum to the total magnitude.
///
/// With `c = rows / 2`, the bands are shifted rows `[0, c/2)` and
/// `[c + c/2, rows)` across all columns.
pub fn high_frequency_ratio(gray: &GrayImage) -> f64 {
    let row_sums = spectrum_row_magnitudes(gray);
    let h = row_sums.len();
    let center = h / 2;
    let top_end = center / 2;
    let bottom_start = center + center / 2;

    // fftshift moves frequency row k to (k + h/2) % h.
    let shifted = |i: usize| row_sums[(i + h - center) % h];

    let high: f64 = (0..top_end).chain(bottom_start..h).map(shifted).sum();
    let total: f64 = row_sums.iter().sum();
    high / (total + 1e-6)
}

/// Sum of |F(v, u)| over u for every frequency row v of the unshifted DFT.
fn spectrum_row_magnitudes(gray: &GrayImage) -> Vec<f64> {
    let (w, h) = gray.dimensions();
    let (w, h) = (w as usize, h as usize);

    let twiddles = |n: usize| -> Vec<(f64, f64)> {
        (0..n)
            .map(|k| {
                let theta = -2.0 * std::f64::consts::PI * k as f64 / n as f64;
                (theta.cos(), theta.sin())
            })
            .collect()
    };
    let tw_x = twiddles(w);
    let tw_y = twiddles(h);

    // Row transforms of the real input.
    let mut rows = vec![(0.0f64, 0.0f64); w * h];
    for y in 0..h {
        for u in 0..w {
            let (mut re, mut im) = (0.0, 0.0);
            for x in 0..w {
                let v = gray.get_pixel(x as u32, y as u32).0[0] as f64;
                let (c, s) = tw_x[(u * x) % w];
                re += v * c;
                im += v * s;
            }
            rows[y * w + u] = (re, im);
        }
    }

    // Column transforms, accumulating magnitudes per output row.
    let mut sums = vec![0.0f64; h];
    for u in 0..w {
        for (v, sum) in sums.iter_mut().enumerate() {
            let (mut re, mut im) = (0.0, 0.0);
            for y in 0..h {
                let (a, b) = rows[y * w + u];
                let (c, s) = tw_y[(v * y) % h];
                re += a * c - b * s;
                im += a * s + b * c;
            }
            *sum += (re * re + im * im).sqrt();
        }
    }
    sums
}

/// Hue (50 bins over [0, 180)) × saturation (60 bins over [0, 256)) counts.
pub fn hue_saturation_histogram(face: &RgbImage) -> Vec<u32> {
    let mut hist = vec![0u32; HUE_BINS * SAT_BINS];
    for p in face.pixels() {
        let [h, s, _] = rgb_to_hsv(p.0[0], p.0[1], p.0[2]);
        let hb = ((h as f64 * HUE_BINS as f64 / HUE_RANGE) as usize).min(HUE_BINS - 1);
        let sb = ((s as f64 * SAT_BINS as f64 / SAT_RANGE) as usize).min(SAT_BINS - 1);
        hist[hb * SAT_BINS + sb] += 1;
    }
    hist
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb};

    /// Deterministic pseudo-random generator so synthetic textures are stable.
    fn lcg(seed: &mut u32) -> u32 {
        *seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        (*seed >> 16) & 0x7fff
    }

    fn noisy_skin(w: u32, h: u32) -> RgbImage {
        let mut seed = 7;
        RgbImage::from_fn(w, h, |_, _| {
            let n = lcg(&mut seed);
            let base = 60 + (n % 160) as u8;
            Rgb([base, base.saturating_sub(30), base.saturating_sub(50)])
        })
    }

    fn flat_print(w: u32, h: u32) -> RgbImage {
        // Gentle horizontal gradient: neighbours rarely differ.
        RgbImage::from_fn(w, h, |x, _| {
            let v = 120 + (x * 8 / w) as u8;
            Rgb([v, v - 20, v - 40])
        })
    }

    #[test]
    fn test_lbp_code_bit_order() {
        // Only the top-left neighbour is brighter → bit 7.
        let mut g = GrayImage::from_pixel(3, 3, Luma([10]));
        g.put_pixel(0, 0, Luma([200]));
        assert_eq!(lbp_codes(&g), vec![0b1000_0000]);

        // Only the left neighbour → bit 0.
        let mut g = GrayImage::from_pixel(3, 3, Luma([10]));
        g.put_pixel(0, 1, Luma([200]));
        assert_eq!(lbp_codes(&g), vec![0b0000_0001]);

        // Only the right neighbour → bit 4.
        let mut g = GrayImage::from_pixel(3, 3, Luma([10]));
        g.put_pixel(2, 1, Luma([200]));
        assert_eq!(lbp_codes(&g), vec![0b0001_0000]);
    }

    #[test]
    fn test_lbp_equal_neighbours_not_set() {
        let g = GrayImage::from_pixel(5, 4, Luma([77]));
        let codes = lbp_codes(&g);
        assert_eq!(codes.len(), 3 * 2);
        assert!(codes.iter().all(|&c| c == 0));
    }

    #[test]
    fn test_lbp_too_small() {
        assert!(lbp_codes(&GrayImage::new(2, 10)).is_empty());
    }

    #[test]
    fn test_uniform_crop_has_no_high_frequency() {
        let g = GrayImage::from_pixel(16, 16, Luma([128]));
        assert!(high_frequency_ratio(&g) < 1e-9);
    }

    #[test]
    fn test_row_alternation_is_all_high_frequency_band() {
        // Rows alternate 0/255: energy at DC and at the Nyquist row, which the
        // shift places at row 0, inside the top band.
        let g = GrayImage::from_fn(16, 16, |_, y| if y % 2 == 0 { Luma([0]) } else { Luma([255]) });
        let ratio = high_frequency_ratio(&g);
        assert!((ratio - 0.5).abs() < 1e-6, "ratio = {ratio}");
    }

    #[test]
    fn test_column_alternation_is_ignored() {
        // Column-only detail sits in the centre row of the shifted spectrum,
        // outside the row bands.
        let g = GrayImage::from_fn(16, 16, |x, _| if x % 2 == 0 { Luma([0]) } else { Luma([255]) });
        assert!(high_frequency_ratio(&g) < 1e-6);
    }

    #[test]
    fn test_histogram_counts_every_pixel() {
        let img = noisy_skin(20, 15);
        let hist = hue_saturation_histogram(&img);
        assert_eq!(hist.len(), 3000);
        assert_eq!(hist.iter().sum::<u32>(), 300);
    }

    #[test]
    fn test_uniform_crop_scores() {
        let img = RgbImage::from_pixel(160, 160, Rgb([128, 128, 128]));
        let a = analyze(&img);
        assert_eq!(a.lbp_variance, 0.0);
        assert_eq!(a.edge_density, 0.0);
        assert!(a.frequency_score() < 1e-6);
        // All 25600 pixels fall into one bin → bin-count variance far above the cap.
        assert_eq!(a.color_score(), 1.0);
        assert!((a.score() - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_score_in_unit_range() {
        for img in [noisy_skin(48, 48), flat_print(48, 48), noisy_skin(7, 31)] {
            let s = texture_score(&img);
            assert!((0.0..=1.0).contains(&s), "score {s}");
        }
    }

    #[test]
    fn test_skin_lbp_outranks_print_across_sizes() {
        let skin = analyze(&noisy_skin(64, 64));
        let print = analyze(&flat_print(48, 40));
        assert!(
            skin.lbp_score() > print.lbp_score(),
            "skin {} vs print {}",
            skin.lbp_score(),
            print.lbp_score()
        );
    }
}
