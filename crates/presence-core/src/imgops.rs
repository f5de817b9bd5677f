//! Low-level image primitives shared by the liveness scorers.
//!
//! Conventions follow the 8-bit computer-vision defaults the liveness
//! constants were tuned against: BT.601 fixed-point grayscale, HSV with hue
//! halved into `[0, 180)`, correlation (unflipped) kernels, and
//! reflect-101 borders unless a caller asks for replication.

use image::{GrayImage, RgbImage};
use ndarray::Array2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Border {
    /// `gfedcb|abcdefgh|gfedcba`
    Reflect101,
    /// `aaaaaa|abcdefgh|hhhhhhh`
    Replicate,
}

/// Map a possibly out-of-range index into `[0, n)` according to `border`.
pub fn border_index(i: isize, n: usize, border: Border) -> usize {
    let n = n as isize;
    if n == 1 {
        return 0;
    }
    match border {
        Border::Replicate => i.clamp(0, n - 1) as usize,
        Border::Reflect101 => {
            let mut i = i;
            // Loop handles kernels wider than the image.
            while i < 0 || i >= n {
                if i < 0 {
                    i = -i;
                }
                if i >= n {
                    i = 2 * (n - 1) - i;
                }
            }
            i as usize
        }
    }
}

/// RGB → 8-bit luma with the fixed-point BT.601 weights (14-bit shift).
pub fn to_gray(img: &RgbImage) -> GrayImage {
    const R: u32 = 4899;
    const G: u32 = 9617;
    const B: u32 = 1868;
    const SHIFT: u32 = 14;

    GrayImage::from_fn(img.width(), img.height(), |x, y| {
        let p = img.get_pixel(x, y).0;
        let v = (p[0] as u32 * R + p[1] as u32 * G + p[2] as u32 * B + (1 << (SHIFT - 1)))
            >> SHIFT;
        image::Luma([v.min(255) as u8])
    })
}

/// Grayscale image as an `(height, width)` float plane.
pub fn gray_plane(gray: &GrayImage) -> Array2<f64> {
    let (w, h) = gray.dimensions();
    Array2::from_shape_fn((h as usize, w as usize), |(y, x)| {
        gray.get_pixel(x as u32, y as u32).0[0] as f64
    })
}

/// Separable correlation: `kx` runs along rows (x), `ky` along columns (y).
pub fn correlate_separable(
    src: &Array2<f64>,
    kx: &[f64],
    ky: &[f64],
    border: Border,
) -> Array2<f64> {
    let (h, w) = src.dim();
    let rx = (kx.len() / 2) as isize;
    let ry = (ky.len() / 2) as isize;

    let mut tmp = Array2::<f64>::zeros((h, w));
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0;
            for (k, coeff) in kx.iter().enumerate() {
                let sx = border_index(x as isize + k as isize - rx, w, border);
                acc += coeff * src[[y, sx]];
            }
            tmp[[y, x]] = acc;
        }
    }

    let mut out = Array2::<f64>::zeros((h, w));
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0;
            for (k, coeff) in ky.iter().enumerate() {
                let sy = border_index(y as isize + k as isize - ry, h, border);
                acc += coeff * tmp[[sy, x]];
            }
            out[[y, x]] = acc;
        }
    }
    out
}

/// Gradient direction for [`sobel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
}

/// First-order Sobel derivative with a 3×3 or 5×5 aperture.
///
/// # Panics
///
/// Panics if `ksize` is not 3 or 5.
pub fn sobel(src: &Array2<f64>, axis: Axis, ksize: usize, border: Border) -> Array2<f64> {
    let (deriv, smooth): (&[f64], &[f64]) = match ksize {
        3 => (&[-1.0, 0.0, 1.0], &[1.0, 2.0, 1.0]),
        5 => (&[-1.0, -2.0, 0.0, 2.0, 1.0], &[1.0, 4.0, 6.0, 4.0, 1.0]),
        _ => panic!("unsupported Sobel aperture {ksize}"),
    };
    match axis {
        Axis::X => correlate_separable(src, deriv, smooth, border),
        Axis::Y => correlate_separable(src, smooth, deriv, border),
    }
}

/// Normalized 1-D Gaussian kernel. With `sigma <= 0` small apertures use the
/// standard binomial tables and larger ones derive sigma from `ksize`.
pub fn gaussian_kernel(ksize: usize, sigma: f64) -> Vec<f64> {
    if sigma <= 0.0 {
        match ksize {
            1 => return vec![1.0],
            3 => return vec![0.25, 0.5, 0.25],
            5 => return vec![0.0625, 0.25, 0.375, 0.25, 0.0625],
            7 => {
                return vec![
                    0.03125, 0.109375, 0.21875, 0.28125, 0.21875, 0.109375, 0.03125,
                ]
            }
            _ => {}
        }
    }
    let sigma = if sigma > 0.0 {
        sigma
    } else {
        ((ksize as f64 - 1.0) * 0.5 - 1.0) * 0.3 + 0.8
    };
    let half = (ksize as f64 - 1.0) * 0.5;
    let scale = -0.5 / (sigma * sigma);
    let mut kernel: Vec<f64> = (0..ksize)
        .map(|i| {
            let x = i as f64 - half;
            (scale * x * x).exp()
        })
        .collect();
    let sum: f64 = kernel.iter().sum();
    for k in &mut kernel {
        *k /= sum;
    }
    kernel
}

pub fn gaussian_blur(src: &Array2<f64>, ksize: usize, sigma: f64) -> Array2<f64> {
    let kernel = gaussian_kernel(ksize, sigma);
    correlate_separable(src, &kernel, &kernel, Border::Reflect101)
}

/// Bilinear resize with pixel-centre alignment.
pub fn resize_bilinear(src: &Array2<f64>, width: usize, height: usize) -> Array2<f64> {
    let (sh, sw) = src.dim();
    if sh == height && sw == width {
        return src.clone();
    }

    let axis_taps = |dst_len: usize, src_len: usize| -> Vec<(usize, usize, f64)> {
        let scale = src_len as f64 / dst_len as f64;
        (0..dst_len)
            .map(|d| {
                let f = (d as f64 + 0.5) * scale - 0.5;
                let mut i0 = f.floor() as isize;
                let mut frac = f - i0 as f64;
                if i0 < 0 {
                    i0 = 0;
                    frac = 0.0;
                }
                let i0 = i0 as usize;
                if i0 >= src_len - 1 {
                    (src_len - 1, src_len - 1, 0.0)
                } else {
                    (i0, i0 + 1, frac)
                }
            })
            .collect()
    };

    let xs = axis_taps(width, sw);
    let ys = axis_taps(height, sh);

    Array2::from_shape_fn((height, width), |(y, x)| {
        let (y0, y1, fy) = ys[y];
        let (x0, x1, fx) = xs[x];
        let top = src[[y0, x0]] * (1.0 - fx) + src[[y0, x1]] * fx;
        let bottom = src[[y1, x0]] * (1.0 - fx) + src[[y1, x1]] * fx;
        top * (1.0 - fy) + bottom * fy
    })
}

/// 8-bit RGB → HSV with `H ∈ [0, 180)`, `S, V ∈ [0, 255]`.
pub fn rgb_to_hsv(r: u8, g: u8, b: u8) -> [u8; 3] {
    let (rf, gf, bf) = (r as f64, g as f64, b as f64);
    let v = rf.max(gf).max(bf);
    let min = rf.min(gf).min(bf);
    let diff = v - min;

    let s = if v > 0.0 { diff * 255.0 / v } else { 0.0 };

    let h = if diff == 0.0 {
        0.0
    } else if v == rf {
        60.0 * (gf - bf) / diff
    } else if v == gf {
        120.0 + 60.0 * (bf - rf) / diff
    } else {
        240.0 + 60.0 * (rf - gf) / diff
    };

    let mut h = (h / 2.0).round();
    if h < 0.0 {
        h += 180.0;
    }
    if h >= 180.0 {
        h -= 180.0;
    }

    [h as u8, s.round().min(255.0) as u8, v as u8]
}

/// Round half to even, matching the rounding used to size pyramid kernels.
pub fn round_half_even(x: f64) -> i64 {
    let r = x.round();
    if (x - x.trunc()).abs() == 0.5 {
        let t = x.trunc() as i64;
        if t % 2 == 0 {
            t
        } else {
            r as i64
        }
    } else {
        r as i64
    }
}

/// Population mean and variance. Both are zero for an empty input.
pub fn mean_variance<I>(values: I) -> (f64, f64)
where
    I: IntoIterator<Item = f64>,
{
    // Welford's update keeps the variance stable for large counts.
    let mut n = 0usize;
    let mut mean = 0.0;
    let mut m2 = 0.0;
    for v in values {
        n += 1;
        let delta = v - mean;
        mean += delta / n as f64;
        m2 += delta * (v - mean);
    }
    if n == 0 {
        (0.0, 0.0)
    } else {
        (mean, m2 / n as f64)
    }
}
