//! Canny edge detection on 8-bit grayscale images.

use crate::imgops::{gray_plane, sobel, Axis, Border};
use image::{GrayImage, Luma};
use ndarray::Array2;

const TAN_22_5: f64 = 0.414_213_562_373_095_05;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Class {
    None,
    Weak,
    Strong,
}

/// Canny edge map (edge pixels = 255) using a 3×3 Sobel aperture, L1
/// gradient magnitude, non-maximum suppression and hysteresis between
/// `low` and `high`.
pub fn canny(gray: &GrayImage, low: f64, high: f64) -> GrayImage {
    let (low, high) = if low > high { (high, low) } else { (low, high) };
    let (w, h) = gray.dimensions();
    let (w, h) = (w as usize, h as usize);

    let plane = gray_plane(gray);
    let dx = sobel(&plane, Axis::X, 3, Border::Replicate);
    let dy = sobel(&plane, Axis::Y, 3, Border::Replicate);
    let mag = Array2::from_shape_fn((h, w), |(y, x)| dx[[y, x]].abs() + dy[[y, x]].abs());

    let at = |y: isize, x: isize| -> f64 {
        if y < 0 || x < 0 || y >= h as isize || x >= w as isize {
            0.0
        } else {
            mag[[y as usize, x as usize]]
        }
    };

    let mut class = Array2::from_elem((h, w), Class::None);
    let mut stack = Vec::new();

    for y in 0..h {
        for x in 0..w {
            let m = mag[[y, x]];
            if m <= low {
                continue;
            }
            let (gx, gy) = (dx[[y, x]], dy[[y, x]]);
            let (ax, ay) = (gx.abs(), gy.abs());
            let (yi, xi) = (y as isize, x as isize);

            let tg22 = ax * TAN_22_5;
            let is_max = if ay < tg22 {
                m > at(yi, xi - 1) && m >= at(yi, xi + 1)
            } else if ay > tg22 + ax * 2.0 {
                m > at(yi - 1, xi) && m >= at(yi + 1, xi)
            } else {
                let s: isize = if (gx < 0.0) != (gy < 0.0) { -1 } else { 1 };
                m > at(yi - 1, xi - s) && m > at(yi + 1, xi + s)
            };
            if !is_max {
                continue;
            }

            if m > high {
                class[[y, x]] = Class::Strong;
                stack.push((y, x));
            } else {
                class[[y, x]] = Class::Weak;
            }
        }
    }

    // Hysteresis: grow strong edges through 8-connected weak pixels.
    while let Some((y, x)) = stack.pop() {
        for ny in y.saturating_sub(1)..=(y + 1).min(h - 1) {
            for nx in x.saturating_sub(1)..=(x + 1).min(w - 1) {
                if class[[ny, nx]] == Class::Weak {
                    class[[ny, nx]] = Class::Strong;
                    stack.push((ny, nx));
                }
            }
        }
    }

    GrayImage::from_fn(w as u32, h as u32, |x, y| {
        if class[[y as usize, x as usize]] == Class::Strong {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}
