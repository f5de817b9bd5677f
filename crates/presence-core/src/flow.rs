//! Dense optical flow by polynomial expansion (Farnebäck, 2003).
//!
//! Each pixel neighbourhood of both frames is approximated by a quadratic
//! polynomial. The displacement that best maps one expansion onto the other
//! is solved per pixel over a box window, refined over several iterations and
//! propagated coarse-to-fine through an image pyramid.

use crate::imgops::{gaussian_blur, resize_bilinear, round_half_even};
use ndarray::{Array2, Array3};

/// Pyramid levels below this side length are not built.
const MIN_PYRAMID_SIZE: f64 = 32.0;

/// Pixels closer than this to the border get down-weighted constraints.
const BORDER: usize = 5;
const BORDER_WEIGHTS: [f64; BORDER] = [0.14, 0.14, 0.4472, 0.4472, 0.4472];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FarnebackParams {
    /// Scale between consecutive pyramid layers (< 1).
    pub pyr_scale: f64,
    /// Number of pyramid layers requested on top of the full-resolution image.
    pub levels: usize,
    /// Side of the averaging window.
    pub win_size: usize,
    /// Refinement iterations per pyramid layer.
    pub iterations: usize,
    /// Neighbourhood radius of the polynomial expansion.
    pub poly_n: usize,
    /// Gaussian sigma weighting the polynomial fit.
    pub poly_sigma: f64,
}

impl Default for FarnebackParams {
    fn default() -> Self {
        Self {
            pyr_scale: 0.5,
            levels: 3,
            win_size: 15,
            iterations: 3,
            poly_n: 5,
            poly_sigma: 1.2,
        }
    }
}

/// Per-pixel displacement from the previous frame to the next one.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowField {
    pub dx: Array2<f64>,
    pub dy: Array2<f64>,
}

impl FlowField {
    pub fn zeros(height: usize, width: usize) -> Self {
        Self {
            dx: Array2::zeros((height, width)),
            dy: Array2::zeros((height, width)),
        }
    }

    pub fn dim(&self) -> (usize, usize) {
        self.dx.dim()
    }

    /// Magnitude and angle (radians in `[0, 2π)`) of every displacement, row-major.
    /// Zero vectors report angle 0.
    pub fn to_polar(&self) -> (Vec<f64>, Vec<f64>) {
        let two_pi = 2.0 * std::f64::consts::PI;
        self.dx
            .iter()
            .zip(self.dy.iter())
            .map(|(&x, &y)| {
                let magnitude = (x * x + y * y).sqrt();
                let mut angle = if x == 0.0 && y == 0.0 { 0.0 } else { y.atan2(x) };
                if angle < 0.0 {
                    angle += two_pi;
                }
                if angle >= two_pi {
                    angle = 0.0;
                }
                (magnitude, angle)
            })
            .unzip()
    }

    /// Bilinear resize of both components, scaling vectors by `factor`.
    fn upscale(&self, width: usize, height: usize, factor: f64) -> Self {
        Self {
            dx: resize_bilinear(&self.dx, width, height) * factor,
            dy: resize_bilinear(&self.dy, width, height) * factor,
        }
    }
}

/// Dense flow from `prev` to `next`. Both planes must share one shape.
///
/// # Panics
///
/// Panics if the planes differ in shape.
pub fn farneback(prev: &Array2<f64>, next: &Array2<f64>, params: &FarnebackParams) -> FlowField {
    assert_eq!(prev.dim(), next.dim(), "flow frames must share one shape");
    let (rows, cols) = prev.dim();

    let mut levels = 0;
    let mut scale = 1.0;
    while levels < params.levels {
        scale *= params.pyr_scale;
        if (cols as f64) * scale < MIN_PYRAMID_SIZE || (rows as f64) * scale < MIN_PYRAMID_SIZE {
            break;
        }
        levels += 1;
    }

    let basis = PolyBasis::new(params.poly_n, params.poly_sigma);
    let mut flow: Option<FlowField> = None;

    for k in (0..=levels).rev() {
        let scale = params.pyr_scale.powi(k as i32);
        let sigma = (1.0 / scale - 1.0) * 0.5;
        let smooth = (round_half_even(sigma * 5.0) | 1).max(3) as usize;
        let width = round_half_even(cols as f64 * scale) as usize;
        let height = round_half_even(rows as f64 * scale) as usize;

        let mut current = match flow.take() {
            Some(coarse) => coarse.upscale(width, height, 1.0 / params.pyr_scale),
            None => FlowField::zeros(height, width),
        };

        let expand = |img: &Array2<f64>| {
            let blurred = gaussian_blur(img, smooth, sigma);
            let resized = resize_bilinear(&blurred, width, height);
            basis.expand(&resized)
        };
        let r0 = expand(prev);
        let r1 = expand(next);

        let mut m = update_matrices(&r0, &r1, &current);
        for i in 0..params.iterations {
            current = solve_flow(&m, params.win_size);
            if i + 1 < params.iterations {
                m = update_matrices(&r0, &r1, &current);
            }
        }

        tracing::trace!(level = k, width, height, "farneback level done");
        flow = Some(current);
    }

    flow.unwrap_or_else(|| FlowField::zeros(rows, cols))
}

/// Gaussian-weighted quadratic basis for the polynomial expansion.
struct PolyBasis {
    n: usize,
    g: Vec<f64>,
    xg: Vec<f64>,
    xxg: Vec<f64>,
    ig11: f64,
    ig03: f64,
    ig33: f64,
    ig55: f64,
}

impl PolyBasis {
    fn new(n: usize, sigma: f64) -> Self {
        let sigma = if sigma < f64::EPSILON { n as f64 * 0.3 } else { sigma };
        let ni = n as isize;

        let mut g: Vec<f64> = (-ni..=ni)
            .map(|x| (-((x * x) as f64) / (2.0 * sigma * sigma)).exp())
            .collect();
        let sum: f64 = g.iter().sum();
        for v in &mut g {
            *v /= sum;
        }
        let xg: Vec<f64> = (-ni..=ni).zip(&g).map(|(x, g)| x as f64 * g).collect();
        let xxg: Vec<f64> = (-ni..=ni)
            .zip(&g)
            .map(|(x, g)| (x * x) as f64 * g)
            .collect();

        // Gram matrix entries of the basis {1, x, y, x², y², xy}.
        let (mut g00, mut g11, mut g33, mut g55) = (0.0, 0.0, 0.0, 0.0);
        for y in -ni..=ni {
            for x in -ni..=ni {
                let w = g[(y + ni) as usize] * g[(x + ni) as usize];
                let (xf, yf) = (x as f64, y as f64);
                g00 += w;
                g11 += w * xf * xf;
                g33 += w * xf * xf * xf * xf;
                g55 += w * xf * xf * yf * yf;
            }
        }

        // {1, x², y²} couple; x, y and xy are independent.
        let inv = invert3([[g00, g11, g11], [g11, g33, g55], [g11, g55, g33]]);

        Self {
            n,
            g,
            xg,
            xxg,
            ig11: 1.0 / g11,
            ig03: inv[0][1],
            ig33: inv[1][1],
            ig55: 1.0 / g55,
        }
    }

    /// Five expansion coefficients per pixel, stored as
    /// `[y-linear, x-linear, y², x², xy]`.
    fn expand(&self, src: &Array2<f64>) -> Array3<f64> {
        let (height, width) = src.dim();
        let n = self.n;
        let mut dst = Array3::<f64>::zeros((height, width, 5));

        // Vertical pass results for one row, with n pixels of replicated padding each side.
        let mut row = vec![[0.0f64; 3]; width + 2 * n];

        for y in 0..height {
            for x in 0..width {
                row[x + n] = [src[[y, x]] * self.g[n], 0.0, 0.0];
            }
            for k in 1..=n {
                let up = src.row(y.saturating_sub(k));
                let down = src.row((y + k).min(height - 1));
                for x in 0..width {
                    let p = up[x] + down[x];
                    let r = &mut row[x + n];
                    r[0] += self.g[n + k] * p;
                    r[1] += self.xg[n + k] * (down[x] - up[x]);
                    r[2] += self.xxg[n + k] * p;
                }
            }
            for k in 0..n {
                row[k] = row[n];
                row[width + n + k] = row[width + n - 1];
            }

            for x in 0..width {
                let c = x + n;
                let mut b1 = row[c][0] * self.g[n];
                let mut b2 = 0.0;
                let mut b3 = row[c][1] * self.g[n];
                let mut b4 = 0.0;
                let mut b5 = row[c][2] * self.g[n];
                let mut b6 = 0.0;
                for k in 1..=n {
                    let (right, left) = (row[c + k], row[c - k]);
                    let tg = right[0] + left[0];
                    b1 += tg * self.g[n + k];
                    b4 += tg * self.xxg[n + k];
                    b2 += (right[0] - left[0]) * self.xg[n + k];
                    b3 += (right[1] + left[1]) * self.g[n + k];
                    b6 += (right[1] - left[1]) * self.xg[n + k];
                    b5 += (right[2] + left[2]) * self.g[n + k];
                }

                dst[[y, x, 0]] = b3 * self.ig11;
                dst[[y, x, 1]] = b2 * self.ig11;
                dst[[y, x, 2]] = b1 * self.ig03 + b5 * self.ig33;
                dst[[y, x, 3]] = b1 * self.ig03 + b4 * self.ig33;
                dst[[y, x, 4]] = b6 * self.ig55;
            }
        }
        dst
    }
}

/// Per-pixel normal-equation terms `[G11, G12, G22, h1, h2]` for the current flow.
fn update_matrices(r0: &Array3<f64>, r1: &Array3<f64>, flow: &FlowField) -> Array3<f64> {
    let (height, width, _) = r0.dim();
    let mut m = Array3::<f64>::zeros((height, width, 5));

    for y in 0..height {
        for x in 0..width {
            let dx = flow.dx[[y, x]];
            let dy = flow.dy[[y, x]];
            let fx = x as f64 + dx;
            let fy = y as f64 + dy;
            let x1 = fx.floor();
            let y1 = fy.floor();
            let (ax, ay) = (fx - x1, fy - y1);

            let inside = x1 >= 0.0
                && y1 >= 0.0
                && x1 <= (width - 1) as f64
                && y1 <= (height - 1) as f64;

            let (s0, s1, r4, r5, r6) = if inside {
                let (xi, yi) = (x1 as usize, y1 as usize);
                let xn = (xi + 1).min(width - 1);
                let yn = (yi + 1).min(height - 1);
                let a00 = (1.0 - ax) * (1.0 - ay);
                let a01 = ax * (1.0 - ay);
                let a10 = (1.0 - ax) * ay;
                let a11 = ax * ay;
                let sample = |c: usize| {
                    a00 * r1[[yi, xi, c]]
                        + a01 * r1[[yi, xn, c]]
                        + a10 * r1[[yn, xi, c]]
                        + a11 * r1[[yn, xn, c]]
                };
                (
                    sample(0),
                    sample(1),
                    (r0[[y, x, 2]] + sample(2)) * 0.5,
                    (r0[[y, x, 3]] + sample(3)) * 0.5,
                    (r0[[y, x, 4]] + sample(4)) * 0.25,
                )
            } else {
                (
                    0.0,
                    0.0,
                    r0[[y, x, 2]],
                    r0[[y, x, 3]],
                    r0[[y, x, 4]] * 0.5,
                )
            };

            let r2 = (r0[[y, x, 0]] - s0) * 0.5 + r4 * dy + r6 * dx;
            let r3 = (r0[[y, x, 1]] - s1) * 0.5 + r6 * dy + r5 * dx;

            let mut scale = 1.0f64;
            if x < BORDER {
                scale *= BORDER_WEIGHTS[x];
            }
            if x + BORDER >= width {
                scale *= BORDER_WEIGHTS[width - x - 1];
            }
            if y < BORDER {
                scale *= BORDER_WEIGHTS[y];
            }
            if y + BORDER >= height {
                scale *= BORDER_WEIGHTS[height - y - 1];
            }
            let (r2, r3, r4, r5, r6) = (r2 * scale, r3 * scale, r4 * scale, r5 * scale, r6 * scale);

            m[[y, x, 0]] = r4 * r4 + r6 * r6;
            m[[y, x, 1]] = (r4 + r5) * r6;
            m[[y, x, 2]] = r5 * r5 + r6 * r6;
            m[[y, x, 3]] = r4 * r2 + r6 * r3;
            m[[y, x, 4]] = r6 * r2 + r5 * r3;
        }
    }
    m
}

/// Box-average the normal equations over `win_size` and solve the 2×2 system.
fn solve_flow(m: &Array3<f64>, win_size: usize) -> FlowField {
    let (height, width, _) = m.dim();
    let half = (win_size / 2) as isize;
    let scale = 1.0 / (win_size * win_size) as f64;

    // Vertical running sums with replicated rows.
    let mut vsum = Array3::<f64>::zeros((height, width, 5));
    for x in 0..width {
        for c in 0..5 {
            let mut acc = 0.0;
            for k in -half..=half {
                acc += m[[k.clamp(0, height as isize - 1) as usize, x, c]];
            }
            vsum[[0, x, c]] = acc;
            for y in 1..height {
                let leaving = (y as isize - half - 1).clamp(0, height as isize - 1) as usize;
                let entering = (y as isize + half).clamp(0, height as isize - 1) as usize;
                acc += m[[entering, x, c]] - m[[leaving, x, c]];
                vsum[[y, x, c]] = acc;
            }
        }
    }

    let mut flow = FlowField::zeros(height, width);
    let mut hsum = [0.0f64; 5];
    for y in 0..height {
        for (c, h) in hsum.iter_mut().enumerate() {
            *h = (-half..=half)
                .map(|k| vsum[[y, k.clamp(0, width as isize - 1) as usize, c]])
                .sum();
        }
        for x in 0..width {
            if x > 0 {
                let leaving = (x as isize - half - 1).clamp(0, width as isize - 1) as usize;
                let entering = (x as isize + half).clamp(0, width as isize - 1) as usize;
                for (c, h) in hsum.iter_mut().enumerate() {
                    *h += vsum[[y, entering, c]] - vsum[[y, leaving, c]];
                }
            }
            let g11 = hsum[0] * scale;
            let g12 = hsum[1] * scale;
            let g22 = hsum[2] * scale;
            let h1 = hsum[3] * scale;
            let h2 = hsum[4] * scale;

            let idet = 1.0 / (g11 * g22 - g12 * g12 + 1e-3);
            flow.dx[[y, x]] = (g11 * h2 - g12 * h1) * idet;
            flow.dy[[y, x]] = (g22 * h1 - g12 * h2) * idet;
        }
    }
    flow
}

/// Inverse of a symmetric 3×3 matrix via cofactors.
fn invert3(a: [[f64; 3]; 3]) -> [[f64; 3]; 3] {
    let c00 = a[1][1] * a[2][2] - a[1][2] * a[2][1];
    let c01 = a[1][2] * a[2][0] - a[1][0] * a[2][2];
    let c02 = a[1][0] * a[2][1] - a[1][1] * a[2][0];
    let det = a[0][0] * c00 + a[0][1] * c01 + a[0][2] * c02;
    let inv_det = 1.0 / det;

    let c10 = a[0][2] * a[2][1] - a[0][1] * a[2][2];
    let c11 = a[0][0] * a[2][2] - a[0][2] * a[2][0];
    let c12 = a[0][1] * a[2][0] - a[0][0] * a[2][1];
    let c20 = a[0][1] * a[1][2] - a[0][2] * a[1][1];
    let c21 = a[0][2] * a[1][0] - a[0][0] * a[1][2];
    let c22 = a[0][0] * a[1][1] - a[0][1] * a[1][0];

    [
        [c00 * inv_det, c10 * inv_det, c20 * inv_det],
        [c01 * inv_det, c11 * inv_det, c21 * inv_det],
        [c02 * inv_det, c12 * inv_det, c22 * inv_det],
    ]
}
