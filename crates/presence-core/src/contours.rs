//! Contour counting on binary images.
//!
//! A full hierarchical border trace of a binary image yields one outer border
//! per 8-connected foreground region and one hole border per 4-connected
//! background region enclosed by foreground. Counting those regions directly
//! gives the same total without tracing chains.

use image::GrayImage;

/// Border counts of a binary image, foreground being any non-zero pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ContourCount {
    /// Outer borders (8-connected foreground components).
    pub outer: usize,
    /// Hole borders (4-connected background components not touching the frame).
    pub holes: usize,
}

impl ContourCount {
    pub fn total(&self) -> usize {
        self.outer + self.holes
    }
}

/// Count every outer and hole border. The image is treated as surrounded by
/// a one-pixel background frame, so foreground touching the edge still has
/// an outer border and background touching the edge is never a hole.
pub fn count_contours(binary: &GrayImage) -> ContourCount {
    let (w, h) = binary.dimensions();
    let (w, h) = (w as usize, h as usize);
    let fg: Vec<bool> = binary.pixels().map(|p| p.0[0] != 0).collect();

    let mut seen = vec![false; w * h];
    let mut stack = Vec::new();
    let mut count = ContourCount::default();

    for start in 0..w * h {
        if seen[start] {
            continue;
        }
        let foreground = fg[start];
        let mut touches_frame = false;
        seen[start] = true;
        stack.push(start);

        while let Some(i) = stack.pop() {
            let (x, y) = (i % w, i / w);
            if x == 0 || y == 0 || x == w - 1 || y == h - 1 {
                touches_frame = true;
            }
            for_each_neighbour(x, y, w, h, foreground, |j| {
                if !seen[j] && fg[j] == foreground {
                    seen[j] = true;
                    stack.push(j);
                }
            });
        }

        if foreground {
            count.outer += 1;
        } else if !touches_frame {
            count.holes += 1;
        }
    }

    count
}

/// Visit 8-neighbours for foreground, 4-neighbours for background.
fn for_each_neighbour(
    x: usize,
    y: usize,
    w: usize,
    h: usize,
    eight: bool,
    mut visit: impl FnMut(usize),
) {
    let (xi, yi) = (x as isize, y as isize);
    for dy in -1isize..=1 {
        for dx in -1isize..=1 {
            if dx == 0 && dy == 0 {
                continue;
            }
            if !eight && dx != 0 && dy != 0 {
                continue;
            }
            let (nx, ny) = (xi + dx, yi + dy);
            if nx < 0 || ny < 0 || nx >= w as isize || ny >= h as isize {
                continue;
            }
            visit(ny as usize * w + nx as usize);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn from_rows(rows: &[&str]) -> GrayImage {
        let h = rows.len() as u32;
        let w = rows[0].len() as u32;
        GrayImage::from_fn(w, h, |x, y| {
            if rows[y as usize].as_bytes()[x as usize] == b'#' {
                Luma([255])
            } else {
                Luma([0])
            }
        })
    }

    #[test]
    fn test_empty_image() {
        let img = GrayImage::new(10, 10);
        assert_eq!(count_contours(&img).total(), 0);
    }

    #[test]
    fn test_full_image_is_one_outer_border() {
        let img = GrayImage::from_pixel(10, 10, Luma([255]));
        assert_eq!(count_contours(&img), ContourCount { outer: 1, holes: 0 });
    }

    #[test]
    fn test_ring_has_outer_and_hole() {
        let img = from_rows(&[
            ".......",
            ".#####.",
            ".#...#.",
            ".#...#.",
            ".#####.",
            ".......",
        ]);
        assert_eq!(count_contours(&img), ContourCount { outer: 1, holes: 1 });
    }

    #[test]
    fn test_nested_hierarchy() {
        // Ring containing a dot: outer, hole, inner outer.
        let img = from_rows(&[
            ".........",
            ".#######.",
            ".#.....#.",
            ".#..#..#.",
            ".#.....#.",
            ".#######.",
            ".........",
        ]);
        assert_eq!(count_contours(&img), ContourCount { outer: 2, holes: 1 });
    }

    #[test]
    fn test_diagonal_foreground_is_connected() {
        let img = from_rows(&["#..", ".#.", "..#"]);
        assert_eq!(count_contours(&img).outer, 1);
    }

    #[test]
    fn test_diagonal_gap_does_not_leak_hole() {
        // The centre background pixel only touches the outside diagonally,
        // so it is an enclosed hole.
        let img = from_rows(&[".....", "..#..", ".#.#.", "..#..", "....."]);
        assert_eq!(count_contours(&img), ContourCount { outer: 1, holes: 1 });
    }

    #[test]
    fn test_background_at_edge_is_not_hole() {
        let img = from_rows(&["#.#", "#.#", "###"]);
        assert_eq!(count_contours(&img), ContourCount { outer: 1, holes: 0 });
    }
}
