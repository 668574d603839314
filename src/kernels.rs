//! Per-pixel stage kernels shared by both backends.
//!
//! Each row kernel writes its entire output row: pixels without full stencil
//! support are written as zero, so a reused buffer never leaks stale values.
//! The valid interior shrinks as stages stack: blur output is valid from
//! offset 2, the gradient from 3 (it must read only blurred pixels), and
//! suppression from 4.

use std::f32::consts::PI;

use crate::config::Thresholds;
use crate::grid::{DirectionCode, DirectionMap, PixelGrid, EDGE};

/// First row/column with full 5x5 blur support.
pub(crate) const BLUR_MARGIN: usize = 2;
/// First row/column where the gradient stencil reads only blurred pixels.
pub(crate) const GRADIENT_MARGIN: usize = BLUR_MARGIN + 1;
/// First row/column where suppression reads only valid magnitudes.
pub(crate) const SUPPRESS_MARGIN: usize = GRADIENT_MARGIN + 1;

/// Pre-normalized 5x5 Gaussian weights (sigma = 1). The matrix sums to one
/// and is never recomputed.
const GAUSSIAN: [[f32; 5]; 5] = [
    [0.00224214, 0.0165673, 0.0165673, 0.0165673, 0.00224214],
    [0.0165673, 0.0450347, 0.122417, 0.0450347, 0.0165673],
    [0.0165673, 0.122417, 0.122417, 0.122417, 0.0165673],
    [0.0165673, 0.0450347, 0.122417, 0.0450347, 0.0165673],
    [0.00224214, 0.0165673, 0.0165673, 0.0165673, 0.00224214],
];

const SOBEL_GX: [[i32; 3]; 3] = [[-1, 0, 1], [-2, 0, 2], [-1, 0, 1]];
const SOBEL_GY: [[i32; 3]; 3] = [[-1, -2, -1], [0, 0, 0], [1, 2, 1]];

/// Relative coordinates of the 8-connected neighborhood.
pub(crate) const NEIGHBOURS: [(isize, isize); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

/// 5x5 weighted blur of one output row, rounded and clamped to [0, 255].
pub(crate) fn smooth_row(input: &PixelGrid, row: usize, out: &mut [u8]) {
    out.fill(0);
    let (rows, cols) = (input.rows(), input.cols());
    if row < BLUR_MARGIN || row + BLUR_MARGIN >= rows || cols < 2 * BLUR_MARGIN + 1 {
        return;
    }
    for col in BLUR_MARGIN..cols - BLUR_MARGIN {
        let mut sum = 0.0f32;
        for (i, weights) in GAUSSIAN.iter().enumerate() {
            let src = input.row(row + i - BLUR_MARGIN);
            for (j, w) in weights.iter().enumerate() {
                sum += *w * f32::from(src[col + j - BLUR_MARGIN]);
            }
        }
        out[col] = sum.round().clamp(0.0, 255.0) as u8;
    }
}

/// Sobel responses for one output row: magnitude plus quantized direction.
pub(crate) fn gradient_row(
    input: &PixelGrid,
    row: usize,
    magnitude: &mut [u8],
    directions: &mut [DirectionCode],
) {
    magnitude.fill(0);
    directions.fill(DirectionCode::Undefined);
    let (rows, cols) = (input.rows(), input.cols());
    if row < GRADIENT_MARGIN || row + GRADIENT_MARGIN >= rows || cols < 2 * GRADIENT_MARGIN + 1 {
        return;
    }
    let stencil = [input.row(row - 1), input.row(row), input.row(row + 1)];
    for col in GRADIENT_MARGIN..cols - GRADIENT_MARGIN {
        let mut gx = 0i32;
        let mut gy = 0i32;
        for (i, src) in stencil.iter().enumerate() {
            for j in 0..3 {
                let p = i32::from(src[col + j - 1]);
                gx += SOBEL_GX[i][j] * p;
                gy += SOBEL_GY[i][j] * p;
            }
        }
        let mag = (gx as f32).hypot(gy as f32).round();
        magnitude[col] = mag.min(255.0) as u8;
        directions[col] = quantize_direction(gx as f32, gy as f32);
    }
}

/// Quantizes a gradient vector to one of four undirected orientations.
///
/// The angle is normalized into [0, 2pi) and the upper half folded down by
/// pi, so opposite vectors land in the same octant. Octant boundaries sit at
/// odd multiples of pi/8.
pub(crate) fn quantize_direction(gx: f32, gy: f32) -> DirectionCode {
    let mut angle = gy.atan2(gx);
    if angle < 0.0 {
        angle += 2.0 * PI;
    }
    if angle >= PI {
        angle -= PI;
    }
    if angle <= PI / 8.0 {
        DirectionCode::Deg0
    } else if angle <= 3.0 * PI / 8.0 {
        DirectionCode::Deg45
    } else if angle <= 5.0 * PI / 8.0 {
        DirectionCode::Deg90
    } else if angle <= 7.0 * PI / 8.0 {
        DirectionCode::Deg135
    } else {
        DirectionCode::Deg0
    }
}

/// Direction-conditioned local-maximum filter for one output row.
///
/// A pixel is zeroed iff either neighbor along its gradient direction has a
/// strictly larger magnitude; ties survive. Undefined directions pass the
/// magnitude through unchanged.
pub(crate) fn suppress_row(
    magnitude: &PixelGrid,
    directions: &DirectionMap,
    row: usize,
    out: &mut [u8],
) {
    out.fill(0);
    let (rows, cols) = (magnitude.rows(), magnitude.cols());
    if row < SUPPRESS_MARGIN || row + SUPPRESS_MARGIN >= rows || cols < 2 * SUPPRESS_MARGIN + 1 {
        return;
    }
    let above = magnitude.row(row - 1);
    let center = magnitude.row(row);
    let below = magnitude.row(row + 1);
    let codes = directions.row(row);
    for col in SUPPRESS_MARGIN..cols - SUPPRESS_MARGIN {
        let m = center[col];
        let keep = match codes[col] {
            DirectionCode::Deg0 => m >= center[col - 1] && m >= center[col + 1],
            DirectionCode::Deg45 => m >= above[col + 1] && m >= below[col - 1],
            DirectionCode::Deg90 => m >= above[col] && m >= below[col],
            DirectionCode::Deg135 => m >= above[col - 1] && m >= below[col + 1],
            DirectionCode::Undefined => true,
        };
        out[col] = if keep { m } else { 0 };
    }
}

/// Marks every pixel reachable from a strong seed through weak pixels.
///
/// Seeds are pixels with magnitude strictly above `thresholds.high`; the
/// chain extends through 8-connected pixels with magnitude at or above
/// `thresholds.low`. The frontier is an explicit stack because recursion
/// depth would otherwise grow with the image diagonal. Traversal order does
/// not affect the final reachability set.
pub(crate) fn flood_trace(magnitude: &PixelGrid, thresholds: Thresholds, out: &mut PixelGrid) {
    out.as_mut_slice().fill(0);
    let (rows, cols) = (magnitude.rows(), magnitude.cols());
    let mut frontier: Vec<(usize, usize)> = Vec::new();
    for row in 0..rows {
        for col in 0..cols {
            if magnitude.get(row, col) > thresholds.high && out.get(row, col) != EDGE {
                out.set(row, col, EDGE);
                frontier.push((row, col));
                expand(magnitude, thresholds.low, out, &mut frontier);
            }
        }
    }
}

fn expand(
    magnitude: &PixelGrid,
    low: u8,
    out: &mut PixelGrid,
    frontier: &mut Vec<(usize, usize)>,
) {
    let (rows, cols) = (magnitude.rows(), magnitude.cols());
    while let Some((row, col)) = frontier.pop() {
        for (dr, dc) in NEIGHBOURS {
            let nr = row as isize + dr;
            let nc = col as isize + dc;
            if nr < 0 || nr >= rows as isize || nc < 0 || nc >= cols as isize {
                continue;
            }
            let (nr, nc) = (nr as usize, nc as usize);
            if magnitude.get(nr, nc) >= low && out.get(nr, nc) != EDGE {
                out.set(nr, nc, EDGE);
                frontier.push((nr, nc));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::noise_grid;

    fn run_smooth(input: &PixelGrid) -> PixelGrid {
        let mut out = PixelGrid::new(input.rows(), input.cols()).unwrap();
        for row in 0..input.rows() {
            smooth_row(input, row, out.row_mut(row));
        }
        out
    }

    fn run_gradient(input: &PixelGrid) -> (PixelGrid, DirectionMap) {
        let mut magnitude = PixelGrid::new(input.rows(), input.cols()).unwrap();
        let mut directions = DirectionMap::new(input.rows(), input.cols()).unwrap();
        for row in 0..input.rows() {
            gradient_row(input, row, magnitude.row_mut(row), directions.row_mut(row));
        }
        (magnitude, directions)
    }

    fn run_suppress(magnitude: &PixelGrid, directions: &DirectionMap) -> PixelGrid {
        let mut out = PixelGrid::new(magnitude.rows(), magnitude.cols()).unwrap();
        for row in 0..magnitude.rows() {
            suppress_row(magnitude, directions, row, out.row_mut(row));
        }
        out
    }

    fn uniform_grid(rows: usize, cols: usize, value: u8) -> PixelGrid {
        let mut grid = PixelGrid::new(rows, cols).unwrap();
        grid.as_mut_slice().fill(value);
        grid
    }

    fn uniform_directions(rows: usize, cols: usize, code: DirectionCode) -> DirectionMap {
        let mut directions = DirectionMap::new(rows, cols).unwrap();
        directions.as_mut_slice().fill(code);
        directions
    }

    #[test]
    fn quantize_follows_octant_table() {
        let cases = [
            (0.0, DirectionCode::Deg0),
            (20.0, DirectionCode::Deg0),
            (25.0, DirectionCode::Deg45),
            (45.0, DirectionCode::Deg45),
            (70.0, DirectionCode::Deg90),
            (90.0, DirectionCode::Deg90),
            (115.0, DirectionCode::Deg135),
            (135.0, DirectionCode::Deg135),
            (160.0, DirectionCode::Deg0),
            (180.0, DirectionCode::Deg0),
        ];
        for (deg, expected) in cases {
            let rad = (deg as f32).to_radians();
            assert_eq!(
                quantize_direction(rad.cos(), rad.sin()),
                expected,
                "angle {deg}"
            );
        }
    }

    #[test]
    fn quantize_is_invariant_under_rotation_by_pi() {
        for deg in 0..360 {
            let rad = (deg as f32).to_radians();
            let (gx, gy) = (rad.cos(), rad.sin());
            assert_eq!(
                quantize_direction(gx, gy),
                quantize_direction(-gx, -gy),
                "angle {deg}"
            );
        }
    }

    #[test]
    fn smooth_preserves_uniform_interior() {
        let smoothed = run_smooth(&uniform_grid(9, 9, 100));
        for row in 0..9 {
            for col in 0..9 {
                let interior = (2..7).contains(&row) && (2..7).contains(&col);
                let expected = if interior { 100 } else { 0 };
                assert_eq!(smoothed.get(row, col), expected, "({row}, {col})");
            }
        }
    }

    #[test]
    fn smooth_clamps_to_byte_range() {
        let smoothed = run_smooth(&uniform_grid(9, 9, 255));
        assert_eq!(smoothed.get(4, 4), 255);
    }

    #[test]
    fn gradient_flags_vertical_step_as_horizontal_gradient() {
        // Columns 6.. carry value 200; the step between columns 5 and 6 runs
        // vertically, so the gradient points along the x axis.
        let mut input = PixelGrid::new(12, 12).unwrap();
        for row in 0..12 {
            for col in 6..12 {
                input.set(row, col, 200);
            }
        }
        let (magnitude, directions) = run_gradient(&input);

        assert_eq!(magnitude.get(6, 5), 255);
        assert_eq!(magnitude.get(6, 6), 255);
        assert_eq!(magnitude.get(6, 3), 0);
        assert_eq!(directions.get(6, 5), DirectionCode::Deg0);
        assert_eq!(directions.get(6, 6), DirectionCode::Deg0);
        // No stencil support at the margin.
        assert_eq!(directions.get(0, 0), DirectionCode::Undefined);
        assert_eq!(directions.get(6, 2), DirectionCode::Undefined);
    }

    #[test]
    fn suppress_thins_a_ridge_to_its_apex() {
        // Column profile 10, 80, 200, 80, 10 centered on column 5.
        let mut magnitude = PixelGrid::new(11, 11).unwrap();
        for row in 0..11 {
            for (col, value) in [(3, 10), (4, 80), (5, 200), (6, 80), (7, 10)] {
                magnitude.set(row, col, value);
            }
        }
        let directions = uniform_directions(11, 11, DirectionCode::Deg0);
        let out = run_suppress(&magnitude, &directions);

        for row in SUPPRESS_MARGIN..11 - SUPPRESS_MARGIN {
            assert_eq!(out.get(row, 5), 200);
            assert_eq!(out.get(row, 4), 0);
            assert_eq!(out.get(row, 6), 0);
        }
    }

    #[test]
    fn suppress_passes_undefined_directions_through() {
        let magnitude = noise_grid(12, 12, 5);
        let directions = uniform_directions(12, 12, DirectionCode::Undefined);
        let out = run_suppress(&magnitude, &directions);
        for row in SUPPRESS_MARGIN..12 - SUPPRESS_MARGIN {
            for col in SUPPRESS_MARGIN..12 - SUPPRESS_MARGIN {
                assert_eq!(out.get(row, col), magnitude.get(row, col));
            }
        }
    }

    #[test]
    fn suppress_is_idempotent() {
        let magnitude = noise_grid(16, 16, 11);
        let mut directions = DirectionMap::new(16, 16).unwrap();
        for (i, code) in directions.as_mut_slice().iter_mut().enumerate() {
            *code = match i % 4 {
                0 => DirectionCode::Deg0,
                1 => DirectionCode::Deg45,
                2 => DirectionCode::Deg90,
                _ => DirectionCode::Deg135,
            };
        }
        let once = run_suppress(&magnitude, &directions);
        let twice = run_suppress(&once, &directions);
        assert_eq!(once, twice);
    }

    #[test]
    fn trace_requires_a_strong_seed() {
        // Everything clears the weak threshold but nothing clears the strong
        // one, so no chain ever starts.
        let magnitude = uniform_grid(10, 10, 60);
        let mut out = PixelGrid::new(10, 10).unwrap();
        flood_trace(&magnitude, Thresholds { high: 80, low: 50 }, &mut out);
        assert!(out.as_slice().iter().all(|&p| p == 0));
    }

    #[test]
    fn trace_extends_weak_chains_but_not_islands() {
        let mut magnitude = PixelGrid::new(12, 12).unwrap();
        magnitude.set(5, 5, 100);
        magnitude.set(5, 6, 55);
        magnitude.set(5, 7, 55);
        magnitude.set(5, 8, 55);
        // Weak pixel with no 8-connected path to the seed.
        magnitude.set(9, 1, 55);

        let mut out = PixelGrid::new(12, 12).unwrap();
        flood_trace(&magnitude, Thresholds { high: 80, low: 50 }, &mut out);

        for col in 5..=8 {
            assert_eq!(out.get(5, col), EDGE);
        }
        assert_eq!(out.get(9, 1), 0);
        let lit = out.as_slice().iter().filter(|&&p| p == EDGE).count();
        assert_eq!(lit, 4);
    }

    #[test]
    fn trace_never_marks_pixels_below_the_weak_threshold() {
        let mut magnitude = PixelGrid::new(8, 8).unwrap();
        magnitude.set(4, 4, 100);
        magnitude.set(4, 5, 55);
        let mut out = PixelGrid::new(8, 8).unwrap();
        flood_trace(&magnitude, Thresholds { high: 80, low: 60 }, &mut out);
        assert_eq!(out.get(4, 4), EDGE);
        assert_eq!(out.get(4, 5), 0);
    }

    /// Queue-based reference: the reachability set must not depend on the
    /// frontier discipline.
    fn breadth_first_trace(magnitude: &PixelGrid, thresholds: Thresholds) -> PixelGrid {
        use std::collections::VecDeque;

        let (rows, cols) = (magnitude.rows(), magnitude.cols());
        let mut out = PixelGrid::new(rows, cols).unwrap();
        let mut frontier = VecDeque::new();
        for row in 0..rows {
            for col in 0..cols {
                if magnitude.get(row, col) > thresholds.high && out.get(row, col) != EDGE {
                    out.set(row, col, EDGE);
                    frontier.push_back((row, col));
                    while let Some((r, c)) = frontier.pop_front() {
                        for (dr, dc) in NEIGHBOURS {
                            let nr = r as isize + dr;
                            let nc = c as isize + dc;
                            if nr < 0 || nr >= rows as isize || nc < 0 || nc >= cols as isize {
                                continue;
                            }
                            let (nr, nc) = (nr as usize, nc as usize);
                            if magnitude.get(nr, nc) >= thresholds.low
                                && out.get(nr, nc) != EDGE
                            {
                                out.set(nr, nc, EDGE);
                                frontier.push_back((nr, nc));
                            }
                        }
                    }
                }
            }
        }
        out
    }

    #[test]
    fn trace_result_is_independent_of_frontier_order() {
        let thresholds = Thresholds { high: 150, low: 60 };
        for seed in [1, 2, 3, 4] {
            let magnitude = noise_grid(32, 32, seed);
            let mut stack_out = PixelGrid::new(32, 32).unwrap();
            flood_trace(&magnitude, thresholds, &mut stack_out);
            let queue_out = breadth_first_trace(&magnitude, thresholds);
            assert_eq!(stack_out, queue_out, "seed {seed}");
        }
    }
}
