//! The compute-backend seam: one stage contract, two conforming
//! implementations.
//!
//! Correctness tests run once against [`ComputeBackend`] and are
//! parameterized over implementations; both must produce byte-identical
//! output for the same input.

use std::fmt;

use log::debug;
use rayon::prelude::*;

use crate::config::Thresholds;
use crate::error::{Error, Result};
use crate::grid::{DirectionMap, PixelGrid, EDGE};
use crate::kernels;

/// Identifies one pipeline stage for dispatch bookkeeping and diagnostics.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Stage {
    /// 5x5 weighted blur.
    Smooth,
    /// Sobel responses with quantized direction.
    Gradient,
    /// Direction-conditioned local-maximum filter.
    Suppress,
    /// Dual-threshold hysteresis tracing.
    Trace,
}

impl Stage {
    /// All stages, in pipeline order.
    pub const ALL: [Stage; 4] = [Stage::Smooth, Stage::Gradient, Stage::Suppress, Stage::Trace];
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Smooth => "smooth",
            Stage::Gradient => "gradient",
            Stage::Suppress => "suppress",
            Stage::Trace => "trace",
        };
        f.write_str(name)
    }
}

/// Executes stage kernels against grid buffers.
///
/// Dispatch methods block until the stage's writes are complete; a stage's
/// output buffer is fully materialized when the call returns.
pub trait ComputeBackend: Send + Sync {
    /// Short name used in diagnostics.
    fn name(&self) -> &'static str;

    /// Parallel tile granularity. The controller crops the processed
    /// interior to an exact multiple of this before the first stage.
    fn work_unit(&self) -> usize {
        1
    }

    /// One-time stage preparation during pipeline construction. Backends
    /// that build device programs surface build diagnostics through
    /// [`Error::Compilation`].
    fn compile_stage(&mut self, stage: Stage) -> Result<()> {
        let _ = stage;
        Ok(())
    }

    /// 5x5 weighted blur of the full grid.
    fn smooth(&self, input: &PixelGrid, output: &mut PixelGrid) -> Result<()>;

    /// Sobel magnitude and quantized direction for the full grid.
    fn gradient(
        &self,
        input: &PixelGrid,
        magnitude: &mut PixelGrid,
        directions: &mut DirectionMap,
    ) -> Result<()>;

    /// Non-maximum suppression of the magnitude grid.
    fn suppress(
        &self,
        magnitude: &PixelGrid,
        directions: &DirectionMap,
        output: &mut PixelGrid,
    ) -> Result<()>;

    /// Hysteresis tracing into a binary grid.
    fn trace(
        &self,
        magnitude: &PixelGrid,
        thresholds: Thresholds,
        output: &mut PixelGrid,
    ) -> Result<()>;

    /// Blocks until all writes from the previous dispatch are globally
    /// visible. The next stage must not read its input before this returns.
    fn barrier(&self);
}

/// Reference implementation: single-threaded nested loops, no suspension.
#[derive(Debug, Default)]
pub struct SequentialBackend;

impl SequentialBackend {
    /// Creates the sequential backend.
    pub fn new() -> Self {
        Self
    }
}

impl ComputeBackend for SequentialBackend {
    fn name(&self) -> &'static str {
        "sequential"
    }

    fn smooth(&self, input: &PixelGrid, output: &mut PixelGrid) -> Result<()> {
        for row in 0..input.rows() {
            kernels::smooth_row(input, row, output.row_mut(row));
        }
        Ok(())
    }

    fn gradient(
        &self,
        input: &PixelGrid,
        magnitude: &mut PixelGrid,
        directions: &mut DirectionMap,
    ) -> Result<()> {
        for row in 0..input.rows() {
            kernels::gradient_row(input, row, magnitude.row_mut(row), directions.row_mut(row));
        }
        Ok(())
    }

    fn suppress(
        &self,
        magnitude: &PixelGrid,
        directions: &DirectionMap,
        output: &mut PixelGrid,
    ) -> Result<()> {
        for row in 0..magnitude.rows() {
            kernels::suppress_row(magnitude, directions, row, output.row_mut(row));
        }
        Ok(())
    }

    fn trace(
        &self,
        magnitude: &PixelGrid,
        thresholds: Thresholds,
        output: &mut PixelGrid,
    ) -> Result<()> {
        kernels::flood_trace(magnitude, thresholds, output);
        Ok(())
    }

    /// Execution is already ordered; nothing to wait for.
    fn barrier(&self) {}
}

/// Data-parallel implementation: one work item per output row, dispatched on
/// a dedicated thread pool.
pub struct ParallelBackend {
    pool: rayon::ThreadPool,
    work_unit: usize,
}

impl ParallelBackend {
    /// Builds the backend with the pool's default thread count.
    pub fn new(work_unit: usize) -> Result<Self> {
        Self::with_threads(0, work_unit)
    }

    /// Builds the backend with an explicit thread count; zero lets the pool
    /// pick its own size.
    pub fn with_threads(threads: usize, work_unit: usize) -> Result<Self> {
        if work_unit == 0 {
            return Err(Error::Config("work-unit size must be positive".into()));
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("canny-worker-{i}"))
            .build()
            .map_err(|e| Error::BackendUnavailable {
                backend: "parallel",
                reason: e.to_string(),
            })?;
        debug!(
            "parallel backend ready: {} threads, work unit {}",
            pool.current_num_threads(),
            work_unit
        );
        Ok(Self { pool, work_unit })
    }
}

impl ComputeBackend for ParallelBackend {
    fn name(&self) -> &'static str {
        "parallel"
    }

    fn work_unit(&self) -> usize {
        self.work_unit
    }

    fn compile_stage(&mut self, stage: Stage) -> Result<()> {
        // Row kernels are compiled into the host binary; nothing to build.
        debug!("{stage} stage kernel ready");
        Ok(())
    }

    fn smooth(&self, input: &PixelGrid, output: &mut PixelGrid) -> Result<()> {
        let cols = input.cols();
        self.pool.install(|| {
            output
                .as_mut_slice()
                .par_chunks_mut(cols)
                .enumerate()
                .for_each(|(row, out)| kernels::smooth_row(input, row, out));
        });
        Ok(())
    }

    fn gradient(
        &self,
        input: &PixelGrid,
        magnitude: &mut PixelGrid,
        directions: &mut DirectionMap,
    ) -> Result<()> {
        let cols = input.cols();
        self.pool.install(|| {
            magnitude
                .as_mut_slice()
                .par_chunks_mut(cols)
                .zip(directions.as_mut_slice().par_chunks_mut(cols))
                .enumerate()
                .for_each(|(row, (mag, dir))| kernels::gradient_row(input, row, mag, dir));
        });
        Ok(())
    }

    fn suppress(
        &self,
        magnitude: &PixelGrid,
        directions: &DirectionMap,
        output: &mut PixelGrid,
    ) -> Result<()> {
        let cols = magnitude.cols();
        self.pool.install(|| {
            output
                .as_mut_slice()
                .par_chunks_mut(cols)
                .enumerate()
                .for_each(|(row, out)| kernels::suppress_row(magnitude, directions, row, out));
        });
        Ok(())
    }

    /// Iterative label propagation to a fixed point.
    ///
    /// A seed pass lights every pixel strictly above the strong threshold;
    /// each following pass lights pixels at or above the weak threshold next
    /// to an already lit pixel, reading the previous generation and writing
    /// the next. The loop ends when a pass changes nothing, at which point
    /// the lit set equals the sequential flood fill's reachability set.
    fn trace(
        &self,
        magnitude: &PixelGrid,
        thresholds: Thresholds,
        output: &mut PixelGrid,
    ) -> Result<()> {
        let (rows, cols) = (magnitude.rows(), magnitude.cols());
        self.pool.install(|| {
            output
                .as_mut_slice()
                .par_chunks_mut(cols)
                .enumerate()
                .for_each(|(row, out)| {
                    let mag = magnitude.row(row);
                    for col in 0..cols {
                        out[col] = if mag[col] > thresholds.high { EDGE } else { 0 };
                    }
                });
        });

        let mut next = PixelGrid::new(rows, cols)?;
        let mut passes = 0usize;
        loop {
            let current: &PixelGrid = output;
            let changed: usize = self.pool.install(|| {
                next.as_mut_slice()
                    .par_chunks_mut(cols)
                    .enumerate()
                    .map(|(row, out)| propagate_row(magnitude, current, thresholds.low, row, out))
                    .sum()
            });
            std::mem::swap(output, &mut next);
            passes += 1;
            if changed == 0 {
                break;
            }
        }
        debug!("trace converged after {passes} passes");
        Ok(())
    }

    /// Dispatches join every work item before returning, so all writes are
    /// already visible here.
    fn barrier(&self) {}
}

fn propagate_row(
    magnitude: &PixelGrid,
    current: &PixelGrid,
    low: u8,
    row: usize,
    out: &mut [u8],
) -> usize {
    let (rows, cols) = (magnitude.rows(), magnitude.cols());
    let mag = magnitude.row(row);
    let lit = current.row(row);
    let mut changed = 0;
    for col in 0..cols {
        if lit[col] == EDGE {
            out[col] = EDGE;
            continue;
        }
        let reached = mag[col] >= low
            && kernels::NEIGHBOURS.iter().any(|&(dr, dc)| {
                let nr = row as isize + dr;
                let nc = col as isize + dc;
                nr >= 0
                    && nr < rows as isize
                    && nc >= 0
                    && nc < cols as isize
                    && current.get(nr as usize, nc as usize) == EDGE
            });
        if reached {
            out[col] = EDGE;
            changed += 1;
        } else {
            out[col] = 0;
        }
    }
    changed
}
