//! Double-buffer pipeline controller: owns the buffer pair, sequences the
//! four stages over a backend, and flips buffer roles between stages.

use std::time::Instant;

use log::debug;

use crate::backend::{ComputeBackend, ParallelBackend, SequentialBackend, Stage};
use crate::config::{BackendKind, Config};
use crate::error::{Error, Result};
use crate::grid::{BufferPair, DirectionCode, DirectionMap, PixelGrid};

/// Result of one pipeline run.
pub struct Detection {
    /// Binary edge raster; every pixel is 0 or [`crate::EDGE`].
    pub edges: PixelGrid,
    /// Quantized gradient orientation per pixel, written once by the
    /// gradient stage.
    pub directions: DirectionMap,
}

impl Detection {
    /// Renders the binary edge raster as a grayscale image.
    pub fn edge_image(&self) -> image::GrayImage {
        self.edges.to_gray()
    }

    /// Renders direction codes for visual inspection: 45 degrees maps to
    /// green, 90 to red, 135 to blue; 0 degrees and undefined pixels stay
    /// background black.
    pub fn direction_image(&self) -> image::RgbImage {
        let (rows, cols) = (self.directions.rows(), self.directions.cols());
        let mut out = image::RgbImage::new(cols as u32, rows as u32);
        for row in 0..rows {
            for (col, code) in self.directions.row(row).iter().enumerate() {
                let rgb = match code {
                    DirectionCode::Deg45 => [0, 255, 0],
                    DirectionCode::Deg90 => [255, 0, 0],
                    DirectionCode::Deg135 => [0, 0, 255],
                    DirectionCode::Deg0 | DirectionCode::Undefined => continue,
                };
                out.put_pixel(col as u32, row as u32, image::Rgb(rgb));
            }
        }
        out
    }
}

/// Sequences smoothing, gradient estimation, suppression and hysteresis over
/// a compute backend, handing buffers forward through a [`BufferPair`].
pub struct Pipeline {
    config: Config,
    backend: Box<dyn ComputeBackend>,
}

impl Pipeline {
    /// Builds the backend named by the configuration and prepares its stage
    /// kernels. An unavailable backend is an error; there is no silent
    /// fallback to the sequential path.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let backend: Box<dyn ComputeBackend> = match config.backend {
            BackendKind::Sequential => Box::new(SequentialBackend::new()),
            BackendKind::Parallel => Box::new(ParallelBackend::new(config.work_unit)?),
        };
        Self::with_backend(config, backend)
    }

    /// Runs the pipeline over a caller-supplied backend implementation.
    pub fn with_backend(config: Config, mut backend: Box<dyn ComputeBackend>) -> Result<Self> {
        config.validate()?;
        for stage in Stage::ALL {
            backend.compile_stage(stage)?;
        }
        Ok(Self { config, backend })
    }

    /// The configuration this pipeline was built with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Name of the backend executing the stages.
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Runs all four stages and returns the binary edge raster together with
    /// the direction map.
    ///
    /// On backends with a work unit above one, the input is cropped first so
    /// the processed interior is an exact multiple of the tile size; the
    /// returned grids carry the cropped extents.
    pub fn detect(&self, input: &PixelGrid) -> Result<Detection> {
        if input.rows() == 0 || input.cols() == 0 {
            return Err(Error::Config("input grid has zero extent".into()));
        }
        let input = self.aligned(input)?;
        let (rows, cols) = (input.rows(), input.cols());
        let thresholds = self.config.thresholds();
        debug!(
            "running {}x{} detection on the {} backend",
            rows,
            cols,
            self.backend.name()
        );

        let mut buffers = BufferPair::new(input)?;
        let mut directions = DirectionMap::new(rows, cols)?;

        let start = Instant::now();
        {
            let (src, dst) = buffers.split();
            self.backend.smooth(src, dst)?;
        }
        self.backend.barrier();
        buffers.swap();
        debug!("smooth stage done in {:?}", start.elapsed());

        let start = Instant::now();
        {
            let (src, dst) = buffers.split();
            self.backend.gradient(src, dst, &mut directions)?;
        }
        self.backend.barrier();
        buffers.swap();
        debug!("gradient stage done in {:?}", start.elapsed());

        let start = Instant::now();
        {
            let (src, dst) = buffers.split();
            self.backend.suppress(src, &directions, dst)?;
        }
        self.backend.barrier();
        buffers.swap();
        debug!("suppress stage done in {:?}", start.elapsed());

        let start = Instant::now();
        {
            let (src, dst) = buffers.split();
            self.backend.trace(src, thresholds, dst)?;
        }
        self.backend.barrier();
        buffers.swap();
        debug!("trace stage done in {:?}", start.elapsed());

        Ok(Detection {
            edges: buffers.into_front(),
            directions,
        })
    }

    /// Crops the input so `(rows - 2)` and `(cols - 2)` are exact multiples
    /// of the backend's work unit; the one-pixel frame around the interior
    /// stays unprocessed either way.
    fn aligned(&self, input: &PixelGrid) -> Result<PixelGrid> {
        let unit = self.backend.work_unit();
        if unit <= 1 {
            return Ok(input.clone());
        }
        let interior_rows = input.rows().saturating_sub(2);
        let interior_cols = input.cols().saturating_sub(2);
        if interior_rows < unit || interior_cols < unit {
            return Err(Error::Config(format!(
                "{}x{} input is too small for a work unit of {}",
                input.rows(),
                input.cols(),
                unit
            )));
        }
        let rows = (interior_rows / unit) * unit + 2;
        let cols = (interior_cols / unit) * unit + 2;
        if rows != input.rows() || cols != input.cols() {
            debug!(
                "cropping {}x{} input to {}x{} for work-unit alignment",
                input.rows(),
                input.cols(),
                rows,
                cols
            );
        }
        input.crop(rows, cols)
    }
}
