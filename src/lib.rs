#![cfg_attr(all(test, feature = "unstable"), feature(test))]
#![warn(missing_docs)]

//! Canny edge detection as a four-stage pipeline: 5x5 Gaussian smoothing,
//! Sobel gradients with quantized orientation, direction-conditioned
//! non-maximum suppression, and dual-threshold hysteresis tracing.
//!
//! The stages run either on a single-threaded sequential backend or as
//! data-parallel row kernels on a dedicated thread pool. Both backends
//! implement the same [`backend::ComputeBackend`] contract and produce
//! byte-identical output; the [`Pipeline`] controller owns the double
//! buffering, sequencing and synchronization between stages.
//!
//! # Finding the edges in an image
//!
//! ```
//! use canny_pipeline::{Config, Pipeline, PixelGrid};
//!
//! // A vertical step edge: the right half is bright.
//! let mut data = vec![0u8; 64 * 64];
//! for row in 0..64 {
//!     for col in 32..64 {
//!         data[row * 64 + col] = 200;
//!     }
//! }
//! let grid = PixelGrid::from_raw(64, 64, data).unwrap();
//!
//! let pipeline = Pipeline::new(Config::default()).unwrap();
//! let detection = pipeline.detect(&grid).unwrap();
//! assert!(detection.edges.as_slice().iter().all(|&p| p == 0 || p == 255));
//! ```
//!
//! See [`Config`] for thresholds and backend selection.

pub mod backend;
mod config;
mod error;
mod grid;
mod kernels;
mod pipeline;

pub use config::{BackendKind, Config, Thresholds};
pub use error::{Error, Result};
pub use grid::{BufferPair, DirectionCode, DirectionMap, PixelGrid, EDGE};
pub use pipeline::{Detection, Pipeline};

/// Convenience wrapper: runs the full pipeline on a grayscale image.
pub fn canny(image: &image::GrayImage, config: Config) -> Result<Detection> {
    let grid = PixelGrid::from_gray(image)?;
    Pipeline::new(config)?.detect(&grid)
}
