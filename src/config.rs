//! Pipeline configuration, fixed at construction and validated before any
//! stage runs.

use crate::error::{Error, Result};

/// Which conforming backend executes the four stages.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BackendKind {
    /// Single-threaded nested loops; the deterministic reference path.
    Sequential,
    /// Data-parallel row kernels dispatched on a dedicated thread pool.
    Parallel,
}

/// Dual hysteresis thresholds, immutable for the duration of one run.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Thresholds {
    /// Seed threshold: a pixel strictly above it starts an edge chain.
    pub high: u8,
    /// Extension threshold: a chain only grows through pixels at or above it.
    pub low: u8,
}

/// Recognized options for a pipeline run.
#[derive(Clone, Debug)]
pub struct Config {
    /// Backend executing the stage kernels.
    pub backend: BackendKind,
    /// Parallel tile size. The controller crops the processed interior to an
    /// exact multiple of it. Ignored by the sequential backend.
    pub work_unit: usize,
    /// Strong edge seed threshold.
    pub high_threshold: u8,
    /// Weak edge extension threshold, strictly below `high_threshold`.
    pub low_threshold: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BackendKind::Sequential,
            work_unit: 1,
            high_threshold: 80,
            low_threshold: 50,
        }
    }
}

impl Config {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.low_threshold >= self.high_threshold {
            return Err(Error::Config(format!(
                "low threshold ({}) must be less than high threshold ({})",
                self.low_threshold, self.high_threshold
            )));
        }
        if self.work_unit == 0 {
            return Err(Error::Config("work-unit size must be positive".into()));
        }
        Ok(())
    }

    pub(crate) fn thresholds(&self) -> Thresholds {
        Thresholds {
            high: self.high_threshold,
            low: self.low_threshold,
        }
    }
}
