//! Error taxonomy. Every variant aborts the current pipeline run; there is
//! no partial-result mode.

use thiserror::Error;

use crate::backend::Stage;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Failures surfaced by pipeline construction or a pipeline run.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid configuration or input, rejected before any stage runs.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// No compute device could be brought up for the requested backend.
    /// The pipeline never falls back to another backend on its own.
    #[error("no compute device for the {backend} backend: {reason}")]
    BackendUnavailable {
        /// Name of the backend that failed to initialize.
        backend: &'static str,
        /// Diagnostic from the backend.
        reason: String,
    },

    /// A stage kernel could not be built during backend initialization.
    #[error("failed to build the {stage} stage kernel: {diagnostic}")]
    Compilation {
        /// Stage whose kernel failed to build.
        stage: Stage,
        /// Build diagnostic reported by the backend.
        diagnostic: String,
    },

    /// A stage could not obtain an output buffer.
    #[error("failed to allocate a {rows}x{cols} buffer")]
    Allocation {
        /// Requested row extent.
        rows: usize,
        /// Requested column extent.
        cols: usize,
    },
}
