use std::fmt;
use std::io;
use std::time::Duration;

use thiserror::Error;

/// Which bounded wait of a run ran out of time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    /// Waiting for math typesetting to settle before block heights are read.
    Stabilization,
    /// Waiting for the block cards to be painted onto the surface.
    Capture,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Stabilization => f.write_str("layout stabilization"),
            Stage::Capture => f.write_str("surface capture"),
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    /// Nothing to paginate.
    #[error("no content blocks to paginate")]
    EmptyInput,

    /// The page configuration leaves no room for content.
    #[error("degenerate page geometry: {reason}")]
    DegenerateGeometry { reason: String },

    /// A bounded wait expired; the whole run may be retried.
    #[error("{stage} did not complete within {}ms", timeout.as_millis())]
    RenderTimeout { stage: Stage, timeout: Duration },

    /// A slice image could not be produced.
    #[error("slice encoding failed: {0}")]
    Encoding(String),

    /// The caller abandoned the run.
    #[error("pagination run was cancelled")]
    Cancelled,

    /// A blocking render worker panicked or was aborted.
    #[error("render worker failed: {0}")]
    Worker(String),

    #[error("font error: {0}")]
    Font(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

impl Error {
    pub(crate) fn degenerate(reason: impl Into<String>) -> Self {
        Error::DegenerateGeometry {
            reason: reason.into(),
        }
    }

    /// True for failures where re-invoking the whole run may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::RenderTimeout { .. })
    }
}
