//! Error type for spatial configuration and HRTF loading.

use thiserror::Error;

/// Errors from spatial configuration and HRTF dataset handling.
#[derive(Debug, Error)]
pub enum SpatialError {
    /// Ambisonic order outside the supported 1..=3 range.
    #[error("unsupported ambisonic order {0}")]
    InvalidOrder(usize),

    /// An HRTF dataset failed validation.
    #[error("invalid HRTF data: {0}")]
    InvalidHrtf(String),

    /// An HRTF dataset had an unknown magic marker.
    #[error("unrecognized HRTF format marker")]
    UnknownHrtfFormat,

    /// Dataset ended prematurely.
    #[error("truncated HRTF data")]
    TruncatedHrtf,
}

/// Result alias for [`SpatialError`].
pub type SpatialResult<T> = Result<T, SpatialError>;
