//! Engine error type: API-thread validation and setup failures.

use thiserror::Error;

/// Errors surfaced by the engine's API-thread operations. The mix thread
/// never fails.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A parameter value was out of range or not recognised.
    #[error("invalid value: {0}")]
    InvalidValue(String),

    /// The operation does not apply to the object's current state.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// A referenced object does not exist (or was destroyed).
    #[error("no such {kind}: {id}")]
    NoSuchObject {
        kind: &'static str,
        id: u32,
    },

    /// A buffer format cannot be played on this device.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// The backend refused the device configuration.
    #[error(transparent)]
    Backend(#[from] sf_backend::BackendError),

    /// HRTF or ambisonic configuration failure.
    #[error(transparent)]
    Spatial(#[from] sf_spatial::SpatialError),
}

/// Result alias for [`EngineError`].
pub type EngineResult<T> = Result<T, EngineError>;
