//! Common error type for parameter and format validation.

use thiserror::Error;

/// Errors raised by API-thread validation paths.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A numeric parameter was outside its documented range.
    #[error("value out of range for {param}: {value}")]
    OutOfRange {
        /// Parameter name.
        param: &'static str,
        /// Offending value.
        value: f64,
    },

    /// A buffer or device format combination is not supported.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// An enum-like selector was not recognised.
    #[error("invalid value: {0}")]
    InvalidValue(String),
}

/// Result alias for [`CoreError`].
pub type CoreResult<T> = Result<T, CoreError>;
