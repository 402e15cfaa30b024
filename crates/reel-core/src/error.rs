//! Error types for reel-core operations.
//!
//! The core crate is pure computation: pixel tables, the conversion matrix,
//! frame and timecode arithmetic. The only failures it reports are caller
//! mistakes, so the taxonomy is small.
//!
//! # Usage
//!
//! ```rust
//! use reel_core::{Error, PixelType, Result};
//!
//! fn require_valid(t: PixelType) -> Result<()> {
//!     if !t.is_valid() {
//!         return Err(Error::invalid_argument("pixel type is None"));
//!     }
//!     Ok(())
//! }
//! assert!(require_valid(PixelType::None).is_err());
//! ```
//!
//! # Used By
//!
//! - [`crate::convert`] - `None` types and short buffers
//! - [`crate::frame`] - malformed sequence strings
//! - [`crate::time`] - malformed timecode and keycode strings
//! - `reel-io` - wrapped as `IoError::Core`

use thiserror::Error;

/// Result type alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors reported by reel-core.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// A value outside the accepted domain was supplied.
    ///
    /// Covers conversions requested with [`crate::PixelType::None`],
    /// unparseable sequence or timecode strings and similar programming
    /// errors. The type set is closed, so these never depend on file data.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A byte buffer does not match the size its metadata describes.
    #[error("buffer size mismatch: expected {expected} bytes, got {actual}")]
    BufferSize {
        /// Bytes required by the image or audio info
        expected: usize,
        /// Bytes actually supplied
        actual: usize,
    },
}

impl Error {
    /// Creates an [`Error::InvalidArgument`] error.
    #[inline]
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Creates an [`Error::BufferSize`] error.
    #[inline]
    pub fn buffer_size(expected: usize, actual: usize) -> Self {
        Self::BufferSize { expected, actual }
    }
}
