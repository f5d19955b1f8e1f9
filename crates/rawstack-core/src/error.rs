//! Error types for rawstack-core.
//!
//! The data model only fails when a value cannot describe a decodable
//! image at all: a lookup table with ragged channels, an encoding name or
//! code nobody knows, or dimensions that overflow buffer arithmetic.
//!
//! # Usage
//!
//! ```rust
//! use rawstack_core::{Error, Result};
//!
//! fn check(width: u32, height: u32) -> Result<()> {
//!     if width == 0 || height == 0 {
//!         return Err(Error::invalid_dimensions(width, height, "zero extent"));
//!     }
//!     Ok(())
//! }
//! assert!(check(0, 4).is_err());
//! ```

use thiserror::Error;

/// Result type alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while building or interpreting descriptor data.
#[derive(Debug, Error)]
pub enum Error {
    /// Width or height is zero, or `width * height` overflows.
    #[error("invalid dimensions: {width}x{height} ({reason})")]
    InvalidDimensions {
        /// Requested width
        width: u32,
        /// Requested height
        height: u32,
        /// Reason why dimensions are invalid
        reason: String,
    },

    /// The three channels of a lookup table have different lengths.
    #[error("lookup table channels differ in length: red {red}, green {green}, blue {blue}")]
    LookupTableMismatch {
        /// Red channel length
        red: usize,
        /// Green channel length
        green: usize,
        /// Blue channel length
        blue: usize,
    },

    /// Pixel encoding name or numeric tag is not recognized.
    #[error("unsupported pixel encoding: {0}")]
    UnsupportedEncoding(String),

    /// Compression name or numeric tag is not recognized.
    #[error("unsupported compression: {0}")]
    UnsupportedCompression(String),

    /// Generic error with custom message.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Creates an [`Error::InvalidDimensions`] error.
    #[inline]
    pub fn invalid_dimensions(width: u32, height: u32, reason: impl Into<String>) -> Self {
        Self::InvalidDimensions {
            width,
            height,
            reason: reason.into(),
        }
    }

    /// Creates an [`Error::UnsupportedEncoding`] error.
    #[inline]
    pub fn unsupported_encoding(tag: impl Into<String>) -> Self {
        Self::UnsupportedEncoding(tag.into())
    }

    /// Creates an [`Error::Other`] error.
    #[inline]
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Returns `true` if this error names an unknown encoding or compression.
    #[inline]
    pub fn is_unsupported(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedEncoding(_) | Self::UnsupportedCompression(_)
        )
    }
}
