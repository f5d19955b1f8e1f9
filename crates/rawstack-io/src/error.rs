//! Error types for decoding.
//!
//! [`IoError`] follows the decode taxonomy: configuration problems are
//! fatal, I/O failures keep their path or URL for a caller-level retry,
//! allocation failures stay distinguishable so the stack assembler can
//! keep what it already decoded, and validation failures carry the full
//! descriptor diagnostic.

use std::fmt;
use std::io;
use thiserror::Error;

/// Pre-flight mismatch between a descriptor and the bytes it points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// What is wrong.
    pub message: String,
    /// Descriptor width.
    pub width: u32,
    /// Descriptor height.
    pub height: u32,
    /// Header offset.
    pub offset: i64,
    /// Nominal bytes per pixel of the encoding.
    pub bytes_per_pixel: usize,
    /// Probed stream length, when it was known.
    pub probed_length: Option<u64>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "FileInfo parameter error.")?;
        writeln!(f, "{}", self.message)?;
        writeln!(f, "  Width: {}", self.width)?;
        writeln!(f, "  Height: {}", self.height)?;
        writeln!(f, "  Offset: {}", self.offset)?;
        write!(f, "  Bytes/pixel: {}", self.bytes_per_pixel)?;
        if let Some(len) = self.probed_length.filter(|&l| l > 0) {
            write!(f, "\n  File length: {}", len)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

/// Decode error.
#[derive(Debug, Error)]
pub enum IoError {
    /// Malformed descriptor; retrying will not help.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Stream open or read failure.
    #[error("I/O error on {context}: {source}")]
    Io {
        /// Path, URL or stream the failure happened on.
        context: String,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// Corrupt compressed data or an undecodable sample layout.
    #[error("decode error: {0}")]
    Decode(String),

    /// Encoding tag the decoder cannot handle.
    #[error("unsupported pixel encoding: {0}")]
    UnsupportedEncoding(String),

    /// A frame buffer could not be allocated.
    #[error("failed to allocate {requested} bytes")]
    Allocation {
        /// Bytes requested.
        requested: usize,
    },

    /// Descriptor does not fit the probed stream.
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// The stream ended inside a frame.
    #[error("stream ended after {got} of {expected} bytes")]
    Truncated {
        /// Bytes the frame needs.
        expected: u64,
        /// Bytes actually read.
        got: u64,
    },

    /// A stack decode produced no usable frame.
    #[error("no frames decoded ({requested} requested)")]
    NoFrames {
        /// Frames requested by the descriptor.
        requested: u32,
    },

    /// The caller cancelled before any frame was decoded.
    #[error("decode cancelled")]
    Cancelled,
}

impl IoError {
    /// Wraps an [`io::Error`] with the path or URL it happened on.
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Creates an [`IoError::Configuration`] error.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Creates an [`IoError::Decode`] error.
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Returns `true` if this is an allocation error.
    #[inline]
    pub fn is_allocation_error(&self) -> bool {
        matches!(self, Self::Allocation { .. })
    }

    /// Returns `true` if the stream ran out inside a frame.
    #[inline]
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, Self::Truncated { .. })
    }

    /// Returns `true` if this is an I/O error.
    #[inline]
    pub fn is_io_error(&self) -> bool {
        matches!(self, Self::Io { .. })
    }

    /// Returns `true` for malformed descriptors and unsupported encodings.
    #[inline]
    pub fn is_configuration_error(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::UnsupportedEncoding(_))
    }
}

impl From<io::Error> for IoError {
    fn from(source: io::Error) -> Self {
        Self::io("stream", source)
    }
}

impl From<rawstack_core::Error> for IoError {
    fn from(err: rawstack_core::Error) -> Self {
        match err {
            rawstack_core::Error::UnsupportedEncoding(tag) => Self::UnsupportedEncoding(tag),
            other => Self::Configuration(other.to_string()),
        }
    }
}

/// Result type for decoding.
pub type IoResult<T> = Result<T, IoError>;
