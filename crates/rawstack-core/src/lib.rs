//! # rawstack-core
//!
//! Data model for raw scientific image decoding.
//!
//! - [`FileDescriptor`] - where the bytes are and how pixels are encoded
//! - [`PixelBuffer`], [`PixelFrame`], [`DecodedImage`] - decoded results
//! - [`Calibration`] - physical, temporal and intensity calibration
//!
//! ## Crate Structure
//!
//! ```text
//! rawstack-core (this crate, no I/O)
//!    ^
//!    +-- rawstack-io (stream provider, validator, decoder, stack assembler)
//!    +-- rawstack-cli
//! ```
//!
//! ## Feature Flags
//!
//! - `serde` - Serialize/deserialize descriptors (used for YAML sidecars)

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod buffer;
pub mod calibration;
pub mod descriptor;
pub mod error;

pub use buffer::{
    ColorModelSpec, Completeness, DecodedImage, FrameData, PartialReason, PixelBuffer, PixelFrame,
};
pub use calibration::{
    Calibration, CalibrationFunction, CompositeMode, HyperstackDims, IntensityCalibration,
    PIXEL_UNIT,
};
pub use descriptor::{
    ByteOrder, Compression, FileDescriptor, FrameGap, LookupTable, PixelEncoding, RgbOrder,
    SourceLocation, StreamHandle,
};
pub use error::{Error, Result};
