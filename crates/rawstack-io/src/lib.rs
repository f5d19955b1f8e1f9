//! # rawstack-io
//!
//! Raw scientific image decoding.
//!
//! Given a [`FileDescriptor`](rawstack_core::FileDescriptor) produced by some
//! header parser, this crate opens the bytes it points at and decodes them
//! into typed pixel buffers, one frame or a whole stack, with calibration.
//!
//! # Architecture
//!
//! - [`StreamProvider`] - opens files, URLs and caller streams; gzip transport
//! - [`validate()`] - pre-flight descriptor checks
//! - [`PixelDecoder`] - one frame: decompress, undo predictor, unpack
//! - [`StackAssembler`] - many frames, partial results, cancellation
//! - [`CalibrationResolver`] - physical and intensity calibration
//! - [`FileOpener`] / [`open`] - all of the above in one call
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use rawstack_core::{ByteOrder, FileDescriptor, PixelEncoding};
//!
//! let desc = FileDescriptor::new(512, 512, PixelEncoding::Gray16Unsigned)
//!     .with_path("scan.raw")
//!     .with_byte_order(ByteOrder::Little);
//!
//! let image = rawstack_io::open(&desc)?.expect("file exists");
//! ```
//!
//! # Supported Encodings
//!
//! | Encoding | Decoded as |
//! |----------|------------|
//! | 1-bit bitmap, 8-bit gray, 8-bit indexed | byte |
//! | 12/16-bit gray (signed offset by 32768) | short |
//! | 24/32-bit int, 32/64-bit float | float |
//! | RGB, BGR, ARGB, ABGR, BARG, RGB planar, CMYK | packed RGB |
//! | 48-bit RGB (chunky or planar) | 3 or 4 short channels |
//!
//! Content compression: LZW, PackBits and Deflate, each optionally with
//! horizontal differencing. Names ending in `.gz` are inflated on the fly.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod calibration;
pub mod codec;
pub mod decode;
pub mod error;
pub mod observer;
pub mod opener;
pub mod stack;
pub mod stream;
pub mod validate;

pub use calibration::{
    parse_description, CalibrationConflict, CalibrationResolver, DescriptionProperties, Resolution,
};
pub use decode::PixelDecoder;
pub use error::{IoError, IoResult, ValidationError};
pub use observer::{
    CancelToken, DecodeObserver, DecodeOptions, NullObserver, ProxySettings,
    DEFAULT_INFLATE_BUFFER, DEFAULT_VALIDATION_THRESHOLD,
};
pub use opener::{color_model, open, FileOpener};
pub use stack::{StackAssembler, StackOutcome};
pub use stream::{is_gzip_name, HttpOpener, OpenedStream, RandomAccessStream, StreamProvider, UrlOpener};
pub use validate::validate;
