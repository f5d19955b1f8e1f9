//! File descriptors: the on-disk / on-wire layout of an image or stack.
//!
//! A [`FileDescriptor`] is filled in by a container-specific header parser
//! (TIFF, FITS, raw dialogs, ...) and handed to the decoder. It says where
//! the bytes live, how pixels are encoded, and how frames follow each other.
//! The decoder never mutates it; anything that must change during a decode
//! (for example the effective compression once gzip transport is detected)
//! lives in decoder-owned state.
//!
//! # Example
//!
//! ```rust
//! use rawstack_core::{ByteOrder, FileDescriptor, FrameGap, PixelEncoding};
//!
//! let desc = FileDescriptor::new(512, 512, PixelEncoding::Gray16Unsigned)
//!     .with_path("/data/run1/stack.raw")
//!     .with_byte_order(ByteOrder::Little)
//!     .with_header_offset(768)
//!     .with_images(40, FrameGap::Bytes(0));
//!
//! assert_eq!(desc.frame_bytes(), 512 * 512 * 2);
//! assert_eq!(desc.file_name, "stack.raw");
//! ```

use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use crate::calibration::CalibrationFunction;
use crate::{Error, Result};

// === Byte order ===

/// Byte order of multi-byte samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ByteOrder {
    /// Most significant byte first (Motorola order).
    #[default]
    Big,
    /// Least significant byte first (Intel order).
    Little,
}

impl ByteOrder {
    /// Returns `true` for little-endian.
    #[inline]
    pub const fn is_little(self) -> bool {
        matches!(self, Self::Little)
    }
}

// === Packed RGB orderings ===

/// Byte ordering of a packed 8-bit-per-channel RGB pixel.
///
/// | Order | Bytes/pixel | Layout |
/// |-------|-------------|--------|
/// | `Rgb` | 3 | R G B |
/// | `Bgr` | 3 | B G R |
/// | `Argb` | 4 | A R G B |
/// | `Abgr` | 4 | A B G R |
/// | `Barg` | 4 | B A R G |
///
/// Alpha bytes are skipped; decoded pixels are always opaque.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum RgbOrder {
    /// R, G, B.
    Rgb,
    /// B, G, R.
    Bgr,
    /// A, R, G, B.
    Argb,
    /// A, B, G, R.
    Abgr,
    /// B, A, R, G.
    Barg,
}

impl RgbOrder {
    /// Bytes occupied by one pixel.
    #[inline]
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Rgb | Self::Bgr => 3,
            Self::Argb | Self::Abgr | Self::Barg => 4,
        }
    }

    /// Offsets of the red, green and blue bytes inside one pixel.
    #[inline]
    pub const fn channel_offsets(self) -> [usize; 3] {
        match self {
            Self::Rgb => [0, 1, 2],
            Self::Bgr => [2, 1, 0],
            Self::Argb => [1, 2, 3],
            Self::Abgr => [3, 2, 1],
            Self::Barg => [2, 3, 0],
        }
    }

    const fn name(self) -> &'static str {
        match self {
            Self::Rgb => "rgb",
            Self::Bgr => "bgr",
            Self::Argb => "argb",
            Self::Abgr => "abgr",
            Self::Barg => "barg",
        }
    }
}

// === Pixel encoding ===

/// How samples are laid out in the byte stream.
///
/// Encodings fall into three decode groups:
///
/// - **scalar**: one sample per pixel (`Gray8` .. `Gray64Float`, `Bitmap`)
/// - **packed RGB**: interleaved 8-bit channels (`PackedRgb`, `Cmyk`)
/// - **planar / multi-channel**: `RgbPlanar`, `Rgb48`, `Rgb48Planar`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "String", into = "String"))]
pub enum PixelEncoding {
    /// 8-bit grayscale.
    Gray8,
    /// 8-bit indexed color (uses the descriptor lookup table).
    Color8,
    /// 1-bit bitmap, rows padded to whole bytes, MSB first.
    Bitmap,
    /// 16-bit two's complement; stored offset by +32768.
    Gray16Signed,
    /// 16-bit unsigned.
    Gray16Unsigned,
    /// 12-bit unsigned, two pixels packed in three bytes.
    Gray12Unsigned,
    /// 32-bit signed integer, decoded to float.
    Gray32Int,
    /// 32-bit unsigned integer, decoded to float.
    Gray32Unsigned,
    /// 32-bit IEEE float.
    Gray32Float,
    /// 24-bit unsigned integer, decoded to float.
    Gray24Unsigned,
    /// 64-bit IEEE float, narrowed to 32-bit float.
    Gray64Float,
    /// Interleaved 8-bit RGB in one of several byte orderings.
    PackedRgb(RgbOrder),
    /// Three consecutive 8-bit planes (R, G, B).
    RgbPlanar,
    /// Interleaved 8-bit C, M, Y, K.
    Cmyk,
    /// Interleaved 16-bit RGB (or RGB + gray with four samples).
    Rgb48,
    /// Consecutive 16-bit planes (three or four).
    Rgb48Planar,
}

impl PixelEncoding {
    /// Nominal bytes per pixel, used by file-length validation.
    ///
    /// Packed forms report their container width (12-bit reports 2,
    /// bitmap reports 1); use [`FileDescriptor::frame_bytes`] for the exact
    /// byte count of one frame.
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Gray8 | Self::Color8 | Self::Bitmap => 1,
            Self::Gray16Signed | Self::Gray16Unsigned | Self::Gray12Unsigned => 2,
            Self::Gray32Int
            | Self::Gray32Unsigned
            | Self::Gray32Float
            | Self::Gray24Unsigned
            | Self::Cmyk => 4,
            Self::PackedRgb(order) => order.bytes_per_pixel(),
            Self::RgbPlanar => 3,
            Self::Rgb48 | Self::Rgb48Planar => 6,
            Self::Gray64Float => 8,
        }
    }

    /// Number of separate channel buffers a decoded frame carries.
    ///
    /// Only the 48-bit forms decode to per-channel buffers; every other
    /// encoding produces a single buffer.
    #[inline]
    pub const fn channels(self, samples_per_pixel: u16) -> usize {
        match self {
            Self::Rgb48 | Self::Rgb48Planar => {
                if samples_per_pixel == 4 {
                    4
                } else {
                    3
                }
            }
            _ => 1,
        }
    }

    /// Bytes of one sample as seen by horizontal differencing.
    #[inline]
    pub const fn bytes_per_sample(self) -> usize {
        match self {
            Self::Gray16Signed | Self::Gray16Unsigned | Self::Rgb48 | Self::Rgb48Planar => 2,
            Self::Gray32Int | Self::Gray32Unsigned | Self::Gray32Float => 4,
            Self::Gray64Float => 8,
            _ => 1,
        }
    }

    /// Returns `true` if decoded samples are floating point.
    #[inline]
    pub const fn is_float(self) -> bool {
        matches!(
            self,
            Self::Gray32Int
                | Self::Gray32Unsigned
                | Self::Gray32Float
                | Self::Gray24Unsigned
                | Self::Gray64Float
        )
    }

    /// Returns `true` for encodings that decode to packed 32-bit RGB.
    #[inline]
    pub const fn is_rgb(self) -> bool {
        matches!(self, Self::PackedRgb(_) | Self::RgbPlanar | Self::Cmyk)
    }

    /// Maps a numeric file-type tag, as written by header parsers that
    /// follow the common raw-import numbering, to an encoding.
    pub fn from_code(code: i32) -> Result<Self> {
        Ok(match code {
            0 => Self::Gray8,
            1 => Self::Gray16Signed,
            2 => Self::Gray16Unsigned,
            3 => Self::Gray32Int,
            4 => Self::Gray32Float,
            5 => Self::Color8,
            6 => Self::PackedRgb(RgbOrder::Rgb),
            7 => Self::RgbPlanar,
            8 => Self::Bitmap,
            9 => Self::PackedRgb(RgbOrder::Argb),
            10 => Self::PackedRgb(RgbOrder::Bgr),
            11 => Self::Gray32Unsigned,
            12 => Self::Rgb48,
            13 => Self::Gray12Unsigned,
            14 => Self::Gray24Unsigned,
            15 => Self::PackedRgb(RgbOrder::Barg),
            16 => Self::Gray64Float,
            17 => Self::Rgb48Planar,
            18 => Self::PackedRgb(RgbOrder::Abgr),
            19 => Self::Cmyk,
            other => return Err(Error::unsupported_encoding(format!("file type {other}"))),
        })
    }

    /// Canonical lowercase name, accepted back by [`FromStr`].
    pub fn name(self) -> &'static str {
        match self {
            Self::Gray8 => "gray8",
            Self::Color8 => "color8",
            Self::Bitmap => "bitmap",
            Self::Gray16Signed => "gray16-signed",
            Self::Gray16Unsigned => "gray16-unsigned",
            Self::Gray12Unsigned => "gray12-unsigned",
            Self::Gray32Int => "gray32-int",
            Self::Gray32Unsigned => "gray32-unsigned",
            Self::Gray32Float => "gray32-float",
            Self::Gray24Unsigned => "gray24-unsigned",
            Self::Gray64Float => "gray64-float",
            Self::PackedRgb(order) => order.name(),
            Self::RgbPlanar => "rgb-planar",
            Self::Cmyk => "cmyk",
            Self::Rgb48 => "rgb48",
            Self::Rgb48Planar => "rgb48-planar",
        }
    }
}

impl fmt::Display for PixelEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PixelEncoding {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_ascii_lowercase().replace('_', "-");
        Ok(match lower.as_str() {
            "gray8" | "8-bit" => Self::Gray8,
            "color8" | "indexed" => Self::Color8,
            "bitmap" | "1-bit" => Self::Bitmap,
            "gray16-signed" | "16-bit-signed" => Self::Gray16Signed,
            "gray16-unsigned" | "gray16" | "16-bit-unsigned" => Self::Gray16Unsigned,
            "gray12-unsigned" | "gray12" => Self::Gray12Unsigned,
            "gray32-int" | "32-bit-signed" => Self::Gray32Int,
            "gray32-unsigned" | "32-bit-unsigned" => Self::Gray32Unsigned,
            "gray32-float" | "float" | "32-bit-real" => Self::Gray32Float,
            "gray24-unsigned" | "24-bit-unsigned" => Self::Gray24Unsigned,
            "gray64-float" | "double" | "64-bit-real" => Self::Gray64Float,
            "rgb" => Self::PackedRgb(RgbOrder::Rgb),
            "bgr" => Self::PackedRgb(RgbOrder::Bgr),
            "argb" => Self::PackedRgb(RgbOrder::Argb),
            "abgr" => Self::PackedRgb(RgbOrder::Abgr),
            "barg" => Self::PackedRgb(RgbOrder::Barg),
            "rgb-planar" => Self::RgbPlanar,
            "cmyk" => Self::Cmyk,
            "rgb48" => Self::Rgb48,
            "rgb48-planar" => Self::Rgb48Planar,
            _ => return Err(Error::unsupported_encoding(s)),
        })
    }
}

impl TryFrom<String> for PixelEncoding {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<PixelEncoding> for String {
    fn from(encoding: PixelEncoding) -> Self {
        encoding.name().to_string()
    }
}

// === Compression ===

/// Content compression of the pixel data.
///
/// Independent of gzip *transport* wrapping, which the stream provider
/// detects from the source name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum Compression {
    /// Uncompressed samples.
    #[default]
    None,
    /// TIFF-flavoured LZW.
    Lzw,
    /// LZW followed by horizontal differencing.
    LzwWithPrediction,
    /// Apple PackBits run-length encoding.
    PackBits,
    /// zlib / deflate.
    Deflate,
    /// Deflate followed by horizontal differencing.
    DeflateWithPrediction,
    /// Not known; bytes are read as they come.
    Unknown,
}

impl Compression {
    /// Returns `true` for the LZW variants.
    #[inline]
    pub const fn is_lzw_family(self) -> bool {
        matches!(self, Self::Lzw | Self::LzwWithPrediction)
    }

    /// Returns `true` if frame bytes must be decompressed before unpacking.
    #[inline]
    pub const fn is_compressed(self) -> bool {
        !matches!(self, Self::None | Self::Unknown)
    }

    /// Returns `true` if horizontal differencing must be undone.
    #[inline]
    pub const fn uses_prediction(self) -> bool {
        matches!(self, Self::LzwWithPrediction | Self::DeflateWithPrediction)
    }

    /// Canonical lowercase name.
    pub fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Lzw => "lzw",
            Self::LzwWithPrediction => "lzw-prediction",
            Self::PackBits => "packbits",
            Self::Deflate => "deflate",
            Self::DeflateWithPrediction => "deflate-prediction",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Compression {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "none" | "raw" => Self::None,
            "lzw" => Self::Lzw,
            "lzw-prediction" | "lzw-predictor" => Self::LzwWithPrediction,
            "packbits" => Self::PackBits,
            "deflate" | "zip" => Self::Deflate,
            "deflate-prediction" | "zip-prediction" => Self::DeflateWithPrediction,
            "unknown" => Self::Unknown,
            _ => return Err(Error::UnsupportedCompression(s.to_string())),
        })
    }
}

// === Frame gap ===

/// Bytes skipped between the end of one frame and the start of the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum FrameGap {
    /// A fixed number of bytes.
    Bytes(u64),
    /// Spread the bytes left after the header and all frames evenly
    /// between frames; needs a known stream length, otherwise zero.
    FromDimensions,
}

impl Default for FrameGap {
    fn default() -> Self {
        Self::Bytes(0)
    }
}

// === Source location ===

/// Shared slot holding a caller-supplied, already-open byte stream.
///
/// The stream is taken exactly once by the stream provider. Clones of the
/// handle share the slot, so a descriptor cloned after decoding sees an
/// empty handle.
#[derive(Clone)]
pub struct StreamHandle {
    slot: Arc<Mutex<Option<Box<dyn Read + Send>>>>,
}

impl StreamHandle {
    /// Wraps a reader.
    pub fn new<R: Read + Send + 'static>(reader: R) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(Box::new(reader)))),
        }
    }

    /// Takes the reader out of the slot.
    ///
    /// Returns `None` if it was already taken or the slot is poisoned.
    pub fn take(&self) -> Option<Box<dyn Read + Send>> {
        self.slot.lock().ok()?.take()
    }

    /// Returns `true` if the reader is still available.
    pub fn is_available(&self) -> bool {
        self.slot.lock().map(|s| s.is_some()).unwrap_or(false)
    }
}

impl fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamHandle")
            .field("available", &self.is_available())
            .finish()
    }
}

/// Where the bytes come from. Exactly one location is authoritative.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum SourceLocation {
    /// An already-open stream supplied by the caller.
    #[cfg_attr(feature = "serde", serde(skip))]
    Stream(StreamHandle),
    /// A local directory; the descriptor's `file_name` is appended.
    Directory(PathBuf),
    /// A base URL; the descriptor's `file_name` is appended verbatim.
    Url(String),
}

impl Default for SourceLocation {
    fn default() -> Self {
        Self::Directory(PathBuf::new())
    }
}

// === Lookup table ===

/// Indexed-color table with equal-length red, green and blue channels.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LookupTable {
    reds: Vec<u8>,
    greens: Vec<u8>,
    blues: Vec<u8>,
}

impl LookupTable {
    /// Builds a table, rejecting channels of different lengths.
    pub fn new(reds: Vec<u8>, greens: Vec<u8>, blues: Vec<u8>) -> Result<Self> {
        if reds.len() != greens.len() || reds.len() != blues.len() {
            return Err(Error::LookupTableMismatch {
                red: reds.len(),
                green: greens.len(),
                blue: blues.len(),
            });
        }
        Ok(Self {
            reds,
            greens,
            blues,
        })
    }

    /// Linear gray ramp of 256 entries, optionally inverted.
    pub fn grayscale(inverted: bool) -> Self {
        let ramp: Vec<u8> = (0..=255u8)
            .map(|v| if inverted { 255 - v } else { v })
            .collect();
        Self {
            reds: ramp.clone(),
            greens: ramp.clone(),
            blues: ramp,
        }
    }

    /// Number of entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.reds.len()
    }

    /// Returns `true` if the table has no entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.reds.is_empty()
    }

    /// Red channel.
    pub fn reds(&self) -> &[u8] {
        &self.reds
    }

    /// Green channel.
    pub fn greens(&self) -> &[u8] {
        &self.greens
    }

    /// Blue channel.
    pub fn blues(&self) -> &[u8] {
        &self.blues
    }

    /// Color at `index`, if in range.
    pub fn rgb(&self, index: usize) -> Option<[u8; 3]> {
        Some([
            *self.reds.get(index)?,
            *self.greens.get(index)?,
            *self.blues.get(index)?,
        ])
    }
}

// === File descriptor ===

/// Complete layout description of an image or stack.
///
/// Fields are public so header parsers can fill them directly; the
/// `with_*` builders cover the common cases.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct FileDescriptor {
    /// Image width in pixels; must be positive.
    pub width: u32,
    /// Image height in pixels; must be positive.
    pub height: u32,
    /// Pixel encoding.
    pub encoding: PixelEncoding,
    /// Byte order of multi-byte samples.
    pub byte_order: ByteOrder,
    /// Content compression.
    pub compression: Compression,
    /// Frames stored in the stream (at least 1).
    pub number_of_images: u32,
    /// Offset of the first pixel byte. Negative is invalid.
    pub header_offset: i64,
    /// Bytes between consecutive frames.
    pub gap: FrameGap,
    /// Where the bytes live.
    pub source: SourceLocation,
    /// File name; appended to directory or URL sources and used for
    /// transport-compression detection.
    pub file_name: String,
    /// Optional indexed-color table.
    pub lookup_table: Option<LookupTable>,
    /// Display a zero sample as white.
    pub white_is_zero: bool,
    /// Optional `key=value` property block.
    pub description: Option<String>,
    /// Optional free-form info text carried to the decoded image.
    pub info: Option<String>,
    /// Optional per-frame labels.
    pub slice_labels: Option<Vec<String>>,
    /// Samples per pixel; distinguishes 3- and 4-channel 48-bit RGB.
    pub samples_per_pixel: u16,
    /// Compressed byte counts of the strips making up one frame.
    pub strip_byte_counts: Option<Vec<u64>>,
    /// Physical pixel width.
    pub pixel_width: f64,
    /// Physical pixel height.
    pub pixel_height: f64,
    /// Physical spacing between slices.
    pub pixel_depth: f64,
    /// Unit of the physical pixel size.
    pub unit: Option<String>,
    /// Unit of calibrated intensity values.
    pub value_unit: Option<String>,
    /// Intensity calibration function.
    pub calibration_function: Option<CalibrationFunction>,
    /// Coefficients of the calibration function.
    pub coefficients: Option<Vec<f64>>,
    /// Time between frames.
    pub frame_interval: f64,
}

impl Default for FileDescriptor {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            encoding: PixelEncoding::Gray8,
            byte_order: ByteOrder::Big,
            compression: Compression::None,
            number_of_images: 1,
            header_offset: 0,
            gap: FrameGap::default(),
            source: SourceLocation::default(),
            file_name: String::new(),
            lookup_table: None,
            white_is_zero: false,
            description: None,
            info: None,
            slice_labels: None,
            samples_per_pixel: 1,
            strip_byte_counts: None,
            pixel_width: 1.0,
            pixel_height: 1.0,
            pixel_depth: 1.0,
            unit: None,
            value_unit: None,
            calibration_function: None,
            coefficients: None,
            frame_interval: 0.0,
        }
    }
}

impl FileDescriptor {
    /// Creates a descriptor for a single uncompressed big-endian image.
    pub fn new(width: u32, height: u32, encoding: PixelEncoding) -> Self {
        let samples_per_pixel = match encoding {
            PixelEncoding::Rgb48 | PixelEncoding::Rgb48Planar => 3,
            _ => 1,
        };
        Self {
            width,
            height,
            encoding,
            samples_per_pixel,
            ..Self::default()
        }
    }

    /// Sets a local file source, splitting it into directory and name.
    pub fn with_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        let path = path.as_ref();
        let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        self.file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.source = SourceLocation::Directory(dir);
        self
    }

    /// Sets a network source: `base` and `name` are concatenated verbatim.
    pub fn with_url(mut self, base: impl Into<String>, name: impl Into<String>) -> Self {
        self.source = SourceLocation::Url(base.into());
        self.file_name = name.into();
        self
    }

    /// Sets an already-open stream as source.
    pub fn with_stream<R: Read + Send + 'static>(mut self, reader: R) -> Self {
        self.source = SourceLocation::Stream(StreamHandle::new(reader));
        self
    }

    /// Sets the name used for display and transport detection.
    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = name.into();
        self
    }

    /// Sets the byte order.
    pub fn with_byte_order(mut self, order: ByteOrder) -> Self {
        self.byte_order = order;
        self
    }

    /// Sets the content compression.
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// Sets the header offset.
    pub fn with_header_offset(mut self, offset: i64) -> Self {
        self.header_offset = offset;
        self
    }

    /// Sets frame count and inter-frame gap.
    pub fn with_images(mut self, count: u32, gap: FrameGap) -> Self {
        self.number_of_images = count;
        self.gap = gap;
        self
    }

    /// Sets samples per pixel.
    pub fn with_samples_per_pixel(mut self, samples: u16) -> Self {
        self.samples_per_pixel = samples;
        self
    }

    /// Sets the description block.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the lookup table.
    pub fn with_lookup_table(mut self, lut: LookupTable) -> Self {
        self.lookup_table = Some(lut);
        self
    }

    /// Sets per-frame labels.
    pub fn with_slice_labels(mut self, labels: Vec<String>) -> Self {
        self.slice_labels = Some(labels);
        self
    }

    /// Sets strip byte counts for compressed frames.
    pub fn with_strips(mut self, counts: Vec<u64>) -> Self {
        self.strip_byte_counts = Some(counts);
        self
    }

    /// Sets the physical pixel size and its unit.
    pub fn with_pixel_size(mut self, width: f64, height: f64, depth: f64, unit: impl Into<String>) -> Self {
        self.pixel_width = width;
        self.pixel_height = height;
        self.pixel_depth = depth;
        self.unit = Some(unit.into());
        self
    }

    /// Number of pixels in one frame, checked for overflow.
    pub fn pixel_count(&self) -> Result<usize> {
        (self.width as usize)
            .checked_mul(self.height as usize)
            .ok_or_else(|| Error::invalid_dimensions(self.width, self.height, "pixel count overflows"))
    }

    /// Nominal bytes per pixel of the encoding.
    #[inline]
    pub fn bytes_per_pixel(&self) -> usize {
        self.encoding.bytes_per_pixel()
    }

    /// Number of channel buffers in a decoded frame.
    #[inline]
    pub fn channels(&self) -> usize {
        self.encoding.channels(self.samples_per_pixel)
    }

    /// Exact uncompressed byte count of one frame (saturating).
    pub fn frame_bytes(&self) -> u64 {
        let w = self.width as u64;
        let h = self.height as u64;
        let (row, per_pixel) = match self.encoding {
            PixelEncoding::Bitmap => (w.div_ceil(8), 1),
            PixelEncoding::Gray12Unsigned => ((w * 3).div_ceil(2), 1),
            PixelEncoding::Gray24Unsigned => (w, 3),
            PixelEncoding::Rgb48 | PixelEncoding::Rgb48Planar => (w, 2 * self.channels() as u64),
            other => (w, other.bytes_per_pixel() as u64),
        };
        row.saturating_mul(per_pixel).saturating_mul(h)
    }

    /// Total bytes of compressed strips for one frame, if known.
    pub fn compressed_frame_bytes(&self) -> Option<u64> {
        self.strip_byte_counts
            .as_ref()
            .map(|counts| counts.iter().sum())
    }

    /// Full path of a directory source, normalizing the separator.
    pub fn resolved_path(&self) -> Option<PathBuf> {
        match &self.source {
            SourceLocation::Directory(dir) => Some(dir.join(&self.file_name)),
            _ => None,
        }
    }

    /// Full URL of a network source.
    pub fn resolved_url(&self) -> Option<String> {
        match &self.source {
            SourceLocation::Url(base) => Some(format!("{}{}", base, self.file_name)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_per_pixel_table() {
        assert_eq!(PixelEncoding::Gray8.bytes_per_pixel(), 1);
        assert_eq!(PixelEncoding::Bitmap.bytes_per_pixel(), 1);
        assert_eq!(PixelEncoding::Gray12Unsigned.bytes_per_pixel(), 2);
        assert_eq!(PixelEncoding::Gray24Unsigned.bytes_per_pixel(), 4);
        assert_eq!(PixelEncoding::PackedRgb(RgbOrder::Bgr).bytes_per_pixel(), 3);
        assert_eq!(PixelEncoding::PackedRgb(RgbOrder::Barg).bytes_per_pixel(), 4);
        assert_eq!(PixelEncoding::Rgb48Planar.bytes_per_pixel(), 6);
        assert_eq!(PixelEncoding::Gray64Float.bytes_per_pixel(), 8);
    }

    #[test]
    fn test_frame_bytes_packed_forms() {
        let bitmap = FileDescriptor::new(10, 3, PixelEncoding::Bitmap);
        assert_eq!(bitmap.frame_bytes(), 2 * 3);

        let gray12 = FileDescriptor::new(5, 2, PixelEncoding::Gray12Unsigned);
        assert_eq!(gray12.frame_bytes(), 8 * 2);

        let rgb48 = FileDescriptor::new(4, 4, PixelEncoding::Rgb48).with_samples_per_pixel(4);
        assert_eq!(rgb48.channels(), 4);
        assert_eq!(rgb48.frame_bytes(), 4 * 4 * 8);
    }

    #[test]
    fn test_rgb_offsets_are_permutations() {
        for order in [
            RgbOrder::Rgb,
            RgbOrder::Bgr,
            RgbOrder::Argb,
            RgbOrder::Abgr,
            RgbOrder::Barg,
        ] {
            let mut offsets = order.channel_offsets().to_vec();
            offsets.sort_unstable();
            offsets.dedup();
            assert_eq!(offsets.len(), 3, "{order:?}");
            assert!(offsets.iter().all(|&o| o < order.bytes_per_pixel()));
        }
    }

    #[test]
    fn test_encoding_names_roundtrip() {
        for code in 0..20 {
            let enc = PixelEncoding::from_code(code).expect("known code");
            assert_eq!(enc.name().parse::<PixelEncoding>().expect("parse"), enc);
        }
        assert!(PixelEncoding::from_code(42).is_err());
        assert!("gray7".parse::<PixelEncoding>().is_err());
    }

    #[test]
    fn test_compression_flags() {
        assert!(Compression::LzwWithPrediction.is_lzw_family());
        assert!(Compression::LzwWithPrediction.uses_prediction());
        assert!(!Compression::Unknown.is_compressed());
        assert!(Compression::PackBits.is_compressed());
        assert_eq!("zip".parse::<Compression>().expect("parse"), Compression::Deflate);
    }

    #[test]
    fn test_with_path_splits() {
        let desc = FileDescriptor::new(1, 1, PixelEncoding::Gray8).with_path("/tmp/a/b.raw");
        assert_eq!(desc.file_name, "b.raw");
        assert_eq!(desc.resolved_path(), Some(PathBuf::from("/tmp/a/b.raw")));
        assert_eq!(desc.resolved_url(), None);
    }

    #[test]
    fn test_url_concatenation() {
        let desc = FileDescriptor::new(1, 1, PixelEncoding::Gray8)
            .with_url("http://example.org/images/", "blobs.gif");
        assert_eq!(
            desc.resolved_url().as_deref(),
            Some("http://example.org/images/blobs.gif")
        );
    }

    #[test]
    fn test_stream_handle_taken_once() {
        let handle = StreamHandle::new(std::io::Cursor::new(vec![1u8, 2, 3]));
        let shared = handle.clone();
        assert!(shared.is_available());
        assert!(handle.take().is_some());
        assert!(shared.take().is_none());
    }

    #[test]
    fn test_lookup_table_mismatch() {
        assert!(LookupTable::new(vec![0; 4], vec![0; 4], vec![0; 3]).is_err());
        let lut = LookupTable::grayscale(true);
        assert_eq!(lut.len(), 256);
        assert_eq!(lut.rgb(0), Some([255, 255, 255]));
        assert_eq!(lut.rgb(256), None);
    }
}
