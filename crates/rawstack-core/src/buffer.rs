//! Decoded pixel buffers, frames and images.
//!
//! A [`PixelBuffer`] is a flat typed array; a [`PixelFrame`] is one decoded
//! 2-D plane (or a small set of channel planes for 48-bit RGB); a
//! [`DecodedImage`] owns the frames of one decode call together with its
//! color model and calibration. Nothing here refers back to the decoder:
//! ownership moves entirely to the caller.

use crate::calibration::Calibration;
use crate::descriptor::{LookupTable, PixelEncoding};

// === Pixel buffer ===

/// Flat, contiguous, typed sample array.
#[derive(Debug, Clone, PartialEq)]
pub enum PixelBuffer {
    /// 8-bit samples (gray, indexed, bitmap expanded to 0/255).
    Byte(Vec<u8>),
    /// 16-bit samples (12/16-bit gray, 48-bit RGB channels).
    Short(Vec<u16>),
    /// 32-bit float samples (all 24/32/64-bit scalar encodings).
    Float(Vec<f32>),
    /// Packed `0xAARRGGBB` pixels with opaque alpha.
    Rgb(Vec<u32>),
}

impl PixelBuffer {
    /// Number of elements.
    pub fn len(&self) -> usize {
        match self {
            Self::Byte(v) => v.len(),
            Self::Short(v) => v.len(),
            Self::Float(v) => v.len(),
            Self::Rgb(v) => v.len(),
        }
    }

    /// Returns `true` if the buffer has no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Short name of the element type.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Byte(_) => "byte",
            Self::Short(_) => "short",
            Self::Float(_) => "float",
            Self::Rgb(_) => "rgb",
        }
    }

    /// Bit depth of one element as seen by calibration (8, 16, 24 or 32).
    pub fn bit_depth(&self) -> u32 {
        match self {
            Self::Byte(_) => 8,
            Self::Short(_) => 16,
            Self::Float(_) => 32,
            Self::Rgb(_) => 24,
        }
    }

    /// Minimum and maximum sample value.
    ///
    /// RGB pixels contribute each of their three channels. NaN float
    /// samples are ignored. Returns `None` for an empty buffer.
    pub fn sample_range(&self) -> Option<(f64, f64)> {
        fn fold<I: Iterator<Item = f64>>(iter: I) -> Option<(f64, f64)> {
            iter.fold(None, |acc, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
        }
        match self {
            Self::Byte(v) => fold(v.iter().map(|&s| s as f64)),
            Self::Short(v) => fold(v.iter().map(|&s| s as f64)),
            Self::Float(v) => fold(v.iter().filter(|s| !s.is_nan()).map(|&s| s as f64)),
            Self::Rgb(v) => fold(v.iter().flat_map(|&p| {
                [(p >> 16) & 0xff, (p >> 8) & 0xff, p & 0xff]
                    .into_iter()
                    .map(|c| c as f64)
            })),
        }
    }

    /// Byte samples, if this is a byte buffer.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Byte(v) => Some(v),
            _ => None,
        }
    }

    /// 16-bit samples, if this is a short buffer.
    pub fn as_shorts(&self) -> Option<&[u16]> {
        match self {
            Self::Short(v) => Some(v),
            _ => None,
        }
    }

    /// Float samples, if this is a float buffer.
    pub fn as_floats(&self) -> Option<&[f32]> {
        match self {
            Self::Float(v) => Some(v),
            _ => None,
        }
    }

    /// Packed RGB pixels, if this is an RGB buffer.
    pub fn as_rgb(&self) -> Option<&[u32]> {
        match self {
            Self::Rgb(v) => Some(v),
            _ => None,
        }
    }
}

// === Frame ===

/// Samples of one frame: a single buffer or per-channel planes.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameData {
    /// One buffer of `width * height` elements.
    Single(PixelBuffer),
    /// One buffer per channel, each `width * height` elements.
    Channels(Vec<PixelBuffer>),
}

impl FrameData {
    /// Number of channel planes (1 for single-buffer frames).
    pub fn channel_count(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Channels(planes) => planes.len(),
        }
    }

    /// Total number of elements over all planes.
    pub fn total_len(&self) -> usize {
        match self {
            Self::Single(b) => b.len(),
            Self::Channels(planes) => planes.iter().map(PixelBuffer::len).sum(),
        }
    }

    /// Iterates over the planes.
    pub fn planes(&self) -> impl Iterator<Item = &PixelBuffer> {
        let slice: &[PixelBuffer] = match self {
            Self::Single(b) => std::slice::from_ref(b),
            Self::Channels(planes) => planes,
        };
        slice.iter()
    }

    /// The single buffer, if the frame is not split into channels.
    pub fn single(&self) -> Option<&PixelBuffer> {
        match self {
            Self::Single(b) => Some(b),
            Self::Channels(_) => None,
        }
    }

    /// Minimum and maximum over all planes.
    pub fn sample_range(&self) -> Option<(f64, f64)> {
        self.planes()
            .filter_map(PixelBuffer::sample_range)
            .reduce(|(lo, hi), (l, h)| (lo.min(l), hi.max(h)))
    }
}

/// One decoded frame.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelFrame {
    /// Frame width.
    pub width: u32,
    /// Frame height.
    pub height: u32,
    /// Decoded samples.
    pub data: FrameData,
    /// Observed sample range, for formats whose default display range
    /// comes from the data (16-bit, float, 48-bit RGB).
    pub range: Option<(f64, f64)>,
    /// Optional label.
    pub label: Option<String>,
}

impl PixelFrame {
    /// Builds a frame and records its sample range when useful.
    pub fn new(width: u32, height: u32, data: FrameData) -> Self {
        let track = match &data {
            FrameData::Single(PixelBuffer::Short(_)) | FrameData::Single(PixelBuffer::Float(_)) => true,
            FrameData::Channels(_) => true,
            _ => false,
        };
        let range = if track { data.sample_range() } else { None };
        Self {
            width,
            height,
            data,
            range,
            label: None,
        }
    }
}

// === Color model ===

/// How sample values map to display colors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColorModelSpec {
    /// Palette lookup.
    Indexed(LookupTable),
    /// Linear gray ramp; inverted when zero is white.
    Grayscale {
        /// Zero displays as white.
        inverted: bool,
    },
}

impl ColorModelSpec {
    /// Number of palette entries (256 for the gray ramp).
    pub fn size(&self) -> usize {
        match self {
            Self::Indexed(lut) => lut.len(),
            Self::Grayscale { .. } => 256,
        }
    }
}

// === Decoded image ===

/// Why a stack decode stopped before the requested frame count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartialReason {
    /// The stream ended.
    EndOfStream,
    /// A frame buffer could not be allocated.
    OutOfMemory,
    /// The caller asked to stop.
    Cancelled,
}

/// Whether all requested frames were decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completeness {
    /// All frames decoded.
    Complete,
    /// Fewer frames than requested.
    Partial {
        /// Frames requested by the descriptor.
        requested: u32,
        /// Why decoding stopped.
        reason: PartialReason,
    },
}

impl Completeness {
    /// Returns `true` for a partial result.
    pub fn is_partial(&self) -> bool {
        matches!(self, Self::Partial { .. })
    }
}

/// Result of one decode call.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    /// Image name (file name, possibly overridden by the description).
    pub name: String,
    /// Frame width.
    pub width: u32,
    /// Frame height.
    pub height: u32,
    /// Encoding the frames were decoded from.
    pub encoding: PixelEncoding,
    /// Decoded frames, in stream order.
    pub frames: Vec<PixelFrame>,
    /// Color model.
    pub color_model: ColorModelSpec,
    /// Calibration; a default calibration until resolved.
    pub calibration: Calibration,
    /// Whether every requested frame was decoded.
    pub completeness: Completeness,
    /// Label of a single-image result.
    pub label: Option<String>,
    /// Free-form info text.
    pub info: Option<String>,
    /// Channel names of multi-channel frames (48-bit RGB).
    pub channel_labels: Vec<String>,
}

impl DecodedImage {
    /// Number of frames.
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Number of planes counted the way hyperstack decomposition sees
    /// them: frames times channels per frame.
    pub fn stack_size(&self) -> usize {
        self.frames.iter().map(|f| f.data.channel_count()).sum()
    }

    /// Bit depth of the first plane (0 if there are no frames).
    pub fn bit_depth(&self) -> u32 {
        self.frames
            .first()
            .and_then(|f| f.data.planes().next())
            .map(PixelBuffer::bit_depth)
            .unwrap_or(0)
    }

    /// Sample range over every frame.
    pub fn stack_range(&self) -> Option<(f64, f64)> {
        self.frames
            .iter()
            .filter_map(|f| f.data.sample_range())
            .reduce(|(lo, hi), (l, h)| (lo.min(l), hi.max(h)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_range_short() {
        let buf = PixelBuffer::Short(vec![7, 3, 900, 12]);
        assert_eq!(buf.sample_range(), Some((3.0, 900.0)));
        assert_eq!(PixelBuffer::Short(vec![]).sample_range(), None);
    }

    #[test]
    fn test_sample_range_rgb_uses_channels() {
        let buf = PixelBuffer::Rgb(vec![0xff10_2030, 0xff05_0607]);
        assert_eq!(buf.sample_range(), Some((5.0, 0x30 as f64)));
    }

    #[test]
    fn test_sample_range_skips_nan() {
        let buf = PixelBuffer::Float(vec![f32::NAN, -1.5, 2.0]);
        assert_eq!(buf.sample_range(), Some((-1.5, 2.0)));
    }

    #[test]
    fn test_frame_range_tracking() {
        let bytes = PixelFrame::new(2, 1, FrameData::Single(PixelBuffer::Byte(vec![1, 2])));
        assert_eq!(bytes.range, None);

        let shorts = PixelFrame::new(2, 1, FrameData::Single(PixelBuffer::Short(vec![10, 2])));
        assert_eq!(shorts.range, Some((2.0, 10.0)));

        let planes = FrameData::Channels(vec![
            PixelBuffer::Short(vec![5, 6]),
            PixelBuffer::Short(vec![1, 60]),
            PixelBuffer::Short(vec![9, 9]),
        ]);
        let rgb48 = PixelFrame::new(2, 1, planes);
        assert_eq!(rgb48.range, Some((1.0, 60.0)));
        assert_eq!(rgb48.data.channel_count(), 3);
        assert_eq!(rgb48.data.total_len(), 6);
    }
}
