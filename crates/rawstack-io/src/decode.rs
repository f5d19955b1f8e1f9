//! Pixel decoder: one frame of raw bytes to a typed buffer.
//!
//! Decoding a frame is a fixed pipeline:
//!
//! ```text
//! skip -> read stored bytes -> decompress -> undo predictor -> unpack
//! ```
//!
//! Unpacking is grouped by layout rather than written per encoding:
//!
//! | Group | Encodings | Output |
//! |-------|-----------|--------|
//! | scalar | gray 1/8/12/16/24/32/64-bit, indexed | `Byte`, `Short` or `Float` |
//! | packed RGB | RGB/BGR/ARGB/ABGR/BARG, CMYK | `Rgb` |
//! | planar | RGB planar, 48-bit RGB (chunky or planar) | `Rgb` or 16-bit channel planes |
//!
//! The decoder keeps no state between calls; decoding the same bytes twice
//! gives the same frame.

use std::io::{self, Read};

use byteorder::{BigEndian, ByteOrder as _, LittleEndian};
use tracing::trace;

use rawstack_core::{
    ByteOrder, Compression, FileDescriptor, FrameData, PixelBuffer, PixelEncoding, PixelFrame,
};

use crate::codec::{self, predictor::PredictorLayout};
use crate::error::{IoError, IoResult};

/// Decodes frames described by one descriptor.
#[derive(Debug, Clone)]
pub struct PixelDecoder<'a> {
    descriptor: &'a FileDescriptor,
    compression: Compression,
    source_name: String,
}

impl<'a> PixelDecoder<'a> {
    /// Decoder using the descriptor's own compression.
    pub fn new(descriptor: &'a FileDescriptor) -> Self {
        Self {
            descriptor,
            compression: descriptor.compression,
            source_name: "stream".to_string(),
        }
    }

    /// Overrides the content compression (gzip transport forces `Unknown`).
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// Names the source in I/O error messages.
    pub fn with_source_name(mut self, name: impl Into<String>) -> Self {
        self.source_name = name.into();
        self
    }

    /// Descriptor being decoded.
    #[inline]
    pub fn descriptor(&self) -> &FileDescriptor {
        self.descriptor
    }

    /// Effective content compression.
    #[inline]
    pub fn compression(&self) -> Compression {
        self.compression
    }

    /// Bytes one frame occupies in the stream, if fixed.
    ///
    /// `None` for compressed frames without strip byte counts: they take
    /// the rest of the stream.
    pub fn stored_frame_bytes(&self) -> Option<u64> {
        if self.compression.is_compressed() {
            self.descriptor.compressed_frame_bytes()
        } else {
            Some(self.descriptor.frame_bytes())
        }
    }

    /// Skips `skip` bytes, then decodes one frame.
    ///
    /// Returns `Ok(None)` when the stream ends before the first byte of the
    /// frame, and [`IoError::Truncated`] when it ends inside the frame.
    pub fn decode_one<R: Read + ?Sized>(&self, reader: &mut R, skip: u64) -> IoResult<Option<PixelFrame>> {
        let skipped = io::copy(&mut Read::take(&mut *reader, skip), &mut io::sink())
            .map_err(|e| self.io_error(e))?;
        if skipped < skip {
            trace!(skip, skipped, "stream ended while skipping");
            return Ok(None);
        }

        let Some(stored) = self.read_stored(reader)? else {
            return Ok(None);
        };

        let frame_bytes = to_usize(self.descriptor.frame_bytes())?;
        let mut raw = if self.compression.is_compressed() {
            codec::decompress(
                self.compression,
                &stored,
                self.descriptor.strip_byte_counts.as_deref(),
                frame_bytes,
            )?
        } else {
            stored
        };

        if self.compression.uses_prediction() {
            codec::predictor::undo(&mut raw, self.predictor_layout(), self.descriptor.byte_order)?;
        }

        let data = self.unpack(&raw)?;
        Ok(Some(PixelFrame::new(self.descriptor.width, self.descriptor.height, data)))
    }

    fn read_stored<R: Read + ?Sized>(&self, reader: &mut R) -> IoResult<Option<Vec<u8>>> {
        let Some(len) = self.stored_frame_bytes() else {
            let mut rest = Vec::new();
            reader.read_to_end(&mut rest).map_err(|e| self.io_error(e))?;
            return Ok((!rest.is_empty()).then_some(rest));
        };
        let mut buf = alloc::<u8>(to_usize(len)?)?;
        let got = read_full(reader, &mut buf).map_err(|e| self.io_error(e))?;
        match got {
            0 => Ok(None),
            n if (n as u64) < len => Err(IoError::Truncated {
                expected: len,
                got: n as u64,
            }),
            _ => Ok(Some(buf)),
        }
    }

    fn io_error(&self, err: io::Error) -> IoError {
        IoError::io(self.source_name.clone(), err)
    }

    fn predictor_layout(&self) -> PredictorLayout {
        let d = self.descriptor;
        let w = d.width as usize;
        let h = (d.height as usize).max(1);
        let (row_bytes, components, sample_bytes) = match d.encoding {
            PixelEncoding::PackedRgb(order) => (w * order.bytes_per_pixel(), order.bytes_per_pixel(), 1),
            PixelEncoding::Cmyk => (w * 4, 4, 1),
            PixelEncoding::RgbPlanar => (w, 1, 1),
            PixelEncoding::Rgb48 => (w * d.channels() * 2, d.channels(), 2),
            PixelEncoding::Rgb48Planar => (w * 2, 1, 2),
            other => (d.frame_bytes() as usize / h, 1, other.bytes_per_sample()),
        };
        PredictorLayout {
            row_bytes,
            components,
            sample_bytes,
        }
    }

    fn unpack(&self, raw: &[u8]) -> IoResult<FrameData> {
        let d = self.descriptor;
        let pixels = d.pixel_count()?;
        let data = match d.encoding {
            PixelEncoding::PackedRgb(order) => FrameData::Single(PixelBuffer::Rgb(unpack_packed_rgb(
                raw,
                pixels,
                order.bytes_per_pixel(),
                order.channel_offsets(),
            )?)),
            PixelEncoding::Cmyk => {
                let mut rgb = unpack_cmyk(raw, pixels)?;
                invert_rgb(&mut rgb);
                FrameData::Single(PixelBuffer::Rgb(rgb))
            }
            PixelEncoding::RgbPlanar => FrameData::Single(PixelBuffer::Rgb(unpack_rgb_planar(raw, pixels)?)),
            PixelEncoding::Rgb48 => {
                FrameData::Channels(unpack_rgb48(raw, pixels, d.channels(), d.byte_order, false)?)
            }
            PixelEncoding::Rgb48Planar => {
                FrameData::Channels(unpack_rgb48(raw, pixels, d.channels(), d.byte_order, true)?)
            }
            scalar => FrameData::Single(unpack_scalar(scalar, raw, d.width, d.height, d.byte_order)?),
        };
        Ok(data)
    }
}

// === Scalar ===

fn unpack_scalar(
    encoding: PixelEncoding,
    raw: &[u8],
    width: u32,
    height: u32,
    order: ByteOrder,
) -> IoResult<PixelBuffer> {
    let w = width as usize;
    let h = height as usize;
    let pixels = w * h;
    let buf = match encoding {
        PixelEncoding::Gray8 | PixelEncoding::Color8 => {
            let mut out = alloc::<u8>(pixels)?;
            out.copy_from_slice(&raw[..pixels]);
            PixelBuffer::Byte(out)
        }
        PixelEncoding::Bitmap => PixelBuffer::Byte(unpack_bitmap(raw, w, h)?),
        PixelEncoding::Gray16Unsigned => PixelBuffer::Short(read_shorts(raw, pixels, order)?),
        PixelEncoding::Gray16Signed => {
            let mut out = read_shorts(raw, pixels, order)?;
            out.iter_mut().for_each(|v| *v ^= 0x8000);
            PixelBuffer::Short(out)
        }
        PixelEncoding::Gray12Unsigned => PixelBuffer::Short(unpack_gray12(raw, w, h)?),
        PixelEncoding::Gray24Unsigned => PixelBuffer::Float(unpack_gray24(raw, pixels, order)?),
        PixelEncoding::Gray32Int => {
            let mut ints = alloc::<i32>(pixels)?;
            match order {
                ByteOrder::Big => BigEndian::read_i32_into(&raw[..pixels * 4], &mut ints),
                ByteOrder::Little => {
                    LittleEndian::read_i32_into(&raw[..pixels * 4], &mut ints)
                }
            }
            PixelBuffer::Float(to_floats(&ints, |v| v as f32)?)
        }
        PixelEncoding::Gray32Unsigned => {
            let mut ints = alloc::<u32>(pixels)?;
            match order {
                ByteOrder::Big => BigEndian::read_u32_into(&raw[..pixels * 4], &mut ints),
                ByteOrder::Little => {
                    LittleEndian::read_u32_into(&raw[..pixels * 4], &mut ints)
                }
            }
            PixelBuffer::Float(to_floats(&ints, |v| v as f32)?)
        }
        PixelEncoding::Gray32Float => {
            let mut out = alloc::<f32>(pixels)?;
            match order {
                ByteOrder::Big => BigEndian::read_f32_into(&raw[..pixels * 4], &mut out),
                ByteOrder::Little => {
                    LittleEndian::read_f32_into(&raw[..pixels * 4], &mut out)
                }
            }
            PixelBuffer::Float(out)
        }
        PixelEncoding::Gray64Float => {
            let mut wide = alloc::<f64>(pixels)?;
            match order {
                ByteOrder::Big => BigEndian::read_f64_into(&raw[..pixels * 8], &mut wide),
                ByteOrder::Little => {
                    LittleEndian::read_f64_into(&raw[..pixels * 8], &mut wide)
                }
            }
            PixelBuffer::Float(to_floats(&wide, |v| v as f32)?)
        }
        other => {
            return Err(IoError::UnsupportedEncoding(format!("{other} is not a scalar encoding")));
        }
    };
    Ok(buf)
}

fn read_shorts(raw: &[u8], pixels: usize, order: ByteOrder) -> IoResult<Vec<u16>> {
    let mut out = alloc::<u16>(pixels)?;
    let src = &raw[..pixels * 2];
    match order {
        ByteOrder::Big => BigEndian::read_u16_into(src, &mut out),
        ByteOrder::Little => LittleEndian::read_u16_into(src, &mut out),
    }
    Ok(out)
}

/// MSB-first bits, rows padded to whole bytes; a set bit is 255.
fn unpack_bitmap(raw: &[u8], w: usize, h: usize) -> IoResult<Vec<u8>> {
    let row_bytes = w.div_ceil(8);
    let mut out = alloc::<u8>(w * h)?;
    for (y, dst) in out.chunks_exact_mut(w.max(1)).enumerate().take(h) {
        let row = &raw[y * row_bytes..(y + 1) * row_bytes];
        for (x, px) in dst.iter_mut().enumerate() {
            if row[x / 8] & (0x80 >> (x % 8)) != 0 {
                *px = 255;
            }
        }
    }
    Ok(out)
}

/// Two pixels in three bytes: `aaaaaaaa aaaabbbb bbbbbbbb`.
fn unpack_gray12(raw: &[u8], w: usize, h: usize) -> IoResult<Vec<u16>> {
    let row_bytes = (w * 3).div_ceil(2);
    let mut out = alloc::<u16>(w * h)?;
    for (y, dst) in out.chunks_exact_mut(w.max(1)).enumerate().take(h) {
        let row = &raw[y * row_bytes..(y + 1) * row_bytes];
        for (pair, px) in dst.chunks_mut(2).enumerate() {
            let b = &row[pair * 3..];
            px[0] = ((b[0] as u16) << 4) | ((b[1] as u16) >> 4);
            if let Some(second) = px.get_mut(1) {
                *second = (((b[1] & 0x0f) as u16) << 8) | b[2] as u16;
            }
        }
    }
    Ok(out)
}

fn unpack_gray24(raw: &[u8], pixels: usize, order: ByteOrder) -> IoResult<Vec<f32>> {
    let mut out = alloc::<f32>(pixels)?;
    for (px, b) in out.iter_mut().zip(raw.chunks_exact(3)) {
        let v = match order {
            ByteOrder::Big => BigEndian::read_u24(b),
            ByteOrder::Little => LittleEndian::read_u24(b),
        };
        *px = v as f32;
    }
    Ok(out)
}

fn to_floats<T: Copy>(src: &[T], convert: impl Fn(T) -> f32) -> IoResult<Vec<f32>> {
    let mut out = alloc::<f32>(src.len())?;
    for (dst, &v) in out.iter_mut().zip(src) {
        *dst = convert(v);
    }
    Ok(out)
}

// === Packed RGB ===

#[inline]
fn pack_rgb(r: u8, g: u8, b: u8) -> u32 {
    0xff00_0000 | ((r as u32) << 16) | ((g as u32) << 8) | b as u32
}

fn unpack_packed_rgb(raw: &[u8], pixels: usize, bpp: usize, [ri, gi, bi]: [usize; 3]) -> IoResult<Vec<u32>> {
    let mut out = alloc::<u32>(pixels)?;
    for (px, p) in out.iter_mut().zip(raw.chunks_exact(bpp)) {
        *px = pack_rgb(p[ri], p[gi], p[bi]);
    }
    Ok(out)
}

/// Undercolor removal: `c' = c * (256 - k) / 256 + k`, then inverted.
fn unpack_cmyk(raw: &[u8], pixels: usize) -> IoResult<Vec<u32>> {
    let mut out = alloc::<u32>(pixels)?;
    for (px, p) in out.iter_mut().zip(raw.chunks_exact(4)) {
        let k = p[3] as u32;
        let ucr = |c: u8| (((c as u32 * (256 - k)) >> 8) + k).min(255) as u8;
        *px = pack_rgb(ucr(p[0]), ucr(p[1]), ucr(p[2]));
    }
    Ok(out)
}

fn invert_rgb(pixels: &mut [u32]) {
    for px in pixels {
        *px = 0xff00_0000 | (!*px & 0x00ff_ffff);
    }
}

// === Planar ===

fn unpack_rgb_planar(raw: &[u8], pixels: usize) -> IoResult<Vec<u32>> {
    let (r, rest) = raw.split_at(pixels);
    let (g, b) = rest.split_at(pixels);
    let mut out = alloc::<u32>(pixels)?;
    for (i, px) in out.iter_mut().enumerate() {
        *px = pack_rgb(r[i], g[i], b[i]);
    }
    Ok(out)
}

fn unpack_rgb48(
    raw: &[u8],
    pixels: usize,
    channels: usize,
    order: ByteOrder,
    planar: bool,
) -> IoResult<Vec<PixelBuffer>> {
    let samples = read_shorts(raw, pixels * channels, order)?;
    let mut planes = Vec::with_capacity(channels);
    for c in 0..channels {
        let mut plane = alloc::<u16>(pixels)?;
        if planar {
            plane.copy_from_slice(&samples[c * pixels..(c + 1) * pixels]);
        } else {
            for (i, v) in plane.iter_mut().enumerate() {
                *v = samples[i * channels + c];
            }
        }
        planes.push(PixelBuffer::Short(plane));
    }
    Ok(planes)
}

// === Helpers ===

/// Zeroed vector of `len` elements; allocation failure is an error.
pub(crate) fn alloc<T: Clone + Default>(len: usize) -> IoResult<Vec<T>> {
    let mut v = Vec::new();
    v.try_reserve_exact(len).map_err(|_| IoError::Allocation {
        requested: len.saturating_mul(std::mem::size_of::<T>()),
    })?;
    v.resize(len, T::default());
    Ok(v)
}

fn to_usize(n: u64) -> IoResult<usize> {
    usize::try_from(n).map_err(|_| IoError::Allocation {
        requested: usize::MAX,
    })
}

/// Reads until `buf` is full or the stream ends; returns bytes read.
fn read_full<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rawstack_core::RgbOrder;
    use std::io::Cursor;

    fn decode(desc: &FileDescriptor, bytes: Vec<u8>) -> PixelFrame {
        PixelDecoder::new(desc)
            .decode_one(&mut Cursor::new(bytes), 0)
            .expect("decode")
            .expect("frame")
    }

    #[test]
    fn test_gray16_byte_order() {
        let big = FileDescriptor::new(1, 1, PixelEncoding::Gray16Unsigned);
        let frame = decode(&big, vec![0x01, 0x02]);
        assert_eq!(frame.data.single().and_then(PixelBuffer::as_shorts), Some(&[0x0102u16][..]));

        let little = big.clone().with_byte_order(ByteOrder::Little);
        let frame = decode(&little, vec![0x01, 0x02]);
        assert_eq!(frame.data.single().and_then(PixelBuffer::as_shorts), Some(&[0x0201u16][..]));
    }

    #[test]
    fn test_signed16_offset() {
        let desc = FileDescriptor::new(3, 1, PixelEncoding::Gray16Signed);
        // -32768, 0, 32767
        let frame = decode(&desc, vec![0x80, 0x00, 0x00, 0x00, 0x7f, 0xff]);
        assert_eq!(
            frame.data.single().and_then(PixelBuffer::as_shorts),
            Some(&[0u16, 32768, 65535][..])
        );
        assert_eq!(frame.range, Some((0.0, 65535.0)));
    }

    #[test]
    fn test_bitmap_msb_first_padded_rows() {
        let desc = FileDescriptor::new(10, 2, PixelEncoding::Bitmap);
        let frame = decode(&desc, vec![0b1000_0001, 0b0100_0000, 0xff, 0x00]);
        let px = frame.data.single().and_then(PixelBuffer::as_bytes).expect("bytes");
        assert_eq!(&px[..10], &[255, 0, 0, 0, 0, 0, 0, 255, 0, 255]);
        assert_eq!(&px[10..], &[255, 255, 255, 255, 255, 255, 255, 255, 0, 0]);
    }

    #[test]
    fn test_gray12_pairs_and_odd_width() {
        let desc = FileDescriptor::new(3, 1, PixelEncoding::Gray12Unsigned);
        // 0xabc, 0x123, 0xfff (+ pad nibble)
        let frame = decode(&desc, vec![0xab, 0xc1, 0x23, 0xff, 0xf0]);
        assert_eq!(
            frame.data.single().and_then(PixelBuffer::as_shorts),
            Some(&[0xabcu16, 0x123, 0xfff][..])
        );
    }

    #[test]
    fn test_gray24_and_float_types() {
        let desc = FileDescriptor::new(2, 1, PixelEncoding::Gray24Unsigned).with_byte_order(ByteOrder::Little);
        let frame = decode(&desc, vec![0x01, 0x00, 0x00, 0x00, 0x00, 0x01]);
        let px = frame.data.single().and_then(PixelBuffer::as_floats).expect("floats");
        assert_relative_eq!(px[0], 1.0);
        assert_relative_eq!(px[1], 65536.0);

        let desc = FileDescriptor::new(1, 1, PixelEncoding::Gray32Int);
        let frame = decode(&desc, (-5i32).to_be_bytes().to_vec());
        assert_relative_eq!(frame.data.single().and_then(PixelBuffer::as_floats).expect("f")[0], -5.0);

        let desc = FileDescriptor::new(1, 1, PixelEncoding::Gray64Float).with_byte_order(ByteOrder::Little);
        let frame = decode(&desc, 2.5f64.to_le_bytes().to_vec());
        assert_relative_eq!(frame.data.single().and_then(PixelBuffer::as_floats).expect("f")[0], 2.5);
    }

    #[test]
    fn test_packed_orders() {
        let bgr = FileDescriptor::new(1, 1, PixelEncoding::PackedRgb(RgbOrder::Bgr));
        let frame = decode(&bgr, vec![0x30, 0x20, 0x10]);
        assert_eq!(frame.data.single().and_then(PixelBuffer::as_rgb), Some(&[0xff10_2030u32][..]));

        let barg = FileDescriptor::new(1, 1, PixelEncoding::PackedRgb(RgbOrder::Barg));
        let frame = decode(&barg, vec![0x30, 0x00, 0x10, 0x20]);
        assert_eq!(frame.data.single().and_then(PixelBuffer::as_rgb), Some(&[0xff10_2030u32][..]));

        let argb = FileDescriptor::new(1, 1, PixelEncoding::PackedRgb(RgbOrder::Argb));
        let frame = decode(&argb, vec![0x00, 0x10, 0x20, 0x30]);
        assert_eq!(frame.data.single().and_then(PixelBuffer::as_rgb), Some(&[0xff10_2030u32][..]));
    }

    #[test]
    fn test_cmyk_inverted_and_repeatable() {
        let desc = FileDescriptor::new(2, 1, PixelEncoding::Cmyk);
        let bytes = vec![0, 0, 0, 0, 255, 0, 0, 0];
        let first = decode(&desc, bytes.clone());
        let second = decode(&desc, bytes);
        assert_eq!(first, second);
        // no ink is white, full cyan is red-less
        assert_eq!(first.data.single().and_then(PixelBuffer::as_rgb), Some(&[0xffff_ffffu32, 0xff00_ffff][..]));
    }

    #[test]
    fn test_rgb_planar() {
        let desc = FileDescriptor::new(2, 1, PixelEncoding::RgbPlanar);
        let frame = decode(&desc, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(
            frame.data.single().and_then(PixelBuffer::as_rgb),
            Some(&[0xff01_0305u32, 0xff02_0406][..])
        );
    }

    #[test]
    fn test_rgb48_channels() {
        let desc = FileDescriptor::new(2, 1, PixelEncoding::Rgb48);
        let frame = decode(&desc, vec![0, 1, 0, 2, 0, 3, 0, 4, 0, 5, 0, 6]);
        let planes: Vec<_> = frame.data.planes().map(|p| p.as_shorts().expect("short").to_vec()).collect();
        assert_eq!(planes, vec![vec![1, 4], vec![2, 5], vec![3, 6]]);
        assert_eq!(frame.range, Some((1.0, 6.0)));

        let planar = FileDescriptor::new(2, 1, PixelEncoding::Rgb48Planar).with_samples_per_pixel(4);
        let frame = decode(&planar, (1u16..=8).flat_map(u16::to_be_bytes).collect());
        let planes: Vec<_> = frame.data.planes().map(|p| p.as_shorts().expect("short").to_vec()).collect();
        assert_eq!(planes, vec![vec![1, 2], vec![3, 4], vec![5, 6], vec![7, 8]]);
    }

    #[test]
    fn test_skip_eof_and_truncation() {
        let desc = FileDescriptor::new(2, 2, PixelEncoding::Gray8);
        let decoder = PixelDecoder::new(&desc);

        let mut short_skip = Cursor::new(vec![0u8; 3]);
        assert!(decoder.decode_one(&mut short_skip, 10).expect("ok").is_none());

        let mut empty = Cursor::new(Vec::<u8>::new());
        assert!(decoder.decode_one(&mut empty, 0).expect("ok").is_none());

        let mut partial = Cursor::new(vec![1u8, 2, 3]);
        let err = decoder.decode_one(&mut partial, 0).expect_err("truncated");
        assert!(matches!(err, IoError::Truncated { expected: 4, got: 3 }));

        let mut skipped = Cursor::new(vec![9u8, 9, 1, 2, 3, 4]);
        let frame = decoder.decode_one(&mut skipped, 2).expect("ok").expect("frame");
        assert_eq!(frame.data.single().and_then(PixelBuffer::as_bytes), Some(&[1u8, 2, 3, 4][..]));
    }

    #[test]
    fn test_packbits_frame() {
        let desc = FileDescriptor::new(4, 1, PixelEncoding::Gray8).with_compression(Compression::PackBits);
        let frame = decode(&desc, vec![0xfd, 7]);
        assert_eq!(frame.data.single().and_then(PixelBuffer::as_bytes), Some(&[7u8, 7, 7, 7][..]));
    }
}
