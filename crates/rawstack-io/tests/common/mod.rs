//! Synthetic raw frames for integration tests.
//!
//! [`encode_frame`] writes the bytes of one frame for any descriptor and
//! returns the frame data the decoder is expected to produce from them.

#![allow(dead_code)]

use std::io::Write;

use rawstack_core::{ByteOrder, FileDescriptor, FrameData, PixelBuffer, PixelEncoding, RgbOrder};

/// Every encoding, in file-type code order.
pub fn all_encodings() -> Vec<PixelEncoding> {
    (0..20)
        .map(|code| PixelEncoding::from_code(code).expect("known code"))
        .collect()
}

fn put_u16(out: &mut Vec<u8>, v: u16, order: ByteOrder) {
    out.extend_from_slice(&match order {
        ByteOrder::Big => v.to_be_bytes(),
        ByteOrder::Little => v.to_le_bytes(),
    });
}

fn put_u32(out: &mut Vec<u8>, v: u32, order: ByteOrder) {
    out.extend_from_slice(&match order {
        ByteOrder::Big => v.to_be_bytes(),
        ByteOrder::Little => v.to_le_bytes(),
    });
}

fn put_u64(out: &mut Vec<u8>, v: u64, order: ByteOrder) {
    out.extend_from_slice(&match order {
        ByteOrder::Big => v.to_be_bytes(),
        ByteOrder::Little => v.to_le_bytes(),
    });
}

fn pack(r: u8, g: u8, b: u8) -> u32 {
    0xff00_0000 | ((r as u32) << 16) | ((g as u32) << 8) | b as u32
}

/// Raw bytes of one frame plus the decoded data they must produce.
///
/// `seed` varies the content so that frames of a stack differ.
pub fn encode_frame(desc: &FileDescriptor, seed: u32) -> (Vec<u8>, FrameData) {
    let w = desc.width as usize;
    let h = desc.height as usize;
    let n = w * h;
    let order = desc.byte_order;
    let s = seed as usize;
    let mut out = Vec::new();

    let data = match desc.encoding {
        PixelEncoding::Gray8 | PixelEncoding::Color8 => {
            let v: Vec<u8> = (0..n).map(|i| (i * 7 + s) as u8).collect();
            out.extend_from_slice(&v);
            FrameData::Single(PixelBuffer::Byte(v))
        }
        PixelEncoding::Bitmap => {
            let on = |x: usize, y: usize| (x + y + s) % 3 == 0;
            let mut expected = Vec::with_capacity(n);
            for y in 0..h {
                let mut row = vec![0u8; w.div_ceil(8)];
                for x in 0..w {
                    if on(x, y) {
                        row[x / 8] |= 0x80 >> (x % 8);
                        expected.push(255);
                    } else {
                        expected.push(0);
                    }
                }
                out.extend_from_slice(&row);
            }
            FrameData::Single(PixelBuffer::Byte(expected))
        }
        PixelEncoding::Gray16Unsigned => {
            let v: Vec<u16> = (0..n).map(|i| (i * 331 + s * 17) as u16).collect();
            v.iter().for_each(|&x| put_u16(&mut out, x, order));
            FrameData::Single(PixelBuffer::Short(v))
        }
        PixelEncoding::Gray16Signed => {
            let signed: Vec<i16> = (0..n).map(|i| (i as i32 * 97 - 1000 + seed as i32) as i16).collect();
            signed.iter().for_each(|&x| put_u16(&mut out, x as u16, order));
            FrameData::Single(PixelBuffer::Short(
                signed.iter().map(|&x| (x as i32 + 32768) as u16).collect(),
            ))
        }
        PixelEncoding::Gray12Unsigned => {
            let v: Vec<u16> = (0..n).map(|i| ((i * 37 + s) & 0xfff) as u16).collect();
            for row in v.chunks(w) {
                for pair in row.chunks(2) {
                    let a = pair[0];
                    let b = pair.get(1).copied().unwrap_or(0);
                    out.push((a >> 4) as u8);
                    out.push((((a & 0xf) << 4) | (b >> 8)) as u8);
                    if pair.len() == 2 {
                        out.push((b & 0xff) as u8);
                    }
                }
            }
            FrameData::Single(PixelBuffer::Short(v))
        }
        PixelEncoding::Gray24Unsigned => {
            let v: Vec<u32> = (0..n).map(|i| ((i * 40_503 + s) & 0xff_ffff) as u32).collect();
            for &x in &v {
                let b = x.to_be_bytes();
                match order {
                    ByteOrder::Big => out.extend_from_slice(&b[1..]),
                    ByteOrder::Little => out.extend_from_slice(&[b[3], b[2], b[1]]),
                }
            }
            FrameData::Single(PixelBuffer::Float(v.iter().map(|&x| x as f32).collect()))
        }
        PixelEncoding::Gray32Int => {
            let v: Vec<i32> = (0..n).map(|i| i as i32 * -3 + seed as i32).collect();
            v.iter().for_each(|&x| put_u32(&mut out, x as u32, order));
            FrameData::Single(PixelBuffer::Float(v.iter().map(|&x| x as f32).collect()))
        }
        PixelEncoding::Gray32Unsigned => {
            let v: Vec<u32> = (0..n).map(|i| (i * 5 + s) as u32).collect();
            v.iter().for_each(|&x| put_u32(&mut out, x, order));
            FrameData::Single(PixelBuffer::Float(v.iter().map(|&x| x as f32).collect()))
        }
        PixelEncoding::Gray32Float => {
            let v: Vec<f32> = (0..n).map(|i| i as f32 * 0.5 - 3.0 + seed as f32).collect();
            v.iter().for_each(|&x| put_u32(&mut out, x.to_bits(), order));
            FrameData::Single(PixelBuffer::Float(v))
        }
        PixelEncoding::Gray64Float => {
            let v: Vec<f64> = (0..n).map(|i| i as f64 * 0.25 + seed as f64).collect();
            v.iter().for_each(|&x| put_u64(&mut out, x.to_bits(), order));
            FrameData::Single(PixelBuffer::Float(v.iter().map(|&x| x as f32).collect()))
        }
        PixelEncoding::PackedRgb(rgb_order) => {
            let bpp = rgb_order.bytes_per_pixel();
            let [ri, gi, bi] = rgb_order.channel_offsets();
            let mut expected = Vec::with_capacity(n);
            for i in 0..n {
                let (r, g, b) = ((i * 3 + s) as u8, (i * 5 + s) as u8, (i * 11 + s) as u8);
                let mut px = vec![0x7fu8; bpp];
                px[ri] = r;
                px[gi] = g;
                px[bi] = b;
                out.extend_from_slice(&px);
                expected.push(pack(r, g, b));
            }
            FrameData::Single(PixelBuffer::Rgb(expected))
        }
        PixelEncoding::RgbPlanar => {
            let planes: Vec<Vec<u8>> = (0..3)
                .map(|c| (0..n).map(|i| (i * (c + 2) + s) as u8).collect())
                .collect();
            planes.iter().for_each(|p| out.extend_from_slice(p));
            FrameData::Single(PixelBuffer::Rgb(
                (0..n).map(|i| pack(planes[0][i], planes[1][i], planes[2][i])).collect(),
            ))
        }
        PixelEncoding::Cmyk => {
            let mut expected = Vec::with_capacity(n);
            for i in 0..n {
                let cmyk = [(i * 13 + s) as u8, (i * 29) as u8, (i * 3) as u8, (i * 17 + s) as u8];
                out.extend_from_slice(&cmyk);
                let k = cmyk[3] as u32;
                let ch = |c: u8| 255 - (((c as u32 * (256 - k)) >> 8) + k) as u8;
                expected.push(pack(ch(cmyk[0]), ch(cmyk[1]), ch(cmyk[2])));
            }
            FrameData::Single(PixelBuffer::Rgb(expected))
        }
        PixelEncoding::Rgb48 | PixelEncoding::Rgb48Planar => {
            let channels = desc.channels();
            let planes: Vec<Vec<u16>> = (0..channels)
                .map(|c| (0..n).map(|i| (i * 100 + c * 1000 + s) as u16).collect())
                .collect();
            if desc.encoding == PixelEncoding::Rgb48Planar {
                planes.iter().flatten().for_each(|&v| put_u16(&mut out, v, order));
            } else {
                for i in 0..n {
                    planes.iter().for_each(|p| put_u16(&mut out, p[i], order));
                }
            }
            FrameData::Channels(planes.into_iter().map(PixelBuffer::Short).collect())
        }
    };
    assert_eq!(out.len() as u64, desc.frame_bytes(), "{} frame size", desc.encoding);
    (out, data)
}

/// Concatenated frames with `gap` filler bytes in between.
pub fn encode_stack(desc: &FileDescriptor, gap: usize) -> (Vec<u8>, Vec<FrameData>) {
    let mut bytes = vec![0xeeu8; desc.header_offset.max(0) as usize];
    let mut frames = Vec::new();
    for i in 0..desc.number_of_images {
        if i > 0 {
            bytes.extend(std::iter::repeat_n(0xddu8, gap));
        }
        let (raw, data) = encode_frame(desc, i * 3 + 1);
        bytes.extend_from_slice(&raw);
        frames.push(data);
    }
    (bytes, frames)
}

/// Gzip-compresses `data`.
pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    enc.write_all(data).expect("gzip write");
    enc.finish().expect("gzip finish")
}

/// Zlib-compresses `data`.
pub fn zlib(data: &[u8]) -> Vec<u8> {
    let mut enc = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
    enc.write_all(data).expect("zlib write");
    enc.finish().expect("zlib finish")
}

/// TIFF-style LZW.
pub fn lzw(data: &[u8]) -> Vec<u8> {
    weezl::encode::Encoder::with_tiff_size_switch(weezl::BitOrder::Msb, 8)
        .encode(data)
        .expect("lzw encode")
}

/// PackBits with literal runs only.
pub fn packbits_literal(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    for chunk in data.chunks(128) {
        out.push((chunk.len() - 1) as u8);
        out.extend_from_slice(chunk);
    }
    out
}

/// Applies 8-bit horizontal differencing per row, in place.
pub fn difference_rows(data: &mut [u8], row_bytes: usize, stride: usize) {
    for row in data.chunks_mut(row_bytes) {
        for i in (stride..row.len()).rev() {
            row[i] = row[i].wrapping_sub(row[i - stride]);
        }
    }
}

/// Descriptor shortcut used by most tests.
pub fn descriptor(width: u32, height: u32, encoding: PixelEncoding) -> FileDescriptor {
    FileDescriptor::new(width, height, encoding)
}

/// All packed RGB orders.
pub const RGB_ORDERS: [RgbOrder; 5] = [
    RgbOrder::Rgb,
    RgbOrder::Bgr,
    RgbOrder::Argb,
    RgbOrder::Abgr,
    RgbOrder::Barg,
];
