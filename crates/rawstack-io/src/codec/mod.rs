//! Content decompression.
//!
//! A compressed frame is one or more strips. Each strip is decoded on its
//! own and the results are concatenated; an overlong result is truncated
//! to the frame size and a short one is a decode error.

pub mod lzw;
pub mod packbits;
pub mod predictor;

use std::io::Read;

use flate2::read::ZlibDecoder;
use tracing::debug;

use rawstack_core::Compression;

use crate::error::{IoError, IoResult};

/// Decompresses the bytes of one frame to exactly `expected` bytes.
///
/// `strip_counts` splits `data` into strips; `None` treats it as a single
/// strip. Uncompressed input is returned as is.
pub fn decompress(
    compression: Compression,
    data: &[u8],
    strip_counts: Option<&[u64]>,
    expected: usize,
) -> IoResult<Vec<u8>> {
    if !compression.is_compressed() {
        return Ok(data.to_vec());
    }
    let single = [data.len() as u64];
    let counts = strip_counts.unwrap_or(&single);

    let mut out = Vec::new();
    out.try_reserve_exact(expected)
        .map_err(|_| IoError::Allocation { requested: expected })?;
    let mut offset = 0usize;
    for &count in counts {
        if out.len() >= expected {
            break;
        }
        let end = offset.saturating_add(count as usize).min(data.len());
        let strip = &data[offset..end];
        offset = end;
        let remaining = expected - out.len();
        let decoded = decompress_strip(compression, strip, remaining)?;
        out.extend_from_slice(&decoded[..decoded.len().min(remaining)]);
    }
    if out.len() < expected {
        debug!(compression = %compression, got = out.len(), expected, "short decompressed frame");
        return Err(IoError::decode(format!(
            "{compression}: stream produced {} of {expected} bytes",
            out.len()
        )));
    }
    Ok(out)
}

fn decompress_strip(compression: Compression, strip: &[u8], expected: usize) -> IoResult<Vec<u8>> {
    match compression {
        Compression::Lzw | Compression::LzwWithPrediction => lzw::decode(strip, expected),
        Compression::PackBits => packbits::decode(strip, expected),
        Compression::Deflate | Compression::DeflateWithPrediction => inflate(strip, expected),
        Compression::None | Compression::Unknown => Ok(strip.to_vec()),
    }
}

fn inflate(strip: &[u8], expected: usize) -> IoResult<Vec<u8>> {
    let mut out = Vec::with_capacity(expected);
    ZlibDecoder::new(strip)
        .read_to_end(&mut out)
        .map_err(|e| IoError::decode(format!("deflate: {e}")))?;
    Ok(out)
}
