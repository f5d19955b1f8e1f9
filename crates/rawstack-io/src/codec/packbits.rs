//! PackBits run-length decoding.

use crate::error::{IoError, IoResult};

/// Decodes one PackBits strip.
///
/// Header byte `n`: `0..=127` copies the next `n + 1` bytes, `-127..=-1`
/// repeats the next byte `1 - n` times, `-128` is a no-op. Decoding stops
/// at the end of the input or once `expected` bytes are produced.
pub fn decode(input: &[u8], expected: usize) -> IoResult<Vec<u8>> {
    let mut out = Vec::with_capacity(expected);
    let mut i = 0;
    while i < input.len() && out.len() < expected {
        let n = input[i] as i8;
        i += 1;
        match n {
            0..=127 => {
                let count = n as usize + 1;
                let literal = input
                    .get(i..i + count)
                    .ok_or_else(|| IoError::decode("PackBits literal runs past end of strip"))?;
                out.extend_from_slice(literal);
                i += count;
            }
            -128 => {}
            _ => {
                let count = (1 - n as isize) as usize;
                let &value = input
                    .get(i)
                    .ok_or_else(|| IoError::decode("PackBits run without value byte"))?;
                out.resize(out.len() + count, value);
                i += 1;
            }
        }
    }
    out.truncate(expected);
    Ok(out)
}
