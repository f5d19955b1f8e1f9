//! TIFF-flavoured LZW (MSB-first codes, early size switch).

use weezl::decode::Decoder;
use weezl::BitOrder;

use crate::error::{IoError, IoResult};

/// Decodes one LZW strip.
pub fn decode(input: &[u8], expected: usize) -> IoResult<Vec<u8>> {
    let mut decoder = Decoder::with_tiff_size_switch(BitOrder::Msb, 8);
    let mut out = Vec::with_capacity(expected);
    let result = decoder.into_vec(&mut out).decode(input);
    result
        .status
        .map_err(|e| IoError::decode(format!("LZW: {e}")))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use weezl::encode::Encoder;

    #[test]
    fn test_decodes_tiff_lzw() {
        let plain: Vec<u8> = (0..600u32).map(|i| (i % 7) as u8 * 30).collect();
        let packed = Encoder::with_tiff_size_switch(BitOrder::Msb, 8)
            .encode(&plain)
            .expect("encode");
        assert_eq!(decode(&packed, plain.len()).expect("decode"), plain);
    }

    #[test]
    fn test_garbage_is_decode_error() {
        let err = decode(&[0xff, 0xff, 0xff, 0xff], 16).expect_err("garbage");
        assert!(matches!(err, IoError::Decode(_)));
    }
}
