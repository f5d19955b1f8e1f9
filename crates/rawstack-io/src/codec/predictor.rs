//! Horizontal differencing (TIFF predictor 2).
//!
//! Each sample was stored as the difference to the same component of the
//! previous pixel in the row. Undoing it is a running sum per row at the
//! sample's own width, in the stream's byte order, so carries between the
//! bytes of a 16/32/64-bit sample are preserved.

use byteorder::{BigEndian, LittleEndian};

use rawstack_core::ByteOrder;

use crate::error::{IoError, IoResult};

/// Row geometry the predictor runs over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PredictorLayout {
    /// Bytes in one row.
    pub row_bytes: usize,
    /// Samples per pixel (distance between the same component).
    pub components: usize,
    /// Bytes per sample: 1, 2, 4 or 8.
    pub sample_bytes: usize,
}

/// Undoes horizontal differencing in place.
pub fn undo(data: &mut [u8], layout: PredictorLayout, order: ByteOrder) -> IoResult<()> {
    let PredictorLayout {
        row_bytes,
        components,
        sample_bytes,
    } = layout;
    if row_bytes == 0 || components == 0 || row_bytes % (components * sample_bytes) != 0 {
        return Err(IoError::decode(format!(
            "predictor row of {row_bytes} bytes does not hold whole {components}x{sample_bytes}-byte pixels"
        )));
    }
    for row in data.chunks_mut(row_bytes) {
        match (sample_bytes, order) {
            (1, _) => accumulate_bytes(row, components),
            (2, ByteOrder::Big) => accumulate::<BigEndian, 2>(row, components),
            (2, ByteOrder::Little) => accumulate::<LittleEndian, 2>(row, components),
            (4, ByteOrder::Big) => accumulate::<BigEndian, 4>(row, components),
            (4, ByteOrder::Little) => accumulate::<LittleEndian, 4>(row, components),
            (8, ByteOrder::Big) => accumulate::<BigEndian, 8>(row, components),
            (8, ByteOrder::Little) => accumulate::<LittleEndian, 8>(row, components),
            (other, _) => {
                return Err(IoError::decode(format!("predictor on {other}-byte samples")));
            }
        }
    }
    Ok(())
}

fn accumulate_bytes(row: &mut [u8], stride: usize) {
    for i in stride..row.len() {
        row[i] = row[i].wrapping_add(row[i - stride]);
    }
}

fn accumulate<E: byteorder::ByteOrder, const N: usize>(row: &mut [u8], components: usize) {
    let stride = components * N;
    let mut i = stride;
    while i + N <= row.len() {
        let prev = read_uint::<E, N>(&row[i - stride..]);
        let cur = read_uint::<E, N>(&row[i..]);
        write_uint::<E, N>(&mut row[i..], cur.wrapping_add(prev));
        i += N;
    }
}

#[inline]
fn read_uint<E: byteorder::ByteOrder, const N: usize>(buf: &[u8]) -> u64 {
    match N {
        2 => E::read_u16(buf) as u64,
        4 => E::read_u32(buf) as u64,
        _ => E::read_u64(buf),
    }
}

#[inline]
fn write_uint<E: byteorder::ByteOrder, const N: usize>(buf: &mut [u8], value: u64) {
    match N {
        2 => E::write_u16(buf, value as u16),
        4 => E::write_u32(buf, value as u32),
        _ => E::write_u64(buf, value),
    }
}
