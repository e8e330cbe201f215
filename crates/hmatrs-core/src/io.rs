//! Raw tile persistence.
//!
//! A tile is written as two `i32` shape fields followed by `rows * cols`
//! scalars in column-major order, native endianness. The reader is the exact
//! mirror, so a write/read round-trip is bit-identical.

use std::io::{Read, Write};

use crate::array::ScalarArray;
use crate::error::{CoreError, Result};
use crate::scalar::Scalar;

/// Write a tile to a stream.
pub fn write_tile<T: Scalar, W: Write>(w: &mut W, tile: &ScalarArray<T>) -> Result<()> {
    let rows = i32::try_from(tile.rows()).map_err(|_| CoreError::InvalidHeader {
        rows: tile.rows() as i64,
        cols: tile.cols() as i64,
    })?;
    let cols = i32::try_from(tile.cols()).map_err(|_| CoreError::InvalidHeader {
        rows: tile.rows() as i64,
        cols: tile.cols() as i64,
    })?;
    w.write_all(&rows.to_ne_bytes())?;
    w.write_all(&cols.to_ne_bytes())?;
    for j in 0..tile.cols() {
        w.write_all(bytemuck::cast_slice(tile.column(j)))?;
    }
    Ok(())
}

/// Read a tile previously written by [`write_tile`].
pub fn read_tile<T: Scalar, R: Read>(r: &mut R) -> Result<ScalarArray<T>> {
    let mut hdr = [0u8; 4];
    r.read_exact(&mut hdr)?;
    let rows = i32::from_ne_bytes(hdr);
    r.read_exact(&mut hdr)?;
    let cols = i32::from_ne_bytes(hdr);
    if rows < 0 || cols < 0 {
        return Err(CoreError::InvalidHeader {
            rows: rows as i64,
            cols: cols as i64,
        });
    }
    let (rows, cols) = (rows as usize, cols as usize);
    let mut data = vec![T::zero(); rows * cols];
    r.read_exact(bytemuck::cast_slice_mut(&mut data))?;
    Ok(ScalarArray::from_column_major(data, rows, cols))
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_complex::Complex64;

    #[test]
    fn test_roundtrip_f64() {
        let tile = ScalarArray::from_fn(5, 3, |i, j| (i as f64) * 0.25 - (j as f64) * 1.5);
        let mut buf = Vec::new();
        write_tile(&mut buf, &tile).unwrap();
        assert_eq!(buf.len(), 8 + 5 * 3 * 8);
        let back: ScalarArray<f64> = read_tile(&mut buf.as_slice()).unwrap();
        assert_eq!(back, tile);
    }

    #[test]
    fn test_roundtrip_complex() {
        let tile = ScalarArray::from_fn(2, 4, |i, j| Complex64::new(i as f64, -(j as f64)));
        let mut buf = Vec::new();
        write_tile(&mut buf, &tile).unwrap();
        let back: ScalarArray<Complex64> = read_tile(&mut buf.as_slice()).unwrap();
        assert_eq!(back, tile);
    }

    #[test]
    fn test_roundtrip_empty() {
        let tile = ScalarArray::<f64>::zeros(0, 0);
        let mut buf = Vec::new();
        write_tile(&mut buf, &tile).unwrap();
        let back: ScalarArray<f64> = read_tile(&mut buf.as_slice()).unwrap();
        assert_eq!(back.rows(), 0);
        assert_eq!(back.cols(), 0);
    }

    #[test]
    fn test_truncated_stream() {
        let tile = ScalarArray::from_fn(3, 3, |i, j| (i + j) as f64);
        let mut buf = Vec::new();
        write_tile(&mut buf, &tile).unwrap();
        buf.truncate(buf.len() - 4);
        let res: Result<ScalarArray<f64>> = read_tile(&mut buf.as_slice());
        assert!(res.is_err());
    }
}
