//! Little-endian, bounds-checked reading and writing of primitive values.
//!
//! Method bodies, exception tables and instruction operands are all stored little-endian
//! (ECMA-335 II.25). Every reader in this module validates the remaining length before it
//! touches the buffer and reports [`crate::Error::OutOfBounds`] instead of panicking.
//!
//! # Key Components
//!
//! - [`crate::file::io::CilIO`] - Conversion between primitive types and their byte arrays
//! - [`crate::file::io::read_le`] / [`crate::file::io::read_le_at`] - Read from a slice
//! - [`crate::file::io::write_le_at`] - Write into a fixed slice with auto-advance
//! - [`crate::file::io::push_le`] - Append to a growable buffer
//!
//! # Examples
//!
//! ```rust
//! use dotpatch::file::io::{read_le_at, push_le};
//!
//! let mut buf = Vec::new();
//! push_le(&mut buf, 0x2A_u16);
//! push_le(&mut buf, -1_i32);
//!
//! let mut offset = 0;
//! assert_eq!(read_le_at::<u16>(&buf, &mut offset)?, 0x2A);
//! assert_eq!(read_le_at::<i32>(&buf, &mut offset)?, -1);
//! assert_eq!(offset, 6);
//! # Ok::<(), dotpatch::Error>(())
//! ```
//!
//! # Thread Safety
//!
//! All functions are pure and operate on caller-owned buffers.

use crate::{Error::OutOfBounds, Result};

/// Trait for primitive types that can be read from and written to little-endian bytes.
///
/// Each implementation names the fixed-size byte array that backs the type (e.g. `[u8; 4]`
/// for `u32`), which lets the generic readers slice exactly the right amount of input.
pub trait CilIO: Sized + Copy {
    /// Byte array representation of this type.
    type Bytes: Sized + AsRef<[u8]> + for<'a> TryFrom<&'a [u8]>;

    /// Read T from a byte buffer in little-endian
    fn from_le_bytes(bytes: Self::Bytes) -> Self;

    /// Write T to a byte buffer in little-endian
    fn to_le_bytes(self) -> Self::Bytes;
}

macro_rules! impl_cilio {
    ($($ty:ty),* $(,)?) => {
        $(
            impl CilIO for $ty {
                type Bytes = [u8; std::mem::size_of::<$ty>()];

                fn from_le_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_le_bytes(bytes)
                }

                fn to_le_bytes(self) -> Self::Bytes {
                    <$ty>::to_le_bytes(self)
                }
            }
        )*
    };
}

impl_cilio!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

/// Reads a value of type `T` from the start of `data`.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if `data` is too short.
pub fn read_le<T: CilIO>(data: &[u8]) -> Result<T> {
    let mut offset = 0_usize;
    read_le_at(data, &mut offset)
}

/// Reads a value of type `T` at `offset` and advances `offset` past it.
///
/// # Arguments
///
/// * `data` - The byte buffer to read from
/// * `offset` - Position to read at, advanced by `size_of::<T>()` on success
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if fewer than `size_of::<T>()` bytes remain. The
/// offset is left untouched in that case.
pub fn read_le_at<T: CilIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let type_len = std::mem::size_of::<T>();
    let Some(end) = offset.checked_add(type_len) else {
        return Err(OutOfBounds);
    };
    if end > data.len() {
        return Err(OutOfBounds);
    }

    let Ok(read) = data[*offset..end].try_into() else {
        return Err(OutOfBounds);
    };

    *offset = end;
    Ok(T::from_le_bytes(read))
}

/// Writes `value` at `offset` into a fixed buffer and advances `offset` past it.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the value does not fit.
pub fn write_le_at<T: CilIO>(data: &mut [u8], offset: &mut usize, value: T) -> Result<()> {
    let bytes = value.to_le_bytes();
    let bytes = bytes.as_ref();
    let Some(end) = offset.checked_add(bytes.len()) else {
        return Err(OutOfBounds);
    };
    if end > data.len() {
        return Err(OutOfBounds);
    }

    data[*offset..end].copy_from_slice(bytes);
    *offset = end;
    Ok(())
}

/// Appends `value` to `buffer` in little-endian order.
pub fn push_le<T: CilIO>(buffer: &mut Vec<u8>, value: T) {
    buffer.extend_from_slice(value.to_le_bytes().as_ref());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_sequence() {
        let data = [0x01, 0x00, 0x02, 0x00, 0x00, 0x00, 0xFF];
        let mut offset = 0;
        assert_eq!(read_le_at::<u16>(&data, &mut offset).unwrap(), 1);
        assert_eq!(read_le_at::<u32>(&data, &mut offset).unwrap(), 2);
        assert_eq!(read_le_at::<i8>(&data, &mut offset).unwrap(), -1);
        assert_eq!(offset, 7);
    }

    #[test]
    fn read_out_of_bounds_keeps_offset() {
        let data = [0x01, 0x02, 0x03];
        let mut offset = 1;
        assert!(matches!(
            read_le_at::<u32>(&data, &mut offset),
            Err(OutOfBounds)
        ));
        assert_eq!(offset, 1);
    }

    #[test]
    fn write_fixed_buffer() {
        let mut data = [0u8; 6];
        let mut offset = 0;
        write_le_at(&mut data, &mut offset, 0x0201_u16).unwrap();
        write_le_at(&mut data, &mut offset, 0x0605_0403_u32).unwrap();
        assert_eq!(data, [1, 2, 3, 4, 5, 6]);
        assert!(write_le_at(&mut data, &mut offset, 0_u8).is_err());
    }

    #[test]
    fn floats() {
        let mut buf = Vec::new();
        push_le(&mut buf, 1.5_f64);
        push_le(&mut buf, -2.25_f32);
        let mut offset = 0;
        assert_eq!(read_le_at::<f64>(&buf, &mut offset).unwrap(), 1.5);
        assert_eq!(read_le_at::<f32>(&buf, &mut offset).unwrap(), -2.25);
    }
}
