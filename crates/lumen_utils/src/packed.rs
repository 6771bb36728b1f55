//! Little endian binary encoding of primitive values, used by the persistence layer.

use crate::{ok, AnyResult};
use anyhow::bail;
use byteorder::{ReadBytesExt, WriteBytesExt, LE};
use std::io::{Read, Write};

/// Hard limit for length-prefixed values, protects against reading garbage lengths from
/// corrupted streams.
pub const SIZE_LIMIT: u32 = 16 * 1024 * 1024;

#[derive(Debug, Clone, Copy, thiserror::Error)]
pub enum PackedError {
    #[error("length prefix {0} exceeds the limit of {SIZE_LIMIT} bytes")]
    TooLong(u32),
    #[error("invalid boolean byte {0:#04x}")]
    InvalidBool(u8),
}

/// Special trait for reading packed data, always assumed to be little endian.
pub trait PackedData: Sized {
    fn read_packed<R: Read + ?Sized>(r: &mut R) -> AnyResult<Self>;
    fn write_packed<W: Write + ?Sized>(&self, w: &mut W) -> AnyResult;
}

macro_rules! impl_data {
    ($type:ty, $r:ident, $reader:expr, $w:ident, $self:ident, $writer:expr) => {
        impl PackedData for $type {
            fn read_packed<R: Read + ?Sized>($r: &mut R) -> AnyResult<Self> {
                Ok($reader)
            }

            fn write_packed<W: Write + ?Sized>(&self, $w: &mut W) -> AnyResult {
                let $self = self;
                $writer;
                Ok(())
            }
        }
    };
}

impl_data!(u8, r, r.read_u8()?, w, value, w.write_u8(*value)?);
impl_data!(
    u32,
    r,
    r.read_u32::<LE>()?,
    w,
    value,
    w.write_u32::<LE>(*value)?
);
impl_data!(
    i32,
    r,
    r.read_i32::<LE>()?,
    w,
    value,
    w.write_i32::<LE>(*value)?
);
impl_data!(
    f32,
    r,
    r.read_f32::<LE>()?,
    w,
    value,
    w.write_f32::<LE>(*value)?
);
impl_data!(
    f64,
    r,
    r.read_f64::<LE>()?,
    w,
    value,
    w.write_f64::<LE>(*value)?
);
impl_data!(
    bool,
    r,
    match r.read_u8()? {
        0 => false,
        1 => true,
        other => bail!(PackedError::InvalidBool(other)),
    },
    w,
    value,
    w.write_u8(*value as u8)?
);

/// Byte buffers are prefixed with their `u32` length.
impl PackedData for Vec<u8> {
    fn read_packed<R: Read + ?Sized>(r: &mut R) -> AnyResult<Self> {
        let length = read_length(r)?;
        let mut result = vec![0; length as usize];
        r.read_exact(&mut result)?;
        Ok(result)
    }

    fn write_packed<W: Write + ?Sized>(&self, w: &mut W) -> AnyResult {
        w.write_u32::<LE>(self.len().try_into()?)?;
        w.write_all(self)?;
        ok()
    }
}

/// Strings are stored as length-prefixed UTF-8, without a terminator.
impl PackedData for String {
    fn read_packed<R: Read + ?Sized>(r: &mut R) -> AnyResult<Self> {
        Ok(String::from_utf8(Vec::<u8>::read_packed(r)?)?)
    }

    fn write_packed<W: Write + ?Sized>(&self, w: &mut W) -> AnyResult {
        w.write_u32::<LE>(self.len().try_into()?)?;
        w.write_all(self.as_bytes())?;
        ok()
    }
}

fn read_length<R: Read + ?Sized>(r: &mut R) -> AnyResult<u32> {
    let length = r.read_u32::<LE>()?;
    if length > SIZE_LIMIT {
        bail!(PackedError::TooLong(length));
    }
    Ok(length)
}

/// Trait with a `write_packed` wrapper method for any [`Write`] type, purely for clarity.
pub trait PackedWriteExt {
    /// Writes the specified [`PackedData`] object into this stream.
    fn write_packed(&mut self, t: impl PackedData) -> AnyResult;
}

impl<T: Write + ?Sized> PackedWriteExt for T {
    fn write_packed(&mut self, t: impl PackedData) -> AnyResult {
        t.write_packed(self)
    }
}

/// Trait with a `read_packed` wrapper method for any [`Read`] type, purely for clarity.
pub trait PackedReadExt {
    /// Reads the specified [`PackedData`] type from this stream.
    fn read_packed<T: PackedData>(&mut self) -> AnyResult<T>;
}

impl<T: Read + ?Sized> PackedReadExt for T {
    fn read_packed<R: PackedData>(&mut self) -> AnyResult<R> {
        R::read_packed(self)
    }
}
