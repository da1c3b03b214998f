//! Primitive wire types.
//!
//! Values are read and written directly on the native Rust types; the
//! big-endian framing lives here so message definitions stay declarative.
//!
//! # References
//! - <https://kafka.apache.org/protocol#protocol_types>

use std::io::{Read, Write};

use thiserror::Error;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ReadError {
    #[error("cannot read data: {0}")]
    IO(#[from] std::io::Error),

    #[error("overflow converting integer: {0}")]
    Overflow(#[from] std::num::TryFromIntError),

    #[error("malformed data: {0}")]
    Malformed(String),
}

pub trait ReadType<R>: Sized
where
    R: Read,
{
    fn read(reader: &mut R) -> Result<Self, ReadError>;
}

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum WriteError {
    #[error("cannot write data: {0}")]
    IO(#[from] std::io::Error),

    #[error("overflow converting integer: {0}")]
    Overflow(#[from] std::num::TryFromIntError),
}

pub trait WriteType<W>: Sized
where
    W: Write,
{
    fn write(&self, writer: &mut W) -> Result<(), WriteError>;
}

macro_rules! integer_type {
    ($ty:ty, $len:expr) => {
        impl<R> ReadType<R> for $ty
        where
            R: Read,
        {
            fn read(reader: &mut R) -> Result<Self, ReadError> {
                let mut buf = [0u8; $len];
                reader.read_exact(&mut buf)?;
                Ok(<$ty>::from_be_bytes(buf))
            }
        }

        impl<W> WriteType<W> for $ty
        where
            W: Write,
        {
            fn write(&self, writer: &mut W) -> Result<(), WriteError> {
                writer.write_all(&self.to_be_bytes())?;
                Ok(())
            }
        }
    };
}

integer_type!(i8, 1);
integer_type!(i16, 2);
integer_type!(i32, 4);
integer_type!(i64, 8);

impl<R> ReadType<R> for bool
where
    R: Read,
{
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        let mut buf = [0u8; 1];
        reader.read_exact(&mut buf)?;
        Ok(buf[0] != 0)
    }
}

impl<W> WriteType<W> for bool
where
    W: Write,
{
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        writer.write_all(&[u8::from(*self)])?;
        Ok(())
    }
}

/// STRING: 2-byte length followed by UTF-8 data, never null.
impl<R> ReadType<R> for String
where
    R: Read,
{
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        let len = i16::read(reader)?;
        if len < 0 {
            return Err(ReadError::Malformed(format!(
                "unexpected null string (length {len})"
            )));
        }
        let mut buf = vec![0u8; len as usize];
        reader.read_exact(&mut buf)?;
        String::from_utf8(buf).map_err(|e| ReadError::Malformed(e.to_string()))
    }
}

impl<W> WriteType<W> for String
where
    W: Write,
{
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        write_str(writer, self)
    }
}

pub fn write_str<W: Write>(writer: &mut W, s: &str) -> Result<(), WriteError> {
    let len = i16::try_from(s.len())?;
    len.write(writer)?;
    writer.write_all(s.as_bytes())?;
    Ok(())
}

/// NULLABLE_STRING: length `-1` encodes null.
impl<R> ReadType<R> for Option<String>
where
    R: Read,
{
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        let len = i16::read(reader)?;
        match len {
            -1 => Ok(None),
            l if l < -1 => Err(ReadError::Malformed(format!(
                "invalid negative string length: {l}"
            ))),
            _ => {
                let mut buf = vec![0u8; len as usize];
                reader.read_exact(&mut buf)?;
                let s = String::from_utf8(buf).map_err(|e| ReadError::Malformed(e.to_string()))?;
                Ok(Some(s))
            }
        }
    }
}

impl<W> WriteType<W> for Option<String>
where
    W: Write,
{
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        match self {
            Some(s) => write_str(writer, s),
            None => (-1i16).write(writer),
        }
    }
}

/// BYTES: 4-byte length followed by opaque data; length `-1` encodes null,
/// which is surfaced as an empty buffer.
pub fn read_bytes<R: Read>(reader: &mut R) -> Result<Vec<u8>, ReadError> {
    let len = i32::read(reader)?;
    match len {
        -1 => Ok(vec![]),
        l if l < -1 => Err(ReadError::Malformed(format!(
            "invalid negative bytes length: {l}"
        ))),
        _ => {
            let mut buf = vec![0u8; len as usize];
            reader.read_exact(&mut buf)?;
            Ok(buf)
        }
    }
}

pub fn write_bytes<W: Write>(writer: &mut W, data: &[u8]) -> Result<(), WriteError> {
    let len = i32::try_from(data.len())?;
    len.write(writer)?;
    writer.write_all(data)?;
    Ok(())
}

/// ARRAY of primitives; a null array (`-1`) reads as empty.
pub fn read_array<R, T>(reader: &mut R) -> Result<Vec<T>, ReadError>
where
    R: Read,
    T: ReadType<R>,
{
    let len = i32::read(reader)?;
    match len {
        -1 => Ok(vec![]),
        l if l < -1 => Err(ReadError::Malformed(format!(
            "invalid negative array length: {l}"
        ))),
        _ => {
            // cap pre-allocation so a corrupt length can't blow up memory
            let len = len as usize;
            let mut out = Vec::with_capacity(len.min(1024));
            for _ in 0..len {
                out.push(T::read(reader)?);
            }
            Ok(out)
        }
    }
}

pub fn write_array<W, T>(writer: &mut W, items: &[T]) -> Result<(), WriteError>
where
    W: Write,
    T: WriteType<W>,
{
    let len = i32::try_from(items.len())?;
    len.write(writer)?;
    for item in items {
        item.write(writer)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use assert_matches::assert_matches;

    use super::*;

    fn roundtrip<T>(value: T) -> T
    where
        T: WriteType<Vec<u8>> + ReadType<Cursor<Vec<u8>>>,
    {
        let mut buf = Vec::new();
        value.write(&mut buf).unwrap();
        T::read(&mut Cursor::new(buf)).unwrap()
    }

    #[test]
    fn test_integer_roundtrip() {
        assert_eq!(roundtrip(-1i16), -1);
        assert_eq!(roundtrip(i32::MAX), i32::MAX);
        assert_eq!(roundtrip(i64::MIN), i64::MIN);
        assert!(roundtrip(true));
    }

    #[test]
    fn test_string_roundtrip() {
        assert_eq!(roundtrip("hello".to_owned()), "hello");
        assert_eq!(roundtrip(Some("hello".to_owned())), Some("hello".to_owned()));
        assert_eq!(roundtrip(None::<String>), None);
    }

    #[test]
    fn test_null_string_rejected() {
        let mut buf = Vec::new();
        (-1i16).write(&mut buf).unwrap();
        let err = String::read(&mut Cursor::new(buf)).unwrap_err();
        assert_matches!(err, ReadError::Malformed(_));
    }

    #[test]
    fn test_bytes_roundtrip() {
        let mut buf = Vec::new();
        write_bytes(&mut buf, b"abc").unwrap();
        assert_eq!(read_bytes(&mut Cursor::new(buf)).unwrap(), b"abc");

        // null bytes read as empty
        let mut buf = Vec::new();
        (-1i32).write(&mut buf).unwrap();
        assert_eq!(read_bytes(&mut Cursor::new(buf)).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_array_roundtrip() {
        let mut buf = Vec::new();
        write_array(&mut buf, &[1i32, 2, 3]).unwrap();
        assert_eq!(
            read_array::<_, i32>(&mut Cursor::new(buf)).unwrap(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn test_negative_array_length_rejected() {
        let mut buf = Vec::new();
        (-2i32).write(&mut buf).unwrap();
        let err = read_array::<_, i32>(&mut Cursor::new(buf)).unwrap_err();
        assert_matches!(err, ReadError::Malformed(_));
    }
}
