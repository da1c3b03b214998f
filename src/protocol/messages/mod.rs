//! Individual API messages.
//!
//! # References
//! - <https://kafka.apache.org/protocol#protocol_messages>

use std::io::{Read, Write};

use thiserror::Error;

use super::{
    api_key::ApiKey,
    api_version::{ApiVersion, ApiVersionRange},
    primitives::{ReadError, ReadType, WriteError, WriteType},
};

mod api_versions;
pub use api_versions::*;
mod create_topics;
pub use create_topics::*;
mod fetch;
pub use fetch::*;
mod find_coordinator;
pub use find_coordinator::*;
mod groups;
pub use groups::*;
mod header;
pub use header::*;
mod metadata;
pub use metadata::*;
mod produce;
pub use produce::*;
#[cfg(test)]
mod test_utils;

#[derive(Error, Debug)]
pub enum ReadVersionedError {
    #[error("read error: {0}")]
    ReadError(#[from] ReadError),
}

pub trait ReadVersionedType<R>: Sized
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError>;
}

#[derive(Error, Debug)]
pub enum WriteVersionedError {
    #[error("write error: {0}")]
    WriteError(#[from] WriteError),

    #[error("field {field} not available in version {version}")]
    FieldNotAvailable { field: String, version: ApiVersion },
}

pub trait WriteVersionedType<W>: Sized
where
    W: Write,
{
    fn write_versioned(
        &self,
        writer: &mut W,
        version: ApiVersion,
    ) -> Result<(), WriteVersionedError>;
}

impl<'a, W: Write, T: WriteVersionedType<W>> WriteVersionedType<W> for &'a T {
    fn write_versioned(
        &self,
        writer: &mut W,
        version: ApiVersion,
    ) -> Result<(), WriteVersionedError> {
        T::write_versioned(self, writer, version)
    }
}

/// Specifies a request body.
pub trait RequestBody {
    /// The response type that will follow when issuing this request.
    type ResponseBody;

    /// Kafka API key, added to the request header.
    const API_KEY: ApiKey;

    /// Version range this client can encode.
    ///
    /// From this range and the range the broker reports, the highest version
    /// both support is picked.
    const API_VERSION_RANGE: ApiVersionRange;
}

impl<'a, T: RequestBody> RequestBody for &'a T {
    type ResponseBody = T::ResponseBody;
    const API_KEY: ApiKey = T::API_KEY;
    const API_VERSION_RANGE: ApiVersionRange = T::API_VERSION_RANGE;
}

/// Read an array of versioned objects; a null array (`-1`) reads as empty.
pub(crate) fn read_versioned_array<R: Read, T: ReadVersionedType<R>>(
    reader: &mut R,
    version: ApiVersion,
) -> Result<Vec<T>, ReadVersionedError> {
    let len = i32::read(reader)?;
    match len {
        -1 => Ok(vec![]),
        l if l < -1 => Err(ReadVersionedError::ReadError(ReadError::Malformed(
            format!("invalid negative length for array: {l}"),
        ))),
        _ => {
            let len = len as usize;
            let mut out = Vec::with_capacity(len.min(1024));
            for _ in 0..len {
                out.push(T::read_versioned(reader, version)?);
            }
            Ok(out)
        }
    }
}

/// Write an array of versioned objects.
pub(crate) fn write_versioned_array<W: Write, T: WriteVersionedType<W>>(
    writer: &mut W,
    version: ApiVersion,
    items: Option<&[T]>,
) -> Result<(), WriteVersionedError> {
    match items {
        None => {
            (-1i32).write(writer).map_err(WriteError::from)?;
            Ok(())
        }
        Some(items) => {
            let len = i32::try_from(items.len()).map_err(WriteError::from)?;
            len.write(writer).map_err(WriteError::from)?;
            for item in items {
                item.write_versioned(writer, version)?;
            }
            Ok(())
        }
    }
}
