use std::io::{Read, Write};

use crate::protocol::{
    api_key::ApiKey,
    api_version::{ApiVersion, ApiVersionRange},
    error::{error_code, ApiError},
    primitives::{read_bytes, write_bytes, ReadType, WriteType},
};

use super::{
    read_versioned_array, write_versioned_array, ReadVersionedError, ReadVersionedType,
    RequestBody, WriteVersionedError, WriteVersionedType,
};

/// The `replica_id` signifying the request is made by a normal consumer.
pub const NORMAL_CONSUMER: i32 = -1;

#[derive(Debug)]
pub struct FetchRequest {
    /// The broker ID of the follower, or [`NORMAL_CONSUMER`].
    pub replica_id: i32,

    /// The maximum time in milliseconds to wait for the response; the broker
    /// parks the request until data or this deadline arrives.
    pub max_wait_ms: i32,

    /// The minimum bytes to accumulate before responding.
    pub min_bytes: i32,

    /// The topics to fetch.
    pub topics: Vec<FetchRequestTopic>,
}

impl RequestBody for FetchRequest {
    type ResponseBody = FetchResponse;
    const API_KEY: ApiKey = ApiKey::Fetch;
    const API_VERSION_RANGE: ApiVersionRange =
        ApiVersionRange::new(ApiVersion(0), ApiVersion(0));
}

impl<W> WriteVersionedType<W> for FetchRequest
where
    W: Write,
{
    fn write_versioned(
        &self,
        writer: &mut W,
        version: ApiVersion,
    ) -> Result<(), WriteVersionedError> {
        assert_eq!(version.0, 0);

        self.replica_id.write(writer)?;
        self.max_wait_ms.write(writer)?;
        self.min_bytes.write(writer)?;
        write_versioned_array(writer, version, Some(&self.topics))?;
        Ok(())
    }
}

#[derive(Debug)]
pub struct FetchRequestTopic {
    /// The topic name.
    pub name: String,

    /// The partitions to fetch.
    pub partitions: Vec<FetchRequestPartition>,
}

impl<W> WriteVersionedType<W> for FetchRequestTopic
where
    W: Write,
{
    fn write_versioned(
        &self,
        writer: &mut W,
        version: ApiVersion,
    ) -> Result<(), WriteVersionedError> {
        assert_eq!(version.0, 0);

        self.name.write(writer)?;
        write_versioned_array(writer, version, Some(&self.partitions))?;
        Ok(())
    }
}

#[derive(Debug)]
pub struct FetchRequestPartition {
    /// The partition index.
    pub partition: i32,

    /// The message offset to start fetching from.
    pub fetch_offset: i64,

    /// The maximum bytes to return for this partition.
    pub max_bytes: i32,
}

impl<W> WriteVersionedType<W> for FetchRequestPartition
where
    W: Write,
{
    fn write_versioned(
        &self,
        writer: &mut W,
        version: ApiVersion,
    ) -> Result<(), WriteVersionedError> {
        assert_eq!(version.0, 0);

        self.partition.write(writer)?;
        self.fetch_offset.write(writer)?;
        self.max_bytes.write(writer)?;
        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct FetchResponse {
    /// Each fetched topic.
    pub topics: Vec<FetchResponseTopic>,
}

impl<R> ReadVersionedType<R> for FetchResponse
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        assert_eq!(version.0, 0);

        Ok(Self {
            topics: read_versioned_array(reader, version)?,
        })
    }
}

// not required for production but helpful for testing
impl<W> WriteVersionedType<W> for FetchResponse
where
    W: Write,
{
    fn write_versioned(
        &self,
        writer: &mut W,
        version: ApiVersion,
    ) -> Result<(), WriteVersionedError> {
        assert_eq!(version.0, 0);

        write_versioned_array(writer, version, Some(&self.topics))?;
        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct FetchResponseTopic {
    /// The topic name.
    pub name: String,

    /// Each fetched partition.
    pub partitions: Vec<FetchResponsePartition>,
}

impl<R> ReadVersionedType<R> for FetchResponseTopic
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        assert_eq!(version.0, 0);

        Ok(Self {
            name: String::read(reader)?,
            partitions: read_versioned_array(reader, version)?,
        })
    }
}

// not required for production but helpful for testing
impl<W> WriteVersionedType<W> for FetchResponseTopic
where
    W: Write,
{
    fn write_versioned(
        &self,
        writer: &mut W,
        version: ApiVersion,
    ) -> Result<(), WriteVersionedError> {
        assert_eq!(version.0, 0);

        self.name.write(writer)?;
        write_versioned_array(writer, version, Some(&self.partitions))?;
        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct FetchResponsePartition {
    /// The partition index.
    pub partition: i32,

    /// The fetch error, if any.
    pub error: Option<ApiError>,

    /// The last committed offset of the partition.
    pub high_watermark: i64,

    /// The fetched message set, opaque to the client core.
    pub records: Vec<u8>,
}

impl<R> ReadVersionedType<R> for FetchResponsePartition
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        assert_eq!(version.0, 0);

        Ok(Self {
            partition: i32::read(reader)?,
            error: ApiError::new(i16::read(reader)?),
            high_watermark: i64::read(reader)?,
            records: read_bytes(reader)?,
        })
    }
}

// not required for production but helpful for testing
impl<W> WriteVersionedType<W> for FetchResponsePartition
where
    W: Write,
{
    fn write_versioned(
        &self,
        writer: &mut W,
        version: ApiVersion,
    ) -> Result<(), WriteVersionedError> {
        assert_eq!(version.0, 0);

        self.partition.write(writer)?;
        error_code(self.error).write(writer)?;
        self.high_watermark.write(writer)?;
        write_bytes(writer, &self.records)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::protocol::messages::test_utils::test_roundtrip_versioned;

    use super::*;

    test_roundtrip_versioned!(
        FetchResponse,
        FetchRequest::API_VERSION_RANGE,
        test_roundtrip_fetch_response,
        |_| FetchResponse {
            topics: vec![FetchResponseTopic {
                name: "greetings".to_owned(),
                partitions: vec![FetchResponsePartition {
                    partition: 0,
                    error: None,
                    high_watermark: 99,
                    records: vec![0xde, 0xad, 0xbe, 0xef],
                }],
            }],
        }
    );
}
