use std::io::{Read, Write};

use crate::protocol::{
    api_key::ApiKey,
    api_version::{ApiVersion, ApiVersionRange},
    error::{error_code, ApiError},
    primitives::{write_bytes, ReadType, WriteType},
};

use super::{
    read_versioned_array, write_versioned_array, ReadVersionedError, ReadVersionedType,
    RequestBody, WriteVersionedError, WriteVersionedType,
};

#[derive(Debug)]
pub struct ProduceRequest {
    /// The number of acknowledgments the leader must receive before
    /// responding; `0` means no response at all.
    pub acks: i16,

    /// The timeout to await a response in milliseconds.
    pub timeout_ms: i32,

    /// Each topic to produce to.
    pub topics: Vec<ProduceRequestTopic>,
}

impl RequestBody for ProduceRequest {
    type ResponseBody = ProduceResponse;
    const API_KEY: ApiKey = ApiKey::Produce;
    const API_VERSION_RANGE: ApiVersionRange =
        ApiVersionRange::new(ApiVersion(0), ApiVersion(0));
}

impl<W> WriteVersionedType<W> for ProduceRequest
where
    W: Write,
{
    fn write_versioned(
        &self,
        writer: &mut W,
        version: ApiVersion,
    ) -> Result<(), WriteVersionedError> {
        assert_eq!(version.0, 0);

        self.acks.write(writer)?;
        self.timeout_ms.write(writer)?;
        write_versioned_array(writer, version, Some(&self.topics))?;
        Ok(())
    }
}

#[derive(Debug)]
pub struct ProduceRequestTopic {
    /// The topic name.
    pub name: String,

    /// Each partition to produce to.
    pub partitions: Vec<ProduceRequestPartition>,
}

impl<W> WriteVersionedType<W> for ProduceRequestTopic
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
pub struct ProduceRequestPartition {
    /// The partition index.
    pub index: i32,

    /// An already-encoded message set; the client core treats record
    /// encoding as an external concern.
    pub records: Vec<u8>,
}

impl<W> WriteVersionedType<W> for ProduceRequestPartition
where
    W: Write,
{
    fn write_versioned(
        &self,
        writer: &mut W,
        version: ApiVersion,
    ) -> Result<(), WriteVersionedError> {
        assert_eq!(version.0, 0);

        self.index.write(writer)?;
        write_bytes(writer, &self.records)?;
        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct ProduceResponse {
    /// Each topic produced to.
    pub topics: Vec<ProduceResponseTopic>,
}

impl<R> ReadVersionedType<R> for ProduceResponse
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
impl<W> WriteVersionedType<W> for ProduceResponse
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
pub struct ProduceResponseTopic {
    /// The topic name.
    pub name: String,

    /// Each partition produced to.
    pub partitions: Vec<ProduceResponsePartition>,
}

impl<R> ReadVersionedType<R> for ProduceResponseTopic
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
impl<W> WriteVersionedType<W> for ProduceResponseTopic
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
pub struct ProduceResponsePartition {
    /// The partition index.
    pub index: i32,

    /// The produce error, if any.
    pub error: Option<ApiError>,

    /// The base offset assigned to the message set.
    pub base_offset: i64,
}

impl<R> ReadVersionedType<R> for ProduceResponsePartition
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        assert_eq!(version.0, 0);

        Ok(Self {
            index: i32::read(reader)?,
            error: ApiError::new(i16::read(reader)?),
            base_offset: i64::read(reader)?,
        })
    }
}

// not required for production but helpful for testing
impl<W> WriteVersionedType<W> for ProduceResponsePartition
where
    W: Write,
{
    fn write_versioned(
        &self,
        writer: &mut W,
        version: ApiVersion,
    ) -> Result<(), WriteVersionedError> {
        assert_eq!(version.0, 0);

        self.index.write(writer)?;
        error_code(self.error).write(writer)?;
        self.base_offset.write(writer)?;
        Ok(())
    }
}
