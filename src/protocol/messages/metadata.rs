use std::io::{Read, Write};

use crate::protocol::{
    api_key::ApiKey,
    api_version::{ApiVersion, ApiVersionRange},
    error::{error_code, ApiError},
    primitives::{read_array, write_array, ReadType, WriteType},
};

use super::{
    read_versioned_array, write_versioned_array, ReadVersionedError, ReadVersionedType,
    RequestBody, WriteVersionedError, WriteVersionedType,
};

#[derive(Debug)]
pub struct MetadataRequest {
    /// The topics to fetch metadata for.
    ///
    /// Requests data for all topics if `None`.
    pub topics: Option<Vec<String>>,
}

impl RequestBody for MetadataRequest {
    type ResponseBody = MetadataResponse;
    const API_KEY: ApiKey = ApiKey::Metadata;
    const API_VERSION_RANGE: ApiVersionRange =
        ApiVersionRange::new(ApiVersion(0), ApiVersion(1));
}

impl<W> WriteVersionedType<W> for MetadataRequest
where
    W: Write,
{
    fn write_versioned(
        &self,
        writer: &mut W,
        version: ApiVersion,
    ) -> Result<(), WriteVersionedError> {
        assert!(version.0 <= 1);

        match &self.topics {
            // a null array means "all topics"
            None => (-1i32).write(writer)?,
            Some(topics) => write_array(writer, topics)?,
        }
        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct MetadataResponse {
    /// Each broker in the response.
    pub brokers: Vec<MetadataResponseBroker>,

    /// The ID of the controller broker.
    ///
    /// Added in version 1.
    pub controller_id: Option<i32>,

    /// Each topic in the response.
    pub topics: Vec<MetadataResponseTopic>,
}

impl<R> ReadVersionedType<R> for MetadataResponse
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        let v = version.0;
        assert!(v <= 1);

        let brokers = read_versioned_array(reader, version)?;
        // `-1` means the responding broker does not know the controller
        let controller_id = (v >= 1)
            .then(|| i32::read(reader))
            .transpose()?
            .filter(|id| *id >= 0);
        let topics = read_versioned_array(reader, version)?;

        Ok(Self {
            brokers,
            controller_id,
            topics,
        })
    }
}

// not required for production but helpful for testing
impl<W> WriteVersionedType<W> for MetadataResponse
where
    W: Write,
{
    fn write_versioned(
        &self,
        writer: &mut W,
        version: ApiVersion,
    ) -> Result<(), WriteVersionedError> {
        let v = version.0;
        assert!(v <= 1);

        write_versioned_array(writer, version, Some(&self.brokers))?;
        if v >= 1 {
            self.controller_id.unwrap_or(-1).write(writer)?;
        }
        write_versioned_array(writer, version, Some(&self.topics))?;
        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct MetadataResponseBroker {
    /// The broker ID.
    pub node_id: i32,

    /// The broker hostname.
    pub host: String,

    /// The broker port.
    pub port: i32,

    /// The rack of the broker.
    ///
    /// Added in version 1.
    pub rack: Option<String>,
}

impl<R> ReadVersionedType<R> for MetadataResponseBroker
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        let v = version.0;
        assert!(v <= 1);

        Ok(Self {
            node_id: i32::read(reader)?,
            host: String::read(reader)?,
            port: i32::read(reader)?,
            rack: (v >= 1)
                .then(|| Option::<String>::read(reader))
                .transpose()?
                .flatten(),
        })
    }
}

// not required for production but helpful for testing
impl<W> WriteVersionedType<W> for MetadataResponseBroker
where
    W: Write,
{
    fn write_versioned(
        &self,
        writer: &mut W,
        version: ApiVersion,
    ) -> Result<(), WriteVersionedError> {
        let v = version.0;
        assert!(v <= 1);

        self.node_id.write(writer)?;
        self.host.write(writer)?;
        self.port.write(writer)?;
        if v >= 1 {
            self.rack.write(writer)?;
        }
        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct MetadataResponseTopic {
    /// The topic error, if any.
    pub error: Option<ApiError>,

    /// The topic name.
    pub name: String,

    /// True if the topic is internal.
    ///
    /// Added in version 1.
    pub is_internal: Option<bool>,

    /// Each partition in the topic.
    pub partitions: Vec<MetadataResponsePartition>,
}

impl<R> ReadVersionedType<R> for MetadataResponseTopic
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        let v = version.0;
        assert!(v <= 1);

        Ok(Self {
            error: ApiError::new(i16::read(reader)?),
            name: String::read(reader)?,
            is_internal: (v >= 1).then(|| bool::read(reader)).transpose()?,
            partitions: read_versioned_array(reader, version)?,
        })
    }
}

// not required for production but helpful for testing
impl<W> WriteVersionedType<W> for MetadataResponseTopic
where
    W: Write,
{
    fn write_versioned(
        &self,
        writer: &mut W,
        version: ApiVersion,
    ) -> Result<(), WriteVersionedError> {
        let v = version.0;
        assert!(v <= 1);

        error_code(self.error).write(writer)?;
        self.name.write(writer)?;
        if v >= 1 {
            self.is_internal.unwrap_or(false).write(writer)?;
        }
        write_versioned_array(writer, version, Some(&self.partitions))?;
        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct MetadataResponsePartition {
    /// The partition error, if any.
    pub error: Option<ApiError>,

    /// The partition index.
    pub partition_index: i32,

    /// The ID of the leader broker, or `-1` if there is none.
    pub leader_id: i32,

    /// The set of all nodes that host this partition.
    pub replica_nodes: Vec<i32>,

    /// The set of nodes that are in sync with the leader for this partition.
    pub isr_nodes: Vec<i32>,
}

impl<R> ReadVersionedType<R> for MetadataResponsePartition
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        assert!(version.0 <= 1);

        Ok(Self {
            error: ApiError::new(i16::read(reader)?),
            partition_index: i32::read(reader)?,
            leader_id: i32::read(reader)?,
            replica_nodes: read_array(reader)?,
            isr_nodes: read_array(reader)?,
        })
    }
}

// not required for production but helpful for testing
impl<W> WriteVersionedType<W> for MetadataResponsePartition
where
    W: Write,
{
    fn write_versioned(
        &self,
        writer: &mut W,
        version: ApiVersion,
    ) -> Result<(), WriteVersionedError> {
        assert!(version.0 <= 1);

        error_code(self.error).write(writer)?;
        self.partition_index.write(writer)?;
        self.leader_id.write(writer)?;
        write_array(writer, &self.replica_nodes)?;
        write_array(writer, &self.isr_nodes)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::protocol::messages::test_utils::test_roundtrip_versioned;

    use super::*;

    test_roundtrip_versioned!(
        MetadataResponse,
        MetadataRequest::API_VERSION_RANGE,
        test_roundtrip_metadata_response,
        |version| MetadataResponse {
            brokers: vec![MetadataResponseBroker {
                node_id: 1,
                host: "kafka-1".to_owned(),
                port: 9092,
                rack: (version.0 >= 1).then(|| "rack-a".to_owned()),
            }],
            controller_id: (version.0 >= 1).then_some(1),
            topics: vec![MetadataResponseTopic {
                error: None,
                name: "greetings".to_owned(),
                is_internal: (version.0 >= 1).then_some(false),
                partitions: vec![MetadataResponsePartition {
                    error: Some(ApiError::LeaderNotAvailable),
                    partition_index: 0,
                    leader_id: -1,
                    replica_nodes: vec![1, 2],
                    isr_nodes: vec![1],
                }],
            }],
        }
    );
}
