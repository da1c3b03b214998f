use std::io::{Read, Write};

use crate::protocol::{
    api_key::ApiKey,
    api_version::{ApiVersion, ApiVersionRange},
    error::{error_code, ApiError},
    primitives::{write_array, ReadType, WriteType},
};

use super::{
    read_versioned_array, write_versioned_array, ReadVersionedError, ReadVersionedType,
    RequestBody, WriteVersionedError, WriteVersionedType,
};

#[derive(Debug)]
pub struct CreateTopicsRequest {
    /// The topics to create.
    pub topics: Vec<CreateTopicRequest>,

    /// How long to wait in milliseconds before timing out the request.
    pub timeout_ms: i32,

    /// If true, check that the topics can be created as specified, but don't
    /// create anything.
    ///
    /// Added in version 1.
    pub validate_only: Option<bool>,
}

impl RequestBody for CreateTopicsRequest {
    type ResponseBody = CreateTopicsResponse;
    const API_KEY: ApiKey = ApiKey::CreateTopics;
    const API_VERSION_RANGE: ApiVersionRange =
        ApiVersionRange::new(ApiVersion(0), ApiVersion(1));
}

impl<W> WriteVersionedType<W> for CreateTopicsRequest
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

        if v < 1 && self.validate_only.is_some() {
            return Err(WriteVersionedError::FieldNotAvailable {
                field: "validate_only".to_string(),
                version,
            });
        }

        write_versioned_array(writer, version, Some(&self.topics))?;
        self.timeout_ms.write(writer)?;
        if v >= 1 {
            self.validate_only.unwrap_or(false).write(writer)?;
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct CreateTopicRequest {
    /// The topic name.
    pub name: String,

    /// The number of partitions to create in the topic, or `-1` if
    /// `assignments` are given.
    pub num_partitions: i32,

    /// The number of replicas to create for each partition, or `-1` if
    /// `assignments` are given.
    pub replication_factor: i16,

    /// The manual partition assignments, if any.
    pub assignments: Vec<CreateTopicAssignment>,

    /// The custom topic configurations to set.
    pub configs: Vec<CreateTopicConfig>,
}

impl<W> WriteVersionedType<W> for CreateTopicRequest
where
    W: Write,
{
    fn write_versioned(
        &self,
        writer: &mut W,
        version: ApiVersion,
    ) -> Result<(), WriteVersionedError> {
        assert!(version.0 <= 1);

        self.name.write(writer)?;
        self.num_partitions.write(writer)?;
        self.replication_factor.write(writer)?;
        write_versioned_array(writer, version, Some(&self.assignments))?;
        write_versioned_array(writer, version, Some(&self.configs))?;
        Ok(())
    }
}

#[derive(Debug)]
pub struct CreateTopicAssignment {
    /// The partition index.
    pub partition_index: i32,

    /// The brokers to place the partition on.
    pub broker_ids: Vec<i32>,
}

impl<W> WriteVersionedType<W> for CreateTopicAssignment
where
    W: Write,
{
    fn write_versioned(
        &self,
        writer: &mut W,
        version: ApiVersion,
    ) -> Result<(), WriteVersionedError> {
        assert!(version.0 <= 1);

        self.partition_index.write(writer)?;
        write_array(writer, &self.broker_ids)?;
        Ok(())
    }
}

#[derive(Debug)]
pub struct CreateTopicConfig {
    /// The configuration name.
    pub name: String,

    /// The configuration value.
    pub value: Option<String>,
}

impl<W> WriteVersionedType<W> for CreateTopicConfig
where
    W: Write,
{
    fn write_versioned(
        &self,
        writer: &mut W,
        version: ApiVersion,
    ) -> Result<(), WriteVersionedError> {
        assert!(version.0 <= 1);

        self.name.write(writer)?;
        self.value.write(writer)?;
        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct CreateTopicsResponse {
    /// Results for each topic.
    pub topics: Vec<CreateTopicsResponseTopic>,
}

impl<R> ReadVersionedType<R> for CreateTopicsResponse
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        assert!(version.0 <= 1);

        Ok(Self {
            topics: read_versioned_array(reader, version)?,
        })
    }
}

// not required for production but helpful for testing
impl<W> WriteVersionedType<W> for CreateTopicsResponse
where
    W: Write,
{
    fn write_versioned(
        &self,
        writer: &mut W,
        version: ApiVersion,
    ) -> Result<(), WriteVersionedError> {
        assert!(version.0 <= 1);

        write_versioned_array(writer, version, Some(&self.topics))?;
        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct CreateTopicsResponseTopic {
    /// The topic name.
    pub name: String,

    /// The topic creation error, if any.
    pub error: Option<ApiError>,

    /// The error message.
    ///
    /// Added in version 1.
    pub error_message: Option<String>,
}

impl<R> ReadVersionedType<R> for CreateTopicsResponseTopic
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        let v = version.0;
        assert!(v <= 1);

        Ok(Self {
            name: String::read(reader)?,
            error: ApiError::new(i16::read(reader)?),
            error_message: (v >= 1)
                .then(|| Option::<String>::read(reader))
                .transpose()?
                .flatten(),
        })
    }
}

// not required for production but helpful for testing
impl<W> WriteVersionedType<W> for CreateTopicsResponseTopic
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

        self.name.write(writer)?;
        error_code(self.error).write(writer)?;
        if v >= 1 {
            self.error_message.write(writer)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::protocol::messages::test_utils::test_roundtrip_versioned;

    use super::*;

    test_roundtrip_versioned!(
        CreateTopicsResponse,
        CreateTopicsRequest::API_VERSION_RANGE,
        test_roundtrip_create_topics_response,
        |version| CreateTopicsResponse {
            topics: vec![CreateTopicsResponseTopic {
                name: "greetings".to_owned(),
                error: Some(ApiError::TopicAlreadyExists),
                error_message: (version.0 >= 1).then(|| "already there".to_owned()),
            }],
        }
    );
}
