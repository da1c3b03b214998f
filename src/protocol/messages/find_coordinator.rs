use std::io::{Read, Write};

use crate::protocol::{
    api_key::ApiKey,
    api_version::{ApiVersion, ApiVersionRange},
    error::{error_code, ApiError},
    primitives::{ReadType, WriteType},
};

use super::{
    ReadVersionedError, ReadVersionedType, RequestBody, WriteVersionedError, WriteVersionedType,
};

/// Looks up the broker coordinating a consumer group.
#[derive(Debug)]
pub struct FindCoordinatorRequest {
    /// The coordinator key; for version 0 this is always a group ID.
    pub key: String,
}

impl RequestBody for FindCoordinatorRequest {
    type ResponseBody = FindCoordinatorResponse;
    const API_KEY: ApiKey = ApiKey::FindCoordinator;
    const API_VERSION_RANGE: ApiVersionRange =
        ApiVersionRange::new(ApiVersion(0), ApiVersion(0));
}

impl<W> WriteVersionedType<W> for FindCoordinatorRequest
where
    W: Write,
{
    fn write_versioned(
        &self,
        writer: &mut W,
        version: ApiVersion,
    ) -> Result<(), WriteVersionedError> {
        assert_eq!(version.0, 0);

        self.key.write(writer)?;
        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct FindCoordinatorResponse {
    /// The error, if any.
    pub error: Option<ApiError>,

    /// The node ID of the coordinator.
    pub node_id: i32,

    /// The coordinator hostname.
    pub host: String,

    /// The coordinator port.
    pub port: i32,
}

impl<R> ReadVersionedType<R> for FindCoordinatorResponse
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        assert_eq!(version.0, 0);

        Ok(Self {
            error: ApiError::new(i16::read(reader)?),
            node_id: i32::read(reader)?,
            host: String::read(reader)?,
            port: i32::read(reader)?,
        })
    }
}

// not required for production but helpful for testing
impl<W> WriteVersionedType<W> for FindCoordinatorResponse
where
    W: Write,
{
    fn write_versioned(
        &self,
        writer: &mut W,
        version: ApiVersion,
    ) -> Result<(), WriteVersionedError> {
        assert_eq!(version.0, 0);

        error_code(self.error).write(writer)?;
        self.node_id.write(writer)?;
        self.host.write(writer)?;
        self.port.write(writer)?;
        Ok(())
    }
}
