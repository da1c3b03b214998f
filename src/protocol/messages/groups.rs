//! Consumer-group listing and introspection messages.

use std::io::{Read, Write};

use crate::protocol::{
    api_key::ApiKey,
    api_version::{ApiVersion, ApiVersionRange},
    error::{error_code, ApiError},
    primitives::{read_bytes, write_array, write_bytes, ReadType, WriteType},
};

use super::{
    read_versioned_array, write_versioned_array, ReadVersionedError, ReadVersionedType,
    RequestBody, WriteVersionedError, WriteVersionedType,
};

/// Lists the groups a single broker is coordinator for.
#[derive(Debug, Default)]
pub struct ListGroupsRequest;

impl RequestBody for ListGroupsRequest {
    type ResponseBody = ListGroupsResponse;
    const API_KEY: ApiKey = ApiKey::ListGroups;
    const API_VERSION_RANGE: ApiVersionRange =
        ApiVersionRange::new(ApiVersion(0), ApiVersion(0));
}

impl<W> WriteVersionedType<W> for ListGroupsRequest
where
    W: Write,
{
    fn write_versioned(
        &self,
        _writer: &mut W,
        version: ApiVersion,
    ) -> Result<(), WriteVersionedError> {
        assert_eq!(version.0, 0);
        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct ListGroupsResponse {
    /// The error, if any.
    pub error: Option<ApiError>,

    /// Each group in the response.
    pub groups: Vec<ListedGroup>,
}

impl<R> ReadVersionedType<R> for ListGroupsResponse
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        assert_eq!(version.0, 0);

        Ok(Self {
            error: ApiError::new(i16::read(reader)?),
            groups: read_versioned_array(reader, version)?,
        })
    }
}

// not required for production but helpful for testing
impl<W> WriteVersionedType<W> for ListGroupsResponse
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
        write_versioned_array(writer, version, Some(&self.groups))?;
        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct ListedGroup {
    /// The group ID.
    pub group_id: String,

    /// The group protocol type, `"consumer"` for regular consumers.
    pub protocol_type: String,
}

impl<R> ReadVersionedType<R> for ListedGroup
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        assert_eq!(version.0, 0);

        Ok(Self {
            group_id: String::read(reader)?,
            protocol_type: String::read(reader)?,
        })
    }
}

// not required for production but helpful for testing
impl<W> WriteVersionedType<W> for ListedGroup
where
    W: Write,
{
    fn write_versioned(
        &self,
        writer: &mut W,
        version: ApiVersion,
    ) -> Result<(), WriteVersionedError> {
        assert_eq!(version.0, 0);

        self.group_id.write(writer)?;
        self.protocol_type.write(writer)?;
        Ok(())
    }
}

/// Describes consumer groups; must be sent to each group's coordinator.
#[derive(Debug)]
pub struct DescribeGroupsRequest {
    /// The names of the groups to describe.
    pub groups: Vec<String>,
}

impl RequestBody for DescribeGroupsRequest {
    type ResponseBody = DescribeGroupsResponse;
    const API_KEY: ApiKey = ApiKey::DescribeGroups;
    const API_VERSION_RANGE: ApiVersionRange =
        ApiVersionRange::new(ApiVersion(0), ApiVersion(0));
}

impl<W> WriteVersionedType<W> for DescribeGroupsRequest
where
    W: Write,
{
    fn write_versioned(
        &self,
        writer: &mut W,
        version: ApiVersion,
    ) -> Result<(), WriteVersionedError> {
        assert_eq!(version.0, 0);

        write_array(writer, &self.groups)?;
        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct DescribeGroupsResponse {
    /// Each described group.
    pub groups: Vec<DescribedGroup>,
}

impl<R> ReadVersionedType<R> for DescribeGroupsResponse
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        assert_eq!(version.0, 0);

        Ok(Self {
            groups: read_versioned_array(reader, version)?,
        })
    }
}

// not required for production but helpful for testing
impl<W> WriteVersionedType<W> for DescribeGroupsResponse
where
    W: Write,
{
    fn write_versioned(
        &self,
        writer: &mut W,
        version: ApiVersion,
    ) -> Result<(), WriteVersionedError> {
        assert_eq!(version.0, 0);

        write_versioned_array(writer, version, Some(&self.groups))?;
        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct DescribedGroup {
    /// The describe error, if any.
    pub error: Option<ApiError>,

    /// The group ID.
    pub group_id: String,

    /// The group state, e.g. `"Stable"`.
    pub state: String,

    /// The group protocol type.
    pub protocol_type: String,

    /// The selected assignment protocol.
    pub protocol: String,

    /// The group members.
    pub members: Vec<DescribedGroupMember>,
}

impl<R> ReadVersionedType<R> for DescribedGroup
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        assert_eq!(version.0, 0);

        Ok(Self {
            error: ApiError::new(i16::read(reader)?),
            group_id: String::read(reader)?,
            state: String::read(reader)?,
            protocol_type: String::read(reader)?,
            protocol: String::read(reader)?,
            members: read_versioned_array(reader, version)?,
        })
    }
}

// not required for production but helpful for testing
impl<W> WriteVersionedType<W> for DescribedGroup
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
        self.group_id.write(writer)?;
        self.state.write(writer)?;
        self.protocol_type.write(writer)?;
        self.protocol.write(writer)?;
        write_versioned_array(writer, version, Some(&self.members))?;
        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct DescribedGroupMember {
    /// The member ID assigned by the coordinator.
    pub member_id: String,

    /// The client ID the member used.
    pub client_id: String,

    /// The host the member connected from.
    pub client_host: String,

    /// The opaque metadata the member provided when joining.
    pub member_metadata: Vec<u8>,

    /// The opaque assignment the leader provided for the member.
    pub member_assignment: Vec<u8>,
}

impl<R> ReadVersionedType<R> for DescribedGroupMember
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        assert_eq!(version.0, 0);

        Ok(Self {
            member_id: String::read(reader)?,
            client_id: String::read(reader)?,
            client_host: String::read(reader)?,
            member_metadata: read_bytes(reader)?,
            member_assignment: read_bytes(reader)?,
        })
    }
}

// not required for production but helpful for testing
impl<W> WriteVersionedType<W> for DescribedGroupMember
where
    W: Write,
{
    fn write_versioned(
        &self,
        writer: &mut W,
        version: ApiVersion,
    ) -> Result<(), WriteVersionedError> {
        assert_eq!(version.0, 0);

        self.member_id.write(writer)?;
        self.client_id.write(writer)?;
        self.client_host.write(writer)?;
        write_bytes(writer, &self.member_metadata)?;
        write_bytes(writer, &self.member_assignment)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::protocol::messages::test_utils::test_roundtrip_versioned;

    use super::*;

    test_roundtrip_versioned!(
        ListGroupsResponse,
        ListGroupsRequest::API_VERSION_RANGE,
        test_roundtrip_list_groups_response,
        |_| ListGroupsResponse {
            error: None,
            groups: vec![ListedGroup {
                group_id: "analytics".to_owned(),
                protocol_type: "consumer".to_owned(),
            }],
        }
    );

    test_roundtrip_versioned!(
        DescribeGroupsResponse,
        DescribeGroupsRequest::API_VERSION_RANGE,
        test_roundtrip_describe_groups_response,
        |_| DescribeGroupsResponse {
            groups: vec![DescribedGroup {
                error: None,
                group_id: "analytics".to_owned(),
                state: "Stable".to_owned(),
                protocol_type: "consumer".to_owned(),
                protocol: "range".to_owned(),
                members: vec![DescribedGroupMember {
                    member_id: "member-1".to_owned(),
                    client_id: "client-1".to_owned(),
                    client_host: "/10.0.0.1".to_owned(),
                    member_metadata: vec![1, 2, 3],
                    member_assignment: vec![],
                }],
            }],
        }
    );
}
