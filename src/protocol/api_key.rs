//! ApiKey to tag request types.
//!
//! # References
//! - <https://kafka.apache.org/protocol#protocol_api_keys>

#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum ApiKey {
    Produce,
    Fetch,
    Metadata,
    FindCoordinator,
    DescribeGroups,
    ListGroups,
    ApiVersions,
    CreateTopics,
    Unknown(i16),
}

impl From<i16> for ApiKey {
    fn from(code: i16) -> Self {
        match code {
            0 => Self::Produce,
            1 => Self::Fetch,
            3 => Self::Metadata,
            10 => Self::FindCoordinator,
            15 => Self::DescribeGroups,
            16 => Self::ListGroups,
            18 => Self::ApiVersions,
            19 => Self::CreateTopics,
            _ => Self::Unknown(code),
        }
    }
}

impl From<ApiKey> for i16 {
    fn from(key: ApiKey) -> Self {
        match key {
            ApiKey::Produce => 0,
            ApiKey::Fetch => 1,
            ApiKey::Metadata => 3,
            ApiKey::FindCoordinator => 10,
            ApiKey::DescribeGroups => 15,
            ApiKey::ListGroups => 16,
            ApiKey::ApiVersions => 18,
            ApiKey::CreateTopics => 19,
            ApiKey::Unknown(code) => code,
        }
    }
}
