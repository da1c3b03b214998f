//! Server-side error codes.
//!
//! Only the codes the client core reacts to are named; everything else is
//! carried through as [`ApiError::Unknown`].
//!
//! # References
//! - <https://kafka.apache.org/protocol#protocol_error_codes>

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq, Hash, Clone, Copy)]
#[non_exhaustive]
pub enum ApiError {
    #[error("unknown server error")]
    UnknownServerError,

    #[error("offset out of range")]
    OffsetOutOfRange,

    #[error("corrupt message")]
    CorruptMessage,

    #[error("unknown topic or partition")]
    UnknownTopicOrPartition,

    #[error("leader not available")]
    LeaderNotAvailable,

    #[error("not leader for partition")]
    NotLeaderForPartition,

    #[error("request timed out")]
    RequestTimedOut,

    #[error("broker not available")]
    BrokerNotAvailable,

    #[error("network exception")]
    NetworkException,

    #[error("coordinator not available")]
    CoordinatorNotAvailable,

    #[error("not coordinator")]
    NotCoordinator,

    #[error("invalid topic")]
    InvalidTopic,

    #[error("unsupported version")]
    UnsupportedVersion,

    #[error("topic already exists")]
    TopicAlreadyExists,

    #[error("invalid partition count")]
    InvalidPartitions,

    #[error("invalid replication factor")]
    InvalidReplicationFactor,

    #[error("not controller")]
    NotController,

    #[error("invalid request")]
    InvalidRequest,

    #[error("server error code {0}")]
    Unknown(i16),
}

impl ApiError {
    /// Maps a wire error code; `0` means "no error" and maps to `None`.
    pub fn new(code: i16) -> Option<Self> {
        match code {
            0 => None,
            -1 => Some(Self::UnknownServerError),
            1 => Some(Self::OffsetOutOfRange),
            2 => Some(Self::CorruptMessage),
            3 => Some(Self::UnknownTopicOrPartition),
            5 => Some(Self::LeaderNotAvailable),
            6 => Some(Self::NotLeaderForPartition),
            7 => Some(Self::RequestTimedOut),
            8 => Some(Self::BrokerNotAvailable),
            13 => Some(Self::NetworkException),
            15 => Some(Self::CoordinatorNotAvailable),
            16 => Some(Self::NotCoordinator),
            17 => Some(Self::InvalidTopic),
            35 => Some(Self::UnsupportedVersion),
            36 => Some(Self::TopicAlreadyExists),
            37 => Some(Self::InvalidPartitions),
            38 => Some(Self::InvalidReplicationFactor),
            41 => Some(Self::NotController),
            42 => Some(Self::InvalidRequest),
            _ => Some(Self::Unknown(code)),
        }
    }

    pub fn code(&self) -> i16 {
        match self {
            Self::UnknownServerError => -1,
            Self::OffsetOutOfRange => 1,
            Self::CorruptMessage => 2,
            Self::UnknownTopicOrPartition => 3,
            Self::LeaderNotAvailable => 5,
            Self::NotLeaderForPartition => 6,
            Self::RequestTimedOut => 7,
            Self::BrokerNotAvailable => 8,
            Self::NetworkException => 13,
            Self::CoordinatorNotAvailable => 15,
            Self::NotCoordinator => 16,
            Self::InvalidTopic => 17,
            Self::UnsupportedVersion => 35,
            Self::TopicAlreadyExists => 36,
            Self::InvalidPartitions => 37,
            Self::InvalidReplicationFactor => 38,
            Self::NotController => 41,
            Self::InvalidRequest => 42,
            Self::Unknown(code) => *code,
        }
    }
}

/// Wire helper: error code of "no error" is `0`.
pub fn error_code(error: Option<ApiError>) -> i16 {
    error.map(|e| e.code()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_error() {
        assert_eq!(ApiError::new(0), None);
    }

    #[test]
    fn test_known_roundtrip() {
        for code in [-1, 1, 2, 3, 5, 6, 7, 8, 13, 15, 16, 17, 35, 36, 37, 38, 41, 42] {
            assert_eq!(ApiError::new(code).unwrap().code(), code);
        }
    }

    #[test]
    fn test_unknown_carried_through() {
        assert_eq!(ApiError::new(999), Some(ApiError::Unknown(999)));
        assert_eq!(ApiError::Unknown(999).code(), 999);
    }
}
