use thiserror::Error;

use crate::compression::CompressionError;
use crate::connection::broker::RequestError;
use crate::connection::ConnectError;
use crate::protocol::error::ApiError;

use super::config::ConfigError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("connection error: {0}")]
    Connection(#[from] ConnectError),

    #[error("request error: {0}")]
    Request(#[from] RequestError),

    /// No connection to the target broker could be obtained, or the selected
    /// broker is gone.
    #[error("broker not available: {0}")]
    BrokerNotAvailable(String),

    #[error("unable to find available brokers")]
    NoAvailableBrokers,

    #[error("server error for {context}: {protocol_error}{}", message_suffix(.message))]
    ServerError {
        protocol_error: ApiError,
        context: String,
        message: Option<String>,
    },

    #[error("topics do not exist: {}", topics.join(", "))]
    TopicsNotExist { topics: Vec<String> },

    #[error("client is closing")]
    ClientClosing,

    #[error("bootstrap failed after {attempts} attempts: {source}")]
    Bootstrap {
        attempts: usize,
        #[source]
        source: Box<Error>,
    },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("compression error: {0}")]
    Compression(#[from] CompressionError),
}

fn message_suffix(message: &Option<String>) -> String {
    match message {
        Some(message) => format!(" ({message})"),
        None => String::new(),
    }
}

impl Error {
    pub(crate) fn server(
        protocol_error: ApiError,
        context: impl Into<String>,
        message: Option<String>,
    ) -> Self {
        Self::ServerError {
            protocol_error,
            context: context.into(),
            message,
        }
    }

    /// True for errors that mean the broker itself went away mid-request.
    pub(crate) fn is_connection_loss(e: &RequestError) -> bool {
        matches!(
            e,
            RequestError::ConnectionFailed { .. }
                | RequestError::ConnectionClosed
                | RequestError::IO(_)
        )
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
