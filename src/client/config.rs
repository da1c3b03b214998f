//! Client configuration.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::backoff::RetryConfig;
use crate::connection::broker::NoAckBatchConfig;
use crate::metadata::BrokerEndpoint;

pub const DEFAULT_KAFKA_HOST: &str = "localhost:9092";
pub const DEFAULT_CLIENT_ID: &str = "kafnet-client";
const DEFAULT_PORT: u16 = 9092;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("no bootstrap brokers in {spec:?}")]
    NoHosts { spec: String },

    #[error("invalid broker address {addr:?}")]
    InvalidAddress { addr: String },

    #[error("invalid client id {client_id:?}: {reason}")]
    InvalidClientId {
        client_id: String,
        reason: &'static str,
    },
}

/// All recognized options with their defaults.
#[derive(Clone)]
pub struct ClientConfig {
    /// Bootstrap endpoints tried (in shuffled order) during connect.
    pub kafka_hosts: Vec<BrokerEndpoint>,

    /// Per-socket connect deadline.
    pub connect_timeout: Duration,

    /// Default per-request deadline.
    pub request_timeout: Duration,

    /// A lost connection this long inactive at retry time is not reopened.
    pub idle_connection: Duration,

    /// Bootstrap during [`ClientBuilder::build`](crate::ClientBuilder::build).
    pub auto_connect: bool,

    /// Use TLS with this configuration.
    pub tls_config: Option<Arc<rustls::ClientConfig>>,

    /// Identifier sent in every request header.
    pub client_id: String,

    /// Skip `ApiVersions` negotiation and always use the base version table.
    pub versions_disabled: bool,

    /// Deadline for the `ApiVersions` probe.
    pub versions_timeout: Duration,

    /// Bootstrap retry schedule.
    pub connect_retry: RetryConfig,

    /// Fan-out concurrency for group listing and description.
    pub max_async_requests: usize,

    /// Upper bound on a single response frame.
    pub max_frame_size: usize,

    /// Flush batching for `acks=0` produce writes.
    pub no_ack_batch: Option<NoAckBatchConfig>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            kafka_hosts: parse_kafka_hosts(DEFAULT_KAFKA_HOST)
                .expect("default bootstrap list is valid"),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            idle_connection: Duration::from_secs(300),
            auto_connect: true,
            tls_config: None,
            client_id: DEFAULT_CLIENT_ID.to_owned(),
            versions_disabled: false,
            versions_timeout: Duration::from_millis(500),
            connect_retry: RetryConfig::default(),
            max_async_requests: 10,
            max_frame_size: 100 * 1024 * 1024,
            no_ack_batch: None,
        }
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("kafka_hosts", &self.kafka_hosts)
            .field("connect_timeout", &self.connect_timeout)
            .field("request_timeout", &self.request_timeout)
            .field("idle_connection", &self.idle_connection)
            .field("auto_connect", &self.auto_connect)
            .field("tls_config", &self.tls_config.as_ref().map(|_| "..."))
            .field("client_id", &self.client_id)
            .field("versions_disabled", &self.versions_disabled)
            .field("versions_timeout", &self.versions_timeout)
            .field("connect_retry", &self.connect_retry)
            .field("max_async_requests", &self.max_async_requests)
            .field("max_frame_size", &self.max_frame_size)
            .finish_non_exhaustive()
    }
}

/// Parse a comma-separated bootstrap list. IPv6 hosts may be bracketed
/// (`[::1]:9092`) and are stored unbracketed; a missing port defaults to
/// 9092.
pub(crate) fn parse_kafka_hosts(spec: &str) -> Result<Vec<BrokerEndpoint>, ConfigError> {
    let hosts: Vec<BrokerEndpoint> = spec
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(parse_host)
        .collect::<Result<_, _>>()?;

    if hosts.is_empty() {
        return Err(ConfigError::NoHosts {
            spec: spec.to_owned(),
        });
    }
    Ok(hosts)
}

fn parse_host(part: &str) -> Result<BrokerEndpoint, ConfigError> {
    let invalid = || ConfigError::InvalidAddress {
        addr: part.to_owned(),
    };

    if let Some(rest) = part.strip_prefix('[') {
        let (host, port) = rest.split_once("]:").ok_or_else(invalid)?;
        if host.is_empty() {
            return Err(invalid());
        }
        let port: u16 = port.parse().map_err(|_| invalid())?;
        return Ok(BrokerEndpoint::new(host, port));
    }

    match part.rsplit_once(':') {
        Some((host, port)) => {
            if host.is_empty() || host.contains(':') {
                return Err(invalid());
            }
            let port: u16 = port.parse().map_err(|_| invalid())?;
            Ok(BrokerEndpoint::new(host, port))
        }
        None => Ok(BrokerEndpoint::new(part, DEFAULT_PORT)),
    }
}

/// A client id is a non-empty ASCII identifier.
pub(crate) fn validate_client_id(client_id: &str) -> Result<(), ConfigError> {
    let invalid = |reason| ConfigError::InvalidClientId {
        client_id: client_id.to_owned(),
        reason,
    };

    if client_id.is_empty() {
        return Err(invalid("must not be empty"));
    }
    if !client_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
    {
        return Err(invalid(
            "only ASCII alphanumerics, '.', '_' and '-' are allowed",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use assert_matches::assert_matches;

    #[test]
    fn test_parse_hosts() {
        let hosts = parse_kafka_hosts("a:9092, b:9093 ,c").unwrap();
        assert_eq!(
            hosts,
            vec![
                BrokerEndpoint::new("a", 9092),
                BrokerEndpoint::new("b", 9093),
                BrokerEndpoint::new("c", 9092),
            ]
        );
    }

    #[test]
    fn test_parse_ipv6_unwraps_brackets() {
        let hosts = parse_kafka_hosts("[::1]:9093").unwrap();
        assert_eq!(hosts, vec![BrokerEndpoint::new("::1", 9093)]);
        assert_eq!(hosts[0].addr(), "::1:9093");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_matches!(
            parse_kafka_hosts("a:not-a-port"),
            Err(ConfigError::InvalidAddress { .. })
        );
        assert_matches!(
            parse_kafka_hosts("[::1]"),
            Err(ConfigError::InvalidAddress { .. })
        );
        assert_matches!(parse_kafka_hosts(" , "), Err(ConfigError::NoHosts { .. }));
    }

    #[test]
    fn test_client_id_validation() {
        validate_client_id("kafnet-client.1").unwrap();
        assert_matches!(
            validate_client_id(""),
            Err(ConfigError::InvalidClientId { .. })
        );
        assert_matches!(
            validate_client_id("höhenmesser"),
            Err(ConfigError::InvalidClientId { .. })
        );
    }
}
