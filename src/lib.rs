//! Core client plumbing for Kafka-compatible clusters.
//!
//! This crate implements the subsystem every Kafka client is built on: a pool
//! of multiplexed broker connections, a cached view of cluster metadata, and
//! request routing to the partition leader, the cluster controller, or a group
//! coordinator. Wire bodies are versioned per broker via `ApiVersions`
//! negotiation.
//!
//! Record batching, compression codecs, offset management and group
//! rebalancing are left to higher layers built on [`Client::send_request`],
//! [`Client::produce`] and [`Client::fetch`].
//!
//! # Example
//!
//! ```no_run
//! use kafnet::ClientBuilder;
//!
//! # async fn example() -> Result<(), kafnet::client::Error> {
//! let client = ClientBuilder::new(vec!["localhost:9092".to_owned()])
//!     .client_id("my-service")
//!     .build()
//!     .await?;
//!
//! client
//!     .create_topics(vec![kafnet::client::NewTopic::new("greetings", 3, 1)], 5_000)
//!     .await?;
//! client.close().await;
//! # Ok(())
//! # }
//! ```

mod backoff;
pub mod client;
pub mod compression;
mod connection;
mod events;
mod metadata;
pub mod protocol;

#[cfg(test)]
pub(crate) mod testutil;

pub use backoff::RetryConfig;
pub use client::{Client, ClientBuilder, RouteTo};
pub use connection::broker::{NoAckBatchConfig, RequestError, SyncVersionsError};
pub use connection::transport::Error as TransportError;
pub use connection::ConnectError;
pub use events::ClientEvent;
pub use metadata::{BrokerEndpoint, PartitionInfo};
