//! Kafka wire protocol support.
//!
//! The client core treats message bodies as a versioned registry: every
//! request type declares its API key and the version range it can encode
//! ([`messages::RequestBody`]), and the version actually used on a connection
//! is the highest one both sides support. Only the non-flexible (pre
//! tagged-field) encodings are carried here.
//!
//! # References
//! - <https://kafka.apache.org/protocol>

pub mod api_key;
pub mod api_version;
pub mod error;
pub mod frame;
pub mod messages;
pub mod primitives;
