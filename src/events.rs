//! Client lifecycle notifications.
//!
//! Events are fanned out over a broadcast channel, so emission never runs
//! subscriber code inline with the state change that produced it. Slow
//! subscribers drop the oldest events rather than blocking the client.

use tokio::sync::broadcast;

/// Notifications emitted by a [`Client`](crate::Client).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// A bootstrap connection has been established.
    Connect,

    /// Bootstrap finished: metadata is loaded and requests can be routed.
    Ready,

    /// A previously lost broker connection has been reopened.
    Reconnect,

    /// The client has been closed.
    Close,

    /// The set of known brokers changed with a metadata refresh.
    BrokersChanged,

    /// An established connection failed.
    SocketError(String),

    /// A background operation (bootstrap, metadata refresh) failed.
    Error(String),
}

#[derive(Debug, Clone)]
pub(crate) struct EventBus {
    tx: broadcast::Sender<ClientEvent>,
}

impl EventBus {
    pub(crate) fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self { tx }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.tx.subscribe()
    }

    /// Emit an event; a send with no subscribers is not an error.
    pub(crate) fn send(&self, event: ClientEvent) {
        let _ = self.tx.send(event);
    }
}
