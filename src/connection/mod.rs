//! Pools of live broker connections.
//!
//! Connections are keyed by `host:port` and split into a normal pool and a
//! long-polling pool, so a fetch parked on the broker never queues metadata
//! or admin traffic behind it. A connection is only published to its pool
//! once version negotiation finished, so everything handed out is ready to
//! encode requests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::io::BufStream;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::client::config::ClientConfig;
use crate::events::{ClientEvent, EventBus};
use crate::metadata::BrokerEndpoint;

pub(crate) mod broker;
pub(crate) mod transport;

use broker::BrokerConnection;
use transport::Transport;

/// A ready connection from one of the pools.
pub(crate) type PooledConnection = Arc<BrokerConnection<BufStream<Transport>>>;

/// Delay before a lost connection is reopened.
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("error connecting to broker {addr}: {source}")]
    Transport {
        addr: String,
        #[source]
        source: transport::Error,
    },

    #[error(transparent)]
    SyncVersions(#[from] broker::SyncVersionsError),

    #[error("client is closing")]
    ClientClosing,
}

#[derive(Debug, Clone)]
pub(crate) struct BrokerPool {
    inner: Arc<PoolInner>,
}

#[derive(Debug)]
struct PoolInner {
    config: Arc<ClientConfig>,
    correlation_id: Arc<AtomicI32>,
    events: EventBus,
    closing: AtomicBool,
    brokers: Mutex<HashMap<String, PooledConnection>>,
    longpolling_brokers: Mutex<HashMap<String, PooledConnection>>,
}

impl BrokerPool {
    pub(crate) fn new(
        config: Arc<ClientConfig>,
        correlation_id: Arc<AtomicI32>,
        events: EventBus,
    ) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                config,
                correlation_id,
                events,
                closing: AtomicBool::new(false),
                brokers: Mutex::new(HashMap::new()),
                longpolling_brokers: Mutex::new(HashMap::new()),
            }),
        }
    }

    fn pool(&self, longpolling: bool) -> &Mutex<HashMap<String, PooledConnection>> {
        if longpolling {
            &self.inner.longpolling_brokers
        } else {
            &self.inner.brokers
        }
    }

    /// Returns the pooled connection for the endpoint, opening and
    /// negotiating a new one on miss. The pool lock is held across the open,
    /// so concurrent callers for the same pool wait for one connect instead
    /// of racing their own.
    pub(crate) async fn get_or_open(
        &self,
        endpoint: &BrokerEndpoint,
        longpolling: bool,
    ) -> Result<PooledConnection, ConnectError> {
        if self.is_closing() {
            return Err(ConnectError::ClientClosing);
        }

        let addr = endpoint.addr();
        let mut pool = self.pool(longpolling).lock().await;
        if let Some(conn) = pool.get(&addr) {
            if conn.is_ready() {
                return Ok(Arc::clone(conn));
            }
            pool.remove(&addr);
        }

        let conn = self.open(endpoint, longpolling).await?;
        pool.insert(addr, Arc::clone(&conn));
        self.spawn_supervisor(Arc::clone(&conn));
        Ok(conn)
    }

    async fn open(
        &self,
        endpoint: &BrokerEndpoint,
        longpolling: bool,
    ) -> Result<PooledConnection, ConnectError> {
        let config = &self.inner.config;
        info!(addr = %endpoint, longpolling, "establishing new broker connection");

        let transport = Transport::connect(
            &endpoint.host,
            endpoint.port,
            config.tls_config.clone(),
            config.connect_timeout,
        )
        .await
        .map_err(|source| ConnectError::Transport {
            addr: endpoint.addr(),
            source,
        })?;

        let conn = Arc::new(BrokerConnection::new(
            BufStream::new(transport),
            endpoint.clone(),
            longpolling,
            Arc::clone(&self.inner.correlation_id),
            Some(config.client_id.clone()),
            config.request_timeout,
            config.max_frame_size,
            config.no_ack_batch.clone(),
        ));

        if let Err(e) = conn
            .sync_versions(config.versions_disabled, config.versions_timeout)
            .await
        {
            conn.close().await;
            return Err(e.into());
        }

        Ok(conn)
    }

    /// Watches one pooled connection. When it dies unexpectedly it is
    /// evicted, and after [`RECONNECT_DELAY`] reopened, unless the client is
    /// closing or the connection sat idle longer than `idle_connection`.
    fn spawn_supervisor(&self, conn: PooledConnection) {
        let inner = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let reason = conn.closed().await;
            let Some(inner) = inner.upgrade() else {
                return;
            };
            let pool = Self { inner };

            let addr = conn.addr();
            let longpolling = conn.is_longpolling();
            {
                let mut locked = pool.pool(longpolling).lock().await;
                // only evict if a reopen hasn't already replaced us
                if let Some(current) = locked.get(&addr) {
                    if current.socket_id() == conn.socket_id() {
                        locked.remove(&addr);
                    }
                }
            }

            if conn.intentional_close() || pool.is_closing() {
                return;
            }
            pool.inner.events.send(ClientEvent::SocketError(reason));

            tokio::time::sleep(RECONNECT_DELAY).await;
            if pool.is_closing() {
                return;
            }
            if conn.is_idle(pool.inner.config.idle_connection) {
                debug!(%addr, "connection was idle at retry time, discarding");
                return;
            }

            let endpoint = conn.endpoint().clone();
            drop(conn);
            match pool.get_or_open(&endpoint, longpolling).await {
                Ok(_) => pool.inner.events.send(ClientEvent::Reconnect),
                Err(e) => warn!(addr = %endpoint, error = %e, "reconnect attempt failed"),
            }
        });
    }

    pub(crate) async fn get_connected(&self, longpolling: bool) -> Vec<PooledConnection> {
        self.pool(longpolling)
            .lock()
            .await
            .values()
            .filter(|conn| conn.is_ready())
            .cloned()
            .collect()
    }

    /// Closes every connection whose endpoint is no longer part of the
    /// cluster; called after each metadata refresh.
    pub(crate) async fn close_dead(&self, valid_addrs: &HashSet<String>) {
        for longpolling in [false, true] {
            let removed: Vec<PooledConnection> = {
                let mut pool = self.pool(longpolling).lock().await;
                let dead: Vec<String> = pool
                    .keys()
                    .filter(|addr| !valid_addrs.contains(*addr))
                    .cloned()
                    .collect();
                dead.into_iter().filter_map(|addr| pool.remove(&addr)).collect()
            };
            for conn in removed {
                info!(addr = %conn.endpoint(), longpolling, "closing connection to removed broker");
                conn.close().await;
            }
        }
    }

    pub(crate) fn begin_close(&self) {
        self.inner.closing.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_closing(&self) -> bool {
        self.inner.closing.load(Ordering::SeqCst)
    }

    async fn total_pending(&self) -> usize {
        let mut total = 0;
        for longpolling in [false, true] {
            let conns: Vec<PooledConnection> =
                self.pool(longpolling).lock().await.values().cloned().collect();
            for conn in conns {
                total += conn.pending_len().await;
            }
        }
        total
    }

    /// Waits up to `grace` for in-flight requests to drain, then tears both
    /// pools down.
    pub(crate) async fn drain_and_close(&self, grace: Duration) {
        let deadline = Instant::now() + grace;
        loop {
            let pending = self.total_pending().await;
            if pending == 0 {
                break;
            }
            if Instant::now() >= deadline {
                debug!(pending, "closing with requests still in flight");
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        for longpolling in [false, true] {
            let conns: Vec<PooledConnection> = {
                let mut pool = self.pool(longpolling).lock().await;
                pool.drain().map(|(_, conn)| conn).collect()
            };
            for conn in conns {
                conn.close().await;
            }
        }
    }

    pub(crate) fn events(&self) -> &EventBus {
        &self.inner.events
    }
}
