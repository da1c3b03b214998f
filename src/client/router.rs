//! Resolves logical targets to ready broker connections.

use std::sync::Arc;

use async_trait::async_trait;
use rand::prelude::*;
use tracing::{debug, warn};

use crate::client::config::ClientConfig;
use crate::client::error::{Error, Result};
use crate::connection::{BrokerPool, PooledConnection};
use crate::metadata::{BrokerEndpoint, MetadataStore};
use crate::protocol::error::ApiError;
use crate::protocol::messages::{FindCoordinatorRequest, MetadataRequest, MetadataResponse};

/// Logical request target, resolved by the [`Router`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteTo {
    /// Any broker the client currently has (or can get) a connection to;
    /// used for metadata refreshes.
    AnyConnected,

    /// The leader of a partition; used for produce and fetch.
    Leader { topic: String, partition: i32 },

    /// The cluster controller; used for admin requests.
    Controller,

    /// The coordinator of a consumer group.
    GroupCoordinator { group: String },
}

#[derive(Debug, Clone)]
pub(crate) struct Router {
    pool: BrokerPool,
    metadata: Arc<MetadataStore>,
    config: Arc<ClientConfig>,
}

impl Router {
    pub(crate) fn new(
        pool: BrokerPool,
        metadata: Arc<MetadataStore>,
        config: Arc<ClientConfig>,
    ) -> Self {
        Self {
            pool,
            metadata,
            config,
        }
    }

    pub(crate) async fn route(&self, target: &RouteTo) -> Result<PooledConnection> {
        match target {
            RouteTo::AnyConnected => self.any_connected().await,
            RouteTo::Leader { topic, partition } => self.leader(topic, *partition, false).await,
            RouteTo::Controller => self.controller().await,
            RouteTo::GroupCoordinator { group } => self.coordinator(group).await,
        }
    }

    /// Picks a random live connection, or opens untried endpoints from broker
    /// metadata (the bootstrap list while the store is empty) until one
    /// succeeds.
    pub(crate) async fn any_connected(&self) -> Result<PooledConnection> {
        let connected = self.pool.get_connected(false).await;
        if let Some(conn) = connected.choose(&mut thread_rng()) {
            return Ok(Arc::clone(conn));
        }

        let mut endpoints = self.metadata.broker_endpoints();
        if endpoints.is_empty() {
            endpoints = self.config.kafka_hosts.clone();
        }
        endpoints.shuffle(&mut thread_rng());

        for endpoint in &endpoints {
            match self.pool.get_or_open(endpoint, false).await {
                Ok(conn) => return Ok(conn),
                Err(crate::connection::ConnectError::ClientClosing) => {
                    return Err(Error::ClientClosing)
                }
                Err(e) => warn!(addr = %endpoint, error = %e, "failed to open broker"),
            }
        }
        Err(Error::NoAvailableBrokers)
    }

    /// Resolves a broker id through the broker metadata.
    pub(crate) async fn broker_by_id(
        &self,
        node_id: i32,
        longpolling: bool,
    ) -> Result<PooledConnection> {
        let endpoint = self.metadata.endpoint_of(node_id).ok_or_else(|| {
            Error::BrokerNotAvailable(format!("broker {node_id} is not in broker metadata"))
        })?;
        self.open(&endpoint, longpolling).await
    }

    /// Resolves the leader of a partition; callers that can tolerate stale
    /// metadata must refresh before retrying on a miss.
    pub(crate) async fn leader(
        &self,
        topic: &str,
        partition: i32,
        longpolling: bool,
    ) -> Result<PooledConnection> {
        let leader = self.metadata.leader_for(topic, partition).ok_or_else(|| {
            Error::BrokerNotAvailable(format!("no known leader for {topic}-{partition}"))
        })?;
        self.broker_by_id(leader, longpolling).await
    }

    /// Resolves the cluster controller, reloading metadata once when the
    /// cached controller is unknown or unreachable.
    pub(crate) async fn controller(&self) -> Result<PooledConnection> {
        if let Some(id) = self.metadata.controller_id() {
            if let Some(endpoint) = self.metadata.endpoint_of(id) {
                match self.open(&endpoint, false).await {
                    Ok(conn) => return Ok(conn),
                    Err(e) => {
                        debug!(controller = id, error = %e, "cached controller unreachable");
                    }
                }
            }
        }

        self.load_metadata(None, false).await?;

        let id = self
            .metadata
            .controller_id()
            .ok_or_else(|| Error::BrokerNotAvailable("controller is unknown".to_owned()))?;
        self.broker_by_id(id, false).await
    }

    /// Resolves the coordinator of a consumer group by asking any connected
    /// broker.
    pub(crate) async fn coordinator(&self, group: &str) -> Result<PooledConnection> {
        let conn = self.any_connected().await?;
        let response = conn
            .request(
                &FindCoordinatorRequest {
                    key: group.to_owned(),
                },
                None,
            )
            .await?;

        if let Some(error) = response.error {
            return Err(Error::server(error, format!("group {group}"), None));
        }

        let endpoint = BrokerEndpoint::new(response.host, response.port as u16);
        self.open(&endpoint, false).await
    }

    /// Loads metadata from any connected broker and applies it to the store.
    /// `None` loads every topic.
    pub(crate) async fn load_metadata(
        &self,
        topics: Option<&[String]>,
        replace_topics: bool,
    ) -> Result<MetadataResponse> {
        let conn = self.any_connected().await?;
        let request = MetadataRequest {
            topics: topics.map(|t| t.to_vec()),
        };
        let response = conn.request(&request, None).await?;
        self.metadata.update(&response, replace_topics);
        Ok(response)
    }

    async fn open(
        &self,
        endpoint: &BrokerEndpoint,
        longpolling: bool,
    ) -> Result<PooledConnection> {
        match self.pool.get_or_open(endpoint, longpolling).await {
            Ok(conn) => Ok(conn),
            Err(crate::connection::ConnectError::ClientClosing) => Err(Error::ClientClosing),
            Err(e) => Err(Error::BrokerNotAvailable(e.to_string())),
        }
    }
}

/// Caches the controller connection for admin requests; the seam is a trait
/// so the one-shot migration retry is testable with scripted brokers.
#[async_trait]
pub(crate) trait ControllerCache: Send + Sync {
    type C: Send + Sync;

    async fn get(&self) -> Result<Arc<Self::C>>;

    async fn invalidate(&self);
}

#[async_trait]
impl ControllerCache for Router {
    type C = crate::connection::broker::BrokerConnection<
        tokio::io::BufStream<crate::connection::transport::Transport>,
    >;

    async fn get(&self) -> Result<Arc<Self::C>> {
        self.controller().await
    }

    async fn invalidate(&self) {
        debug!("clearing cached controller");
        self.metadata.set_controller(None);
    }
}

/// Runs an admin request against the controller, retrying exactly once when
/// the broker answers `NotController`: the cached controller id is cleared,
/// the controller is re-resolved, and a second `NotController` surfaces to
/// the caller unchanged.
pub(crate) async fn controller_request_with_retry<B, F, Fut, T>(cache: &B, f: F) -> Result<T>
where
    B: ControllerCache,
    F: Fn(Arc<B::C>) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<T>> + Send,
{
    let mut retried = false;
    loop {
        let conn = cache.get().await?;
        match f(conn).await {
            Err(Error::ServerError {
                protocol_error: ApiError::NotController,
                ..
            }) if !retried => {
                retried = true;
                debug!("controller moved, re-resolving once");
                cache.invalidate().await;
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use assert_matches::assert_matches;

    /// Scripted controller: yields the behavior for each consecutive attempt.
    struct FakeController(Vec<Option<ApiError>>);

    struct FakeCache {
        conn: Arc<FakeController>,
        gets: AtomicUsize,
        invalidations: AtomicUsize,
    }

    impl FakeCache {
        fn new(outcomes: Vec<Option<ApiError>>) -> Self {
            Self {
                conn: Arc::new(FakeController(outcomes)),
                gets: AtomicUsize::new(0),
                invalidations: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ControllerCache for FakeCache {
        type C = FakeController;

        async fn get(&self) -> Result<Arc<Self::C>> {
            self.gets.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::clone(&self.conn))
        }

        async fn invalidate(&self) {
            self.invalidations.fetch_add(1, Ordering::SeqCst);
        }
    }

    async fn run(cache: &FakeCache) -> Result<&'static str> {
        let attempt = AtomicUsize::new(0);
        controller_request_with_retry(cache, |conn: Arc<FakeController>| {
            let i = attempt.fetch_add(1, Ordering::SeqCst);
            let outcome = conn.0.get(i).cloned().flatten();
            async move {
                match outcome {
                    None => Ok("ok"),
                    Some(error) => Err(Error::server(error, "topic tests", None)),
                }
            }
        })
        .await
    }

    #[tokio::test]
    async fn test_success_without_retry() {
        let cache = FakeCache::new(vec![None]);
        assert_eq!(run(&cache).await.unwrap(), "ok");
        assert_eq!(cache.gets.load(Ordering::SeqCst), 1);
        assert_eq!(cache.invalidations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_not_controller_retries_once() {
        let cache = FakeCache::new(vec![Some(ApiError::NotController), None]);
        assert_eq!(run(&cache).await.unwrap(), "ok");
        assert_eq!(cache.gets.load(Ordering::SeqCst), 2);
        assert_eq!(cache.invalidations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_second_not_controller_surfaces() {
        let cache = FakeCache::new(vec![
            Some(ApiError::NotController),
            Some(ApiError::NotController),
        ]);
        let err = run(&cache).await.unwrap_err();
        assert_matches!(
            err,
            Error::ServerError {
                protocol_error: ApiError::NotController,
                ..
            }
        );
        assert_eq!(cache.gets.load(Ordering::SeqCst), 2);
        assert_eq!(cache.invalidations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_other_errors_are_not_retried() {
        let cache = FakeCache::new(vec![Some(ApiError::TopicAlreadyExists)]);
        let err = run(&cache).await.unwrap_err();
        assert_matches!(
            err,
            Error::ServerError {
                protocol_error: ApiError::TopicAlreadyExists,
                ..
            }
        );
        assert_eq!(cache.gets.load(Ordering::SeqCst), 1);
        assert_eq!(cache.invalidations.load(Ordering::SeqCst), 0);
    }
}
