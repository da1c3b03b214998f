//! The client core: bootstrap, metadata coherence, and the high-level
//! operations everything else is built on.

use std::collections::HashMap;
use std::io::Cursor;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use rand::prelude::*;
use tokio::sync::{broadcast, Mutex, Notify};
use tracing::{debug, info, warn};

use crate::backoff::retry_with_backoff;
use crate::compression::{CodecRegistry, Compression, CompressionCodec};
use crate::connection::{BrokerPool, ConnectError, PooledConnection};
use crate::events::{ClientEvent, EventBus};
use crate::metadata::MetadataStore;
use crate::protocol::error::ApiError;
use crate::protocol::messages::{
    CreateTopicConfig, CreateTopicRequest, CreateTopicsRequest, DescribeGroupsRequest,
    FetchRequest, FetchRequestPartition, FetchRequestTopic, ListGroupsRequest, MetadataRequest,
    ProduceRequest, ProduceRequestPartition, ProduceRequestTopic, ReadVersionedType, RequestBody,
    WriteVersionedType, NORMAL_CONSUMER,
};

pub mod config;
pub mod error;
pub(crate) mod router;


use config::{parse_kafka_hosts, validate_client_id, ClientConfig};
pub use error::{Error, Result};
pub use router::RouteTo;
use router::{controller_request_with_retry, Router};

/// Time allowed for in-flight requests to drain during [`Client::close`].
const CLOSE_GRACE: Duration = Duration::from_secs(5);

/// Specification of a topic to create.
#[derive(Debug, Clone)]
pub struct NewTopic {
    pub name: String,
    pub num_partitions: i32,
    pub replication_factor: i16,
    pub configs: Vec<(String, Option<String>)>,
}

impl NewTopic {
    pub fn new(name: impl Into<String>, num_partitions: i32, replication_factor: i16) -> Self {
        Self {
            name: name.into(),
            num_partitions,
            replication_factor,
            configs: vec![],
        }
    }
}

/// One encoded message set addressed to a partition.
#[derive(Debug, Clone)]
pub struct ProducePayload {
    pub topic: String,
    pub partition: i32,

    /// Already-encoded record data; record encoding is an external concern.
    pub records: Vec<u8>,

    /// Codec applied to `records` before sending.
    pub compression: Compression,
}

/// Offset assigned to one produced payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducedOffset {
    pub topic: String,
    pub partition: i32,
    pub base_offset: i64,
}

/// Result of [`Client::produce`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProduceOutcome {
    /// Offsets confirmed by the leaders.
    Acked(Vec<ProducedOffset>),

    /// `require_acks == 0`: the write was sent and no response will follow.
    NoAck,
}

/// One partition read addressed to its leader.
#[derive(Debug, Clone)]
pub struct FetchPayload {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub max_bytes: i32,
}

/// Raw data fetched from one partition.
#[derive(Debug, Clone)]
pub struct FetchedPartition {
    pub topic: String,
    pub partition: i32,

    /// Per-partition fetch error, surfaced for the consumer layer to act on.
    pub error: Option<ApiError>,
    pub high_watermark: i64,

    /// Encoded message set, opaque to the client core.
    pub records: Vec<u8>,
}

/// State of one consumer group as reported by its coordinator.
#[derive(Debug, Clone)]
pub struct GroupDescription {
    pub group_id: String,
    pub state: String,
    pub protocol_type: String,
    pub protocol: String,
    pub members: Vec<GroupMember>,
}

#[derive(Debug, Clone)]
pub struct GroupMember {
    pub member_id: String,
    pub client_id: String,
    pub client_host: String,
    pub member_metadata: Vec<u8>,
    pub member_assignment: Vec<u8>,
}

/// Builder for [`Client`].
pub struct ClientBuilder {
    bootstrap: Vec<String>,
    config: ClientConfig,
    codecs: CodecRegistry,
}

impl ClientBuilder {
    /// Create a new [`ClientBuilder`] with the list of bootstrap brokers.
    /// Each entry may itself be a comma-separated `host:port` list.
    pub fn new(bootstrap: Vec<String>) -> Self {
        Self {
            bootstrap,
            config: ClientConfig::default(),
            codecs: CodecRegistry::new(),
        }
    }

    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.config.client_id = client_id.into();
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn idle_connection(mut self, idle: Duration) -> Self {
        self.config.idle_connection = idle;
        self
    }

    /// Defer bootstrap to an explicit [`Client::connect`] call.
    pub fn manual_connect(mut self) -> Self {
        self.config.auto_connect = false;
        self
    }

    /// Setup TLS.
    pub fn tls_config(mut self, tls_config: Arc<rustls::ClientConfig>) -> Self {
        self.config.tls_config = Some(tls_config);
        self
    }

    /// Skip `ApiVersions` negotiation and always use the base version table.
    pub fn disable_version_negotiation(mut self) -> Self {
        self.config.versions_disabled = true;
        self
    }

    pub fn versions_timeout(mut self, timeout: Duration) -> Self {
        self.config.versions_timeout = timeout;
        self
    }

    pub fn connect_retry(mut self, retry: crate::backoff::RetryConfig) -> Self {
        self.config.connect_retry = retry;
        self
    }

    pub fn max_async_requests(mut self, max: usize) -> Self {
        self.config.max_async_requests = max;
        self
    }

    pub fn no_ack_batch(mut self, batch: crate::connection::broker::NoAckBatchConfig) -> Self {
        self.config.no_ack_batch = Some(batch);
        self
    }

    /// Register a compression codec for produce payloads.
    pub fn codec(mut self, compression: Compression, codec: Arc<dyn CompressionCodec>) -> Self {
        self.codecs.register(compression, codec);
        self
    }

    /// Build the [`Client`], bootstrapping unless [`manual_connect`]
    /// (`ClientBuilder::manual_connect`) was requested.
    pub async fn build(self) -> Result<Client> {
        let mut config = self.config;
        config.kafka_hosts = parse_kafka_hosts(&self.bootstrap.join(","))?;
        validate_client_id(&config.client_id)?;
        let config = Arc::new(config);

        let events = EventBus::new();
        let correlation_id = Arc::new(AtomicI32::new(0));
        let metadata = Arc::new(MetadataStore::new(events.clone()));
        let pool = BrokerPool::new(Arc::clone(&config), correlation_id, events.clone());
        let router = Router::new(pool.clone(), Arc::clone(&metadata), Arc::clone(&config));

        let client = Client {
            config,
            codecs: self.codecs,
            metadata,
            pool,
            router,
            events,
            ready: AtomicBool::new(false),
            connecting: AtomicBool::new(false),
            refreshing: Arc::new(AtomicBool::new(false)),
            close_notify: Notify::new(),
            close_state: Mutex::new(false),
        };

        if client.config.auto_connect {
            client.connect().await?;
        }
        Ok(client)
    }
}

impl std::fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientBuilder").finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub struct Client {
    config: Arc<ClientConfig>,
    codecs: CodecRegistry,
    metadata: Arc<MetadataStore>,
    pool: BrokerPool,
    router: Router,
    events: EventBus,
    ready: AtomicBool,
    connecting: AtomicBool,
    refreshing: Arc<AtomicBool>,
    close_notify: Notify,
    close_state: Mutex<bool>,
}

impl Client {
    /// Bootstrap: connect to the first reachable bootstrap endpoint and
    /// replace the metadata stores from it, retrying per `connect_retry`.
    ///
    /// A concurrent second call is ignored while one is in progress; a
    /// pending connect is cancelled by [`Client::close`].
    pub async fn connect(&self) -> Result<()> {
        if self.pool.is_closing() {
            return Err(Error::ClientClosing);
        }
        if self.connecting.swap(true, Ordering::SeqCst) {
            debug!("connect already in progress");
            return Ok(());
        }

        let result = tokio::select! {
            result = self.bootstrap_with_retry() => result,
            _ = self.close_notify.notified() => Err(Error::ClientClosing),
        };
        self.connecting.store(false, Ordering::SeqCst);

        match result {
            Ok(()) => {
                self.ready.store(true, Ordering::SeqCst);
                info!("client ready");
                self.events.send(ClientEvent::Ready);
                Ok(())
            }
            Err(e) => {
                self.events.send(ClientEvent::Error(e.to_string()));
                Err(e)
            }
        }
    }

    async fn bootstrap_with_retry(&self) -> Result<()> {
        let retry = &self.config.connect_retry;
        let result = retry_with_backoff(retry, "bootstrap", || async {
            if self.pool.is_closing() {
                return ControlFlow::Break(Err(Error::ClientClosing));
            }
            match self.bootstrap_once().await {
                Ok(()) => ControlFlow::Break(Ok(())),
                Err(e @ Error::ClientClosing) => ControlFlow::Break(Err(e)),
                Err(e) => ControlFlow::Continue(e),
            }
        })
        .await;

        result.map_err(|e| match e {
            Error::ClientClosing => Error::ClientClosing,
            e => Error::Bootstrap {
                attempts: retry.retries + 1,
                source: Box::new(e),
            },
        })
    }

    async fn bootstrap_once(&self) -> Result<()> {
        let mut hosts = self.config.kafka_hosts.clone();
        hosts.shuffle(&mut thread_rng());

        let mut last: Option<Error> = None;
        let mut bootstrap: Option<PooledConnection> = None;
        for endpoint in &hosts {
            match self.pool.get_or_open(endpoint, false).await {
                Ok(conn) => {
                    bootstrap = Some(conn);
                    break;
                }
                Err(ConnectError::ClientClosing) => return Err(Error::ClientClosing),
                Err(e) => {
                    warn!(addr = %endpoint, error = %e, "bootstrap endpoint failed");
                    last = Some(e.into());
                }
            }
        }
        let Some(conn) = bootstrap else {
            return Err(last.unwrap_or(Error::NoAvailableBrokers));
        };
        self.events.send(ClientEvent::Connect);

        let response = conn.request(&MetadataRequest { topics: None }, None).await?;
        self.metadata.update(&response, true);
        Ok(())
    }

    /// Whether bootstrap completed.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Subscribe to lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    /// True iff a leader is known for the partition.
    pub fn has_metadata(&self, topic: &str, partition: i32) -> bool {
        self.metadata.has_leader(topic, partition)
    }

    /// The primary data-plane entry point: route a typed request and await
    /// its decoded response.
    ///
    /// When the target broker turns out to be gone, the call fails with
    /// [`Error::BrokerNotAvailable`] and a metadata refresh is kicked off in
    /// the background so the next attempt routes around it.
    pub async fn send_request<R>(&self, target: RouteTo, request: &R) -> Result<R::ResponseBody>
    where
        R: RequestBody + WriteVersionedType<Vec<u8>> + Send + Sync,
        R::ResponseBody: ReadVersionedType<Cursor<Vec<u8>>>,
    {
        self.ensure_open()?;
        let conn = self.router.route(&target).await?;
        match conn.request(request, None).await {
            Ok(response) => Ok(response),
            Err(e) if Error::is_connection_loss(&e) => {
                self.refresh_in_background();
                Err(Error::BrokerNotAvailable(e.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Run an admin request against the controller with the one-shot
    /// `NotController` retry applied.
    pub async fn send_controller_request<R>(&self, request: &R) -> Result<R::ResponseBody>
    where
        R: RequestBody + WriteVersionedType<Vec<u8>> + Send + Sync,
        R::ResponseBody: ReadVersionedType<Cursor<Vec<u8>>> + Send,
    {
        self.ensure_open()?;
        controller_request_with_retry(&self.router, |conn| async move {
            let response = conn.request(request, None).await?;
            Ok(response)
        })
        .await
    }

    /// Produce pre-encoded message sets to their partition leaders.
    ///
    /// With `require_acks == 0` the writes are fire-and-forget and the call
    /// completes with [`ProduceOutcome::NoAck`] immediately after sending.
    pub async fn produce(
        &self,
        payloads: Vec<ProducePayload>,
        require_acks: i16,
        timeout_ms: i32,
    ) -> Result<ProduceOutcome> {
        self.ensure_open()?;

        let mut compressed = Vec::with_capacity(payloads.len());
        for payload in payloads {
            let ProducePayload {
                topic,
                partition,
                records,
                compression,
            } = payload;
            let records = self.codecs.compress(compression, records)?;
            compressed.push(ProducePayload {
                topic,
                partition,
                records,
                compression,
            });
        }

        let keys: Vec<(String, i32)> = compressed
            .iter()
            .map(|p| (p.topic.clone(), p.partition))
            .collect();
        self.verify_leaders(&keys).await?;

        let mut by_leader: HashMap<i32, Vec<ProducePayload>> = HashMap::new();
        for payload in compressed {
            let leader = self
                .metadata
                .leader_for(&payload.topic, payload.partition)
                .ok_or_else(|| {
                    Error::BrokerNotAvailable("could not find the leader".to_owned())
                })?;
            by_leader.entry(leader).or_default().push(payload);
        }

        let results = futures::future::join_all(by_leader.into_iter().map(
            |(leader, group)| self.produce_to_leader(leader, group, require_acks, timeout_ms),
        ))
        .await;

        let mut offsets = Vec::new();
        let mut first_err: Option<Error> = None;
        for result in results {
            match result {
                Ok(Some(batch)) => offsets.extend(batch),
                Ok(None) => {}
                Err(e) => first_err = first_err.or(Some(e)),
            }
        }

        if let Some(e) = first_err {
            if matches!(
                &e,
                Error::ServerError {
                    protocol_error: ApiError::NotLeaderForPartition
                        | ApiError::UnknownTopicOrPartition,
                    ..
                }
            ) {
                // leadership moved under us; tell consumers to re-resolve
                self.events.send(ClientEvent::BrokersChanged);
            }
            return Err(e);
        }

        Ok(if require_acks == 0 {
            ProduceOutcome::NoAck
        } else {
            ProduceOutcome::Acked(offsets)
        })
    }

    async fn produce_to_leader(
        &self,
        leader: i32,
        group: Vec<ProducePayload>,
        require_acks: i16,
        timeout_ms: i32,
    ) -> Result<Option<Vec<ProducedOffset>>> {
        let conn = match self.router.broker_by_id(leader, false).await {
            Ok(conn) => conn,
            Err(e @ Error::BrokerNotAvailable(_)) => {
                self.refresh_in_background();
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        let mut topics: HashMap<String, Vec<ProduceRequestPartition>> = HashMap::new();
        for payload in group {
            topics
                .entry(payload.topic)
                .or_default()
                .push(ProduceRequestPartition {
                    index: payload.partition,
                    records: payload.records,
                });
        }
        let request = ProduceRequest {
            acks: require_acks,
            timeout_ms,
            topics: topics
                .into_iter()
                .map(|(name, partitions)| ProduceRequestTopic { name, partitions })
                .collect(),
        };

        if require_acks == 0 {
            conn.send_unacked(&request).await?;
            return Ok(None);
        }

        let response = match conn.request(&request, None).await {
            Ok(response) => response,
            Err(e) if Error::is_connection_loss(&e) => {
                self.refresh_in_background();
                return Err(Error::BrokerNotAvailable(e.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let mut offsets = Vec::new();
        for topic in response.topics {
            for partition in topic.partitions {
                if let Some(error) = partition.error {
                    return Err(Error::server(
                        error,
                        format!("{}-{}", topic.name, partition.index),
                        None,
                    ));
                }
                offsets.push(ProducedOffset {
                    topic: topic.name.clone(),
                    partition: partition.index,
                    base_offset: partition.base_offset,
                });
            }
        }
        Ok(Some(offsets))
    }

    /// Long-poll fetch from the partition leaders, over the dedicated
    /// long-polling pool.
    ///
    /// Returns `Ok(None)` when every targeted broker already has a fetch in
    /// flight (the in-flight one will deliver the data).
    pub async fn fetch(
        &self,
        payloads: Vec<FetchPayload>,
        max_wait_ms: i32,
        min_bytes: i32,
    ) -> Result<Option<Vec<FetchedPartition>>> {
        self.ensure_open()?;

        let keys: Vec<(String, i32)> = payloads
            .iter()
            .map(|p| (p.topic.clone(), p.partition))
            .collect();
        self.verify_leaders(&keys).await?;

        let mut by_leader: HashMap<i32, Vec<FetchPayload>> = HashMap::new();
        for payload in payloads {
            let leader = self
                .metadata
                .leader_for(&payload.topic, payload.partition)
                .ok_or_else(|| {
                    Error::BrokerNotAvailable("could not find the leader".to_owned())
                })?;
            by_leader.entry(leader).or_default().push(payload);
        }

        let results = futures::future::join_all(by_leader.into_iter().map(
            |(leader, group)| self.fetch_from_leader(leader, group, max_wait_ms, min_bytes),
        ))
        .await;

        let mut merged = Vec::new();
        let mut any_data = false;
        let mut first_err: Option<Error> = None;
        for result in results {
            match result {
                Ok(Some(partitions)) => {
                    any_data = true;
                    merged.extend(partitions);
                }
                Ok(None) => {}
                Err(e) => first_err = first_err.or(Some(e)),
            }
        }
        if let Some(e) = first_err {
            return Err(e);
        }
        Ok(any_data.then_some(merged))
    }

    async fn fetch_from_leader(
        &self,
        leader: i32,
        group: Vec<FetchPayload>,
        max_wait_ms: i32,
        min_bytes: i32,
    ) -> Result<Option<Vec<FetchedPartition>>> {
        let conn = match self.router.broker_by_id(leader, true).await {
            Ok(conn) => conn,
            Err(e @ Error::BrokerNotAvailable(_)) => {
                self.refresh_in_background();
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        let Some(_guard) = conn.begin_long_poll() else {
            debug!(addr = %conn.endpoint(), "fetch already in flight, deduplicating");
            return Ok(None);
        };

        let mut topics: HashMap<String, Vec<FetchRequestPartition>> = HashMap::new();
        for payload in group {
            topics
                .entry(payload.topic)
                .or_default()
                .push(FetchRequestPartition {
                    partition: payload.partition,
                    fetch_offset: payload.offset,
                    max_bytes: payload.max_bytes,
                });
        }
        let request = FetchRequest {
            replica_id: NORMAL_CONSUMER,
            max_wait_ms,
            min_bytes,
            topics: topics
                .into_iter()
                .map(|(name, partitions)| FetchRequestTopic { name, partitions })
                .collect(),
        };

        match conn.request(&request, None).await {
            Ok(response) => Ok(Some(
                response
                    .topics
                    .into_iter()
                    .flat_map(|topic| {
                        let name = topic.name;
                        topic
                            .partitions
                            .into_iter()
                            .map(move |partition| FetchedPartition {
                                topic: name.clone(),
                                partition: partition.partition,
                                error: partition.error,
                                high_watermark: partition.high_watermark,
                                records: partition.records,
                            })
                    })
                    .collect(),
            )),
            // intentional teardown drops parked fetches silently
            Err(crate::connection::broker::RequestError::ConnectionClosed) => Ok(None),
            Err(e) if Error::is_connection_loss(&e) => {
                self.refresh_in_background();
                Err(Error::BrokerNotAvailable(e.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Refresh metadata for specific topics, merging into the store. Called
    /// before retrying leaderless payloads.
    pub async fn refresh_metadata(&self, topics: &[String]) -> Result<()> {
        self.ensure_open()?;
        self.router.load_metadata(Some(topics), false).await?;
        Ok(())
    }

    /// Load metadata for all topics, merging into the store.
    pub async fn load_metadata(&self) -> Result<()> {
        self.ensure_open()?;
        self.router.load_metadata(None, false).await?;
        Ok(())
    }

    /// Reload the full cluster view, replace the stores, and close
    /// connections to brokers that left the cluster.
    ///
    /// Overlapping calls coalesce into a single network round-trip. Failures
    /// are returned to the caller and surfaced as a client [`ClientEvent::Error`].
    pub async fn refresh_broker_metadata(&self) -> Result<()> {
        Self::do_refresh_broker_metadata(
            &self.router,
            &self.pool,
            &self.metadata,
            &self.refreshing,
            &self.events,
        )
        .await
    }

    async fn do_refresh_broker_metadata(
        router: &Router,
        pool: &BrokerPool,
        metadata: &MetadataStore,
        refreshing: &AtomicBool,
        events: &EventBus,
    ) -> Result<()> {
        if refreshing.swap(true, Ordering::SeqCst) {
            debug!("broker metadata refresh already in flight");
            return Ok(());
        }

        let result = async {
            router.load_metadata(None, true).await?;
            pool.close_dead(&metadata.valid_addrs()).await;
            Ok(())
        }
        .await;
        refreshing.store(false, Ordering::SeqCst);

        if let Err(e) = &result {
            events.send(ClientEvent::Error(format!(
                "broker metadata refresh failed: {e}"
            )));
        }
        result
    }

    /// Fire-and-forget refresh used when a broker drops mid-request.
    fn refresh_in_background(&self) {
        let router = self.router.clone();
        let pool = self.pool.clone();
        let metadata = Arc::clone(&self.metadata);
        let refreshing = Arc::clone(&self.refreshing);
        let events = self.events.clone();
        tokio::spawn(async move {
            let _ =
                Self::do_refresh_broker_metadata(&router, &pool, &metadata, &refreshing, &events)
                    .await;
        });
    }

    /// Ensure every `(topic, partition)` has a known leader, refreshing the
    /// affected topics once if any is missing.
    async fn verify_leaders(&self, keys: &[(String, i32)]) -> Result<()> {
        let mut missing: Vec<String> = keys
            .iter()
            .filter(|(topic, partition)| !self.metadata.has_leader(topic, *partition))
            .map(|(topic, _)| topic.clone())
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        missing.sort();
        missing.dedup();
        debug!(topics = ?missing, "payloads without a leader, refreshing metadata");
        self.refresh_metadata(&missing).await?;

        if keys
            .iter()
            .any(|(topic, partition)| !self.metadata.has_leader(topic, *partition))
        {
            return Err(Error::BrokerNotAvailable(
                "could not find the leader".to_owned(),
            ));
        }
        Ok(())
    }

    /// Create topics via the controller, with the one-shot `NotController`
    /// retry. Per-topic server errors surface as [`Error::ServerError`].
    pub async fn create_topics(&self, topics: Vec<NewTopic>, timeout_ms: i32) -> Result<()> {
        self.ensure_open()?;

        let request = CreateTopicsRequest {
            topics: topics
                .into_iter()
                .map(|topic| CreateTopicRequest {
                    name: topic.name,
                    num_partitions: topic.num_partitions,
                    replication_factor: topic.replication_factor,
                    assignments: vec![],
                    configs: topic
                        .configs
                        .into_iter()
                        .map(|(name, value)| CreateTopicConfig { name, value })
                        .collect(),
                })
                .collect(),
            timeout_ms,
            validate_only: None,
        };

        controller_request_with_retry(&self.router, |conn| {
            let request = &request;
            async move {
                let response = conn.request(request, None).await?;
                for topic in response.topics {
                    if let Some(error) = topic.error {
                        return Err(Error::server(
                            error,
                            format!("topic {}", topic.name),
                            topic.error_message,
                        ));
                    }
                }
                Ok(())
            }
        })
        .await?;

        // observe the new topics (and any leadership placement) right away
        let _ = self.refresh_broker_metadata().await;
        Ok(())
    }

    /// Check that every topic exists, after refreshing metadata for them.
    pub async fn topics_exist(&self, topics: &[String]) -> Result<()> {
        self.ensure_open()?;
        self.refresh_metadata(topics).await?;

        let missing: Vec<String> = topics
            .iter()
            .filter(|topic| !self.metadata.has_topic(topic))
            .cloned()
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::TopicsNotExist { topics: missing })
        }
    }

    /// List consumer groups across every connected broker, mapping group id
    /// to protocol type.
    pub async fn list_groups(&self) -> Result<HashMap<String, String>> {
        self.ensure_open()?;

        let mut brokers = self.pool.get_connected(false).await;
        if brokers.is_empty() {
            brokers.push(self.router.any_connected().await?);
        }

        let responses: Vec<_> = stream::iter(
            brokers
                .into_iter()
                .map(|conn| async move { conn.request(&ListGroupsRequest, None).await }),
        )
        .buffer_unordered(self.config.max_async_requests)
        .collect()
        .await;

        let mut groups = HashMap::new();
        for response in responses {
            let response = response?;
            if let Some(error) = response.error {
                return Err(Error::server(error, "group listing", None));
            }
            for group in response.groups {
                groups.insert(group.group_id, group.protocol_type);
            }
        }
        Ok(groups)
    }

    /// Describe consumer groups, routed to each group's coordinator.
    pub async fn describe_groups(
        &self,
        groups: &[String],
    ) -> Result<HashMap<String, GroupDescription>> {
        self.ensure_open()?;

        // batch groups sharing a coordinator into one request
        let mut by_coordinator: HashMap<String, (PooledConnection, Vec<String>)> = HashMap::new();
        for group in groups {
            let conn = self.router.coordinator(group).await?;
            by_coordinator
                .entry(conn.addr())
                .or_insert_with(|| (conn, Vec::new()))
                .1
                .push(group.clone());
        }

        let responses: Vec<_> = stream::iter(by_coordinator.into_values().map(
            |(conn, groups)| async move {
                conn.request(&DescribeGroupsRequest { groups }, None).await
            },
        ))
        .buffer_unordered(self.config.max_async_requests)
        .collect()
        .await;

        let mut out = HashMap::new();
        for response in responses {
            for group in response?.groups {
                if let Some(error) = group.error {
                    return Err(Error::server(
                        error,
                        format!("group {}", group.group_id),
                        None,
                    ));
                }
                out.insert(
                    group.group_id.clone(),
                    GroupDescription {
                        group_id: group.group_id,
                        state: group.state,
                        protocol_type: group.protocol_type,
                        protocol: group.protocol,
                        members: group
                            .members
                            .into_iter()
                            .map(|member| GroupMember {
                                member_id: member.member_id,
                                client_id: member.client_id,
                                client_host: member.client_host,
                                member_metadata: member.member_metadata,
                                member_assignment: member.member_assignment,
                            })
                            .collect(),
                    },
                );
            }
        }
        Ok(out)
    }

    /// Close the client: cancel a pending connect, let in-flight requests
    /// drain briefly, then tear both pools down.
    ///
    /// Concurrent and repeated calls coalesce into one teardown; each call
    /// completes once the client is closed.
    pub async fn close(&self) {
        let mut closed = self.close_state.lock().await;
        if *closed {
            return;
        }

        info!("closing client");
        self.pool.begin_close();
        self.close_notify.notify_waiters();
        self.ready.store(false, Ordering::SeqCst);

        self.pool.drain_and_close(CLOSE_GRACE).await;
        self.events.send(ClientEvent::Close);
        *closed = true;
    }

    fn ensure_open(&self) -> Result<()> {
        if self.pool.is_closing() {
            Err(Error::ClientClosing)
        } else {
            Ok(())
        }
    }
}
