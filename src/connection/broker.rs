//! A single broker connection multiplexing pipelined requests.
//!
//! One TCP/TLS stream carries many interleaved request/response pairs,
//! correlated by the id echoed back in every response header. A spawned
//! reader task owns the read half and hands each arriving frame to the
//! waiter registered under its correlation id; waiters that time out are
//! deregistered so a late frame is dropped silently.

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, WriteHalf};
use tokio::sync::{oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::metadata::BrokerEndpoint;
use crate::protocol::api_key::ApiKey;
use crate::protocol::api_version::{ApiVersion, ApiVersionRange};
use crate::protocol::error::ApiError;
use crate::protocol::frame::{AsyncMessageRead, AsyncMessageWrite};
use crate::protocol::messages::{
    ApiVersionsRequest, ReadVersionedError, ReadVersionedType, RequestBody, RequestHeader,
    ResponseHeader, WriteVersionedError, WriteVersionedType,
};

/// Hands out the unique id identifying each connection instance.
static NEXT_SOCKET_ID: AtomicU64 = AtomicU64::new(0);

struct ResponseFrame {
    #[allow(dead_code)]
    header: ResponseHeader,
    data: Cursor<Vec<u8>>,
}

type PendingMap = HashMap<i32, oneshot::Sender<Result<ResponseFrame, RequestError>>>;

#[derive(Error, Debug)]
pub enum RequestError {
    #[error("no matching version for {api_key:?}")]
    NoVersionMatch { api_key: ApiKey },

    #[error(transparent)]
    WriteError(#[from] WriteVersionedError),

    #[error(transparent)]
    WriteHeaderError(#[from] crate::protocol::primitives::WriteError),

    #[error(transparent)]
    WriteMessageError(#[from] crate::protocol::frame::WriteError),

    #[error(transparent)]
    ReadError(#[from] ReadVersionedError),

    #[error("cannot read/write data: {0}")]
    IO(#[from] std::io::Error),

    #[error("request timed out after {} ms", .0.as_millis())]
    Timeout(Duration),

    #[error("connection to broker {addr} failed: {reason}")]
    ConnectionFailed { addr: String, reason: String },

    #[error("connection is closed")]
    ConnectionClosed,
}

#[derive(Error, Debug)]
pub enum SyncVersionsError {
    #[error("error during api version negotiation: {0}")]
    Request(#[from] RequestError),

    #[error("broker {addr} rejected the api versions request: {error}")]
    Server { addr: String, error: ApiError },

    #[error("broker {addr} returned an empty api versions table")]
    Empty { addr: String },
}

/// Flush policy for `acks=0` writes, which never see a response and would
/// otherwise flush per call.
#[derive(Debug, Clone)]
pub struct NoAckBatchConfig {
    /// Flush once this many un-flushed bytes accumulate.
    pub max_bytes: usize,

    /// Flush at the latest this long after the first buffered write.
    pub max_age: Duration,
}

pub struct BrokerConnection<RW = tokio::io::BufStream<super::transport::Transport>> {
    endpoint: BrokerEndpoint,
    socket_id: u64,
    longpolling: bool,
    client_id: Option<String>,
    request_timeout: Duration,
    no_ack_batch: Option<NoAckBatchConfig>,

    stream_write: Arc<Mutex<WriteHalf<RW>>>,
    correlation_id: Arc<AtomicI32>,
    api_support: parking_lot::RwLock<Option<HashMap<ApiKey, ApiVersionRange>>>,
    pending: Arc<Mutex<Option<PendingMap>>>,
    last_activity: Arc<parking_lot::Mutex<Instant>>,

    /// Long-poll in flight; at most one per connection.
    waiting: AtomicBool,
    closing: Arc<AtomicBool>,
    /// Set exactly once, to the reason the connection died.
    dead: Arc<watch::Sender<Option<String>>>,
    unflushed: Arc<AtomicUsize>,
    flush_scheduled: Arc<AtomicBool>,

    join_handle: JoinHandle<()>,
}

impl<RW> std::fmt::Debug for BrokerConnection<RW> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerConnection")
            .field("endpoint", &self.endpoint)
            .field("socket_id", &self.socket_id)
            .field("longpolling", &self.longpolling)
            .finish_non_exhaustive()
    }
}

impl<RW> BrokerConnection<RW>
where
    RW: AsyncRead + AsyncWrite + Send + 'static,
{
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        stream: RW,
        endpoint: BrokerEndpoint,
        longpolling: bool,
        correlation_id: Arc<AtomicI32>,
        client_id: Option<String>,
        request_timeout: Duration,
        max_frame_size: usize,
        no_ack_batch: Option<NoAckBatchConfig>,
    ) -> Self {
        let socket_id = NEXT_SOCKET_ID.fetch_add(1, Ordering::Relaxed);
        let (stream_read, stream_write) = tokio::io::split(stream);

        let pending: Arc<Mutex<Option<PendingMap>>> = Arc::new(Mutex::new(Some(HashMap::new())));
        let last_activity = Arc::new(parking_lot::Mutex::new(Instant::now()));
        let closing = Arc::new(AtomicBool::new(false));
        let (dead_tx, _) = watch::channel(None);
        let dead = Arc::new(dead_tx);

        let join_handle = tokio::spawn(Self::run_reader(
            stream_read,
            endpoint.addr(),
            socket_id,
            max_frame_size,
            Arc::clone(&pending),
            Arc::clone(&last_activity),
            Arc::clone(&closing),
            Arc::clone(&dead),
        ));

        Self {
            endpoint,
            socket_id,
            longpolling,
            client_id,
            request_timeout,
            no_ack_batch,
            stream_write: Arc::new(Mutex::new(stream_write)),
            correlation_id,
            api_support: parking_lot::RwLock::new(None),
            pending,
            last_activity,
            waiting: AtomicBool::new(false),
            closing,
            dead,
            unflushed: Arc::new(AtomicUsize::new(0)),
            flush_scheduled: Arc::new(AtomicBool::new(false)),
            join_handle,
        }
    }

    /// Reader half: splits the byte stream into frames and routes each to the
    /// waiter registered under its correlation id. On stream failure every
    /// outstanding waiter is failed, unless the teardown was intentional, in
    /// which case waiters are dropped silently.
    #[allow(clippy::too_many_arguments)]
    async fn run_reader(
        mut stream_read: tokio::io::ReadHalf<RW>,
        addr: String,
        socket_id: u64,
        max_frame_size: usize,
        pending: Arc<Mutex<Option<PendingMap>>>,
        last_activity: Arc<parking_lot::Mutex<Instant>>,
        closing: Arc<AtomicBool>,
        dead: Arc<watch::Sender<Option<String>>>,
    ) {
        let reason = loop {
            let msg = match stream_read.read_message(max_frame_size).await {
                Ok(msg) => msg,
                Err(e) => break e.to_string(),
            };
            *last_activity.lock() = Instant::now();

            let mut cursor = Cursor::new(msg);
            let header = match ResponseHeader::read(&mut cursor) {
                Ok(header) => header,
                Err(e) => break format!("invalid response header: {e}"),
            };

            let waiter = pending
                .lock()
                .await
                .as_mut()
                .and_then(|map| map.remove(&header.correlation_id));
            match waiter {
                Some(tx) => {
                    // we don't care if the caller is gone
                    let _ = tx.send(Ok(ResponseFrame {
                        header,
                        data: cursor,
                    }));
                }
                None => {
                    debug!(
                        %addr,
                        socket_id,
                        correlation_id = header.correlation_id,
                        "dropping frame with no registered waiter",
                    );
                }
            }
        };

        let intentional = closing.load(Ordering::SeqCst);
        if !intentional {
            warn!(%addr, socket_id, %reason, "broker connection failed");
        }

        if let Some(map) = pending.lock().await.take() {
            let n = map.len();
            if n > 0 {
                debug!(%addr, socket_id, pending = n, "failing outstanding requests");
            }
            for (_, tx) in map {
                if !intentional {
                    let _ = tx.send(Err(RequestError::ConnectionFailed {
                        addr: addr.clone(),
                        reason: reason.clone(),
                    }));
                }
                // intentional teardown: drop silently
            }
        }

        dead.send_replace(Some(reason));
    }

    /// Negotiates the version table used for this connection.
    ///
    /// A timeout is taken as a pre-0.10 broker and falls back to the base
    /// (version 0) table; an explicitly empty table fails the connection.
    pub(crate) async fn sync_versions(
        &self,
        disabled: bool,
        timeout: Duration,
    ) -> Result<(), SyncVersionsError> {
        // the probe itself needs a version to encode with
        self.set_api_support(base_version_ranges());
        if disabled {
            debug!(addr = %self.endpoint, "api version negotiation disabled, using base versions");
            return Ok(());
        }

        match self.request(&ApiVersionsRequest, Some(timeout)).await {
            Ok(response) => {
                if let Some(error) = response.error_code {
                    return Err(SyncVersionsError::Server {
                        addr: self.endpoint.addr(),
                        error,
                    });
                }
                let ranges: HashMap<ApiKey, ApiVersionRange> = response
                    .api_keys
                    .iter()
                    .filter(|k| !matches!(k.api_key, ApiKey::Unknown(_)))
                    .map(|k| {
                        (
                            k.api_key,
                            ApiVersionRange::new(k.min_version, k.max_version),
                        )
                    })
                    .collect();
                if ranges.is_empty() {
                    return Err(SyncVersionsError::Empty {
                        addr: self.endpoint.addr(),
                    });
                }
                debug!(addr = %self.endpoint, apis = ranges.len(), "negotiated api versions");
                self.set_api_support(ranges);
                Ok(())
            }
            Err(RequestError::Timeout(_)) => {
                info!(
                    addr = %self.endpoint,
                    "api versions request timed out, assuming pre-0.10 broker",
                );
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Issue a request and await the matching response.
    ///
    /// Responses complete in correlation order, not send order; callers must
    /// not assume FIFO completion across concurrent requests.
    pub(crate) async fn request<R>(
        &self,
        msg: R,
        override_timeout: Option<Duration>,
    ) -> Result<R::ResponseBody, RequestError>
    where
        R: RequestBody + WriteVersionedType<Vec<u8>> + Send + Sync,
        R::ResponseBody: ReadVersionedType<Cursor<Vec<u8>>>,
    {
        let version = self
            .usable_version(R::API_KEY, R::API_VERSION_RANGE)
            .ok_or(RequestError::NoVersionMatch {
                api_key: R::API_KEY,
            })?;
        let (correlation_id, buf) = self.encode(&msg, version)?;

        let (tx, rx) = oneshot::channel();
        {
            let mut guard = self.pending.lock().await;
            match guard.as_mut() {
                Some(map) => {
                    map.insert(correlation_id, tx);
                }
                None => return Err(RequestError::ConnectionClosed),
            }
        }

        if let Err(e) = self.write_frame(&buf, true).await {
            self.unqueue(correlation_id).await;
            return Err(e);
        }

        let timeout = override_timeout.unwrap_or(self.request_timeout);
        let frame = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(Ok(frame))) => frame,
            Ok(Ok(Err(e))) => return Err(e),
            // waiter dropped without an error: intentional teardown
            Ok(Err(_)) => return Err(RequestError::ConnectionClosed),
            Err(_) => {
                // deregister so the late frame is dropped silently
                self.unqueue(correlation_id).await;
                return Err(RequestError::Timeout(timeout));
            }
        };

        let mut data = frame.data;
        Ok(R::ResponseBody::read_versioned(&mut data, version)?)
    }

    /// Fire-and-forget write for `acks=0` produce requests: a correlation id
    /// is still consumed, but no waiter is registered and no response will
    /// ever arrive.
    pub(crate) async fn send_unacked<R>(&self, msg: R) -> Result<(), RequestError>
    where
        R: RequestBody + WriteVersionedType<Vec<u8>> + Send + Sync,
    {
        let version = self
            .usable_version(R::API_KEY, R::API_VERSION_RANGE)
            .ok_or(RequestError::NoVersionMatch {
                api_key: R::API_KEY,
            })?;
        let (_, buf) = self.encode(&msg, version)?;

        match self.no_ack_batch.clone() {
            None => self.write_frame(&buf, true).await,
            Some(batch) => {
                self.write_frame(&buf, false).await?;
                let total = self.unflushed.fetch_add(buf.len(), Ordering::SeqCst) + buf.len();
                if total >= batch.max_bytes {
                    self.flush_now().await?;
                } else if !self.flush_scheduled.swap(true, Ordering::SeqCst) {
                    let stream_write = Arc::clone(&self.stream_write);
                    let unflushed = Arc::clone(&self.unflushed);
                    let flush_scheduled = Arc::clone(&self.flush_scheduled);
                    tokio::spawn(async move {
                        tokio::time::sleep(batch.max_age).await;
                        flush_scheduled.store(false, Ordering::SeqCst);
                        unflushed.store(0, Ordering::SeqCst);
                        if let Err(e) = stream_write.lock().await.flush().await {
                            warn!(error = %e, "delayed flush of unacked writes failed");
                        }
                    });
                }
                Ok(())
            }
        }
    }

    fn encode<R>(&self, msg: &R, version: ApiVersion) -> Result<(i32, Vec<u8>), RequestError>
    where
        R: RequestBody + WriteVersionedType<Vec<u8>>,
    {
        let correlation_id = self.correlation_id.fetch_add(1, Ordering::SeqCst);
        let header = RequestHeader {
            api_key: R::API_KEY,
            api_version: version,
            correlation_id,
            client_id: self.client_id.clone(),
        };

        let mut buf = Vec::new();
        header.write(&mut buf)?;
        msg.write_versioned(&mut buf, version)?;
        Ok((correlation_id, buf))
    }

    async fn write_frame(&self, buf: &[u8], flush: bool) -> Result<(), RequestError> {
        {
            let mut stream_write = self.stream_write.lock().await;
            stream_write.write_message(buf).await?;
            if flush {
                stream_write.flush().await?;
            }
        }
        *self.last_activity.lock() = Instant::now();
        Ok(())
    }

    async fn flush_now(&self) -> Result<(), RequestError> {
        self.unflushed.store(0, Ordering::SeqCst);
        self.stream_write.lock().await.flush().await?;
        Ok(())
    }

    async fn unqueue(&self, correlation_id: i32) {
        if let Some(map) = self.pending.lock().await.as_mut() {
            map.remove(&correlation_id);
        }
    }

    /// Tear the connection down; outstanding waiters are dropped silently.
    pub(crate) async fn close(&self) {
        if self.closing.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(addr = %self.endpoint, socket_id = self.socket_id, "closing broker connection");
        {
            let mut stream_write = self.stream_write.lock().await;
            let _ = stream_write.shutdown().await;
        }
        self.pending.lock().await.take();
        self.join_handle.abort();
        if self.dead.borrow().is_none() {
            self.dead.send_replace(Some("connection closed".to_owned()));
        }
    }

    /// Resolves once the connection has died, with the reason.
    pub(crate) async fn closed(&self) -> String {
        let mut rx = self.dead.subscribe();
        loop {
            {
                let value = rx.borrow_and_update();
                if let Some(reason) = value.as_ref() {
                    return reason.clone();
                }
            }
            if rx.changed().await.is_err() {
                return "connection dropped".to_owned();
            }
        }
    }

    fn set_api_support(&self, ranges: HashMap<ApiKey, ApiVersionRange>) {
        *self.api_support.write() = Some(ranges);
    }

    fn usable_version(&self, api_key: ApiKey, client_range: ApiVersionRange) -> Option<ApiVersion> {
        self.api_support
            .read()
            .as_ref()?
            .get(&api_key)?
            .intersect_max(client_range)
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.dead.borrow().is_none() && !self.closing.load(Ordering::SeqCst)
    }

    /// Connected and version-negotiated.
    pub(crate) fn is_ready(&self) -> bool {
        self.is_connected()
            && self
                .api_support
                .read()
                .as_ref()
                .map(|m| !m.is_empty())
                .unwrap_or(false)
    }

    pub(crate) fn is_idle(&self, idle_timeout: Duration) -> bool {
        self.last_activity.lock().elapsed() >= idle_timeout
    }

    /// Claim the single long-poll slot; `None` if a long poll is in flight.
    pub(crate) fn begin_long_poll(self: &Arc<Self>) -> Option<LongPollGuard<RW>> {
        if self.waiting.swap(true, Ordering::SeqCst) {
            None
        } else {
            Some(LongPollGuard {
                conn: Arc::clone(self),
            })
        }
    }

    pub(crate) async fn pending_len(&self) -> usize {
        self.pending
            .lock()
            .await
            .as_ref()
            .map(|map| map.len())
            .unwrap_or(0)
    }

    pub(crate) fn endpoint(&self) -> &BrokerEndpoint {
        &self.endpoint
    }

    pub(crate) fn addr(&self) -> String {
        self.endpoint.addr()
    }

    pub(crate) fn socket_id(&self) -> u64 {
        self.socket_id
    }

    pub(crate) fn is_longpolling(&self) -> bool {
        self.longpolling
    }

    pub(crate) fn intentional_close(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }
}

impl<RW> Drop for BrokerConnection<RW> {
    fn drop(&mut self) {
        self.join_handle.abort();
    }
}

/// Releases the long-poll slot on drop.
pub(crate) struct LongPollGuard<RW> {
    conn: Arc<BrokerConnection<RW>>,
}

impl<RW> Drop for LongPollGuard<RW> {
    fn drop(&mut self) {
        self.conn.waiting.store(false, Ordering::SeqCst);
    }
}

/// Version table assumed for brokers that predate the `ApiVersions` API.
pub(crate) fn base_version_ranges() -> HashMap<ApiKey, ApiVersionRange> {
    [
        ApiKey::Produce,
        ApiKey::Fetch,
        ApiKey::Metadata,
        ApiKey::FindCoordinator,
        ApiKey::DescribeGroups,
        ApiKey::ListGroups,
        ApiKey::ApiVersions,
        ApiKey::CreateTopics,
    ]
    .into_iter()
    .map(|key| (key, ApiVersionRange::new(ApiVersion(0), ApiVersion(0))))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    use assert_matches::assert_matches;
    use tokio::io::DuplexStream;

    use crate::protocol::messages::{ApiVersionsResponse, ApiVersionsResponseApiKey};
    use crate::testutil::{read_request, write_response};

    fn test_connection(stream: DuplexStream) -> Arc<BrokerConnection<DuplexStream>> {
        Arc::new(BrokerConnection::new(
            stream,
            BrokerEndpoint::new("test-broker", 9092),
            false,
            Arc::new(AtomicI32::new(0)),
            Some("test-client".to_owned()),
            Duration::from_secs(5),
            1024 * 1024,
            None,
        ))
    }

    async fn negotiated_connection(
        stream: DuplexStream,
    ) -> Arc<BrokerConnection<DuplexStream>> {
        let conn = test_connection(stream);
        conn.sync_versions(true, Duration::from_millis(500))
            .await
            .unwrap();
        conn
    }

    #[tokio::test]
    async fn test_request_response() {
        let (client, mut server) = tokio::io::duplex(1024 * 1024);
        let conn = negotiated_connection(client).await;

        let server_task = tokio::spawn(async move {
            let (header, _) = read_request(&mut server).await;
            assert_eq!(header.api_key, ApiKey::ApiVersions);
            let response = ApiVersionsResponse {
                error_code: None,
                api_keys: vec![ApiVersionsResponseApiKey {
                    api_key: ApiKey::Metadata,
                    min_version: ApiVersion(0),
                    max_version: ApiVersion(1),
                }],
            };
            write_response(&mut server, header.correlation_id, &response, ApiVersion(0)).await;
            server
        });

        let response = conn.request(&ApiVersionsRequest, None).await.unwrap();
        assert_eq!(response.api_keys.len(), 1);
        assert_eq!(conn.pending_len().await, 0);
        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_timeout_removes_waiter_and_late_frame_is_dropped() {
        let (client, mut server) = tokio::io::duplex(1024 * 1024);
        let conn = negotiated_connection(client).await;

        let err = conn
            .request(&ApiVersionsRequest, Some(Duration::from_millis(50)))
            .await
            .unwrap_err();
        assert_matches!(err, RequestError::Timeout(_));
        assert_eq!(conn.pending_len().await, 0);

        // the late reply must be dropped silently, leaving the connection usable
        let (header, _) = read_request(&mut server).await;
        let response = ApiVersionsResponse {
            error_code: None,
            api_keys: vec![],
        };
        write_response(&mut server, header.correlation_id, &response, ApiVersion(0)).await;

        let server_task = tokio::spawn(async move {
            let (header, _) = read_request(&mut server).await;
            let response = ApiVersionsResponse {
                error_code: None,
                api_keys: vec![ApiVersionsResponseApiKey {
                    api_key: ApiKey::Produce,
                    min_version: ApiVersion(0),
                    max_version: ApiVersion(0),
                }],
            };
            write_response(&mut server, header.correlation_id, &response, ApiVersion(0)).await;
        });

        let response = conn.request(&ApiVersionsRequest, None).await.unwrap();
        assert_eq!(response.api_keys.len(), 1);
        assert!(conn.is_connected());
        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_disconnect_fails_all_pending() {
        let (client, mut server) = tokio::io::duplex(1024 * 1024);
        let conn = negotiated_connection(client).await;

        let reqs = (0..3).map(|_| conn.request(&ApiVersionsRequest, None));
        let pending = futures::future::join_all(reqs);
        let dropper = async {
            // let the requests register before the peer goes away
            for _ in 0..3 {
                read_request(&mut server).await;
            }
            drop(server);
            conn.closed().await
        };

        let (results, _reason) = tokio::join!(pending, dropper);
        for result in results {
            assert_matches!(result, Err(RequestError::ConnectionFailed { .. }));
        }
        assert!(!conn.is_connected());

        // registrations after failure are rejected
        let err = conn.request(&ApiVersionsRequest, None).await.unwrap_err();
        assert_matches!(err, RequestError::ConnectionClosed);
    }

    #[tokio::test]
    async fn test_correlation_ids_are_client_wide() {
        let (client_a, mut server_a) = tokio::io::duplex(1024 * 1024);
        let (client_b, mut server_b) = tokio::io::duplex(1024 * 1024);
        let correlation = Arc::new(AtomicI32::new(0));

        let make = |stream| {
            Arc::new(BrokerConnection::new(
                stream,
                BrokerEndpoint::new("test-broker", 9092),
                false,
                Arc::clone(&correlation),
                None,
                Duration::from_secs(5),
                1024 * 1024,
                None,
            ))
        };
        let conn_a = make(client_a);
        let conn_b = make(client_b);
        conn_a.sync_versions(true, Duration::from_secs(1)).await.unwrap();
        conn_b.sync_versions(true, Duration::from_secs(1)).await.unwrap();

        conn_a.send_unacked(&ApiVersionsRequest).await.unwrap();
        conn_b.send_unacked(&ApiVersionsRequest).await.unwrap();
        conn_a.send_unacked(&ApiVersionsRequest).await.unwrap();

        let (h1, _) = read_request(&mut server_a).await;
        let (h2, _) = read_request(&mut server_b).await;
        let (h3, _) = read_request(&mut server_a).await;
        assert_eq!(
            (h1.correlation_id, h2.correlation_id, h3.correlation_id),
            (0, 1, 2),
        );
        assert_ne!(conn_a.socket_id(), conn_b.socket_id());
    }

    #[tokio::test]
    async fn test_send_unacked_registers_no_waiter() {
        let (client, mut server) = tokio::io::duplex(1024 * 1024);
        let conn = negotiated_connection(client).await;

        conn.send_unacked(&ApiVersionsRequest).await.unwrap();
        assert_eq!(conn.pending_len().await, 0);
        let (header, _) = read_request(&mut server).await;
        assert_eq!(header.api_key, ApiKey::ApiVersions);
    }

    #[tokio::test]
    async fn test_single_long_poll_slot() {
        let (client, _server) = tokio::io::duplex(64);
        let conn = test_connection(client);

        let guard = conn.begin_long_poll().unwrap();
        assert!(conn.begin_long_poll().is_none());
        drop(guard);
        assert!(conn.begin_long_poll().is_some());
    }

    #[tokio::test]
    async fn test_close_drops_waiters_silently() {
        let (client, mut server) = tokio::io::duplex(1024 * 1024);
        let conn = negotiated_connection(client).await;

        let request = conn.request(&ApiVersionsRequest, None);
        let closer = async {
            read_request(&mut server).await;
            conn.close().await;
        };
        let (result, ()) = tokio::join!(request, closer);
        assert_matches!(result, Err(RequestError::ConnectionClosed));
        assert!(conn.intentional_close());
        assert!(!conn.is_connected());
    }

    #[tokio::test]
    async fn test_version_mismatch() {
        let (client, _server) = tokio::io::duplex(64);
        let conn = test_connection(client);
        // no negotiation ran: no table, nothing can be encoded
        let err = conn.request(&ApiVersionsRequest, None).await.unwrap_err();
        assert_matches!(err, RequestError::NoVersionMatch { .. });
    }
}
