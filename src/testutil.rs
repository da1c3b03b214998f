//! In-process fakes for exercising the client against scripted brokers.

use std::io::Cursor;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::metadata::BrokerEndpoint;
use crate::protocol::api_key::ApiKey;
use crate::protocol::api_version::ApiVersion;
use crate::protocol::frame::{AsyncMessageRead, AsyncMessageWrite};
use crate::protocol::messages::{
    ApiVersionsResponse, ApiVersionsResponseApiKey, RequestHeader, ResponseHeader,
    WriteVersionedType,
};

const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Reads one request frame, returning its header and remaining body bytes.
pub(crate) async fn read_request<S>(stream: &mut S) -> (RequestHeader, Vec<u8>)
where
    S: AsyncRead + Send + Unpin,
{
    let msg = stream
        .read_message(MAX_FRAME_SIZE)
        .await
        .expect("read request frame");
    let mut cursor = Cursor::new(msg);
    let header = RequestHeader::read(&mut cursor).expect("parse request header");
    let pos = cursor.position() as usize;
    let body = cursor.into_inner()[pos..].to_vec();
    (header, body)
}

/// Writes one response frame for the given correlation id.
pub(crate) async fn write_response<S, T>(
    stream: &mut S,
    correlation_id: i32,
    body: &T,
    version: ApiVersion,
) where
    S: AsyncWrite + Send + Unpin,
    T: WriteVersionedType<Vec<u8>>,
{
    let mut buf = Vec::new();
    ResponseHeader { correlation_id }
        .write(&mut buf)
        .expect("write response header");
    body.write_versioned(&mut buf, version)
        .expect("write response body");
    stream
        .write_message(&buf)
        .await
        .expect("write response frame");
}

pub(crate) fn encode_body<T>(body: &T, version: ApiVersion) -> Vec<u8>
where
    T: WriteVersionedType<Vec<u8>>,
{
    let mut buf = Vec::new();
    body.write_versioned(&mut buf, version).expect("encode body");
    buf
}

/// `ApiVersions` response advertising the full version range this crate can
/// encode, which is what a current broker would answer.
pub(crate) fn default_api_versions_body() -> Vec<u8> {
    let response = ApiVersionsResponse {
        error_code: None,
        api_keys: [
            (ApiKey::Produce, 0),
            (ApiKey::Fetch, 0),
            (ApiKey::Metadata, 1),
            (ApiKey::FindCoordinator, 0),
            (ApiKey::DescribeGroups, 0),
            (ApiKey::ListGroups, 0),
            (ApiKey::ApiVersions, 0),
            (ApiKey::CreateTopics, 1),
        ]
        .into_iter()
        .map(|(api_key, max)| ApiVersionsResponseApiKey {
            api_key,
            min_version: ApiVersion(0),
            max_version: ApiVersion(max),
        })
        .collect(),
    };
    encode_body(&response, ApiVersion(0))
}

/// Handles one decoded request; `None` means "never reply".
pub(crate) type Handler =
    dyn Fn(&RequestHeader, Vec<u8>) -> Option<Vec<u8>> + Send + Sync + 'static;

/// A scripted broker listening on a real socket.
///
/// `ApiVersions` is answered with [`default_api_versions_body`] unless the
/// handler chooses to answer it itself (by returning `Some` for it).
pub(crate) struct MockBroker {
    endpoint: BrokerEndpoint,
    accept_handle: JoinHandle<()>,
    conn_handles: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl MockBroker {
    pub(crate) async fn spawn(handler: Arc<Handler>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock broker");
        let port = listener.local_addr().expect("local addr").port();
        let conn_handles: Arc<Mutex<Vec<JoinHandle<()>>>> = Arc::new(Mutex::new(Vec::new()));

        let accept_handle = tokio::spawn({
            let conn_handles = Arc::clone(&conn_handles);
            async move {
                loop {
                    let Ok((mut socket, _)) = listener.accept().await else {
                        break;
                    };
                    let handler = Arc::clone(&handler);
                    let handle = tokio::spawn(async move {
                        loop {
                            let Ok(msg) = socket.read_message(MAX_FRAME_SIZE).await else {
                                break;
                            };
                            let mut cursor = Cursor::new(msg);
                            let Ok(header) = RequestHeader::read(&mut cursor) else {
                                break;
                            };
                            let pos = cursor.position() as usize;
                            let body = cursor.into_inner()[pos..].to_vec();

                            let reply = handler(&header, body).or_else(|| {
                                (header.api_key == ApiKey::ApiVersions)
                                    .then(default_api_versions_body)
                            });
                            let Some(reply) = reply else {
                                continue;
                            };

                            let mut buf = Vec::new();
                            ResponseHeader {
                                correlation_id: header.correlation_id,
                            }
                            .write(&mut buf)
                            .expect("write response header");
                            buf.extend_from_slice(&reply);
                            if socket.write_message(&buf).await.is_err() {
                                break;
                            }
                        }
                    });
                    conn_handles.lock().push(handle);
                }
            }
        });

        Self {
            endpoint: BrokerEndpoint::new("127.0.0.1", port),
            accept_handle,
            conn_handles,
        }
    }

    /// A broker that only answers `ApiVersions`, enough to get pooled.
    pub(crate) async fn spawn_default() -> Self {
        Self::spawn(Arc::new(|_, _| None)).await
    }

    pub(crate) fn endpoint(&self) -> BrokerEndpoint {
        self.endpoint.clone()
    }

    pub(crate) fn kafka_host(&self) -> String {
        self.endpoint.addr()
    }

    /// Kills the listener and every open connection.
    pub(crate) fn shutdown(&self) {
        self.accept_handle.abort();
        for handle in self.conn_handles.lock().drain(..) {
            handle.abort();
        }
    }

    /// An endpoint nothing listens on.
    pub(crate) async fn unused_endpoint() -> BrokerEndpoint {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("local addr").port();
        drop(listener);
        BrokerEndpoint::new("127.0.0.1", port)
    }
}

impl Drop for MockBroker {
    fn drop(&mut self) {
        self.shutdown();
    }
}
