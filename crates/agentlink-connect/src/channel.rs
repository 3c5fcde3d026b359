//! tonic-backed connections
//!
//! tonic's `Channel` does not expose a connectivity state, so the dialer
//! installs its own TCP connector that records every connection attempt.
//! RPC failures reported through [`Connection::observe`] feed the same state,
//! which lets the cache notice a dead agent even while the channel still
//! believes its last connection is fine.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;
use tonic::service::Interceptor;
use tonic::transport::{Channel, Endpoint, Uri};
use tonic::{Code, Request, Status};
use tower::Service;
use tracing::{debug, warn};

use crate::auth::CallCredentials;
use crate::diagnostics::CorrelationId;
use crate::dial::{DialConfig, TransportSecurity};
use crate::error::ConnectError;
use crate::transport::{ConnectivityState, Dialer, Transport};

/// Whether an RPC status means the transport underneath is unusable
pub fn is_connection_failure(status: &Status) -> bool {
    matches!(status.code(), Code::Unavailable | Code::DeadlineExceeded)
}

/// Shared, lock-free connectivity state. `Shutdown` is terminal.
#[derive(Debug)]
struct StateCell(AtomicU8);

impl StateCell {
    fn new(initial: ConnectivityState) -> Self {
        Self(AtomicU8::new(initial as u8))
    }

    fn get(&self) -> ConnectivityState {
        ConnectivityState::from_u8(self.0.load(Ordering::Acquire))
    }

    fn set(&self, state: ConnectivityState) {
        let shutdown = ConnectivityState::Shutdown as u8;
        let _ = self
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current != shutdown).then_some(state as u8)
            });
    }

    /// Returns true only for the call that performed the transition
    fn shutdown(&self) -> bool {
        self.0
            .swap(ConnectivityState::Shutdown as u8, Ordering::AcqRel)
            != ConnectivityState::Shutdown as u8
    }
}

/// TCP connector that reports attempts into a [`StateCell`]
#[derive(Clone)]
struct TrackingConnector {
    state: Arc<StateCell>,
}

impl Service<Uri> for TrackingConnector {
    type Response = TokioIo<TcpStream>;
    type Error = io::Error;
    type Future = Pin<Box<dyn Future<Output = io::Result<Self::Response>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, uri: Uri) -> Self::Future {
        let state = self.state.clone();
        Box::pin(async move {
            state.set(ConnectivityState::Connecting);
            match connect_tcp(&uri).await {
                Ok(stream) => {
                    state.set(ConnectivityState::Ready);
                    Ok(TokioIo::new(stream))
                }
                Err(e) => {
                    debug!("TCP connect to {} failed: {}", uri, e);
                    state.set(ConnectivityState::TransientFailure);
                    Err(e)
                }
            }
        })
    }
}

async fn connect_tcp(uri: &Uri) -> io::Result<TcpStream> {
    let host = uri
        .host()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "endpoint has no host"))?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    let port = uri
        .port_u16()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "endpoint has no port"))?;

    let stream = TcpStream::connect((host, port)).await?;
    stream.set_nodelay(true)?;
    Ok(stream)
}

/// A cached gRPC connection to an agent or the authentication service.
///
/// Resource clients build their stubs from [`channel`](Self::channel) and
/// [`interceptor`](Self::interceptor):
///
/// ```rust,ignore
/// let conn = cache.get_connection("10.0.0.5", &authorizer).await?;
/// let client = VirtualMachineAgentClient::with_interceptor(conn.channel(), conn.interceptor());
/// ```
pub struct Connection {
    endpoint: String,
    channel: Channel,
    state: Arc<StateCell>,
    call_credentials: Option<Arc<dyn CallCredentials>>,
}

impl Connection {
    /// Canonical `host:port` this connection was dialed to
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// The underlying channel (cheap to clone)
    pub fn channel(&self) -> Channel {
        self.channel.clone()
    }

    /// Interceptor attaching per-call credentials and correlation ids
    pub fn interceptor(&self) -> ConnectionInterceptor {
        ConnectionInterceptor {
            call_credentials: self.call_credentials.clone(),
        }
    }

    pub fn has_call_credentials(&self) -> bool {
        self.call_credentials.is_some()
    }

    /// Feed an RPC result back into the connection state.
    ///
    /// Connection failures mark the connection `TransientFailure` so the next
    /// cache lookup replaces it. Returns whether the status was one.
    pub fn observe(&self, status: &Status) -> bool {
        if !is_connection_failure(status) {
            return false;
        }
        warn!(
            "Communication with {} failed ({}), marking connection stale",
            self.endpoint,
            status.code()
        );
        self.state.set(ConnectivityState::TransientFailure);
        true
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("endpoint", &self.endpoint)
            .field("state", &self.state.get())
            .field("call_credentials", &self.call_credentials.is_some())
            .finish()
    }
}

impl Transport for Connection {
    fn state(&self) -> ConnectivityState {
        self.state.get()
    }

    /// Marks the connection shut down. The channel itself is released when
    /// the last handle to it is dropped.
    fn close(&self) {
        if self.state.shutdown() {
            debug!("Closed connection to {}", self.endpoint);
        }
    }
}

/// Request interceptor installed on resource client stubs
#[derive(Debug, Clone, Default)]
pub struct ConnectionInterceptor {
    call_credentials: Option<Arc<dyn CallCredentials>>,
}

impl Interceptor for ConnectionInterceptor {
    fn call(&mut self, mut request: Request<()>) -> Result<Request<()>, Status> {
        if let Some(id) = CorrelationId::from_request(&request).cloned() {
            id.apply(request.metadata_mut())?;
        }
        if let Some(credentials) = &self.call_credentials {
            credentials.apply(request.metadata_mut())?;
        }
        Ok(request)
    }
}

/// Dialer producing tonic channels
#[derive(Debug, Clone, Copy, Default)]
pub struct TonicDialer {
    lazy: bool,
}

impl TonicDialer {
    /// Dialer that waits for the first connection before returning
    pub fn new() -> Self {
        Self { lazy: false }
    }

    /// Dialer that returns immediately and connects on first use
    pub fn lazy() -> Self {
        Self { lazy: true }
    }

    fn endpoint(endpoint: &str, config: &DialConfig) -> Result<Endpoint, ConnectError> {
        let uri = format!("{}://{}", config.security.scheme(), endpoint);
        let mut builder =
            Endpoint::from_shared(uri).map_err(|e| ConnectError::InvalidEndpoint {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            })?;

        builder = builder
            .http2_keep_alive_interval(config.keepalive.interval)
            .keep_alive_timeout(config.keepalive.timeout)
            .keep_alive_while_idle(config.keepalive.permit_without_stream);

        if let Some(timeout) = config.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        if let TransportSecurity::Tls(credentials) = &config.security {
            builder = builder
                .tls_config(credentials.tls_config().clone())
                .map_err(ConnectError::Tls)?;
        }

        Ok(builder)
    }
}

#[async_trait]
impl Dialer for TonicDialer {
    type Connection = Connection;

    async fn dial(&self, endpoint: &str, config: &DialConfig) -> Result<Connection, ConnectError> {
        let builder = Self::endpoint(endpoint, config)?;
        let state = Arc::new(StateCell::new(ConnectivityState::Idle));
        let connector = TrackingConnector {
            state: state.clone(),
        };

        debug!("Dialing {} ({:?})", endpoint, config);
        let channel = if self.lazy {
            builder.connect_with_connector_lazy(connector)
        } else {
            builder
                .connect_with_connector(connector)
                .await
                .map_err(|source| ConnectError::Dial {
                    endpoint: endpoint.to_string(),
                    source,
                })?
        };

        Ok(Connection {
            endpoint: endpoint.to_string(),
            channel,
            state,
            call_credentials: config.call_credentials.clone(),
        })
    }
}
