//! Agentlink Connect: client-side connection management for cloud agents
//!
//! Every resource client in the SDK (virtual machines, networks, key vaults,
//! ...) talks to a remote agent over gRPC. This crate owns the connections
//! they share.
//!
//! # Architecture
//!
//! - **ConnectionCache**: endpoint-keyed cache with get-or-create and
//!   stale-connection eviction, one dial per endpoint even under contention
//! - **Authorizer**: source of TLS and per-call credentials
//! - **build_dial_options**: security mode and keepalive policy per dial
//! - **TonicDialer / Connection**: tonic channels with observable health
//!
//! # Example
//!
//! ```rust,no_run
//! use agentlink_connect::{ConnectionCache, DebugMode, TlsAuthorizer};
//!
//! async fn example() -> anyhow::Result<()> {
//!     let agents = ConnectionCache::agent(DebugMode::new(false));
//!     let authorizer = TlsAuthorizer::new(std::fs::read_to_string("/etc/agent/ca.pem")?);
//!
//!     let conn = agents.get_connection("10.0.0.5", &authorizer).await?;
//!     let _channel = conn.channel();
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod cache;
pub mod channel;
pub mod debug;
pub mod diagnostics;
pub mod dial;
pub mod endpoint;
pub mod error;
pub mod transport;

pub use auth::{
    Authorizer, BearerToken, CallCredentials, InsecureAuthorizer, TlsAuthorizer,
    TransportCredentials,
};
pub use cache::{CacheOptions, ConnectionCache, HealthPolicy};
pub use channel::{is_connection_failure, Connection, ConnectionInterceptor, TonicDialer};
pub use debug::{is_debug_enabled, DebugMode, DEBUG_MODE_ENV};
pub use diagnostics::{CorrelationId, CORRELATION_ID_HEADER};
pub use dial::{
    build_auth_dial_options, build_dial_options, DialConfig, KeepalivePolicy,
    TransportSecurity, KEEPALIVE_INTERVAL, KEEPALIVE_TIMEOUT,
};
pub use endpoint::{resolve_endpoint, EndpointFamily, AGENT_PORT, AUTH_PORT};
pub use error::ConnectError;
pub use transport::{ConnectivityState, Dialer, Transport};
