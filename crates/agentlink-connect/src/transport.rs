//! Transport abstraction used by the connection cache
//!
//! The cache only needs two things from a connection (its health and a way to
//! close it) and one thing from a dialer (a way to make a connection). The
//! tonic implementation lives in [`crate::channel`]; tests plug in their own.

use async_trait::async_trait;

use crate::dial::DialConfig;
use crate::error::ConnectError;

/// Health of a transport connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ConnectivityState {
    /// Created, no connection attempt yet
    Idle = 0,
    /// Connection attempt in progress
    Connecting = 1,
    /// Connected
    Ready = 2,
    /// Last connection attempt or RPC failed at the transport level
    TransientFailure = 3,
    /// Closed, never usable again
    Shutdown = 4,
}

impl ConnectivityState {
    /// Whether a cached connection in this state must be replaced
    pub fn is_stale(&self) -> bool {
        matches!(
            self,
            ConnectivityState::TransientFailure | ConnectivityState::Shutdown
        )
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => ConnectivityState::Idle,
            1 => ConnectivityState::Connecting,
            2 => ConnectivityState::Ready,
            3 => ConnectivityState::TransientFailure,
            _ => ConnectivityState::Shutdown,
        }
    }
}

impl std::fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectivityState::Idle => "idle",
            ConnectivityState::Connecting => "connecting",
            ConnectivityState::Ready => "ready",
            ConnectivityState::TransientFailure => "transient-failure",
            ConnectivityState::Shutdown => "shutdown",
        };
        f.write_str(name)
    }
}

/// A live connection owned by a cache
pub trait Transport: Send + Sync + 'static {
    /// Current health as reported by the transport
    fn state(&self) -> ConnectivityState;

    /// Close the connection. Called by the cache once, on eviction.
    fn close(&self);
}

/// Establishes new connections
#[async_trait]
pub trait Dialer: Send + Sync + 'static {
    type Connection: Transport;

    /// Connect to a canonical `host:port` endpoint
    async fn dial(
        &self,
        endpoint: &str,
        config: &DialConfig,
    ) -> Result<Self::Connection, ConnectError>;
}
