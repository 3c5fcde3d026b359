//! Dial options: transport security, keepalive and per-call credentials

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::auth::{Authorizer, CallCredentials, TransportCredentials};
use crate::error::ConnectError;

/// Interval between keepalive pings
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(60);

/// How long to wait for a keepalive ping acknowledgement
pub const KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(20);

/// HTTP/2 keepalive settings applied to every connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepalivePolicy {
    pub interval: Duration,
    pub timeout: Duration,
    /// Ping even when no RPC is in flight, so idle connections get pruned
    pub permit_without_stream: bool,
}

impl Default for KeepalivePolicy {
    fn default() -> Self {
        Self {
            interval: KEEPALIVE_INTERVAL,
            timeout: KEEPALIVE_TIMEOUT,
            permit_without_stream: true,
        }
    }
}

/// Transport security mode of a connection
#[derive(Debug, Clone)]
pub enum TransportSecurity {
    /// Plaintext, no certificate validation. Debug mode only.
    Insecure,
    /// TLS with credentials from the authorizer
    Tls(TransportCredentials),
}

impl TransportSecurity {
    pub fn is_insecure(&self) -> bool {
        matches!(self, TransportSecurity::Insecure)
    }

    /// URI scheme matching this security mode
    pub fn scheme(&self) -> &'static str {
        match self {
            TransportSecurity::Insecure => "http",
            TransportSecurity::Tls(_) => "https",
        }
    }
}

/// Everything the dialer needs to establish one connection
#[derive(Clone)]
pub struct DialConfig {
    pub security: TransportSecurity,
    pub keepalive: KeepalivePolicy,
    pub call_credentials: Option<Arc<dyn CallCredentials>>,
    pub connect_timeout: Option<Duration>,
    pub request_timeout: Option<Duration>,
}

impl DialConfig {
    fn new(security: TransportSecurity) -> Self {
        Self {
            security,
            keepalive: KeepalivePolicy::default(),
            call_credentials: None,
            connect_timeout: None,
            request_timeout: None,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }
}

impl fmt::Debug for DialConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DialConfig")
            .field("insecure", &self.security.is_insecure())
            .field("keepalive", &self.keepalive)
            .field("call_credentials", &self.call_credentials.is_some())
            .field("connect_timeout", &self.connect_timeout)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// Build the dial configuration for a resource agent connection.
///
/// Debug mode selects the insecure transport without consulting the
/// authorizer. Otherwise the authorizer must supply transport credentials and
/// its failure is returned unchanged.
pub fn build_dial_options(
    authorizer: &dyn Authorizer,
    debug_enabled: bool,
) -> Result<DialConfig, ConnectError> {
    if debug_enabled {
        warn!("Debug mode enabled: dialing without transport security");
        return Ok(DialConfig::new(TransportSecurity::Insecure));
    }

    let credentials = authorizer.transport_credentials()?;
    Ok(DialConfig::new(TransportSecurity::Tls(credentials)))
}

/// Build the dial configuration for the authentication service.
///
/// Always authenticated, always carrying per-call credentials; debug mode has
/// no effect here.
pub fn build_auth_dial_options(authorizer: &dyn Authorizer) -> Result<DialConfig, ConnectError> {
    let credentials = authorizer.transport_credentials()?;
    let call_credentials = authorizer.call_credentials()?;

    let mut config = DialConfig::new(TransportSecurity::Tls(credentials));
    config.call_credentials = Some(call_credentials);
    Ok(config)
}
