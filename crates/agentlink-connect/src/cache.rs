//! ConnectionCache: endpoint-keyed cache of live connections
//!
//! Each canonical endpoint owns a slot: an async mutex around at most one
//! connection. The map from endpoint to slot sits behind a short synchronous
//! lock that is never held across an await, so dialing one endpoint never
//! blocks lookups for another while callers racing for the same endpoint
//! serialize on its slot and share a single dial.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::auth::Authorizer;
use crate::channel::TonicDialer;
use crate::debug::DebugMode;
use crate::dial::{build_auth_dial_options, build_dial_options, DialConfig};
use crate::endpoint::EndpointFamily;
use crate::error::ConnectError;
use crate::transport::{ConnectivityState, Dialer, Transport};

/// When a cached connection may be handed out again
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthPolicy {
    /// Replace connections reporting `TransientFailure` or `Shutdown`
    TransportState,
    /// Reuse whatever is cached until the cache is cleared
    AlwaysHealthy,
}

impl HealthPolicy {
    pub fn is_reusable(&self, state: ConnectivityState) -> bool {
        match self {
            HealthPolicy::TransportState => !state.is_stale(),
            HealthPolicy::AlwaysHealthy => true,
        }
    }
}

/// Options applied to every connection a cache dials
#[derive(Debug, Clone, Default)]
pub struct CacheOptions {
    pub connect_timeout: Option<std::time::Duration>,
    pub request_timeout: Option<std::time::Duration>,
}

type Slot<C> = Arc<tokio::sync::Mutex<Option<Arc<C>>>>;
type SlotMap<C> = Mutex<HashMap<String, Slot<C>>>;

/// Removes an endpoint's slot from the map once a lookup leaves it empty.
///
/// Runs on every exit from `get_connection`, including a dropped future.
/// The slot stays when another caller still holds it, so queued waiters
/// and later callers keep sharing one slot.
struct SlotReaper<'a, C> {
    slots: &'a SlotMap<C>,
    endpoint: &'a str,
    slot: &'a Slot<C>,
}

impl<C> Drop for SlotReaper<'_, C> {
    fn drop(&mut self) {
        let mut slots = self.slots.lock();
        // One reference in the map, one held by this lookup
        if Arc::strong_count(self.slot) > 2 {
            return;
        }
        let empty = match self.slot.try_lock() {
            Ok(entry) => entry.is_none(),
            Err(_) => false,
        };
        if empty
            && slots
                .get(self.endpoint)
                .is_some_and(|current| Arc::ptr_eq(current, self.slot))
        {
            slots.remove(self.endpoint);
        }
    }
}

/// Cache of connections for one endpoint family
///
/// # Example
///
/// ```rust,no_run
/// use agentlink_connect::{ConnectionCache, DebugMode, TlsAuthorizer};
///
/// # async fn example() -> Result<(), agentlink_connect::ConnectError> {
/// let cache = ConnectionCache::agent(DebugMode::default());
/// let authorizer = TlsAuthorizer::new(std::fs::read_to_string("ca.pem").unwrap());
///
/// // "10.0.0.5" and "10.0.0.5:55000" share one connection
/// let first = cache.get_connection("10.0.0.5", &authorizer).await?;
/// let second = cache.get_connection("10.0.0.5:55000", &authorizer).await?;
/// assert!(std::sync::Arc::ptr_eq(&first, &second));
/// # Ok(())
/// # }
/// ```
pub struct ConnectionCache<D: Dialer = TonicDialer> {
    family: EndpointFamily,
    dialer: D,
    health: HealthPolicy,
    debug: DebugMode,
    options: CacheOptions,
    slots: SlotMap<D::Connection>,
}

impl ConnectionCache<TonicDialer> {
    /// Cache for resource agent endpoints
    pub fn agent(debug: DebugMode) -> Self {
        Self::new(EndpointFamily::Agent, TonicDialer::new(), debug)
    }

    /// Cache for the authentication service endpoint
    pub fn authentication() -> Self {
        Self::new(
            EndpointFamily::Authentication,
            TonicDialer::new(),
            DebugMode::default(),
        )
    }
}

impl<D: Dialer> ConnectionCache<D> {
    /// Create a cache for `family` dialing through `dialer`.
    ///
    /// Agent caches check transport health before reuse. Authentication
    /// caches reuse their entry unconditionally unless
    /// [`with_health_policy`](Self::with_health_policy) says otherwise.
    pub fn new(family: EndpointFamily, dialer: D, debug: DebugMode) -> Self {
        let health = match family {
            EndpointFamily::Agent => HealthPolicy::TransportState,
            EndpointFamily::Authentication => HealthPolicy::AlwaysHealthy,
        };

        Self {
            family,
            dialer,
            health,
            debug,
            options: CacheOptions::default(),
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_health_policy(mut self, health: HealthPolicy) -> Self {
        self.health = health;
        self
    }

    pub fn with_options(mut self, options: CacheOptions) -> Self {
        self.options = options;
        self
    }

    pub fn dialer(&self) -> &D {
        &self.dialer
    }

    pub fn family(&self) -> EndpointFamily {
        self.family
    }

    pub fn health_policy(&self) -> HealthPolicy {
        self.health
    }

    /// Get the cached connection for `address`, dialing a new one when the
    /// endpoint has none or its connection went stale.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The authorizer cannot supply credentials
    /// - The endpoint cannot be dialed
    pub async fn get_connection(
        &self,
        address: &str,
        authorizer: &dyn Authorizer,
    ) -> Result<Arc<D::Connection>, ConnectError> {
        let endpoint = self.family.resolve(address);
        let slot = self.slot(&endpoint);
        let _reaper = SlotReaper {
            slots: &self.slots,
            endpoint: &endpoint,
            slot: &slot,
        };
        let mut entry = slot.lock().await;

        if let Some(existing) = entry.as_ref() {
            let state = existing.state();
            if self.health.is_reusable(state) {
                debug!("Reusing connection to {} ({})", endpoint, state);
                return Ok(existing.clone());
            }

            warn!("Evicting stale connection to {} ({})", endpoint, state);
            existing.close();
            *entry = None;
        }

        let config = self.dial_config(authorizer)?;
        let connection = Arc::new(self.dialer.dial(&endpoint, &config).await?);
        info!("Established new connection to {}", endpoint);

        *entry = Some(connection.clone());
        Ok(connection)
    }

    /// Like [`get_connection`](Self::get_connection), giving up with
    /// [`ConnectError::Cancelled`] once `cancel` fires.
    ///
    /// A cancelled dial leaves nothing cached.
    pub async fn get_connection_cancellable(
        &self,
        address: &str,
        authorizer: &dyn Authorizer,
        cancel: &CancellationToken,
    ) -> Result<Arc<D::Connection>, ConnectError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ConnectError::Cancelled {
                endpoint: self.family.resolve(address),
            }),
            result = self.get_connection(address, authorizer) => result,
        }
    }

    /// Drop every entry without closing it.
    ///
    /// Handles already given out stay usable until their holders drop them;
    /// the next lookup for any endpoint dials afresh.
    pub fn clear(&self) {
        let mut slots = self.slots.lock();
        debug!("Clearing {} cached {:?} endpoints", slots.len(), self.family);
        slots.clear();
    }

    /// Number of endpoints that currently hold a connection
    pub fn len(&self) -> usize {
        let slots: Vec<_> = self.slots.lock().values().cloned().collect();
        slots
            .iter()
            .filter(|slot| match slot.try_lock() {
                Ok(entry) => entry.is_some(),
                // A dial or health check is in progress
                Err(_) => true,
            })
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `address` resolves to an endpoint with a cached connection
    pub fn contains(&self, address: &str) -> bool {
        let endpoint = self.family.resolve(address);
        let slot = self.slots.lock().get(&endpoint).cloned();
        match slot {
            Some(slot) => slot.try_lock().map(|entry| entry.is_some()).unwrap_or(true),
            None => false,
        }
    }

    fn slot(&self, endpoint: &str) -> Slot<D::Connection> {
        let mut slots = self.slots.lock();
        slots
            .entry(endpoint.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(None)))
            .clone()
    }

    fn dial_config(&self, authorizer: &dyn Authorizer) -> Result<DialConfig, ConnectError> {
        let mut config = match self.family {
            EndpointFamily::Agent => build_dial_options(authorizer, self.debug.is_enabled())?,
            EndpointFamily::Authentication => build_auth_dial_options(authorizer)?,
        };
        if let Some(timeout) = self.options.connect_timeout {
            config = config.with_connect_timeout(timeout);
        }
        if let Some(timeout) = self.options.request_timeout {
            config = config.with_request_timeout(timeout);
        }
        Ok(config)
    }
}
