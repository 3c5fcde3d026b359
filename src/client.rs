/*!
 * CloudClient: the connection caches shared by all resource clients
 */

use std::sync::Arc;

use agentlink_connect::{
    Authorizer, ConnectionCache, DebugMode, Dialer, EndpointFamily, HealthPolicy, TonicDialer,
};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::ClientConfig;
use crate::error::Result;

/// Owns the agent and authentication-service connection caches.
///
/// Resource clients borrow a `CloudClient` and ask it for connections; they
/// never dial or close anything themselves.
pub struct CloudClient<D: Dialer + Clone = TonicDialer> {
    agents: ConnectionCache<D>,
    auth: ConnectionCache<D>,
    authorizer: Arc<dyn Authorizer>,
}

impl CloudClient<TonicDialer> {
    /// Build a client from configuration, loading TLS material from disk
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let authorizer = config.authorizer()?;
        Ok(Self::with_dialer(config, authorizer, TonicDialer::new()))
    }
}

impl<D: Dialer + Clone> CloudClient<D> {
    pub fn with_dialer(config: &ClientConfig, authorizer: Arc<dyn Authorizer>, dialer: D) -> Self {
        let auth_health = if config.auth_staleness_check {
            HealthPolicy::TransportState
        } else {
            HealthPolicy::AlwaysHealthy
        };

        let agents = ConnectionCache::new(EndpointFamily::Agent, dialer.clone(), config.debug())
            .with_options(config.cache_options());
        let auth = ConnectionCache::new(EndpointFamily::Authentication, dialer, DebugMode::default())
            .with_health_policy(auth_health)
            .with_options(config.cache_options());

        info!(
            "Cloud client ready (debug mode: {}, auth staleness check: {})",
            config.debug_mode, config.auth_staleness_check
        );

        Self {
            agents,
            auth,
            authorizer,
        }
    }

    /// Connection to the resource agent at `address` (default port 55000)
    pub async fn agent_connection(&self, address: &str) -> Result<Arc<D::Connection>> {
        Ok(self
            .agents
            .get_connection(address, self.authorizer.as_ref())
            .await?)
    }

    /// Like [`agent_connection`](Self::agent_connection), abandoning the dial
    /// when `cancel` fires
    pub async fn agent_connection_cancellable(
        &self,
        address: &str,
        cancel: &CancellationToken,
    ) -> Result<Arc<D::Connection>> {
        Ok(self
            .agents
            .get_connection_cancellable(address, self.authorizer.as_ref(), cancel)
            .await?)
    }

    /// Connection to the authentication service at `address` (default port 65000)
    pub async fn auth_connection(&self, address: &str) -> Result<Arc<D::Connection>> {
        Ok(self
            .auth
            .get_connection(address, self.authorizer.as_ref())
            .await?)
    }

    /// Like [`auth_connection`](Self::auth_connection), abandoning the dial
    /// when `cancel` fires
    pub async fn auth_connection_cancellable(
        &self,
        address: &str,
        cancel: &CancellationToken,
    ) -> Result<Arc<D::Connection>> {
        Ok(self
            .auth
            .get_connection_cancellable(address, self.authorizer.as_ref(), cancel)
            .await?)
    }

    pub fn agents(&self) -> &ConnectionCache<D> {
        &self.agents
    }

    pub fn auth(&self) -> &ConnectionCache<D> {
        &self.auth
    }

    /// Forget every cached connection (test isolation)
    pub fn clear(&self) {
        self.agents.clear();
        self.auth.clear();
    }
}
