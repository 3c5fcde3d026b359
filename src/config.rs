/*!
 * Configuration types for Agentlink
 */

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use agentlink_connect::{Authorizer, CacheOptions, DebugMode, InsecureAuthorizer, TlsAuthorizer};

use crate::error::{AgentlinkError, Result};

const REDACTED: &str = "<redacted>";

/// TLS material used to authenticate against agents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TlsConfig {
    /// CA certificate (PEM) used to verify agents
    pub ca_cert: PathBuf,

    /// Client certificate (PEM) for mutual TLS
    #[serde(default)]
    pub client_cert: Option<PathBuf>,

    /// Client private key (PEM) for mutual TLS
    #[serde(default)]
    pub client_key: Option<PathBuf>,

    /// Server name to verify instead of the dialed host
    #[serde(default)]
    pub domain: Option<String>,
}

/// Client configuration shared by every resource client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Allow plaintext connections to agents (local testing only)
    #[serde(default)]
    pub debug_mode: bool,

    /// Evict stale authentication service connections like agent ones
    #[serde(default)]
    pub auth_staleness_check: bool,

    /// Timeout for establishing a connection (None = no timeout)
    #[serde(default)]
    pub connect_timeout_secs: Option<u64>,

    /// Timeout applied to every request on a connection
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// TLS material (required unless debug mode is on)
    #[serde(default)]
    pub tls: Option<TlsConfig>,

    /// Bearer token for the authentication service
    #[serde(default)]
    pub token: Option<String>,

    /// Log level for diagnostic output
    #[serde(default)]
    pub log_level: LogLevel,

    /// Log file path (None = stderr)
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Enable verbose logging (shorthand for log_level = debug)
    #[serde(default)]
    pub verbose: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            debug_mode: false,
            auth_staleness_check: false,
            connect_timeout_secs: None,
            request_timeout_secs: default_request_timeout(),
            tls: None,
            token: None,
            log_level: LogLevel::default(),
            log_file: None,
            verbose: false,
        }
    }
}

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Only errors
    Error,

    /// Warnings and errors
    Warn,

    /// Info, warnings, and errors
    #[default]
    Info,

    /// Debug and above
    Debug,

    /// All messages including traces
    Trace,
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

// Default value functions for serde
fn default_request_timeout() -> u64 {
    10 * 60 // 10 minutes
}

impl ClientConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AgentlinkError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: ClientConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Configuration for talking to a local, unauthenticated agent
    pub fn debug_preset() -> Self {
        Self {
            debug_mode: true,
            connect_timeout_secs: Some(5),
            log_level: LogLevel::Debug,
            ..Default::default()
        }
    }

    /// Debug-mode switch for the agent connection cache
    pub fn debug(&self) -> DebugMode {
        DebugMode::new(self.debug_mode)
    }

    /// Timeouts applied to every dialed connection
    pub fn cache_options(&self) -> CacheOptions {
        CacheOptions {
            connect_timeout: self.connect_timeout_secs.map(Duration::from_secs),
            request_timeout: Some(Duration::from_secs(self.request_timeout_secs)),
        }
    }

    /// Copy safe to print: the bearer token is masked
    pub fn redacted(&self) -> Self {
        Self {
            token: self.token.as_ref().map(|_| REDACTED.to_string()),
            ..self.clone()
        }
    }

    /// Build the authorizer described by this configuration.
    ///
    /// Without a `[tls]` section the insecure authorizer is returned, which
    /// only works in debug mode.
    pub fn authorizer(&self) -> Result<Arc<dyn Authorizer>> {
        let Some(tls) = &self.tls else {
            return Ok(Arc::new(InsecureAuthorizer));
        };

        let mut authorizer = TlsAuthorizer::new(read_pem(&tls.ca_cert)?);
        match (&tls.client_cert, &tls.client_key) {
            (Some(cert), Some(key)) => {
                authorizer = authorizer.with_identity(read_pem(cert)?, read_pem(key)?);
            }
            (None, None) => {}
            _ => {
                return Err(AgentlinkError::Config(
                    "client_cert and client_key must be set together".to_string(),
                ))
            }
        }
        if let Some(domain) = &tls.domain {
            authorizer = authorizer.with_domain(domain.clone());
        }
        if let Some(token) = &self.token {
            authorizer = authorizer.with_token(token.clone());
        }

        Ok(Arc::new(authorizer))
    }
}

fn read_pem(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .map_err(|e| AgentlinkError::Config(format!("Failed to read {}: {}", path.display(), e)))
}
