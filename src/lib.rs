/*!
 * Agentlink - client SDK core for cloud agents
 *
 * Resource clients (virtual machines, networks, storage, security, ...)
 * share connections to their agents through a `CloudClient`:
 * - One cached connection per canonical `host:port` endpoint
 * - Stale connections evicted and redialed transparently
 * - TLS by default, plaintext only in explicit debug mode
 * - Per-call credentials on the authentication service connection
 * - Dial failures returned to the caller, never fatal to the process
 */

pub mod client;
pub mod config;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use client::CloudClient;
pub use config::{ClientConfig, LogLevel, TlsConfig};
pub use error::{AgentlinkError, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
