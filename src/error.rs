/*!
 * Error types for Agentlink
 */

use std::fmt;
use std::io;

use agentlink_connect::ConnectError;

pub type Result<T> = std::result::Result<T, AgentlinkError>;

/// Exit code constants for structured process exit
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_UNREACHABLE: i32 = 1;
pub const EXIT_FATAL: i32 = 2;

#[derive(Debug)]
pub enum AgentlinkError {
    /// Configuration error
    Config(String),

    /// I/O error
    Io(io::Error),

    /// Connection to an agent or the authentication service failed
    Connect(ConnectError),

    /// Generic error with message
    Other(String),
}

impl AgentlinkError {
    /// Get the process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            // Unreachable agents may come back; callers can retry
            AgentlinkError::Connect(err) if err.is_dial_failure() => EXIT_UNREACHABLE,
            AgentlinkError::Connect(ConnectError::Cancelled { .. }) => EXIT_UNREACHABLE,
            _ => EXIT_FATAL,
        }
    }

    /// Check if this error is transient (temporary, worth retrying)
    pub fn is_transient(&self) -> bool {
        match self {
            AgentlinkError::Connect(err) => err.is_dial_failure(),
            AgentlinkError::Io(io_err) => {
                use io::ErrorKind::*;
                matches!(
                    io_err.kind(),
                    ConnectionRefused | ConnectionReset | ConnectionAborted | TimedOut
                )
            }
            _ => false,
        }
    }
}

impl fmt::Display for AgentlinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentlinkError::Config(msg) => {
                write!(f, "Configuration error: {}", msg)
            }
            AgentlinkError::Io(err) => {
                write!(f, "I/O error: {}", err)
            }
            AgentlinkError::Connect(err) => {
                write!(f, "Connection error: {}", err)
            }
            AgentlinkError::Other(msg) => {
                write!(f, "{}", msg)
            }
        }
    }
}

impl std::error::Error for AgentlinkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AgentlinkError::Io(err) => Some(err),
            AgentlinkError::Connect(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for AgentlinkError {
    fn from(err: io::Error) -> Self {
        AgentlinkError::Io(err)
    }
}

impl From<ConnectError> for AgentlinkError {
    fn from(err: ConnectError) -> Self {
        AgentlinkError::Connect(err)
    }
}

impl From<toml::de::Error> for AgentlinkError {
    fn from(err: toml::de::Error) -> Self {
        AgentlinkError::Config(format!("TOML parse error: {}", err))
    }
}

impl From<toml::ser::Error> for AgentlinkError {
    fn from(err: toml::ser::Error) -> Self {
        AgentlinkError::Config(format!("TOML serialize error: {}", err))
    }
}
