//! Error types for the agentlink-connect crate

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("Failed to dial {endpoint}: {source}")]
    Dial {
        endpoint: String,
        #[source]
        source: tonic::transport::Error,
    },

    #[error("Failed to dial {endpoint}: {reason}")]
    DialFailed { endpoint: String, reason: String },

    #[error("Invalid endpoint {endpoint}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("TLS configuration error: {0}")]
    Tls(#[source] tonic::transport::Error),

    #[error("Authorization failed: {0}")]
    Authorization(String),

    #[error("Dial to {endpoint} was cancelled")]
    Cancelled { endpoint: String },
}

impl ConnectError {
    /// True for errors produced while establishing the transport
    pub fn is_dial_failure(&self) -> bool {
        matches!(
            self,
            ConnectError::Dial { .. }
                | ConnectError::DialFailed { .. }
                | ConnectError::InvalidEndpoint { .. }
        )
    }
}
