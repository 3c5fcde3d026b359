//! Correlation ids carried from callers into request metadata

use tonic::metadata::{AsciiMetadataValue, MetadataMap};
use tonic::{Request, Status};

/// Metadata key holding the correlation id
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

/// Identifier tying an RPC to the operation that issued it
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationId(String);

impl CorrelationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Tag a request so the connection interceptor forwards the id
    pub fn attach<T>(&self, request: &mut Request<T>) {
        request.extensions_mut().insert(self.clone());
    }

    /// Correlation id previously attached to `request`, if any
    pub fn from_request<T>(request: &Request<T>) -> Option<&CorrelationId> {
        request.extensions().get::<CorrelationId>()
    }

    /// Read the id back out of received metadata
    pub fn from_metadata(metadata: &MetadataMap) -> Option<Self> {
        metadata
            .get(CORRELATION_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(Self::new)
    }

    pub(crate) fn apply(&self, metadata: &mut MetadataMap) -> Result<(), Status> {
        let value: AsciiMetadataValue = self
            .0
            .parse()
            .map_err(|_| Status::invalid_argument("correlation id is not valid metadata"))?;
        metadata.insert(CORRELATION_ID_HEADER, value);
        Ok(())
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
