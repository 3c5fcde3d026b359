//! Authorizer capability: transport and per-call credentials
//!
//! The connection cache never looks inside credentials. It asks an
//! [`Authorizer`] for a TLS configuration when dialing and, for the
//! authentication service, for a per-call credential that is attached to
//! every request on that connection.

use std::fmt;
use std::sync::Arc;

use tonic::metadata::{AsciiMetadataValue, MetadataMap};
use tonic::transport::{Certificate, ClientTlsConfig, Identity};
use tonic::Status;

use crate::error::ConnectError;

/// Transport-level credential handed to the dialer
#[derive(Debug, Clone)]
pub struct TransportCredentials {
    tls: ClientTlsConfig,
}

impl TransportCredentials {
    pub fn from_tls(tls: ClientTlsConfig) -> Self {
        Self { tls }
    }

    pub fn tls_config(&self) -> &ClientTlsConfig {
        &self.tls
    }
}

/// Credential attached to every request on a connection
pub trait CallCredentials: Send + Sync + fmt::Debug {
    /// Write the credential into outgoing request metadata
    fn apply(&self, metadata: &mut MetadataMap) -> Result<(), Status>;
}

/// `authorization: Bearer <token>` call credential
#[derive(Clone)]
pub struct BearerToken {
    token: String,
}

impl BearerToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerToken")
            .field("token", &"<redacted>")
            .finish()
    }
}

impl CallCredentials for BearerToken {
    fn apply(&self, metadata: &mut MetadataMap) -> Result<(), Status> {
        let value: AsciiMetadataValue = format!("Bearer {}", self.token)
            .parse()
            .map_err(|_| Status::unauthenticated("bearer token is not valid metadata"))?;
        metadata.insert("authorization", value);
        Ok(())
    }
}

/// Source of credentials for dialing agents and the authentication service
pub trait Authorizer: Send + Sync {
    /// TLS configuration required by authenticated connections
    fn transport_credentials(&self) -> Result<TransportCredentials, ConnectError>;

    /// Per-call credential for the authentication service connection
    fn call_credentials(&self) -> Result<Arc<dyn CallCredentials>, ConnectError>;
}

/// Authorizer backed by PEM material
///
/// # Example
///
/// ```rust
/// use agentlink_connect::TlsAuthorizer;
///
/// let ca = "-----BEGIN CERTIFICATE-----\n...\n-----END CERTIFICATE-----\n";
/// let authorizer = TlsAuthorizer::new(ca)
///     .with_domain("cloudagent.local")
///     .with_token("secret-token");
/// ```
#[derive(Clone)]
pub struct TlsAuthorizer {
    ca_cert_pem: String,
    identity: Option<(String, String)>,
    domain: Option<String>,
    token: Option<String>,
}

impl TlsAuthorizer {
    /// Create an authorizer that trusts `ca_cert_pem` for server verification
    pub fn new(ca_cert_pem: impl Into<String>) -> Self {
        Self {
            ca_cert_pem: ca_cert_pem.into(),
            identity: None,
            domain: None,
            token: None,
        }
    }

    /// Present a client certificate (mTLS)
    pub fn with_identity(mut self, cert_pem: impl Into<String>, key_pem: impl Into<String>) -> Self {
        self.identity = Some((cert_pem.into(), key_pem.into()));
        self
    }

    /// Override the server name used for certificate verification
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// Bearer token sent on authentication service calls
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

impl fmt::Debug for TlsAuthorizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsAuthorizer")
            .field("has_identity", &self.identity.is_some())
            .field("domain", &self.domain)
            .field("has_token", &self.token.is_some())
            .finish()
    }
}

impl Authorizer for TlsAuthorizer {
    fn transport_credentials(&self) -> Result<TransportCredentials, ConnectError> {
        if self.ca_cert_pem.trim().is_empty() {
            return Err(ConnectError::Authorization(
                "no CA certificate configured".to_string(),
            ));
        }

        let mut tls = ClientTlsConfig::new().ca_certificate(Certificate::from_pem(&self.ca_cert_pem));
        if let Some((cert, key)) = &self.identity {
            tls = tls.identity(Identity::from_pem(cert, key));
        }
        if let Some(domain) = &self.domain {
            tls = tls.domain_name(domain.clone());
        }

        Ok(TransportCredentials::from_tls(tls))
    }

    fn call_credentials(&self) -> Result<Arc<dyn CallCredentials>, ConnectError> {
        match &self.token {
            Some(token) => Ok(Arc::new(BearerToken::new(token.clone()))),
            None => Err(ConnectError::Authorization(
                "no token configured for the authentication service".to_string(),
            )),
        }
    }
}

/// Authorizer for debug-mode callers that hold no credentials
#[derive(Debug, Clone, Copy, Default)]
pub struct InsecureAuthorizer;

impl Authorizer for InsecureAuthorizer {
    fn transport_credentials(&self) -> Result<TransportCredentials, ConnectError> {
        Err(ConnectError::Authorization(
            "insecure authorizer has no transport credentials".to_string(),
        ))
    }

    fn call_credentials(&self) -> Result<Arc<dyn CallCredentials>, ConnectError> {
        Err(ConnectError::Authorization(
            "insecure authorizer has no call credentials".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_token_sets_authorization() {
        let mut metadata = MetadataMap::new();
        BearerToken::new("abc123").apply(&mut metadata).unwrap();
        assert_eq!(
            metadata.get("authorization").unwrap().to_str().unwrap(),
            "Bearer abc123"
        );
    }

    #[test]
    fn test_bearer_token_rejects_invalid_metadata() {
        let mut metadata = MetadataMap::new();
        let result = BearerToken::new("bad\ntoken").apply(&mut metadata);
        assert!(result.is_err());
        assert!(metadata.get("authorization").is_none());
    }

    #[test]
    fn test_bearer_token_debug_is_redacted() {
        let debug = format!("{:?}", BearerToken::new("super-secret"));
        assert!(!debug.contains("super-secret"));
    }

    #[test]
    fn test_tls_authorizer_requires_ca() {
        let result = TlsAuthorizer::new("  ").transport_credentials();
        assert!(matches!(result, Err(ConnectError::Authorization(_))));
    }

    #[test]
    fn test_tls_authorizer_token_optional() {
        let without = TlsAuthorizer::new("pem");
        assert!(matches!(
            without.call_credentials(),
            Err(ConnectError::Authorization(_))
        ));

        let with = TlsAuthorizer::new("pem").with_token("t");
        assert!(with.call_credentials().is_ok());
        assert!(with.transport_credentials().is_ok());
    }

    #[test]
    fn test_insecure_authorizer_refuses() {
        assert!(InsecureAuthorizer.transport_credentials().is_err());
        assert!(InsecureAuthorizer.call_credentials().is_err());
    }
}
