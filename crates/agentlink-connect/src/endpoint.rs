//! Endpoint resolution for agent and authentication addresses

/// Default port of a cloud agent endpoint
pub const AGENT_PORT: u16 = 55000;

/// Default port of the authentication service endpoint
pub const AUTH_PORT: u16 = 65000;

/// The two kinds of endpoint the SDK talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointFamily {
    /// Resource agents (virtual machines, networks, storage, ...)
    Agent,
    /// The authentication service
    Authentication,
}

impl EndpointFamily {
    pub fn default_port(&self) -> u16 {
        match self {
            EndpointFamily::Agent => AGENT_PORT,
            EndpointFamily::Authentication => AUTH_PORT,
        }
    }

    /// Resolve `address` using this family's default port
    pub fn resolve(&self, address: &str) -> String {
        resolve_endpoint(address, self.default_port())
    }
}

/// Normalize an address into the canonical `host:port` form.
///
/// An address that already carries a port is returned unchanged, otherwise
/// `default_port` is appended. Bracketed IPv6 literals only count as having
/// a port when written as `[addr]:port`.
pub fn resolve_endpoint(address: &str, default_port: u16) -> String {
    if has_port(address) {
        return address.to_string();
    }
    format!("{}:{}", address, default_port)
}

fn has_port(address: &str) -> bool {
    if address.starts_with('[') {
        return address.contains("]:");
    }
    address.contains(':')
}
