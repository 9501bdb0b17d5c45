use std::fmt;

use crate::error::{DirtError, Result};

/// A transport-agnostic remote address: `scheme://host:port`. The scheme
/// selects which [`crate::registry::ProtocolRegistry`] binding handles it;
/// host/port are the only address shape the core understands — a binding is
/// free to interpret them however its transport requires.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteAddress {
    scheme: String,
    host: String,
    port: u16,
}

impl RemoteAddress {
    pub fn new(scheme: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme: scheme.into(),
            host: host.into(),
            port,
        }
    }

    /// Parses `scheme://host:port`. This is deliberately tiny — no query
    /// strings, no path — matching spec §6's "bind"/"remote" URL fields.
    pub fn parse(url: &str) -> Result<Self> {
        let (scheme, rest) = url
            .split_once("://")
            .ok_or_else(|| DirtError::configuration(format!("`{url}` is missing a scheme")))?;
        let (host, port) = rest
            .rsplit_once(':')
            .ok_or_else(|| DirtError::configuration(format!("`{url}` is missing a port")))?;
        let port: u16 = port
            .parse()
            .map_err(|_| DirtError::configuration(format!("`{url}` has a non-numeric port")))?;
        if scheme.is_empty() || host.is_empty() {
            return Err(DirtError::configuration(format!(
                "`{url}` must have a non-empty scheme and host"
            )));
        }
        Ok(Self::new(scheme, host, port))
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn host_port(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for RemoteAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme, self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_scheme_host_port() {
        let addr = RemoteAddress::parse("dirt://127.0.0.1:9000").unwrap();
        assert_eq!(addr.scheme(), "dirt");
        assert_eq!(addr.host(), "127.0.0.1");
        assert_eq!(addr.port(), 9000);
    }

    #[test]
    fn rejects_missing_scheme() {
        assert!(RemoteAddress::parse("127.0.0.1:9000").is_err());
    }
}
