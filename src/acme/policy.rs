//! Host allow-list.
//!
//! Certificates are only ever requested for names on this list, so a
//! client cannot make the relay order certificates for arbitrary SNI values.

use std::collections::HashSet;

use crate::acme::error::{AcmeError, AcmeResult};

#[derive(Debug, Clone, Default)]
pub struct HostPolicy {
    allowed: HashSet<String>,
}

impl HostPolicy {
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            allowed: hosts.into_iter().map(|h| normalize(h.as_ref())).collect(),
        }
    }

    /// Return the normalized host if it may be served.
    pub fn check(&self, host: &str) -> AcmeResult<String> {
        let host = normalize(host);
        if self.allowed.contains(&host) {
            Ok(host)
        } else {
            Err(AcmeError::HostNotAllowed(host))
        }
    }

    pub fn is_empty(&self) -> bool {
        self.allowed.is_empty()
    }
}

/// Lowercase and drop a trailing root dot.
pub fn normalize(host: &str) -> String {
    host.trim().trim_end_matches('.').to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowed_host() {
        let policy = HostPolicy::new(["Relay.Example.com"]);
        assert_eq!(policy.check("relay.example.com").unwrap(), "relay.example.com");
        assert_eq!(policy.check("RELAY.example.com.").unwrap(), "relay.example.com");
    }

    #[test]
    fn test_rejected_host() {
        let policy = HostPolicy::new(["relay.example.com"]);
        let err = policy.check("other.example.com").unwrap_err();
        assert!(matches!(err, AcmeError::HostNotAllowed(h) if h == "other.example.com"));
        assert!(policy.check("sub.relay.example.com").is_err());
    }

    #[test]
    fn test_empty_policy_rejects_everything() {
        let policy = HostPolicy::default();
        assert!(policy.is_empty());
        assert!(policy.check("localhost").is_err());
    }
}
