use std::collections::HashSet;
use std::sync::RwLock;

use regex::Regex;
use tracing::{info, warn};

/// Decides whether TLS verification should be bypassed for a given
/// upstream endpoint. Mutable at runtime: the Retry Driver may demote an
/// endpoint into the bypass set after an SSL error surfaces mid-retry.
pub struct SslPolicy {
    bypass_endpoints: RwLock<HashSet<String>>,
    bypass_patterns: RwLock<Vec<Regex>>,
}

impl Default for SslPolicy {
    fn default() -> Self {
        Self {
            bypass_endpoints: RwLock::new(HashSet::new()),
            bypass_patterns: RwLock::new(Vec::new()),
        }
    }
}

impl SslPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if TLS verification should be bypassed for `endpoint`.
    pub fn should_bypass(&self, endpoint: &str) -> bool {
        if self
            .bypass_endpoints
            .read()
            .expect("ssl bypass set poisoned")
            .contains(endpoint)
        {
            return true;
        }

        self.bypass_patterns
            .read()
            .expect("ssl bypass patterns poisoned")
            .iter()
            .any(|p| p.is_match(endpoint))
    }

    /// Idempotent: adding the same endpoint twice is equivalent to adding
    /// it once.
    pub fn add_bypass_endpoint(&self, endpoint: &str) {
        let mut set = self
            .bypass_endpoints
            .write()
            .expect("ssl bypass set poisoned");
        if set.insert(endpoint.to_string()) {
            warn!("bypassing SSL verification for endpoint: {endpoint}");
        }
    }

    /// Rejects an invalid regex and leaves the pattern list unchanged.
    pub fn add_bypass_pattern(&self, pattern: &str) -> Result<(), regex::Error> {
        let compiled = Regex::new(pattern)?;
        self.bypass_patterns
            .write()
            .expect("ssl bypass patterns poisoned")
            .push(compiled);
        info!("added SSL bypass pattern: {pattern}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_endpoint_is_verified() {
        let policy = SslPolicy::new();
        assert!(!policy.should_bypass("https://api.mainnet-beta.solana.com"));
    }

    #[test]
    fn bypass_endpoint_is_idempotent() {
        let policy = SslPolicy::new();
        policy.add_bypass_endpoint("https://solana.public-rpc.com");
        policy.add_bypass_endpoint("https://solana.public-rpc.com");
        assert!(policy.should_bypass("https://solana.public-rpc.com"));
    }

    #[test]
    fn bypass_pattern_matches() {
        let policy = SslPolicy::new();
        policy
            .add_bypass_pattern(r"^https://.*\.public-rpc\.com$")
            .unwrap();
        assert!(policy.should_bypass("https://solana.public-rpc.com"));
        assert!(!policy.should_bypass("https://api.mainnet-beta.solana.com"));
    }

    #[test]
    fn invalid_pattern_is_rejected_and_list_unchanged() {
        let policy = SslPolicy::new();
        assert!(policy.add_bypass_pattern("(unclosed").is_err());
        assert!(!policy.should_bypass("https://anything"));
    }
}
