//! Host configuration
//!
//! TigerStyle: Explicit defaults, validation, reasonable limits.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use selkie_core::error::{Error, Result};

fn default_lattice_prefix() -> String {
    "default".to_string()
}

/// Configuration shared by every instance this host starts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    /// Public key identifying the enclosing host
    pub host_id: String,

    /// Logical network prefix scoping bus topics and claims
    #[serde(default = "default_lattice_prefix")]
    pub lattice_prefix: String,

    /// Cluster issuer public keys trusted for anti-forgery validation
    #[serde(default)]
    pub cluster_issuers: Vec<String>,

    /// Host labels forwarded to the policy evaluator
    #[serde(default)]
    pub labels: HashMap<String, String>,

    /// Whether live updates of running actors are permitted
    #[serde(default)]
    pub allow_live_updates: bool,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            host_id: String::new(),
            lattice_prefix: default_lattice_prefix(),
            cluster_issuers: Vec::new(),
            labels: HashMap::new(),
            allow_live_updates: false,
        }
    }
}

impl HostConfig {
    /// Create a configuration for the given host identity
    pub fn new(host_id: impl Into<String>) -> Self {
        Self {
            host_id: host_id.into(),
            ..Default::default()
        }
    }

    /// Set the lattice prefix
    pub fn with_lattice_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.lattice_prefix = prefix.into();
        self
    }

    /// Add a trusted cluster issuer
    pub fn with_cluster_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.cluster_issuers.push(issuer.into());
        self
    }

    /// Add a host label
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Permit live updates of running actors
    pub fn enable_live_updates(mut self) -> Self {
        self.allow_live_updates = true;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.host_id.is_empty() {
            return Err(Error::InvalidConfiguration {
                field: "host_id".into(),
                reason: "must not be empty".into(),
            });
        }
        if self.lattice_prefix.is_empty() {
            return Err(Error::InvalidConfiguration {
                field: "lattice_prefix".into(),
                reason: "must not be empty".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HostConfig::new("NHOST");
        assert_eq!(config.lattice_prefix, "default");
        assert!(!config.allow_live_updates);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_empty_host_id() {
        let config = HostConfig::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_builder() {
        let config = HostConfig::new("NHOST")
            .with_lattice_prefix("prod")
            .with_cluster_issuer("CISSUER")
            .with_label("arch", "x86_64")
            .enable_live_updates();

        assert_eq!(config.lattice_prefix, "prod");
        assert_eq!(config.cluster_issuers, vec!["CISSUER".to_string()]);
        assert_eq!(config.labels["arch"], "x86_64");
        assert!(config.allow_live_updates);
    }
}
