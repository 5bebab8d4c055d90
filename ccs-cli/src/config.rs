//! Policy loading and cluster connection
//!
//! Resolves the policy file, applies the `--host` override and builds the
//! HTTP cluster client every command talks through.
//!
//! Policy file format (~/.ccs/config.yml):
//! ```yaml
//! cluster:
//!   basic_auth_user: admin
//!   basic_auth_password: secret
//! backup_node: chll
//! default_node: nas
//! replication_min: 3
//! replication_max: 5
//! profiles:
//!   hrdag: { primary: nas }
//! nodes:
//!   nas: { host: nas.local, peer_id: 12D3KooW..., reserved_min_gb: 100 }
//!   chll: chll.example.org
//! ```

use anyhow::{Context, Result};
use ccs_core::Policy;
use ccs_engine::{resolve_target_host, HttpClusterClient, TransportConfig};
use regex::Regex;
use std::path::{Path, PathBuf};

/// Loaded policy plus the global flags that shape every command
pub struct CliContext {
    pub policy: Policy,
    pub policy_path: PathBuf,
    /// Node name or hostname from `--host`
    pub host: Option<String>,
    pub json: bool,
    pub transport: TransportConfig,
}

impl CliContext {
    pub fn load(config_file: Option<&Path>, host: Option<String>, json: bool) -> Result<Self> {
        let policy_path = ccs_core::resolve_policy_path(config_file)?;
        let policy = ccs_core::load_policy(Some(&policy_path))
            .with_context(|| format!("Failed to load policy from {}", policy_path.display()))?;

        Ok(Self {
            policy,
            policy_path,
            host,
            json,
            transport: TransportConfig::from_env(),
        })
    }

    /// Client for a specific host
    pub fn connect(&self, host: &str) -> Result<HttpClusterClient> {
        HttpClusterClient::new(host, self.policy.auth.clone(), self.transport.clone())
            .with_context(|| format!("Failed to create cluster client for {}", host))
    }

    /// Client for cluster-wide commands: `--host`, else the default node
    pub fn cluster(&self) -> Result<HttpClusterClient> {
        let host = resolve_target_host(&self.policy, None, self.host.as_deref()).context(
            "No host specified and no default_node in config (use --host or set default_node)",
        )?;
        self.connect(&host)
    }
}

/// Hostnames and node names accepted by `--host`
const HOST_PATTERN: &str = r"^[A-Za-z0-9][A-Za-z0-9.-]*$";

/// clap value parser for `--host`
pub fn parse_host(value: &str) -> std::result::Result<String, String> {
    if value.starts_with("--") {
        return Err(format!("'{}' looks like a flag, not a hostname", value));
    }
    let pattern = Regex::new(HOST_PATTERN).map_err(|e| e.to_string())?;
    if !pattern.is_match(value) {
        return Err(format!(
            "'{}' is not a valid hostname (letters, digits, '.' and '-')",
            value
        ));
    }
    Ok(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_hosts() {
        assert_eq!(parse_host("nas").unwrap(), "nas");
        assert!(parse_host("ipfs1.example.org").is_ok());
        assert!(parse_host("10.0.0.5").is_ok());
    }

    #[test]
    fn test_rejected_hosts() {
        assert!(parse_host("--json").is_err());
        assert!(parse_host("-nas").is_err());
        assert!(parse_host("http://nas").is_err());
        assert!(parse_host("nas:9094").is_err());
        assert!(parse_host("").is_err());
    }
}
