//! Placement policy
//!
//! The policy names every node of the cluster, binds each organization
//! profile to a primary node, and sets the shared backup node and the
//! replication bounds. It is loaded once and passed explicitly to every
//! engine entry point.
//!
//! Policy file format (~/.ccs/config.yml):
//! ```yaml
//! cluster:
//!   basic_auth_user: admin
//!   basic_auth_password: <secret>
//!
//! backup_node: chll
//! default_node: nas
//! replication_min: 3
//! replication_max: 5
//!
//! profiles:
//!   hrdag:
//!     primary: nas
//!
//! nodes:
//!   nas:
//!     host: nas
//!     peer_id: 12D3KooW...
//!     reserved_min_gb: 200
//!   meerkat: meerkat.tailnet   # bare hostname, no peer id yet
//! ```
//!
//! Files ending in `.toml` are read as TOML with the same schema.

use crate::error::{CcsError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable overriding the policy file location
pub const CONFIG_ENV: &str = "CCS_CONFIG";

/// Bytes per configured reserved gigabyte (decimal, like the free-space metric)
pub const BYTES_PER_GB: u64 = 1_000_000_000;

pub const DEFAULT_REPLICATION_MIN: u32 = 3;
pub const DEFAULT_REPLICATION_MAX: u32 = 5;

/// A single cluster node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    pub name: String,
    /// Hostname used for API and gateway calls
    pub host: String,
    /// Cluster peer id used for allocations
    pub peer_id: Option<String>,
    /// Free space held back from allocation, in decimal gigabytes
    pub reserved_min_gb: u64,
}

impl NodeConfig {
    pub fn new(name: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            peer_id: None,
            reserved_min_gb: 0,
        }
    }

    pub fn with_peer_id(mut self, peer_id: impl Into<String>) -> Self {
        self.peer_id = Some(peer_id.into());
        self
    }

    pub fn with_reserved_gb(mut self, gb: u64) -> Self {
        self.reserved_min_gb = gb;
        self
    }

    /// Reserved capacity in bytes
    pub fn reserved_bytes(&self) -> u64 {
        self.reserved_min_gb.saturating_mul(BYTES_PER_GB)
    }
}

/// An organization profile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileConfig {
    pub name: String,
    /// Name of the primary node
    pub primary: String,
}

/// Basic auth credentials for the cluster API
#[derive(Clone, PartialEq, Eq)]
pub struct ClusterAuth {
    pub user: String,
    pub password: String,
}

impl std::fmt::Debug for ClusterAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterAuth")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Complete placement policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    pub auth: Option<ClusterAuth>,
    pub backup_node: Option<String>,
    pub default_node: Option<String>,
    pub replication_min: u32,
    pub replication_max: u32,
    pub profiles: BTreeMap<String, ProfileConfig>,
    pub nodes: BTreeMap<String, NodeConfig>,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            auth: None,
            backup_node: None,
            default_node: None,
            replication_min: DEFAULT_REPLICATION_MIN,
            replication_max: DEFAULT_REPLICATION_MAX,
            profiles: BTreeMap::new(),
            nodes: BTreeMap::new(),
        }
    }
}

impl Policy {
    /// Register a node, keyed by its name
    pub fn add_node(&mut self, node: NodeConfig) -> &mut Self {
        self.nodes.insert(node.name.clone(), node);
        self
    }

    /// Bind a profile to its primary node
    pub fn add_profile(&mut self, name: &str, primary: &str) -> &mut Self {
        self.profiles.insert(
            name.to_string(),
            ProfileConfig {
                name: name.to_string(),
                primary: primary.to_string(),
            },
        );
        self
    }

    pub fn node(&self, name: &str) -> Option<&NodeConfig> {
        self.nodes.get(name)
    }

    pub fn profile(&self, name: &str) -> Option<&ProfileConfig> {
        self.profiles.get(name)
    }

    /// Primary node of a profile
    pub fn primary_for_profile(&self, profile: &str) -> Option<&NodeConfig> {
        self.profile(profile).and_then(|p| self.node(&p.primary))
    }

    pub fn backup(&self) -> Option<&NodeConfig> {
        self.backup_node.as_deref().and_then(|name| self.node(name))
    }

    pub fn peer_id(&self, node_name: &str) -> Option<&str> {
        self.node(node_name).and_then(|n| n.peer_id.as_deref())
    }

    /// Reverse lookup: node owning a peer id
    pub fn node_by_peer_id(&self, peer_id: &str) -> Option<&NodeConfig> {
        self.nodes
            .values()
            .find(|n| n.peer_id.as_deref() == Some(peer_id))
    }

    /// Resolve a node name to its host; unknown names are used as hosts verbatim
    pub fn host_for(&self, name: &str) -> String {
        self.node(name)
            .map(|n| n.host.clone())
            .unwrap_or_else(|| name.to_string())
    }

    /// Validate the policy, returning (errors, warnings).
    ///
    /// An empty error list means the policy is usable for every operation.
    pub fn validate(&self) -> (Vec<String>, Vec<String>) {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        match &self.backup_node {
            None => errors.push("backup_node is not set".to_string()),
            Some(name) if !self.nodes.contains_key(name) => {
                errors.push(format!("backup_node '{}' not found in nodes", name))
            }
            Some(_) => {}
        }

        if let Some(name) = &self.default_node {
            if !self.nodes.contains_key(name) {
                errors.push(format!("default_node '{}' not found in nodes", name));
            }
        }

        for (name, profile) in &self.profiles {
            if !self.nodes.contains_key(&profile.primary) {
                errors.push(format!(
                    "profile '{}' references unknown node '{}'",
                    name, profile.primary
                ));
            }
        }

        if self.replication_min < 1 {
            errors.push("replication_min must be >= 1".to_string());
        }
        if self.replication_max < self.replication_min {
            errors.push(format!(
                "replication_max must be >= replication_min ({} < {})",
                self.replication_max, self.replication_min
            ));
        }
        if self.replication_min as usize > self.nodes.len() {
            warnings.push(format!(
                "replication_min ({}) exceeds node count ({})",
                self.replication_min,
                self.nodes.len()
            ));
        }

        for (name, node) in &self.nodes {
            if node.peer_id.is_none() {
                warnings.push(format!(
                    "node '{}' has no peer_id (run ansible to populate)",
                    name
                ));
            }
        }

        if self.auth.is_none() {
            warnings.push("no cluster auth configured".to_string());
        }

        (errors, warnings)
    }
}

// =============================================================================
// FILE FORMAT
// =============================================================================

#[derive(Debug, Default, Serialize, Deserialize)]
struct PolicyFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cluster: Option<ClusterSection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    backup_node: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default_node: Option<String>,
    #[serde(default = "default_replication_min")]
    replication_min: u32,
    #[serde(default = "default_replication_max")]
    replication_max: u32,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    profiles: BTreeMap<String, ProfileSection>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    nodes: BTreeMap<String, NodeSection>,
}

fn default_replication_min() -> u32 {
    DEFAULT_REPLICATION_MIN
}

fn default_replication_max() -> u32 {
    DEFAULT_REPLICATION_MAX
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ClusterSection {
    #[serde(default)]
    basic_auth_user: Option<String>,
    #[serde(default)]
    basic_auth_password: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ProfileSection {
    primary: String,
}

/// Nodes may be written as a bare hostname or as a full table
#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum NodeSection {
    Host(String),
    Full {
        #[serde(default)]
        host: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        peer_id: Option<String>,
        #[serde(default, skip_serializing_if = "is_zero")]
        reserved_min_gb: u64,
    },
}

fn is_zero(v: &u64) -> bool {
    *v == 0
}

impl From<PolicyFile> for Policy {
    fn from(raw: PolicyFile) -> Self {
        let auth = raw.cluster.and_then(|c| match (c.basic_auth_user, c.basic_auth_password) {
            (Some(user), Some(password)) if !user.is_empty() && !password.is_empty() => {
                Some(ClusterAuth { user, password })
            }
            _ => None,
        });

        let profiles = raw
            .profiles
            .into_iter()
            .map(|(name, p)| {
                let profile = ProfileConfig {
                    name: name.clone(),
                    primary: p.primary,
                };
                (name, profile)
            })
            .collect();

        let nodes = raw
            .nodes
            .into_iter()
            .map(|(name, section)| {
                let node = match section {
                    NodeSection::Host(host) => NodeConfig::new(name.clone(), host),
                    NodeSection::Full {
                        host,
                        peer_id,
                        reserved_min_gb,
                    } => NodeConfig {
                        name: name.clone(),
                        host: host.unwrap_or_else(|| name.clone()),
                        peer_id: peer_id.filter(|p| !p.is_empty()),
                        reserved_min_gb,
                    },
                };
                (name, node)
            })
            .collect();

        Policy {
            auth,
            backup_node: raw.backup_node,
            default_node: raw.default_node,
            replication_min: raw.replication_min,
            replication_max: raw.replication_max,
            profiles,
            nodes,
        }
    }
}

impl From<&Policy> for PolicyFile {
    fn from(policy: &Policy) -> Self {
        PolicyFile {
            cluster: policy.auth.as_ref().map(|a| ClusterSection {
                basic_auth_user: Some(a.user.clone()),
                basic_auth_password: Some(a.password.clone()),
            }),
            backup_node: policy.backup_node.clone(),
            default_node: policy.default_node.clone(),
            replication_min: policy.replication_min,
            replication_max: policy.replication_max,
            profiles: policy
                .profiles
                .iter()
                .map(|(name, p)| {
                    (
                        name.clone(),
                        ProfileSection {
                            primary: p.primary.clone(),
                        },
                    )
                })
                .collect(),
            nodes: policy
                .nodes
                .iter()
                .map(|(name, n)| {
                    (
                        name.clone(),
                        NodeSection::Full {
                            host: Some(n.host.clone()),
                            peer_id: n.peer_id.clone(),
                            reserved_min_gb: n.reserved_min_gb,
                        },
                    )
                })
                .collect(),
        }
    }
}

/// Default policy file path (~/.ccs/config.yml)
pub fn default_policy_path() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| CcsError::Configuration("Could not determine home directory".into()))?;
    Ok(home.join(".ccs").join("config.yml"))
}

/// Resolve which policy file to read: explicit path, then `CCS_CONFIG`, then the default
pub fn resolve_policy_path(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    match std::env::var(CONFIG_ENV) {
        Ok(path) if !path.is_empty() => Ok(PathBuf::from(path)),
        _ => default_policy_path(),
    }
}

/// Parse policy text; `toml` selects the TOML reader, otherwise YAML
pub fn parse_policy(content: &str, toml: bool) -> Result<Policy> {
    if content.trim().is_empty() {
        return Ok(Policy::default());
    }
    let raw: PolicyFile = if toml {
        toml::from_str(content)?
    } else {
        serde_yaml::from_str(content)?
    };
    Ok(raw.into())
}

/// Load the policy from disk
pub fn load_policy(explicit: Option<&Path>) -> Result<Policy> {
    let path = resolve_policy_path(explicit)?;
    if !path.exists() {
        return Err(CcsError::Configuration(format!(
            "Config file not found: {}",
            path.display()
        )));
    }

    debug!(path = %path.display(), "Loading policy");
    let content = fs::read_to_string(&path)?;
    parse_policy(&content, is_toml(&path))
}

/// Save the policy; the file holds credentials so it is made owner-only
pub fn save_policy(policy: &Policy, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let raw = PolicyFile::from(policy);
    let content = if is_toml(path) {
        toml::to_string_pretty(&raw).map_err(|e| CcsError::Serialization(e.to_string()))?
    } else {
        serde_yaml::to_string(&raw)?
    };
    fs::write(path, content)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }

    Ok(())
}

fn is_toml(path: &Path) -> bool {
    path.extension().map_or(false, |ext| ext == "toml")
}
