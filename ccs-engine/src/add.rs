//! Add Orchestrator
//!
//! Adds a file or tree to the cluster pinned explicitly to the profile's
//! primary and the backup node, then checks how far replication got.
//!
//! The orchestrator never fails: every problem is folded into the returned
//! [`AddResult`] and its [`AddOutcome`].

use crate::allocation::{resolve_allocations, resolve_target_host};
use crate::cluster::{AddRequest, ClusterApi};
use crate::walk::{collect_files, total_len};
use ccs_core::{short_cid, ClusterError, Pin, PinState, Policy, META_ORG, META_SIZE};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

/// Replica count an add should reach before it counts as fully successful
pub const DESIRED_REPLICAS: usize = 3;

/// Outcome of an add
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// Added and replicated to the desired level
    Success,
    /// Added, but replication is pending, short, or unverified
    Partial,
    /// Nothing usable was added
    Failed,
    /// The policy cannot place this content
    ConfigError,
}

impl AddOutcome {
    /// Process exit code
    pub fn exit_code(&self) -> i32 {
        match self {
            AddOutcome::Success => 0,
            AddOutcome::Partial => 1,
            AddOutcome::Failed => 2,
            AddOutcome::ConfigError => 3,
        }
    }

    pub fn from_exit_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(AddOutcome::Success),
            1 => Some(AddOutcome::Partial),
            2 => Some(AddOutcome::Failed),
            3 => Some(AddOutcome::ConfigError),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AddOutcome::Success => "success",
            AddOutcome::Partial => "partial",
            AddOutcome::Failed => "failed",
            AddOutcome::ConfigError => "config_error",
        }
    }
}

/// Serialized as the numeric return code
mod returncode {
    use super::AddOutcome;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(outcome: &AddOutcome, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_i32(outcome.exit_code())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<AddOutcome, D::Error> {
        let code = i32::deserialize(d)?;
        AddOutcome::from_exit_code(code)
            .ok_or_else(|| D::Error::custom(format!("unknown returncode {}", code)))
    }
}

/// One file or directory produced by an add
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CidEntry {
    /// Path relative to the add root
    pub path: String,
    pub cid: String,
    pub size: u64,
    #[serde(default)]
    pub is_root: bool,
    #[serde(default)]
    pub error: Option<String>,
}

impl CidEntry {
    pub fn ok(&self) -> bool {
        self.error.is_none() && !self.cid.is_empty()
    }
}

/// Result of adding content to the cluster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddResult {
    /// Cid of the top-level item; empty when nothing was added
    pub root_cid: String,
    pub root_path: String,
    pub entries: Vec<CidEntry>,
    /// Peer ids requested explicitly (primary, backup)
    #[serde(default)]
    pub allocations: Vec<String>,
    #[serde(default)]
    pub profile: Option<String>,
    pub added_at: DateTime<Utc>,
    /// Node the add was sent to
    #[serde(default)]
    pub cluster_host: String,
    #[serde(rename = "returncode", with = "returncode")]
    pub outcome: AddOutcome,
    #[serde(default)]
    pub error: Option<String>,
    /// Informational remark on a successful add
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// Peers holding a completed pin, once verified
    #[serde(default)]
    pub replica_count: Option<usize>,
}

impl AddResult {
    fn empty(path: &Path, profile: &str, host: Option<&str>) -> Self {
        Self {
            root_cid: String::new(),
            root_path: path.display().to_string(),
            entries: Vec::new(),
            allocations: Vec::new(),
            profile: Some(profile.to_string()),
            added_at: Utc::now(),
            cluster_host: host.unwrap_or_default().to_string(),
            outcome: AddOutcome::Failed,
            error: None,
            note: None,
            replica_count: None,
        }
    }

    fn fail(mut self, outcome: AddOutcome, error: impl Into<String>) -> Self {
        self.outcome = outcome;
        self.error = Some(error.into());
        self
    }

    pub fn is_ok(&self) -> bool {
        self.outcome == AddOutcome::Success
    }

    pub fn exit_code(&self) -> i32 {
        self.outcome.exit_code()
    }

    /// The entry whose cid is the root cid
    pub fn root_entry(&self) -> Option<&CidEntry> {
        self.entries.iter().find(|e| e.cid == self.root_cid)
    }

    /// Every entry except the root
    pub fn child_entries(&self) -> Vec<&CidEntry> {
        self.entries
            .iter()
            .filter(|e| e.cid != self.root_cid)
            .collect()
    }

    /// Sum of child sizes; the root already includes them
    pub fn total_size(&self) -> u64 {
        self.child_entries().iter().map(|e| e.size).sum()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn summary(&self) -> String {
        match self.outcome {
            AddOutcome::Success | AddOutcome::Partial => format!(
                "{} {} ({} entries, {} replicas)",
                self.outcome.as_str(),
                short_cid(&self.root_cid),
                self.entries.len(),
                self.replica_count
                    .map_or_else(|| "unverified".to_string(), |n| n.to_string())
            ),
            _ => format!(
                "{}: {}",
                self.outcome.as_str(),
                self.error.as_deref().unwrap_or("unknown error")
            ),
        }
    }
}

/// What to add and where
#[derive(Debug, Clone)]
pub struct AddOptions {
    pub path: PathBuf,
    pub profile: String,
    /// Node name or host to send the add to instead of the profile's primary
    pub host: Option<String>,
    pub recursive: bool,
}

impl AddOptions {
    pub fn new(path: impl Into<PathBuf>, profile: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            profile: profile.into(),
            host: None,
            recursive: true,
        }
    }

    pub fn with_host(mut self, host: Option<String>) -> Self {
        self.host = host;
        self
    }
}

/// Add content with explicit allocations and verify replication.
///
/// `connect` builds a cluster client for the resolved target host.
#[instrument(skip(connect, policy, options), fields(path = %options.path.display(), profile = %options.profile))]
pub async fn add<C, F>(connect: F, policy: &Policy, options: &AddOptions) -> AddResult
where
    C: ClusterApi,
    F: FnOnce(&str) -> Result<C, ClusterError>,
{
    let target_host = resolve_target_host(policy, Some(&options.profile), options.host.as_deref());
    let mut result = AddResult::empty(&options.path, &options.profile, target_host.as_deref());

    let Ok(path_meta) = tokio::fs::metadata(&options.path).await else {
        return result.fail(
            AddOutcome::Failed,
            format!("Path not found: {}", options.path.display()),
        );
    };

    let allocations = match resolve_allocations(&options.profile, policy) {
        Ok(allocations) => allocations,
        Err(e) => {
            warn!(error = %e, "Cannot resolve allocations");
            return result.fail(AddOutcome::ConfigError, e.to_string());
        }
    };
    result.allocations = allocations.clone();

    let host = match target_host {
        Some(host) => host,
        None => {
            return result.fail(
                AddOutcome::ConfigError,
                "No host specified and no default_node in config",
            )
        }
    };

    if path_meta.is_dir() && !options.recursive {
        return result.fail(
            AddOutcome::Failed,
            format!("{} is a directory; add it recursively", options.path.display()),
        );
    }

    let files = match collect_files(&options.path).await {
        Ok(files) => files,
        Err(e) => {
            let message = format!("Cannot read {}: {}", options.path.display(), e);
            return result.fail(AddOutcome::Failed, message);
        }
    };
    let size = total_len(&files);

    let client = match connect(&host) {
        Ok(client) => client,
        Err(e) => return result.fail(AddOutcome::Failed, e.to_string()),
    };

    let mut metadata = BTreeMap::new();
    metadata.insert(META_ORG.to_string(), options.profile.clone());
    metadata.insert(META_SIZE.to_string(), size.to_string());

    let request = AddRequest {
        path: options.path.clone(),
        name: options
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| options.path.display().to_string()),
        files,
        allocations: allocations.clone(),
        local: true,
        metadata,
    };

    info!(host = %host, size, allocations = ?allocations, "Adding content");

    let added = match client.add(&request).await {
        Ok(added) => added,
        Err(e) => {
            warn!(error = %e, "Add failed");
            return result.fail(AddOutcome::Failed, e.to_string());
        }
    };

    let Some(root) = added.last() else {
        return result.fail(
            AddOutcome::Failed,
            "No entries returned from cluster (possible server error)",
        );
    };
    let root_cid = root.cid.clone();

    result.entries = added
        .iter()
        .map(|e| CidEntry {
            path: e.name.clone(),
            cid: e.cid.clone(),
            size: e.size,
            is_root: e.cid == root_cid,
            error: None,
        })
        .collect();
    result.root_cid = root_cid.clone();

    match client.pin_status(&root_cid).await {
        Ok(pin) => verify_replication(&mut result, &pin, &allocations, policy),
        Err(e) => {
            warn!(cid = %root_cid, error = %e, "Replication check failed");
            result.outcome = AddOutcome::Partial;
            result.error = Some(format!("Added, but replication could not be verified: {}", e));
        }
    }

    info!(cid = %root_cid, outcome = result.outcome.as_str(), replicas = ?result.replica_count, "Add complete");
    result
}

/// Classify the freshly added pin by what primary and backup report
fn verify_replication(result: &mut AddResult, pin: &Pin, allocations: &[String], policy: &Policy) {
    let sides: Vec<(&str, &String)> = ["primary", "backup"]
        .into_iter()
        .zip(allocations.iter())
        .collect();

    let label = |role: &str, peer_id: &str| {
        let name = policy
            .node_by_peer_id(peer_id)
            .map(|n| n.name.clone())
            .unwrap_or_else(|| peer_id.to_string());
        format!("{} ({})", role, name)
    };

    let failed: Vec<String> = sides
        .iter()
        .filter(|(_, id)| pin.state_of(id.as_str()).map_or(false, |s| s.is_error()))
        .map(|(role, id)| {
            let detail = pin
                .peer_map
                .get(id.as_str())
                .and_then(|s| s.error.clone())
                .unwrap_or_else(|| "pin error".to_string());
            format!("{}: {}", label(role, id.as_str()), detail)
        })
        .collect();

    if !failed.is_empty() {
        result.outcome = AddOutcome::Failed;
        result.replica_count = Some(0);
        result.error = Some(format!("Pin failed on {}", failed.join("; ")));
        return;
    }

    let pending: Vec<String> = sides
        .iter()
        .filter(|(_, id)| pin.state_of(id.as_str()) != Some(PinState::Pinned))
        .map(|(role, id)| label(role, id.as_str()))
        .collect();

    if !pending.is_empty() {
        result.outcome = AddOutcome::Partial;
        result.error = Some(format!("Replication pending on {}", pending.join(", ")));
        return;
    }

    let count = pin.pinned_count();
    result.replica_count = Some(count);
    if count < DESIRED_REPLICAS {
        result.outcome = AddOutcome::Partial;
        result.error = Some(format!(
            "Only {} replicas pinned, below the desired minimum of {}",
            count, DESIRED_REPLICAS
        ));
    } else {
        result.outcome = AddOutcome::Success;
        if count == DESIRED_REPLICAS {
            result.note = Some(format!(
                "{} replicas pinned; the cluster may add more up to replication_max",
                count
            ));
        }
    }
}
