//! Pin and peer records as reported by the pinning cluster
//!
//! These types deserialize straight from the cluster REST API and serialize
//! back to the JSON shape the CLI prints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Metadata key holding the owning organization (profile name)
pub const META_ORG: &str = "org";
/// Metadata key holding the aggregate byte size of the pinned tree
pub const META_SIZE: &str = "size";

/// Per-peer pin state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PinState {
    Pinned,
    Pinning,
    PinQueued,
    Remote,
    PinError,
    Error,
    #[serde(other)]
    Unknown,
}

impl PinState {
    /// Parse a cluster status string; anything unrecognised is `Unknown`
    pub fn parse(s: &str) -> Self {
        match s {
            "pinned" => Self::Pinned,
            "pinning" => Self::Pinning,
            "pin_queued" => Self::PinQueued,
            "remote" => Self::Remote,
            "pin_error" => Self::PinError,
            "error" => Self::Error,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pinned => "pinned",
            Self::Pinning => "pinning",
            Self::PinQueued => "pin_queued",
            Self::Remote => "remote",
            Self::PinError => "pin_error",
            Self::Error => "error",
            Self::Unknown => "unknown",
        }
    }

    /// Error-class status: the peer tried and failed
    pub fn is_error(&self) -> bool {
        matches!(self, Self::PinError | Self::Error)
    }

    /// Healthy-class status: the content is held or on its way
    pub fn is_healthy(&self) -> bool {
        matches!(
            self,
            Self::Pinned | Self::Remote | Self::Pinning | Self::PinQueued
        )
    }
}

impl Default for PinState {
    fn default() -> Self {
        Self::Unknown
    }
}

impl fmt::Display for PinState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pin status for a single peer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerPinStatus {
    #[serde(default)]
    pub peername: String,
    #[serde(default)]
    pub status: PinState,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub error: Option<String>,
}

impl PeerPinStatus {
    pub fn new(peername: impl Into<String>, status: PinState) -> Self {
        Self {
            peername: peername.into(),
            status,
            error: None,
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// A cluster-tracked pin and its per-peer replication status
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pin {
    #[serde(default, deserialize_with = "cid_string")]
    pub cid: String,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub allocations: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub metadata: BTreeMap<String, String>,
    #[serde(default)]
    pub replication_factor_min: Option<i32>,
    #[serde(default)]
    pub replication_factor_max: Option<i32>,
    /// peer_id -> status
    #[serde(default, deserialize_with = "null_as_default")]
    pub peer_map: BTreeMap<String, PeerPinStatus>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created: Option<DateTime<Utc>>,
}

impl Pin {
    /// Number of peers with status `pinned`
    pub fn pinned_count(&self) -> usize {
        self.peer_map
            .values()
            .filter(|s| s.status == PinState::Pinned)
            .count()
    }

    /// Peernames that have pinned this cid
    pub fn pinned_peers(&self) -> Vec<&str> {
        self.peer_map
            .values()
            .filter(|s| s.status == PinState::Pinned)
            .map(|s| s.peername.as_str())
            .collect()
    }

    /// True if every allocated peer reports `pinned`
    pub fn is_fully_pinned(&self) -> bool {
        !self.allocations.is_empty()
            && self.allocations.iter().all(|peer| {
                self.peer_map
                    .get(peer)
                    .map_or(false, |s| s.status == PinState::Pinned)
            })
    }

    /// Status reported by a given peer id
    pub fn state_of(&self, peer_id: &str) -> Option<PinState> {
        self.peer_map.get(peer_id).map(|s| s.status)
    }

    /// Owning organization tag, if set
    pub fn org(&self) -> Option<&str> {
        self.metadata
            .get(META_ORG)
            .map(String::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Size tag, if set
    pub fn size_tag(&self) -> Option<&str> {
        self.metadata
            .get(META_SIZE)
            .map(String::as_str)
            .filter(|s| !s.is_empty())
    }

    /// First characters of the cid, for compact reports
    pub fn short_cid(&self) -> &str {
        short_cid(&self.cid)
    }
}

/// Truncate a cid to a readable prefix
pub fn short_cid(cid: &str) -> &str {
    match cid.char_indices().nth(16) {
        Some((idx, _)) => &cid[..idx],
        None => cid,
    }
}

/// Information about a cluster peer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInfo {
    #[serde(default, alias = "peername")]
    pub name: String,
    #[serde(default, alias = "id")]
    pub peer_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub addresses: Vec<String>,
    /// Peer-level error; a peer with an error is offline
    #[serde(default, deserialize_with = "empty_as_none")]
    pub error: Option<String>,
}

impl PeerInfo {
    pub fn is_online(&self) -> bool {
        self.error.is_none()
    }
}

/// One item returned by the cluster add endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddedEntry {
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "cid_string")]
    pub cid: String,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub size: u64,
}

// =============================================================================
// LENIENT DESERIALIZERS
// =============================================================================

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()))
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Cluster versions report cids either as a string or as `{"/": "<cid>"}`
fn cid_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Cid {
        Plain(String),
        Link {
            #[serde(rename = "/")]
            link: String,
        },
    }

    Ok(match Option::<Cid>::deserialize(deserializer)? {
        Some(Cid::Plain(s)) => s,
        Some(Cid::Link { link }) => link,
        None => String::new(),
    })
}

fn lenient_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Num {
        Int(u64),
        Text(String),
    }

    Ok(match Option::<Num>::deserialize(deserializer)? {
        Some(Num::Int(n)) => n,
        Some(Num::Text(s)) => s.parse().unwrap_or(0),
        None => 0,
    })
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc)))
}
