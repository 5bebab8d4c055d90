//! Pinning cluster interface
//!
//! Every engine talks to the cluster only through [`ClusterApi`], so the
//! engines can be driven by the HTTP transport in production and by an
//! in-memory fake in tests.

use ccs_core::{AddedEntry, ClusterError, PeerInfo, Pin};
use crate::walk::UploadFile;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub type ClusterResult<T> = std::result::Result<T, ClusterError>;

/// Content to add to the cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddRequest {
    /// File or directory on local disk
    pub path: PathBuf,
    /// Pin name recorded by the cluster
    pub name: String,
    /// Files to upload, already walked
    pub files: Vec<UploadFile>,
    /// Explicit peer allocations (primary first)
    pub allocations: Vec<String>,
    /// Always include the receiving peer in the allocation
    pub local: bool,
    pub metadata: BTreeMap<String, String>,
}

/// Idempotent pin upsert
///
/// Built from an existing [`Pin`] so name, metadata and replication factors
/// are carried through unchanged unless explicitly replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinRequest {
    pub cid: String,
    pub name: Option<String>,
    pub allocations: Vec<String>,
    pub replication_min: Option<i32>,
    pub replication_max: Option<i32>,
    pub metadata: BTreeMap<String, String>,
}

impl PinRequest {
    /// Start an upsert that preserves everything the pin already has
    pub fn from_pin(pin: &Pin) -> Self {
        Self {
            cid: pin.cid.clone(),
            name: pin.name.clone(),
            allocations: pin.allocations.clone(),
            replication_min: pin.replication_factor_min,
            replication_max: pin.replication_factor_max,
            metadata: pin.metadata.clone(),
        }
    }

    pub fn with_allocations(mut self, allocations: Vec<String>) -> Self {
        self.allocations = allocations;
        self
    }

    pub fn with_metadata(mut self, metadata: BTreeMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }
}

/// What a download wrote to disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadInfo {
    pub path: PathBuf,
    pub bytes: u64,
    /// The content was a directory, written as a tar archive
    pub is_directory: bool,
}

/// Cluster client trait
#[async_trait::async_trait]
pub trait ClusterApi: Send + Sync {
    /// Host this client talks to
    fn host(&self) -> &str;

    async fn peers(&self) -> ClusterResult<Vec<PeerInfo>>;

    async fn pins(&self) -> ClusterResult<Vec<Pin>>;

    async fn pin_status(&self, cid: &str) -> ClusterResult<Pin>;

    /// Add a file or tree; entries come back in cluster order, root last
    async fn add(&self, request: &AddRequest) -> ClusterResult<Vec<AddedEntry>>;

    async fn pin(&self, request: &PinRequest) -> ClusterResult<()>;

    async fn unpin(&self, cid: &str) -> ClusterResult<()>;

    async fn recover(&self, cid: &str) -> ClusterResult<()>;

    /// Free bytes per peer id
    async fn free_space(&self) -> ClusterResult<BTreeMap<String, u64>>;

    /// Cumulative byte size of the DAG rooted at `cid`
    async fn dag_size(&self, cid: &str) -> ClusterResult<u64>;

    /// Fetch content from the gateway on `source_host` into `dest`
    async fn download(&self, source_host: &str, cid: &str, dest: &Path)
        -> ClusterResult<DownloadInfo>;
}
