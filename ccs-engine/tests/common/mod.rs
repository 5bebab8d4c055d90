//! Shared fixtures for engine integration tests
//!
//! `FakeCluster` keeps pins in memory, applies upserts to them and records
//! every call, so a second engine run sees the state the first one left.

#![allow(dead_code)]

use async_trait::async_trait;
use ccs_core::{
    AddedEntry, ClusterError, NodeConfig, PeerInfo, PeerPinStatus, Pin, PinState, Policy,
    BYTES_PER_GB, META_ORG,
};
use ccs_engine::{AddRequest, ClusterApi, ClusterResult, DownloadInfo, PinRequest};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

pub const NAS: &str = "12D3KooWNAS";
pub const MEER: &str = "12D3KooWMEER";
pub const CHLL: &str = "12D3KooWCHLL";
pub const PIHOST: &str = "12D3KooWPIHOST";
pub const IPFS1: &str = "12D3KooWIPFS1";

/// Five nodes; hrdag lives on nas, orgB on meerkat, chll is the backup
pub fn test_policy() -> Policy {
    let mut policy = Policy::default();
    policy
        .add_node(NodeConfig::new("nas", "nas.local").with_peer_id(NAS))
        .add_node(NodeConfig::new("meerkat", "meerkat.local").with_peer_id(MEER))
        .add_node(NodeConfig::new("chll", "chll.local").with_peer_id(CHLL))
        .add_node(NodeConfig::new("pihost", "pihost.local").with_peer_id(PIHOST))
        .add_node(NodeConfig::new("ipfs1", "ipfs1.local").with_peer_id(IPFS1))
        .add_profile("hrdag", "nas")
        .add_profile("orgB", "meerkat");
    policy.backup_node = Some("chll".to_string());
    policy.default_node = Some("nas".to_string());
    policy
}

/// Free space per peer in decimal gigabytes
pub fn test_free_space() -> BTreeMap<String, u64> {
    [
        (NAS, 1190),
        (MEER, 2260),
        (CHLL, 1190),
        (PIHOST, 17690),
        (IPFS1, 1410),
    ]
    .into_iter()
    .map(|(id, gb)| (id.to_string(), gb * BYTES_PER_GB))
    .collect()
}

pub fn ids(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

/// Pin allocated to `allocations`, every allocated peer reporting `pinned`
pub fn pin(cid: &str, org: Option<&str>, allocations: &[&str]) -> Pin {
    let mut pin = Pin {
        cid: cid.to_string(),
        name: Some(format!("{}.dat", cid.to_lowercase())),
        allocations: ids(allocations),
        ..Default::default()
    };
    if let Some(org) = org {
        pin.metadata.insert(META_ORG.to_string(), org.to_string());
    }
    for id in allocations {
        pin.peer_map
            .insert(id.to_string(), PeerPinStatus::new(*id, PinState::Pinned));
    }
    pin
}

pub fn peer(name: &str, id: &str) -> PeerInfo {
    PeerInfo {
        name: name.to_string(),
        peer_id: id.to_string(),
        addresses: Vec::new(),
        error: None,
    }
}

#[derive(Debug, Default)]
struct State {
    peers: Vec<PeerInfo>,
    pins: BTreeMap<String, Pin>,
    free_space: BTreeMap<String, u64>,
    dag_sizes: BTreeMap<String, u64>,
    add_response: Vec<AddedEntry>,

    fail_peers: Option<(u16, String)>,
    fail_pins: Option<(u16, String)>,
    fail_pin_status: bool,
    pin_failures: BTreeMap<String, (u16, String)>,
    recover_failures: BTreeSet<String>,
    download_failures: BTreeSet<String>,

    add_requests: Vec<AddRequest>,
    upserts: Vec<PinRequest>,
    recovered: Vec<String>,
    unpinned: Vec<String>,
    downloads: Vec<String>,
    connected: Vec<String>,
}

/// In-memory cluster
#[derive(Debug, Clone, Default)]
pub struct FakeCluster {
    host: String,
    state: Arc<Mutex<State>>,
}

fn api_error((status, message): &(u16, String)) -> ClusterError {
    ClusterError::Api {
        status: *status,
        message: message.clone(),
    }
}

impl FakeCluster {
    pub fn new() -> Self {
        Self {
            host: "fake".to_string(),
            ..Default::default()
        }
    }

    /// Same state, different host; used as the `add` connector
    pub fn connect(&self, host: &str) -> Result<FakeCluster, ClusterError> {
        self.state.lock().connected.push(host.to_string());
        Ok(FakeCluster {
            host: host.to_string(),
            state: Arc::clone(&self.state),
        })
    }

    pub fn with_peers(self, peers: Vec<PeerInfo>) -> Self {
        self.state.lock().peers = peers;
        self
    }

    pub fn with_pins(self, pins: Vec<Pin>) -> Self {
        {
            let mut state = self.state.lock();
            for pin in pins {
                state.pins.insert(pin.cid.clone(), pin);
            }
        }
        self
    }

    pub fn with_free_space(self, free_space: BTreeMap<String, u64>) -> Self {
        self.state.lock().free_space = free_space;
        self
    }

    pub fn with_dag_size(self, cid: &str, size: u64) -> Self {
        self.state.lock().dag_sizes.insert(cid.to_string(), size);
        self
    }

    /// Entries returned by the next add; the last one is the root
    pub fn with_add_response(self, entries: Vec<AddedEntry>) -> Self {
        self.state.lock().add_response = entries;
        self
    }

    pub fn fail_peers(self, status: u16, message: &str) -> Self {
        self.state.lock().fail_peers = Some((status, message.to_string()));
        self
    }

    pub fn fail_pins(self, status: u16, message: &str) -> Self {
        self.state.lock().fail_pins = Some((status, message.to_string()));
        self
    }

    pub fn fail_pin_status(self) -> Self {
        self.state.lock().fail_pin_status = true;
        self
    }

    /// Upserts of `cid` fail with the given status and message
    pub fn fail_upsert(self, cid: &str, status: u16, message: &str) -> Self {
        self.state
            .lock()
            .pin_failures
            .insert(cid.to_string(), (status, message.to_string()));
        self
    }

    pub fn fail_recover(self, cid: &str) -> Self {
        self.state.lock().recover_failures.insert(cid.to_string());
        self
    }

    pub fn fail_download_from(self, host: &str) -> Self {
        self.state.lock().download_failures.insert(host.to_string());
        self
    }

    pub fn pin_record(&self, cid: &str) -> Option<Pin> {
        self.state.lock().pins.get(cid).cloned()
    }

    pub fn add_requests(&self) -> Vec<AddRequest> {
        self.state.lock().add_requests.clone()
    }

    pub fn upserts(&self) -> Vec<PinRequest> {
        self.state.lock().upserts.clone()
    }

    pub fn recovered(&self) -> Vec<String> {
        self.state.lock().recovered.clone()
    }

    pub fn downloads(&self) -> Vec<String> {
        self.state.lock().downloads.clone()
    }

    pub fn connected(&self) -> Vec<String> {
        self.state.lock().connected.clone()
    }
}

#[async_trait]
impl ClusterApi for FakeCluster {
    fn host(&self) -> &str {
        &self.host
    }

    async fn peers(&self) -> ClusterResult<Vec<PeerInfo>> {
        let state = self.state.lock();
        match &state.fail_peers {
            Some(failure) => Err(api_error(failure)),
            None => Ok(state.peers.clone()),
        }
    }

    async fn pins(&self) -> ClusterResult<Vec<Pin>> {
        let state = self.state.lock();
        match &state.fail_pins {
            Some(failure) => Err(api_error(failure)),
            None => Ok(state.pins.values().cloned().collect()),
        }
    }

    async fn pin_status(&self, cid: &str) -> ClusterResult<Pin> {
        let state = self.state.lock();
        if state.fail_pin_status {
            return Err(ClusterError::Http("connection reset".to_string()));
        }
        state.pins.get(cid).cloned().ok_or_else(|| ClusterError::Api {
            status: 404,
            message: format!("pin {} not found", cid),
        })
    }

    async fn add(&self, request: &AddRequest) -> ClusterResult<Vec<AddedEntry>> {
        let mut state = self.state.lock();
        state.add_requests.push(request.clone());
        Ok(state.add_response.clone())
    }

    async fn pin(&self, request: &PinRequest) -> ClusterResult<()> {
        let mut state = self.state.lock();
        if let Some(failure) = state.pin_failures.get(&request.cid) {
            return Err(api_error(failure));
        }
        state.upserts.push(request.clone());

        let pin = state.pins.entry(request.cid.clone()).or_insert_with(|| Pin {
            cid: request.cid.clone(),
            ..Default::default()
        });
        pin.name = request.name.clone();
        pin.allocations = request.allocations.clone();
        pin.metadata = request.metadata.clone();
        pin.replication_factor_min = request.replication_min;
        pin.replication_factor_max = request.replication_max;
        Ok(())
    }

    async fn unpin(&self, cid: &str) -> ClusterResult<()> {
        let mut state = self.state.lock();
        state.pins.remove(cid);
        state.unpinned.push(cid.to_string());
        Ok(())
    }

    async fn recover(&self, cid: &str) -> ClusterResult<()> {
        let mut state = self.state.lock();
        if state.recover_failures.contains(cid) {
            return Err(ClusterError::Api {
                status: 500,
                message: "recover failed".to_string(),
            });
        }
        state.recovered.push(cid.to_string());
        Ok(())
    }

    async fn free_space(&self) -> ClusterResult<BTreeMap<String, u64>> {
        Ok(self.state.lock().free_space.clone())
    }

    async fn dag_size(&self, cid: &str) -> ClusterResult<u64> {
        self.state
            .lock()
            .dag_sizes
            .get(cid)
            .copied()
            .ok_or_else(|| ClusterError::Api {
                status: 504,
                message: "gateway timeout".to_string(),
            })
    }

    async fn download(
        &self,
        source_host: &str,
        _cid: &str,
        dest: &Path,
    ) -> ClusterResult<DownloadInfo> {
        let mut state = self.state.lock();
        state.downloads.push(source_host.to_string());
        if state.download_failures.contains(source_host) {
            return Err(ClusterError::Http(format!("{} unreachable", source_host)));
        }
        Ok(DownloadInfo {
            path: dest.to_path_buf(),
            bytes: 42,
            is_directory: false,
        })
    }
}
