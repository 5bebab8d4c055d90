//! Health Aggregator
//!
//! Cross-references the peer list with the pin list:
//! - A peer is online iff it reports no peer-level error
//! - Per-node counters of pinned, remote and errored pins
//! - A flat list of pin errors for follow-up with `repair`
//!
//! Overall status is `error` when any peer is offline, `degraded` when any
//! pin error was seen, and `ok` otherwise.

use crate::cluster::{ClusterApi, ClusterResult};
use ccs_core::{short_cid, PeerInfo, Pin};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{info, instrument, warn};

/// Overall cluster health
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Degraded,
    Error,
}

impl HealthStatus {
    /// Exit code: ok=0, degraded=1, error=2
    pub fn severity(&self) -> i32 {
        match self {
            HealthStatus::Ok => 0,
            HealthStatus::Degraded => 1,
            HealthStatus::Error => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Ok => "ok",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Error => "error",
        }
    }
}

/// Health of a single cluster node
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeHealth {
    pub name: String,
    pub peer_id: String,
    pub online: bool,
    pub status: HealthStatus,
    pub pinned: usize,
    pub remote: usize,
    pub pin_error: usize,
    /// Peer-level error reported by the cluster
    pub error: Option<String>,
}

/// One errored pin on one node
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PinErrorRecord {
    /// Cid prefix
    pub cid: String,
    pub node: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PeerCounts {
    pub total: usize,
    pub online: usize,
    pub offline: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PinCounts {
    pub total: usize,
}

/// Cluster health report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub checked_at: DateTime<Utc>,
    pub peers: PeerCounts,
    pub pins: PinCounts,
    pub nodes: Vec<NodeHealth>,
    pub pin_errors: Vec<PinErrorRecord>,
    /// Listings that could not be fetched
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl HealthReport {
    pub fn severity(&self) -> i32 {
        self.status.severity()
    }

    pub fn summary(&self) -> String {
        format!(
            "{}: {}/{} peers online, {} pins, {} pin errors",
            self.status.as_str(),
            self.peers.online,
            self.peers.total,
            self.pins.total,
            self.pin_errors.len()
        )
    }
}

/// Build the health report.
///
/// Fails only when neither peers nor pins can be listed; a single failed
/// listing is recorded in `errors` and folded into the status.
#[instrument(skip(client))]
pub async fn check_health<C: ClusterApi + ?Sized>(client: &C) -> ClusterResult<HealthReport> {
    let peers = client.peers().await;
    let pins = client.pins().await;

    let (peers, pins, errors) = match (peers, pins) {
        (Err(peer_err), Err(pin_err)) => {
            warn!(peers = %peer_err, pins = %pin_err, "Cluster unreachable");
            return Err(peer_err);
        }
        (Ok(peers), Ok(pins)) => (peers, pins, Vec::new()),
        (Err(e), Ok(pins)) => {
            warn!(error = %e, "Could not list peers");
            (Vec::new(), pins, vec![format!("peers: {}", e)])
        }
        (Ok(peers), Err(e)) => {
            warn!(error = %e, "Could not list pins");
            (peers, Vec::new(), vec![format!("pins: {}", e)])
        }
    };

    let report = aggregate(&peers, &pins, errors);
    info!(summary = %report.summary(), "Health check complete");
    Ok(report)
}

/// Fold peers and pins into a report
pub fn aggregate(peers: &[PeerInfo], pins: &[Pin], errors: Vec<String>) -> HealthReport {
    let mut nodes: BTreeMap<&str, NodeHealth> = peers
        .iter()
        .map(|p| {
            let health = NodeHealth {
                name: p.name.clone(),
                peer_id: p.peer_id.clone(),
                online: p.is_online(),
                status: if p.is_online() {
                    HealthStatus::Ok
                } else {
                    HealthStatus::Error
                },
                pinned: 0,
                remote: 0,
                pin_error: 0,
                error: p.error.clone(),
            };
            (p.peer_id.as_str(), health)
        })
        .collect();

    let mut pin_errors = Vec::new();

    for pin in pins {
        for (peer_id, status) in &pin.peer_map {
            let node = nodes.get_mut(peer_id.as_str());

            if status.status.is_error() {
                let node_name = node
                    .as_ref()
                    .map(|n| n.name.clone())
                    .filter(|n| !n.is_empty())
                    .unwrap_or_else(|| status.peername.clone());
                pin_errors.push(PinErrorRecord {
                    cid: short_cid(&pin.cid).to_string(),
                    node: node_name,
                    error: status
                        .error
                        .clone()
                        .unwrap_or_else(|| status.status.to_string()),
                });
            }

            if let Some(node) = node {
                match status.status {
                    ccs_core::PinState::Pinned => node.pinned += 1,
                    ccs_core::PinState::Remote => node.remote += 1,
                    s if s.is_error() => node.pin_error += 1,
                    _ => {}
                }
            }
        }
    }

    for node in nodes.values_mut() {
        if node.online && node.pin_error > 0 {
            node.status = HealthStatus::Degraded;
        }
    }

    let nodes: Vec<NodeHealth> = nodes.into_values().collect();
    let online = nodes.iter().filter(|n| n.online).count();
    let peer_counts = PeerCounts {
        total: nodes.len(),
        online,
        offline: nodes.len() - online,
    };

    let status = if peer_counts.offline > 0 || (!errors.is_empty() && peers.is_empty()) {
        HealthStatus::Error
    } else if !pin_errors.is_empty() || !errors.is_empty() {
        HealthStatus::Degraded
    } else {
        HealthStatus::Ok
    };

    HealthReport {
        status,
        checked_at: Utc::now(),
        peers: peer_counts,
        pins: PinCounts { total: pins.len() },
        nodes,
        pin_errors,
        errors,
    }
}
