//! Repair Engine
//!
//! Finds pins with errored replicas and asks the cluster to recover them.
//! A broken pin with at least one healthy replica is recoverable; a broken
//! pin without any healthy replica is lost and is only reported.

use crate::cluster::{ClusterApi, ClusterResult};
use crate::config::ScanConfig;
use ccs_core::{Pin, Policy};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, instrument, warn};

/// A pin with at least one errored replica
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BrokenPin {
    pub cid: String,
    pub name: Option<String>,
    pub recoverable: bool,
    /// Nodes reporting an error-class status
    pub error_nodes: Vec<String>,
    /// Nodes holding or fetching the content
    pub healthy_nodes: Vec<String>,
    pub recovered: bool,
    pub recover_error: Option<String>,
}

/// Outcome of a repair scan
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepairResult {
    pub checked_at: DateTime<Utc>,
    pub total_pins: usize,
    pub broken: usize,
    pub recoverable: usize,
    pub lost: usize,
    pub recovered: usize,
    pub recover_errors: usize,
    pub dry_run: bool,
    pub broken_pins: Vec<BrokenPin>,
}

impl RepairResult {
    fn new(dry_run: bool) -> Self {
        Self {
            checked_at: Utc::now(),
            total_pins: 0,
            broken: 0,
            recoverable: 0,
            lost: 0,
            recovered: 0,
            recover_errors: 0,
            dry_run,
            broken_pins: Vec::new(),
        }
    }

    /// Exit code: clean=0, fixed=1, any lost pin=2
    pub fn severity(&self) -> i32 {
        if self.lost > 0 {
            2
        } else if self.broken > 0 {
            1
        } else {
            0
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "Checked {} pins: {} broken, {} recoverable, {} lost, {} recovered, {} recover errors",
            self.total_pins,
            self.broken,
            self.recoverable,
            self.lost,
            self.recovered,
            self.recover_errors
        )
    }
}

/// Classify a pin; `None` when no replica is in an error state
pub fn classify(pin: &Pin, policy: &Policy) -> Option<BrokenPin> {
    let node_name = |peer_id: &str, peername: &str| {
        policy
            .node_by_peer_id(peer_id)
            .map(|n| n.name.clone())
            .unwrap_or_else(|| {
                if peername.is_empty() {
                    peer_id.to_string()
                } else {
                    peername.to_string()
                }
            })
    };

    let mut error_nodes = Vec::new();
    let mut healthy_nodes = Vec::new();
    for (peer_id, status) in &pin.peer_map {
        if status.status.is_error() {
            error_nodes.push(node_name(peer_id, &status.peername));
        } else if status.status.is_healthy() {
            healthy_nodes.push(node_name(peer_id, &status.peername));
        }
    }

    if error_nodes.is_empty() {
        return None;
    }

    Some(BrokenPin {
        cid: pin.cid.clone(),
        name: pin.name.clone(),
        recoverable: !healthy_nodes.is_empty(),
        error_nodes,
        healthy_nodes,
        recovered: false,
        recover_error: None,
    })
}

/// Scan every pin and recover the recoverable ones.
///
/// Fails only if the pin list cannot be fetched; recovery failures are
/// recorded per pin.
#[instrument(skip(client, policy))]
pub async fn repair<C: ClusterApi + ?Sized>(
    client: &C,
    policy: &Policy,
    config: &ScanConfig,
) -> ClusterResult<RepairResult> {
    let pins = client.pins().await?;
    let mut result = RepairResult::new(config.dry_run);
    result.total_pins = pins.len();

    info!(pins = pins.len(), dry_run = config.dry_run, "Starting repair scan");

    for pin in &pins {
        let Some(mut broken) = classify(pin, policy) else {
            continue;
        };
        result.broken += 1;

        if !broken.recoverable {
            result.lost += 1;
            warn!(cid = %pin.cid, nodes = ?broken.error_nodes, "Pin lost: no healthy replica");
            result.broken_pins.push(broken);
            continue;
        }
        result.recoverable += 1;

        if !config.dry_run {
            match client.recover(&pin.cid).await {
                Ok(()) => {
                    broken.recovered = true;
                    result.recovered += 1;
                    info!(cid = %pin.cid, "Recovery triggered");
                }
                Err(e) => {
                    warn!(cid = %pin.cid, error = %e, "Recovery failed");
                    broken.recover_error = Some(e.to_string());
                    result.recover_errors += 1;
                }
            }
            config.throttle().await;
        }

        result.broken_pins.push(broken);
    }

    info!(summary = %result.summary(), "Repair scan complete");
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ccs_core::{PeerPinStatus, PinState};

    fn pin(statuses: &[(&str, PinState)]) -> Pin {
        let mut pin = Pin {
            cid: "QmA".to_string(),
            ..Default::default()
        };
        for (peer, state) in statuses {
            pin.peer_map
                .insert(peer.to_string(), PeerPinStatus::new(*peer, *state));
        }
        pin
    }

    #[test]
    fn test_healthy_pin_is_not_broken() {
        let policy = Policy::default();
        assert!(classify(&pin(&[("a", PinState::Pinned), ("b", PinState::Pinning)]), &policy).is_none());
    }

    #[test]
    fn test_recoverable_vs_lost() {
        let policy = Policy::default();

        let broken = classify(&pin(&[("a", PinState::PinError), ("b", PinState::Pinned)]), &policy)
            .unwrap();
        assert!(broken.recoverable);
        assert_eq!(broken.error_nodes, vec!["a"]);
        assert_eq!(broken.healthy_nodes, vec!["b"]);

        let broken = classify(&pin(&[("a", PinState::PinError), ("b", PinState::Error)]), &policy)
            .unwrap();
        assert!(!broken.recoverable);
    }

    #[test]
    fn test_queued_counts_as_healthy() {
        let policy = Policy::default();
        let broken = classify(
            &pin(&[("a", PinState::PinError), ("b", PinState::PinQueued)]),
            &policy,
        )
        .unwrap();
        assert!(broken.recoverable);
    }

    #[test]
    fn test_severity() {
        let mut result = RepairResult::new(false);
        assert_eq!(result.severity(), 0);
        result.broken = 2;
        assert_eq!(result.severity(), 1);
        result.lost = 1;
        assert_eq!(result.severity(), 2);
    }
}
