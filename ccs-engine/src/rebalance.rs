//! Rebalance Engine
//!
//! Converges every pin's allocation to the policy's replication bounds:
//! - Required peers (backup, plus the primary of the pin's org) are always kept
//! - Peers the policy does not know are dropped as orphans
//! - Under-replicated pins gain the peers with the most allocatable space
//! - Over-replicated pins lose the non-required peers with the least space
//!
//! Planning is pure ([`plan_allocation`]); [`rebalance`] applies the plans
//! pin by pin with read-merge-write upserts.

use crate::allocation::required_peers_for_pin;
use crate::cluster::{ClusterApi, PinRequest};
use crate::config::ScanConfig;
use ccs_core::{CcsError, Policy, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::{debug, info, instrument, warn};

/// Everything placement decisions need, snapshotted once per run
#[derive(Debug, Clone, Default)]
pub struct PlacementContext {
    /// peer id -> node name, for every configured node with a peer id
    pub known: BTreeMap<String, String>,
    /// peer id -> allocatable bytes (free minus reserved, floored at zero)
    pub capacity: BTreeMap<String, u64>,
    pub replication_min: usize,
    pub replication_max: usize,
}

impl PlacementContext {
    pub fn new(policy: &Policy, free_space: &BTreeMap<String, u64>) -> Self {
        let mut known = BTreeMap::new();
        let mut capacity = BTreeMap::new();

        for node in policy.nodes.values() {
            let Some(peer_id) = &node.peer_id else {
                continue;
            };
            known.insert(peer_id.clone(), node.name.clone());
            let free = free_space.get(peer_id).copied().unwrap_or(0);
            capacity.insert(peer_id.clone(), free.saturating_sub(node.reserved_bytes()));
        }

        Self {
            known,
            capacity,
            replication_min: policy.replication_min as usize,
            replication_max: policy.replication_max as usize,
        }
    }

    pub fn capacity_of(&self, peer_id: &str) -> u64 {
        self.capacity.get(peer_id).copied().unwrap_or(0)
    }

    /// Node name for a peer id, or the id itself when unknown
    pub fn display_name(&self, peer_id: &str) -> String {
        self.known
            .get(peer_id)
            .cloned()
            .unwrap_or_else(|| peer_id.to_string())
    }

    fn names(&self, peer_ids: &[String]) -> Vec<String> {
        peer_ids.iter().map(|id| self.display_name(id)).collect()
    }

    fn by_capacity_desc(&self, a: &String, b: &String) -> Ordering {
        self.capacity_of(b)
            .cmp(&self.capacity_of(a))
            .then_with(|| a.cmp(b))
    }

    fn by_capacity_asc(&self, a: &String, b: &String) -> Ordering {
        self.capacity_of(a)
            .cmp(&self.capacity_of(b))
            .then_with(|| a.cmp(b))
    }
}

/// Planned allocation change for one pin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationPlan {
    /// Known peers in the existing allocation
    pub current: Vec<String>,
    /// Allocation after the change
    pub allocation: Vec<String>,
    pub added: Vec<String>,
    /// Dropped peers, orphans included
    pub removed: Vec<String>,
    pub orphaned: Vec<String>,
}

impl AllocationPlan {
    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Plan one pin's allocation
pub fn plan_allocation(
    allocations: &[String],
    required: &[String],
    ctx: &PlacementContext,
) -> AllocationPlan {
    let mut current: Vec<String> = Vec::new();
    let mut orphaned: Vec<String> = Vec::new();
    for peer_id in allocations {
        let bucket = if ctx.known.contains_key(peer_id) {
            &mut current
        } else {
            &mut orphaned
        };
        if !bucket.contains(peer_id) {
            bucket.push(peer_id.clone());
        }
    }

    let mut allocation = current.clone();
    for peer_id in required {
        if !allocation.contains(peer_id) {
            allocation.push(peer_id.clone());
        }
    }

    if allocation.len() < ctx.replication_min {
        let mut candidates: Vec<&String> = ctx
            .known
            .keys()
            .filter(|id| !allocation.contains(id) && ctx.capacity_of(id) > 0)
            .collect();
        candidates.sort_by(|a, b| ctx.by_capacity_desc(a, b));

        let needed = ctx.replication_min - allocation.len();
        allocation.extend(candidates.into_iter().take(needed).cloned());
    }

    if allocation.len() > ctx.replication_max {
        let mut removable: Vec<String> = allocation
            .iter()
            .filter(|id| !required.contains(id))
            .cloned()
            .collect();
        removable.sort_by(|a, b| ctx.by_capacity_asc(a, b));

        let excess = allocation.len() - ctx.replication_max;
        let dropped: Vec<String> = removable.into_iter().take(excess).collect();
        allocation.retain(|id| !dropped.contains(id));
    }

    let added: Vec<String> = allocation
        .iter()
        .filter(|id| !current.contains(id))
        .cloned()
        .collect();
    let mut removed: Vec<String> = current
        .iter()
        .filter(|id| !allocation.contains(id))
        .cloned()
        .collect();
    removed.extend(orphaned.iter().cloned());

    AllocationPlan {
        current,
        allocation,
        added,
        removed,
        orphaned,
    }
}

/// What happened to a pin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RebalanceAction {
    AlreadyCorrect,
    Rebalance,
    Error,
}

/// Per-pin entry in the action log (node names, orphans by peer id)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RebalancePinAction {
    pub cid: String,
    pub name: Option<String>,
    pub action: RebalanceAction,
    pub before: Vec<String>,
    pub after: Vec<String>,
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub error: Option<String>,
}

/// Pins allocated to a node before and after the run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeBalance {
    pub node: String,
    pub peer_id: String,
    pub available_bytes: u64,
    pub before: usize,
    pub after: usize,
}

/// Outcome of a rebalance run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RebalanceResult {
    pub checked_at: DateTime<Utc>,
    pub total_pins: usize,
    pub replication_min: usize,
    pub replication_max: usize,
    pub already_correct: usize,
    pub rebalanced: usize,
    pub added_replicas: usize,
    pub removed_replicas: usize,
    pub errors: usize,
    pub dry_run: bool,
    /// Changed or failed pins only
    pub actions: Vec<RebalancePinAction>,
    pub nodes: Vec<NodeBalance>,
}

impl RebalanceResult {
    /// Exit code: errors=2, any change=1, nothing to do=0
    pub fn severity(&self) -> i32 {
        if self.errors > 0 {
            2
        } else if self.added_replicas > 0 || self.removed_replicas > 0 {
            1
        } else {
            0
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "{} pins: {} already correct, {} rebalanced (+{} / -{} replicas), {} errors",
            self.total_pins,
            self.already_correct,
            self.rebalanced,
            self.added_replicas,
            self.removed_replicas,
            self.errors
        )
    }
}

/// Progress report after each pin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebalanceProgress {
    /// 1-based index of the pin just processed
    pub done: usize,
    pub total: usize,
    pub cid: String,
    pub action: RebalanceAction,
}

pub type ProgressCallback<'a> = &'a (dyn Fn(RebalanceProgress) + Send + Sync);

/// Rebalance every pin in the cluster.
///
/// Fails only when the policy bounds are invalid or the pin list or free
/// space metrics cannot be fetched. Per-pin write failures are recorded and
/// the pin is assumed to keep its prior allocation.
#[instrument(skip(client, policy, progress))]
pub async fn rebalance<C: ClusterApi + ?Sized>(
    client: &C,
    policy: &Policy,
    config: &ScanConfig,
    progress: Option<ProgressCallback<'_>>,
) -> Result<RebalanceResult> {
    if policy.replication_min < 1 || policy.replication_max < policy.replication_min {
        return Err(CcsError::Configuration(format!(
            "invalid replication bounds: min {} max {}",
            policy.replication_min, policy.replication_max
        )));
    }

    let free_space = client.free_space().await?;
    let ctx = PlacementContext::new(policy, &free_space);
    let pins = client.pins().await?;

    info!(
        pins = pins.len(),
        known_peers = ctx.known.len(),
        min = ctx.replication_min,
        max = ctx.replication_max,
        dry_run = config.dry_run,
        "Starting rebalance"
    );

    let mut result = RebalanceResult {
        checked_at: Utc::now(),
        total_pins: pins.len(),
        replication_min: ctx.replication_min,
        replication_max: ctx.replication_max,
        already_correct: 0,
        rebalanced: 0,
        added_replicas: 0,
        removed_replicas: 0,
        errors: 0,
        dry_run: config.dry_run,
        actions: Vec::new(),
        nodes: Vec::new(),
    };
    let mut before: BTreeMap<String, usize> = BTreeMap::new();
    let mut after: BTreeMap<String, usize> = BTreeMap::new();

    for (index, pin) in pins.iter().enumerate() {
        let required = required_peers_for_pin(pin, policy);
        let plan = plan_allocation(&pin.allocations, &required, &ctx);

        for id in &plan.current {
            *before.entry(id.clone()).or_default() += 1;
        }

        let action = if plan.is_noop() {
            result.already_correct += 1;
            for id in &plan.current {
                *after.entry(id.clone()).or_default() += 1;
            }
            RebalanceAction::AlreadyCorrect
        } else {
            debug!(
                cid = %pin.cid,
                added = ?plan.added,
                removed = ?plan.removed,
                "Rebalancing pin"
            );

            let outcome = if config.dry_run {
                Ok(())
            } else {
                let request = PinRequest::from_pin(pin).with_allocations(plan.allocation.clone());
                let outcome = client.pin(&request).await;
                config.throttle().await;
                outcome
            };

            let mut entry = RebalancePinAction {
                cid: pin.cid.clone(),
                name: pin.name.clone(),
                action: RebalanceAction::Rebalance,
                before: ctx.names(&pin.allocations),
                after: ctx.names(&plan.allocation),
                added: ctx.names(&plan.added),
                removed: ctx.names(&plan.removed),
                error: None,
            };

            let settled = match outcome {
                Ok(()) => {
                    result.rebalanced += 1;
                    result.added_replicas += plan.added.len();
                    result.removed_replicas += plan.removed.len();
                    &plan.allocation
                }
                Err(e) => {
                    warn!(cid = %pin.cid, error = %e, "Re-pin failed");
                    result.errors += 1;
                    entry.action = RebalanceAction::Error;
                    entry.after = entry.before.clone();
                    entry.error = Some(e.to_string());
                    &plan.current
                }
            };
            for id in settled {
                *after.entry(id.clone()).or_default() += 1;
            }

            let action = entry.action;
            result.actions.push(entry);
            action
        };

        if let Some(report) = progress {
            report(RebalanceProgress {
                done: index + 1,
                total: pins.len(),
                cid: pin.cid.clone(),
                action,
            });
        }
    }

    result.nodes = ctx
        .known
        .iter()
        .map(|(peer_id, name)| NodeBalance {
            node: name.clone(),
            peer_id: peer_id.clone(),
            available_bytes: ctx.capacity_of(peer_id),
            before: before.get(peer_id).copied().unwrap_or(0),
            after: after.get(peer_id).copied().unwrap_or(0),
        })
        .collect();

    info!(summary = %result.summary(), "Rebalance complete");
    Ok(result)
}
