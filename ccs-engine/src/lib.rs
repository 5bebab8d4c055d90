//! Cluster Policy Engine
//!
//! Placement and maintenance operations for an IPFS-Cluster deployment
//! driven by a node/profile policy:
//! - Adding content with explicit primary + backup allocations
//! - Health aggregation across peers and pins
//! - Repair of errored replicas
//! - Capacity-aware rebalancing within replication bounds
//! - Metadata migrations (required peers, org/size tags)
//!
//! Every operation talks to the cluster through [`ClusterApi`]; the HTTP
//! implementation is [`HttpClusterClient`].

pub mod add;
pub mod allocation;
pub mod cluster;
pub mod config;
pub mod health;
pub mod http_client;
pub mod migrate;
pub mod rebalance;
pub mod repair;
pub mod retrieve;
pub mod status;
pub mod walk;

// Re-export main types
pub use add::{add, AddOptions, AddOutcome, AddResult, CidEntry, DESIRED_REPLICAS};
pub use allocation::{required_peers_for_pin, resolve_allocations, resolve_target_host};
pub use cluster::{AddRequest, ClusterApi, ClusterResult, DownloadInfo, PinRequest};
pub use config::{ScanConfig, TransportConfig, DEFAULT_API_PORT, DEFAULT_GATEWAY_PORT};
pub use health::{check_health, HealthReport, HealthStatus, NodeHealth, PinErrorRecord};
pub use http_client::HttpClusterClient;
pub use migrate::{ensure_pins, tag_pins, EnsurePinsResult, PinFailure, TagPinsResult};
pub use rebalance::{
    plan_allocation, rebalance, AllocationPlan, NodeBalance, PlacementContext, ProgressCallback,
    RebalanceAction, RebalancePinAction, RebalanceProgress, RebalanceResult,
};
pub use repair::{repair, BrokenPin, RepairResult};
pub use retrieve::get;
pub use status::{ls, peers, remove, status};
pub use walk::{collect_files, UploadFile};
