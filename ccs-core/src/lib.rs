//! CCS Core Library
//!
//! Shared vocabulary for the community cloud storage tools.
//! This crate provides:
//! - The placement policy (nodes, profiles, backup node, replication bounds)
//! - Pin and peer records as reported by the pinning cluster
//! - Common types and error handling

pub mod error;
pub mod pin;
pub mod policy;

pub use error::{AllocationError, CcsError, ClusterError, Result};
pub use pin::{short_cid, AddedEntry, PeerInfo, PeerPinStatus, Pin, PinState, META_ORG, META_SIZE};
pub use policy::{
    default_policy_path, load_policy, parse_policy, resolve_policy_path, save_policy,
    ClusterAuth, NodeConfig, Policy, ProfileConfig, BYTES_PER_GB, CONFIG_ENV,
};
