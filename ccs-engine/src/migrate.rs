//! Metadata Migrator
//!
//! Idempotent read-merge-write passes over existing pins:
//! - `ensure_pins`: union a profile's required peers into every allocation
//! - `tag_pins`: backfill the org and size metadata tags
//!
//! Each write re-sends the pin's name, metadata and replication factors, so
//! nothing but the targeted field changes.

use crate::allocation::resolve_allocations;
use crate::cluster::{ClusterApi, PinRequest};
use crate::config::ScanConfig;
use ccs_core::{CcsError, Pin, Policy, Result, META_ORG, META_SIZE};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

/// A pin the migration could not update
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PinFailure {
    pub cid: String,
    pub error: String,
}

/// Outcome of `ensure_pins`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnsurePinsResult {
    pub checked_at: DateTime<Utc>,
    pub total: usize,
    pub already_correct: usize,
    pub fixed: usize,
    pub errors: usize,
    pub dry_run: bool,
    /// Peer ids every pin must carry
    pub required_peers: Vec<String>,
    pub error_details: Vec<PinFailure>,
}

impl EnsurePinsResult {
    /// Exit code: errors=2, fixes=1, nothing to do=0
    pub fn severity(&self) -> i32 {
        if self.errors > 0 {
            2
        } else if self.fixed > 0 {
            1
        } else {
            0
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "{} pins: {} already correct, {} fixed, {} errors",
            self.total, self.already_correct, self.fixed, self.errors
        )
    }
}

/// Outcome of `tag_pins`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagPinsResult {
    pub checked_at: DateTime<Utc>,
    pub total: usize,
    pub tagged: usize,
    pub skipped: usize,
    pub errors: usize,
    pub dry_run: bool,
    pub error_details: Vec<PinFailure>,
}

impl TagPinsResult {
    /// Exit code: errors=2, tags written=1, nothing to do=0
    pub fn severity(&self) -> i32 {
        if self.errors > 0 {
            2
        } else if self.tagged > 0 {
            1
        } else {
            0
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "{} pins: {} tagged, {} skipped, {} errors",
            self.total, self.tagged, self.skipped, self.errors
        )
    }
}

/// Allocation with the required peers unioned in; existing peers keep their order
pub fn merge_allocations(existing: &[String], required: &[String]) -> Vec<String> {
    let mut merged = existing.to_vec();
    for peer_id in required {
        if !merged.contains(peer_id) {
            merged.push(peer_id.clone());
        }
    }
    merged
}

/// Make sure every pin is allocated to the profile's primary and the backup
#[instrument(skip(client, policy))]
pub async fn ensure_pins<C: ClusterApi + ?Sized>(
    client: &C,
    policy: &Policy,
    profile: &str,
    config: &ScanConfig,
) -> Result<EnsurePinsResult> {
    let required = resolve_allocations(profile, policy)?;
    let pins = client.pins().await?;

    let mut result = EnsurePinsResult {
        checked_at: Utc::now(),
        total: pins.len(),
        already_correct: 0,
        fixed: 0,
        errors: 0,
        dry_run: config.dry_run,
        required_peers: required.clone(),
        error_details: Vec::new(),
    };

    info!(pins = pins.len(), required = ?required, "Ensuring required allocations");

    for pin in &pins {
        if required.iter().all(|id| pin.allocations.contains(id)) {
            result.already_correct += 1;
            continue;
        }

        let allocations = merge_allocations(&pin.allocations, &required);
        debug!(cid = %pin.cid, allocations = ?allocations, "Re-pinning with required peers");

        if config.dry_run {
            result.fixed += 1;
            continue;
        }

        let request = PinRequest::from_pin(pin).with_allocations(allocations);
        match client.pin(&request).await {
            Ok(()) => result.fixed += 1,
            Err(e) => {
                warn!(cid = %pin.cid, error = %e, "Re-pin failed");
                result.errors += 1;
                result.error_details.push(PinFailure {
                    cid: pin.cid.clone(),
                    error: e.to_string(),
                });
            }
        }
        config.throttle().await;
    }

    info!(summary = %result.summary(), "Ensure pins complete");
    Ok(result)
}

/// Backfill org and size tags on pins missing either
#[instrument(skip(client, policy))]
pub async fn tag_pins<C: ClusterApi + ?Sized>(
    client: &C,
    policy: &Policy,
    profile: &str,
    config: &ScanConfig,
) -> Result<TagPinsResult> {
    if policy.profile(profile).is_none() {
        return Err(CcsError::Configuration(format!(
            "Profile '{}' not found in config",
            profile
        )));
    }

    let pins = client.pins().await?;
    let mut result = TagPinsResult {
        checked_at: Utc::now(),
        total: pins.len(),
        tagged: 0,
        skipped: 0,
        errors: 0,
        dry_run: config.dry_run,
        error_details: Vec::new(),
    };

    info!(pins = pins.len(), profile, "Tagging pins");

    for pin in &pins {
        if pin.org().is_some() && pin.size_tag().is_some() {
            result.skipped += 1;
            continue;
        }

        let Some(metadata) = tagged_metadata(client, pin, profile).await else {
            result.errors += 1;
            result.error_details.push(PinFailure {
                cid: pin.cid.clone(),
                error: "size lookup failed and org already set".to_string(),
            });
            continue;
        };

        if config.dry_run {
            result.tagged += 1;
            continue;
        }

        let request = PinRequest::from_pin(pin).with_metadata(metadata);
        match client.pin(&request).await {
            Ok(()) => result.tagged += 1,
            Err(e) => {
                warn!(cid = %pin.cid, error = %e, "Tagging failed");
                result.errors += 1;
                result.error_details.push(PinFailure {
                    cid: pin.cid.clone(),
                    error: e.to_string(),
                });
            }
        }
        config.throttle().await;
    }

    info!(summary = %result.summary(), "Tag pins complete");
    Ok(result)
}

/// Metadata with the missing tags filled in; `None` when nothing can be added
async fn tagged_metadata<C: ClusterApi + ?Sized>(
    client: &C,
    pin: &Pin,
    profile: &str,
) -> Option<std::collections::BTreeMap<String, String>> {
    let mut metadata = pin.metadata.clone();
    let mut changed = false;

    if pin.org().is_none() {
        metadata.insert(META_ORG.to_string(), profile.to_string());
        changed = true;
    }

    if pin.size_tag().is_none() {
        match client.dag_size(&pin.cid).await {
            Ok(size) => {
                metadata.insert(META_SIZE.to_string(), size.to_string());
                changed = true;
            }
            Err(e) => warn!(cid = %pin.cid, error = %e, "Size lookup failed"),
        }
    }

    changed.then_some(metadata)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_keeps_existing() {
        let existing = vec!["X".to_string(), "Y".to_string()];
        let required = vec!["A".to_string(), "X".to_string(), "B".to_string()];
        assert_eq!(merge_allocations(&existing, &required), vec!["X", "Y", "A", "B"]);
    }

    #[test]
    fn test_severities() {
        let mut ensure = EnsurePinsResult {
            checked_at: Utc::now(),
            total: 2,
            already_correct: 2,
            fixed: 0,
            errors: 0,
            dry_run: false,
            required_peers: Vec::new(),
            error_details: Vec::new(),
        };
        assert_eq!(ensure.severity(), 0);
        ensure.fixed = 1;
        assert_eq!(ensure.severity(), 1);
        ensure.errors = 1;
        assert_eq!(ensure.severity(), 2);
    }
}
