//! Allocation resolution
//!
//! Maps an organization profile to the peers that must hold its content:
//! the profile's primary node followed by the shared backup node.

use ccs_core::{AllocationError, Pin, Policy};

/// Required peer ids for a profile, primary first then backup
pub fn resolve_allocations(profile: &str, policy: &Policy) -> Result<Vec<String>, AllocationError> {
    let profile_config = policy
        .profile(profile)
        .ok_or_else(|| AllocationError::UnknownProfile(profile.to_string()))?;
    let primary = policy
        .node(&profile_config.primary)
        .ok_or_else(|| AllocationError::UnknownPrimary(profile_config.primary.clone()))?;
    let primary_id = primary
        .peer_id
        .clone()
        .ok_or_else(|| AllocationError::PrimaryWithoutPeerId(primary.name.clone()))?;

    let backup_name = policy
        .backup_node
        .as_deref()
        .ok_or(AllocationError::NoBackup)?;
    let backup = policy
        .node(backup_name)
        .ok_or_else(|| AllocationError::UnknownBackup(backup_name.to_string()))?;
    let backup_id = backup
        .peer_id
        .clone()
        .ok_or_else(|| AllocationError::BackupWithoutPeerId(backup.name.clone()))?;

    Ok(vec![primary_id, backup_id])
}

/// Peers that must never leave a pin's allocation.
///
/// The backup peer always, plus the primary of the profile named in the pin's
/// org tag. Anything the policy cannot resolve is simply not required.
pub fn required_peers_for_pin(pin: &Pin, policy: &Policy) -> Vec<String> {
    let mut required = Vec::with_capacity(2);

    if let Some(id) = policy.backup().and_then(|n| n.peer_id.clone()) {
        required.push(id);
    }

    if let Some(id) = pin
        .org()
        .and_then(|org| policy.primary_for_profile(org))
        .and_then(|n| n.peer_id.clone())
    {
        if !required.contains(&id) {
            required.push(id);
        }
    }

    required
}

/// Node to send requests to: explicit override, then the profile's primary,
/// then the policy default. Node names resolve to their configured host.
pub fn resolve_target_host(
    policy: &Policy,
    profile: Option<&str>,
    host_override: Option<&str>,
) -> Option<String> {
    let name = host_override
        .map(str::to_string)
        .or_else(|| profile.and_then(|p| policy.profile(p)).map(|p| p.primary.clone()))
        .or_else(|| policy.default_node.clone())?;
    Some(policy.host_for(&name))
}
