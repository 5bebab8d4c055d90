//! Retrieval
//!
//! Downloads a cid from a node that has it pinned. Sources are tried in
//! preference order: the profile's primary, then the backup, then any other
//! configured node.

use crate::cluster::{ClusterApi, DownloadInfo};
use ccs_core::{CcsError, PinState, Policy, Result};
use std::path::Path;
use tracing::{info, instrument, warn};

/// Configured node names holding a pinned replica, best source first
pub fn download_sources(
    pin: &ccs_core::Pin,
    policy: &Policy,
    profile: Option<&str>,
) -> Result<Vec<String>> {
    let primary = match profile {
        Some(p) => {
            let profile = policy.profile(p).ok_or_else(|| {
                CcsError::Configuration(format!("Profile '{}' not found in config", p))
            })?;
            Some(profile.primary.as_str())
        }
        None => None,
    };
    let backup = policy.backup_node.as_deref();

    let mut sources: Vec<String> = pin
        .peer_map
        .iter()
        .filter(|(_, status)| status.status == PinState::Pinned)
        .filter_map(|(peer_id, _)| policy.node_by_peer_id(peer_id))
        .map(|node| node.name.clone())
        .collect();

    let rank = |name: &str| {
        if Some(name) == primary {
            0
        } else if Some(name) == backup {
            1
        } else {
            2
        }
    };
    // stable: equal ranks keep peer-map order
    sources.sort_by_key(|name| rank(name));
    sources.dedup();

    Ok(sources)
}

/// Download `cid` into `dest`, trying each pinned source until one succeeds
#[instrument(skip(client, policy))]
pub async fn get<C: ClusterApi + ?Sized>(
    client: &C,
    policy: &Policy,
    cid: &str,
    profile: Option<&str>,
    dest: &Path,
) -> Result<DownloadInfo> {
    let pin = client.pin_status(cid).await?;
    let sources = download_sources(&pin, policy, profile)?;

    if sources.is_empty() {
        return Err(CcsError::Validation(format!("No peers have pinned {}", cid)));
    }

    let mut last_error = None;
    for name in &sources {
        let host = policy.host_for(name);
        match client.download(&host, cid, dest).await {
            Ok(info) => {
                info!(source = %name, bytes = info.bytes, directory = info.is_directory, "Downloaded");
                return Ok(info);
            }
            Err(e) => {
                warn!(source = %name, error = %e, "Download failed, trying next source");
                last_error = Some(e);
            }
        }
    }

    match last_error {
        Some(e) => Err(e.into()),
        None => Err(CcsError::Validation(format!("No peers have pinned {}", cid))),
    }
}
