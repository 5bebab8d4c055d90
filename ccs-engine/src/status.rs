//! Status and listing
//!
//! Thin reads over the cluster: a single pin's status, the peer list and
//! the pin list, plus the unpin pass-through used by `ccs rm`.

use crate::cluster::{ClusterApi, ClusterResult};
use ccs_core::{PeerInfo, Pin};
use tracing::{debug, info, instrument};

/// Replication status of one cid
#[instrument(skip(client))]
pub async fn status<C: ClusterApi + ?Sized>(client: &C, cid: &str) -> ClusterResult<Pin> {
    let pin = client.pin_status(cid).await?;
    debug!(pinned = pin.pinned_count(), allocations = pin.allocations.len(), "Pin status");
    Ok(pin)
}

/// Every cluster peer
#[instrument(skip(client))]
pub async fn peers<C: ClusterApi + ?Sized>(client: &C) -> ClusterResult<Vec<PeerInfo>> {
    client.peers().await
}

/// Every pin the cluster tracks
#[instrument(skip(client))]
pub async fn ls<C: ClusterApi + ?Sized>(client: &C) -> ClusterResult<Vec<Pin>> {
    let pins = client.pins().await?;
    debug!(count = pins.len(), "Listed pins");
    Ok(pins)
}

/// Remove a pin from the cluster
#[instrument(skip(client))]
pub async fn remove<C: ClusterApi + ?Sized>(client: &C, cid: &str) -> ClusterResult<()> {
    client.unpin(cid).await?;
    info!(cid, "Unpinned");
    Ok(())
}
