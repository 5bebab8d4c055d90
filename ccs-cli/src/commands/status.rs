//! Status Commands
//!
//! `status <cid>`, `peers` and `ls`: read-only views of the cluster.

use super::{print_json, truncate};
use crate::config::CliContext;
use crate::symbols;
use anyhow::{Context, Result};
use ccs_core::{Pin, PinState};
use console::style;

/// Run status command for one cid
pub async fn status(ctx: &CliContext, cid: &str) -> Result<i32> {
    let client = ctx.cluster()?;
    let pin = ccs_engine::status(&client, cid)
        .await
        .with_context(|| format!("Failed to get status of {}", cid))?;

    if ctx.json {
        print_json(&pin)?;
        return Ok(0);
    }

    println!("{}", style(format!("Pin {}", pin.cid)).bold().underlined());
    if let Some(name) = &pin.name {
        println!("  Name:         {}", name);
    }
    if let Some(org) = pin.org() {
        println!("  Org:          {}", org);
    }
    if let Some(size) = pin.size_tag() {
        println!("  Size:         {}", size);
    }
    println!(
        "  Replication:  {} pinned / {} allocated",
        style(pin.pinned_count()).cyan(),
        pin.allocations.len()
    );
    println!();

    for (peer_id, status) in &pin.peer_map {
        let name = ctx
            .policy
            .node_by_peer_id(peer_id)
            .map(|n| n.name.as_str())
            .unwrap_or(status.peername.as_str());
        let state = match status.status {
            PinState::Pinned => style(status.status.as_str()).green(),
            s if s.is_error() => style(status.status.as_str()).red(),
            _ => style(status.status.as_str()).yellow(),
        };
        print!("  {:<16} {}", name, state);
        if let Some(error) = &status.error {
            print!("  {}", style(error).dim());
        }
        println!();
    }

    Ok(0)
}

/// Run peers command
pub async fn peers(ctx: &CliContext) -> Result<i32> {
    let client = ctx.cluster()?;
    let peers = ccs_engine::peers(&client)
        .await
        .context("Failed to list peers")?;

    if ctx.json {
        print_json(&peers)?;
        return Ok(0);
    }

    println!(
        "{:<16} {:<54} {}",
        style("NAME").bold(),
        style("PEER ID").bold(),
        style("STATUS").bold()
    );
    println!("{}", symbols::HLINE.repeat(7));

    for peer in &peers {
        let status = match &peer.error {
            None => style("online".to_string()).green(),
            Some(e) => style(format!("offline ({})", e)).red(),
        };
        println!("{:<16} {:<54} {}", peer.name, peer.peer_id, status);
    }

    println!();
    println!("{} peers", style(peers.len()).green());
    Ok(0)
}

/// Run ls command
pub async fn ls(ctx: &CliContext) -> Result<i32> {
    let client = ctx.cluster()?;
    let pins = ccs_engine::ls(&client).await.context("Failed to list pins")?;

    if ctx.json {
        print_json(&pins)?;
        return Ok(0);
    }

    if pins.is_empty() {
        println!("{} No pins in the cluster", style("Info:").cyan());
        return Ok(0);
    }

    println!(
        "{:<48} {:<24} {:<10} {}",
        style("CID").bold(),
        style("NAME").bold(),
        style("ORG").bold(),
        style("PINNED").bold()
    );
    println!("{}", "-".repeat(92));

    for pin in &pins {
        print_pin_row(pin);
    }

    println!("{}", "-".repeat(92));
    println!("{} pins", style(pins.len()).green());
    Ok(0)
}

fn print_pin_row(pin: &Pin) {
    let replication = format!("{}/{}", pin.pinned_count(), pin.allocations.len());
    let replication = if pin.is_fully_pinned() {
        style(replication).green()
    } else {
        style(replication).yellow()
    };
    println!(
        "{:<48} {:<24} {:<10} {}",
        truncate(&pin.cid, 48),
        truncate(pin.name.as_deref().unwrap_or("-"), 24),
        pin.org().unwrap_or("-"),
        replication
    );
}
