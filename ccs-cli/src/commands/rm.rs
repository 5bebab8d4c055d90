//! Remove Command
//!
//! Unpins a cid from the whole cluster.

use crate::config::CliContext;
use crate::symbols;
use anyhow::{Context, Result};
use console::style;

/// Remove configuration
pub struct RmConfig {
    pub cid: String,
    pub force: bool,
}

/// Run rm command
pub async fn run(ctx: &CliContext, config: RmConfig) -> Result<i32> {
    let client = ctx.cluster()?;

    // Show what would go before removing
    let pin = ccs_engine::status(&client, &config.cid)
        .await
        .with_context(|| format!("Failed to check {}", config.cid))?;

    if !config.force {
        println!("{} About to unpin: {}", style("Warning:").yellow(), pin.cid);
        if let Some(name) = &pin.name {
            println!("  Name: {}", name);
        }
        println!("  Pinned on {} peers", pin.pinned_count());
        println!("\nUse --force to unpin without confirmation.");
        return Ok(0);
    }

    ccs_engine::remove(&client, &config.cid)
        .await
        .context("Failed to unpin")?;

    println!("{} Unpinned: {}", style(symbols::CHECK).green(), config.cid);
    Ok(0)
}
