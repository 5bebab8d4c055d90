//! Migration Commands
//!
//! `ensure-pins` adds a profile's required peers to every pin;
//! `tag-pins` backfills org and size tags.

use super::print_json;
use crate::config::CliContext;
use crate::symbols;
use anyhow::{Context, Result};
use ccs_engine::{PinFailure, ScanConfig};
use console::style;

/// Run ensure-pins command
pub async fn ensure_pins(ctx: &CliContext, profile: &str, dry_run: bool) -> Result<i32> {
    let client = ctx.cluster()?;
    let config = ScanConfig::from_env().with_dry_run(dry_run);

    let result = ccs_engine::ensure_pins(&client, &ctx.policy, profile, &config)
        .await
        .context("ensure-pins failed")?;

    if ctx.json {
        print_json(&result)?;
        return Ok(result.severity());
    }

    if result.dry_run {
        println!("{} Dry run: no pins updated", style(symbols::INFO).cyan());
    }
    println!(
        "Required peers for '{}': {}",
        style(profile).cyan(),
        result.required_peers.join(", ")
    );
    print_failures(&result.error_details);
    println!(
        "{} {}",
        style(symbols::CHECK).green(),
        result.summary()
    );

    Ok(result.severity())
}

/// Run tag-pins command
pub async fn tag_pins(ctx: &CliContext, profile: &str, dry_run: bool) -> Result<i32> {
    let client = ctx.cluster()?;
    let config = ScanConfig::from_env().with_dry_run(dry_run);

    let result = ccs_engine::tag_pins(&client, &ctx.policy, profile, &config)
        .await
        .context("tag-pins failed")?;

    if ctx.json {
        print_json(&result)?;
        return Ok(result.severity());
    }

    if result.dry_run {
        println!("{} Dry run: no pins updated", style(symbols::INFO).cyan());
    }
    print_failures(&result.error_details);
    println!(
        "{} {}",
        style(symbols::CHECK).green(),
        result.summary()
    );

    Ok(result.severity())
}

fn print_failures(failures: &[PinFailure]) {
    for failure in failures {
        println!(
            "{} {}: {}",
            style(symbols::CROSS).red(),
            failure.cid,
            failure.error
        );
    }
}
