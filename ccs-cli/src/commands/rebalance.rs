//! Rebalance Command
//!
//! Converges every pin to the policy's replication bounds, with a progress
//! bar fed by the engine's per-pin callback.

use super::{format_bytes, print_json};
use crate::config::CliContext;
use crate::symbols;
use anyhow::{Context, Result};
use ccs_engine::{RebalanceAction, RebalanceProgress, RebalanceResult, ScanConfig};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

/// Run rebalance command
pub async fn run(ctx: &CliContext, dry_run: bool) -> Result<i32> {
    let client = ctx.cluster()?;
    let config = ScanConfig::from_env().with_dry_run(dry_run);

    let pb = if ctx.json {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new(0);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.green/white}] {pos}/{len} pins {msg}")
                .context("Invalid progress template")?
                .progress_chars("█▓░"),
        );
        pb
    };

    let report = |progress: RebalanceProgress| {
        pb.set_length(progress.total as u64);
        pb.set_position(progress.done as u64);
        if progress.action != RebalanceAction::AlreadyCorrect {
            pb.set_message(progress.cid);
        }
    };

    let result = ccs_engine::rebalance(&client, &ctx.policy, &config, Some(&report))
        .await
        .context("Rebalance failed")?;
    pb.finish_and_clear();

    if ctx.json {
        print_json(&result)?;
    } else {
        print_result(&result);
    }

    Ok(result.severity())
}

fn print_result(result: &RebalanceResult) {
    if result.dry_run {
        println!("{} Dry run: planned changes only", style(symbols::INFO).cyan());
    }

    for action in &result.actions {
        match action.action {
            RebalanceAction::Error => println!(
                "{} {} {}",
                style(symbols::CROSS).red(),
                action.cid,
                style(action.error.as_deref().unwrap_or("error")).red()
            ),
            _ => println!(
                "{} {} [{}] {} [{}]",
                style(symbols::CHECK).green(),
                action.cid,
                action.before.join(", "),
                symbols::ARROW,
                action.after.join(", ")
            ),
        }
    }

    println!();
    println!(
        "{:<16} {:>12} {:>8} {:>8}",
        style("NODE").bold(),
        style("AVAILABLE").bold(),
        style("BEFORE").bold(),
        style("AFTER").bold()
    );
    for node in &result.nodes {
        println!(
            "{:<16} {:>12} {:>8} {:>8}",
            node.node,
            format_bytes(node.available_bytes),
            node.before,
            node.after
        );
    }

    println!();
    println!("{}", style("Rebalance Summary:").bold());
    println!(
        "  replication bounds {}..{}",
        result.replication_min, result.replication_max
    );
    println!("  {}", result.summary());
}
