//! Repair Command
//!
//! Recovers pins with errored replicas; reports pins that cannot be recovered.

use super::print_json;
use crate::config::CliContext;
use crate::symbols;
use anyhow::{Context, Result};
use ccs_engine::{RepairResult, ScanConfig};
use console::style;

/// Run repair command
pub async fn run(ctx: &CliContext, dry_run: bool) -> Result<i32> {
    let client = ctx.cluster()?;
    let config = ScanConfig::from_env().with_dry_run(dry_run);

    let result = ccs_engine::repair(&client, &ctx.policy, &config)
        .await
        .context("Repair scan failed")?;

    if ctx.json {
        print_json(&result)?;
    } else {
        print_result(&result);
    }

    Ok(result.severity())
}

fn print_result(result: &RepairResult) {
    if result.dry_run {
        println!("{} Dry run: no recovery triggered", style(symbols::INFO).cyan());
    }

    for pin in &result.broken_pins {
        let (icon, label) = if !pin.recoverable {
            (style(symbols::CROSS).red(), style("lost").red())
        } else if pin.recovered {
            (style(symbols::CHECK).green(), style("recovering").green())
        } else if pin.recover_error.is_some() {
            (style(symbols::CROSS).red(), style("recover failed").red())
        } else {
            (style(symbols::WARN).yellow(), style("recoverable").yellow())
        };
        println!(
            "{} {} {} (errors on: {})",
            icon,
            pin.cid,
            label,
            pin.error_nodes.join(", ")
        );
        if let Some(error) = &pin.recover_error {
            println!("    {}", style(error).dim());
        }
    }

    if !result.broken_pins.is_empty() {
        println!();
    }
    println!("{}", style("Repair Summary:").bold());
    println!("  {} pins checked", result.total_pins);
    println!("  {} broken", result.broken);
    println!("  {} recoverable", style(result.recoverable).yellow());
    if result.lost > 0 {
        println!("  {} lost", style(result.lost).red());
    }
    if !result.dry_run {
        println!("  {} recovered", style(result.recovered).green());
        if result.recover_errors > 0 {
            println!("  {} recover errors", style(result.recover_errors).red());
        }
    }
}
