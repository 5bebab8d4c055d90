//! Health Command
//!
//! Cluster-wide health: peer reachability, per-node pin counters and the
//! list of pin errors.

use super::print_json;
use crate::config::CliContext;
use crate::symbols;
use anyhow::{Context, Result};
use ccs_engine::{HealthReport, HealthStatus};
use console::style;

/// Run health command
pub async fn run(ctx: &CliContext) -> Result<i32> {
    let client = ctx.cluster()?;
    let report = ccs_engine::check_health(&client)
        .await
        .context("Cluster unreachable")?;

    if ctx.json {
        print_json(&report)?;
    } else {
        print_report(&report);
    }

    Ok(report.severity())
}

fn status_style(status: HealthStatus) -> console::StyledObject<&'static str> {
    match status {
        HealthStatus::Ok => style(status.as_str()).green(),
        HealthStatus::Degraded => style(status.as_str()).yellow(),
        HealthStatus::Error => style(status.as_str()).red(),
    }
}

fn print_report(report: &HealthReport) {
    println!("{}", style("Cluster Health").bold().underlined());
    println!();
    println!("Status: {}", status_style(report.status));
    println!(
        "Peers:  {}/{} online",
        style(report.peers.online).cyan(),
        report.peers.total
    );
    println!("Pins:   {}", style(report.pins.total).cyan());
    println!();

    println!(
        "{:<16} {:<10} {:>8} {:>8} {:>8}",
        style("NODE").bold(),
        style("STATUS").bold(),
        style("PINNED").bold(),
        style("REMOTE").bold(),
        style("ERRORS").bold()
    );
    for node in &report.nodes {
        println!(
            "{:<16} {:<10} {:>8} {:>8} {:>8}",
            node.name,
            status_style(node.status),
            node.pinned,
            node.remote,
            node.pin_error
        );
        if let Some(error) = &node.error {
            println!("  {} {}", style(symbols::CROSS).red(), style(error).dim());
        }
    }

    if !report.pin_errors.is_empty() {
        println!();
        println!("{}", style("Pin errors:").bold());
        for record in &report.pin_errors {
            println!(
                "  {} {} on {}: {}",
                style(symbols::CROSS).red(),
                record.cid,
                record.node,
                record.error
            );
        }
        println!(
            "\n{} Run '{}' to recover",
            style(symbols::INFO).cyan(),
            style("ccs repair").green()
        );
    }

    for error in &report.errors {
        println!("{} {}", style(symbols::WARN).yellow(), error);
    }
}
