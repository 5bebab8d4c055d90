//! Add Command
//!
//! Adds a file or directory pinned to the profile's primary and the backup.

use super::{format_bytes, print_json};
use crate::config::CliContext;
use crate::symbols;
use anyhow::{Context, Result};
use ccs_engine::{AddOptions, AddOutcome, AddResult, HttpClusterClient};
use console::style;
use std::path::PathBuf;

/// Add configuration
pub struct AddConfig {
    pub path: PathBuf,
    pub profile: String,
    pub recursive: bool,
    /// Write the result manifest here
    pub output_json: Option<PathBuf>,
}

/// Run add command
pub async fn run(ctx: &CliContext, config: AddConfig) -> Result<i32> {
    let mut options = AddOptions::new(&config.path, &config.profile).with_host(ctx.host.clone());
    options.recursive = config.recursive;

    let result = ccs_engine::add(
        |host| HttpClusterClient::new(host, ctx.policy.auth.clone(), ctx.transport.clone()),
        &ctx.policy,
        &options,
    )
    .await;

    if let Some(path) = &config.output_json {
        let json = result.to_json()?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write manifest to {}", path.display()))?;
    }

    if ctx.json {
        print_json(&result)?;
    } else {
        print_result(&result);
    }

    Ok(result.exit_code())
}

fn print_result(result: &AddResult) {
    let (icon, label) = match result.outcome {
        AddOutcome::Success => (style(symbols::CHECK).green(), style("Added").green().bold()),
        AddOutcome::Partial => (style(symbols::WARN).yellow(), style("Added (partial)").yellow().bold()),
        AddOutcome::Failed => (style(symbols::CROSS).red(), style("Add failed").red().bold()),
        AddOutcome::ConfigError => (style(symbols::CROSS).red(), style("Configuration error").red().bold()),
    };
    println!("{} {} {}", icon, label, result.root_path);

    if !result.root_cid.is_empty() {
        println!("  Root CID:    {}", style(&result.root_cid).cyan());
        println!("  Entries:     {}", result.entries.len());
        let size = result.root_entry().map_or(0, |e| e.size);
        println!("  Size:        {}", format_bytes(size));
        println!("  Host:        {}", result.cluster_host);
        if let Some(count) = result.replica_count {
            println!("  Replicas:    {}", count);
        }
    }

    if let Some(note) = &result.note {
        println!("  {}", style(note).dim());
    }
    if let Some(error) = &result.error {
        println!("  {} {}", style("Error:").red(), error);
    }
}
