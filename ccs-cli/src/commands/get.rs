//! Get Command
//!
//! Downloads a cid from a node that has it pinned.

use super::format_bytes;
use crate::config::CliContext;
use crate::symbols;
use anyhow::{Context, Result};
use console::style;
use std::path::PathBuf;

/// Get configuration
pub struct GetConfig {
    pub cid: String,
    /// Prefer this profile's primary as the source
    pub profile: Option<String>,
    /// Output path; defaults to the cid in the current directory
    pub output: Option<PathBuf>,
}

/// Run get command
pub async fn run(ctx: &CliContext, config: GetConfig) -> Result<i32> {
    let client = ctx.cluster()?;
    let dest = config
        .output
        .unwrap_or_else(|| PathBuf::from(&config.cid));

    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    let info = ccs_engine::get(
        &client,
        &ctx.policy,
        &config.cid,
        config.profile.as_deref(),
        &dest,
    )
    .await
    .with_context(|| format!("Failed to download {}", config.cid))?;

    if ctx.json {
        println!(
            "{}",
            serde_json::json!({
                "cid": config.cid,
                "path": info.path.display().to_string(),
                "bytes": info.bytes,
                "is_directory": info.is_directory,
            })
        );
    } else {
        println!(
            "{} Downloaded {} to {} ({}{})",
            style(symbols::CHECK).green(),
            config.cid,
            info.path.display(),
            format_bytes(info.bytes),
            if info.is_directory { ", tar archive" } else { "" }
        );
    }

    Ok(0)
}
