//! CCS CLI
//!
//! Command-line front end for the cluster policy engine.
//!
//! # Commands
//! - `add` - Add a file or directory with primary + backup allocations
//! - `status` - Show replication status of a cid
//! - `peers` - List cluster peers
//! - `ls` - List all pins
//! - `health` - Cluster health report
//! - `repair` - Recover pins with errored replicas
//! - `rebalance` - Converge allocations to the replication bounds
//! - `ensure-pins` - Add a profile's required peers to every pin
//! - `tag-pins` - Backfill org/size metadata tags
//! - `get` - Download content by cid
//! - `rm` - Unpin a cid
//! - `config` - Show, locate or validate the policy file
//!
//! # Configuration
//! Policy file: ~/.ccs/config.yml (or `--config-file`, or `CCS_CONFIG`)
//!
//! # Exit codes
//! The operation's severity: 0 nothing to do / success, 1 changes applied or
//! partial, 2 attention needed, 3 configuration error.

use anyhow::Result;
use ccs_core::CcsError;
use clap::{Parser, Subcommand};
use console::style;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod symbols;

use commands::{add, get, health, migrate, rebalance, repair, rm, status};
use config::CliContext;

#[derive(Parser)]
#[command(name = "ccs")]
#[command(about = "Community cloud storage cluster management")]
#[command(version)]
struct Cli {
    /// Policy file (YAML, or TOML when it ends in .toml)
    #[arg(long, global = true, env = "CCS_CONFIG")]
    config_file: Option<PathBuf>,

    /// Node name or hostname to send requests to
    #[arg(long, global = true, value_parser = config::parse_host)]
    host: Option<String>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a file or directory to the cluster
    Add {
        /// Path to file or directory
        path: PathBuf,

        /// Organization profile owning the content
        #[arg(short, long)]
        profile: String,

        /// Do not descend into directories
        #[arg(long)]
        no_recursive: bool,

        /// Write the add result manifest as JSON
        #[arg(long)]
        output_json: Option<PathBuf>,
    },

    /// Show replication status of a cid
    Status {
        cid: String,
    },

    /// List cluster peers
    Peers,

    /// List all pins
    Ls,

    /// Cluster health report
    Health,

    /// Recover pins with errored replicas
    Repair {
        /// Report without triggering recovery
        #[arg(long)]
        dry_run: bool,
    },

    /// Rebalance pin allocations across nodes
    Rebalance {
        /// Plan without re-pinning
        #[arg(long)]
        dry_run: bool,
    },

    /// Make sure every pin includes a profile's primary and the backup
    EnsurePins {
        #[arg(short, long)]
        profile: String,

        #[arg(long)]
        dry_run: bool,
    },

    /// Backfill org and size tags on existing pins
    TagPins {
        /// Org recorded on untagged pins
        #[arg(short, long)]
        profile: String,

        #[arg(long)]
        dry_run: bool,
    },

    /// Download content by cid
    Get {
        cid: String,

        /// Prefer this profile's primary as the source
        #[arg(short, long)]
        profile: Option<String>,

        /// Output path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Unpin a cid from the cluster
    Rm {
        cid: String,

        /// Unpin without confirmation
        #[arg(short, long)]
        force: bool,
    },

    /// Show, locate or validate the policy file
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the loaded policy
    Show,

    /// Show policy file path
    Path,

    /// Check the policy for errors and warnings
    Validate,
}

fn init_tracing(debug: bool) {
    let debug = debug
        || std::env::var("CCS_DEBUG")
            .map(|v| v == "1" || v == "true")
            .unwrap_or(false);
    let default_level = if debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(default_level.into()))
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", style(symbols::CROSS).red(), e);
            exit_code_for(&e)
        }
    };

    std::process::exit(code);
}

/// Exit code for a command that could not produce a result
fn exit_code_for(error: &anyhow::Error) -> i32 {
    match error.downcast_ref::<CcsError>() {
        Some(e) if e.is_config() => 3,
        _ => 2,
    }
}

async fn run(cli: Cli) -> Result<i32> {
    if let Commands::Config { command } = &cli.command {
        return handle_config_command(cli.config_file.as_deref(), command.as_ref());
    }

    let ctx = CliContext::load(cli.config_file.as_deref(), cli.host, cli.json)?;

    match cli.command {
        Commands::Add {
            path,
            profile,
            no_recursive,
            output_json,
        } => {
            let config = add::AddConfig {
                path,
                profile,
                recursive: !no_recursive,
                output_json,
            };
            add::run(&ctx, config).await
        }

        Commands::Status { cid } => status::status(&ctx, &cid).await,
        Commands::Peers => status::peers(&ctx).await,
        Commands::Ls => status::ls(&ctx).await,
        Commands::Health => health::run(&ctx).await,
        Commands::Repair { dry_run } => repair::run(&ctx, dry_run).await,
        Commands::Rebalance { dry_run } => rebalance::run(&ctx, dry_run).await,

        Commands::EnsurePins { profile, dry_run } => {
            migrate::ensure_pins(&ctx, &profile, dry_run).await
        }
        Commands::TagPins { profile, dry_run } => migrate::tag_pins(&ctx, &profile, dry_run).await,

        Commands::Get {
            cid,
            profile,
            output,
        } => {
            let config = get::GetConfig {
                cid,
                profile,
                output,
            };
            get::run(&ctx, config).await
        }

        Commands::Rm { cid, force } => rm::run(&ctx, rm::RmConfig { cid, force }).await,

        Commands::Config { .. } => Ok(0),
    }
}

/// Handle config subcommands
fn handle_config_command(
    config_file: Option<&std::path::Path>,
    command: Option<&ConfigCommands>,
) -> Result<i32> {
    let path = ccs_core::resolve_policy_path(config_file)?;

    match command {
        Some(ConfigCommands::Path) => {
            println!("{}", path.display());
            Ok(0)
        }

        None | Some(ConfigCommands::Show) => {
            let policy = ccs_core::load_policy(Some(&path))?;
            println!();
            println!("{}", style("CCS Policy").bold().underlined());
            println!();
            println!("{} {}", style("Policy file:").dim(), path.display());
            println!(
                "  backup_node     = {}",
                policy.backup_node.as_deref().unwrap_or("(unset)")
            );
            println!(
                "  default_node    = {}",
                policy.default_node.as_deref().unwrap_or("(unset)")
            );
            println!("  replication_min = {}", policy.replication_min);
            println!("  replication_max = {}", policy.replication_max);
            println!(
                "  auth            = {}",
                policy
                    .auth
                    .as_ref()
                    .map_or("(none)".to_string(), |a| format!("{} / ********", a.user))
            );
            println!();
            println!("{}", style("[nodes]").cyan());
            for node in policy.nodes.values() {
                println!(
                    "  {:<12} {:<28} {:<54} reserved {} GB",
                    node.name,
                    node.host,
                    node.peer_id.as_deref().unwrap_or("(no peer_id)"),
                    node.reserved_min_gb
                );
            }
            println!();
            println!("{}", style("[profiles]").cyan());
            for profile in policy.profiles.values() {
                println!("  {:<12} primary = {}", profile.name, profile.primary);
            }
            Ok(0)
        }

        Some(ConfigCommands::Validate) => {
            let policy = ccs_core::load_policy(Some(&path))?;
            let (errors, warnings) = policy.validate();

            for warning in &warnings {
                println!("{} {}", style(symbols::WARN).yellow(), warning);
            }
            for error in &errors {
                println!("{} {}", style(symbols::CROSS).red(), error);
            }

            if errors.is_empty() {
                println!(
                    "{} {} is valid ({} warnings)",
                    style(symbols::CHECK).green(),
                    path.display(),
                    warnings.len()
                );
                Ok(0)
            } else {
                Ok(3)
            }
        }
    }
}
