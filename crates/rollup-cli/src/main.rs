// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]

mod commands;
mod config;
mod format;
mod provider;
mod state;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rollup_core::rollup::ExecutionPhase;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use format::{Formatter, OutputFormat};

/// Exit code for runtime errors (service/validation failures).
const EXIT_RUNTIME_ERROR: i32 = 1;

#[derive(Parser, Debug)]
#[command(name = "rollup", version, about = "Rollup Execution Core CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Tenant every call is scoped to.
    #[arg(long, global = true)]
    tenant: Uuid,

    /// Caller identity recorded in the audit trail.
    #[arg(long, global = true, default_value = "cli")]
    actor: String,

    /// Output format.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Path to a `rollup.toml` configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(long, global = true)]
    debug: bool,
}

#[allow(clippy::large_enum_variant)]
#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a new rollup.
    Create {
        #[arg(long)]
        name: String,
        /// Repository id to include. Repeat for each repository (2 minimum).
        #[arg(long = "repository")]
        repositories: Vec<Uuid>,
        /// `type=<matcher_type>[,pattern=...][,priority=...][,min_confidence=...]`. Repeat per matcher.
        #[arg(long = "matcher")]
        matchers: Vec<String>,
        #[arg(long)]
        schedule: Option<String>,
    },

    /// Update an existing rollup under optimistic concurrency.
    Update {
        id: Uuid,
        /// The version the caller last observed; rejected with a
        /// `RES_VERSION_CONFLICT` if the stored version has moved on.
        #[arg(long)]
        version: u64,
        #[arg(long)]
        name: Option<String>,
        /// Replaces the full repository list if given at least once.
        #[arg(long = "repository")]
        repositories: Vec<Uuid>,
        /// Replaces the full matcher list if given at least once.
        #[arg(long = "matcher")]
        matchers: Vec<String>,
        #[arg(long)]
        schedule: Option<String>,
        /// Clears an existing schedule. Ignored if `--schedule` is also given.
        #[arg(long)]
        clear_schedule: bool,
    },

    /// Archive a rollup.
    Delete { id: Uuid },

    /// Start a new execution for a rollup.
    Run {
        id: Uuid,
        /// Scan id to fetch for each configured repository. Repeatable.
        #[arg(long = "scan")]
        scans: Vec<Uuid>,
        /// Enqueue and return immediately instead of running to completion.
        #[arg(long)]
        r#async: bool,
        #[arg(long, default_value = "normal")]
        priority: String,
    },

    /// Show one execution's current state.
    Status { execution_id: Uuid },

    /// List rollups for the tenant, or executions for one rollup with `--rollup`.
    List {
        #[arg(long)]
        rollup: Option<Uuid>,
        /// Narrows `--rollup` output to one phase (e.g. `completed`).
        #[arg(long)]
        phase: Option<String>,
    },

    /// Run a bounded blast-radius query against a completed execution's merged graph.
    BlastRadius {
        execution_id: Uuid,
        /// Canonical node id to start the traversal from. Repeatable.
        #[arg(long = "seed", required = true)]
        seeds: Vec<String>,
        #[arg(long, default_value_t = 3)]
        max_depth: u32,
        #[arg(long, default_value_t = 1_000)]
        max_nodes: usize,
        /// Report only seeds and their direct dependents.
        #[arg(long)]
        exclude_indirect: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.debug { EnvFilter::new("rollup=debug") } else { EnvFilter::new("rollup=info") };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let formatter = Formatter::new(cli.format);
    if let Err(e) = run(cli).await {
        eprintln!("{}", formatter.format_error(&format!("{e:#}")));
        std::process::exit(EXIT_RUNTIME_ERROR);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let formatter = Formatter::new(cli.format);
    let cli_config = config::load_config(cli.config.as_deref())?;
    if let Err(errors) = config::validate_config(&cli_config) {
        for e in &errors {
            tracing::warn!("config: {e}");
        }
        anyhow::bail!("invalid configuration");
    }

    let (service, local_state) = commands::build_service(&cli_config, cli.tenant).context("build rollup service")?;

    match cli.command {
        Commands::Create { name, repositories, matchers, schedule } => {
            let matchers = matchers.iter().map(|m| commands::parse_matcher(m)).collect::<Result<Vec<_>>>()?;
            let id = commands::create(&cli.actor, &service, cli.tenant, name, repositories, matchers, schedule)?;
            local_state.save()?;
            println!("{id}");
        }

        Commands::Update { id, version, name, repositories, matchers, schedule, clear_schedule } => {
            let repository_ids = if repositories.is_empty() { None } else { Some(repositories) };
            let matchers = if matchers.is_empty() {
                None
            } else {
                Some(matchers.iter().map(|m| commands::parse_matcher(m)).collect::<Result<Vec<_>>>()?)
            };
            let schedule = if schedule.is_some() {
                Some(schedule)
            } else if clear_schedule {
                Some(None)
            } else {
                None
            };
            commands::update(&cli.actor, &service, cli.tenant, id, version, name, repository_ids, matchers, schedule)?;
            local_state.save()?;
            println!("updated");
        }

        Commands::Delete { id } => {
            commands::delete(&cli.actor, &service, cli.tenant, id)?;
            local_state.save()?;
            println!("deleted");
        }

        Commands::Run { id, scans, r#async, priority } => {
            let priority = commands::priority_from_str(&priority)?;
            let execution_id = commands::run(&cli.actor, &service, cli.tenant, id, scans, r#async, priority).await?;
            local_state.save()?;
            println!("{execution_id}");
        }

        Commands::Status { execution_id } => {
            let execution = commands::status(&service, cli.tenant, execution_id)?;
            println!("{}", formatter.format_execution(&execution));
        }

        Commands::List { rollup, phase } => match rollup {
            Some(rollup_id) => {
                let phase = phase.map(|p| parse_phase(&p)).transpose()?;
                let executions = commands::list_executions(&service, cli.tenant, rollup_id, phase)?;
                println!("{}", formatter.format_executions(&executions));
            }
            None => {
                let rollups = commands::list_rollups(&service, cli.tenant);
                println!("{}", formatter.format_rollups(&rollups));
            }
        },

        Commands::BlastRadius { execution_id, seeds, max_depth, max_nodes, exclude_indirect } => {
            let result = commands::blast_radius(&cli.actor, &service, cli.tenant, execution_id, seeds, max_depth, max_nodes, !exclude_indirect).await?;
            println!("{}", formatter.format_blast_radius(&result));
        }
    }

    Ok(())
}

fn parse_phase(s: &str) -> Result<ExecutionPhase> {
    Ok(match s {
        "queued" => ExecutionPhase::Queued,
        "fetching" => ExecutionPhase::Fetching,
        "matching" => ExecutionPhase::Matching,
        "merging" => ExecutionPhase::Merging,
        "storing" => ExecutionPhase::Storing,
        "completed" => ExecutionPhase::Completed,
        "failed" => ExecutionPhase::Failed,
        "cancelled" => ExecutionPhase::Cancelled,
        other => anyhow::bail!("unknown phase '{other}'"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_phase_accepts_every_documented_value() {
        for s in ["queued", "fetching", "matching", "merging", "storing", "completed", "failed", "cancelled"] {
            assert!(parse_phase(s).is_ok(), "{s} should parse");
        }
    }

    #[test]
    fn parse_phase_rejects_unknown_value() {
        assert!(parse_phase("nope").is_err());
    }
}
