// SPDX-License-Identifier: MIT OR Apache-2.0
//! Output formatting utilities for the Rollup CLI.

use clap::ValueEnum;
use rollup_blast::BlastRadiusResult;
use rollup_core::rollup::{ExecutionPhase, RollupConfig, RollupExecution, RollupStatus};

/// Supported output formats for CLI display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[clap(rename_all = "kebab-case")]
pub enum OutputFormat {
    /// Pretty-printed JSON.
    Json,
    /// Human-readable multi-line text.
    Text,
    /// Key-value aligned table.
    Table,
}

/// Formats rollup domain types for CLI output.
#[derive(Debug, Clone, Copy)]
pub struct Formatter {
    format: OutputFormat,
}

impl Formatter {
    #[must_use]
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    #[must_use]
    pub fn format_rollup(&self, config: &RollupConfig) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(config).unwrap_or_default(),
            OutputFormat::Text => format_rollup_text(config),
            OutputFormat::Table => format_rollup_table(config),
        }
    }

    #[must_use]
    pub fn format_rollups(&self, configs: &[RollupConfig]) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(configs).unwrap_or_default(),
            OutputFormat::Text | OutputFormat::Table => configs.iter().map(format_rollup_table).collect::<Vec<_>>().join("\n---\n"),
        }
    }

    #[must_use]
    pub fn format_execution(&self, execution: &RollupExecution) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(execution).unwrap_or_default(),
            OutputFormat::Text => format_execution_text(execution),
            OutputFormat::Table => format_execution_table(execution),
        }
    }

    #[must_use]
    pub fn format_executions(&self, executions: &[RollupExecution]) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(executions).unwrap_or_default(),
            OutputFormat::Text | OutputFormat::Table => executions.iter().map(format_execution_table).collect::<Vec<_>>().join("\n---\n"),
        }
    }

    #[must_use]
    pub fn format_blast_radius(&self, result: &BlastRadiusResult) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(result).unwrap_or_default(),
            OutputFormat::Text => format_blast_radius_text(result),
            OutputFormat::Table => format_blast_radius_table(result),
        }
    }

    #[must_use]
    pub fn format_error(&self, err: &str) -> String {
        match self.format {
            OutputFormat::Json => serde_json::json!({"error": err}).to_string(),
            OutputFormat::Text => format!("Error: {err}"),
            OutputFormat::Table => format!("error  {err}"),
        }
    }
}

fn status_str(s: RollupStatus) -> &'static str {
    match s {
        RollupStatus::Active => "active",
        RollupStatus::Archived => "archived",
    }
}

fn phase_str(p: ExecutionPhase) -> &'static str {
    match p {
        ExecutionPhase::Queued => "queued",
        ExecutionPhase::Fetching => "fetching",
        ExecutionPhase::Matching => "matching",
        ExecutionPhase::Merging => "merging",
        ExecutionPhase::Storing => "storing",
        ExecutionPhase::Completed => "completed",
        ExecutionPhase::Failed => "failed",
        ExecutionPhase::Cancelled => "cancelled",
    }
}

fn format_rollup_text(c: &RollupConfig) -> String {
    format!(
        "ID: {}\nName: {}\nStatus: {}\nVersion: {}\nRepositories: {}\nMatchers: {}",
        c.id,
        c.name,
        status_str(c.status),
        c.version,
        c.repository_ids.len(),
        c.matchers.len(),
    )
}

fn format_rollup_table(c: &RollupConfig) -> String {
    let mut lines = Vec::new();
    lines.push(format!("{:<14} {}", "id", c.id));
    lines.push(format!("{:<14} {}", "name", c.name));
    lines.push(format!("{:<14} {}", "status", status_str(c.status)));
    lines.push(format!("{:<14} {}", "version", c.version));
    lines.push(format!("{:<14} {}", "repositories", c.repository_ids.len()));
    lines.push(format!("{:<14} {}", "matchers", c.matchers.len()));
    if let Some(ref schedule) = c.schedule {
        lines.push(format!("{:<14} {schedule}", "schedule"));
    }
    lines.join("\n")
}

fn format_execution_text(e: &RollupExecution) -> String {
    format!(
        "ID: {}\nRollup: {}\nPhase: {}\nStarted: {}\nRepositories fetched: {}\nMerged nodes: {}",
        e.id,
        e.rollup_id,
        phase_str(e.phase),
        e.started_at,
        e.stats.repositories_fetched,
        e.stats.merged_nodes,
    )
}

fn format_execution_table(e: &RollupExecution) -> String {
    let mut lines = Vec::new();
    lines.push(format!("{:<20} {}", "id", e.id));
    lines.push(format!("{:<20} {}", "rollup_id", e.rollup_id));
    lines.push(format!("{:<20} {}", "phase", phase_str(e.phase)));
    lines.push(format!("{:<20} {}", "repositories_fetched", e.stats.repositories_fetched));
    lines.push(format!("{:<20} {}", "merged_nodes", e.stats.merged_nodes));
    lines.push(format!("{:<20} {}", "merged_edges", e.stats.merged_edges));
    if let Some(ref err) = e.error {
        lines.push(format!("{:<20} {err}", "error"));
    }
    lines.join("\n")
}

fn format_blast_radius_text(r: &BlastRadiusResult) -> String {
    format!("Risk: {:?}\nImpacted nodes: {}\nTruncated: {}", r.risk_level, r.impacted.len(), r.truncated)
}

fn format_blast_radius_table(r: &BlastRadiusResult) -> String {
    let mut lines = Vec::new();
    lines.push(format!("{:<12} {:?}", "risk", r.risk_level));
    lines.push(format!("{:<12} {}", "impacted", r.impacted.len()));
    lines.push(format!("{:<12} {}", "truncated", r.truncated));
    for node in &r.impacted {
        lines.push(format!("  {:<36} distance={} weight={}", node.node_id, node.distance, node.risk_weight));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollup_core::rollup::RollupConfigBuilder;
    use uuid::Uuid;

    fn sample_config() -> RollupConfig {
        RollupConfigBuilder::new(Uuid::new_v4(), "demo").repository(Uuid::new_v4()).repository(Uuid::new_v4()).build()
    }

    #[test]
    fn json_format_round_trips_through_serde() {
        let config = sample_config();
        let formatter = Formatter::new(OutputFormat::Json);
        let rendered = formatter.format_rollup(&config);
        let parsed: RollupConfig = serde_json::from_str(&rendered).unwrap();
        assert_eq!(parsed.id, config.id);
    }

    #[test]
    fn text_format_contains_name() {
        let config = sample_config();
        let formatter = Formatter::new(OutputFormat::Text);
        assert!(formatter.format_rollup(&config).contains("demo"));
    }

    #[test]
    fn table_format_lists_every_rollup() {
        let configs = vec![sample_config(), sample_config()];
        let formatter = Formatter::new(OutputFormat::Table);
        let rendered = formatter.format_rollups(&configs);
        assert_eq!(rendered.matches("id").count(), 2);
    }
}
