// SPDX-License-Identifier: MIT OR Apache-2.0
//! Library-level command implementations for the Rollup CLI, kept separate
//! from `main.rs` so they can be exercised without spawning the binary.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use rollup_audit::{AuditSink, InMemoryAuditSink};
use rollup_blast::{BlastRadiusConfig, BlastRadiusQuery, BlastRadiusResult};
use rollup_core::model::TenantId;
use rollup_core::rollup::{ExecutionPhase, MatcherConfig, MatcherType, MergeOptions, RollupConfig, RollupExecution};
use rollup_error::RollupResult;
use rollup_executor::{RollupExecutor, CancellationToken};
use rollup_executor::store::{ExecutionStore, MergedGraphStore};
use rollup_queue::{QueuePriority, TenantRateLimiter};
use rollup_retry::RetryConfig;
use rollup_service::store::RollupStore;
use rollup_service::{ExecutionFilter, RollupConfigDraft, RollupPatch, RollupService, RunOptions};
use uuid::Uuid;

use crate::config::CliConfig;
use crate::provider::FileGraphProvider;
use crate::state::LocalState;

/// Constructs a [`RollupService`] and its backing [`LocalState`] for one
/// CLI invocation.
pub fn build_service(cli_config: &CliConfig, tenant_id: TenantId) -> Result<(RollupService, LocalState)> {
    let state = LocalState::load(&cli_config.state.dir, tenant_id).context("load local state")?;

    let provider = Arc::new(FileGraphProvider::new(cli_config.state.graphs_dir.clone()));
    let audit_sink: Arc<dyn AuditSink> = Arc::new(InMemoryAuditSink::new());
    let execution_store: Arc<dyn ExecutionStore> = state.execution_store.clone();
    let graph_store: Arc<dyn MergedGraphStore> = state.graph_store.clone();
    let rollup_store: Arc<dyn RollupStore> = state.rollup_store.clone();

    let index: Arc<dyn rollup_index::IndexHandle> = Arc::new(rollup_index::ExternalObjectIndex::with_in_memory_cache(
        rollup_index::InMemoryIndexStore::default(),
        &rollup_index::CacheConfig::default(),
    ));
    let executor = Arc::new(RollupExecutor::new(
        provider,
        RetryConfig::default(),
        cli_config.executor_config(),
        execution_store.clone(),
        graph_store.clone(),
        audit_sink.clone(),
        index,
    ));
    let rate_limiter = Arc::new(TenantRateLimiter::new(cli_config.rate_limiter_config()));

    let service = RollupService::new(rollup_store, execution_store, graph_store, executor, rate_limiter, audit_sink, BlastRadiusConfig::default(), cli_config.service_config());

    Ok((service, state))
}

/// One `--matcher type=arn,pattern=arn:aws:s3:::*,priority=50,min_confidence=0.8`
/// flag value, parsed into a [`MatcherConfig`].
pub fn parse_matcher(spec: &str) -> Result<MatcherConfig> {
    let mut r#type = None;
    let mut pattern = None;
    let mut priority: u8 = 50;
    let mut min_confidence: f64 = 0.5;
    let mut attributes = BTreeMap::new();

    for field in spec.split(',') {
        let field = field.trim();
        if field.is_empty() {
            continue;
        }
        let (key, value) = field.split_once('=').with_context(|| format!("matcher field '{field}' is not key=value"))?;
        match key {
            "type" => r#type = Some(parse_matcher_type(value)?),
            "pattern" => pattern = Some(value.to_string()),
            "priority" => priority = value.parse().with_context(|| format!("invalid priority '{value}'"))?,
            "min_confidence" => min_confidence = value.parse().with_context(|| format!("invalid min_confidence '{value}'"))?,
            other => {
                attributes.insert(other.to_string(), value.to_string());
            }
        }
    }

    let r#type = r#type.with_context(|| format!("matcher spec '{spec}' is missing a type= field"))?;
    Ok(MatcherConfig { r#type, priority, pattern, attributes, min_confidence })
}

fn parse_matcher_type(s: &str) -> Result<MatcherType> {
    Ok(match s {
        "arn" => MatcherType::Arn,
        "resource_id" => MatcherType::ResourceId,
        "name" => MatcherType::Name,
        "tag" => MatcherType::Tag,
        "path" => MatcherType::Path,
        "content" => MatcherType::Content,
        "ast" => MatcherType::Ast,
        "semantic" => MatcherType::Semantic,
        other => anyhow::bail!("unknown matcher type '{other}' (expected one of: arn, resource_id, name, tag, path, content, ast, semantic)"),
    })
}

pub fn priority_from_str(s: &str) -> Result<QueuePriority> {
    Ok(match s {
        "low" => QueuePriority::Low,
        "normal" => QueuePriority::Normal,
        "high" => QueuePriority::High,
        "critical" => QueuePriority::Critical,
        other => anyhow::bail!("unknown priority '{other}' (expected one of: low, normal, high, critical)"),
    })
}

pub fn create(actor: &str, service: &RollupService, tenant_id: TenantId, name: String, repository_ids: Vec<Uuid>, matchers: Vec<MatcherConfig>, schedule: Option<String>) -> RollupResult<Uuid> {
    let draft = RollupConfigDraft { name, repository_ids, matchers, merge_options: MergeOptions::default(), schedule };
    service.create(actor, tenant_id, draft)
}

#[allow(clippy::too_many_arguments)]
pub fn update(
    actor: &str,
    service: &RollupService,
    tenant_id: TenantId,
    id: Uuid,
    expected_version: u64,
    name: Option<String>,
    repository_ids: Option<Vec<Uuid>>,
    matchers: Option<Vec<MatcherConfig>>,
    schedule: Option<Option<String>>,
) -> RollupResult<()> {
    let patch = RollupPatch { name, repository_ids, matchers, merge_options: None, schedule };
    service.update(actor, tenant_id, id, patch, expected_version)
}

pub fn delete(actor: &str, service: &RollupService, tenant_id: TenantId, id: Uuid) -> RollupResult<()> {
    service.delete(actor, tenant_id, id)
}

pub async fn run(actor: &str, service: &RollupService, tenant_id: TenantId, id: Uuid, scan_ids: Vec<Uuid>, asynchronous: bool, priority: QueuePriority) -> RollupResult<Uuid> {
    service.run(actor, tenant_id, id, scan_ids, RunOptions { asynchronous, priority }).await
}

pub fn status(service: &RollupService, tenant_id: TenantId, execution_id: Uuid) -> RollupResult<RollupExecution> {
    service.get_execution(tenant_id, execution_id)
}

/// Every rollup configured for `tenant_id`, active and archived alike.
pub fn list_rollups(service: &RollupService, tenant_id: TenantId) -> Vec<RollupConfig> {
    service.list(tenant_id)
}

pub fn list_executions(service: &RollupService, tenant_id: TenantId, rollup_id: Uuid, phase: Option<ExecutionPhase>) -> RollupResult<Vec<RollupExecution>> {
    service.list_executions(tenant_id, rollup_id, ExecutionFilter { phase })
}

pub async fn blast_radius(
    actor: &str,
    service: &RollupService,
    tenant_id: TenantId,
    execution_id: Uuid,
    seeds: Vec<String>,
    max_depth: u32,
    max_nodes: usize,
    include_indirect: bool,
) -> RollupResult<BlastRadiusResult> {
    let query = BlastRadiusQuery { seeds, max_depth, max_nodes, include_indirect };
    service.blast_radius(actor, tenant_id, execution_id, query).await
}

/// A no-op cancellation token, exposed for commands run to completion
/// synchronously from the CLI with no external cancel source.
#[must_use]
pub fn fresh_cancellation() -> CancellationToken {
    CancellationToken::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_matcher_reads_every_field() {
        let config = parse_matcher("type=arn,pattern=arn:aws:s3:::*,priority=75,min_confidence=0.9").unwrap();
        assert_eq!(config.r#type, MatcherType::Arn);
        assert_eq!(config.pattern.as_deref(), Some("arn:aws:s3:::*"));
        assert_eq!(config.priority, 75);
        assert!((config.min_confidence - 0.9).abs() < f64::EPSILON);
    }

    #[test]
    fn parse_matcher_defaults_priority_and_confidence() {
        let config = parse_matcher("type=name").unwrap();
        assert_eq!(config.priority, 50);
        assert!((config.min_confidence - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn parse_matcher_requires_type() {
        assert!(parse_matcher("pattern=foo").is_err());
    }

    #[test]
    fn parse_matcher_rejects_unknown_type() {
        assert!(parse_matcher("type=nonsense").is_err());
    }

    #[test]
    fn priority_from_str_supports_all_levels() {
        assert_eq!(priority_from_str("low").unwrap(), QueuePriority::Low);
        assert_eq!(priority_from_str("critical").unwrap(), QueuePriority::Critical);
        assert!(priority_from_str("urgent").is_err());
    }
}
