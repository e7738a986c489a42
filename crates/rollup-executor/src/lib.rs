// SPDX-License-Identifier: MIT OR Apache-2.0
//! The Rollup Executor: drives one execution through
//! `queued -> fetching -> matching -> merging -> storing -> completed`,
//! with phase timeouts, cooperative cancellation, and fetch-only retry
//! (§4.7).

pub mod cancel;
pub mod provider;
pub mod reference;
pub mod store;

use std::sync::Arc;
use std::time::{Duration, Instant};

use rollup_audit::{record_operation, AuditOperation, AuditOutcome, AuditSink};
use rollup_core::model::{Edge, Node, RepositoryId, ScanId};
use rollup_core::rollup::{ExecutionPhase, MatcherConfig, MergeOptions, RollupConfig, RollupExecution};
use rollup_error::{ErrorCode, RollupError, RollupResult};
use rollup_index::IndexHandle;
use rollup_match::{AmbiguityPolicy, MatchContext, MatchEngine, MatcherRegistry, ScopedNode};
use rollup_merge::{merge, MergeInput, ScopedEdge};
use rollup_retry::{retry_async, RetryConfig};

pub use cancel::{CancellationReason, CancellationToken};
pub use provider::RepositoryGraphProvider;
pub use reference::{IndexedReferenceLookup, LocalReferenceLookup};
pub use store::{ExecutionStore, MergedGraphStore};

/// Per-phase and overall deadlines, read by both the Executor and (for
/// `blast_radius_timeout`) the Service facade.
#[derive(Debug, Clone, Copy)]
pub struct ExecutorConfig {
    pub per_repository_timeout: Duration,
    pub per_matcher_timeout: Duration,
    pub blast_radius_timeout: Duration,
    pub total_timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            per_repository_timeout: Duration::from_secs(30),
            per_matcher_timeout: Duration::from_secs(10),
            blast_radius_timeout: Duration::from_secs(5),
            total_timeout: Duration::from_secs(300),
        }
    }
}

struct FetchedRepository {
    repository_id: RepositoryId,
    scan_id: ScanId,
    nodes: Vec<Node>,
    edges: Vec<Edge>,
}

/// Drives one [`RollupExecution`] to completion against a fixed
/// [`RollupConfig`].
pub struct RollupExecutor {
    provider: Arc<dyn RepositoryGraphProvider>,
    retry_config: RetryConfig,
    config: ExecutorConfig,
    execution_store: Arc<dyn ExecutionStore>,
    graph_store: Arc<dyn MergedGraphStore>,
    audit_sink: Arc<dyn AuditSink>,
    index: Arc<dyn IndexHandle>,
}

impl RollupExecutor {
    #[must_use]
    pub fn new(
        provider: Arc<dyn RepositoryGraphProvider>,
        retry_config: RetryConfig,
        config: ExecutorConfig,
        execution_store: Arc<dyn ExecutionStore>,
        graph_store: Arc<dyn MergedGraphStore>,
        audit_sink: Arc<dyn AuditSink>,
        index: Arc<dyn IndexHandle>,
    ) -> Self {
        Self { provider, retry_config, config, execution_store, graph_store, audit_sink, index }
    }

    /// Runs `execution` against `rollup_config` to a terminal phase.
    /// Terminal-but-non-error outcomes (`cancelled`) are reported via
    /// `execution.phase`, not via `Err`; `Err` is reserved for genuine
    /// failures already reflected in `execution.phase == Failed`.
    pub async fn run(&self, rollup_config: &RollupConfig, execution: &mut RollupExecution, cancellation: &CancellationToken) -> RollupResult<()> {
        let deadline = Instant::now() + self.config.total_timeout;
        let outcome = tokio::time::timeout(self.config.total_timeout, self.run_phases(rollup_config, execution, cancellation, deadline)).await;

        match outcome {
            Ok(result) => result,
            Err(_) => {
                self.fail(execution, RollupError::new(ErrorCode::ExecTimeout, "execution exceeded its total timeout"));
                Err(RollupError::new(ErrorCode::ExecTimeout, "execution exceeded its total timeout"))
            }
        }
    }

    async fn run_phases(
        &self,
        rollup_config: &RollupConfig,
        execution: &mut RollupExecution,
        cancellation: &CancellationToken,
        deadline: Instant,
    ) -> RollupResult<()> {
        self.transition(execution, ExecutionPhase::Fetching)?;
        if self.observe_cancellation(execution, cancellation) {
            return Ok(());
        }

        let fetched = match self.fetch_all(rollup_config, execution, cancellation).await {
            Ok(fetched) => fetched,
            Err(err) => {
                self.fail(execution, err.clone());
                return Err(err);
            }
        };
        if self.observe_cancellation(execution, cancellation) {
            return Ok(());
        }

        self.transition(execution, ExecutionPhase::Matching)?;
        let (nodes, edges) = flatten(&fetched);
        let registry = rollup_extract::ExtractorRegistry::standard();
        let local = LocalReferenceLookup::build(&nodes, &registry);
        let candidate_pairs = local.candidate_pairs(&nodes);
        // Seed the persisted, tenant-wide Index with this execution's
        // extraction before matching reads it back (§3, §4.4): matchers
        // query the cached index, not this execution's private map.
        reference::seed_index(self.index.as_ref(), execution.tenant_id, &nodes, &local);
        let indexed_lookup = IndexedReferenceLookup::new(self.index.clone());
        let match_context = MatchContext::new(execution.tenant_id, &indexed_lookup);
        let matcher_registry = MatcherRegistry::standard();
        let ambiguity_policy = AmbiguityPolicy::WarnOnly;
        let engine = MatchEngine::new(&matcher_registry, ambiguity_policy);

        let match_started = Instant::now();
        let match_result = engine.run(&nodes, &candidate_pairs, &rollup_config.matchers, &match_context);
        if match_started.elapsed() > self.config.per_matcher_timeout {
            let err = RollupError::new(ErrorCode::ExecTimeout, "matching phase exceeded its configured timeout");
            self.fail(execution, err.clone());
            return Err(err);
        }
        execution.stats.equivalence_classes = match_result.classes.len() as u64;
        execution.stats.ambiguous_matches = match_result.warnings.len() as u64;
        if self.observe_cancellation(execution, cancellation) {
            return Ok(());
        }

        self.transition(execution, ExecutionPhase::Merging)?;
        let scoped_edges: Vec<ScopedEdge> = edges.iter().map(|(scan_id, edge)| ScopedEdge { scan_id: *scan_id, edge }).collect();
        let repository_order: Vec<RepositoryId> = rollup_config.repository_ids.clone();
        let merge_input =
            MergeInput { classes: &match_result.classes, nodes: &nodes, edges: &scoped_edges, repository_order: &repository_order };
        let merged = match merge(execution.id, &merge_input, &rollup_config.merge_options) {
            Ok(graph) => graph,
            Err(err) => {
                self.fail(execution, err.clone());
                return Err(err);
            }
        };
        execution.stats.merged_nodes = merged.nodes.len() as u64;
        execution.stats.merged_edges = merged.edges.len() as u64;
        if self.observe_cancellation(execution, cancellation) {
            return Ok(());
        }
        if Instant::now() > deadline {
            let err = RollupError::new(ErrorCode::ExecTimeout, "execution exceeded its total timeout before storing");
            self.fail(execution, err.clone());
            return Err(err);
        }

        self.transition(execution, ExecutionPhase::Storing)?;
        self.graph_store.put(merged);
        self.transition(execution, ExecutionPhase::Completed)?;
        execution.finished_at = Some(chrono::Utc::now());
        self.execution_store.put(execution.clone());
        record_operation(self.audit_sink.as_ref(), "executor", execution.tenant_id, AuditOperation::Run, Some(execution.id), AuditOutcome::Success);
        Ok(())
    }

    async fn fetch_all(
        &self,
        rollup_config: &RollupConfig,
        execution: &mut RollupExecution,
        cancellation: &CancellationToken,
    ) -> RollupResult<Vec<FetchedRepository>> {
        let mut set = tokio::task::JoinSet::new();
        for (repository_id, scan_id) in rollup_config.repository_ids.iter().copied().zip(execution.scan_ids.iter().copied()) {
            let provider = self.provider.clone();
            let tenant_id = execution.tenant_id;
            let retry_config = self.retry_config.clone();
            let per_repository_timeout = self.config.per_repository_timeout;
            set.spawn(async move {
                let fetch_once = || {
                    let provider = provider.clone();
                    async move { provider.fetch_graph(tenant_id, repository_id, scan_id).await }
                };
                let outcome = tokio::time::timeout(per_repository_timeout, retry_async(&retry_config, fetch_once, RollupError::retryable)).await;
                match outcome {
                    Ok(Ok(outcome)) => Ok((repository_id, scan_id, outcome.value, outcome.metadata.total_attempts - 1)),
                    Ok(Err(err)) => Err(err),
                    Err(_) => Err(RollupError::new(ErrorCode::ExecTimeout, format!("repository {repository_id} fetch exceeded its timeout"))),
                }
            });
        }

        let mut fetched = Vec::new();
        while let Some(joined) = set.join_next().await {
            if cancellation.is_cancelled() {
                set.abort_all();
                return Ok(fetched);
            }
            let (repository_id, scan_id, (nodes, edges), retries) = joined.map_err(|e| {
                RollupError::new(ErrorCode::ExecFetchFailed, format!("repository fetch task panicked: {e}"))
            })??;
            execution.stats.repositories_fetched += 1;
            execution.stats.fetch_retries += retries;
            execution.stats.nodes_indexed += nodes.len() as u64;
            fetched.push(FetchedRepository { repository_id, scan_id, nodes, edges });
        }
        Ok(fetched)
    }

    fn transition(&self, execution: &mut RollupExecution, next: ExecutionPhase) -> RollupResult<()> {
        let prev = execution.transition(next).map_err(|(from, to)| {
            RollupError::new(ErrorCode::ExecMatchFailed, format!("illegal phase transition {from:?} -> {to:?}"))
        })?;
        tracing::debug!(
            tenant_id = %execution.tenant_id,
            rollup_id = %execution.rollup_id,
            execution_id = %execution.id,
            from = ?prev,
            to = ?next,
            "phase transition"
        );
        Ok(())
    }

    fn observe_cancellation(&self, execution: &mut RollupExecution, cancellation: &CancellationToken) -> bool {
        if !cancellation.is_cancelled() {
            return false;
        }
        let _ = execution.transition(ExecutionPhase::Cancelled);
        execution.finished_at = Some(chrono::Utc::now());
        self.execution_store.put(execution.clone());
        tracing::warn!(
            tenant_id = %execution.tenant_id,
            rollup_id = %execution.rollup_id,
            execution_id = %execution.id,
            reason = ?cancellation.reason(),
            "execution cancelled"
        );
        record_operation(
            self.audit_sink.as_ref(),
            "executor",
            execution.tenant_id,
            AuditOperation::Run,
            Some(execution.id),
            AuditOutcome::Failure { code: ErrorCode::ExecCancelled },
        );
        true
    }

    fn fail(&self, execution: &mut RollupExecution, error: RollupError) {
        let _ = execution.transition(ExecutionPhase::Failed);
        execution.error = Some(format!("{}: {}", error.code, error.message));
        execution.finished_at = Some(chrono::Utc::now());
        self.execution_store.put(execution.clone());
        tracing::error!(
            tenant_id = %execution.tenant_id,
            rollup_id = %execution.rollup_id,
            execution_id = %execution.id,
            code = %error.code,
            message = %error.message,
            "execution failed"
        );
        record_operation(
            self.audit_sink.as_ref(),
            "executor",
            execution.tenant_id,
            AuditOperation::Run,
            Some(execution.id),
            AuditOutcome::Failure { code: error.code },
        );
    }
}

fn flatten(fetched: &[FetchedRepository]) -> (Vec<ScopedNode<'_>>, Vec<(ScanId, &Edge)>) {
    let mut nodes = Vec::new();
    let mut edges = Vec::new();
    for repo in fetched {
        for node in &repo.nodes {
            nodes.push(ScopedNode { scan_id: repo.scan_id, repository_id: repo.repository_id, node });
        }
        for edge in &repo.edges {
            edges.push((repo.scan_id, edge));
        }
    }
    (nodes, edges)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rollup_core::model::{MetadataValue, TenantId};
    use rollup_core::rollup::{ConflictResolution, EdgeTypePreservation, MatcherType, RollupConfigBuilder};
    use std::collections::BTreeMap;
    use uuid::Uuid;

    struct StaticProvider {
        graphs: std::collections::HashMap<RepositoryId, (Vec<Node>, Vec<Edge>)>,
    }

    #[async_trait]
    impl RepositoryGraphProvider for StaticProvider {
        async fn fetch_graph(&self, _tenant: TenantId, repository_id: RepositoryId, _scan_id: ScanId) -> RollupResult<(Vec<Node>, Vec<Edge>)> {
            self.graphs
                .get(&repository_id)
                .cloned()
                .ok_or_else(|| RollupError::new(ErrorCode::ExecFetchFailed, "no graph for repository"))
        }
    }

    fn node(id: &str, arn: Option<&str>) -> Node {
        let mut metadata = BTreeMap::new();
        if let Some(arn) = arn {
            metadata.insert("arn".to_string(), MetadataValue::String(arn.to_string()));
        }
        Node { id: id.to_string(), r#type: "aws_s3_bucket".into(), name: id.to_string(), metadata, location: None }
    }

    fn test_index() -> Arc<dyn IndexHandle> {
        Arc::new(rollup_index::ExternalObjectIndex::with_in_memory_cache(
            rollup_index::InMemoryIndexStore::default(),
            &rollup_index::CacheConfig::default(),
        ))
    }

    fn rollup_config(tenant_id: TenantId, repository_ids: Vec<RepositoryId>) -> RollupConfig {
        RollupConfigBuilder::new(tenant_id, "test-rollup")
            .repositories(repository_ids)
            .matcher(MatcherConfig { r#type: MatcherType::Arn, priority: 100, pattern: None, attributes: BTreeMap::new(), min_confidence: 0.5 })
            .merge_options(MergeOptions {
                conflict_resolution: ConflictResolution::PreferHighestConfidence,
                preserve_source_info: true,
                create_cross_repo_edges: true,
                max_nodes: 10_000,
                edge_type_preservation: EdgeTypePreservation::All,
            })
            .build()
    }

    #[tokio::test]
    async fn happy_path_reaches_completed_and_merges_matching_nodes() {
        let tenant_id = Uuid::new_v4();
        let repo_a = Uuid::new_v4();
        let repo_b = Uuid::new_v4();
        let mut graphs = std::collections::HashMap::new();
        graphs.insert(repo_a, (vec![node("n1", Some("arn:aws:s3:::shared"))], vec![]));
        graphs.insert(repo_b, (vec![node("n2", Some("arn:aws:s3:::shared"))], vec![]));

        let provider = Arc::new(StaticProvider { graphs });
        let executor = RollupExecutor::new(
            provider,
            RetryConfig::default(),
            ExecutorConfig::default(),
            Arc::new(store::InMemoryExecutionStore::new()),
            Arc::new(store::InMemoryMergedGraphStore::new()),
            Arc::new(rollup_audit::InMemoryAuditSink::new()),
            test_index(),
        );

        let config = rollup_config(tenant_id, vec![repo_a, repo_b]);
        let mut execution = RollupExecution::new(config.id, tenant_id, vec![Uuid::new_v4(), Uuid::new_v4()]);
        let cancellation = CancellationToken::new();
        executor.run(&config, &mut execution, &cancellation).await.unwrap();

        assert_eq!(execution.phase, ExecutionPhase::Completed);
        assert_eq!(execution.stats.repositories_fetched, 2);
        assert_eq!(execution.stats.merged_nodes, 1);
    }

    #[tokio::test]
    async fn cancellation_before_fetch_short_circuits_to_cancelled() {
        let tenant_id = Uuid::new_v4();
        let repo_a = Uuid::new_v4();
        let mut graphs = std::collections::HashMap::new();
        graphs.insert(repo_a, (vec![node("n1", None)], vec![]));
        let provider = Arc::new(StaticProvider { graphs });
        let executor = RollupExecutor::new(
            provider,
            RetryConfig::default(),
            ExecutorConfig::default(),
            Arc::new(store::InMemoryExecutionStore::new()),
            Arc::new(store::InMemoryMergedGraphStore::new()),
            Arc::new(rollup_audit::InMemoryAuditSink::new()),
            test_index(),
        );
        let config = rollup_config(tenant_id, vec![repo_a]);
        let mut execution = RollupExecution::new(config.id, tenant_id, vec![Uuid::new_v4()]);
        let cancellation = CancellationToken::new();
        cancellation.cancel(CancellationReason::UserRequested);
        executor.run(&config, &mut execution, &cancellation).await.unwrap();
        assert_eq!(execution.phase, ExecutionPhase::Cancelled);
    }

    #[tokio::test]
    async fn repository_fetch_failure_fails_the_execution() {
        let tenant_id = Uuid::new_v4();
        let missing_repo = Uuid::new_v4();
        let provider = Arc::new(StaticProvider { graphs: std::collections::HashMap::new() });
        let mut retry_config = RetryConfig::default();
        retry_config.max_retries = 0;
        let executor = RollupExecutor::new(
            provider,
            retry_config,
            ExecutorConfig::default(),
            Arc::new(store::InMemoryExecutionStore::new()),
            Arc::new(store::InMemoryMergedGraphStore::new()),
            Arc::new(rollup_audit::InMemoryAuditSink::new()),
            test_index(),
        );
        let config = rollup_config(tenant_id, vec![missing_repo]);
        let mut execution = RollupExecution::new(config.id, tenant_id, vec![Uuid::new_v4()]);
        let cancellation = CancellationToken::new();
        let err = executor.run(&config, &mut execution, &cancellation).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ExecFetchFailed);
        assert_eq!(execution.phase, ExecutionPhase::Failed);
    }
}
