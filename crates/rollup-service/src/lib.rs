// SPDX-License-Identifier: MIT OR Apache-2.0
//! The Rollup Service: a tenant-scoped CRUD facade over [`RollupConfig`]
//! with optimistic concurrency, run scheduling, and blast-radius queries
//! (§4.8). No transport is wired in here; an embedding CLI or daemon calls
//! these methods directly.

pub mod store;
pub mod validation;

use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use rollup_audit::{record_blast_radius, record_operation, AuditOperation, AuditOutcome, AuditSink};
use rollup_blast::{BlastRadiusConfig, BlastRadiusQuery, BlastRadiusResult};
use rollup_core::model::{RepositoryId, ScanId, TenantId};
use rollup_core::rollup::{ExecutionPhase, MatcherConfig, MergeOptions, RollupConfig, RollupConfigBuilder, RollupExecution, RollupStatus};
use rollup_error::{ErrorCode, RollupError, RollupResult};
use rollup_executor::{CancellationToken, ExecutionStore, MergedGraphStore, RollupExecutor};
use rollup_queue::{ExecutionQueue, QueuePriority, TenantRateLimiter};
use uuid::Uuid;

pub use store::{InMemoryRollupStore, RollupStore};
pub use validation::{validate_config, ServiceLimits};

/// Everything a caller supplies to describe a new rollup on `create`.
/// Mirrors `RollupConfigBuilder`'s settable fields; `id`, `status`,
/// `version`, and the timestamps are assigned by the Service.
#[derive(Debug, Clone)]
pub struct RollupConfigDraft {
    pub name: String,
    pub repository_ids: Vec<RepositoryId>,
    pub matchers: Vec<MatcherConfig>,
    pub merge_options: MergeOptions,
    pub schedule: Option<String>,
}

/// A partial update to an existing rollup. `schedule: Some(None)` clears an
/// existing schedule; `schedule: None` leaves it untouched.
#[derive(Debug, Clone, Default)]
pub struct RollupPatch {
    pub name: Option<String>,
    pub repository_ids: Option<Vec<RepositoryId>>,
    pub matchers: Option<Vec<MatcherConfig>>,
    pub merge_options: Option<MergeOptions>,
    pub schedule: Option<Option<String>>,
}

impl RollupPatch {
    fn apply(&self, config: &mut RollupConfig) {
        if let Some(name) = &self.name {
            config.name = name.clone();
        }
        if let Some(repository_ids) = &self.repository_ids {
            config.repository_ids = repository_ids.clone();
        }
        if let Some(matchers) = &self.matchers {
            config.matchers = matchers.clone();
        }
        if let Some(merge_options) = &self.merge_options {
            config.merge_options = merge_options.clone();
        }
        if let Some(schedule) = &self.schedule {
            config.schedule = schedule.clone();
        }
    }
}

/// Narrows `listExecutions` to a single phase.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecutionFilter {
    pub phase: Option<ExecutionPhase>,
}

/// Controls how `run` schedules the new execution.
#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    /// When `true`, the execution is enqueued and `run` returns immediately;
    /// a worker later picks it up via [`RollupService::process_next`]. When
    /// `false`, `run` drives the execution to completion itself.
    pub asynchronous: bool,
    pub priority: QueuePriority,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self { asynchronous: false, priority: QueuePriority::Normal }
    }
}

/// Tuning knobs independent of any single dependency's own config: limits,
/// the bounded queue's capacity, and the blast-radius query timeout.
#[derive(Debug, Clone, Copy)]
pub struct ServiceConfig {
    pub limits: ServiceLimits,
    pub queue_capacity: usize,
    pub blast_radius_timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self { limits: ServiceLimits::default(), queue_capacity: 1_000, blast_radius_timeout: Duration::from_secs(5) }
    }
}

/// The Rollup Service facade: tenant-scoped CRUD, the execution queue, the
/// rate limiter, and blast-radius queries, all wired to one audit sink.
pub struct RollupService {
    store: Arc<dyn RollupStore>,
    execution_store: Arc<dyn ExecutionStore>,
    graph_store: Arc<dyn MergedGraphStore>,
    executor: Arc<RollupExecutor>,
    queue: StdMutex<ExecutionQueue>,
    rate_limiter: Arc<TenantRateLimiter>,
    audit_sink: Arc<dyn AuditSink>,
    blast_config: BlastRadiusConfig,
    config: ServiceConfig,
}

impl RollupService {
    #[must_use]
    pub fn new(
        store: Arc<dyn RollupStore>,
        execution_store: Arc<dyn ExecutionStore>,
        graph_store: Arc<dyn MergedGraphStore>,
        executor: Arc<RollupExecutor>,
        rate_limiter: Arc<TenantRateLimiter>,
        audit_sink: Arc<dyn AuditSink>,
        blast_config: BlastRadiusConfig,
        config: ServiceConfig,
    ) -> Self {
        let queue = StdMutex::new(ExecutionQueue::new(config.queue_capacity));
        Self { store, execution_store, graph_store, executor, queue, rate_limiter, audit_sink, blast_config, config }
    }

    /// Validates and stores a new rollup, returning its assigned id.
    ///
    /// # Errors
    ///
    /// `LIMIT_RATE`, any `VAL_*` validation failure, or `VAL_DUPLICATE_NAME`
    /// if an active rollup with the same name already exists for this
    /// tenant.
    pub fn create(&self, actor: &str, tenant_id: TenantId, draft: RollupConfigDraft) -> RollupResult<Uuid> {
        let result = self.try_create(tenant_id, draft);
        self.audit(actor, tenant_id, AuditOperation::Create, result.as_ref().ok().copied(), &result);
        result
    }

    fn try_create(&self, tenant_id: TenantId, draft: RollupConfigDraft) -> RollupResult<Uuid> {
        self.rate_limiter.check(tenant_id)?;

        let mut builder = RollupConfigBuilder::new(tenant_id, draft.name).repositories(draft.repository_ids).merge_options(draft.merge_options);
        for matcher in draft.matchers {
            builder = builder.matcher(matcher);
        }
        if let Some(schedule) = draft.schedule {
            builder = builder.schedule(schedule);
        }
        let config = builder.build();

        validate_config(&config, &self.config.limits)?;
        self.reject_duplicate_name(tenant_id, &config.name, None)?;

        let id = config.id;
        self.store.put(config);
        Ok(id)
    }

    /// Applies `patch` to the rollup at `id` under optimistic concurrency.
    ///
    /// # Errors
    ///
    /// `RES_NOT_FOUND` if `id` does not resolve for this tenant,
    /// `STATE_ARCHIVED` if it was deleted, `RES_VERSION_CONFLICT` if
    /// `expected_version` does not match the stored version, or any
    /// validation failure from the patched config.
    pub fn update(&self, actor: &str, tenant_id: TenantId, id: Uuid, patch: RollupPatch, expected_version: u64) -> RollupResult<()> {
        let result = self.try_update(tenant_id, id, patch, expected_version);
        self.audit(actor, tenant_id, AuditOperation::Update, Some(id), &result);
        result
    }

    fn try_update(&self, tenant_id: TenantId, id: Uuid, patch: RollupPatch, expected_version: u64) -> RollupResult<()> {
        self.rate_limiter.check(tenant_id)?;

        let mut config = self.store.get(tenant_id, id).ok_or_else(not_found)?;
        if config.status == RollupStatus::Archived {
            return Err(RollupError::new(ErrorCode::StateArchived, "rollup has been deleted"));
        }
        if config.version != expected_version {
            return Err(RollupError::new(
                ErrorCode::ResVersionConflict,
                format!("expected version {expected_version}, stored version is {}", config.version),
            ));
        }

        patch.apply(&mut config);
        validate_config(&config, &self.config.limits)?;
        if patch.name.is_some() {
            self.reject_duplicate_name(tenant_id, &config.name, Some(id))?;
        }

        config.version += 1;
        config.updated_at = chrono::Utc::now();
        self.store.put(config);
        Ok(())
    }

    /// Lists every rollup configured for `tenant_id`, active and archived
    /// alike; callers filter on `status` if they only want live ones.
    #[must_use]
    pub fn list(&self, tenant_id: TenantId) -> Vec<RollupConfig> {
        self.store.list(tenant_id)
    }

    /// Archives the rollup at `id`; idempotent if already archived.
    ///
    /// # Errors
    ///
    /// `RES_NOT_FOUND` if `id` does not resolve for this tenant.
    pub fn delete(&self, actor: &str, tenant_id: TenantId, id: Uuid) -> RollupResult<()> {
        let result = self.try_delete(tenant_id, id);
        self.audit(actor, tenant_id, AuditOperation::Delete, Some(id), &result);
        result
    }

    fn try_delete(&self, tenant_id: TenantId, id: Uuid) -> RollupResult<()> {
        let mut config = self.store.get(tenant_id, id).ok_or_else(not_found)?;
        if config.status != RollupStatus::Archived {
            config.status = RollupStatus::Archived;
            config.version += 1;
            config.updated_at = chrono::Utc::now();
            self.store.put(config);
        }
        Ok(())
    }

    /// Starts a new execution for the rollup at `id` over `scan_ids`.
    /// Synchronous by default: drives the execution to completion and
    /// returns once it reaches a terminal phase. With
    /// `options.asynchronous`, enqueues the execution and returns its id
    /// immediately; a worker must later call [`Self::process_next`].
    ///
    /// # Errors
    ///
    /// `LIMIT_RATE`, `RES_NOT_FOUND`, `STATE_ARCHIVED`, `LIMIT_QUEUE_FULL`
    /// (async path only), or whatever the executor itself returns
    /// (synchronous path only).
    pub async fn run(&self, actor: &str, tenant_id: TenantId, id: Uuid, scan_ids: Vec<ScanId>, options: RunOptions) -> RollupResult<Uuid> {
        self.rate_limiter.check(tenant_id)?;
        let config = self.store.get(tenant_id, id).ok_or_else(not_found)?;
        if config.status == RollupStatus::Archived {
            let err = RollupError::new(ErrorCode::StateArchived, "cannot run an archived rollup");
            self.audit(actor, tenant_id, AuditOperation::Run, Some(id), &Err::<Uuid, _>(err.clone()));
            return Err(err);
        }

        let mut execution = RollupExecution::new(id, tenant_id, scan_ids);
        let execution_id = execution.id;
        self.execution_store.put(execution.clone());

        if options.asynchronous {
            let enqueue_result = self.queue.lock().expect("execution queue mutex poisoned").enqueue(execution_id, id, tenant_id, options.priority);
            self.audit(actor, tenant_id, AuditOperation::Run, Some(execution_id), &enqueue_result);
            enqueue_result?;
            return Ok(execution_id);
        }

        // The executor records its own terminal audit event; auditing again
        // here would double-count the same Run outcome.
        let cancellation = CancellationToken::new();
        self.executor.run(&config, &mut execution, &cancellation).await?;
        Ok(execution_id)
    }

    /// Pulls and runs the next queued execution, if any. Intended to be
    /// called in a loop by a fixed-size worker pool (§5); each call drives
    /// exactly one execution to a terminal phase.
    ///
    /// # Errors
    ///
    /// `RES_NOT_FOUND` if the queued execution or its rollup vanished from
    /// their stores between enqueue and pickup, or whatever the executor
    /// itself returns.
    pub async fn process_next(&self) -> RollupResult<Option<Uuid>> {
        let Some(queued) = self.queue.lock().expect("execution queue mutex poisoned").dequeue() else {
            return Ok(None);
        };
        let mut execution = self
            .execution_store
            .get(queued.execution_id)
            .ok_or_else(|| RollupError::new(ErrorCode::ResNotFound, "queued execution is missing from the execution store"))?;
        let config = self
            .store
            .get(queued.tenant_id, queued.rollup_id)
            .ok_or_else(|| RollupError::new(ErrorCode::ResNotFound, "rollup config vanished before its queued execution ran"))?;

        let cancellation = CancellationToken::new();
        self.executor.run(&config, &mut execution, &cancellation).await?;
        Ok(Some(execution.id))
    }

    /// Fetches one execution, tenant scoped.
    ///
    /// # Errors
    ///
    /// `RES_NOT_FOUND` if `execution_id` does not exist or belongs to
    /// another tenant.
    pub fn get_execution(&self, tenant_id: TenantId, execution_id: Uuid) -> RollupResult<RollupExecution> {
        self.execution_store
            .get(execution_id)
            .filter(|e| e.tenant_id == tenant_id)
            .ok_or_else(not_found)
    }

    /// Lists executions for `rollup_id`, most recently started first,
    /// optionally narrowed to one phase.
    ///
    /// # Errors
    ///
    /// `RES_NOT_FOUND` if `rollup_id` does not resolve for this tenant.
    pub fn list_executions(&self, tenant_id: TenantId, rollup_id: Uuid, filter: ExecutionFilter) -> RollupResult<Vec<RollupExecution>> {
        self.store.get(tenant_id, rollup_id).ok_or_else(not_found)?;
        let executions = self.execution_store.list(tenant_id, rollup_id);
        Ok(match filter.phase {
            Some(phase) => executions.into_iter().filter(|e| e.phase == phase).collect(),
            None => executions,
        })
    }

    /// Runs a bounded blast-radius query against the merged graph of a
    /// completed execution.
    ///
    /// # Errors
    ///
    /// `RES_NOT_FOUND` if the execution or its merged graph does not exist
    /// for this tenant, `BLAST_ERROR` if the query exceeds its configured
    /// timeout, or whatever `rollup_blast::compute` itself returns.
    pub async fn blast_radius(&self, actor: &str, tenant_id: TenantId, execution_id: Uuid, query: BlastRadiusQuery) -> RollupResult<BlastRadiusResult> {
        let result = self.try_blast_radius(tenant_id, execution_id, &query).await;
        let risk_level = result.as_ref().ok().map(|r| r.risk_level);
        record_blast_radius(self.audit_sink.as_ref(), actor, tenant_id, execution_id, outcome_of(&result), risk_level);
        result
    }

    async fn try_blast_radius(&self, tenant_id: TenantId, execution_id: Uuid, query: &BlastRadiusQuery) -> RollupResult<BlastRadiusResult> {
        self.get_execution(tenant_id, execution_id)?;
        let graph = self.graph_store.get(execution_id).ok_or_else(not_found)?;
        let config = self.blast_config.clone();
        let query = query.clone();
        match tokio::time::timeout(self.config.blast_radius_timeout, async move { rollup_blast::compute(&graph, &query, &config) }).await {
            Ok(result) => result,
            Err(_) => Err(RollupError::new(ErrorCode::BlastError, "blast radius query exceeded its configured timeout")),
        }
    }

    fn reject_duplicate_name(&self, tenant_id: TenantId, name: &str, excluding: Option<Uuid>) -> RollupResult<()> {
        let clashes = self
            .store
            .list(tenant_id)
            .into_iter()
            .any(|c| c.name == name && c.status == RollupStatus::Active && Some(c.id) != excluding);
        if clashes {
            return Err(RollupError::new(ErrorCode::ValDuplicateName, format!("an active rollup named `{name}` already exists")));
        }
        Ok(())
    }

    fn audit<T>(&self, actor: &str, tenant_id: TenantId, operation: AuditOperation, resource_id: Option<Uuid>, result: &RollupResult<T>) {
        record_operation(self.audit_sink.as_ref(), actor, tenant_id, operation, resource_id, outcome_of(result));
    }
}

fn outcome_of<T>(result: &RollupResult<T>) -> AuditOutcome {
    match result {
        Ok(_) => AuditOutcome::Success,
        Err(err) => AuditOutcome::Failure { code: err.code },
    }
}

fn not_found() -> RollupError {
    RollupError::new(ErrorCode::ResNotFound, "no rollup or execution with this id exists for this tenant")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rollup_core::model::{Edge, MetadataValue, Node};
    use rollup_core::rollup::{ConflictResolution, EdgeTypePreservation, MatcherType};
    use rollup_executor::store::{InMemoryExecutionStore, InMemoryMergedGraphStore};
    use rollup_executor::ExecutorConfig;
    use rollup_queue::RateLimiterConfig;
    use rollup_retry::RetryConfig;
    use std::collections::BTreeMap;

    struct StaticProvider {
        graphs: std::collections::HashMap<RepositoryId, (Vec<Node>, Vec<Edge>)>,
    }

    #[async_trait]
    impl rollup_executor::RepositoryGraphProvider for StaticProvider {
        async fn fetch_graph(&self, _tenant: TenantId, repository_id: RepositoryId, _scan_id: ScanId) -> RollupResult<(Vec<Node>, Vec<Edge>)> {
            self.graphs.get(&repository_id).cloned().ok_or_else(|| RollupError::new(ErrorCode::ExecFetchFailed, "no graph for repository"))
        }
    }

    fn node(id: &str, arn: &str) -> Node {
        let mut metadata = BTreeMap::new();
        metadata.insert("arn".to_string(), MetadataValue::String(arn.to_string()));
        Node { id: id.to_string(), r#type: "aws_s3_bucket".into(), name: id.to_string(), metadata, location: None }
    }

    fn draft(repository_ids: Vec<RepositoryId>) -> RollupConfigDraft {
        RollupConfigDraft {
            name: "test-rollup".to_string(),
            repository_ids,
            matchers: vec![MatcherConfig { r#type: MatcherType::Arn, priority: 100, pattern: None, attributes: BTreeMap::new(), min_confidence: 0.5 }],
            merge_options: MergeOptions {
                conflict_resolution: ConflictResolution::PreferHighestConfidence,
                preserve_source_info: true,
                create_cross_repo_edges: true,
                max_nodes: 10_000,
                edge_type_preservation: EdgeTypePreservation::All,
            },
            schedule: None,
        }
    }

    fn service(graphs: std::collections::HashMap<RepositoryId, (Vec<Node>, Vec<Edge>)>) -> RollupService {
        let provider = Arc::new(StaticProvider { graphs });
        let execution_store: Arc<dyn ExecutionStore> = Arc::new(InMemoryExecutionStore::new());
        let graph_store: Arc<dyn MergedGraphStore> = Arc::new(InMemoryMergedGraphStore::new());
        let index: Arc<dyn rollup_index::IndexHandle> = Arc::new(rollup_index::ExternalObjectIndex::with_in_memory_cache(
            rollup_index::InMemoryIndexStore::default(),
            &rollup_index::CacheConfig::default(),
        ));
        let executor = Arc::new(RollupExecutor::new(
            provider,
            RetryConfig::default(),
            ExecutorConfig::default(),
            execution_store.clone(),
            graph_store.clone(),
            Arc::new(rollup_audit::InMemoryAuditSink::new()),
            index,
        ));
        RollupService::new(
            Arc::new(InMemoryRollupStore::new()),
            execution_store,
            graph_store,
            executor,
            Arc::new(TenantRateLimiter::new(RateLimiterConfig::default())),
            Arc::new(rollup_audit::InMemoryAuditSink::new()),
            BlastRadiusConfig::default(),
            ServiceConfig::default(),
        )
    }

    #[test]
    fn create_rejects_duplicate_active_name() {
        let service = service(std::collections::HashMap::new());
        let tenant_id = Uuid::new_v4();
        let repos = vec![Uuid::new_v4(), Uuid::new_v4()];
        service.create("tester", tenant_id, draft(repos.clone())).unwrap();
        let err = service.create("tester", tenant_id, draft(repos)).unwrap_err();
        assert_eq!(err.code, ErrorCode::ValDuplicateName);
    }

    #[test]
    fn update_rejects_stale_version() {
        let service = service(std::collections::HashMap::new());
        let tenant_id = Uuid::new_v4();
        let id = service.create("tester", tenant_id, draft(vec![Uuid::new_v4(), Uuid::new_v4()])).unwrap();
        let err = service
            .update("tester", tenant_id, id, RollupPatch { name: Some("renamed".to_string()), ..Default::default() }, 99)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ResVersionConflict);
    }

    #[test]
    fn cross_tenant_get_reports_not_found_not_permission_denied() {
        let service = service(std::collections::HashMap::new());
        let owner = Uuid::new_v4();
        let other = Uuid::new_v4();
        let id = service.create("tester", owner, draft(vec![Uuid::new_v4(), Uuid::new_v4()])).unwrap();
        let err = service.update("tester", other, id, RollupPatch::default(), 1).unwrap_err();
        assert_eq!(err.code, ErrorCode::ResNotFound);
    }

    #[test]
    fn delete_archives_and_blocks_further_runs() {
        let service = service(std::collections::HashMap::new());
        let tenant_id = Uuid::new_v4();
        let id = service.create("tester", tenant_id, draft(vec![Uuid::new_v4(), Uuid::new_v4()])).unwrap();
        service.delete("tester", tenant_id, id).unwrap();
        let err = service.update("tester", tenant_id, id, RollupPatch { name: Some("x".to_string()), ..Default::default() }, 1).unwrap_err();
        assert_eq!(err.code, ErrorCode::StateArchived);
    }

    #[tokio::test]
    async fn synchronous_run_completes_and_supports_blast_radius() {
        let repo_a = Uuid::new_v4();
        let repo_b = Uuid::new_v4();
        let mut graphs = std::collections::HashMap::new();
        graphs.insert(repo_a, (vec![node("n1", "arn:aws:s3:::shared")], vec![]));
        graphs.insert(repo_b, (vec![node("n2", "arn:aws:s3:::shared")], vec![]));
        let service = service(graphs);
        let tenant_id = Uuid::new_v4();
        let id = service.create("tester", tenant_id, draft(vec![repo_a, repo_b])).unwrap();

        let execution_id = service.run("tester", tenant_id, id, vec![Uuid::new_v4(), Uuid::new_v4()], RunOptions::default()).await.unwrap();
        let execution = service.get_execution(tenant_id, execution_id).unwrap();
        assert_eq!(execution.phase, ExecutionPhase::Completed);

        let merged_id = execution.stats.equivalence_classes;
        assert_eq!(merged_id, 1);

        let canonical_id = {
            let graph = service.graph_store.get(execution_id).unwrap();
            graph.nodes[0].canonical_id.clone()
        };
        let result = service
            .blast_radius("tester", tenant_id, execution_id, BlastRadiusQuery { seeds: vec![canonical_id], max_depth: 3, max_nodes: 100, include_indirect: true })
            .await
            .unwrap();
        assert!(!result.impacted.is_empty());
    }

    #[tokio::test]
    async fn async_run_enqueues_and_process_next_drains_it() {
        let repo_a = Uuid::new_v4();
        let mut graphs = std::collections::HashMap::new();
        graphs.insert(repo_a, (vec![node("n1", "arn:aws:s3:::bucket")], vec![]));
        let repo_b = Uuid::new_v4();
        graphs.insert(repo_b, (vec![node("n2", "arn:aws:s3:::bucket")], vec![]));
        let service = service(graphs);
        let tenant_id = Uuid::new_v4();
        let id = service.create("tester", tenant_id, draft(vec![repo_a, repo_b])).unwrap();

        let execution_id = service
            .run("tester", tenant_id, id, vec![Uuid::new_v4(), Uuid::new_v4()], RunOptions { asynchronous: true, priority: QueuePriority::Normal })
            .await
            .unwrap();
        let queued = service.get_execution(tenant_id, execution_id).unwrap();
        assert_eq!(queued.phase, ExecutionPhase::Queued);

        let processed_id = service.process_next().await.unwrap().unwrap();
        assert_eq!(processed_id, execution_id);
        let completed = service.get_execution(tenant_id, execution_id).unwrap();
        assert_eq!(completed.phase, ExecutionPhase::Completed);
    }
}
