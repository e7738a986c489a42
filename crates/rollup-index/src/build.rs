// SPDX-License-Identifier: MIT OR Apache-2.0
//! Index build engine: fetches each repository's latest scan graph,
//! extracts references node-by-node, and upserts the resulting
//! `IndexEntry`s under a per-tenant build lock.

use std::collections::{BTreeMap, HashMap};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Mutex;
use std::sync::Arc;

use async_trait::async_trait;
use rollup_core::model::{IndexEntry, Node, RepositoryId, Scan, TenantId};
use rollup_error::{ErrorCode, RollupError, RollupResult};
use rollup_extract::ExtractorRegistry;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::store::IndexStore;

/// External collaborator: fetches the latest scan graph for a repository.
/// The core never scans IaC source itself; this is the seam a host
/// application wires a real scanner pipeline into.
#[async_trait]
pub trait GraphProvider: Send + Sync {
    async fn latest_scan(
        &self,
        tenant: TenantId,
        repository_id: RepositoryId,
    ) -> RollupResult<(Scan, Vec<Node>)>;
}

#[derive(Debug, Clone)]
pub struct IndexBuildOptions {
    pub force_rebuild: bool,
    pub batch_size: usize,
    /// Per-extractor failure rate, in `[0.0, 1.0]`, above which the build
    /// aborts instead of completing partially.
    pub max_extractor_failure_rate: f64,
}

impl Default for IndexBuildOptions {
    fn default() -> Self {
        Self { force_rebuild: false, batch_size: 200, max_extractor_failure_rate: 0.5 }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BuildReport {
    pub repositories_processed: usize,
    pub repositories_skipped: usize,
    pub entries_upserted: usize,
    pub extractor_failures: BTreeMap<String, u64>,
}

struct TenantBuildSlot {
    lock: Arc<tokio::sync::Mutex<()>>,
    in_flight: Mutex<Option<Uuid>>,
}

impl Default for TenantBuildSlot {
    fn default() -> Self {
        Self { lock: Arc::new(tokio::sync::Mutex::new(())), in_flight: Mutex::new(None) }
    }
}

/// Enforces "at most one concurrent build per tenant" (§4.2, §5). A second
/// caller attempting to start a build while one is in flight gets back the
/// in-flight build's id rather than blocking.
#[derive(Default)]
pub struct BuildLockRegistry {
    slots: Mutex<HashMap<TenantId, Arc<TenantBuildSlot>>>,
}

impl BuildLockRegistry {
    fn slot_for(&self, tenant: TenantId) -> Arc<TenantBuildSlot> {
        self.slots.lock().expect("build lock registry poisoned").entry(tenant).or_default().clone()
    }

    /// Attempt to acquire the per-tenant build lock. On contention, returns
    /// `EXEC_IN_PROGRESS` carrying the in-flight build id.
    fn try_acquire(&self, tenant: TenantId, build_id: Uuid) -> Result<BuildGuard, RollupError> {
        let slot = self.slot_for(tenant);
        match slot.lock.clone().try_lock_owned() {
            Ok(guard) => {
                *slot.in_flight.lock().expect("build slot poisoned") = Some(build_id);
                Ok(BuildGuard { slot, _guard: guard })
            }
            Err(_) => {
                let in_flight = *slot.in_flight.lock().expect("build slot poisoned");
                Err(RollupError::new(
                    ErrorCode::ExecInProgress,
                    format!(
                        "index build already in progress for tenant (build_id={:?})",
                        in_flight
                    ),
                ))
            }
        }
    }
}

struct BuildGuard {
    slot: Arc<TenantBuildSlot>,
    _guard: tokio::sync::OwnedMutexGuard<()>,
}

impl Drop for BuildGuard {
    fn drop(&mut self) {
        *self.slot.in_flight.lock().expect("build slot poisoned") = None;
    }
}

/// Drives one index build across a set of repositories for a tenant.
pub struct IndexBuilder {
    registry: ExtractorRegistry,
    locks: BuildLockRegistry,
}

impl Default for IndexBuilder {
    fn default() -> Self {
        Self::new(ExtractorRegistry::standard())
    }
}

impl IndexBuilder {
    #[must_use]
    pub fn new(registry: ExtractorRegistry) -> Self {
        Self { registry, locks: BuildLockRegistry::default() }
    }

    /// Run a build for `tenant` across `repository_ids`, writing results
    /// into `store`. Returns `EXEC_IN_PROGRESS` if another build for the
    /// same tenant is already running.
    pub async fn build(
        &self,
        tenant: TenantId,
        repository_ids: &[RepositoryId],
        options: &IndexBuildOptions,
        provider: &dyn GraphProvider,
        store: &dyn IndexStore,
    ) -> RollupResult<BuildReport> {
        let build_id = Uuid::new_v4();
        let _guard = self.locks.try_acquire(tenant, build_id)?;

        let mut report = BuildReport::default();

        for repository_id in repository_ids {
            let (scan, nodes) = provider.latest_scan(tenant, *repository_id).await?;

            let mut entries = Vec::new();
            for node in &nodes {
                let mut node_refs = Vec::new();
                for extractor in self.registry.extractors() {
                    let outcome = catch_unwind(AssertUnwindSafe(|| extractor.extract(node)));
                    match outcome {
                        Ok(refs) => node_refs.extend(refs),
                        Err(_) => {
                            warn!(
                                target: "rollup.index",
                                reference_type = extractor.reference_type().as_str(),
                                node_id = %node.id,
                                "extractor panicked, skipping"
                            );
                            *report
                                .extractor_failures
                                .entry(extractor.reference_type().as_str().to_string())
                                .or_insert(0) += 1;
                        }
                    }
                }
                if !node_refs.is_empty() {
                    if let Ok(entry) =
                        IndexEntry::new(tenant, scan.id, *repository_id, node.id.clone(), node_refs)
                    {
                        entries.push(entry);
                    }
                }
            }

            let total_attempts: u64 = (nodes.len() * self.registry.len()) as u64;
            let total_failures: u64 = report.extractor_failures.values().sum();
            if total_attempts > 0 {
                let failure_rate = total_failures as f64 / total_attempts as f64;
                if failure_rate > options.max_extractor_failure_rate {
                    return Err(RollupError::new(
                        ErrorCode::InfraGraphProviderUnavailable,
                        format!(
                            "extractor failure rate {failure_rate:.2} exceeds threshold {:.2}",
                            options.max_extractor_failure_rate
                        ),
                    ));
                }
            }

            let collection_hash = rollup_core::hash::collection_hash(
                entries.iter().map(IndexEntry::collection_hash).collect::<Vec<_>>(),
            );
            if !options.force_rebuild {
                if let Some(stored) = store.stored_collection_hash(tenant, scan.id) {
                    if stored == collection_hash {
                        debug!(target: "rollup.index", scan_id = %scan.id, "scan unchanged, skipping");
                        report.repositories_skipped += 1;
                        continue;
                    }
                }
            }

            for batch in entries.chunks(options.batch_size.max(1)) {
                store.upsert_batch(tenant, batch.to_vec());
                report.entries_upserted += batch.len();
            }
            store.record_collection_hash(tenant, scan.id, collection_hash);
            report.repositories_processed += 1;
        }

        Ok(report)
    }
}
