// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]

//! The External Object Index: a tenant-partitioned lookup from
//! `ExternalReference` hash to the nodes that carry it, and back again.
//!
//! Reads go L1 → L2 → store (a miss anywhere is not an error, just an empty
//! result); builds run under a per-tenant lock and upsert in batches,
//! short-circuiting a repository whose scan hasn't changed since the last
//! build.

pub mod build;
pub mod cache;
pub mod store;

use std::time::Duration;

use rollup_core::model::{ExternalReference, IndexEntry, RepositoryId, TenantId};
use rollup_error::RollupResult;

pub use build::{BuildReport, GraphProvider, IndexBuildOptions, IndexBuilder};
pub use cache::{InMemoryL2Store, L1Cache, L2Store, ObjectCache, TieredCache};
pub use store::{references_of_type, IndexStore, InMemoryIndexStore};

/// Tuning knobs for the cache tiers, independent of the build engine.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub l1_capacity_per_tenant: usize,
    pub l1_ttl: Duration,
    pub l2_ttl: Duration,
    pub l2_stale_while_revalidate: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            l1_capacity_per_tenant: 10_000,
            l1_ttl: Duration::from_secs(60),
            l2_ttl: Duration::from_secs(600),
            l2_stale_while_revalidate: Duration::from_secs(30),
        }
    }
}

/// The full External Object Index: cache tiers in front of an authoritative
/// store, plus the build engine that populates the store.
pub struct ExternalObjectIndex<C: ObjectCache, S: IndexStore> {
    cache: C,
    store: S,
    builder: IndexBuilder,
}

impl<S: IndexStore> ExternalObjectIndex<TieredCache<InMemoryL2Store>, S> {
    /// Convenience constructor wiring the standard in-memory tiered cache
    /// over a caller-supplied store.
    #[must_use]
    pub fn with_in_memory_cache(store: S, cache_config: &CacheConfig) -> Self {
        let cache = TieredCache::new(
            "ext-obj-idx",
            L1Cache::new(cache_config.l1_capacity_per_tenant, cache_config.l1_ttl),
            InMemoryL2Store::default(),
            cache_config.l2_ttl,
            cache_config.l2_stale_while_revalidate,
        );
        Self { cache, store, builder: IndexBuilder::default() }
    }
}

impl<C: ObjectCache, S: IndexStore> ExternalObjectIndex<C, S> {
    #[must_use]
    pub fn new(cache: C, store: S, builder: IndexBuilder) -> Self {
        Self { cache, store, builder }
    }

    /// `lookup(tenant, referenceHash) -> [IndexEntry]`. A miss at every tier
    /// returns an empty vector, never an error.
    #[must_use]
    pub fn lookup(&self, tenant: TenantId, reference_hash: &str) -> Vec<IndexEntry> {
        if let Some(hit) = self.cache.get(tenant, reference_hash) {
            return hit;
        }
        let entries = self.store.lookup(tenant, reference_hash);
        if !entries.is_empty() {
            self.cache.put(tenant, reference_hash, entries.clone());
        }
        entries
    }

    /// `reverseLookup(tenant, nodeId) -> [ExternalReference]`. Bypasses the
    /// hash-keyed cache tiers since this is keyed by node, not reference
    /// hash; always reads the authoritative store.
    #[must_use]
    pub fn reverse_lookup(&self, tenant: TenantId, node_id: &str) -> Vec<ExternalReference> {
        self.store.reverse_lookup(tenant, node_id)
    }

    /// Build or rebuild the index for `repository_ids`. See
    /// [`IndexBuilder::build`] for the failure model.
    pub async fn build(
        &self,
        tenant: TenantId,
        repository_ids: &[RepositoryId],
        options: &IndexBuildOptions,
        provider: &dyn GraphProvider,
    ) -> RollupResult<BuildReport> {
        let report = self.builder.build(tenant, repository_ids, options, provider, &self.store).await?;
        Ok(report)
    }

    /// Upsert already-extracted entries directly, bypassing the build
    /// engine's own fetch. For a caller that already holds fetched nodes
    /// and extracted references (the Executor, mid-execution) this avoids
    /// re-fetching through a [`GraphProvider`] just to populate the store.
    pub fn upsert(&self, tenant: TenantId, entries: Vec<IndexEntry>) {
        self.store.upsert_batch(tenant, entries);
    }
}

/// Object-safe facade over [`ExternalObjectIndex`] so consumer crates can
/// hold one behind `Arc<dyn IndexHandle>` without taking on its cache/store
/// type parameters.
pub trait IndexHandle: Send + Sync {
    fn lookup(&self, tenant: TenantId, reference_hash: &str) -> Vec<IndexEntry>;
    fn reverse_lookup(&self, tenant: TenantId, node_id: &str) -> Vec<ExternalReference>;
    fn upsert(&self, tenant: TenantId, entries: Vec<IndexEntry>);
}

impl<C: ObjectCache, S: IndexStore> IndexHandle for ExternalObjectIndex<C, S> {
    fn lookup(&self, tenant: TenantId, reference_hash: &str) -> Vec<IndexEntry> {
        ExternalObjectIndex::lookup(self, tenant, reference_hash)
    }

    fn reverse_lookup(&self, tenant: TenantId, node_id: &str) -> Vec<ExternalReference> {
        ExternalObjectIndex::reverse_lookup(self, tenant, node_id)
    }

    fn upsert(&self, tenant: TenantId, entries: Vec<IndexEntry>) {
        ExternalObjectIndex::upsert(self, tenant, entries)
    }
}
