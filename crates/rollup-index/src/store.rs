// SPDX-License-Identifier: MIT OR Apache-2.0
//! Durable index storage: the authoritative, tenant-scoped record of every
//! `IndexEntry`, plus the per-scan collection-hash bookkeeping used to
//! short-circuit rebuilds of an unchanged scan.

use std::collections::HashMap;
use std::sync::Mutex;

use rollup_core::model::{ExternalReference, IndexEntry, ReferenceType, RepositoryId, ScanId, TenantId};

/// Authoritative store behind the cache tiers. Every method is tenant
/// scoped; cross-tenant reads must return empty, never another tenant's
/// rows.
pub trait IndexStore: Send + Sync {
    /// The collection hash recorded the last time `scan_id` was indexed,
    /// or `None` if it has never been indexed.
    fn stored_collection_hash(&self, tenant: TenantId, scan_id: ScanId) -> Option<String>;

    fn record_collection_hash(&self, tenant: TenantId, scan_id: ScanId, hash: String);

    /// Upsert a batch of entries, replacing any existing entry for the same
    /// `(tenant, scan_id, node_id)`.
    fn upsert_batch(&self, tenant: TenantId, entries: Vec<IndexEntry>);

    fn lookup(&self, tenant: TenantId, reference_hash: &str) -> Vec<IndexEntry>;

    fn reverse_lookup(&self, tenant: TenantId, node_id: &str) -> Vec<ExternalReference>;
}

#[derive(Default)]
struct TenantState {
    /// Keyed by `(scan_id, node_id)` so a later scan of the same node
    /// replaces rather than duplicates its entry.
    entries: HashMap<(ScanId, String), IndexEntry>,
    collection_hashes: HashMap<ScanId, String>,
}

/// In-memory `IndexStore`, suitable for tests and for embedding until a
/// concrete storage backend is wired in by the host application.
#[derive(Default)]
pub struct InMemoryIndexStore {
    tenants: Mutex<HashMap<TenantId, TenantState>>,
}

impl IndexStore for InMemoryIndexStore {
    fn stored_collection_hash(&self, tenant: TenantId, scan_id: ScanId) -> Option<String> {
        self.tenants
            .lock()
            .expect("index store mutex poisoned")
            .get(&tenant)
            .and_then(|t| t.collection_hashes.get(&scan_id).cloned())
    }

    fn record_collection_hash(&self, tenant: TenantId, scan_id: ScanId, hash: String) {
        self.tenants
            .lock()
            .expect("index store mutex poisoned")
            .entry(tenant)
            .or_default()
            .collection_hashes
            .insert(scan_id, hash);
    }

    fn upsert_batch(&self, tenant: TenantId, entries: Vec<IndexEntry>) {
        let mut tenants = self.tenants.lock().expect("index store mutex poisoned");
        let state = tenants.entry(tenant).or_default();
        for entry in entries {
            state.entries.insert((entry.scan_id, entry.node_id.clone()), entry);
        }
    }

    fn lookup(&self, tenant: TenantId, reference_hash: &str) -> Vec<IndexEntry> {
        let tenants = self.tenants.lock().expect("index store mutex poisoned");
        let Some(state) = tenants.get(&tenant) else { return Vec::new() };
        state
            .entries
            .values()
            .filter(|e| e.references.iter().any(|r| r.hash == reference_hash))
            .cloned()
            .collect()
    }

    fn reverse_lookup(&self, tenant: TenantId, node_id: &str) -> Vec<ExternalReference> {
        let tenants = self.tenants.lock().expect("index store mutex poisoned");
        let Some(state) = tenants.get(&tenant) else { return Vec::new() };
        state
            .entries
            .values()
            .filter(|e| e.node_id == node_id)
            .flat_map(|e| e.references.clone())
            .collect()
    }
}

/// Helper used by matchers/merge: narrow a reverse-lookup result to one
/// reference type.
#[must_use]
pub fn references_of_type(refs: &[ExternalReference], reference_type: ReferenceType) -> Vec<ExternalReference> {
    refs.iter().filter(|r| r.reference_type == reference_type).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn reference() -> ExternalReference {
        ExternalReference::new(ReferenceType::Arn, "x", "norm-x", 1.0)
    }

    #[test]
    fn lookup_is_empty_for_unknown_tenant() {
        let store = InMemoryIndexStore::default();
        assert!(store.lookup(Uuid::new_v4(), "h").is_empty());
    }

    #[test]
    fn cross_tenant_entries_are_never_visible() {
        let store = InMemoryIndexStore::default();
        let tenant_a = Uuid::new_v4();
        let tenant_b = Uuid::new_v4();
        let scan = Uuid::new_v4();
        let repo = Uuid::new_v4();
        let reference = reference();
        let entry = IndexEntry::new(tenant_a, scan, repo, "n1", vec![reference.clone()]).unwrap();
        store.upsert_batch(tenant_a, vec![entry]);

        assert_eq!(store.lookup(tenant_a, &reference.hash).len(), 1);
        assert!(store.lookup(tenant_b, &reference.hash).is_empty());
    }

    #[test]
    fn upsert_replaces_prior_entry_for_same_node() {
        let store = InMemoryIndexStore::default();
        let tenant = Uuid::new_v4();
        let scan = Uuid::new_v4();
        let repo = Uuid::new_v4();
        let first = IndexEntry::new(tenant, scan, repo, "n1", vec![reference()]).unwrap();
        let second_ref = ExternalReference::new(ReferenceType::Arn, "y", "norm-y", 1.0);
        let second = IndexEntry::new(tenant, scan, repo, "n1", vec![second_ref.clone()]).unwrap();
        store.upsert_batch(tenant, vec![first]);
        store.upsert_batch(tenant, vec![second]);

        let refs = store.reverse_lookup(tenant, "n1");
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].hash, second_ref.hash);
    }
}
