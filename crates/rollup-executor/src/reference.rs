// SPDX-License-Identifier: MIT OR Apache-2.0
//! Per-execution reference map: runs the standard extractor registry once
//! over every fetched node, upserts the result into the tenant's
//! `rollup-index` (so repeated and cross-repository queries are served from
//! the cached, persisted index rather than this execution's transient
//! extraction), and serves both the Match Engine's `ReferenceLookup` seam
//! and candidate-pair generation from the index read-through.

use std::collections::HashMap;
use std::sync::Arc;

use rollup_core::model::{ExternalReference, IndexEntry, ScanId, TenantId};
use rollup_extract::ExtractorRegistry;
use rollup_index::IndexHandle;
use rollup_match::{NullReferenceLookup, ReferenceLookup, ScopedNode};

/// Node references extracted fresh for one execution, keyed by the same
/// `(scan_id, node_id)` pair the Match Engine addresses nodes with.
pub struct LocalReferenceLookup {
    references: HashMap<(ScanId, String), Vec<ExternalReference>>,
}

impl LocalReferenceLookup {
    #[must_use]
    pub fn build(nodes: &[ScopedNode], registry: &ExtractorRegistry) -> Self {
        let mut references = HashMap::with_capacity(nodes.len());
        for scoped in nodes {
            references.insert(scoped.key(), registry.extract_all(scoped.node));
        }
        Self { references }
    }

    /// Generates deduplicated `(i, j)` index pairs for nodes that share at
    /// least one reference hash, the Index-seeded candidate set
    /// `MatchEngine::run` expects (§4.4).
    #[must_use]
    pub fn candidate_pairs(&self, nodes: &[ScopedNode]) -> Vec<(usize, usize)> {
        let mut by_hash: HashMap<&str, Vec<usize>> = HashMap::new();
        for (idx, scoped) in nodes.iter().enumerate() {
            let Some(refs) = self.references.get(&scoped.key()) else { continue };
            for reference in refs {
                by_hash.entry(reference.hash.as_str()).or_default().push(idx);
            }
        }
        let mut pairs = std::collections::BTreeSet::new();
        for indices in by_hash.values() {
            for (a_pos, &a) in indices.iter().enumerate() {
                for &b in &indices[a_pos + 1..] {
                    pairs.insert(if a < b { (a, b) } else { (b, a) });
                }
            }
        }
        pairs.into_iter().collect()
    }
}

impl ReferenceLookup for LocalReferenceLookup {
    fn references_for(&self, _tenant: TenantId, scan_id: ScanId, node_id: &str) -> Vec<ExternalReference> {
        self.references.get(&(scan_id, node_id.to_string())).cloned().unwrap_or_default()
    }
}

/// Stand-in used when an execution has no nodes to extract from, to avoid
/// an `Option<Box<dyn ReferenceLookup>>` at call sites.
#[must_use]
pub fn null_lookup() -> NullReferenceLookup {
    NullReferenceLookup
}

/// Upserts `local`'s freshly extracted references into `index`, one
/// [`IndexEntry`] per node that carries at least one reference (§3's
/// non-empty-references invariant). Nodes with no extracted references are
/// skipped rather than written as empty entries.
pub fn seed_index(index: &dyn IndexHandle, tenant: TenantId, nodes: &[ScopedNode], local: &LocalReferenceLookup) {
    let mut entries = Vec::new();
    for scoped in nodes {
        let (scan_id, node_id) = scoped.key();
        let Some(refs) = local.references.get(&(scan_id, node_id.clone())) else { continue };
        if refs.is_empty() {
            continue;
        }
        if let Ok(entry) = IndexEntry::new(tenant, scan_id, scoped.repository_id, node_id, refs.clone()) {
            entries.push(entry);
        }
    }
    if !entries.is_empty() {
        index.upsert(tenant, entries);
    }
}

/// Serves the Match Engine's `ReferenceLookup` seam from the persisted,
/// cached `rollup-index` rather than a private per-execution map — the
/// seam [`seed_index`] just wrote through to. Keyed only by node id since
/// [`IndexHandle::reverse_lookup`] is scan-agnostic (an index entry is
/// replaced, not duplicated, on a later scan of the same node).
pub struct IndexedReferenceLookup {
    index: Arc<dyn IndexHandle>,
}

impl IndexedReferenceLookup {
    #[must_use]
    pub fn new(index: Arc<dyn IndexHandle>) -> Self {
        Self { index }
    }
}

impl ReferenceLookup for IndexedReferenceLookup {
    fn references_for(&self, tenant: TenantId, _scan_id: ScanId, node_id: &str) -> Vec<ExternalReference> {
        self.index.reverse_lookup(tenant, node_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollup_core::model::Node;
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn arn_node(id: &str, arn: &str) -> Node {
        let mut metadata = BTreeMap::new();
        metadata.insert("arn".to_string(), rollup_core::model::MetadataValue::String(arn.to_string()));
        Node { id: id.to_string(), r#type: "aws_s3_bucket".into(), name: id.to_string(), metadata, location: None }
    }

    #[test]
    fn nodes_sharing_an_arn_become_a_candidate_pair() {
        let a = arn_node("n1", "arn:aws:s3:::bucket");
        let b = arn_node("n2", "arn:aws:s3:::bucket");
        let scan_a = Uuid::new_v4();
        let scan_b = Uuid::new_v4();
        let repo_a = Uuid::new_v4();
        let repo_b = Uuid::new_v4();
        let nodes = vec![
            ScopedNode { scan_id: scan_a, repository_id: repo_a, node: &a },
            ScopedNode { scan_id: scan_b, repository_id: repo_b, node: &b },
        ];
        let registry = ExtractorRegistry::standard();
        let lookup = LocalReferenceLookup::build(&nodes, &registry);
        assert_eq!(lookup.candidate_pairs(&nodes), vec![(0, 1)]);
    }

    #[test]
    fn unrelated_nodes_produce_no_candidate_pairs() {
        let a = arn_node("n1", "arn:aws:s3:::bucket-a");
        let b = arn_node("n2", "arn:aws:s3:::bucket-b");
        let scan = Uuid::new_v4();
        let repo = Uuid::new_v4();
        let nodes = vec![ScopedNode { scan_id: scan, repository_id: repo, node: &a }, ScopedNode { scan_id: scan, repository_id: repo, node: &b }];
        let registry = ExtractorRegistry::standard();
        let lookup = LocalReferenceLookup::build(&nodes, &registry);
        assert!(lookup.candidate_pairs(&nodes).is_empty());
    }

    #[test]
    fn seeded_entries_are_readable_through_the_indexed_lookup() {
        let tenant = Uuid::new_v4();
        let a = arn_node("n1", "arn:aws:s3:::bucket");
        let scan = Uuid::new_v4();
        let repo = Uuid::new_v4();
        let nodes = vec![ScopedNode { scan_id: scan, repository_id: repo, node: &a }];
        let registry = ExtractorRegistry::standard();
        let local = LocalReferenceLookup::build(&nodes, &registry);

        let index: Arc<dyn IndexHandle> = Arc::new(rollup_index::ExternalObjectIndex::with_in_memory_cache(
            rollup_index::InMemoryIndexStore::default(),
            &rollup_index::CacheConfig::default(),
        ));
        seed_index(index.as_ref(), tenant, &nodes, &local);

        let indexed = IndexedReferenceLookup::new(index);
        let refs = indexed.references_for(tenant, scan, "n1");
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].normalized_identifier, "arn:aws:s3:::bucket");
    }

    #[test]
    fn node_with_no_references_is_not_written_to_the_index() {
        let tenant = Uuid::new_v4();
        let plain = Node { id: "n1".into(), r#type: "aws_s3_bucket".into(), name: "n1".into(), metadata: BTreeMap::new(), location: None };
        let scan = Uuid::new_v4();
        let repo = Uuid::new_v4();
        let nodes = vec![ScopedNode { scan_id: scan, repository_id: repo, node: &plain }];
        let registry = ExtractorRegistry::standard();
        let local = LocalReferenceLookup::build(&nodes, &registry);

        let index: Arc<dyn IndexHandle> = Arc::new(rollup_index::ExternalObjectIndex::with_in_memory_cache(
            rollup_index::InMemoryIndexStore::default(),
            &rollup_index::CacheConfig::default(),
        ));
        seed_index(index.as_ref(), tenant, &nodes, &local);
        assert!(index.reverse_lookup(tenant, "n1").is_empty());
    }
}
