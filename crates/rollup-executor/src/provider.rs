// SPDX-License-Identifier: MIT OR Apache-2.0
//! External collaborator the Fetching phase pulls repository graphs from.
//! "The core does not fetch source; it receives graph results" (§3).

use async_trait::async_trait;
use rollup_core::model::{Edge, Node, RepositoryId, ScanId, TenantId};
use rollup_error::RollupResult;

/// Supplies one repository's full dependency graph (nodes and edges) for a
/// given scan. Distinct from `rollup-index`'s `GraphProvider`, which only
/// needs nodes to feed the extractor registry.
#[async_trait]
pub trait RepositoryGraphProvider: Send + Sync {
    async fn fetch_graph(&self, tenant: TenantId, repository_id: RepositoryId, scan_id: ScanId) -> RollupResult<(Vec<Node>, Vec<Edge>)>;
}
