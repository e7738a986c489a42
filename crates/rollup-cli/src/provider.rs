// SPDX-License-Identifier: MIT OR Apache-2.0
//! A [`RepositoryGraphProvider`] that reads fixture graphs from disk, for
//! local operation and smoke testing without a live scanner (§4.10).

use std::path::PathBuf;

use async_trait::async_trait;
use rollup_core::model::{Edge, Node, RepositoryId, ScanId, TenantId};
use rollup_error::{ErrorCode, RollupError, RollupResult};
use rollup_executor::RepositoryGraphProvider;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct GraphFixture {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
}

/// Reads `<dir>/<repository_id>.json` files shaped `{"nodes": [...], "edges": [...]}`.
pub struct FileGraphProvider {
    dir: PathBuf,
}

impl FileGraphProvider {
    #[must_use]
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }
}

#[async_trait]
impl RepositoryGraphProvider for FileGraphProvider {
    async fn fetch_graph(&self, _tenant: TenantId, repository_id: RepositoryId, _scan_id: ScanId) -> RollupResult<(Vec<Node>, Vec<Edge>)> {
        let path = self.dir.join(format!("{repository_id}.json"));
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| RollupError::new(ErrorCode::ExecFetchFailed, format!("reading graph fixture {}: {e}", path.display())))?;
        let fixture: GraphFixture = serde_json::from_str(&content)
            .map_err(|e| RollupError::new(ErrorCode::ExecFetchFailed, format!("parsing graph fixture {}: {e}", path.display())))?;
        Ok((fixture.nodes, fixture.edges))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn missing_fixture_reports_fetch_failed() {
        let dir = tempfile::tempdir().unwrap();
        let provider = FileGraphProvider::new(dir.path().to_path_buf());
        let err = provider.fetch_graph(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ExecFetchFailed);
    }

    #[tokio::test]
    async fn reads_well_formed_fixture() {
        let dir = tempfile::tempdir().unwrap();
        let repository_id = Uuid::new_v4();
        std::fs::write(
            dir.path().join(format!("{repository_id}.json")),
            r#"{"nodes":[{"id":"n1","type":"aws_s3_bucket","name":"n1","metadata":{},"location":null}],"edges":[]}"#,
        )
        .unwrap();
        let provider = FileGraphProvider::new(dir.path().to_path_buf());
        let (nodes, edges) = provider.fetch_graph(Uuid::new_v4(), repository_id, Uuid::new_v4()).await.unwrap();
        assert_eq!(nodes.len(), 1);
        assert!(edges.is_empty());
    }
}
