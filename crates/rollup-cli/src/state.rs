// SPDX-License-Identifier: MIT OR Apache-2.0
//! Local on-disk persistence for the CLI's in-memory stores. The Service
//! facade itself is storage-agnostic (§4.8); this module is the thin,
//! file-backed adapter a one-shot CLI process needs to survive between
//! invocations without standing up a real database.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use rollup_core::model::TenantId;
use rollup_core::rollup::{MergedGraph, RollupConfig, RollupExecution};
use rollup_executor::store::{ExecutionStore, InMemoryExecutionStore, InMemoryMergedGraphStore, MergedGraphStore};
use rollup_service::store::{InMemoryRollupStore, RollupStore};
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default)]
    rollups: Vec<RollupConfig>,
    #[serde(default)]
    executions: Vec<RollupExecution>,
    #[serde(default)]
    graphs: Vec<MergedGraph>,
}

/// One tenant's rollup/execution/merged-graph state, loaded from and
/// flushed back to a single JSON file under the configured state
/// directory.
pub struct LocalState {
    pub rollup_store: Arc<InMemoryRollupStore>,
    pub execution_store: Arc<InMemoryExecutionStore>,
    pub graph_store: Arc<InMemoryMergedGraphStore>,
    path: PathBuf,
    tenant_id: TenantId,
}

impl LocalState {
    /// Loads `<state_dir>/<tenant_id>.json`, or starts empty if it doesn't
    /// exist yet.
    pub fn load(state_dir: &Path, tenant_id: TenantId) -> Result<Self> {
        let path = state_dir.join(format!("{tenant_id}.json"));
        let snapshot = if path.exists() {
            let content = std::fs::read_to_string(&path).with_context(|| format!("read state file '{}'", path.display()))?;
            serde_json::from_str(&content).with_context(|| format!("parse state file '{}'", path.display()))?
        } else {
            Snapshot::default()
        };

        let rollup_store = InMemoryRollupStore::new();
        for config in snapshot.rollups {
            rollup_store.put(config);
        }
        let execution_store = InMemoryExecutionStore::new();
        for execution in snapshot.executions {
            execution_store.put(execution);
        }
        let graph_store = InMemoryMergedGraphStore::new();
        for graph in snapshot.graphs {
            graph_store.put(graph);
        }

        Ok(Self { rollup_store: Arc::new(rollup_store), execution_store: Arc::new(execution_store), graph_store: Arc::new(graph_store), path, tenant_id })
    }

    /// Writes this tenant's current state back to disk, creating the state
    /// directory if needed.
    pub fn save(&self) -> Result<()> {
        let rollups = self.rollup_store.list(self.tenant_id);
        let mut executions = Vec::new();
        for rollup in &rollups {
            executions.extend(self.execution_store.list(self.tenant_id, rollup.id));
        }
        let graphs = executions.iter().filter_map(|e| self.graph_store.get(e.id)).collect();

        let snapshot = Snapshot { rollups, executions, graphs };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).with_context(|| format!("create state directory '{}'", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(&snapshot).context("serialize state snapshot")?;
        std::fs::write(&self.path, content).with_context(|| format!("write state file '{}'", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollup_core::rollup::RollupConfigBuilder;
    use uuid::Uuid;

    #[test]
    fn round_trips_a_rollup_across_load_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let tenant_id = Uuid::new_v4();
        let config = RollupConfigBuilder::new(tenant_id, "demo").repository(Uuid::new_v4()).repository(Uuid::new_v4()).build();
        let config_id = config.id;

        let state = LocalState::load(dir.path(), tenant_id).unwrap();
        state.rollup_store.put(config);
        state.save().unwrap();

        let reloaded = LocalState::load(dir.path(), tenant_id).unwrap();
        assert!(reloaded.rollup_store.get(tenant_id, config_id).is_some());
    }

    #[test]
    fn missing_state_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let state = LocalState::load(dir.path(), Uuid::new_v4()).unwrap();
        assert!(state.rollup_store.list(Uuid::new_v4()).is_empty());
    }
}
