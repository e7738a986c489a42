// SPDX-License-Identifier: MIT OR Apache-2.0
//! Persistence seams the Storing phase writes through. "Partial state is
//! not persisted: either the merged graph is stored in its entirety or the
//! execution transitions to `failed` and leaves no merged-graph record"
//! (§4.7).

use std::collections::HashMap;
use std::sync::Mutex;

use rollup_core::model::TenantId;
use rollup_core::rollup::{MergedGraph, RollupExecution};
use uuid::Uuid;

pub trait ExecutionStore: Send + Sync {
    fn put(&self, execution: RollupExecution);
    fn get(&self, execution_id: Uuid) -> Option<RollupExecution>;
    /// Every execution recorded for `rollup_id` under `tenant_id`, most
    /// recently started first.
    fn list(&self, tenant_id: TenantId, rollup_id: Uuid) -> Vec<RollupExecution>;
}

pub trait MergedGraphStore: Send + Sync {
    fn put(&self, graph: MergedGraph);
    fn get(&self, execution_id: Uuid) -> Option<MergedGraph>;
}

#[derive(Default)]
pub struct InMemoryExecutionStore {
    executions: Mutex<HashMap<Uuid, RollupExecution>>,
}

impl InMemoryExecutionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ExecutionStore for InMemoryExecutionStore {
    fn put(&self, execution: RollupExecution) {
        self.executions.lock().expect("execution store mutex poisoned").insert(execution.id, execution);
    }

    fn get(&self, execution_id: Uuid) -> Option<RollupExecution> {
        self.executions.lock().expect("execution store mutex poisoned").get(&execution_id).cloned()
    }

    fn list(&self, tenant_id: TenantId, rollup_id: Uuid) -> Vec<RollupExecution> {
        let mut executions: Vec<RollupExecution> = self
            .executions
            .lock()
            .expect("execution store mutex poisoned")
            .values()
            .filter(|e| e.tenant_id == tenant_id && e.rollup_id == rollup_id)
            .cloned()
            .collect();
        executions.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        executions
    }
}

#[derive(Default)]
pub struct InMemoryMergedGraphStore {
    graphs: Mutex<HashMap<Uuid, MergedGraph>>,
}

impl InMemoryMergedGraphStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl MergedGraphStore for InMemoryMergedGraphStore {
    fn put(&self, graph: MergedGraph) {
        self.graphs.lock().expect("merged graph store mutex poisoned").insert(graph.execution_id, graph);
    }

    fn get(&self, execution_id: Uuid) -> Option<MergedGraph> {
        self.graphs.lock().expect("merged graph store mutex poisoned").get(&execution_id).cloned()
    }
}
