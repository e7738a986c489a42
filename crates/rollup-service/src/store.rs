// SPDX-License-Identifier: MIT OR Apache-2.0
//! Durable storage for [`RollupConfig`] values: the `rollup_config` table
//! from the persisted state layout (§6). Every method is tenant scoped.

use std::collections::HashMap;
use std::sync::Mutex;

use rollup_core::model::TenantId;
use rollup_core::rollup::RollupConfig;
use uuid::Uuid;

pub trait RollupStore: Send + Sync {
    fn put(&self, config: RollupConfig);
    fn get(&self, tenant_id: TenantId, id: Uuid) -> Option<RollupConfig>;
    fn list(&self, tenant_id: TenantId) -> Vec<RollupConfig>;
}

/// In-memory `RollupStore`, suitable for tests and for embedding until a
/// concrete storage backend is wired in by the host application.
#[derive(Default)]
pub struct InMemoryRollupStore {
    tenants: Mutex<HashMap<TenantId, HashMap<Uuid, RollupConfig>>>,
}

impl InMemoryRollupStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl RollupStore for InMemoryRollupStore {
    fn put(&self, config: RollupConfig) {
        self.tenants.lock().expect("rollup store mutex poisoned").entry(config.tenant_id).or_default().insert(config.id, config);
    }

    fn get(&self, tenant_id: TenantId, id: Uuid) -> Option<RollupConfig> {
        self.tenants.lock().expect("rollup store mutex poisoned").get(&tenant_id).and_then(|t| t.get(&id)).cloned()
    }

    fn list(&self, tenant_id: TenantId) -> Vec<RollupConfig> {
        self.tenants.lock().expect("rollup store mutex poisoned").get(&tenant_id).map(|t| t.values().cloned().collect()).unwrap_or_default()
    }
}
