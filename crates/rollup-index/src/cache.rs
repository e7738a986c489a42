// SPDX-License-Identifier: MIT OR Apache-2.0
//! Two-tier cache over `(tenant, reference_hash) -> [IndexEntry]` lookups.
//!
//! L1 is an in-process, bounded, per-tenant LRU with a TTL per entry. L2 is
//! a shared store behind the [`L2Store`] trait, also TTL'd, with an
//! optional stale-while-revalidate window. Both tiers key on
//! `<prefix>:<tenant>:<reference_hash>` so a single [`InMemoryL2Store`] can
//! back more than one index instance in tests without key collisions.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use rollup_core::model::{IndexEntry, TenantId};

/// Unifies the L1/L2 tiers behind one contract so the index never has to
/// know which tier served a hit.
pub trait ObjectCache: Send + Sync {
    fn get(&self, tenant: TenantId, reference_hash: &str) -> Option<Vec<IndexEntry>>;
    fn put(&self, tenant: TenantId, reference_hash: &str, entries: Vec<IndexEntry>);
    fn invalidate(&self, tenant: TenantId, reference_hash: &str);
}

/// A shared L2 store: out-of-process in a real deployment, in-memory here.
pub trait L2Store: Send + Sync {
    fn get(&self, key: &str) -> Option<(Vec<IndexEntry>, Instant)>;
    fn put(&self, key: &str, entries: Vec<IndexEntry>);
    fn invalidate(&self, key: &str);
}

struct LruEntry {
    entries: Vec<IndexEntry>,
    expires_at: Instant,
}

/// Bounded, TTL'd LRU. No external crate in this tree carries an LRU type,
/// so eviction order is tracked by hand with a `VecDeque` of keys.
struct TenantLru {
    capacity: usize,
    ttl: Duration,
    map: HashMap<String, LruEntry>,
    order: VecDeque<String>,
}

impl TenantLru {
    fn new(capacity: usize, ttl: Duration) -> Self {
        Self { capacity, ttl, map: HashMap::new(), order: VecDeque::new() }
    }

    fn touch(&mut self, key: &str) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            self.order.remove(pos);
        }
        self.order.push_back(key.to_string());
    }

    fn get(&mut self, key: &str) -> Option<Vec<IndexEntry>> {
        let now = Instant::now();
        let expired = self.map.get(key).is_some_and(|e| e.expires_at <= now);
        if expired {
            self.map.remove(key);
            if let Some(pos) = self.order.iter().position(|k| k == key) {
                self.order.remove(pos);
            }
            return None;
        }
        let value = self.map.get(key).map(|e| e.entries.clone());
        if value.is_some() {
            self.touch(key);
        }
        value
    }

    fn put(&mut self, key: &str, entries: Vec<IndexEntry>) {
        self.map.insert(
            key.to_string(),
            LruEntry { entries, expires_at: Instant::now() + self.ttl },
        );
        self.touch(key);
        while self.map.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.map.remove(&oldest);
            } else {
                break;
            }
        }
    }

    fn invalidate(&mut self, key: &str) {
        self.map.remove(key);
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            self.order.remove(pos);
        }
    }
}

/// Per-process L1 tier, partitioned per tenant so one tenant's working set
/// never evicts another's.
pub struct L1Cache {
    capacity_per_tenant: usize,
    ttl: Duration,
    tenants: Mutex<HashMap<TenantId, TenantLru>>,
}

impl L1Cache {
    #[must_use]
    pub fn new(capacity_per_tenant: usize, ttl: Duration) -> Self {
        Self { capacity_per_tenant, ttl, tenants: Mutex::new(HashMap::new()) }
    }

    fn get(&self, tenant: TenantId, key: &str) -> Option<Vec<IndexEntry>> {
        let mut tenants = self.tenants.lock().expect("L1 cache mutex poisoned");
        tenants.get_mut(&tenant).and_then(|lru| lru.get(key))
    }

    fn put(&self, tenant: TenantId, key: &str, entries: Vec<IndexEntry>) {
        let mut tenants = self.tenants.lock().expect("L1 cache mutex poisoned");
        tenants
            .entry(tenant)
            .or_insert_with(|| TenantLru::new(self.capacity_per_tenant, self.ttl))
            .put(key, entries);
    }

    fn invalidate(&self, tenant: TenantId, key: &str) {
        let mut tenants = self.tenants.lock().expect("L1 cache mutex poisoned");
        if let Some(lru) = tenants.get_mut(&tenant) {
            lru.invalidate(key);
        }
    }
}

/// In-memory stand-in for a shared L2 store (Redis, memcached, etc. in a
/// real deployment).
#[derive(Default)]
pub struct InMemoryL2Store {
    entries: Mutex<HashMap<String, (Vec<IndexEntry>, Instant)>>,
}

impl L2Store for InMemoryL2Store {
    fn get(&self, key: &str) -> Option<(Vec<IndexEntry>, Instant)> {
        self.entries.lock().expect("L2 store mutex poisoned").get(key).cloned()
    }

    fn put(&self, key: &str, entries: Vec<IndexEntry>) {
        self.entries
            .lock()
            .expect("L2 store mutex poisoned")
            .insert(key.to_string(), (entries, Instant::now()));
    }

    fn invalidate(&self, key: &str) {
        self.entries.lock().expect("L2 store mutex poisoned").remove(key);
    }
}

/// Composes L1 + L2 behind the [`ObjectCache`] contract: reads try L1, then
/// L2 (repopulating L1 on an L2 hit); writes go to L2 first and invalidate
/// L1, so a stale L1 entry is never served after an authoritative write.
pub struct TieredCache<S: L2Store> {
    prefix: String,
    l1: L1Cache,
    l2: S,
    l2_ttl: Duration,
    stale_while_revalidate: Duration,
}

impl<S: L2Store> TieredCache<S> {
    #[must_use]
    pub fn new(
        prefix: impl Into<String>,
        l1: L1Cache,
        l2: S,
        l2_ttl: Duration,
        stale_while_revalidate: Duration,
    ) -> Self {
        Self { prefix: prefix.into(), l1, l2, l2_ttl, stale_while_revalidate }
    }

    fn l2_key(&self, tenant: TenantId, reference_hash: &str) -> String {
        format!("{}:{}:{}", self.prefix, tenant, reference_hash)
    }
}

impl<S: L2Store> ObjectCache for TieredCache<S> {
    fn get(&self, tenant: TenantId, reference_hash: &str) -> Option<Vec<IndexEntry>> {
        if let Some(hit) = self.l1.get(tenant, reference_hash) {
            return Some(hit);
        }

        let key = self.l2_key(tenant, reference_hash);
        let (entries, stored_at) = self.l2.get(&key)?;
        let age = stored_at.elapsed();
        if age > self.l2_ttl + self.stale_while_revalidate {
            return None;
        }
        self.l1.put(tenant, reference_hash, entries.clone());
        Some(entries)
    }

    fn put(&self, tenant: TenantId, reference_hash: &str, entries: Vec<IndexEntry>) {
        let key = self.l2_key(tenant, reference_hash);
        self.l2.put(&key, entries);
        self.l1.invalidate(tenant, reference_hash);
    }

    fn invalidate(&self, tenant: TenantId, reference_hash: &str) {
        let key = self.l2_key(tenant, reference_hash);
        self.l2.invalidate(&key);
        self.l1.invalidate(tenant, reference_hash);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollup_core::model::ExternalReference;
    use rollup_core::model::ReferenceType;
    use uuid::Uuid;

    fn entry() -> IndexEntry {
        let reference = ExternalReference::new(ReferenceType::Arn, "x", "x", 1.0);
        IndexEntry::new(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), "n1", vec![reference]).unwrap()
    }

    #[test]
    fn l1_hit_avoids_l2_lookup() {
        let cache = TieredCache::new(
            "idx",
            L1Cache::new(10, Duration::from_secs(60)),
            InMemoryL2Store::default(),
            Duration::from_secs(60),
            Duration::from_secs(0),
        );
        let tenant = Uuid::new_v4();
        cache.put(tenant, "h1", vec![entry()]);
        assert!(cache.get(tenant, "h1").is_some());
    }

    #[test]
    fn write_invalidates_l1_for_same_key() {
        let cache = TieredCache::new(
            "idx",
            L1Cache::new(10, Duration::from_secs(60)),
            InMemoryL2Store::default(),
            Duration::from_secs(60),
            Duration::from_secs(0),
        );
        let tenant = Uuid::new_v4();
        cache.put(tenant, "h1", vec![entry()]);
        cache.get(tenant, "h1");
        cache.put(tenant, "h1", vec![entry(), entry()]);
        assert_eq!(cache.get(tenant, "h1").unwrap().len(), 2);
    }

    #[test]
    fn tenants_do_not_share_l1_entries() {
        let cache = TieredCache::new(
            "idx",
            L1Cache::new(10, Duration::from_secs(60)),
            InMemoryL2Store::default(),
            Duration::from_secs(60),
            Duration::from_secs(0),
        );
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        cache.put(a, "h1", vec![entry()]);
        assert!(cache.get(b, "h1").is_none());
    }

    #[test]
    fn l1_evicts_least_recently_used_beyond_capacity() {
        let mut lru = TenantLru::new(2, Duration::from_secs(60));
        lru.put("a", vec![entry()]);
        lru.put("b", vec![entry()]);
        lru.get("a");
        lru.put("c", vec![entry()]);
        assert!(lru.get("b").is_none());
        assert!(lru.get("a").is_some());
        assert!(lru.get("c").is_some());
    }
}
