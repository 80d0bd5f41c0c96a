// capgate-core/src/domain/plan/cache.rs
// ============================================================================
// Module: Plan Cache (component J)
// Description: LRU + size + TTL cache for compiled ExecutablePlans, indexed
//              by tenant and tag.
// Purpose: Implements spec §4.7/§4.8 "Plan Cache".
// Dependencies: crate::core::identifiers, crate::domain::{errors, ids,
//               plan::model}
// ============================================================================

//! ## Overview
//! [`PlanCache`] mirrors the teacher's [`crate::runtime::store`] locking
//! discipline: a single `Mutex`-protected inner state, cloned out to callers
//! rather than handing out guards. Eviction is driven by entry count, total
//! serialized size, and per-entry TTL, with LRU as the tie-breaker — matching
//! `PlanCacheService._ensure_capacity`.

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Mutex;

use crate::core::identifiers::TenantId;
use crate::domain::errors::PlanCacheError;
use crate::domain::ids::PlanId;
use crate::domain::plan::model::ExecutablePlan;

/// Tunable cache limits (spec §4.7 `CacheConfig`).
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of cached entries.
    pub max_entries: usize,
    /// Maximum total serialized size, in bytes, across all entries.
    pub max_size_bytes: usize,
    /// Default time-to-live applied to entries with no explicit `ttl_hours`.
    pub default_ttl_hours: u64,
    /// Whether LRU eviction is enabled once `max_entries` is exceeded.
    pub enable_lru_eviction: bool,
    /// Whether size-based eviction is enabled once `max_size_bytes` is exceeded.
    pub enable_size_based_eviction: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1_000,
            max_size_bytes: 100 * 1024 * 1024,
            default_ttl_hours: 24,
            enable_lru_eviction: true,
            enable_size_based_eviction: true,
        }
    }
}

/// Point-in-time cache statistics (spec §4.7 `CacheStats`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheStats {
    /// Number of entries currently cached.
    pub total_entries: usize,
    /// Cumulative cache hits since creation.
    pub hit_count: u64,
    /// Cumulative cache misses since creation.
    pub miss_count: u64,
    /// Cumulative evictions (LRU, size, or TTL) since creation.
    pub eviction_count: u64,
    /// Approximate total serialized size across all entries, in bytes.
    pub total_size_bytes: usize,
    /// `hit_count / (hit_count + miss_count)`, 0.0 with no lookups yet.
    pub hit_ratio: f64,
}

struct CacheEntry {
    plan: ExecutablePlan,
    size_bytes: usize,
    expires_at: i64,
    tags: Vec<String>,
    access_count: u64,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, CacheEntry>,
    access_order: Vec<String>,
    tenant_index: HashMap<String, HashSet<String>>,
    tag_index: HashMap<String, HashSet<String>>,
    hit_count: u64,
    miss_count: u64,
    eviction_count: u64,
}

/// A tenant-aware, LRU/size/TTL-bounded cache of compiled plans.
pub struct PlanCache {
    config: CacheConfig,
    inner: Mutex<Inner>,
}

impl PlanCache {
    /// Builds an empty cache with `config`'s limits.
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        Self { config, inner: Mutex::new(Inner::default()) }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Looks up `plan_hash` for `tenant_id`, touching LRU order and updating
    /// hit/miss counters. A tenant mismatch or an expired entry (which is
    /// evicted as a side effect) counts as a miss.
    ///
    /// # Errors
    /// Returns [`PlanCacheError::Miss`] on any miss.
    pub fn get(&self, plan_hash: &str, tenant_id: &TenantId, now: i64) -> Result<ExecutablePlan, PlanCacheError> {
        let mut inner = self.lock();

        let expired = inner.entries.get(plan_hash).is_some_and(|entry| entry.expires_at <= now);
        if expired {
            evict(&mut inner, plan_hash);
        }

        let Some(entry) = inner.entries.get_mut(plan_hash) else {
            inner.miss_count += 1;
            return Err(PlanCacheError::Miss);
        };

        if &entry.plan.tenant_id != tenant_id {
            inner.miss_count += 1;
            return Err(PlanCacheError::Miss);
        }

        entry.access_count += 1;
        let plan = entry.plan.clone();
        touch_lru(&mut inner, plan_hash);
        inner.hit_count += 1;
        Ok(plan)
    }

    /// Inserts `plan` into the cache, evicting older entries first if
    /// necessary to respect `max_entries`/`max_size_bytes`.
    ///
    /// # Errors
    /// Returns [`PlanCacheError::TooLarge`] if `plan` alone exceeds
    /// `max_size_bytes`.
    pub fn put(&self, plan: ExecutablePlan, tags: Vec<String>, ttl_hours: Option<u64>, now: i64) -> Result<(), PlanCacheError> {
        let size_bytes = serde_json::to_vec(&plan).map(|bytes| bytes.len()).unwrap_or(0);
        if size_bytes > self.config.max_size_bytes {
            return Err(PlanCacheError::TooLarge);
        }

        let mut inner = self.lock();
        ensure_capacity(&mut inner, &self.config, size_bytes, now);

        let ttl_seconds = ttl_hours.unwrap_or(self.config.default_ttl_hours) * 3_600;
        let plan_hash = plan.plan_hash.clone();
        let tenant_id = plan.tenant_id.as_str().to_string();

        evict(&mut inner, &plan_hash);

        inner.entries.insert(
            plan_hash.clone(),
            CacheEntry {
                plan,
                size_bytes,
                expires_at: now + i64::try_from(ttl_seconds).unwrap_or(i64::MAX),
                tags: tags.clone(),
                access_count: 0,
            },
        );
        inner.access_order.push(plan_hash.clone());
        inner.tenant_index.entry(tenant_id).or_default().insert(plan_hash.clone());
        for tag in tags {
            inner.tag_index.entry(tag).or_default().insert(plan_hash.clone());
        }

        Ok(())
    }

    /// Removes a single cached plan by hash.
    pub fn invalidate(&self, plan_hash: &str) {
        let mut inner = self.lock();
        evict(&mut inner, plan_hash);
    }

    /// Removes every cached plan belonging to `tenant_id`.
    pub fn invalidate_by_tenant(&self, tenant_id: &TenantId) {
        let mut inner = self.lock();
        let hashes: Vec<String> =
            inner.tenant_index.get(tenant_id.as_str()).map(|set| set.iter().cloned().collect()).unwrap_or_default();
        for hash in hashes {
            evict(&mut inner, &hash);
        }
    }

    /// Removes every cached plan tagged with `tag`.
    pub fn invalidate_by_tag(&self, tag: &str) {
        let mut inner = self.lock();
        let hashes: Vec<String> = inner.tag_index.get(tag).map(|set| set.iter().cloned().collect()).unwrap_or_default();
        for hash in hashes {
            evict(&mut inner, &hash);
        }
    }

    /// Snapshots current cache statistics.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let inner = self.lock();
        let total_lookups = inner.hit_count + inner.miss_count;
        #[allow(clippy::cast_precision_loss, reason = "lookup counts are far below f64's exact-integer range")]
        let hit_ratio = if total_lookups > 0 { inner.hit_count as f64 / total_lookups as f64 } else { 0.0 };
        CacheStats {
            total_entries: inner.entries.len(),
            hit_count: inner.hit_count,
            miss_count: inner.miss_count,
            eviction_count: inner.eviction_count,
            total_size_bytes: inner.entries.values().map(|e| e.size_bytes).sum(),
            hit_ratio,
        }
    }
}

fn touch_lru(inner: &mut Inner, plan_hash: &str) {
    if let Some(pos) = inner.access_order.iter().position(|h| h == plan_hash) {
        let hash = inner.access_order.remove(pos);
        inner.access_order.push(hash);
    }
}

fn evict(inner: &mut Inner, plan_hash: &str) {
    let Some(entry) = inner.entries.remove(plan_hash) else {
        return;
    };
    inner.access_order.retain(|h| h != plan_hash);
    if let Some(set) = inner.tenant_index.get_mut(entry.plan.tenant_id.as_str()) {
        set.remove(plan_hash);
    }
    for tag in &entry.tags {
        if let Some(set) = inner.tag_index.get_mut(tag) {
            set.remove(plan_hash);
        }
    }
    inner.eviction_count += 1;
}

fn ensure_capacity(inner: &mut Inner, config: &CacheConfig, incoming_size: usize, now: i64) {
    let expired: Vec<String> = inner
        .entries
        .iter()
        .filter(|(_, entry)| entry.expires_at <= now)
        .map(|(hash, _)| hash.clone())
        .collect();
    for hash in expired {
        evict(inner, &hash);
    }

    while config.enable_lru_eviction && inner.entries.len() >= config.max_entries {
        let Some(oldest) = inner.access_order.first().cloned() else { break };
        evict(inner, &oldest);
    }

    while config.enable_size_based_eviction
        && inner.entries.values().map(|e| e.size_bytes).sum::<usize>() + incoming_size > config.max_size_bytes
    {
        let Some(oldest) = inner.access_order.first().cloned() else { break };
        evict(inner, &oldest);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ids::FlowId;
    use crate::domain::plan::model::NewExecutablePlan;
    use crate::domain::plan::model::PlanMetadata;
    use crate::domain::plan::model::ResourceRequirement;
    use crate::domain::plan::model::SecurityContext;

    fn plan(plan_id: &str, tenant: &str) -> ExecutablePlan {
        let flow = crate::domain::plan::model::ExecutionFlow {
            flow_id: FlowId::new("main"),
            name: "main".to_string(),
            description: None,
            steps: Vec::new(),
            parallel_execution: false,
            max_concurrency: None,
            on_failure: "stop".to_string(),
            rollback_steps: Vec::new(),
            metadata: serde_json::Map::new(),
        };
        ExecutablePlan::create(NewExecutablePlan {
            plan_id: PlanId::new(plan_id),
            tenant_id: TenantId::new(tenant),
            name: "demo".to_string(),
            version: "1.0.0".to_string(),
            description: None,
            flows: vec![flow],
            main_flow: "main".to_string(),
            resource_requirements: ResourceRequirement::default(),
            security_context: SecurityContext::default(),
            metadata: PlanMetadata {
                source_capsule_name: "demo".to_string(),
                source_capsule_version: "1.0.0".to_string(),
                source_capsule_checksum: plan_id.to_string(),
                compiled_at: 0,
                compiler_version: "1.0.0".to_string(),
                resolved_dependencies: Vec::new(),
                optimization_level: "none".to_string(),
                optimization_notes: Vec::new(),
                validation_status: "valid".to_string(),
                validation_warnings: Vec::new(),
                estimated_duration: None,
                estimated_cost: None,
            },
            configuration: serde_json::Map::new(),
            variables: serde_json::Map::new(),
        })
        .expect("compiles")
    }

    #[test]
    fn put_then_get_hits_for_the_owning_tenant() {
        let cache = PlanCache::new(CacheConfig::default());
        let p = plan("plan-1", "tenant-a");
        cache.put(p.clone(), Vec::new(), None, 0).expect("inserts");
        let fetched = cache.get(&p.plan_hash, &TenantId::new("tenant-a"), 10).expect("hits");
        assert_eq!(fetched.plan_id, p.plan_id);
        assert_eq!(cache.stats().hit_count, 1);
    }

    #[test]
    fn get_misses_for_a_different_tenant() {
        let cache = PlanCache::new(CacheConfig::default());
        let p = plan("plan-1", "tenant-a");
        cache.put(p.clone(), Vec::new(), None, 0).expect("inserts");
        let result = cache.get(&p.plan_hash, &TenantId::new("tenant-b"), 10);
        assert!(matches!(result, Err(PlanCacheError::Miss)));
    }

    #[test]
    fn entry_expires_after_its_ttl() {
        let cache = PlanCache::new(CacheConfig::default());
        let p = plan("plan-1", "tenant-a");
        cache.put(p.clone(), Vec::new(), Some(1), 0).expect("inserts");
        let result = cache.get(&p.plan_hash, &TenantId::new("tenant-a"), 3_601);
        assert!(matches!(result, Err(PlanCacheError::Miss)));
    }

    #[test]
    fn max_entries_evicts_the_least_recently_used() {
        let config = CacheConfig { max_entries: 1, ..CacheConfig::default() };
        let cache = PlanCache::new(config);
        let first = plan("plan-1", "tenant-a");
        let second = plan("plan-2", "tenant-a");
        cache.put(first.clone(), Vec::new(), None, 0).expect("inserts");
        cache.put(second, Vec::new(), None, 0).expect("inserts");
        assert!(matches!(cache.get(&first.plan_hash, &TenantId::new("tenant-a"), 0), Err(PlanCacheError::Miss)));
        assert_eq!(cache.stats().total_entries, 1);
    }

    #[test]
    fn invalidate_by_tenant_clears_only_that_tenants_entries() {
        let cache = PlanCache::new(CacheConfig::default());
        let a = plan("plan-1", "tenant-a");
        let b = plan("plan-2", "tenant-b");
        cache.put(a.clone(), Vec::new(), None, 0).expect("inserts");
        cache.put(b.clone(), Vec::new(), None, 0).expect("inserts");
        cache.invalidate_by_tenant(&TenantId::new("tenant-a"));
        assert!(matches!(cache.get(&a.plan_hash, &TenantId::new("tenant-a"), 0), Err(PlanCacheError::Miss)));
        assert!(cache.get(&b.plan_hash, &TenantId::new("tenant-b"), 0).is_ok());
    }
}
