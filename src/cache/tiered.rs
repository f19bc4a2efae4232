//! Two-tier read-through cache.
//!
//! Tier one is the hot KV store; tier two mimics an HTTP shared cache keyed
//! by the request it answered, holding the response body plus its
//! `Cache-Control` lifetime. A hit in tier two is promoted into tier one so
//! the immediate next read is a tier-one hit. Pattern invalidation only
//! touches tier one (the tracked-key index lives there).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use serde_json::Value;

use crate::storage::KvStore;

/// TTL applied when promoting a second-tier hit into the first tier.
const PROMOTION_TTL_SECS: u64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheTier {
    Kv,
    Http,
}

impl CacheTier {
    /// Value surfaced in the `X-Cache` response header.
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheTier::Kv => "kv",
            CacheTier::Http => "http",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheHit {
    pub data: Value,
    pub tier: CacheTier,
}

#[derive(Debug, Clone)]
struct HttpEntry {
    body: Value,
    cache_control: String,
    expires_at: Instant,
}

pub struct TieredCache {
    kv: Arc<KvStore>,
    http: RwLock<HashMap<String, HttpEntry>>,
}

impl TieredCache {
    pub fn new(kv: Arc<KvStore>) -> Self {
        Self {
            kv,
            http: RwLock::new(HashMap::new()),
        }
    }

    /// Tier-one lookup, then tier-two by `request_key` with promotion.
    pub fn get(&self, key: &str, request_key: Option<&str>) -> Option<CacheHit> {
        if let Some(data) = self.kv.get(key) {
            return Some(CacheHit {
                data,
                tier: CacheTier::Kv,
            });
        }

        let request_key = request_key?;
        let entry = {
            let http = self.http.read();
            http.get(request_key).cloned()
        }?;
        if entry.expires_at <= Instant::now() {
            return None;
        }

        // Promote so the next read hits tier one.
        self.kv.set(key, entry.body.clone(), PROMOTION_TTL_SECS);
        Some(CacheHit {
            data: entry.body,
            tier: CacheTier::Http,
        })
    }

    /// Write tier one and, when a request key is supplied, a synthetic
    /// second-tier response carrying `Cache-Control: public, max-age={ttl}`.
    pub fn set(&self, key: &str, data: Value, ttl_secs: u64, request_key: Option<&str>) {
        self.kv.set(key, data.clone(), ttl_secs);

        if let Some(request_key) = request_key {
            let entry = HttpEntry {
                body: data,
                cache_control: format!("public, max-age={ttl_secs}"),
                expires_at: Instant::now() + std::time::Duration::from_secs(ttl_secs),
            };
            self.http.write().insert(request_key.to_string(), entry);
        }
    }

    /// Register `key` under `pattern` for group invalidation.
    pub fn track_key(&self, pattern: &str, key: &str) {
        self.kv.track_key(pattern, key);
    }

    /// Delete every tier-one key tracked under `pattern`. The second tier
    /// expires by TTL instead.
    pub fn invalidate(&self, pattern: &str) -> usize {
        self.kv.invalidate_pattern(pattern)
    }

    /// Cache-Control header stored with a second-tier entry, for responses
    /// served from it.
    pub fn cache_control_for(&self, request_key: &str) -> Option<String> {
        self.http
            .read()
            .get(request_key)
            .map(|e| e.cache_control.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cache() -> TieredCache {
        TieredCache::new(Arc::new(KvStore::new()))
    }

    #[test]
    fn kv_hit_never_consults_second_tier() {
        let cache = cache();
        cache.set("prices:latest", json!({"v": 1}), 60, Some("req:prices"));
        let hit = cache.get("prices:latest", Some("req:prices")).unwrap();
        assert_eq!(hit.tier, CacheTier::Kv);
    }

    #[test]
    fn http_hit_promotes_into_first_tier() {
        let cache = cache();
        cache.set("prices:latest", json!({"v": 2}), 60, Some("req:prices"));
        // Evict tier one only.
        cache.kv.delete("prices:latest");

        let hit = cache.get("prices:latest", Some("req:prices")).unwrap();
        assert_eq!(hit.tier, CacheTier::Http);
        assert_eq!(hit.data["v"], 2);

        // Promotion means the very next read is a tier-one hit.
        let hit = cache.get("prices:latest", Some("req:prices")).unwrap();
        assert_eq!(hit.tier, CacheTier::Kv);
    }

    #[test]
    fn miss_when_neither_tier_holds_the_key() {
        let cache = cache();
        assert!(cache.get("prices:latest", Some("req:prices")).is_none());
        assert!(cache.get("prices:latest", None).is_none());
    }

    #[test]
    fn second_tier_entry_records_cache_control() {
        let cache = cache();
        cache.set("forward:NSW1:2025-08-23", json!([]), 3600, Some("req:forward"));
        assert_eq!(
            cache.cache_control_for("req:forward").as_deref(),
            Some("public, max-age=3600")
        );
    }

    #[test]
    fn invalidate_clears_tracked_first_tier_keys() {
        let cache = cache();
        cache.set("prices:latest", json!(1), 60, None);
        cache.set("prices:NSW1", json!(2), 60, None);
        cache.track_key("prices:*", "prices:latest");
        cache.track_key("prices:*", "prices:NSW1");

        assert_eq!(cache.invalidate("prices:*"), 2);
        assert!(cache.get("prices:latest", None).is_none());
    }
}
