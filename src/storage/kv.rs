//! Hot key-value snapshot cache.
//!
//! In-process TTL store holding the latest JSON snapshots under stable keys
//! (`prices:latest`, `prices:{region}`, `fcas:latest`, ...). Writers are
//! best-effort; a full cache never fails ingestion. Multiple writers race
//! last-writer-wins, including the `index:<pattern>` tracking lists.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde_json::Value;

/// TTL tiers for the snapshot keys.
pub const TTL_DISPATCH_SECS: u64 = 60;
pub const TTL_TRADING_SECS: u64 = 300;
pub const TTL_FORWARD_SECS: u64 = 3_600;

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Instant,
}

#[derive(Default)]
pub struct KvStore {
    entries: RwLock<HashMap<String, Entry>>,
}

impl KvStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        let entries = self.entries.read();
        let entry = entries.get(key)?;
        if entry.expires_at <= Instant::now() {
            return None;
        }
        Some(entry.value.clone())
    }

    pub fn set(&self, key: &str, value: Value, ttl_secs: u64) {
        let entry = Entry {
            value,
            expires_at: Instant::now() + Duration::from_secs(ttl_secs),
        };
        self.entries.write().insert(key.to_string(), entry);
    }

    pub fn delete(&self, key: &str) {
        self.entries.write().remove(key);
    }

    /// Record `key` under the pattern's tracking index so it can be
    /// invalidated as a group. Read-modify-write; lost updates under
    /// concurrent writers are accepted.
    pub fn track_key(&self, pattern: &str, key: &str) {
        let index_key = format!("index:{pattern}");
        let mut keys: Vec<String> = self
            .get(&index_key)
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();
        if !keys.iter().any(|k| k == key) {
            keys.push(key.to_string());
        }
        // Tracking indexes outlive the data keys they point at.
        self.set(&index_key, serde_json::json!(keys), TTL_FORWARD_SECS * 24);
    }

    /// Delete every key recorded under the pattern's tracking index.
    pub fn invalidate_pattern(&self, pattern: &str) -> usize {
        let index_key = format!("index:{pattern}");
        let keys: Vec<String> = self
            .get(&index_key)
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();
        let count = keys.len();
        for key in &keys {
            self.delete(key);
        }
        self.delete(&index_key);
        count
    }

    /// Drop expired entries. Called opportunistically by the owner task.
    pub fn sweep(&self) {
        let now = Instant::now();
        self.entries.write().retain(|_, e| e.expires_at > now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_round_trip() {
        let kv = KvStore::new();
        kv.set("prices:latest", serde_json::json!({"ok": true}), 60);
        assert_eq!(kv.get("prices:latest").unwrap()["ok"], true);
        assert!(kv.get("missing").is_none());
    }

    #[test]
    fn zero_ttl_is_immediately_expired() {
        let kv = KvStore::new();
        kv.set("k", serde_json::json!(1), 0);
        assert!(kv.get("k").is_none());
    }

    #[test]
    fn pattern_invalidation_deletes_tracked_keys() {
        let kv = KvStore::new();
        kv.set("prices:NSW1", serde_json::json!(1), 60);
        kv.set("prices:VIC1", serde_json::json!(2), 60);
        kv.track_key("prices:*", "prices:NSW1");
        kv.track_key("prices:*", "prices:VIC1");

        let removed = kv.invalidate_pattern("prices:*");
        assert_eq!(removed, 2);
        assert!(kv.get("prices:NSW1").is_none());
        assert!(kv.get("prices:VIC1").is_none());
        // Index itself is gone too.
        assert_eq!(kv.invalidate_pattern("prices:*"), 0);
    }

    #[test]
    fn tracking_is_idempotent_per_key() {
        let kv = KvStore::new();
        kv.set("fcas:latest", serde_json::json!(1), 60);
        kv.track_key("fcas:*", "fcas:latest");
        kv.track_key("fcas:*", "fcas:latest");
        assert_eq!(kv.invalidate_pattern("fcas:*"), 1);
    }
}
