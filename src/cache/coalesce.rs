//! Single-flight request coalescer.
//!
//! Concurrent cache misses for the same key would otherwise each hit the
//! relational store; the first caller becomes the producer and everyone else
//! awaits its shared result. The in-flight entry is removed whether the
//! producer succeeds or fails, so errors never strand a key.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures_util::future::{FutureExt, Shared};
use parking_lot::Mutex;
use serde_json::Value;

type SharedResult = Result<Value, String>;
type SharedFuture = Shared<Pin<Box<dyn Future<Output = SharedResult> + Send>>>;

#[derive(Default)]
pub struct RequestCoalescer {
    inflight: Mutex<HashMap<String, SharedFuture>>,
}

impl RequestCoalescer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `producer` for `key`, or piggyback on the producer already in
    /// flight for the same key.
    pub async fn run<F>(&self, key: &str, producer: F) -> anyhow::Result<Value>
    where
        F: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        let (future, is_leader) = {
            let mut inflight = self.inflight.lock();
            if let Some(existing) = inflight.get(key) {
                (existing.clone(), false)
            } else {
                let shared: SharedFuture = producer
                    .map(|r| r.map_err(|e| format!("{e:#}")))
                    .boxed()
                    .shared();
                inflight.insert(key.to_string(), shared.clone());
                (shared, true)
            }
        };

        let result = future.await;

        if is_leader {
            self.inflight.lock().remove(key);
        }

        result.map_err(|e| anyhow::anyhow!(e))
    }

    /// Number of keys currently in flight (diagnostics).
    pub fn inflight_count(&self) -> usize {
        self.inflight.lock().len()
    }
}

/// Process-wide coalescer shared by all API handlers.
pub fn global() -> &'static Arc<RequestCoalescer> {
    static GLOBAL: std::sync::OnceLock<Arc<RequestCoalescer>> = std::sync::OnceLock::new();
    GLOBAL.get_or_init(|| Arc::new(RequestCoalescer::new()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn concurrent_callers_share_one_producer_run() {
        let coalescer = Arc::new(RequestCoalescer::new());
        let runs = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let coalescer = coalescer.clone();
            let runs = runs.clone();
            handles.push(tokio::spawn(async move {
                coalescer
                    .run("prices:latest", async move {
                        runs.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(json!({"price": 42}))
                    })
                    .await
            }));
        }

        for handle in handles {
            let value = handle.await.unwrap().unwrap();
            assert_eq!(value["price"], 42);
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(coalescer.inflight_count(), 0);
    }

    #[tokio::test]
    async fn failure_does_not_strand_the_key() {
        let coalescer = RequestCoalescer::new();
        let result = coalescer
            .run("bad", async { anyhow::bail!("store unavailable") })
            .await;
        assert!(result.is_err());
        assert_eq!(coalescer.inflight_count(), 0);

        // The key is immediately reusable.
        let value = coalescer.run("bad", async { Ok(json!(1)) }).await.unwrap();
        assert_eq!(value, json!(1));
    }

    #[tokio::test]
    async fn distinct_keys_run_independently() {
        let coalescer = Arc::new(RequestCoalescer::new());
        let runs = Arc::new(AtomicUsize::new(0));

        let a = {
            let runs = runs.clone();
            coalescer.run("a", async move {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok(json!("a"))
            })
        };
        let b = {
            let runs = runs.clone();
            coalescer.run("b", async move {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok(json!("b"))
            })
        };
        let (a, b) = tokio::join!(a, b);
        assert_eq!(a.unwrap(), json!("a"));
        assert_eq!(b.unwrap(), json!("b"));
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }
}
