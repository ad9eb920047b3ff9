//! Per-tenant, per-virtual-table memoization of table mappings.
//!
//! Concurrent misses for the same `(tenant, table)` key collapse to one
//! construction: the first caller builds while the rest park on a watch
//! channel. Failures propagate to every waiter and are never cached, so the
//! next call retries. Storage is a bounded LRU; eviction is transparent
//! because a just-evicted mapping is simply rebuilt on next use.

use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::error::{Error, Result};
use crate::mapping::TableMapping;

#[derive(Clone)]
enum LoadState {
    InFlight,
    Ready(Arc<TableMapping>),
    Failed(Error),
}

enum Slot {
    Ready(Arc<TableMapping>),
    Pending(watch::Receiver<LoadState>),
}

enum Step {
    Hit(Arc<TableMapping>),
    Wait(watch::Receiver<LoadState>),
    Lead(watch::Sender<LoadState>),
}

type CacheKey = (String, String);

pub struct MappingCache {
    inner: Mutex<LruCache<CacheKey, Slot>>,
}

impl MappingCache {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Drop the mapping for one `(tenant, table)`, if present.
    pub fn invalidate(&self, tenant: &str, table: &str) {
        self.inner
            .lock()
            .pop(&(tenant.to_string(), table.to_string()));
    }

    /// Return the cached mapping or construct it via `build`, with
    /// single-flight semantics across concurrent callers.
    pub async fn get_or_build<F, Fut>(
        &self,
        tenant: &str,
        table: &str,
        build: F,
    ) -> Result<Arc<TableMapping>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Arc<TableMapping>>>,
    {
        let key = (tenant.to_string(), table.to_string());
        let mut build = Some(build);

        loop {
            let step = {
                let mut cache = self.inner.lock();
                match cache.get(&key) {
                    Some(Slot::Ready(mapping)) => Step::Hit(mapping.clone()),
                    Some(Slot::Pending(rx)) => Step::Wait(rx.clone()),
                    None => {
                        let (tx, rx) = watch::channel(LoadState::InFlight);
                        cache.put(key.clone(), Slot::Pending(rx));
                        Step::Lead(tx)
                    }
                }
            };

            match step {
                Step::Hit(mapping) => return Ok(mapping),

                Step::Lead(tx) => {
                    let builder = build.take().ok_or_else(|| {
                        Error::Internal("mapping construction ran more than once".to_string())
                    })?;
                    let result = builder().await;
                    let mut cache = self.inner.lock();
                    match result {
                        Ok(mapping) => {
                            cache.put(key, Slot::Ready(mapping.clone()));
                            let _ = tx.send(LoadState::Ready(mapping.clone()));
                            return Ok(mapping);
                        }
                        Err(e) => {
                            self.clear_pending(&mut cache, &key, &tx.subscribe());
                            let _ = tx.send(LoadState::Failed(e.clone()));
                            return Err(e);
                        }
                    }
                }

                Step::Wait(mut rx) => loop {
                    if rx.changed().await.is_err() {
                        // Constructor dropped without publishing; clear the
                        // stale slot and race for leadership again.
                        let mut cache = self.inner.lock();
                        self.clear_pending(&mut cache, &key, &rx);
                        break;
                    }
                    match rx.borrow().clone() {
                        LoadState::Ready(mapping) => return Ok(mapping),
                        LoadState::Failed(e) => return Err(e),
                        LoadState::InFlight => continue,
                    }
                },
            }
        }
    }

    /// Remove the pending slot for `key` if it still belongs to `channel`.
    fn clear_pending(
        &self,
        cache: &mut LruCache<CacheKey, Slot>,
        key: &CacheKey,
        channel: &watch::Receiver<LoadState>,
    ) {
        if let Some(Slot::Pending(existing)) = cache.peek(key) {
            if existing.same_channel(channel) {
                cache.pop(key);
            }
        }
    }
}
