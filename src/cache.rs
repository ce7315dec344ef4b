// Copyright (c) 2026 Adrian Robinson. All rights reserved.
// Licensed under the MIT License. See LICENSE file in the project root for full license information.

//! Cache Store Adapter
//!
//! [`QueryCache`] is the in-process implementation of [`CacheStore`]: a keyed
//! table of entity values with per-key subscriptions, staleness tracking and
//! cancellable background refreshes.
//!
//! Every entry carries a generation counter. A refresh remembers the
//! generation it was started under and only lands if nothing (a `write`, a
//! `cancel_pending` or a newer `invalidate`) has bumped it in the meantime, so
//! a late-arriving stale read can never overwrite a newer value.

use crate::traits::{CacheStore, Fetcher, SyncError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Semantic cache key, e.g. `"currentUser"` or `"entity:42"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Key for a single entity, parameterized by its id.
    pub fn for_entity(id: &str) -> Self {
        Self(format!("entity:{}", id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CacheKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for CacheKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

struct Entry<T> {
    tx: watch::Sender<Option<Arc<T>>>,
    stale: bool,
    generation: u64,
    refresh: Option<JoinHandle<()>>,
}

impl<T> Entry<T> {
    fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self {
            tx,
            stale: false,
            generation: 0,
            refresh: None,
        }
    }

    /// Aborts the in-flight refresh (if any) and supersedes its generation.
    fn cancel_refresh(&mut self) -> bool {
        self.generation += 1;
        match self.refresh.take() {
            Some(handle) => {
                let running = !handle.is_finished();
                handle.abort();
                running
            }
            None => false,
        }
    }
}

/// Process-wide keyed cache of entity state.
///
/// # Example
///
/// ```
/// use optimistic_cache::{CacheKey, CacheStore, QueryCache};
/// use serde_json::{json, Value};
/// use std::sync::Arc;
///
/// let cache: Arc<QueryCache<Value>> = QueryCache::new();
/// let key = CacheKey::new("currentUser");
/// let mut rx = cache.subscribe(&key);
///
/// cache.write(&key, Some(Arc::new(json!({"id": 1, "name": "Alice"}))));
/// assert!(rx.has_changed().unwrap());
/// assert_eq!(rx.borrow_and_update().as_deref(), Some(&json!({"id": 1, "name": "Alice"})));
/// ```
pub struct QueryCache<T> {
    entries: Mutex<HashMap<CacheKey, Entry<T>>>,
    fetcher: Option<Arc<dyn Fetcher<T>>>,
    this: Weak<Self>,
}

impl<T: Send + Sync + 'static> QueryCache<T> {
    /// A cache without an authoritative source: `invalidate` only marks keys stale.
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            entries: Mutex::new(HashMap::new()),
            fetcher: None,
            this: this.clone(),
        })
    }

    /// A cache that refreshes invalidated keys from `fetcher`.
    pub fn with_fetcher(fetcher: Arc<dyn Fetcher<T>>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            entries: Mutex::new(HashMap::new()),
            fetcher: Some(fetcher),
            this: this.clone(),
        })
    }

    /// Watches `key`. The receiver sees every subsequent write, rollback and refresh.
    pub fn subscribe(&self, key: &CacheKey) -> watch::Receiver<Option<Arc<T>>> {
        self.entries
            .lock()
            .entry(key.clone())
            .or_insert_with(Entry::new)
            .tx
            .subscribe()
    }

    pub fn is_stale(&self, key: &CacheKey) -> bool {
        self.entries.lock().get(key).map_or(false, |e| e.stale)
    }

    /// True while a background refresh for `key` is still running.
    pub fn is_refreshing(&self, key: &CacheKey) -> bool {
        self.entries
            .lock()
            .get(key)
            .and_then(|e| e.refresh.as_ref())
            .map_or(false, |h| !h.is_finished())
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Full teardown: aborts every refresh and drops every entry.
    ///
    /// Outstanding subscribers observe their channel closing.
    pub fn clear(&self) {
        let drained: Vec<_> = self.entries.lock().drain().collect();
        for (key, mut entry) in drained {
            if entry.cancel_refresh() {
                debug!(%key, "aborted refresh during teardown");
            }
        }
    }

    fn complete_refresh(
        &self,
        key: &CacheKey,
        generation: u64,
        result: Result<Option<T>, SyncError>,
    ) {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(key) else {
            debug!(%key, "dropping refresh for torn-down key");
            return;
        };
        if entry.generation != generation {
            debug!(%key, generation, current = entry.generation, "discarding superseded refresh");
            return;
        }
        entry.refresh = None;
        match result {
            Ok(value) => {
                entry.stale = false;
                entry.tx.send_replace(value.map(Arc::new));
                debug!(%key, generation, "refresh landed");
            }
            Err(error) => warn!(%key, %error, "background refresh failed; entry stays stale"),
        }
    }
}

impl<T: Send + Sync + 'static> CacheStore<T> for QueryCache<T> {
    fn read(&self, key: &CacheKey) -> Option<Arc<T>> {
        self.entries
            .lock()
            .get(key)
            .and_then(|e| (*e.tx.borrow()).clone())
    }

    fn write(&self, key: &CacheKey, value: Option<Arc<T>>) {
        let mut entries = self.entries.lock();
        let entry = entries.entry(key.clone()).or_insert_with(Entry::new);
        entry.generation += 1;
        entry.stale = false;
        debug!(%key, generation = entry.generation, present = value.is_some(), "cache write");
        entry.tx.send_replace(value);
    }

    fn cancel_pending(&self, key: &CacheKey) {
        if let Some(entry) = self.entries.lock().get_mut(key) {
            if entry.cancel_refresh() {
                debug!(%key, "cancelled in-flight refresh");
            }
        }
    }

    fn invalidate(&self, key: &CacheKey) {
        let mut entries = self.entries.lock();
        let entry = entries.entry(key.clone()).or_insert_with(Entry::new);
        entry.stale = true;

        let Some(fetcher) = self.fetcher.clone() else {
            debug!(%key, "invalidated without a fetcher; marked stale only");
            return;
        };
        entry.cancel_refresh();
        let generation = entry.generation;

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(error) => {
                warn!(%key, %error, "no async runtime; refresh not scheduled");
                return;
            }
        };

        let cache = self.this.clone();
        let task_key = key.clone();
        entry.refresh = Some(runtime.spawn(async move {
            let result = fetcher.fetch(&task_key).await;
            if let Some(cache) = cache.upgrade() {
                cache.complete_refresh(&task_key, generation, result);
            }
        }));
        debug!(%key, generation, "scheduled background refresh");
    }
}
