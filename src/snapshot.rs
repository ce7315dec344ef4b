// Copyright (c) 2026 Adrian Robinson. All rights reserved.
// Licensed under the MIT License. See LICENSE file in the project root for full license information.

//! Snapshot & Rollback Manager

use crate::cache::CacheKey;
use crate::traits::CacheStore;
use std::sync::Arc;
use tracing::debug;

/// Immutable copy of a cache entry taken before a mutation.
///
/// The value is held behind an `Arc` and never exposed mutably, so a
/// snapshot always restores exactly what was captured.
#[derive(Debug)]
pub struct Snapshot<T> {
    key: CacheKey,
    value: Option<Arc<T>>,
}

impl<T> Clone for Snapshot<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            value: self.value.clone(),
        }
    }
}

impl<T> Snapshot<T> {
    /// Reads the current value of `key`; an absent entry is recorded as absent.
    pub fn capture<S: CacheStore<T> + ?Sized>(store: &S, key: &CacheKey) -> Self {
        let value = store.read(key);
        debug!(%key, present = value.is_some(), "captured snapshot");
        Self {
            key: key.clone(),
            value,
        }
    }

    /// Writes the captured value back. Idempotent.
    pub fn restore<S: CacheStore<T> + ?Sized>(&self, store: &S) {
        debug!(key = %self.key, present = self.value.is_some(), "restoring snapshot");
        store.write(&self.key, self.value.clone());
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn value(&self) -> Option<&T> {
        self.value.as_deref()
    }

    /// Shared handle to the captured value.
    pub fn shared(&self) -> Option<Arc<T>> {
        self.value.clone()
    }

    pub fn is_absent(&self) -> bool {
        self.value.is_none()
    }
}
