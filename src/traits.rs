// Copyright (c) 2026 Adrian Robinson. All rights reserved.
// Licensed under the MIT License. See LICENSE file in the project root for full license information.

use crate::cache::CacheKey;
use crate::patch::Patch;
use crate::wire::AuthContext;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// Error type for cache synchronization operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Diff computation error: {0}")]
    Diff(String),
    #[error("Patch application error: {0}")]
    Patch(String),
    #[error("Remote rejected update (status {status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Fetch error: {0}")]
    Fetch(String),
}

impl SyncError {
    /// Returns true for failures reported by (or on the way to) the remote store.
    ///
    /// These are the failures a mutation recovers from locally by rolling back.
    pub fn is_remote_rejection(&self) -> bool {
        matches!(self, SyncError::Rejected { .. } | SyncError::Transport(_))
    }
}

/// An entity that can live in the cache and be patched remotely.
///
/// Beyond a stable identifier the schema is opaque: diffs are computed over
/// the entity's serde representation.
pub trait Entity: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Stable identifier used to address the entity on the remote store.
    fn id(&self) -> String;

    /// Credential carried by the entity, if any, used to authorize remote updates.
    fn auth_token(&self) -> Option<String> {
        None
    }
}

/// Untyped entities: `id` and `token` are read from the top-level object.
impl Entity for Value {
    fn id(&self) -> String {
        match self.get("id") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        }
    }

    fn auth_token(&self) -> Option<String> {
        self.get("token").and_then(Value::as_str).map(str::to_owned)
    }
}

/// Keyed, process-wide cache of entity state.
///
/// None of these operations fail. Values are shared as `Arc<T>` so that a
/// captured value can never be mutated in place.
pub trait CacheStore<T>: Send + Sync {
    /// Current cached value, or `None` when absent or the key is unknown.
    fn read(&self, key: &CacheKey) -> Option<Arc<T>>;

    /// Replaces the cached value unconditionally.
    ///
    /// Subscribers of `key` observe the new value before this returns.
    fn write(&self, key: &CacheKey, value: Option<Arc<T>>);

    /// Aborts any in-flight background refresh for `key`.
    fn cancel_pending(&self, key: &CacheKey);

    /// Marks `key` stale and schedules a background refresh. Never blocks.
    fn invalidate(&self, key: &CacheKey);
}

/// Authoritative source used to refresh an invalidated cache key.
#[async_trait]
pub trait Fetcher<T>: Send + Sync {
    async fn fetch(&self, key: &CacheKey) -> Result<Option<T>, SyncError>;
}

/// Remote collaborator that persists a patch against an entity.
///
/// Timeouts are the implementation's concern; the coordinator waits for
/// whatever this returns.
#[async_trait]
pub trait RemoteStore<T: Entity>: Send + Sync {
    async fn patch(
        &self,
        entity_id: &str,
        patch: &Patch,
        auth: &AuthContext,
    ) -> Result<Option<T>, SyncError>;
}
