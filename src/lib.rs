//! # optimistic-cache
//!
//! Optimistic-update coordination for client-side entity caches.
//!
//! A mutation is applied to the cache immediately, persisted to an
//! authoritative remote store as a JSON Patch, rolled back from a snapshot if
//! the remote call fails, and finally reconciled by invalidating the key.
//!
//! ```
//! use optimistic_cache::*;
//! use async_trait::async_trait;
//! use serde_json::{json, Value};
//! use std::sync::Arc;
//!
//! struct EchoRemote;
//!
//! #[async_trait]
//! impl RemoteStore<Value> for EchoRemote {
//!     async fn patch(
//!         &self,
//!         _id: &str,
//!         _patch: &Patch,
//!         _auth: &AuthContext,
//!     ) -> Result<Option<Value>, SyncError> {
//!         Ok(Some(json!({"id": 1, "name": "Alicia"})))
//!     }
//! }
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let cache: Arc<QueryCache<Value>> = QueryCache::new();
//! let key = CacheKey::new("currentUser");
//! cache.write(&key, Some(Arc::new(json!({"id": 1, "name": "Alice"}))));
//!
//! let coordinator: MutationCoordinator<Value> = MutationCoordinator::new(
//!     key.clone(),
//!     cache.clone(),
//!     Arc::new(EchoRemote),
//!     Arc::new(TracingNotifier),
//! );
//! let report = coordinator.mutate(Some(json!({"id": 1, "name": "Alicia"}))).await;
//!
//! assert!(report.outcome.is_success());
//! assert_eq!(cache.read(&key).as_deref(), Some(&json!({"id": 1, "name": "Alicia"})));
//! # });
//! ```

pub mod cache;
pub mod config;
pub mod coordinator;
pub mod enums;
pub mod notify;
pub mod patch;
pub mod snapshot;
pub mod traits;
pub mod wire;

// Re-export core traits
pub use traits::{CacheStore, Entity, Fetcher, RemoteStore, SyncError};

pub use cache::{CacheKey, QueryCache};
pub use config::CoordinatorConfig;
pub use coordinator::{MutationAttempt, MutationCoordinator, MutationOutcome, MutationReport};
pub use enums::{MutationState, Severity};
pub use notify::{ChannelNotifier, Notification, Notifier, TracingNotifier};
pub use patch::{apply_patch, compute_diff, diff_entities, Patch, PatchOp};
pub use snapshot::Snapshot;
pub use wire::{AuthContext, PatchRequest, PatchResponse};
