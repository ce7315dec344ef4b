// Copyright (c) 2026 Adrian Robinson. All rights reserved.
// Licensed under the MIT License. See LICENSE file in the project root for full license information.

//! Mutation Coordinator
//!
//! Drives one optimistic update per call to [`MutationCoordinator::mutate`]:
//!
//! 1. cancel background refreshes for the key, then snapshot it;
//! 2. write the new value into the cache so subscribers render it at once;
//! 3. diff snapshot against new value and send the patch to the remote store;
//! 4. on success notify (if the remote returned an entity), on failure restore
//!    the snapshot and notify;
//! 5. always invalidate the key so the cache reconciles with the server.
//!
//! Step 5 is tied to a drop guard created once the optimistic value is in
//! the cache, so it also runs if the mutation future is dropped while the
//! remote call is pending.
//!
//! Remote failures never escape: they become [`MutationOutcome::RolledBack`].

use crate::cache::CacheKey;
use crate::config::CoordinatorConfig;
use crate::enums::{MutationState, Severity};
use crate::notify::{Notification, Notifier};
use crate::patch::diff_entities;
use crate::snapshot::Snapshot;
use crate::traits::{CacheStore, Entity, RemoteStore, SyncError};
use crate::wire::AuthContext;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// How a mutation attempt resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationOutcome<T> {
    /// The remote store accepted the update. `None` when it returned no
    /// entity, or when the attempt short-circuited on a missing operand.
    Succeeded(Option<T>),
    /// The update failed. `restored` is false when the snapshot was not
    /// written back because another write replaced the optimistic value.
    RolledBack { error: SyncError, restored: bool },
}

impl<T> MutationOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, MutationOutcome::Succeeded(_))
    }

    pub fn is_rolled_back(&self) -> bool {
        matches!(self, MutationOutcome::RolledBack { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MutationReport<T> {
    pub attempt_id: u64,
    pub outcome: MutationOutcome<T>,
    /// Every state the attempt passed through, starting at `Idle`.
    pub history: Vec<MutationState>,
}

/// Transient state of one in-flight mutation.
#[derive(Debug)]
pub struct MutationAttempt<T> {
    id: u64,
    key: CacheKey,
    snapshot: Option<Snapshot<T>>,
    optimistic: Option<Arc<T>>,
    state: MutationState,
    history: Vec<MutationState>,
}

impl<T> MutationAttempt<T> {
    fn new(id: u64, key: CacheKey) -> Self {
        Self {
            id,
            key,
            snapshot: None,
            optimistic: None,
            state: MutationState::Idle,
            history: vec![MutationState::Idle],
        }
    }

    fn transition(&mut self, next: MutationState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {} -> {}",
            self.state,
            next
        );
        debug!(
            key = %self.key,
            attempt = self.id,
            from = %self.state,
            to = %next,
            "mutation transition"
        );
        self.state = next;
        self.history.push(next);
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn state(&self) -> MutationState {
        self.state
    }

    pub fn snapshot(&self) -> Option<&Snapshot<T>> {
        self.snapshot.as_ref()
    }

    pub fn optimistic_value(&self) -> Option<&T> {
        self.optimistic.as_deref()
    }

    fn finish(self, outcome: MutationOutcome<T>) -> MutationReport<T> {
        MutationReport {
            attempt_id: self.id,
            outcome,
            history: self.history,
        }
    }
}

/// Invalidates the key exactly once, when dropped.
struct SettleGuard<'a, T> {
    store: &'a dyn CacheStore<T>,
    key: &'a CacheKey,
    attempt: u64,
}

impl<T> Drop for SettleGuard<'_, T> {
    fn drop(&mut self) {
        debug!(key = %self.key, attempt = self.attempt, "settling: invalidating key");
        self.store.invalidate(self.key);
    }
}

/// Coordinates optimistic updates of the entity cached under one key.
pub struct MutationCoordinator<T: Entity> {
    key: CacheKey,
    store: Arc<dyn CacheStore<T>>,
    remote: Arc<dyn RemoteStore<T>>,
    notifier: Arc<dyn Notifier>,
    config: CoordinatorConfig,
    next_attempt: AtomicU64,
}

impl<T: Entity> MutationCoordinator<T> {
    pub fn new(
        key: impl Into<CacheKey>,
        store: Arc<dyn CacheStore<T>>,
        remote: Arc<dyn RemoteStore<T>>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            key: key.into(),
            store,
            remote,
            notifier,
            config: CoordinatorConfig::default(),
            next_attempt: AtomicU64::new(0),
        }
    }

    pub fn with_config(mut self, config: CoordinatorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Runs one mutation attempt to completion.
    ///
    /// If either the cached value or `new_value` is absent the attempt is a
    /// successful no-op: the cache is not written, the remote store is not
    /// contacted and nothing is reported. The key is still invalidated.
    pub async fn mutate(&self, new_value: Option<T>) -> MutationReport<T> {
        let id = self.next_attempt.fetch_add(1, Ordering::SeqCst) + 1;
        let mut attempt = MutationAttempt::new(id, self.key.clone());
        attempt.transition(MutationState::Capturing);

        // Cancel before capture and write: a refresh started earlier must not
        // land on top of the optimistic value.
        self.store.cancel_pending(&self.key);
        let snapshot = Snapshot::capture(&*self.store, &self.key);

        let (original, updated) = match (snapshot.shared(), new_value) {
            (Some(original), Some(updated)) => (original, Arc::new(updated)),
            (original, updated) => {
                debug!(
                    key = %self.key,
                    attempt = id,
                    cached = original.is_some(),
                    requested = updated.is_some(),
                    "missing operand; skipping mutation"
                );
                attempt.transition(MutationState::Succeeded);
                self.store.invalidate(&self.key);
                attempt.transition(MutationState::Settled);
                return attempt.finish(MutationOutcome::Succeeded(None));
            }
        };

        self.store.write(&self.key, Some(updated.clone()));
        attempt.snapshot = Some(snapshot);
        attempt.optimistic = Some(updated.clone());
        attempt.transition(MutationState::OptimisticallyApplied);

        let settle = SettleGuard {
            store: &*self.store,
            key: &self.key,
            attempt: id,
        };

        let result = match diff_entities(Some(original.as_ref()), Some(updated.as_ref())) {
            Ok(patch) => {
                attempt.transition(MutationState::AwaitingRemote);
                let entity_id = original.id();
                let auth = AuthContext::from_entity(original.as_ref());
                debug!(
                    key = %self.key,
                    attempt = id,
                    %entity_id,
                    ops = patch.len(),
                    "sending patch"
                );
                self.remote.patch(&entity_id, &patch, &auth).await
            }
            Err(e) => {
                error!(key = %self.key, attempt = id, error = %e, "could not encode patch");
                Err(e)
            }
        };

        let outcome = match result {
            Ok(server_value) => {
                attempt.transition(MutationState::Succeeded);
                if server_value.is_some() {
                    info!(key = %self.key, attempt = id, "remote update accepted");
                    self.notifier.notify(Notification::new(
                        self.config.success_title.clone(),
                        Severity::Success,
                    ));
                }
                MutationOutcome::Succeeded(server_value)
            }
            Err(error) => {
                let restored = match (attempt.snapshot(), attempt.optimistic.as_ref()) {
                    (Some(snapshot), Some(optimistic)) => {
                        self.roll_back(id, snapshot, optimistic, &error)
                    }
                    _ => false,
                };
                attempt.transition(MutationState::RolledBack);
                MutationOutcome::RolledBack { error, restored }
            }
        };

        drop(settle);
        attempt.transition(MutationState::Settled);
        attempt.finish(outcome)
    }

    /// Runs [`mutate`](Self::mutate) on the current runtime without waiting for it.
    pub fn spawn_mutation(self: &Arc<Self>, new_value: Option<T>) -> JoinHandle<MutationReport<T>> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.mutate(new_value).await })
    }

    /// Restores `snapshot` unless the cache no longer holds this attempt's
    /// optimistic value, i.e. another writer replaced it in the meantime.
    fn roll_back(
        &self,
        id: u64,
        snapshot: &Snapshot<T>,
        optimistic: &Arc<T>,
        error: &SyncError,
    ) -> bool {
        if self.config.skip_superseded_rollback && self.is_superseded(optimistic) {
            warn!(
                key = %self.key,
                attempt = id,
                %error,
                "update failed; cache holds a newer value, not restoring"
            );
            self.notifier.notify(Notification::new(
                self.config.superseded_title.clone(),
                self.config.rollback_severity,
            ));
            return false;
        }

        warn!(key = %self.key, attempt = id, %error, "update failed; restoring snapshot");
        snapshot.restore(&*self.store);
        self.notifier.notify(Notification::new(
            self.config.rollback_title.clone(),
            self.config.rollback_severity,
        ));
        true
    }

    fn is_superseded(&self, optimistic: &Arc<T>) -> bool {
        match self.store.read(&self.key) {
            Some(current) => !Arc::ptr_eq(&current, optimistic),
            None => true,
        }
    }
}
