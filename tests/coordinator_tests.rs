// Copyright (c) 2026 Adrian Robinson. All rights reserved.
// Licensed under the MIT License. See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use optimistic_cache::*;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Notify;

// ============================================================================
// Test Doubles
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum StoreEvent {
    Read,
    Write(Option<Value>),
    CancelPending,
    Invalidate,
}

/// Wraps a `QueryCache` and records every call made through the store interface.
struct RecordingStore {
    inner: Arc<QueryCache<Value>>,
    events: Mutex<Vec<StoreEvent>>,
}

impl RecordingStore {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: QueryCache::new(),
            events: Mutex::new(Vec::new()),
        })
    }

    fn seeded(value: Value) -> Arc<Self> {
        let store = Self::new();
        store.inner.write(&key(), Some(Arc::new(value)));
        store
    }

    fn events(&self) -> Vec<StoreEvent> {
        self.events.lock().clone()
    }

    fn count(&self, event: &StoreEvent) -> usize {
        self.events.lock().iter().filter(|e| *e == event).count()
    }

    fn current(&self) -> Option<Value> {
        self.inner.read(&key()).map(|v| (*v).clone())
    }
}

impl CacheStore<Value> for RecordingStore {
    fn read(&self, key: &CacheKey) -> Option<Arc<Value>> {
        self.events.lock().push(StoreEvent::Read);
        self.inner.read(key)
    }

    fn write(&self, key: &CacheKey, value: Option<Arc<Value>>) {
        self.events
            .lock()
            .push(StoreEvent::Write(value.as_deref().cloned()));
        self.inner.write(key, value)
    }

    fn cancel_pending(&self, key: &CacheKey) {
        self.events.lock().push(StoreEvent::CancelPending);
        self.inner.cancel_pending(key)
    }

    fn invalidate(&self, key: &CacheKey) {
        self.events.lock().push(StoreEvent::Invalidate);
        self.inner.invalidate(key)
    }
}

struct Scripted {
    gate: Option<Arc<Notify>>,
    result: Result<Option<Value>, SyncError>,
}

#[derive(Debug, Clone)]
struct RemoteCall {
    entity_id: String,
    patch: Patch,
    auth: AuthContext,
}

/// Remote store answering from a queue of scripted results.
#[derive(Default)]
struct ScriptedRemote {
    script: Mutex<VecDeque<Scripted>>,
    calls: Mutex<Vec<RemoteCall>>,
}

impl ScriptedRemote {
    fn replying(results: Vec<Result<Option<Value>, SyncError>>) -> Arc<Self> {
        let remote = Self::default();
        for result in results {
            remote.script.lock().push_back(Scripted { gate: None, result });
        }
        Arc::new(remote)
    }

    fn push_gated(&self, gate: Arc<Notify>, result: Result<Option<Value>, SyncError>) {
        self.script.lock().push_back(Scripted {
            gate: Some(gate),
            result,
        });
    }

    fn push(&self, result: Result<Option<Value>, SyncError>) {
        self.script.lock().push_back(Scripted { gate: None, result });
    }

    fn calls(&self) -> Vec<RemoteCall> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl RemoteStore<Value> for ScriptedRemote {
    async fn patch(
        &self,
        entity_id: &str,
        patch: &Patch,
        auth: &AuthContext,
    ) -> Result<Option<Value>, SyncError> {
        self.calls.lock().push(RemoteCall {
            entity_id: entity_id.to_string(),
            patch: patch.clone(),
            auth: auth.clone(),
        });
        let next = self.script.lock().pop_front();
        let Some(Scripted { gate, result }) = next else {
            return Err(SyncError::Transport("no scripted response".into()));
        };
        if let Some(gate) = gate {
            gate.notified().await;
        }
        result
    }
}

#[derive(Default)]
struct RecordingNotifier {
    seen: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    fn seen(&self) -> Vec<Notification> {
        self.seen.lock().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        self.seen.lock().push(notification);
    }
}

fn key() -> CacheKey {
    CacheKey::new("currentUser")
}

fn alice() -> Value {
    json!({"id": 1, "name": "Alice", "token": "jwt-alice"})
}

fn alicia() -> Value {
    json!({"id": 1, "name": "Alicia", "token": "jwt-alice"})
}

fn rejected() -> SyncError {
    SyncError::Rejected {
        status: 500,
        message: "internal error".into(),
    }
}

fn coordinator(
    store: &Arc<RecordingStore>,
    remote: &Arc<ScriptedRemote>,
    notifier: &Arc<RecordingNotifier>,
) -> MutationCoordinator<Value> {
    MutationCoordinator::new(key(), store.clone(), remote.clone(), notifier.clone())
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_successful_update_keeps_optimistic_value() {
    let store = RecordingStore::seeded(alice());
    let remote = ScriptedRemote::replying(vec![Ok(Some(alicia()))]);
    let notifier = Arc::new(RecordingNotifier::default());

    let report = coordinator(&store, &remote, &notifier)
        .mutate(Some(alicia()))
        .await;

    assert_eq!(report.outcome, MutationOutcome::Succeeded(Some(alicia())));
    assert_eq!(store.current(), Some(alicia()));
    assert_eq!(
        notifier.seen(),
        vec![Notification::new("Entity updated!", Severity::Success)]
    );
    assert_eq!(store.count(&StoreEvent::Invalidate), 1);
    assert_eq!(
        report.history,
        vec![
            MutationState::Idle,
            MutationState::Capturing,
            MutationState::OptimisticallyApplied,
            MutationState::AwaitingRemote,
            MutationState::Succeeded,
            MutationState::Settled,
        ]
    );
}

#[tokio::test]
async fn test_failed_update_rolls_back() {
    let store = RecordingStore::seeded(alice());
    let remote = ScriptedRemote::replying(vec![Err(rejected())]);
    let notifier = Arc::new(RecordingNotifier::default());

    let report = coordinator(&store, &remote, &notifier)
        .mutate(Some(alicia()))
        .await;

    assert_eq!(
        report.outcome,
        MutationOutcome::RolledBack {
            error: rejected(),
            restored: true
        }
    );
    assert_eq!(store.current(), Some(alice()));
    assert_eq!(
        notifier.seen(),
        vec![Notification::new(
            "Update failed; restoring previous values",
            Severity::Warning
        )]
    );
    assert_eq!(store.count(&StoreEvent::Invalidate), 1);
    assert_eq!(
        report.history,
        vec![
            MutationState::Idle,
            MutationState::Capturing,
            MutationState::OptimisticallyApplied,
            MutationState::AwaitingRemote,
            MutationState::RolledBack,
            MutationState::Settled,
        ]
    );
}

#[tokio::test]
async fn test_absent_cache_is_noop() {
    let store = RecordingStore::new();
    let remote = ScriptedRemote::replying(vec![]);
    let notifier = Arc::new(RecordingNotifier::default());

    let report = coordinator(&store, &remote, &notifier)
        .mutate(Some(json!({"id": 1, "name": "Bob"})))
        .await;

    assert_eq!(report.outcome, MutationOutcome::Succeeded(None));
    assert!(remote.calls().is_empty());
    assert!(notifier.seen().is_empty());
    assert_eq!(store.current(), None);
    assert_eq!(
        store.events(),
        vec![
            StoreEvent::CancelPending,
            StoreEvent::Read,
            StoreEvent::Invalidate,
        ]
    );
    assert_eq!(
        report.history,
        vec![
            MutationState::Idle,
            MutationState::Capturing,
            MutationState::Succeeded,
            MutationState::Settled,
        ]
    );
}

#[tokio::test]
async fn test_absent_new_value_is_noop() {
    let store = RecordingStore::seeded(alice());
    let remote = ScriptedRemote::replying(vec![]);
    let notifier = Arc::new(RecordingNotifier::default());

    let report = coordinator(&store, &remote, &notifier).mutate(None).await;

    assert_eq!(report.outcome, MutationOutcome::Succeeded(None));
    assert!(remote.calls().is_empty());
    assert!(notifier.seen().is_empty());
    assert_eq!(store.current(), Some(alice()));
    assert_eq!(store.count(&StoreEvent::Invalidate), 1);
}

#[tokio::test]
async fn test_null_remote_result_is_silent_success() {
    let store = RecordingStore::seeded(alice());
    let remote = ScriptedRemote::replying(vec![Ok(None)]);
    let notifier = Arc::new(RecordingNotifier::default());

    let report = coordinator(&store, &remote, &notifier)
        .mutate(Some(alicia()))
        .await;

    assert_eq!(report.outcome, MutationOutcome::Succeeded(None));
    assert!(notifier.seen().is_empty());
    assert_eq!(store.current(), Some(alicia()));
    assert_eq!(store.count(&StoreEvent::Invalidate), 1);
}

// ============================================================================
// Ordering & Finalizer
// ============================================================================

#[tokio::test]
async fn test_cancel_precedes_optimistic_write() {
    let store = RecordingStore::seeded(alice());
    let remote = ScriptedRemote::replying(vec![Ok(Some(alicia()))]);
    let notifier = Arc::new(RecordingNotifier::default());

    coordinator(&store, &remote, &notifier)
        .mutate(Some(alicia()))
        .await;

    assert_eq!(
        store.events(),
        vec![
            StoreEvent::CancelPending,
            StoreEvent::Read,
            StoreEvent::Write(Some(alicia())),
            StoreEvent::Invalidate,
        ]
    );
}

#[tokio::test]
async fn test_rollback_event_trace() {
    let store = RecordingStore::seeded(alice());
    let remote = ScriptedRemote::replying(vec![Err(SyncError::Transport("timeout".into()))]);
    let notifier = Arc::new(RecordingNotifier::default());

    coordinator(&store, &remote, &notifier)
        .mutate(Some(alicia()))
        .await;

    assert_eq!(
        store.events(),
        vec![
            StoreEvent::CancelPending,
            StoreEvent::Read,
            StoreEvent::Write(Some(alicia())),
            StoreEvent::Read,
            StoreEvent::Write(Some(alice())),
            StoreEvent::Invalidate,
        ]
    );
}

#[tokio::test]
async fn test_dropped_mutation_still_settles() {
    let store = RecordingStore::seeded(alice());
    let remote = Arc::new(ScriptedRemote::default());
    remote.push_gated(Arc::new(Notify::new()), Ok(Some(alicia())));
    let notifier = Arc::new(RecordingNotifier::default());
    let coordinator = coordinator(&store, &remote, &notifier);

    {
        let pending = coordinator.mutate(Some(alicia()));
        tokio::pin!(pending);
        // Poll once so the attempt reaches the remote call, then drop it.
        assert!(poll_once(pending.as_mut()).await.is_none());
    }

    assert_eq!(remote.calls().len(), 1);
    assert_eq!(store.count(&StoreEvent::Invalidate), 1);
    assert!(notifier.seen().is_empty());
}

async fn poll_once<F: std::future::Future + Unpin>(fut: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        out = fut => Some(out),
        _ = std::future::ready(()) => None,
    }
}

// ============================================================================
// Remote Call
// ============================================================================

#[tokio::test]
async fn test_remote_receives_patch_and_auth() {
    let store = RecordingStore::seeded(alice());
    let remote = ScriptedRemote::replying(vec![Ok(Some(alicia()))]);
    let notifier = Arc::new(RecordingNotifier::default());

    coordinator(&store, &remote, &notifier)
        .mutate(Some(alicia()))
        .await;

    let calls = remote.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].entity_id, "1");
    assert_eq!(
        calls[0].patch.ops(),
        &[PatchOp::Replace {
            path: "/name".into(),
            value: json!("Alicia")
        }]
    );
    assert_eq!(
        calls[0].auth.authorization_header().as_deref(),
        Some("Bearer jwt-alice")
    );
}

#[tokio::test]
async fn test_custom_titles_and_severity() {
    let store = RecordingStore::seeded(alice());
    let remote = ScriptedRemote::replying(vec![Ok(Some(alicia())), Err(rejected())]);
    let notifier = Arc::new(RecordingNotifier::default());
    let config = CoordinatorConfig {
        success_title: "User updated!".into(),
        rollback_severity: Severity::Error,
        ..CoordinatorConfig::default()
    };
    let coordinator = coordinator(&store, &remote, &notifier).with_config(config);

    coordinator.mutate(Some(alicia())).await;
    coordinator.mutate(Some(alice())).await;

    let seen = notifier.seen();
    assert_eq!(seen[0], Notification::new("User updated!", Severity::Success));
    assert_eq!(seen[1].severity, Severity::Error);
    assert_eq!(store.current(), Some(alicia()));
}

// ============================================================================
// Overlapping Attempts
// ============================================================================

#[tokio::test]
async fn test_superseded_failure_does_not_clobber_newer_value() {
    let store = RecordingStore::seeded(alice());
    let remote = Arc::new(ScriptedRemote::default());
    let gate = Arc::new(Notify::new());
    remote.push_gated(gate.clone(), Err(rejected()));
    remote.push(Ok(Some(json!({"id": 1, "name": "Ally", "token": "jwt-alice"}))));
    let notifier = Arc::new(RecordingNotifier::default());
    let coordinator = Arc::new(coordinator(&store, &remote, &notifier));

    let first = coordinator.spawn_mutation(Some(alicia()));
    while remote.calls().is_empty() {
        tokio::task::yield_now().await;
    }

    let ally = json!({"id": 1, "name": "Ally", "token": "jwt-alice"});
    let second = coordinator.mutate(Some(ally.clone())).await;
    assert!(second.outcome.is_success());

    gate.notify_one();
    let first = first.await.unwrap();

    assert_eq!(
        first.outcome,
        MutationOutcome::RolledBack {
            error: rejected(),
            restored: false
        }
    );
    assert_eq!(store.current(), Some(ally));
    assert_eq!(store.count(&StoreEvent::Invalidate), 2);
    assert_eq!(
        notifier.seen(),
        vec![
            Notification::new("Entity updated!", Severity::Success),
            Notification::new("Update failed; a newer change is pending", Severity::Warning),
        ]
    );
    // The second attempt diffed against the first attempt's optimistic value.
    assert_eq!(remote.calls()[1].patch.len(), 1);
    assert!(first.attempt_id < second.attempt_id);
}

#[tokio::test]
async fn test_older_failure_restores_after_newer_failure_rolled_back() {
    let store = RecordingStore::seeded(alice());
    let remote = Arc::new(ScriptedRemote::default());
    let first_gate = Arc::new(Notify::new());
    let second_gate = Arc::new(Notify::new());
    remote.push_gated(first_gate.clone(), Err(rejected()));
    remote.push_gated(second_gate.clone(), Err(rejected()));
    let notifier = Arc::new(RecordingNotifier::default());
    let coordinator = Arc::new(coordinator(&store, &remote, &notifier));

    let first = coordinator.spawn_mutation(Some(alicia()));
    while remote.calls().is_empty() {
        tokio::task::yield_now().await;
    }
    let second =
        coordinator.spawn_mutation(Some(json!({"id": 1, "name": "Ally", "token": "jwt-alice"})));
    while remote.calls().len() < 2 {
        tokio::task::yield_now().await;
    }

    // The newer attempt fails first and puts back the older optimistic value.
    second_gate.notify_one();
    let second = second.await.unwrap();
    assert!(matches!(
        second.outcome,
        MutationOutcome::RolledBack { restored: true, .. }
    ));
    assert_eq!(store.current(), Some(alicia()));

    first_gate.notify_one();
    let first = first.await.unwrap();

    assert!(matches!(
        first.outcome,
        MutationOutcome::RolledBack { restored: true, .. }
    ));
    assert_eq!(store.current(), Some(alice()));
    assert_eq!(
        notifier.seen(),
        vec![
            Notification::new("Update failed; restoring previous values", Severity::Warning),
            Notification::new("Update failed; restoring previous values", Severity::Warning),
        ]
    );
    assert_eq!(store.count(&StoreEvent::Invalidate), 2);
}

#[tokio::test]
async fn test_failure_across_coordinators_respects_shared_cache() {
    let store = RecordingStore::seeded(alice());
    let remote = Arc::new(ScriptedRemote::default());
    let gate = Arc::new(Notify::new());
    remote.push_gated(gate.clone(), Err(rejected()));
    remote.push(Ok(Some(json!({"id": 1, "name": "Ally", "token": "jwt-alice"}))));
    let notifier = Arc::new(RecordingNotifier::default());
    let profile_form = Arc::new(coordinator(&store, &remote, &notifier));
    let settings_form = coordinator(&store, &remote, &notifier);

    let first = profile_form.spawn_mutation(Some(alicia()));
    while remote.calls().is_empty() {
        tokio::task::yield_now().await;
    }
    let ally = json!({"id": 1, "name": "Ally", "token": "jwt-alice"});
    settings_form.mutate(Some(ally.clone())).await;

    gate.notify_one();
    let first = first.await.unwrap();

    assert!(matches!(
        first.outcome,
        MutationOutcome::RolledBack { restored: false, .. }
    ));
    assert_eq!(store.current(), Some(ally));
}

#[tokio::test]
async fn test_last_write_wins_when_configured() {
    let store = RecordingStore::seeded(alice());
    let remote = Arc::new(ScriptedRemote::default());
    let gate = Arc::new(Notify::new());
    remote.push_gated(gate.clone(), Err(rejected()));
    remote.push(Ok(None));
    let notifier = Arc::new(RecordingNotifier::default());
    let config = CoordinatorConfig {
        skip_superseded_rollback: false,
        ..CoordinatorConfig::default()
    };
    let coordinator = Arc::new(coordinator(&store, &remote, &notifier).with_config(config));

    let first = coordinator.spawn_mutation(Some(alicia()));
    while remote.calls().is_empty() {
        tokio::task::yield_now().await;
    }
    coordinator
        .mutate(Some(json!({"id": 1, "name": "Ally", "token": "jwt-alice"})))
        .await;

    gate.notify_one();
    let first = first.await.unwrap();

    assert!(matches!(
        first.outcome,
        MutationOutcome::RolledBack { restored: true, .. }
    ));
    assert_eq!(store.current(), Some(alice()));
}

// ============================================================================
// Subscriptions & Channels
// ============================================================================

#[tokio::test]
async fn test_subscriber_sees_optimistic_then_rollback() {
    let cache: Arc<QueryCache<Value>> = QueryCache::new();
    cache.write(&key(), Some(Arc::new(alice())));
    let mut rx = cache.subscribe(&key());

    let remote = Arc::new(ScriptedRemote::default());
    let gate = Arc::new(Notify::new());
    remote.push_gated(gate.clone(), Err(rejected()));
    let (notifier, mut notifications) = ChannelNotifier::new();
    let coordinator: Arc<MutationCoordinator<Value>> = Arc::new(MutationCoordinator::new(
        key(),
        cache.clone(),
        remote.clone(),
        Arc::new(notifier),
    ));

    let handle = coordinator.spawn_mutation(Some(alicia()));

    rx.changed().await.unwrap();
    assert_eq!(rx.borrow_and_update().as_deref(), Some(&alicia()));

    gate.notify_one();
    rx.changed().await.unwrap();
    assert_eq!(rx.borrow_and_update().as_deref(), Some(&alice()));

    let notification = notifications.recv().await.unwrap();
    assert_eq!(notification.severity, Severity::Warning);

    handle.await.unwrap();
    assert!(cache.is_stale(&key()));
}
