//! Engine tests against mock collaborators and a temp-dir store.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration as TimeDelta, Utc};

use crate::config::{Config, StoreConfig};
use crate::data::Data;
use crate::index::SanctionIndex;
use crate::service::{ReversalOutcome, SanctionService, ServiceError};
use crate::store::RecordStore;
use crate::target::{Notifier, SanctionEvent, SanctionTarget, TargetError};
use crate::types::{
    Actor, HistoryAction, SanctionKind, SanctionRecord, ScopeId, SubjectId,
};

#[derive(Default)]
pub(crate) struct MockTarget {
    pub bans: Mutex<HashSet<(SubjectId, ScopeId)>>,
    pub mutes: Mutex<HashSet<(SubjectId, ScopeId)>>,
    pub remove_ban_calls: Mutex<Vec<(SubjectId, ScopeId, String)>>,
    pub remove_mute_calls: Mutex<Vec<(SubjectId, ScopeId, String)>>,
    pub fail_applies: AtomicBool,
    pub fail_removals: AtomicBool,
}

#[async_trait]
impl SanctionTarget for MockTarget {
    async fn apply_ban(
        &self,
        subject: &SubjectId,
        scope: &ScopeId,
        _reason: Option<&str>,
    ) -> Result<(), TargetError> {
        if self.fail_applies.load(Ordering::SeqCst) {
            return Err(TargetError::other("api unavailable"));
        }
        self.bans
            .lock()
            .unwrap()
            .insert((subject.clone(), scope.clone()));
        Ok(())
    }

    async fn remove_ban(
        &self,
        subject: &SubjectId,
        scope: &ScopeId,
        reason: &str,
    ) -> Result<(), TargetError> {
        if self.fail_removals.load(Ordering::SeqCst) {
            return Err(TargetError::other("api unavailable"));
        }
        self.remove_ban_calls
            .lock()
            .unwrap()
            .push((subject.clone(), scope.clone(), reason.to_string()));
        if self
            .bans
            .lock()
            .unwrap()
            .remove(&(subject.clone(), scope.clone()))
        {
            Ok(())
        } else {
            Err(TargetError::NotFound)
        }
    }

    async fn apply_mute(
        &self,
        subject: &SubjectId,
        scope: &ScopeId,
        _reason: Option<&str>,
    ) -> Result<(), TargetError> {
        if self.fail_applies.load(Ordering::SeqCst) {
            return Err(TargetError::other("api unavailable"));
        }
        self.mutes
            .lock()
            .unwrap()
            .insert((subject.clone(), scope.clone()));
        Ok(())
    }

    async fn remove_mute(
        &self,
        subject: &SubjectId,
        scope: &ScopeId,
        reason: &str,
    ) -> Result<(), TargetError> {
        if self.fail_removals.load(Ordering::SeqCst) {
            return Err(TargetError::other("api unavailable"));
        }
        self.remove_mute_calls
            .lock()
            .unwrap()
            .push((subject.clone(), scope.clone(), reason.to_string()));
        if self
            .mutes
            .lock()
            .unwrap()
            .remove(&(subject.clone(), scope.clone()))
        {
            Ok(())
        } else {
            Err(TargetError::NotFound)
        }
    }

    async fn ban_in_effect(
        &self,
        subject: &SubjectId,
        scope: &ScopeId,
    ) -> Result<bool, TargetError> {
        Ok(self
            .bans
            .lock()
            .unwrap()
            .contains(&(subject.clone(), scope.clone())))
    }

    async fn mute_in_effect(
        &self,
        subject: &SubjectId,
        scope: &ScopeId,
    ) -> Result<bool, TargetError> {
        Ok(self
            .mutes
            .lock()
            .unwrap()
            .contains(&(subject.clone(), scope.clone())))
    }
}

#[derive(Default)]
pub(crate) struct MockNotifier {
    pub events: Mutex<Vec<SanctionEvent>>,
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn publish(&self, event: &SanctionEvent) -> Result<(), crate::Error> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

fn test_config(dir: &tempfile::TempDir) -> Config {
    Config {
        store: StoreConfig {
            path: dir.path().join("user_logs.json"),
        },
        ..Default::default()
    }
}

fn make_engine(
    dir: &tempfile::TempDir,
) -> (Arc<Data>, SanctionService, Arc<MockTarget>, Arc<MockNotifier>) {
    let target = Arc::new(MockTarget::default());
    let notifier = Arc::new(MockNotifier::default());
    let data = Arc::new(Data::new(
        test_config(dir),
        target.clone(),
        notifier.clone(),
    ));
    (data.clone(), SanctionService::new(data), target, notifier)
}

fn subject() -> SubjectId {
    SubjectId::new("1001")
}

fn scope() -> ScopeId {
    ScopeId::new("2001")
}

fn moderator() -> Actor {
    Actor::user("3001", "mod#0001")
}

fn timed_record(kind: SanctionKind, expires_in_secs: i64) -> SanctionRecord {
    let issued_at = Utc::now();
    SanctionRecord {
        kind,
        reason: Some("spam".to_string()),
        issuer: moderator(),
        scope: scope(),
        issued_at,
        expires_at: Some(issued_at + TimeDelta::seconds(expires_in_secs)),
        reversed_at: None,
        reversal_reason: None,
    }
}

// Record store

#[test]
fn ensure_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = RecordStore::load(dir.path().join("user_logs.json"));

    let first = store.ensure(&subject()).clone();
    let second = store.ensure(&subject()).clone();

    assert_eq!(first, second);
    assert_eq!(second.messages, 0);
    assert!(second.actions.is_empty());
}

#[test]
fn corrupt_store_degrades_to_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("user_logs.json");

    std::fs::write(&path, b"{ not json").unwrap();
    let store = RecordStore::load(&path);
    assert_eq!(store.subjects().count(), 0);

    // Unknown schema versions are treated the same way
    std::fs::write(&path, br#"{"version": 99, "subjects": {}}"#).unwrap();
    let store = RecordStore::load(&path);
    assert_eq!(store.subjects().count(), 0);
}

#[test]
fn store_round_trips_through_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("user_logs.json");

    let mut store = RecordStore::load(&path);
    store
        .append_sanction(&subject(), timed_record(SanctionKind::Ban, 600))
        .unwrap();

    let reloaded = RecordStore::load(&path);
    let history = reloaded.history(&subject()).unwrap();

    assert_eq!(history.bans.len(), 1);
    assert_eq!(history.actions.len(), 1);
    assert_eq!(history.actions[0].action, HistoryAction::Ban);
    assert!(!history.bans[0].is_reversed());
}

#[test]
fn mark_reversed_matches_the_scheduled_expiry() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = RecordStore::load(dir.path().join("user_logs.json"));

    let early = timed_record(SanctionKind::Mute, 60);
    let late = timed_record(SanctionKind::Mute, 600);
    let early_expiry = early.expires_at.unwrap();

    store.append_sanction(&subject(), early).unwrap();
    store.append_sanction(&subject(), late).unwrap();

    let marked = store
        .mark_reversed_expiring(
            &subject(),
            SanctionKind::Mute,
            &scope(),
            early_expiry,
            Utc::now(),
            "expired",
        )
        .unwrap();
    assert!(marked);

    let history = store.history(&subject()).unwrap();
    assert!(history.mutes[0].is_reversed());
    assert!(!history.mutes[1].is_reversed());
    // The reversal is its own entry in the chronological history
    assert_eq!(history.actions.last().unwrap().action, HistoryAction::Unmute);

    // The reversal fields transition exactly once
    let again = store
        .mark_reversed_expiring(
            &subject(),
            SanctionKind::Mute,
            &scope(),
            early_expiry,
            Utc::now(),
            "expired",
        )
        .unwrap();
    assert!(!again);
}

// Sanction index

#[test]
fn rebuild_indexes_unreversed_timed_records_only() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = RecordStore::load(dir.path().join("user_logs.json"));

    let future = timed_record(SanctionKind::Ban, 600);
    // Expired while the process was down; still indexed, never reversed here
    let past_due = timed_record(SanctionKind::Mute, -600);

    let mut reversed = timed_record(SanctionKind::Ban, 300);
    reversed.reversed_at = Some(Utc::now());

    let mut permanent = timed_record(SanctionKind::Ban, 0);
    permanent.expires_at = None;

    let a = SubjectId::new("a");
    let b = SubjectId::new("b");
    let c = SubjectId::new("c");

    store.append_sanction(&a, future).unwrap();
    store.append_sanction(&a, past_due).unwrap();
    store.append_sanction(&b, reversed).unwrap();
    store.append_sanction(&c, permanent).unwrap();

    let index = SanctionIndex::rebuild(&store);

    assert_eq!(index.len(), 2);
    assert!(index.contains(&a, SanctionKind::Ban));
    assert!(index.contains(&a, SanctionKind::Mute));
    assert!(!index.contains(&b, SanctionKind::Ban));
    assert!(!index.contains(&c, SanctionKind::Ban));

    // Only the past-due entry is due right now
    let due = index.due_entries(Utc::now());
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].1, SanctionKind::Mute);
}

#[test]
fn remove_expiring_only_claims_a_matching_entry() {
    let mut index = SanctionIndex::new();
    let expires_at = Utc::now() + TimeDelta::seconds(60);

    index.insert(subject(), SanctionKind::Ban, scope(), expires_at);

    // A different expiry (e.g. a re-applied ban) is not claimable
    assert!(!index.remove_expiring(
        &subject(),
        SanctionKind::Ban,
        expires_at + TimeDelta::seconds(1)
    ));
    assert!(index.contains(&subject(), SanctionKind::Ban));

    assert!(index.remove_expiring(&subject(), SanctionKind::Ban, expires_at));
    assert!(index.is_empty());
}

// Sanction service

#[tokio::test]
async fn apply_ban_enforces_then_records_then_indexes() {
    let dir = tempfile::tempdir().unwrap();
    let (data, service, target, notifier) = make_engine(&dir);

    let record = service
        .apply_ban(&subject(), &scope(), moderator(), Some("10m"), Some("spam"))
        .await
        .unwrap();

    assert_eq!(record.kind, SanctionKind::Ban);
    assert!(record.expires_at.is_some());

    assert!(target
        .bans
        .lock()
        .unwrap()
        .contains(&(subject(), scope())));

    let state = data.state.lock().await;
    assert_eq!(state.store.history(&subject()).unwrap().bans.len(), 1);
    assert!(state.index.contains(&subject(), SanctionKind::Ban));
    drop(state);

    let events = notifier.events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].action, HistoryAction::Ban);
    assert!(!events[0].automatic);
}

#[tokio::test]
async fn permanent_ban_is_not_indexed() {
    let dir = tempfile::tempdir().unwrap();
    let (data, service, _target, _notifier) = make_engine(&dir);

    let record = service
        .apply_ban(&subject(), &scope(), moderator(), None, Some("raid"))
        .await
        .unwrap();
    assert!(record.expires_at.is_none());

    let state = data.state.lock().await;
    assert!(state.index.is_empty());
    assert_eq!(state.store.history(&subject()).unwrap().bans.len(), 1);
}

#[tokio::test]
async fn bad_duration_token_has_no_side_effects() {
    let dir = tempfile::tempdir().unwrap();
    let (data, service, target, notifier) = make_engine(&dir);

    let err = service
        .apply_mute(&subject(), &scope(), moderator(), Some("0m"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Duration(_)));

    assert!(target.mutes.lock().unwrap().is_empty());
    assert!(notifier.events.lock().unwrap().is_empty());

    let state = data.state.lock().await;
    assert!(state.store.history(&subject()).is_none());
    assert!(state.index.is_empty());
}

#[tokio::test]
async fn refused_effect_is_never_recorded() {
    let dir = tempfile::tempdir().unwrap();
    let (data, service, target, notifier) = make_engine(&dir);

    target.fail_applies.store(true, Ordering::SeqCst);

    let err = service
        .apply_ban(&subject(), &scope(), moderator(), Some("1h"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Target(_)));

    assert!(notifier.events.lock().unwrap().is_empty());

    let state = data.state.lock().await;
    assert!(state.store.history(&subject()).is_none());
    assert!(state.index.is_empty());
}

#[tokio::test]
async fn warnings_and_kicks_skip_the_index() {
    let dir = tempfile::tempdir().unwrap();
    let (data, service, target, _notifier) = make_engine(&dir);

    service
        .apply_warn(&subject(), &scope(), moderator(), Some("language"))
        .await
        .unwrap();
    service
        .apply_kick(&subject(), &scope(), moderator(), None)
        .await
        .unwrap();

    assert!(target.bans.lock().unwrap().is_empty());
    assert!(target.mutes.lock().unwrap().is_empty());

    let state = data.state.lock().await;
    let history = state.store.history(&subject()).unwrap();
    assert_eq!(history.warnings.len(), 1);
    assert_eq!(history.kicks.len(), 1);
    assert_eq!(history.actions.len(), 2);
    assert!(state.index.is_empty());
}

#[tokio::test]
async fn manual_reversal_clears_the_schedule() {
    let dir = tempfile::tempdir().unwrap();
    let (data, service, target, notifier) = make_engine(&dir);

    service
        .apply_ban(&subject(), &scope(), moderator(), Some("10m"), Some("spam"))
        .await
        .unwrap();

    let outcome = service
        .reverse_manually(
            &subject(),
            SanctionKind::Ban,
            &scope(),
            moderator(),
            "appealed",
        )
        .await
        .unwrap();
    assert_eq!(outcome, ReversalOutcome::Reversed);

    assert_eq!(target.remove_ban_calls.lock().unwrap().len(), 1);

    let state = data.state.lock().await;
    assert!(state.index.is_empty());
    let record = &state.store.history(&subject()).unwrap().bans[0];
    assert!(record.is_reversed());
    assert_eq!(record.reversal_reason.as_deref(), Some("appealed"));
    drop(state);

    let events = notifier.events.lock().unwrap();
    assert_eq!(events.last().unwrap().action, HistoryAction::Unban);
    assert!(!events.last().unwrap().automatic);
}

#[tokio::test]
async fn reversing_nothing_is_a_noop() {
    let dir = tempfile::tempdir().unwrap();
    let (_data, service, target, notifier) = make_engine(&dir);

    let outcome = service
        .reverse_manually(
            &subject(),
            SanctionKind::Mute,
            &scope(),
            moderator(),
            "oops",
        )
        .await
        .unwrap();
    assert_eq!(outcome, ReversalOutcome::NotSanctioned);

    // The removal was attempted (and tolerated as absent), nothing announced
    assert_eq!(target.remove_mute_calls.lock().unwrap().len(), 1);
    assert!(notifier.events.lock().unwrap().is_empty());

    // Warnings have nothing to reverse at all
    let outcome = service
        .reverse_manually(
            &subject(),
            SanctionKind::Warning,
            &scope(),
            moderator(),
            "oops",
        )
        .await
        .unwrap();
    assert_eq!(outcome, ReversalOutcome::NotSanctioned);
}

#[tokio::test]
async fn engagement_counters_accumulate() {
    let dir = tempfile::tempdir().unwrap();
    let (_data, service, _target, _notifier) = make_engine(&dir);

    service.record_message(&subject()).await.unwrap();
    service.record_message(&subject()).await.unwrap();
    service.record_message_delete(&subject()).await.unwrap();
    service.record_voice_minutes(&subject(), 12.5).await.unwrap();

    let history = service.history(&subject()).await.unwrap();
    assert_eq!(history.messages, 2);
    assert_eq!(history.message_deletes, 1);
    assert!((history.voice_minutes - 12.5).abs() < f64::EPSILON);
}

#[tokio::test]
async fn staff_dms_land_in_the_action_history() {
    let dir = tempfile::tempdir().unwrap();
    let (_data, service, _target, _notifier) = make_engine(&dir);

    service
        .record_dm(&subject(), &scope(), moderator(), "please stop")
        .await
        .unwrap();

    let history = service.history(&subject()).await.unwrap();
    assert_eq!(history.actions.len(), 1);
    assert_eq!(history.actions[0].action, HistoryAction::Dm);
    assert_eq!(history.actions[0].reason.as_deref(), Some("please stop"));
}

// Config

#[test]
fn config_defaults_are_sane() {
    let config = Config::default();

    assert_eq!(config.reconciler.interval_secs, 60);
    assert_eq!(config.reconcile_interval().as_secs(), 60);
    assert_eq!(config.duration_limits.max_minutes, 1440);
    assert_eq!(config.duration_limits.max_hours, 24);
    assert_eq!(config.duration_limits.max_days, 365);
}

#[test]
fn config_loads_partial_yaml() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");

    std::fs::write(
        &path,
        "reconciler:\n  interval_secs: 5\nduration_limits:\n  max_days: 30\n",
    )
    .unwrap();

    let config = Config::load(&path).unwrap();
    assert_eq!(config.reconciler.interval_secs, 5);
    assert_eq!(config.duration_limits.max_days, 30);
    // Untouched sections keep their defaults
    assert_eq!(config.duration_limits.max_hours, 24);
    assert_eq!(
        config.store.path,
        std::path::PathBuf::from("data/user_logs.json")
    );

    assert!(Config::load(&dir.path().join("missing.yaml")).is_err());
}
