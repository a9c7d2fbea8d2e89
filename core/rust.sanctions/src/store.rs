use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::types::{
    ActionEvent, Actor, SanctionKind, SanctionRecord, ScopeId, SubjectHistory, SubjectId,
};

/// Current on-disk schema version
const SCHEMA_VERSION: u32 = 1;

#[derive(Deserialize)]
struct StoreDocument {
    version: u32,
    subjects: IndexMap<SubjectId, SubjectHistory>,
}

#[derive(Serialize)]
struct StoreDocumentRef<'a> {
    version: u32,
    subjects: &'a IndexMap<SubjectId, SubjectHistory>,
}

/// Persistence failure; the in-memory store stays correct when one occurs,
/// so retrying the triggering operation is always safe
#[derive(Debug)]
pub enum StoreError {
    Io(std::io::Error),
    Json(serde_json::Error),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Io(e) => write!(f, "store io error: {}", e),
            StoreError::Json(e) => write!(f, "store serialization error: {}", e),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Io(e) => Some(e),
            StoreError::Json(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Json(e)
    }
}

/// The single source of truth for sanction records and subject history
///
/// The whole store is one JSON document, serialized as a unit on every
/// mutation. Not safe for concurrent writers; callers serialize access
/// (the engine guards it together with the sanction index).
pub struct RecordStore {
    path: PathBuf,
    subjects: IndexMap<SubjectId, SubjectHistory>,
}

impl RecordStore {
    /// Open the store backed by `path`
    ///
    /// A missing, unreadable or corrupt document degrades to an empty store
    /// rather than failing startup. An unknown schema version is treated
    /// like corruption.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();

        let subjects = match std::fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice::<StoreDocument>(&bytes) {
                Ok(doc) if doc.version == SCHEMA_VERSION => doc.subjects,
                Ok(doc) => {
                    log::warn!(
                        "Unknown schema version {} in {}, starting with an empty store",
                        doc.version,
                        path.display()
                    );
                    IndexMap::new()
                }
                Err(e) => {
                    log::warn!(
                        "Could not parse {}, starting with an empty store: {}",
                        path.display(),
                        e
                    );
                    IndexMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => IndexMap::new(),
            Err(e) => {
                log::warn!(
                    "Could not read {}, starting with an empty store: {}",
                    path.display(),
                    e
                );
                IndexMap::new()
            }
        };

        Self { path, subjects }
    }

    pub fn subjects(&self) -> impl Iterator<Item = (&SubjectId, &SubjectHistory)> {
        self.subjects.iter()
    }

    pub fn history(&self, subject: &SubjectId) -> Option<&SubjectHistory> {
        self.subjects.get(subject)
    }

    /// Get or lazily create the history for a subject
    ///
    /// Creation is idempotent; an existing history is never reset.
    pub fn ensure(&mut self, subject: &SubjectId) -> &mut SubjectHistory {
        self.subjects
            .entry(subject.clone())
            .or_insert_with(|| SubjectHistory::new(Utc::now()))
    }

    /// Append a sanction record to its kind bucket, mirror it into the
    /// chronological action history, and persist
    pub fn append_sanction(
        &mut self,
        subject: &SubjectId,
        record: SanctionRecord,
    ) -> Result<(), StoreError> {
        let history = self.ensure(subject);

        history.actions.push(ActionEvent {
            action: record.kind.applied_action(),
            reason: record.reason.clone(),
            actor: record.issuer.clone(),
            scope: record.scope.clone(),
            at: record.issued_at,
        });
        history.bucket_mut(record.kind).push(record);

        self.save()
    }

    /// Append a history-only event (no sanction record) and persist
    pub fn append_event(
        &mut self,
        subject: &SubjectId,
        event: ActionEvent,
    ) -> Result<(), StoreError> {
        self.ensure(subject).actions.push(event);
        self.save()
    }

    /// Mark the record behind a scheduled expiry as reversed
    ///
    /// Targets the most recent unreversed record of `kind` in `scope` whose
    /// expiry matches the one being processed. Returns whether a record
    /// transitioned; a drifted or already-reversed record is not an error.
    pub fn mark_reversed_expiring(
        &mut self,
        subject: &SubjectId,
        kind: SanctionKind,
        scope: &ScopeId,
        expires_at: DateTime<Utc>,
        when: DateTime<Utc>,
        reason: &str,
    ) -> Result<bool, StoreError> {
        self.mark_reversed(subject, kind, scope, Some(expires_at), Actor::System, when, reason)
    }

    /// Mark the most recent unreversed record of `kind` in `scope` as
    /// reversed, whatever its expiry (covers permanent sanctions)
    pub fn mark_reversed_latest(
        &mut self,
        subject: &SubjectId,
        kind: SanctionKind,
        scope: &ScopeId,
        actor: Actor,
        when: DateTime<Utc>,
        reason: &str,
    ) -> Result<bool, StoreError> {
        self.mark_reversed(subject, kind, scope, None, actor, when, reason)
    }

    #[allow(clippy::too_many_arguments)]
    fn mark_reversed(
        &mut self,
        subject: &SubjectId,
        kind: SanctionKind,
        scope: &ScopeId,
        expires_at: Option<DateTime<Utc>>,
        actor: Actor,
        when: DateTime<Utc>,
        reason: &str,
    ) -> Result<bool, StoreError> {
        let Some(reversal) = kind.reversal_action() else {
            return Ok(false);
        };

        let Some(history) = self.subjects.get_mut(subject) else {
            return Ok(false);
        };

        let record = history.bucket_mut(kind).iter_mut().rev().find(|r| {
            r.reversed_at.is_none()
                && r.scope == *scope
                && expires_at.map_or(true, |e| r.expires_at == Some(e))
        });

        let Some(record) = record else {
            return Ok(false);
        };

        record.reversed_at = Some(when);
        record.reversal_reason = Some(reason.to_string());

        history.actions.push(ActionEvent {
            action: reversal,
            reason: Some(reason.to_string()),
            actor,
            scope: scope.clone(),
            at: when,
        });

        self.save()?;
        Ok(true)
    }

    /// Serialize the whole store and replace the backing file
    ///
    /// Writes to a sibling temp file first and renames it over the target,
    /// so a crash mid-write never leaves a partial document behind.
    pub fn save(&self) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(&StoreDocumentRef {
            version: SCHEMA_VERSION,
            subjects: &self.subjects,
        })?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, &json)?;
        std::fs::rename(&tmp, &self.path)?;

        Ok(())
    }
}
