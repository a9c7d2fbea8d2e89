use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::store::RecordStore;
use crate::types::{SanctionKind, ScopeId, SubjectId};

/// A currently-outstanding time-bound sanction
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveSanction {
    pub scope: ScopeId,
    pub expires_at: DateTime<Utc>,
}

/// Process-local working set of time-bound sanctions awaiting expiry
///
/// Keyed by (subject, kind) since a subject may hold a ban and a mute at
/// once. Never persisted: it is always a recomputation of the record
/// store's state, rebuilt at startup and kept in step by the sanction
/// service and the reconciliation loop.
#[derive(Debug, Default)]
pub struct SanctionIndex {
    entries: HashMap<(SubjectId, SanctionKind), ActiveSanction>,
}

impl SanctionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the index from the store
    ///
    /// Every unreversed record with an expiry gets an entry, past-due ones
    /// included: nothing is reversed here, so a sanction that expired while
    /// the process was down goes through the same reversal path as one that
    /// expires while it is up.
    pub fn rebuild(store: &RecordStore) -> Self {
        let mut index = Self::new();

        for (subject, history) in store.subjects() {
            for kind in [SanctionKind::Ban, SanctionKind::Mute] {
                for record in history.bucket(kind) {
                    if record.is_reversed() {
                        continue;
                    }

                    let Some(expires_at) = record.expires_at else {
                        continue;
                    };

                    index.insert(subject.clone(), kind, record.scope.clone(), expires_at);
                }
            }
        }

        index
    }

    pub fn insert(
        &mut self,
        subject: SubjectId,
        kind: SanctionKind,
        scope: ScopeId,
        expires_at: DateTime<Utc>,
    ) {
        self.entries
            .insert((subject, kind), ActiveSanction { scope, expires_at });
    }

    pub fn remove(&mut self, subject: &SubjectId, kind: SanctionKind) -> Option<ActiveSanction> {
        self.entries.remove(&(subject.clone(), kind))
    }

    /// Remove the entry only if it still carries the given expiry
    ///
    /// The reconciliation loop uses this to claim an entry: a concurrent
    /// manual reversal or a newly applied sanction under the same key makes
    /// the claim fail instead of evicting someone else's entry.
    pub fn remove_expiring(
        &mut self,
        subject: &SubjectId,
        kind: SanctionKind,
        expires_at: DateTime<Utc>,
    ) -> bool {
        match self.entries.get(&(subject.clone(), kind)) {
            Some(active) if active.expires_at == expires_at => {
                self.entries.remove(&(subject.clone(), kind));
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, subject: &SubjectId, kind: SanctionKind) -> Option<&ActiveSanction> {
        self.entries.get(&(subject.clone(), kind))
    }

    pub fn contains(&self, subject: &SubjectId, kind: SanctionKind) -> bool {
        self.get(subject, kind).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries whose expiry is at or before `now`
    pub fn due_entries(
        &self,
        now: DateTime<Utc>,
    ) -> Vec<(SubjectId, SanctionKind, ActiveSanction)> {
        self.entries
            .iter()
            .filter(|(_, active)| active.expires_at <= now)
            .map(|((subject, kind), active)| (subject.clone(), *kind, active.clone()))
            .collect()
    }
}
