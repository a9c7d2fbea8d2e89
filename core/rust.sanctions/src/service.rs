use chrono::Utc;
use std::sync::Arc;
use wardencore_rs::utils::{parse_duration, DurationParseError};

use crate::data::Data;
use crate::store::StoreError;
use crate::target::{SanctionEvent, TargetError};
use crate::types::{
    ActionEvent, Actor, HistoryAction, SanctionKind, SanctionRecord, ScopeId, SubjectHistory,
    SubjectId,
};

/// Why a service operation failed
#[derive(Debug)]
pub enum ServiceError {
    /// Malformed or out-of-range duration token; caller-facing, never a
    /// system fault
    Duration(DurationParseError),
    /// The store could not persist; in-memory state is still correct
    Store(StoreError),
    /// The platform refused the effect; nothing was recorded
    Target(TargetError),
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceError::Duration(e) => write!(f, "{}", e),
            ServiceError::Store(e) => write!(f, "{}", e),
            ServiceError::Target(e) => write!(f, "platform error: {}", e),
        }
    }
}

impl std::error::Error for ServiceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServiceError::Duration(e) => Some(e),
            ServiceError::Store(e) => Some(e),
            ServiceError::Target(e) => Some(e),
        }
    }
}

impl From<DurationParseError> for ServiceError {
    fn from(e: DurationParseError) -> Self {
        ServiceError::Duration(e)
    }
}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        ServiceError::Store(e)
    }
}

impl From<TargetError> for ServiceError {
    fn from(e: TargetError) -> Self {
        ServiceError::Target(e)
    }
}

/// Outcome of a manual reversal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReversalOutcome {
    /// The effect was lifted (or already absent) and the record updated
    Reversed,
    /// Nothing was sanctioned; a no-op, not an error
    NotSanctioned,
}

/// The synchronous facade the moderation-issuing layer calls into
///
/// Who may sanction whom is the caller's problem; the service enforces
/// lifecycle invariants, not permissions.
#[derive(Clone)]
pub struct SanctionService {
    data: Arc<Data>,
}

impl SanctionService {
    pub fn new(data: Arc<Data>) -> Self {
        Self { data }
    }

    /// Ban a subject, optionally time-bound
    ///
    /// `duration_token` is a compact token like `30m`/`24h`/`7d`; absent
    /// means permanent.
    pub async fn apply_ban(
        &self,
        subject: &SubjectId,
        scope: &ScopeId,
        issuer: Actor,
        duration_token: Option<&str>,
        reason: Option<&str>,
    ) -> Result<SanctionRecord, ServiceError> {
        self.apply_enforced(SanctionKind::Ban, subject, scope, issuer, duration_token, reason)
            .await
    }

    /// Mute a subject, optionally time-bound
    pub async fn apply_mute(
        &self,
        subject: &SubjectId,
        scope: &ScopeId,
        issuer: Actor,
        duration_token: Option<&str>,
        reason: Option<&str>,
    ) -> Result<SanctionRecord, ServiceError> {
        self.apply_enforced(SanctionKind::Mute, subject, scope, issuer, duration_token, reason)
            .await
    }

    /// Record a warning; history-only, nothing to enforce
    pub async fn apply_warn(
        &self,
        subject: &SubjectId,
        scope: &ScopeId,
        issuer: Actor,
        reason: Option<&str>,
    ) -> Result<SanctionRecord, ServiceError> {
        self.record_unenforced(SanctionKind::Warning, subject, scope, issuer, reason)
            .await
    }

    /// Record a kick; the physical removal is the command layer's act
    pub async fn apply_kick(
        &self,
        subject: &SubjectId,
        scope: &ScopeId,
        issuer: Actor,
        reason: Option<&str>,
    ) -> Result<SanctionRecord, ServiceError> {
        self.record_unenforced(SanctionKind::Kick, subject, scope, issuer, reason)
            .await
    }

    async fn apply_enforced(
        &self,
        kind: SanctionKind,
        subject: &SubjectId,
        scope: &ScopeId,
        issuer: Actor,
        duration_token: Option<&str>,
        reason: Option<&str>,
    ) -> Result<SanctionRecord, ServiceError> {
        let duration = match duration_token {
            Some(token) => Some(parse_duration(token, &self.data.config.duration_limits)?),
            None => None,
        };

        // Effect first: a sanction the platform refused is never recorded
        match kind {
            SanctionKind::Ban => self.data.target.apply_ban(subject, scope, reason).await?,
            SanctionKind::Mute => self.data.target.apply_mute(subject, scope, reason).await?,
            SanctionKind::Warning | SanctionKind::Kick => {}
        }

        let issued_at = Utc::now();
        let expires_at =
            duration.map(|d| issued_at + chrono::Duration::seconds(d.as_secs() as i64));

        let record = SanctionRecord {
            kind,
            reason: reason.map(str::to_string),
            issuer,
            scope: scope.clone(),
            issued_at,
            expires_at,
            reversed_at: None,
            reversal_reason: None,
        };

        let save_result = {
            let mut state = self.data.state.lock().await;

            let save_result = state.store.append_sanction(subject, record.clone());

            if let Some(expires_at) = record.expires_at {
                state
                    .index
                    .insert(subject.clone(), kind, scope.clone(), expires_at);
            }

            save_result
        };

        self.data
            .notify(SanctionEvent {
                action: kind.applied_action(),
                subject: subject.clone(),
                scope: scope.clone(),
                reason: record.reason.clone(),
                timestamp: issued_at,
                automatic: false,
            })
            .await;

        save_result?;
        Ok(record)
    }

    async fn record_unenforced(
        &self,
        kind: SanctionKind,
        subject: &SubjectId,
        scope: &ScopeId,
        issuer: Actor,
        reason: Option<&str>,
    ) -> Result<SanctionRecord, ServiceError> {
        let record = SanctionRecord {
            kind,
            reason: reason.map(str::to_string),
            issuer,
            scope: scope.clone(),
            issued_at: Utc::now(),
            expires_at: None,
            reversed_at: None,
            reversal_reason: None,
        };

        let save_result = {
            let mut state = self.data.state.lock().await;
            state.store.append_sanction(subject, record.clone())
        };

        self.data
            .notify(SanctionEvent {
                action: kind.applied_action(),
                subject: subject.clone(),
                scope: scope.clone(),
                reason: record.reason.clone(),
                timestamp: record.issued_at,
                automatic: false,
            })
            .await;

        save_result?;
        Ok(record)
    }

    /// Record a staff DM in the subject's action history
    pub async fn record_dm(
        &self,
        subject: &SubjectId,
        scope: &ScopeId,
        issuer: Actor,
        message: &str,
    ) -> Result<(), ServiceError> {
        let event = ActionEvent {
            action: HistoryAction::Dm,
            reason: Some(message.to_string()),
            actor: issuer,
            scope: scope.clone(),
            at: Utc::now(),
        };

        let mut state = self.data.state.lock().await;
        state.store.append_event(subject, event)?;

        Ok(())
    }

    /// Manually lift a ban or mute
    ///
    /// Idempotent: reversing a subject that is not currently sanctioned is
    /// a no-op, not an error. Warnings and kicks have nothing to reverse.
    pub async fn reverse_manually(
        &self,
        subject: &SubjectId,
        kind: SanctionKind,
        scope: &ScopeId,
        issuer: Actor,
        reason: &str,
    ) -> Result<ReversalOutcome, ServiceError> {
        let reversal_action = match kind {
            SanctionKind::Ban => HistoryAction::Unban,
            SanctionKind::Mute => HistoryAction::Unmute,
            SanctionKind::Warning | SanctionKind::Kick => {
                return Ok(ReversalOutcome::NotSanctioned)
            }
        };

        let removed = match kind {
            SanctionKind::Ban => self.data.target.remove_ban(subject, scope, reason).await,
            SanctionKind::Mute => self.data.target.remove_mute(subject, scope, reason).await,
            SanctionKind::Warning | SanctionKind::Kick => Ok(()),
        };

        let effect_lifted = match removed {
            Ok(()) => true,
            // Already gone; removal is idempotent
            Err(TargetError::NotFound) => false,
            Err(e) => return Err(ServiceError::Target(e)),
        };

        let when = Utc::now();

        let (marked, had_entry) = {
            let mut state = self.data.state.lock().await;

            let had_entry = state.index.remove(subject, kind).is_some();
            let marked = state.store.mark_reversed_latest(
                subject,
                kind,
                scope,
                issuer.clone(),
                when,
                reason,
            )?;

            (marked, had_entry)
        };

        if !effect_lifted && !marked && !had_entry {
            return Ok(ReversalOutcome::NotSanctioned);
        }

        self.data
            .notify(SanctionEvent {
                action: reversal_action,
                subject: subject.clone(),
                scope: scope.clone(),
                reason: Some(reason.to_string()),
                timestamp: when,
                automatic: false,
            })
            .await;

        Ok(ReversalOutcome::Reversed)
    }

    /// Bump the message counter for a subject (stats collaborator surface)
    pub async fn record_message(&self, subject: &SubjectId) -> Result<(), ServiceError> {
        let mut state = self.data.state.lock().await;

        let history = state.store.ensure(subject);
        history.messages += 1;
        history.last_seen = Utc::now();

        state.store.save()?;
        Ok(())
    }

    /// Bump the deleted-message counter for a subject
    pub async fn record_message_delete(&self, subject: &SubjectId) -> Result<(), ServiceError> {
        let mut state = self.data.state.lock().await;

        let history = state.store.ensure(subject);
        history.message_deletes += 1;

        state.store.save()?;
        Ok(())
    }

    /// Credit a finished voice session to a subject
    pub async fn record_voice_minutes(
        &self,
        subject: &SubjectId,
        minutes: f64,
    ) -> Result<(), ServiceError> {
        let mut state = self.data.state.lock().await;

        let history = state.store.ensure(subject);
        history.voice_minutes += minutes;
        history.last_seen = Utc::now();

        state.store.save()?;
        Ok(())
    }

    /// Snapshot of a subject's history, if any
    pub async fn history(&self, subject: &SubjectId) -> Option<SubjectHistory> {
        self.data.state.lock().await.store.history(subject).cloned()
    }
}
