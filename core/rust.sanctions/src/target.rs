use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::types::{HistoryAction, ScopeId, SubjectId};

/// Failure applying or lifting an effect on the host platform
#[derive(Debug)]
pub enum TargetError {
    /// The subject (or the sanction) is not there to act on
    NotFound,
    /// Anything else; assumed transient and retryable
    Other(crate::Error),
}

impl TargetError {
    pub fn other(e: impl Into<crate::Error>) -> Self {
        TargetError::Other(e.into())
    }
}

impl std::fmt::Display for TargetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TargetError::NotFound => write!(f, "not found"),
            TargetError::Other(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for TargetError {}

/// The external system that actually enforces and lifts sanctions
///
/// How a ban or mute is achieved (roles, channel permission edits, native
/// timeouts) is entirely the implementor's business; the engine only needs
/// apply, remove and query. Removal is expected to be idempotent: lifting
/// an already-absent sanction reports `NotFound`, which callers treat as
/// success.
#[async_trait]
pub trait SanctionTarget: Send + Sync {
    async fn apply_ban(
        &self,
        subject: &SubjectId,
        scope: &ScopeId,
        reason: Option<&str>,
    ) -> Result<(), TargetError>;

    async fn remove_ban(
        &self,
        subject: &SubjectId,
        scope: &ScopeId,
        reason: &str,
    ) -> Result<(), TargetError>;

    async fn apply_mute(
        &self,
        subject: &SubjectId,
        scope: &ScopeId,
        reason: Option<&str>,
    ) -> Result<(), TargetError>;

    async fn remove_mute(
        &self,
        subject: &SubjectId,
        scope: &ScopeId,
        reason: &str,
    ) -> Result<(), TargetError>;

    async fn ban_in_effect(
        &self,
        subject: &SubjectId,
        scope: &ScopeId,
    ) -> Result<bool, TargetError>;

    async fn mute_in_effect(
        &self,
        subject: &SubjectId,
        scope: &ScopeId,
    ) -> Result<bool, TargetError>;
}

/// A sanction state change worth announcing
#[derive(Debug, Clone)]
pub struct SanctionEvent {
    pub action: HistoryAction,
    pub subject: SubjectId,
    pub scope: ScopeId,
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
    /// Whether the engine acted on its own (expiry) or a moderator asked
    pub automatic: bool,
}

/// Sink for sanction events, fire-and-forget
///
/// A publish failure never rolls back the state change it announces.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn publish(&self, event: &SanctionEvent) -> Result<(), crate::Error>;
}
