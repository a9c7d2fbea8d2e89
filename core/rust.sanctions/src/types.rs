use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Opaque platform identifier of an account under moderation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectId(pub String);

impl SubjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for SubjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque identifier of the community a sanction applies within
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeId(pub String);

impl ScopeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for ScopeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who performed an action (either a moderator or the engine itself)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Actor {
    /// A moderator, with the display label they had at the time.
    /// The label is a point-in-time snapshot, not a live reference.
    User { id: String, label: String },
    /// The engine, for automatic reversals
    System,
}

impl Actor {
    pub fn user(id: impl Into<String>, label: impl Into<String>) -> Self {
        Actor::User {
            id: id.into(),
            label: label.into(),
        }
    }
}

impl std::fmt::Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Actor::User { id, label } => write!(f, "user:{} ({})", id, label),
            Actor::System => write!(f, "system"),
        }
    }
}

/// A moderation action kind
///
/// Bans and mutes carry enforcement effect over time; warnings and kicks
/// are history-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SanctionKind {
    Warning,
    Kick,
    Ban,
    Mute,
}

impl SanctionKind {
    /// The history action recorded when this sanction is issued
    pub fn applied_action(&self) -> HistoryAction {
        match self {
            SanctionKind::Warning => HistoryAction::Warn,
            SanctionKind::Kick => HistoryAction::Kick,
            SanctionKind::Ban => HistoryAction::Ban,
            SanctionKind::Mute => HistoryAction::Mute,
        }
    }

    /// The history action recorded when this sanction is lifted, if it can be
    pub fn reversal_action(&self) -> Option<HistoryAction> {
        match self {
            SanctionKind::Ban => Some(HistoryAction::Unban),
            SanctionKind::Mute => Some(HistoryAction::Unmute),
            SanctionKind::Warning | SanctionKind::Kick => None,
        }
    }
}

impl std::fmt::Display for SanctionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SanctionKind::Warning => write!(f, "warning"),
            SanctionKind::Kick => write!(f, "kick"),
            SanctionKind::Ban => write!(f, "ban"),
            SanctionKind::Mute => write!(f, "mute"),
        }
    }
}

impl FromStr for SanctionKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "warning" => Ok(SanctionKind::Warning),
            "kick" => Ok(SanctionKind::Kick),
            "ban" => Ok(SanctionKind::Ban),
            "mute" => Ok(SanctionKind::Mute),
            _ => Err(format!("Invalid sanction kind: {}", s).into()),
        }
    }
}

// Serde impls for SanctionKind
impl Serialize for SanctionKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        serializer.serialize_str(&format!("{}", self))
    }
}

impl<'de> Deserialize<'de> for SanctionKind {
    fn deserialize<D>(deserializer: D) -> Result<SanctionKind, D::Error>
    where
        D: serde::de::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        SanctionKind::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// One entry kind in the chronological action history
///
/// Reversals are first-class entries of their own, so the history reads as
/// a full audit trail rather than a list of open sanctions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryAction {
    Warn,
    Kick,
    Ban,
    Unban,
    Mute,
    Unmute,
    Dm,
}

impl std::fmt::Display for HistoryAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HistoryAction::Warn => write!(f, "warn"),
            HistoryAction::Kick => write!(f, "kick"),
            HistoryAction::Ban => write!(f, "ban"),
            HistoryAction::Unban => write!(f, "unban"),
            HistoryAction::Mute => write!(f, "mute"),
            HistoryAction::Unmute => write!(f, "unmute"),
            HistoryAction::Dm => write!(f, "dm"),
        }
    }
}

impl FromStr for HistoryAction {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "warn" => Ok(HistoryAction::Warn),
            "kick" => Ok(HistoryAction::Kick),
            "ban" => Ok(HistoryAction::Ban),
            "unban" => Ok(HistoryAction::Unban),
            "mute" => Ok(HistoryAction::Mute),
            "unmute" => Ok(HistoryAction::Unmute),
            "dm" => Ok(HistoryAction::Dm),
            _ => Err(format!("Invalid history action: {}", s).into()),
        }
    }
}

// Serde impls for HistoryAction
impl Serialize for HistoryAction {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        serializer.serialize_str(&format!("{}", self))
    }
}

impl<'de> Deserialize<'de> for HistoryAction {
    fn deserialize<D>(deserializer: D) -> Result<HistoryAction, D::Error>
    where
        D: serde::de::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        HistoryAction::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// One issued sanction against a subject
///
/// Immutable once created, except the reversal fields which transition
/// exactly once from unset to set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SanctionRecord {
    /// What was issued
    pub kind: SanctionKind,
    /// The reason given, if any
    pub reason: Option<String>,
    /// Who issued it
    pub issuer: Actor,
    /// The community the sanction applies within
    pub scope: ScopeId,
    /// When it was issued
    pub issued_at: DateTime<Utc>,
    /// When it lapses; permanent when absent
    pub expires_at: Option<DateTime<Utc>>,
    /// When it was lifted, manually or automatically
    pub reversed_at: Option<DateTime<Utc>>,
    /// Why it was lifted
    pub reversal_reason: Option<String>,
}

impl SanctionRecord {
    pub fn is_reversed(&self) -> bool {
        self.reversed_at.is_some()
    }
}

/// One chronological action-history entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionEvent {
    pub action: HistoryAction,
    pub reason: Option<String>,
    pub actor: Actor,
    pub scope: ScopeId,
    pub at: DateTime<Utc>,
}

/// Everything recorded about one subject
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectHistory {
    /// When the subject was first seen by the store
    pub join_date: DateTime<Utc>,
    /// Last engagement of any kind
    pub last_seen: DateTime<Utc>,
    /// Engagement counters, maintained by the stats collaborator
    pub messages: u64,
    pub message_deletes: u64,
    pub voice_minutes: f64,
    /// Kind-bucketed sanction records
    pub warnings: Vec<SanctionRecord>,
    pub kicks: Vec<SanctionRecord>,
    pub bans: Vec<SanctionRecord>,
    pub mutes: Vec<SanctionRecord>,
    /// Chronological action history, insertion order
    pub actions: Vec<ActionEvent>,
}

impl SubjectHistory {
    /// A zero-valued history for a subject first seen at `now`
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            join_date: now,
            last_seen: now,
            messages: 0,
            message_deletes: 0,
            voice_minutes: 0.0,
            warnings: Vec::new(),
            kicks: Vec::new(),
            bans: Vec::new(),
            mutes: Vec::new(),
            actions: Vec::new(),
        }
    }

    pub fn bucket(&self, kind: SanctionKind) -> &Vec<SanctionRecord> {
        match kind {
            SanctionKind::Warning => &self.warnings,
            SanctionKind::Kick => &self.kicks,
            SanctionKind::Ban => &self.bans,
            SanctionKind::Mute => &self.mutes,
        }
    }

    pub fn bucket_mut(&mut self, kind: SanctionKind) -> &mut Vec<SanctionRecord> {
        match kind {
            SanctionKind::Warning => &mut self.warnings,
            SanctionKind::Kick => &mut self.kicks,
            SanctionKind::Ban => &mut self.bans,
            SanctionKind::Mute => &mut self.mutes,
        }
    }
}
