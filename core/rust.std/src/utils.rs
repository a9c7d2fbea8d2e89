use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A unit a duration token may be expressed in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Minutes,
    Hours,
    Days,
}

impl Unit {
    pub fn to_seconds(&self) -> u64 {
        match self {
            Unit::Minutes => 60,
            Unit::Hours => 3600,
            Unit::Days => 86400,
        }
    }

    pub fn suffix(&self) -> char {
        match self {
            Unit::Minutes => 'm',
            Unit::Hours => 'h',
            Unit::Days => 'd',
        }
    }
}

impl TryFrom<char> for Unit {
    type Error = ();

    fn try_from(c: char) -> Result<Self, Self::Error> {
        match c {
            'm' => Ok(Unit::Minutes),
            'h' => Ok(Unit::Hours),
            'd' => Ok(Unit::Days),
            _ => Err(()),
        }
    }
}

/// Per-unit caps on what a duration token may express
///
/// These are advisory limits meant to catch operator typos (a `300d` mute is
/// usually a mistyped `30d`), so they are configuration, not constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DurationLimits {
    pub max_minutes: u64,
    pub max_hours: u64,
    pub max_days: u64,
}

impl Default for DurationLimits {
    fn default() -> Self {
        Self {
            max_minutes: 1440,
            max_hours: 24,
            max_days: 365,
        }
    }
}

impl DurationLimits {
    fn max_for(&self, unit: Unit) -> u64 {
        match unit {
            Unit::Minutes => self.max_minutes,
            Unit::Hours => self.max_hours,
            Unit::Days => self.max_days,
        }
    }
}

/// Rejection of a duration token, carrying what a valid token looks like
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DurationParseError {
    pub token: String,
    pub expected: String,
}

impl std::fmt::Display for DurationParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid duration '{}': {}", self.token, self.expected)
    }
}

impl std::error::Error for DurationParseError {}

const EXPECTED_FORMAT: &str = "use <number><unit> where unit is 'm' for minutes, 'h' for hours or 'd' for days, e.g. '30m', '24h', '7d'";

/// Parse a compact duration token (`30m`, `24h`, `7d`)
///
/// The token is one or more digits followed by exactly one unit character.
/// Surrounding whitespace is trimmed and the unit is case-insensitive;
/// signs, decimals and interior whitespace all reject.
pub fn parse_duration(
    token: &str,
    limits: &DurationLimits,
) -> Result<Duration, DurationParseError> {
    let reject = |expected: String| DurationParseError {
        token: token.to_string(),
        expected,
    };

    let trimmed = token.trim().to_lowercase();

    let mut chars = trimmed.chars();
    let Some(unit_char) = chars.next_back() else {
        return Err(reject(EXPECTED_FORMAT.to_string()));
    };
    let digits = chars.as_str();

    let unit = Unit::try_from(unit_char).map_err(|()| reject(EXPECTED_FORMAT.to_string()))?;

    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(reject(EXPECTED_FORMAT.to_string()));
    }

    let amount: u64 = digits
        .parse()
        .map_err(|_| reject(EXPECTED_FORMAT.to_string()))?;

    if amount == 0 {
        return Err(reject("the amount must be a positive integer".to_string()));
    }

    let max = limits.max_for(unit);
    if amount > max {
        return Err(reject(format!("the maximum is {}{}", max, unit.suffix())));
    }

    Ok(Duration::from_secs(amount * unit.to_seconds()))
}

/// Render a duration as its largest applicable units, space-joined
///
/// Seconds only appear when every larger unit is zero; an absent duration
/// renders as "permanent".
pub fn format_duration(duration: Option<Duration>) -> String {
    let Some(duration) = duration else {
        return "permanent".to_string();
    };

    let mut secs = duration.as_secs();
    let days = secs / 86400;
    secs %= 86400;
    let hours = secs / 3600;
    secs %= 3600;
    let minutes = secs / 60;
    secs %= 60;

    let mut parts = Vec::new();

    if days > 0 {
        parts.push(pluralize(days, "day"));
    }
    if hours > 0 {
        parts.push(pluralize(hours, "hour"));
    }
    if minutes > 0 {
        parts.push(pluralize(minutes, "minute"));
    }
    if secs > 0 && parts.is_empty() {
        parts.push(pluralize(secs, "second"));
    }

    parts.join(" ")
}

fn pluralize(n: u64, unit: &str) -> String {
    if n == 1 {
        format!("{} {}", n, unit)
    } else {
        format!("{} {}s", n, unit)
    }
}
