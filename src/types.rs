use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Module identity
// ---------------------------------------------------------------------------

/// Case-normalized module identifier.
///
/// Build output uses mixed-case directory names (`Shop/Cart`) while every store
/// key is lower-case, so normalization happens once at construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleName(String);

impl ModuleName {
    pub fn new(name: &str) -> Self {
        Self(name.trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ModuleName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

// ---------------------------------------------------------------------------
// Version stamps and slots
// ---------------------------------------------------------------------------

/// A version identifier together with the instant it was published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionStamp {
    pub version: String,
    pub timestamp: DateTime<Utc>,
}

impl VersionStamp {
    pub fn new(version: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            version: version.into(),
            timestamp,
        }
    }
}

/// A stage pointer or rollout variation that may not have been set yet.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Slot {
    #[default]
    Absent,
    Present(VersionStamp),
}

impl Slot {
    pub fn present(version: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self::Present(VersionStamp::new(version, timestamp))
    }

    /// True when the slot already carries `version`. An absent slot holds nothing.
    pub fn holds(&self, version: &str) -> bool {
        matches!(self, Self::Present(stamp) if stamp.version == version)
    }

    pub fn version(&self) -> Option<&str> {
        match self {
            Self::Absent => None,
            Self::Present(stamp) => Some(&stamp.version),
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    pub fn as_stamp(&self) -> Option<&VersionStamp> {
        match self {
            Self::Absent => None,
            Self::Present(stamp) => Some(stamp),
        }
    }
}

impl From<Option<VersionStamp>> for Slot {
    fn from(stamp: Option<VersionStamp>) -> Self {
        stamp.map_or(Self::Absent, Self::Present)
    }
}

// ---------------------------------------------------------------------------
// Version record store entities
// ---------------------------------------------------------------------------

/// Opaque optimistic-concurrency token: the publish timestamp a pointer record
/// was derived from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Marker(String);

impl Marker {
    pub fn from_timestamp(timestamp: DateTime<Utc>) -> Self {
        Self(timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true))
    }

    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stage recorded on every log entry: builds always land on the developer pointer.
pub const LOG_TARGET: &str = "developer";

/// Immutable audit record of one successful build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleLogEntry {
    pub module: ModuleName,
    pub published_at: DateTime<Utc>,
    pub version: String,
    pub expires_at: DateTime<Utc>,
}

impl ModuleLogEntry {
    pub fn new(module: &ModuleName, stamp: &VersionStamp, ttl: chrono::Duration) -> Self {
        Self {
            module: module.clone(),
            published_at: stamp.timestamp,
            version: stamp.version.clone(),
            expires_at: stamp.timestamp + ttl,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Latest per-stage pointers for one module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModulePointerRecord {
    pub module: ModuleName,
    pub developer: VersionStamp,
    pub qa: VersionStamp,
    pub deploy: Slot,
    pub general: Slot,
    pub last_write: Marker,
}

impl ModulePointerRecord {
    /// Compute the record a publish of `stamp` should leave behind, given the
    /// snapshot read from the store.
    ///
    /// Developer and qa always move to the new build; deploy and general are
    /// promoted by other tooling and are carried over untouched.
    pub fn next(current: Option<&Self>, module: &ModuleName, stamp: &VersionStamp) -> Self {
        let (deploy, general) = current.map_or((Slot::Absent, Slot::Absent), |c| {
            (c.deploy.clone(), c.general.clone())
        });

        Self {
            module: module.clone(),
            developer: stamp.clone(),
            qa: stamp.clone(),
            deploy,
            general,
            last_write: Marker::from_timestamp(stamp.timestamp),
        }
    }
}

/// Result of a conditional write against either store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Applied,
    /// The stored marker or revision no longer matches the one the writer observed.
    Conflict,
}

// ---------------------------------------------------------------------------
// Promotion flags
// ---------------------------------------------------------------------------

/// Explicit promotion toggles, sourced once per invocation by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PromotionFlags {
    pub force_beta: bool,
    pub force_prod: bool,
}
