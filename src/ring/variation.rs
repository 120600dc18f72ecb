use std::fmt;

use chrono::{DateTime, Utc};

use crate::types::{PromotionFlags, Slot, VersionStamp};

/// Wire value of a variation that has never been promoted into.
pub const ABSENT_VALUE: &str = "None";

/// Separator between version and timestamp, padded with non-breaking spaces so
/// flag consoles keep the two columns apart.
const VALUE_SEPARATOR: &str = " \u{a0}|\u{a0} ";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

// ---------------------------------------------------------------------------
// Variation names
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variation {
    Trunk,
    Release,
    Beta,
    History1,
    History2,
}

impl Variation {
    pub const ALL: [Self; 5] = [
        Self::Trunk,
        Self::Release,
        Self::Beta,
        Self::History1,
        Self::History2,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Trunk => "trunk",
            Self::Release => "release",
            Self::Beta => "beta",
            Self::History1 => "history_1",
            Self::History2 => "history_2",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.name() == name)
    }
}

impl fmt::Display for Variation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Value codec
// ---------------------------------------------------------------------------

/// Encode a slot as the flag store's string value.
pub fn encode_slot(slot: &Slot) -> String {
    match slot {
        Slot::Absent => ABSENT_VALUE.to_owned(),
        Slot::Present(stamp) => format!(
            "{}{VALUE_SEPARATOR}{}",
            stamp.version,
            stamp.timestamp.format(TIMESTAMP_FORMAT)
        ),
    }
}

fn is_padding(c: char) -> bool {
    c.is_ascii_whitespace() || c == '\u{a0}'
}

/// Decode a flag store string value.
///
/// Only the bare `None` is absent; anything with a separator is a real
/// version, even one literally named `None`. The timestamp follows the last
/// `|`, so versions may contain `|` themselves.
pub fn decode_slot(raw: &str) -> Slot {
    let raw = raw.trim_matches(is_padding);
    if raw == ABSENT_VALUE {
        return Slot::Absent;
    }

    let (version, time) = match raw.rsplit_once('|') {
        Some((version, time)) => (
            version.trim_matches(is_padding),
            time.trim_matches(is_padding),
        ),
        None => (raw, ""),
    };

    let timestamp = DateTime::parse_from_rfc3339(time)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

    Slot::Present(VersionStamp::new(version, timestamp))
}

// ---------------------------------------------------------------------------
// Variation set
// ---------------------------------------------------------------------------

/// The five rollout slots of one module.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VariationSet {
    pub trunk: Slot,
    pub release: Slot,
    pub beta: Slot,
    pub history_1: Slot,
    pub history_2: Slot,
}

/// One slot assignment inside a batched update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotWrite {
    pub variation: Variation,
    pub value: Slot,
}

impl VariationSet {
    /// State of a module's first publish: trunk set, everything else absent.
    pub fn initial(stamp: &VersionStamp) -> Self {
        Self {
            trunk: Slot::Present(stamp.clone()),
            ..Self::default()
        }
    }

    pub fn get(&self, variation: Variation) -> &Slot {
        match variation {
            Variation::Trunk => &self.trunk,
            Variation::Release => &self.release,
            Variation::Beta => &self.beta,
            Variation::History1 => &self.history_1,
            Variation::History2 => &self.history_2,
        }
    }

    fn get_mut(&mut self, variation: Variation) -> &mut Slot {
        match variation {
            Variation::Trunk => &mut self.trunk,
            Variation::Release => &mut self.release,
            Variation::Beta => &mut self.beta,
            Variation::History1 => &mut self.history_1,
            Variation::History2 => &mut self.history_2,
        }
    }

    pub fn apply(&mut self, writes: &[SlotWrite]) {
        for write in writes {
            *self.get_mut(write.variation) = write.value.clone();
        }
    }

    /// Build from `(name, value)` pairs as stored. Missing variations are
    /// absent; unknown names are ignored.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut set = Self::default();
        for (name, value) in pairs {
            if let Some(variation) = Variation::from_name(name) {
                *set.get_mut(variation) = decode_slot(value);
            }
        }
        set
    }

    /// All five variations with their encoded values, in canonical order.
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        Variation::ALL
            .into_iter()
            .map(|v| (v.name(), encode_slot(self.get(v))))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Promotion planning
// ---------------------------------------------------------------------------

/// Decide which slots a publish of `stamp` touches.
///
/// Every decision reads `current`, the single snapshot the batched write is
/// conditioned on, so the history shift sees the pre-promotion release. An
/// empty plan means the module is already where it should be.
pub fn plan_promotion(
    current: &VariationSet,
    stamp: &VersionStamp,
    flags: PromotionFlags,
) -> Vec<SlotWrite> {
    let version = stamp.version.as_str();
    let fresh = Slot::Present(stamp.clone());
    let mut writes = Vec::new();

    if !current.trunk.holds(version) {
        writes.push(SlotWrite {
            variation: Variation::Trunk,
            value: fresh.clone(),
        });
    }

    if flags.force_beta && !current.beta.holds(version) {
        writes.push(SlotWrite {
            variation: Variation::Beta,
            value: fresh.clone(),
        });
    }

    if flags.force_prod && !current.release.holds(version) {
        writes.push(SlotWrite {
            variation: Variation::History2,
            value: current.history_1.clone(),
        });
        writes.push(SlotWrite {
            variation: Variation::History1,
            value: current.release.clone(),
        });
        writes.push(SlotWrite {
            variation: Variation::Release,
            value: fresh,
        });
    }

    writes
}
