//! Identity and instant-selection types.

use bitempo_storage::{ObjectId, Timestamp, VersionId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Composite identity of one stored document row.
///
/// Combines the facade's scheme label with the stable object id and the row's
/// version id. Two masters with different scheme labels never accept each
/// other's identities.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UniqueId {
    /// The identifier scheme label owned by the facade.
    pub scheme: String,
    /// Stable identity of the logical entity.
    pub object_id: ObjectId,
    /// The specific stored row.
    pub version_id: VersionId,
}

impl UniqueId {
    /// Creates a composite identity.
    pub fn new(scheme: impl Into<String>, object_id: ObjectId, version_id: VersionId) -> Self {
        Self {
            scheme: scheme.into(),
            object_id,
            version_id,
        }
    }
}

impl fmt::Display for UniqueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}~{}~{}",
            self.scheme,
            self.object_id.as_u64(),
            self.version_id.as_u64()
        )
    }
}

/// An instant on one time axis, or "latest".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Instant {
    /// The open present.
    #[default]
    Latest,
    /// A fixed instant.
    Fixed(Timestamp),
}

impl Instant {
    /// Resolves against a captured `now`.
    #[must_use]
    pub fn resolve(self, now: Timestamp) -> Timestamp {
        match self {
            Self::Latest => now,
            Self::Fixed(at) => at,
        }
    }
}

/// The bitemporal locator of a query: one instant per axis.
///
/// Either axis may be `Latest`; both are resolved against a single `now()`
/// captured once per operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VersionCorrection {
    /// Instant on the version (valid-time) axis.
    pub version_as_of: Instant,
    /// Instant on the correction (system-time) axis.
    pub corrected_to: Instant,
}

impl VersionCorrection {
    /// Both axes at the open present.
    pub const LATEST: VersionCorrection = VersionCorrection {
        version_as_of: Instant::Latest,
        corrected_to: Instant::Latest,
    };

    /// Fixes the version axis, leaving corrections at latest.
    #[must_use]
    pub fn of_version(version_as_of: Timestamp) -> Self {
        Self {
            version_as_of: Instant::Fixed(version_as_of),
            corrected_to: Instant::Latest,
        }
    }

    /// Fixes both axes.
    #[must_use]
    pub fn of(version_as_of: Timestamp, corrected_to: Timestamp) -> Self {
        Self {
            version_as_of: Instant::Fixed(version_as_of),
            corrected_to: Instant::Fixed(corrected_to),
        }
    }

    /// Resolves both axes against one captured `now`, returning the fixed
    /// instant pair.
    #[must_use]
    pub fn with_latest_fixed(self, now: Timestamp) -> (Timestamp, Timestamp) {
        (
            self.version_as_of.resolve(now),
            self.corrected_to.resolve(now),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_id_display() {
        let id = UniqueId::new("DbSec", ObjectId::new(7), VersionId::new(42));
        assert_eq!(format!("{id}"), "DbSec~7~42");
    }

    #[test]
    fn latest_resolves_to_now() {
        let now = Timestamp::from_millis(500);
        assert_eq!(
            VersionCorrection::LATEST.with_latest_fixed(now),
            (now, now)
        );
    }

    #[test]
    fn fixed_axes_ignore_now() {
        let vc = VersionCorrection::of(Timestamp::from_millis(100), Timestamp::from_millis(200));
        assert_eq!(
            vc.with_latest_fixed(Timestamp::from_millis(999)),
            (Timestamp::from_millis(100), Timestamp::from_millis(200))
        );
    }

    #[test]
    fn mixed_axes() {
        let vc = VersionCorrection::of_version(Timestamp::from_millis(100));
        let (v, c) = vc.with_latest_fixed(Timestamp::from_millis(999));
        assert_eq!(v, Timestamp::from_millis(100));
        assert_eq!(c, Timestamp::from_millis(999));
    }
}
