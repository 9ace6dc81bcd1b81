//! Row model shared between the master engine and its store.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier shared by every version and correction of one
/// logical entity.
///
/// Object ids are immutable once assigned. For a brand-new object the id
/// equals the version id of its first stored row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectId(pub u64);

impl ObjectId {
    /// Creates an object id from a raw value.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw id value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "oid:{}", self.0)
    }
}

/// Unique identifier of one specific stored row.
///
/// Version ids are allocated from the store's monotonic sequence and are
/// never reused, including ids burned by aborted transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VersionId(pub u64);

impl VersionId {
    /// Creates a version id from a raw value.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw id value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "vid:{}", self.0)
    }
}

/// Identifier of a shared (deduplicated) key/value pair row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct KeyId(pub u64);

impl KeyId {
    /// Creates a key id from a raw value.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw id value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

/// An instant on either time axis, in milliseconds since the Unix epoch.
///
/// Open interval ends use the [`Timestamp::MAX_INSTANT`] sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// The "infinite future" sentinel marking an open interval end.
    pub const MAX_INSTANT: Timestamp = Timestamp(i64::MAX);

    /// Creates a timestamp from epoch milliseconds.
    #[must_use]
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns the raw epoch-millisecond value.
    #[must_use]
    pub const fn as_millis(self) -> i64 {
        self.0
    }

    /// Returns true if this is the open-interval sentinel.
    #[must_use]
    pub const fn is_max(self) -> bool {
        self.0 == i64::MAX
    }

    /// Returns the timestamp one millisecond earlier.
    #[must_use]
    pub const fn minus_millis(self, millis: i64) -> Self {
        Self(self.0 - millis)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_max() {
            write!(f, "t:max")
        } else {
            write!(f, "t:{}", self.0)
        }
    }
}

/// An external identifier: a scheme/value pair such as `ISIN/DE0001102580`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ExternalId {
    /// The identification scheme.
    pub scheme: String,
    /// The value within the scheme.
    pub value: String,
}

impl ExternalId {
    /// Creates an external identifier.
    pub fn new(scheme: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for ExternalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.scheme, self.value)
    }
}

/// One stored document row.
///
/// A row is one version/correction of a logical entity, carrying the
/// serialized payload and the metadata extracted by the adapter. Rows are
/// append-only: a correction or new version inserts a fresh row and closes
/// an interval on the prior one, never mutating historical payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRow {
    /// Row primary key.
    pub version_id: VersionId,
    /// Stable identity of the logical entity.
    pub object_id: ObjectId,
    /// Start of the version (valid-time) interval, inclusive.
    pub ver_from: Timestamp,
    /// End of the version interval, exclusive. `MAX_INSTANT` when open.
    pub ver_to: Timestamp,
    /// Start of the correction (system-time) interval, inclusive.
    pub corr_from: Timestamp,
    /// End of the correction interval, exclusive. `MAX_INSTANT` when open.
    pub corr_to: Timestamp,
    /// Descriptive name.
    pub name: String,
    /// Single-character main-type discriminator.
    pub main_type: char,
    /// Sub-type string.
    pub sub_type: String,
    /// Actual (concrete) type string.
    pub actual_type: String,
    /// Opaque serialized payload.
    pub payload: Vec<u8>,
}

impl DocumentRow {
    /// Returns true if the version interval is open (this row is the latest
    /// version).
    #[must_use]
    pub fn is_version_open(&self) -> bool {
        self.ver_to.is_max()
    }

    /// Returns true if the correction interval is open (this row is the
    /// latest correction of its version).
    #[must_use]
    pub fn is_correction_open(&self) -> bool {
        self.corr_to.is_max()
    }

    /// Returns true if this row is visible at the given instant pair.
    ///
    /// Visibility requires both intervals to contain their respective
    /// instants: `ver_from <= version_as_of < ver_to` and
    /// `corr_from <= corrected_to < corr_to`.
    #[must_use]
    pub fn visible_at(&self, version_as_of: Timestamp, corrected_to: Timestamp) -> bool {
        self.ver_from <= version_as_of
            && version_as_of < self.ver_to
            && self.corr_from <= corrected_to
            && corrected_to < self.corr_to
    }

    /// Checks the interval invariants: each `from` strictly before its `to`.
    #[must_use]
    pub fn intervals_valid(&self) -> bool {
        self.ver_from < self.ver_to && self.corr_from < self.corr_to
    }
}
