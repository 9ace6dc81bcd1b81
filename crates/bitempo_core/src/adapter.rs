//! Adapter contract between the generic engine and one document type.

use crate::error::MasterResult;
use crate::types::UniqueId;
use bitempo_storage::{ExternalId, ObjectId, Timestamp, VersionId};
use serde::{Deserialize, Serialize};

/// A set of external identifiers extracted from one payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalIdBundle {
    ids: Vec<ExternalId>,
}

impl ExternalIdBundle {
    /// Creates an empty bundle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a bundle from identifiers, dropping duplicates.
    pub fn of(ids: impl IntoIterator<Item = ExternalId>) -> Self {
        let mut bundle = Self::new();
        for id in ids {
            bundle.push(id);
        }
        bundle
    }

    /// Adds an identifier unless already present.
    pub fn push(&mut self, id: ExternalId) {
        if !self.ids.contains(&id) {
            self.ids.push(id);
        }
    }

    /// Returns the identifiers.
    #[must_use]
    pub fn ids(&self) -> &[ExternalId] {
        &self.ids
    }

    /// Returns true if the bundle holds no identifiers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// The per-document-type contract.
///
/// One implementation exists per stored document type. All extraction
/// functions are pure: deterministic and side-effect-free over the payload,
/// so the engine may call them at any point of a retry loop. Round-tripping
/// through `serialize`/`deserialize` must preserve everything extraction
/// reads.
pub trait DocumentAdapter: Send + Sync {
    /// The domain payload stored by this adapter.
    type Payload: Clone + Send;

    /// Single-character discriminator of the table family.
    fn main_type(&self) -> char;

    /// Descriptive name of a payload.
    fn name(&self, payload: &Self::Payload) -> String;

    /// External identifiers of a payload.
    fn external_ids(&self, payload: &Self::Payload) -> ExternalIdBundle;

    /// Searchable attributes of a payload.
    fn attributes(&self, payload: &Self::Payload) -> Vec<(String, String)>;

    /// Indexed properties of a payload.
    ///
    /// Defaults to none; most document types index nothing beyond their
    /// attributes.
    fn indexed_properties(&self, _payload: &Self::Payload) -> Vec<(String, String)> {
        Vec::new()
    }

    /// Sub-type label of a payload.
    fn sub_type(&self, payload: &Self::Payload) -> String;

    /// Concrete-type label of a payload.
    fn actual_type(&self, payload: &Self::Payload) -> String;

    /// Encodes a payload to bytes.
    fn serialize(&self, payload: &Self::Payload) -> MasterResult<Vec<u8>>;

    /// Decodes a payload from bytes.
    fn deserialize(&self, bytes: &[u8]) -> MasterResult<Self::Payload>;

    /// Writes the assigned identity back onto the payload.
    fn attach_identity(&self, payload: &mut Self::Payload, id: &UniqueId);
}

/// A payload wrapped with its bitemporal coordinates.
///
/// `None` interval ends mean "open"; the engine maps them to the storage
/// sentinel. A freshly built document carries no identity or instants until
/// [`crate::DocumentMaster::add`] assigns them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document<P> {
    /// Identity assigned at add time, `None` before.
    pub unique_id: Option<UniqueId>,
    /// Start of the version interval.
    pub version_from: Option<Timestamp>,
    /// End of the version interval, `None` while open.
    pub version_to: Option<Timestamp>,
    /// Start of the correction interval.
    pub correction_from: Option<Timestamp>,
    /// End of the correction interval, `None` while open.
    pub correction_to: Option<Timestamp>,
    /// The domain payload.
    pub payload: P,
}

impl<P> Document<P> {
    /// Wraps a payload with no identity or instants.
    pub fn new(payload: P) -> Self {
        Self {
            unique_id: None,
            version_from: None,
            version_to: None,
            correction_from: None,
            correction_to: None,
            payload,
        }
    }

    /// Returns the object id, if identity has been assigned.
    #[must_use]
    pub fn object_id(&self) -> Option<ObjectId> {
        self.unique_id.as_ref().map(|id| id.object_id)
    }

    /// Returns the version id, if identity has been assigned.
    #[must_use]
    pub fn version_id(&self) -> Option<VersionId> {
        self.unique_id.as_ref().map(|id| id.version_id)
    }

    /// Returns true if this document is the latest version (open version
    /// interval).
    #[must_use]
    pub fn is_latest_version(&self) -> bool {
        self.version_to.is_none()
    }

    /// Returns true if this document is the latest correction of its
    /// version (open correction interval).
    #[must_use]
    pub fn is_latest_correction(&self) -> bool {
        self.correction_to.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundle_deduplicates() {
        let bundle = ExternalIdBundle::of([
            ExternalId::new("TICKER", "AAPL"),
            ExternalId::new("TICKER", "AAPL"),
            ExternalId::new("ISIN", "US0378331005"),
        ]);
        assert_eq!(bundle.ids().len(), 2);
    }

    #[test]
    fn fresh_document_has_no_identity() {
        let doc = Document::new("payload");
        assert!(doc.unique_id.is_none());
        assert!(doc.object_id().is_none());
        assert!(doc.is_latest_version());
        assert!(doc.is_latest_correction());
    }
}
