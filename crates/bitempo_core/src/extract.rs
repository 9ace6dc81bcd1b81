//! Row to document extraction.

use crate::adapter::{Document, DocumentAdapter};
use crate::error::{MasterError, MasterResult};
use crate::types::UniqueId;
use bitempo_storage::{DocumentRow, Timestamp, VersionId};
use std::collections::HashSet;

/// Rebuilds documents from stored rows, in storage order.
///
/// One extractor instance serves one result set. It decodes the payload
/// through the adapter, reattaches the composite identity to the payload and
/// the wrapper, and maps the interval sentinels back to open ends. A version
/// id repeated within one pass means storage handed back an impossible result
/// set and extraction stops with [`MasterError::MalformedResult`].
pub(crate) struct DocumentExtractor<'a, A> {
    adapter: &'a A,
    scheme: &'a str,
    seen: HashSet<VersionId>,
}

impl<'a, A: DocumentAdapter> DocumentExtractor<'a, A> {
    pub(crate) fn new(adapter: &'a A, scheme: &'a str) -> Self {
        Self {
            adapter,
            scheme,
            seen: HashSet::new(),
        }
    }

    pub(crate) fn extract(&mut self, row: &DocumentRow) -> MasterResult<Document<A::Payload>> {
        if !self.seen.insert(row.version_id) {
            return Err(MasterError::malformed(format!(
                "duplicate row {} in one result set",
                row.version_id
            )));
        }
        let mut payload = self.adapter.deserialize(&row.payload)?;
        let unique_id = UniqueId::new(self.scheme, row.object_id, row.version_id);
        self.adapter.attach_identity(&mut payload, &unique_id);
        Ok(Document {
            unique_id: Some(unique_id),
            version_from: Some(row.ver_from),
            version_to: open_to_none(row.ver_to),
            correction_from: Some(row.corr_from),
            correction_to: open_to_none(row.corr_to),
            payload,
        })
    }

    pub(crate) fn extract_all(
        mut self,
        rows: &[DocumentRow],
    ) -> MasterResult<Vec<Document<A::Payload>>> {
        rows.iter().map(|row| self.extract(row)).collect()
    }
}

fn open_to_none(to: Timestamp) -> Option<Timestamp> {
    if to.is_max() {
        None
    } else {
        Some(to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::ExternalIdBundle;
    use bitempo_storage::ObjectId;

    /// Adapter whose payload is the raw bytes.
    struct RawAdapter;

    impl DocumentAdapter for RawAdapter {
        type Payload = Vec<u8>;

        fn main_type(&self) -> char {
            'R'
        }
        fn name(&self, _payload: &Vec<u8>) -> String {
            String::new()
        }
        fn external_ids(&self, _payload: &Vec<u8>) -> ExternalIdBundle {
            ExternalIdBundle::new()
        }
        fn attributes(&self, _payload: &Vec<u8>) -> Vec<(String, String)> {
            Vec::new()
        }
        fn sub_type(&self, _payload: &Vec<u8>) -> String {
            String::new()
        }
        fn actual_type(&self, _payload: &Vec<u8>) -> String {
            String::new()
        }
        fn serialize(&self, payload: &Vec<u8>) -> MasterResult<Vec<u8>> {
            Ok(payload.clone())
        }
        fn deserialize(&self, bytes: &[u8]) -> MasterResult<Vec<u8>> {
            Ok(bytes.to_vec())
        }
        fn attach_identity(&self, _payload: &mut Vec<u8>, _id: &UniqueId) {}
    }

    fn row(version_id: u64) -> DocumentRow {
        DocumentRow {
            version_id: VersionId::new(version_id),
            object_id: ObjectId::new(9),
            ver_from: Timestamp::from_millis(100),
            ver_to: Timestamp::MAX_INSTANT,
            corr_from: Timestamp::from_millis(100),
            corr_to: Timestamp::from_millis(200),
            name: "raw".to_string(),
            main_type: 'R',
            sub_type: String::new(),
            actual_type: String::new(),
            payload: vec![7],
        }
    }

    #[test]
    fn extraction_sets_identity_and_instants() {
        let mut extractor = DocumentExtractor::new(&RawAdapter, "Raw");
        let doc = extractor.extract(&row(1)).unwrap();
        let id = doc.unique_id.unwrap();
        assert_eq!(id.scheme, "Raw");
        assert_eq!(id.object_id, ObjectId::new(9));
        assert_eq!(doc.version_to, None);
        assert_eq!(doc.correction_to, Some(Timestamp::from_millis(200)));
        assert_eq!(doc.payload, vec![7]);
    }

    #[test]
    fn duplicate_version_id_is_malformed() {
        let mut extractor = DocumentExtractor::new(&RawAdapter, "Raw");
        extractor.extract(&row(1)).unwrap();
        let err = extractor.extract(&row(1)).unwrap_err();
        assert!(matches!(err, MasterError::MalformedResult { .. }));
    }

    #[test]
    fn extract_all_preserves_order() {
        let extractor = DocumentExtractor::new(&RawAdapter, "Raw");
        let docs = extractor.extract_all(&[row(1), row(2), row(3)]).unwrap();
        let vids: Vec<u64> = docs
            .iter()
            .map(|d| d.unique_id.as_ref().unwrap().version_id.as_u64())
            .collect();
        assert_eq!(vids, vec![1, 2, 3]);
    }
}
