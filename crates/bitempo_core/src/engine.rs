//! The master engine.
//!
//! Every mutation is expressed as interval closes on current rows plus
//! inserts of fresh rows, inside one atomic store transaction. Historical
//! rows are never mutated in place, so the full audit trail stays
//! reconstructable from the row set alone.

use crate::adapter::{Document, DocumentAdapter};
use crate::error::{MasterError, MasterResult};
use crate::extract::DocumentExtractor;
use crate::search::{HistoryRequest, SearchRequest, SearchResult};
use crate::time::Clock;
use crate::types::{UniqueId, VersionCorrection};
use crate::versions::{adjust_version_instants, check_unique_versions_from, check_within_window};
use bitempo_storage::{DocStore, DocumentRow, HistoryQuery, KeyId, ObjectId, StoreTxn, Timestamp};
use std::sync::Arc;
use tracing::{debug, warn};

/// The generic bitemporal engine, composed with one adapter.
///
/// The engine owns no caches and no locks of its own: all shared state lives
/// behind the store, and write contention is absorbed by the bounded retry
/// loop around each mutation.
pub struct DocumentEngine<A: DocumentAdapter> {
    store: Arc<dyn DocStore>,
    adapter: A,
    clock: Arc<dyn Clock>,
    scheme: String,
    max_retries: u32,
}

impl<A: DocumentAdapter> DocumentEngine<A> {
    /// Creates an engine over a store.
    pub fn new(
        store: Arc<dyn DocStore>,
        adapter: A,
        clock: Arc<dyn Clock>,
        scheme: impl Into<String>,
        max_retries: u32,
    ) -> Self {
        Self {
            store,
            adapter,
            clock,
            scheme: scheme.into(),
            max_retries: max_retries.max(1),
        }
    }

    /// The identifier scheme this engine stamps onto documents.
    #[must_use]
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Fetches the exact row named by a composite identity.
    pub fn get(&self, unique_id: &UniqueId) -> MasterResult<Document<A::Payload>> {
        debug!(%unique_id, "get");
        self.check_scheme(unique_id)?;
        let row = self
            .store
            .get_by_id(unique_id.version_id)?
            .filter(|row| {
                row.object_id == unique_id.object_id && row.main_type == self.adapter.main_type()
            })
            .ok_or_else(|| MasterError::not_found(format!("no document {unique_id}")))?;
        DocumentExtractor::new(&self.adapter, &self.scheme).extract(&row)
    }

    /// Fetches several documents, in input order.
    pub fn get_many(&self, unique_ids: &[UniqueId]) -> MasterResult<Vec<Document<A::Payload>>> {
        unique_ids.iter().map(|id| self.get(id)).collect()
    }

    /// Fetches the single document of an object visible at the locator.
    ///
    /// Both "latest" axes resolve against one captured `now()`.
    pub fn get_at(
        &self,
        object_id: ObjectId,
        locator: VersionCorrection,
    ) -> MasterResult<Document<A::Payload>> {
        let now = self.clock.now();
        let (version_as_of, corrected_to) = locator.with_latest_fixed(now);
        debug!(%object_id, %version_as_of, %corrected_to, "get_at");
        let row = self
            .store
            .get_by_oid_instants(object_id, version_as_of, corrected_to)?
            .ok_or_else(|| {
                MasterError::not_found(format!(
                    "no document of {object_id} at ({version_as_of}, {corrected_to})"
                ))
            })?;
        DocumentExtractor::new(&self.adapter, &self.scheme).extract(&row)
    }

    /// Adds a document, returning it enriched with its assigned identity and
    /// instants.
    ///
    /// A document carrying an identity of this scheme keeps its object id
    /// (adding a row to an existing timeline is the caller's intent);
    /// otherwise a fresh object id equal to the new version id is assigned.
    pub fn add(&self, document: Document<A::Payload>) -> MasterResult<Document<A::Payload>> {
        let carried = match &document.unique_id {
            Some(id) => {
                self.check_scheme(id)?;
                Some(id.object_id)
            }
            None => None,
        };
        self.with_retries("add", || {
            let now = self.clock.now();
            let mut doc = document.clone();
            doc.version_from = Some(now);
            doc.version_to = None;
            doc.correction_from = Some(now);
            doc.correction_to = None;
            self.in_transaction(|txn| self.insert_document(txn, doc, carried))
        })
    }

    /// Stores a new version of an existing document.
    ///
    /// The input must name the latest version and correction; the prior
    /// version's interval is closed at the captured `now` and the new row
    /// starts there.
    pub fn update(&self, document: Document<A::Payload>) -> MasterResult<Document<A::Payload>> {
        let unique_id = self.identity_of(&document, "update")?;
        self.with_retries("update", || {
            let now = self.clock.now();
            let stored = self.stored_row(&unique_id)?;
            if !stored.is_version_open() {
                return Err(MasterError::validation(format!(
                    "{unique_id} is not the latest version"
                )));
            }
            if !stored.is_correction_open() {
                return Err(MasterError::validation(format!(
                    "{unique_id} is not the latest correction"
                )));
            }
            let mut doc = document.clone();
            doc.unique_id = None;
            doc.version_from = Some(now);
            doc.version_to = None;
            doc.correction_from = Some(now);
            doc.correction_to = None;
            self.in_transaction(|txn| {
                txn.close_version(unique_id.version_id, now)?;
                self.insert_document(txn, doc, Some(stored.object_id))
            })
        })
    }

    /// Stores a correction of a document version.
    ///
    /// The input must name the latest correction of its version. The new row
    /// copies the version interval unchanged; only the correction axis moves.
    pub fn correct(&self, document: Document<A::Payload>) -> MasterResult<Document<A::Payload>> {
        let unique_id = self.identity_of(&document, "correct")?;
        self.with_retries("correct", || {
            let now = self.clock.now();
            let stored = self.stored_row(&unique_id)?;
            if !stored.is_correction_open() {
                return Err(MasterError::validation(format!(
                    "{unique_id} is not the latest correction"
                )));
            }
            let mut doc = document.clone();
            doc.unique_id = None;
            doc.version_from = Some(stored.ver_from);
            doc.version_to = open_to_none(stored.ver_to);
            doc.correction_from = Some(now);
            doc.correction_to = None;
            self.in_transaction(|txn| {
                txn.close_correction(unique_id.version_id, now)?;
                self.insert_document(txn, doc, Some(stored.object_id))
            })
        })
    }

    /// Terminates an object's timeline at `now`.
    ///
    /// Closes the version interval of the currently visible row; nothing is
    /// deleted and the full history remains queryable. Returns the
    /// terminated document.
    pub fn remove(&self, object_id: ObjectId) -> MasterResult<Document<A::Payload>> {
        self.with_retries("remove", || {
            let now = self.clock.now();
            let stored = self
                .store
                .get_by_oid_instants(object_id, now, now)?
                .ok_or_else(|| {
                    MasterError::not_found(format!("no current document of {object_id}"))
                })?;
            self.in_transaction(|txn| Ok(txn.close_version(stored.version_id, now)?))?;
            let mut doc = DocumentExtractor::new(&self.adapter, &self.scheme).extract(&stored)?;
            doc.version_to = Some(now);
            Ok(doc)
        })
    }

    /// Replaces one stored version with a batch of replacement documents.
    ///
    /// The stored row's correction interval is closed; the replacements are
    /// confined to its version window, chained and inserted. An empty batch
    /// removes the version: the hole is closed by extending the previous
    /// version over the vacated window, when one exists.
    pub fn replace_version(
        &self,
        unique_id: &UniqueId,
        replacements: Vec<Document<A::Payload>>,
    ) -> MasterResult<Vec<UniqueId>> {
        self.check_scheme(unique_id)?;
        check_unique_versions_from(&replacements)?;
        self.with_retries("replace_version", || {
            let now = self.clock.now();
            let stored = self.stored_row(unique_id)?;
            if !stored.is_correction_open() {
                return Err(MasterError::validation(format!(
                    "{unique_id} is not the latest correction"
                )));
            }
            check_within_window(&replacements, stored.ver_from, stored.ver_to, false)?;
            let adjusted =
                adjust_version_instants(replacements.clone(), now, stored.ver_from, stored.ver_to);
            self.in_transaction(|txn| {
                txn.close_correction(stored.version_id, now)?;
                if adjusted.is_empty() {
                    self.fill_removed_version(txn, &stored, now)?;
                    return Ok(Vec::new());
                }
                let mut ids = Vec::with_capacity(adjusted.len());
                for doc in adjusted.clone() {
                    let inserted = self.insert_document(txn, doc, Some(stored.object_id))?;
                    ids.extend(inserted.unique_id);
                }
                Ok(ids)
            })
        })
    }

    /// Replaces the stored versions overlapping a replacement window.
    ///
    /// The window is spanned by the batch itself: from its earliest
    /// version-from to its latest version-to. Stored current rows overlapping
    /// the window are superseded on the correction axis; the parts of the
    /// earliest and latest stored versions sticking out of the window are
    /// preserved by boundary copies.
    pub fn replace_versions(
        &self,
        object_id: ObjectId,
        replacements: Vec<Document<A::Payload>>,
    ) -> MasterResult<Vec<UniqueId>> {
        if replacements.is_empty() {
            return Err(MasterError::validation(
                "replace_versions requires at least one replacement document",
            ));
        }
        if replacements.iter().any(|d| d.version_from.is_none()) {
            return Err(MasterError::validation(
                "every replacement document must set its version-from instant",
            ));
        }
        check_unique_versions_from(&replacements)?;
        self.with_retries("replace_versions", || {
            let now = self.clock.now();
            let mut batch = replacements.clone();
            batch.sort_by_key(|d| d.version_from);
            // Window spanned by the batch; the interval checks above
            // guarantee version_from is present.
            let window_from = batch
                .first()
                .and_then(|d| d.version_from)
                .ok_or_else(|| MasterError::validation("empty replacement batch"))?;
            let window_to = batch
                .last()
                .and_then(|d| d.version_to)
                .unwrap_or(Timestamp::MAX_INSTANT);
            let stored =
                self.current_rows(object_id, Some(window_from), open_to_none(window_to), now)?;
            if stored.is_empty() {
                return Err(MasterError::not_found(format!(
                    "no current versions of {object_id} overlap [{window_from}, {window_to})"
                )));
            }
            let adjusted = adjust_version_instants(batch.clone(), now, window_from, window_to);
            self.in_transaction(|txn| {
                for row in &stored {
                    txn.close_correction(row.version_id, now)?;
                }
                // Rows come newest first: the last overlaps the window start,
                // the first its end.
                let earliest = &stored[stored.len() - 1];
                let latest = &stored[0];
                if earliest.ver_from < window_from {
                    self.reinsert(txn, earliest, earliest.ver_from, window_from, now)?;
                }
                if latest.ver_to > window_to {
                    self.reinsert(txn, latest, window_to, latest.ver_to, now)?;
                }
                let mut ids = Vec::with_capacity(adjusted.len());
                for doc in adjusted.clone() {
                    let inserted = self.insert_document(txn, doc, Some(object_id))?;
                    ids.extend(inserted.unique_id);
                }
                Ok(ids)
            })
        })
    }

    /// Replaces every current version of an object with the batch.
    ///
    /// An empty batch supersedes the whole current timeline, leaving only
    /// history; otherwise the batch becomes the complete new timeline.
    pub fn replace_all_versions(
        &self,
        object_id: ObjectId,
        replacements: Vec<Document<A::Payload>>,
    ) -> MasterResult<Vec<UniqueId>> {
        check_unique_versions_from(&replacements)?;
        self.with_retries("replace_all_versions", || {
            let now = self.clock.now();
            let stored = self.current_rows(object_id, None, None, now)?;
            if stored.is_empty() {
                return Err(MasterError::not_found(format!(
                    "no current versions of {object_id}"
                )));
            }
            let mut batch = replacements.clone();
            batch.sort_by_key(|d| d.version_from);
            // A batch whose first document leaves version-from unset starts
            // where the stored timeline started.
            let window_from = batch
                .first()
                .and_then(|d| d.version_from)
                .unwrap_or(stored[stored.len() - 1].ver_from);
            let window_to = batch
                .last()
                .and_then(|d| d.version_to)
                .unwrap_or(Timestamp::MAX_INSTANT);
            let adjusted = adjust_version_instants(batch.clone(), now, window_from, window_to);
            self.in_transaction(|txn| {
                for row in &stored {
                    txn.close_correction(row.version_id, now)?;
                }
                let mut ids = Vec::with_capacity(adjusted.len());
                for doc in adjusted.clone() {
                    let inserted = self.insert_document(txn, doc, Some(object_id))?;
                    ids.extend(inserted.unique_id);
                }
                Ok(ids)
            })
        })
    }

    /// Appends a version to an existing object's timeline.
    ///
    /// A document without a version-from starts at `now`. Equivalent to a
    /// window replacement from that instant onward.
    pub fn add_version(
        &self,
        object_id: ObjectId,
        mut document: Document<A::Payload>,
    ) -> MasterResult<Vec<UniqueId>> {
        if document.version_from.is_none() {
            document.version_from = Some(self.clock.now());
        }
        self.replace_versions(object_id, vec![document])
    }

    /// Removes one stored version from the timeline.
    ///
    /// Equivalent to replacing it with an empty batch: the previous version,
    /// when one exists, is extended over the vacated window.
    pub fn remove_version(&self, unique_id: &UniqueId) -> MasterResult<()> {
        self.replace_version(unique_id, Vec::new()).map(|_| ())
    }

    /// Executes a point-in-time search.
    pub fn search(&self, request: &SearchRequest) -> MasterResult<SearchResult<A::Payload>> {
        let now = self.clock.now();
        let (version_as_of, corrected_to) = request.version_correction.with_latest_fixed(now);
        if let Some(ids) = &request.object_ids {
            if ids.is_empty() {
                debug!("search with empty object-id filter, short-circuiting");
                return Ok(SearchResult::empty());
            }
        }
        let query = request.compile(version_as_of, corrected_to, self.adapter.main_type())?;
        let result = self.store.search(&query)?;
        debug!(total = result.total, fetched = result.rows.len(), "search");
        let documents =
            DocumentExtractor::new(&self.adapter, &self.scheme).extract_all(&result.rows)?;
        Ok(SearchResult {
            total: result.total,
            documents,
        })
    }

    /// Executes a bitemporal history query, newest version first.
    pub fn history(&self, request: &HistoryRequest) -> MasterResult<SearchResult<A::Payload>> {
        let result = self.store.history(&request.compile())?;
        let documents =
            DocumentExtractor::new(&self.adapter, &self.scheme).extract_all(&result.rows)?;
        Ok(SearchResult {
            total: result.total,
            documents,
        })
    }

    /// Lists the distinct sub-types stored for this adapter's main type.
    pub fn sub_types(&self) -> MasterResult<Vec<String>> {
        Ok(self.store.sub_types(self.adapter.main_type())?)
    }

    /// Lists the distinct concrete types stored for this adapter's main type.
    pub fn actual_types(&self) -> MasterResult<Vec<String>> {
        Ok(self.store.actual_types(self.adapter.main_type())?)
    }

    /// Returns the store schema version.
    pub fn schema_version(&self) -> MasterResult<(u16, u16)> {
        Ok(self.store.schema_version()?)
    }

    fn check_scheme(&self, unique_id: &UniqueId) -> MasterResult<()> {
        if unique_id.scheme != self.scheme {
            return Err(MasterError::validation(format!(
                "identifier scheme {} does not belong to this master ({})",
                unique_id.scheme, self.scheme
            )));
        }
        Ok(())
    }

    fn identity_of(
        &self,
        document: &Document<A::Payload>,
        op: &str,
    ) -> MasterResult<UniqueId> {
        let unique_id = document
            .unique_id
            .clone()
            .ok_or_else(|| MasterError::validation(format!("{op} requires a document identity")))?;
        self.check_scheme(&unique_id)?;
        Ok(unique_id)
    }

    fn stored_row(&self, unique_id: &UniqueId) -> MasterResult<DocumentRow> {
        self.store
            .get_by_id(unique_id.version_id)?
            .filter(|row| {
                row.object_id == unique_id.object_id && row.main_type == self.adapter.main_type()
            })
            .ok_or_else(|| MasterError::not_found(format!("no document {unique_id}")))
    }

    /// Current (correction-open at `now`) rows of an object, optionally
    /// restricted on the version axis. Newest version first.
    fn current_rows(
        &self,
        object_id: ObjectId,
        versions_from: Option<Timestamp>,
        versions_to: Option<Timestamp>,
        now: Timestamp,
    ) -> MasterResult<Vec<DocumentRow>> {
        let mut query = HistoryQuery::all_of(object_id);
        query.versions_from = versions_from;
        query.versions_to = versions_to;
        query.corrections_from = Some(now);
        query.corrections_to = Some(now);
        Ok(self.store.history(&query)?.rows)
    }

    /// Extends the version before a removed one over the vacated window.
    fn fill_removed_version(
        &self,
        txn: &mut dyn StoreTxn,
        removed: &DocumentRow,
        now: Timestamp,
    ) -> MasterResult<()> {
        let previous = self
            .current_rows(removed.object_id, None, None, now)?
            .into_iter()
            .find(|row| row.ver_to == removed.ver_from && row.version_id != removed.version_id);
        if let Some(previous) = previous {
            txn.close_correction(previous.version_id, now)?;
            self.reinsert(txn, &previous, previous.ver_from, removed.ver_to, now)?;
        }
        Ok(())
    }

    /// Reinserts a stored row's payload under a new version interval.
    fn reinsert(
        &self,
        txn: &mut dyn StoreTxn,
        row: &DocumentRow,
        ver_from: Timestamp,
        ver_to: Timestamp,
        now: Timestamp,
    ) -> MasterResult<Document<A::Payload>> {
        let mut doc = Document::new(self.adapter.deserialize(&row.payload)?);
        doc.version_from = Some(ver_from);
        doc.version_to = open_to_none(ver_to);
        doc.correction_from = Some(now);
        doc.correction_to = None;
        self.insert_document(txn, doc, Some(row.object_id))
    }

    /// Writes one document row plus its three side-table link sets.
    ///
    /// Allocates the version id, derives the object id (carried or fresh),
    /// stamps the identity onto payload and wrapper, then stages the primary
    /// row and the dedup-then-link batches on the transaction.
    fn insert_document(
        &self,
        txn: &mut dyn StoreTxn,
        mut document: Document<A::Payload>,
        object_id: Option<ObjectId>,
    ) -> MasterResult<Document<A::Payload>> {
        let version_id = self.store.next_version_id();
        let object_id = object_id.unwrap_or(ObjectId::new(version_id.as_u64()));
        let unique_id = UniqueId::new(&self.scheme, object_id, version_id);
        self.adapter
            .attach_identity(&mut document.payload, &unique_id);
        document.unique_id = Some(unique_id);

        let attributes = self.adapter.attributes(&document.payload);
        let properties = self.adapter.indexed_properties(&document.payload);
        validate_pairs("attribute", &attributes)?;
        validate_pairs("indexed property", &properties)?;

        let ver_from = document
            .version_from
            .ok_or_else(|| MasterError::validation("document has no version-from instant"))?;
        let corr_from = document
            .correction_from
            .ok_or_else(|| MasterError::validation("document has no correction-from instant"))?;
        let row = DocumentRow {
            version_id,
            object_id,
            ver_from,
            ver_to: document.version_to.unwrap_or(Timestamp::MAX_INSTANT),
            corr_from,
            corr_to: document.correction_to.unwrap_or(Timestamp::MAX_INSTANT),
            name: self.adapter.name(&document.payload),
            main_type: self.adapter.main_type(),
            sub_type: self.adapter.sub_type(&document.payload),
            actual_type: self.adapter.actual_type(&document.payload),
            payload: self.adapter.serialize(&document.payload)?,
        };

        let bundle = self.adapter.external_ids(&document.payload);
        let id_keys: Vec<KeyId> = bundle
            .ids()
            .iter()
            .map(|id| txn.ensure_id_key(id))
            .collect::<Result<_, _>>()?;
        let attr_keys: Vec<KeyId> = attributes
            .iter()
            .map(|(k, v)| txn.ensure_attribute(k, v))
            .collect::<Result<_, _>>()?;
        let prop_keys: Vec<KeyId> = properties
            .iter()
            .map(|(k, v)| txn.ensure_property(k, v))
            .collect::<Result<_, _>>()?;

        txn.insert_document(row)?;
        txn.link_id_keys(version_id, &id_keys)?;
        txn.link_attributes(version_id, &attr_keys)?;
        txn.link_properties(version_id, &prop_keys)?;
        debug!(%version_id, %object_id, "inserted document row");
        Ok(document)
    }

    /// Runs one closure inside a store transaction, committing on success.
    fn in_transaction<T>(
        &self,
        f: impl FnOnce(&mut dyn StoreTxn) -> MasterResult<T>,
    ) -> MasterResult<T> {
        let mut txn = self.store.begin_write()?;
        let out = f(txn.as_mut())?;
        txn.commit()?;
        Ok(out)
    }

    /// Retries a mutation on retryable storage conflicts, up to the bound.
    ///
    /// Exhaustion surfaces as [`MasterError::StorageConflict`], never as
    /// not-found. Every other error passes straight through.
    fn with_retries<T>(
        &self,
        op: &str,
        mut attempt: impl FnMut() -> MasterResult<T>,
    ) -> MasterResult<T> {
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            match attempt() {
                Err(MasterError::Storage(err)) if err.is_retryable() => {
                    if attempts >= self.max_retries {
                        return Err(MasterError::StorageConflict {
                            attempts,
                            message: err.to_string(),
                        });
                    }
                    warn!(op, attempts, error = %err, "write conflict, retrying");
                }
                other => return other,
            }
        }
    }
}

fn open_to_none(to: Timestamp) -> Option<Timestamp> {
    if to.is_max() {
        None
    } else {
        Some(to)
    }
}

fn validate_pairs(kind: &str, pairs: &[(String, String)]) -> MasterResult<()> {
    for (key, value) in pairs {
        if key.is_empty() || value.is_empty() {
            return Err(MasterError::validation(format!(
                "{kind} entries must not have empty keys or values"
            )));
        }
    }
    Ok(())
}
