//! In-memory store implementation.

use crate::error::{StoreError, StoreResult};
use crate::query::{DocQuery, HistoryQuery, QueryResult, SortOrder};
use crate::row::{DocumentRow, ExternalId, KeyId, ObjectId, Timestamp, VersionId};
use crate::store::{DocStore, StoreTxn};
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use tracing::debug;

/// Schema version reported by this store.
const SCHEMA_VERSION: (u16, u16) = (1, 0);

/// A shared pair table with its uniqueness index.
#[derive(Debug, Default)]
struct PairTable {
    rows: BTreeMap<KeyId, (String, String)>,
    index: HashMap<(String, String), KeyId>,
}

impl PairTable {
    fn lookup(&self, key: &str, value: &str) -> Option<KeyId> {
        self.index
            .get(&(key.to_string(), value.to_string()))
            .copied()
    }

    fn insert(&mut self, id: KeyId, key: String, value: String) -> StoreResult<()> {
        if self.index.contains_key(&(key.clone(), value.clone())) {
            return Err(StoreError::conflict(format!(
                "duplicate shared pair {key}={value}"
            )));
        }
        self.index.insert((key.clone(), value.clone()), id);
        self.rows.insert(id, (key, value));
        Ok(())
    }
}

/// Committed table state.
#[derive(Debug, Default)]
struct Tables {
    documents: BTreeMap<VersionId, DocumentRow>,
    id_keys: PairTable,
    attr_keys: PairTable,
    prop_keys: PairTable,
    doc2idkey: BTreeMap<VersionId, Vec<KeyId>>,
    doc2attr: BTreeMap<VersionId, Vec<KeyId>>,
    doc2prop: BTreeMap<VersionId, Vec<KeyId>>,
}

impl Tables {
    fn external_ids_of(&self, version_id: VersionId) -> Vec<ExternalId> {
        self.doc2idkey
            .get(&version_id)
            .into_iter()
            .flatten()
            .filter_map(|key_id| self.id_keys.rows.get(key_id))
            .map(|(scheme, value)| ExternalId::new(scheme.clone(), value.clone()))
            .collect()
    }

    fn pairs_of<'a>(
        &'a self,
        joins: &'a BTreeMap<VersionId, Vec<KeyId>>,
        table: &'a PairTable,
        version_id: VersionId,
    ) -> impl Iterator<Item = &'a (String, String)> + 'a {
        joins
            .get(&version_id)
            .into_iter()
            .flatten()
            .filter_map(move |key_id| table.rows.get(key_id))
    }

    fn matches(&self, query: &DocQuery, row: &DocumentRow) -> bool {
        if !row.visible_at(query.version_as_of, query.corrected_to) {
            return false;
        }
        if let Some(ids) = &query.object_ids {
            if !ids.contains(&row.object_id) {
                return false;
            }
        }
        if let Some(main_type) = query.main_type {
            if row.main_type != main_type {
                return false;
            }
        }
        if let Some(sub_type) = &query.sub_type {
            if &row.sub_type != sub_type {
                return false;
            }
        }
        if let Some(actual_type) = &query.actual_type {
            if &row.actual_type != actual_type {
                return false;
            }
        }
        if let Some(name) = &query.name {
            if !name.matches(&row.name) {
                return false;
            }
        }
        if query.identifier_search.is_some()
            || query.identifier_value.is_some()
            || query.identifier_scheme.is_some()
        {
            let doc_ids = self.external_ids_of(row.version_id);
            if let Some(search) = &query.identifier_search {
                if !search.matches(&doc_ids) {
                    return false;
                }
            }
            if let Some(value) = &query.identifier_value {
                if !doc_ids.iter().any(|id| value.matches(&id.value)) {
                    return false;
                }
            }
            if let Some(scheme) = &query.identifier_scheme {
                if !doc_ids.iter().any(|id| scheme.matches(&id.scheme)) {
                    return false;
                }
            }
        }
        for (key, value) in &query.attributes {
            let mut found = false;
            for (k, v) in self.pairs_of(&self.doc2attr, &self.attr_keys, row.version_id) {
                if k == key && value.matches(v) {
                    found = true;
                    break;
                }
            }
            if !found {
                return false;
            }
        }
        for (key, value) in &query.properties {
            let mut found = false;
            for (k, v) in self.pairs_of(&self.doc2prop, &self.prop_keys, row.version_id) {
                if k == key && value.matches(v) {
                    found = true;
                    break;
                }
            }
            if !found {
                return false;
            }
        }
        true
    }
}

/// A thread-safe in-memory table family.
///
/// This is the reference `DocStore`: document rows in a b-tree keyed by
/// version id, shared pair tables with uniqueness indexes, join tables, and
/// atomic id sequences. Writers are serialized by a write gate held for the
/// transaction's lifetime; staged writes become visible only at commit.
///
/// # Example
///
/// ```rust
/// use bitempo_storage::{DocStore, InMemoryStore};
///
/// let store = InMemoryStore::new();
/// let first = store.next_version_id();
/// let second = store.next_version_id();
/// assert!(first < second);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
    write_gate: Mutex<()>,
    doc_seq: AtomicU64,
    key_seq: AtomicU64,
}

impl InMemoryStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of document rows, all versions and corrections
    /// included.
    pub fn row_count(&self) -> usize {
        self.tables.read().documents.len()
    }

    /// Returns the number of rows in the shared external-id table.
    ///
    /// Useful for asserting dedup behaviour in tests.
    pub fn shared_id_key_count(&self) -> usize {
        self.tables.read().id_keys.rows.len()
    }

    /// Returns the number of rows in the shared attribute table.
    pub fn shared_attribute_count(&self) -> usize {
        self.tables.read().attr_keys.rows.len()
    }

    fn sort_rows(rows: &mut [DocumentRow], sort: SortOrder) {
        rows.sort_by(|a, b| {
            let primary = match sort {
                SortOrder::ObjectIdAsc => a.object_id.cmp(&b.object_id),
                SortOrder::ObjectIdDesc => b.object_id.cmp(&a.object_id),
                SortOrder::NameAsc => a.name.cmp(&b.name),
                SortOrder::NameDesc => b.name.cmp(&a.name),
                SortOrder::VersionFromAsc => a.ver_from.cmp(&b.ver_from),
                SortOrder::VersionFromDesc => b.ver_from.cmp(&a.ver_from),
            };
            primary
                .then_with(|| a.object_id.cmp(&b.object_id))
                .then_with(|| a.version_id.cmp(&b.version_id))
        });
    }

    fn paged(mut rows: Vec<DocumentRow>, offset: usize, size: usize) -> QueryResult {
        let total = rows.len();
        let rows = if size == 0 {
            Vec::new()
        } else {
            let end = offset.saturating_add(size).min(rows.len());
            let start = offset.min(rows.len());
            rows.drain(..start);
            rows.truncate(end - start);
            rows
        };
        QueryResult { total, rows }
    }
}

impl DocStore for InMemoryStore {
    fn schema_version(&self) -> StoreResult<(u16, u16)> {
        Ok(SCHEMA_VERSION)
    }

    fn next_version_id(&self) -> VersionId {
        VersionId::new(self.doc_seq.fetch_add(1, AtomicOrdering::SeqCst) + 1)
    }

    fn get_by_id(&self, version_id: VersionId) -> StoreResult<Option<DocumentRow>> {
        Ok(self.tables.read().documents.get(&version_id).cloned())
    }

    fn get_by_oid_instants(
        &self,
        object_id: ObjectId,
        version_as_of: Timestamp,
        corrected_to: Timestamp,
    ) -> StoreResult<Option<DocumentRow>> {
        let tables = self.tables.read();
        let mut visible = tables
            .documents
            .values()
            .filter(|row| row.object_id == object_id)
            .filter(|row| row.visible_at(version_as_of, corrected_to));
        let first = visible.next().cloned();
        if visible.next().is_some() {
            return Err(StoreError::invariant(format!(
                "multiple rows of {object_id} visible at ({version_as_of}, {corrected_to})"
            )));
        }
        Ok(first)
    }

    fn search(&self, query: &DocQuery) -> StoreResult<QueryResult> {
        let tables = self.tables.read();
        let mut rows: Vec<DocumentRow> = tables
            .documents
            .values()
            .filter(|row| tables.matches(query, row))
            .cloned()
            .collect();
        Self::sort_rows(&mut rows, query.sort);
        Ok(Self::paged(rows, query.page.offset, query.page.size))
    }

    fn history(&self, query: &HistoryQuery) -> StoreResult<QueryResult> {
        let tables = self.tables.read();
        let mut rows: Vec<DocumentRow> = tables
            .documents
            .values()
            .filter(|row| row.object_id == query.object_id)
            .filter(|row| query.covers(row))
            .cloned()
            .collect();
        // Audit order: newest version first, newest correction first.
        rows.sort_by(|a, b| match b.ver_from.cmp(&a.ver_from) {
            Ordering::Equal => b
                .corr_from
                .cmp(&a.corr_from)
                .then_with(|| b.version_id.cmp(&a.version_id)),
            other => other,
        });
        Ok(Self::paged(rows, query.page.offset, query.page.size))
    }

    fn sub_types(&self, main_type: char) -> StoreResult<Vec<String>> {
        let tables = self.tables.read();
        let mut types: Vec<String> = tables
            .documents
            .values()
            .filter(|row| row.main_type == main_type)
            .map(|row| row.sub_type.clone())
            .collect();
        types.sort();
        types.dedup();
        Ok(types)
    }

    fn actual_types(&self, main_type: char) -> StoreResult<Vec<String>> {
        let tables = self.tables.read();
        let mut types: Vec<String> = tables
            .documents
            .values()
            .filter(|row| row.main_type == main_type)
            .map(|row| row.actual_type.clone())
            .collect();
        types.sort();
        types.dedup();
        Ok(types)
    }

    fn begin_write(&self) -> StoreResult<Box<dyn StoreTxn + '_>> {
        let gate = self.write_gate.lock();
        Ok(Box::new(MemoryTxn {
            store: self,
            _gate: gate,
            inserts: Vec::new(),
            version_closes: Vec::new(),
            correction_closes: Vec::new(),
            staged_pairs: StagedPairs::default(),
            id_links: Vec::new(),
            attr_links: Vec::new(),
            prop_links: Vec::new(),
        }))
    }
}

/// Pair rows staged by one transaction, per shared table.
#[derive(Debug, Default)]
struct StagedPairs {
    id_keys: Vec<(KeyId, String, String)>,
    attr_keys: Vec<(KeyId, String, String)>,
    prop_keys: Vec<(KeyId, String, String)>,
}

impl StagedPairs {
    fn find(staged: &[(KeyId, String, String)], key: &str, value: &str) -> Option<KeyId> {
        staged
            .iter()
            .find(|(_, k, v)| k == key && v == value)
            .map(|(id, _, _)| *id)
    }
}

/// A staged write transaction over an [`InMemoryStore`].
///
/// The write gate is held until the transaction commits or is dropped, so
/// at most one writer is active at a time. All staged writes are validated
/// and applied under the table lock in `commit`; dropping the transaction
/// discards them.
struct MemoryTxn<'a> {
    store: &'a InMemoryStore,
    _gate: MutexGuard<'a, ()>,
    inserts: Vec<DocumentRow>,
    version_closes: Vec<(VersionId, Timestamp)>,
    correction_closes: Vec<(VersionId, Timestamp)>,
    staged_pairs: StagedPairs,
    id_links: Vec<(VersionId, Vec<KeyId>)>,
    attr_links: Vec<(VersionId, Vec<KeyId>)>,
    prop_links: Vec<(VersionId, Vec<KeyId>)>,
}

impl MemoryTxn<'_> {
    fn next_key_id(&self) -> KeyId {
        KeyId::new(self.store.key_seq.fetch_add(1, AtomicOrdering::SeqCst) + 1)
    }

    fn ensure_pair(
        &mut self,
        table: PairKind,
        key: &str,
        value: &str,
    ) -> StoreResult<KeyId> {
        let staged = match table {
            PairKind::IdKey => &self.staged_pairs.id_keys,
            PairKind::Attribute => &self.staged_pairs.attr_keys,
            PairKind::Property => &self.staged_pairs.prop_keys,
        };
        if let Some(id) = StagedPairs::find(staged, key, value) {
            return Ok(id);
        }
        let committed = {
            let tables = self.store.tables.read();
            let pair_table = match table {
                PairKind::IdKey => &tables.id_keys,
                PairKind::Attribute => &tables.attr_keys,
                PairKind::Property => &tables.prop_keys,
            };
            pair_table.lookup(key, value)
        };
        if let Some(id) = committed {
            return Ok(id);
        }
        let id = self.next_key_id();
        let staged = match table {
            PairKind::IdKey => &mut self.staged_pairs.id_keys,
            PairKind::Attribute => &mut self.staged_pairs.attr_keys,
            PairKind::Property => &mut self.staged_pairs.prop_keys,
        };
        staged.push((id, key.to_string(), value.to_string()));
        Ok(id)
    }
}

#[derive(Debug, Clone, Copy)]
enum PairKind {
    IdKey,
    Attribute,
    Property,
}

impl StoreTxn for MemoryTxn<'_> {
    fn insert_document(&mut self, row: DocumentRow) -> StoreResult<()> {
        if !row.intervals_valid() {
            return Err(StoreError::invariant(format!(
                "document row {} has an empty or inverted interval",
                row.version_id
            )));
        }
        self.inserts.push(row);
        Ok(())
    }

    fn close_version(&mut self, version_id: VersionId, ver_to: Timestamp) -> StoreResult<()> {
        let tables = self.store.tables.read();
        let row = tables
            .documents
            .get(&version_id)
            .ok_or_else(|| StoreError::missing_row(format!("no document row {version_id}")))?;
        if !row.is_version_open() {
            return Err(StoreError::conflict(format!(
                "version interval of {version_id} already closed"
            )));
        }
        drop(tables);
        self.version_closes.push((version_id, ver_to));
        Ok(())
    }

    fn close_correction(&mut self, version_id: VersionId, corr_to: Timestamp) -> StoreResult<()> {
        let tables = self.store.tables.read();
        let row = tables
            .documents
            .get(&version_id)
            .ok_or_else(|| StoreError::missing_row(format!("no document row {version_id}")))?;
        if !row.is_correction_open() {
            return Err(StoreError::conflict(format!(
                "correction interval of {version_id} already closed"
            )));
        }
        drop(tables);
        self.correction_closes.push((version_id, corr_to));
        Ok(())
    }

    fn ensure_id_key(&mut self, id: &ExternalId) -> StoreResult<KeyId> {
        self.ensure_pair(PairKind::IdKey, &id.scheme, &id.value)
    }

    fn ensure_attribute(&mut self, key: &str, value: &str) -> StoreResult<KeyId> {
        self.ensure_pair(PairKind::Attribute, key, value)
    }

    fn ensure_property(&mut self, key: &str, value: &str) -> StoreResult<KeyId> {
        self.ensure_pair(PairKind::Property, key, value)
    }

    fn link_id_keys(&mut self, version_id: VersionId, keys: &[KeyId]) -> StoreResult<()> {
        self.id_links.push((version_id, keys.to_vec()));
        Ok(())
    }

    fn link_attributes(&mut self, version_id: VersionId, keys: &[KeyId]) -> StoreResult<()> {
        self.attr_links.push((version_id, keys.to_vec()));
        Ok(())
    }

    fn link_properties(&mut self, version_id: VersionId, keys: &[KeyId]) -> StoreResult<()> {
        self.prop_links.push((version_id, keys.to_vec()));
        Ok(())
    }

    fn commit(self: Box<Self>) -> StoreResult<()> {
        let mut tables = self.store.tables.write();

        // Validate everything before mutating anything; the error path must
        // leave committed state untouched.
        for row in &self.inserts {
            if tables.documents.contains_key(&row.version_id) {
                return Err(StoreError::conflict(format!(
                    "document row {} already exists",
                    row.version_id
                )));
            }
        }
        for (version_id, _) in &self.version_closes {
            let row = tables.documents.get(version_id).ok_or_else(|| {
                StoreError::missing_row(format!("no document row {version_id}"))
            })?;
            if !row.is_version_open() {
                return Err(StoreError::conflict(format!(
                    "version interval of {version_id} already closed"
                )));
            }
        }
        for (version_id, _) in &self.correction_closes {
            let row = tables.documents.get(version_id).ok_or_else(|| {
                StoreError::missing_row(format!("no document row {version_id}"))
            })?;
            if !row.is_correction_open() {
                return Err(StoreError::conflict(format!(
                    "correction interval of {version_id} already closed"
                )));
            }
        }
        // Uniqueness backstop; a concurrent writer cannot interleave while
        // the gate is held, but the constraint stays enforced.
        let staged_per_table = [
            (&self.staged_pairs.id_keys, &tables.id_keys),
            (&self.staged_pairs.attr_keys, &tables.attr_keys),
            (&self.staged_pairs.prop_keys, &tables.prop_keys),
        ];
        for (staged, table) in staged_per_table {
            for (_, key, value) in staged {
                if table.lookup(key, value).is_some() {
                    return Err(StoreError::conflict(format!(
                        "duplicate shared pair {key}={value}"
                    )));
                }
            }
        }

        let inserted = self.inserts.len();
        let versions_closed = self.version_closes.len();
        let corrections_closed = self.correction_closes.len();

        for (id, key, value) in self.staged_pairs.id_keys {
            tables.id_keys.insert(id, key, value)?;
        }
        for (id, key, value) in self.staged_pairs.attr_keys {
            tables.attr_keys.insert(id, key, value)?;
        }
        for (id, key, value) in self.staged_pairs.prop_keys {
            tables.prop_keys.insert(id, key, value)?;
        }
        for row in self.inserts {
            tables.documents.insert(row.version_id, row);
        }
        for (version_id, ver_to) in self.version_closes {
            if let Some(row) = tables.documents.get_mut(&version_id) {
                row.ver_to = ver_to;
            }
        }
        for (version_id, corr_to) in self.correction_closes {
            if let Some(row) = tables.documents.get_mut(&version_id) {
                row.corr_to = corr_to;
            }
        }
        for (version_id, keys) in self.id_links {
            tables.doc2idkey.entry(version_id).or_default().extend(keys);
        }
        for (version_id, keys) in self.attr_links {
            tables.doc2attr.entry(version_id).or_default().extend(keys);
        }
        for (version_id, keys) in self.prop_links {
            tables.doc2prop.entry(version_id).or_default().extend(keys);
        }
        debug!(inserted, versions_closed, corrections_closed, "transaction committed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{Page, ValueMatch};

    fn row(version_id: u64, object_id: u64, ver_from: i64) -> DocumentRow {
        DocumentRow {
            version_id: VersionId::new(version_id),
            object_id: ObjectId::new(object_id),
            ver_from: Timestamp::from_millis(ver_from),
            ver_to: Timestamp::MAX_INSTANT,
            corr_from: Timestamp::from_millis(ver_from),
            corr_to: Timestamp::MAX_INSTANT,
            name: format!("doc-{object_id}"),
            main_type: 'D',
            sub_type: "plain".to_string(),
            actual_type: "PlainDoc".to_string(),
            payload: vec![version_id as u8],
        }
    }

    fn insert(store: &InMemoryStore, r: DocumentRow) {
        let mut txn = store.begin_write().unwrap();
        txn.insert_document(r).unwrap();
        txn.commit().unwrap();
    }

    #[test]
    fn insert_and_get() {
        let store = InMemoryStore::new();
        insert(&store, row(1, 1, 100));

        let found = store.get_by_id(VersionId::new(1)).unwrap().unwrap();
        assert_eq!(found.object_id, ObjectId::new(1));
        assert!(store.get_by_id(VersionId::new(2)).unwrap().is_none());
    }

    #[test]
    fn sequence_is_monotonic() {
        let store = InMemoryStore::new();
        let a = store.next_version_id();
        let b = store.next_version_id();
        assert!(a < b);
    }

    #[test]
    fn visibility_by_instants() {
        let store = InMemoryStore::new();
        let mut old = row(1, 1, 100);
        old.ver_to = Timestamp::from_millis(200);
        insert(&store, old);
        insert(&store, row(2, 1, 200));

        let t = Timestamp::from_millis;
        let early = store
            .get_by_oid_instants(ObjectId::new(1), t(150), t(500))
            .unwrap()
            .unwrap();
        assert_eq!(early.version_id, VersionId::new(1));

        let late = store
            .get_by_oid_instants(ObjectId::new(1), t(250), t(500))
            .unwrap()
            .unwrap();
        assert_eq!(late.version_id, VersionId::new(2));

        assert!(store
            .get_by_oid_instants(ObjectId::new(1), t(50), t(500))
            .unwrap()
            .is_none());
    }

    #[test]
    fn overlapping_rows_are_an_invariant_breach() {
        let store = InMemoryStore::new();
        insert(&store, row(1, 1, 100));
        insert(&store, row(2, 1, 100));

        let t = Timestamp::from_millis;
        let err = store
            .get_by_oid_instants(ObjectId::new(1), t(150), t(150))
            .unwrap_err();
        assert!(matches!(err, StoreError::Invariant { .. }));
    }

    #[test]
    fn dedup_returns_same_key_id() {
        let store = InMemoryStore::new();

        let first = {
            let mut txn = store.begin_write().unwrap();
            let id = txn
                .ensure_id_key(&ExternalId::new("TICKER", "AAPL"))
                .unwrap();
            txn.commit().unwrap();
            id
        };
        let second = {
            let mut txn = store.begin_write().unwrap();
            let id = txn
                .ensure_id_key(&ExternalId::new("TICKER", "AAPL"))
                .unwrap();
            txn.commit().unwrap();
            id
        };

        assert_eq!(first, second);
        assert_eq!(store.shared_id_key_count(), 1);
    }

    #[test]
    fn dedup_within_one_transaction() {
        let store = InMemoryStore::new();
        let mut txn = store.begin_write().unwrap();
        let a = txn.ensure_attribute("ccy", "EUR").unwrap();
        let b = txn.ensure_attribute("ccy", "EUR").unwrap();
        assert_eq!(a, b);
        txn.commit().unwrap();
        assert_eq!(store.shared_attribute_count(), 1);
    }

    #[test]
    fn close_version_conflicts_when_already_closed() {
        let store = InMemoryStore::new();
        insert(&store, row(1, 1, 100));

        let mut txn = store.begin_write().unwrap();
        txn.close_version(VersionId::new(1), Timestamp::from_millis(200))
            .unwrap();
        txn.commit().unwrap();

        let mut txn = store.begin_write().unwrap();
        let err = txn
            .close_version(VersionId::new(1), Timestamp::from_millis(300))
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn dropped_transaction_discards_writes() {
        let store = InMemoryStore::new();
        {
            let mut txn = store.begin_write().unwrap();
            txn.insert_document(row(1, 1, 100)).unwrap();
            // Dropped without commit.
        }
        assert_eq!(store.row_count(), 0);
    }

    #[test]
    fn search_with_count_only_page() {
        let store = InMemoryStore::new();
        insert(&store, row(1, 1, 100));
        insert(&store, row(2, 2, 100));

        let t = Timestamp::from_millis;
        let mut query = DocQuery::at(t(500), t(500));
        query.page = Page::NONE;
        let result = store.search(&query).unwrap();
        assert_eq!(result.total, 2);
        assert!(result.rows.is_empty());
    }

    #[test]
    fn search_paging_and_order() {
        let store = InMemoryStore::new();
        for i in 1..=5 {
            insert(&store, row(i, i, 100));
        }

        let t = Timestamp::from_millis;
        let mut query = DocQuery::at(t(500), t(500));
        query.page = Page::new(1, 2);
        let result = store.search(&query).unwrap();
        assert_eq!(result.total, 5);
        assert_eq!(result.rows.len(), 2);
        assert_eq!(result.rows[0].object_id, ObjectId::new(2));
        assert_eq!(result.rows[1].object_id, ObjectId::new(3));
    }

    #[test]
    fn search_by_attribute() {
        let store = InMemoryStore::new();
        let mut txn = store.begin_write().unwrap();
        txn.insert_document(row(1, 1, 100)).unwrap();
        let eur = txn.ensure_attribute("ccy", "EUR").unwrap();
        txn.link_attributes(VersionId::new(1), &[eur]).unwrap();
        txn.insert_document(row(2, 2, 100)).unwrap();
        let usd = txn.ensure_attribute("ccy", "USD").unwrap();
        txn.link_attributes(VersionId::new(2), &[usd]).unwrap();
        txn.commit().unwrap();

        let t = Timestamp::from_millis;
        let mut query = DocQuery::at(t(500), t(500));
        query.attributes = vec![("ccy".to_string(), ValueMatch::for_value("EUR"))];
        let result = store.search(&query).unwrap();
        assert_eq!(result.total, 1);
        assert_eq!(result.rows[0].object_id, ObjectId::new(1));
    }

    #[test]
    fn search_by_name_wildcard() {
        let store = InMemoryStore::new();
        let mut named = row(1, 1, 100);
        named.name = "EUR Cash".to_string();
        insert(&store, named);
        insert(&store, row(2, 2, 100));

        let t = Timestamp::from_millis;
        let mut query = DocQuery::at(t(500), t(500));
        query.name = Some(ValueMatch::for_value("EUR*"));
        let result = store.search(&query).unwrap();
        assert_eq!(result.total, 1);
        assert_eq!(result.rows[0].version_id, VersionId::new(1));
    }

    #[test]
    fn history_orders_newest_first() {
        let store = InMemoryStore::new();
        let mut v1 = row(1, 1, 100);
        v1.ver_to = Timestamp::from_millis(200);
        insert(&store, v1);
        insert(&store, row(2, 1, 200));
        insert(&store, row(3, 2, 150)); // different object

        let result = store.history(&HistoryQuery::all_of(ObjectId::new(1))).unwrap();
        assert_eq!(result.total, 2);
        assert_eq!(result.rows[0].version_id, VersionId::new(2));
        assert_eq!(result.rows[1].version_id, VersionId::new(1));
    }

    #[test]
    fn type_listings_are_sorted_and_distinct() {
        let store = InMemoryStore::new();
        let mut a = row(1, 1, 100);
        a.sub_type = "swap".to_string();
        let mut b = row(2, 2, 100);
        b.sub_type = "bond".to_string();
        let mut c = row(3, 3, 100);
        c.sub_type = "swap".to_string();
        insert(&store, a);
        insert(&store, b);
        insert(&store, c);

        assert_eq!(store.sub_types('D').unwrap(), vec!["bond", "swap"]);
        assert!(store.sub_types('X').unwrap().is_empty());
        assert_eq!(store.actual_types('D').unwrap(), vec!["PlainDoc"]);
    }

    #[test]
    fn schema_version_lookup() {
        let store = InMemoryStore::new();
        assert_eq!(store.schema_version().unwrap(), (1, 0));
    }
}
