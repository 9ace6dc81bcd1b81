//! Store trait definitions.

use crate::error::StoreResult;
use crate::query::{DocQuery, HistoryQuery, QueryResult};
use crate::row::{DocumentRow, ExternalId, KeyId, ObjectId, Timestamp, VersionId};

/// The storage collaborator of the master engine.
///
/// A `DocStore` holds one table family: the versioned document table, the
/// three shared pair tables (external ids, attributes, indexed properties)
/// and their per-document join tables. The engine addresses it only through
/// the typed operations below - the store resolves them into whatever its
/// backend needs.
///
/// # Invariants
///
/// - `next_version_id` is strictly monotonic and never repeats a value,
///   including values handed to transactions that later roll back
/// - Shared pair tables enforce uniqueness per distinct pair; violations
///   surface as [`crate::StoreError::Conflict`]
/// - Reads observe only committed state
/// - Stores must be `Send + Sync` for concurrent access
pub trait DocStore: Send + Sync {
    /// Returns the store schema version.
    fn schema_version(&self) -> StoreResult<(u16, u16)>;

    /// Allocates the next row id from the monotonic sequence.
    fn next_version_id(&self) -> VersionId;

    /// Fetches the row with an exact version id.
    fn get_by_id(&self, version_id: VersionId) -> StoreResult<Option<DocumentRow>>;

    /// Fetches the single row of an object visible at the instant pair.
    fn get_by_oid_instants(
        &self,
        object_id: ObjectId,
        version_as_of: Timestamp,
        corrected_to: Timestamp,
    ) -> StoreResult<Option<DocumentRow>>;

    /// Executes a point-in-time search.
    ///
    /// The total count is always computed; the row fetch is skipped when the
    /// page size is zero.
    fn search(&self, query: &DocQuery) -> StoreResult<QueryResult>;

    /// Executes a bitemporal history query, newest version first.
    fn history(&self, query: &HistoryQuery) -> StoreResult<QueryResult>;

    /// Lists the distinct sub-types stored for a main type.
    fn sub_types(&self, main_type: char) -> StoreResult<Vec<String>>;

    /// Lists the distinct actual types stored for a main type.
    fn actual_types(&self, main_type: char) -> StoreResult<Vec<String>>;

    /// Begins a write transaction.
    ///
    /// All writes staged on the transaction are applied atomically by
    /// [`StoreTxn::commit`]; dropping the transaction without committing
    /// discards every staged write.
    fn begin_write(&self) -> StoreResult<Box<dyn StoreTxn + '_>>;
}

/// A write transaction over one table family.
///
/// Writes are staged and take effect only on `commit`. The dedup probes
/// (`ensure_*`) are insert-or-get: they return the existing shared row when
/// the pair is already present, in committed state or staged earlier in this
/// transaction, and stage a new shared row otherwise.
pub trait StoreTxn {
    /// Stages a new document row.
    fn insert_document(&mut self, row: DocumentRow) -> StoreResult<()>;

    /// Closes the version interval of a row at `ver_to`.
    ///
    /// Fails with a retryable conflict if the interval is already closed
    /// (a concurrent writer got there first).
    fn close_version(&mut self, version_id: VersionId, ver_to: Timestamp) -> StoreResult<()>;

    /// Closes the correction interval of a row at `corr_to`.
    ///
    /// Fails with a retryable conflict if the interval is already closed.
    fn close_correction(&mut self, version_id: VersionId, corr_to: Timestamp) -> StoreResult<()>;

    /// Probes the shared external-id table, staging an insert if absent.
    fn ensure_id_key(&mut self, id: &ExternalId) -> StoreResult<KeyId>;

    /// Probes the shared attribute table, staging an insert if absent.
    fn ensure_attribute(&mut self, key: &str, value: &str) -> StoreResult<KeyId>;

    /// Probes the shared indexed-property table, staging an insert if absent.
    fn ensure_property(&mut self, key: &str, value: &str) -> StoreResult<KeyId>;

    /// Stages the external-id join rows for a document, as one batch.
    fn link_id_keys(&mut self, version_id: VersionId, keys: &[KeyId]) -> StoreResult<()>;

    /// Stages the attribute join rows for a document, as one batch.
    fn link_attributes(&mut self, version_id: VersionId, keys: &[KeyId]) -> StoreResult<()>;

    /// Stages the indexed-property join rows for a document, as one batch.
    fn link_properties(&mut self, version_id: VersionId, keys: &[KeyId]) -> StoreResult<()>;

    /// Atomically applies every staged write.
    ///
    /// On any failure nothing is applied and the error is returned.
    fn commit(self: Box<Self>) -> StoreResult<()>;
}
