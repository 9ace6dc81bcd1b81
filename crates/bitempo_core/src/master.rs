//! The document master facade.

use crate::adapter::{Document, DocumentAdapter};
use crate::change::{ChangeEvent, ChangeFeed, ChangeKind};
use crate::engine::DocumentEngine;
use crate::error::MasterResult;
use crate::metrics::{MasterOp, MetricSink, NoopMetrics, OpTimer};
use crate::search::{HistoryRequest, SearchRequest, SearchResult};
use crate::time::{Clock, SystemClock};
use crate::types::{UniqueId, VersionCorrection};
use bitempo_storage::{DocStore, ObjectId};
use std::sync::mpsc::Receiver;
use std::sync::Arc;

/// Configuration of one master instance.
#[derive(Debug, Clone)]
pub struct MasterConfig {
    /// Identifier scheme stamped onto every identity this master assigns.
    pub scheme: String,
    /// Upper bound on write attempts per mutation.
    pub max_retries: u32,
    /// Source of "now".
    pub clock: Arc<dyn Clock>,
    /// Bound on the change feed's polling history.
    pub change_history: usize,
}

impl MasterConfig {
    /// Creates a configuration with the given scheme and defaults for the
    /// rest: ten write attempts, the wall clock, ten thousand retained
    /// change events.
    pub fn new(scheme: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            max_retries: 10,
            clock: Arc::new(SystemClock),
            change_history: 10_000,
        }
    }

    /// Replaces the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replaces the retry bound. At least one attempt is always made.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Replaces the change-history bound.
    #[must_use]
    pub fn with_change_history(mut self, change_history: usize) -> Self {
        self.change_history = change_history;
        self
    }
}

/// A complete document master: engine, change feed and metrics behind one
/// surface.
///
/// The facade adds no business logic. Every operation delegates verbatim to
/// the engine; around the delegation it times the call and, after a
/// successful mutation, publishes a change event best-effort.
pub struct DocumentMaster<A: DocumentAdapter> {
    engine: DocumentEngine<A>,
    clock: Arc<dyn Clock>,
    changes: ChangeFeed,
    metrics: Arc<dyn MetricSink>,
}

impl<A: DocumentAdapter> DocumentMaster<A> {
    /// Creates a master with metrics discarded.
    pub fn new(store: Arc<dyn DocStore>, adapter: A, config: MasterConfig) -> Self {
        Self::with_metrics(store, adapter, config, Arc::new(NoopMetrics))
    }

    /// Creates a master recording into the given sink.
    pub fn with_metrics(
        store: Arc<dyn DocStore>,
        adapter: A,
        config: MasterConfig,
        metrics: Arc<dyn MetricSink>,
    ) -> Self {
        let clock = Arc::clone(&config.clock);
        let engine = DocumentEngine::new(
            store,
            adapter,
            Arc::clone(&config.clock),
            config.scheme,
            config.max_retries,
        );
        Self {
            engine,
            clock,
            changes: ChangeFeed::with_max_history(config.change_history),
            metrics,
        }
    }

    /// The identifier scheme of this master.
    #[must_use]
    pub fn scheme(&self) -> &str {
        self.engine.scheme()
    }

    /// The change feed.
    #[must_use]
    pub fn changes(&self) -> &ChangeFeed {
        &self.changes
    }

    /// Subscribes to change events.
    pub fn subscribe(&self) -> Receiver<ChangeEvent> {
        self.changes.subscribe()
    }

    /// Fetches the exact row named by a composite identity.
    pub fn get(&self, unique_id: &UniqueId) -> MasterResult<Document<A::Payload>> {
        let _timer = OpTimer::start(self.metrics.as_ref(), MasterOp::Get);
        self.engine.get(unique_id)
    }

    /// Fetches several documents, in input order.
    pub fn get_many(&self, unique_ids: &[UniqueId]) -> MasterResult<Vec<Document<A::Payload>>> {
        let _timer = OpTimer::start(self.metrics.as_ref(), MasterOp::Get);
        self.engine.get_many(unique_ids)
    }

    /// Fetches the single document of an object visible at the locator.
    pub fn get_at(
        &self,
        object_id: ObjectId,
        locator: VersionCorrection,
    ) -> MasterResult<Document<A::Payload>> {
        let _timer = OpTimer::start(self.metrics.as_ref(), MasterOp::GetAt);
        self.engine.get_at(object_id, locator)
    }

    /// Adds a document, returning it enriched with identity and instants.
    pub fn add(&self, document: Document<A::Payload>) -> MasterResult<Document<A::Payload>> {
        let _timer = OpTimer::start(self.metrics.as_ref(), MasterOp::Add);
        let added = self.engine.add(document)?;
        self.publish(ChangeKind::Added, &added);
        Ok(added)
    }

    /// Stores a new version of an existing document.
    pub fn update(&self, document: Document<A::Payload>) -> MasterResult<Document<A::Payload>> {
        let _timer = OpTimer::start(self.metrics.as_ref(), MasterOp::Update);
        let updated = self.engine.update(document)?;
        self.publish(ChangeKind::Changed, &updated);
        Ok(updated)
    }

    /// Stores a correction of a document version.
    pub fn correct(&self, document: Document<A::Payload>) -> MasterResult<Document<A::Payload>> {
        let _timer = OpTimer::start(self.metrics.as_ref(), MasterOp::Correct);
        let corrected = self.engine.correct(document)?;
        self.publish(ChangeKind::Changed, &corrected);
        Ok(corrected)
    }

    /// Terminates an object's timeline, returning the terminated document.
    pub fn remove(&self, object_id: ObjectId) -> MasterResult<Document<A::Payload>> {
        let _timer = OpTimer::start(self.metrics.as_ref(), MasterOp::Remove);
        let removed = self.engine.remove(object_id)?;
        self.publish(ChangeKind::Removed, &removed);
        Ok(removed)
    }

    /// Replaces one stored version with a batch of replacement documents.
    pub fn replace_version(
        &self,
        unique_id: &UniqueId,
        replacements: Vec<Document<A::Payload>>,
    ) -> MasterResult<Vec<UniqueId>> {
        let _timer = OpTimer::start(self.metrics.as_ref(), MasterOp::Replace);
        let ids = self.engine.replace_version(unique_id, replacements)?;
        self.publish_object(ChangeKind::Changed, unique_id.object_id);
        Ok(ids)
    }

    /// Replaces the stored versions overlapping the batch's window.
    pub fn replace_versions(
        &self,
        object_id: ObjectId,
        replacements: Vec<Document<A::Payload>>,
    ) -> MasterResult<Vec<UniqueId>> {
        let _timer = OpTimer::start(self.metrics.as_ref(), MasterOp::Replace);
        let ids = self.engine.replace_versions(object_id, replacements)?;
        self.publish_object(ChangeKind::Changed, object_id);
        Ok(ids)
    }

    /// Replaces every current version of an object with the batch.
    pub fn replace_all_versions(
        &self,
        object_id: ObjectId,
        replacements: Vec<Document<A::Payload>>,
    ) -> MasterResult<Vec<UniqueId>> {
        let _timer = OpTimer::start(self.metrics.as_ref(), MasterOp::Replace);
        let ids = self.engine.replace_all_versions(object_id, replacements)?;
        self.publish_object(ChangeKind::Changed, object_id);
        Ok(ids)
    }

    /// Appends a version to an existing object's timeline.
    pub fn add_version(
        &self,
        object_id: ObjectId,
        document: Document<A::Payload>,
    ) -> MasterResult<Vec<UniqueId>> {
        let _timer = OpTimer::start(self.metrics.as_ref(), MasterOp::Replace);
        let ids = self.engine.add_version(object_id, document)?;
        self.publish_object(ChangeKind::Changed, object_id);
        Ok(ids)
    }

    /// Removes one stored version from the timeline.
    pub fn remove_version(&self, unique_id: &UniqueId) -> MasterResult<()> {
        let _timer = OpTimer::start(self.metrics.as_ref(), MasterOp::Replace);
        self.engine.remove_version(unique_id)?;
        self.publish_object(ChangeKind::Changed, unique_id.object_id);
        Ok(())
    }

    /// Executes a point-in-time search.
    pub fn search(&self, request: &SearchRequest) -> MasterResult<SearchResult<A::Payload>> {
        let _timer = OpTimer::start(self.metrics.as_ref(), MasterOp::Search);
        self.engine.search(request)
    }

    /// Executes a bitemporal history query, newest version first.
    pub fn history(&self, request: &HistoryRequest) -> MasterResult<SearchResult<A::Payload>> {
        let _timer = OpTimer::start(self.metrics.as_ref(), MasterOp::History);
        self.engine.history(request)
    }

    /// Lists the distinct sub-types stored for this master's main type.
    pub fn sub_types(&self) -> MasterResult<Vec<String>> {
        let _timer = OpTimer::start(self.metrics.as_ref(), MasterOp::ListTypes);
        self.engine.sub_types()
    }

    /// Lists the distinct concrete types stored for this master's main type.
    pub fn actual_types(&self) -> MasterResult<Vec<String>> {
        let _timer = OpTimer::start(self.metrics.as_ref(), MasterOp::ListTypes);
        self.engine.actual_types()
    }

    /// Returns the store schema version.
    pub fn schema_version(&self) -> MasterResult<(u16, u16)> {
        let _timer = OpTimer::start(self.metrics.as_ref(), MasterOp::SchemaVersion);
        self.engine.schema_version()
    }

    fn publish(&self, kind: ChangeKind, document: &Document<A::Payload>) {
        if let Some(object_id) = document.object_id() {
            self.changes.emit(
                kind,
                object_id,
                document.version_from,
                document.version_to,
                self.clock.now(),
            );
        }
    }

    fn publish_object(&self, kind: ChangeKind, object_id: ObjectId) {
        self.changes.emit(kind, object_id, None, None, self.clock.now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::ExternalIdBundle;
    use crate::error::MasterError;
    use crate::metrics::MasterStats;
    use crate::time::FixedClock;
    use bitempo_storage::{ExternalId, InMemoryStore, Timestamp};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Note {
        id: Option<String>,
        title: String,
        tag: String,
    }

    struct NoteAdapter;

    impl DocumentAdapter for NoteAdapter {
        type Payload = Note;

        fn main_type(&self) -> char {
            'N'
        }
        fn name(&self, payload: &Note) -> String {
            payload.title.clone()
        }
        fn external_ids(&self, payload: &Note) -> ExternalIdBundle {
            ExternalIdBundle::of([ExternalId::new("NOTE", payload.title.clone())])
        }
        fn attributes(&self, payload: &Note) -> Vec<(String, String)> {
            vec![("tag".to_string(), payload.tag.clone())]
        }
        fn sub_type(&self, _payload: &Note) -> String {
            "note".to_string()
        }
        fn actual_type(&self, _payload: &Note) -> String {
            "Note".to_string()
        }
        fn serialize(&self, payload: &Note) -> MasterResult<Vec<u8>> {
            serde_json::to_vec(payload).map_err(|e| MasterError::codec(e.to_string()))
        }
        fn deserialize(&self, bytes: &[u8]) -> MasterResult<Note> {
            serde_json::from_slice(bytes).map_err(|e| MasterError::codec(e.to_string()))
        }
        fn attach_identity(&self, payload: &mut Note, id: &UniqueId) {
            payload.id = Some(id.to_string());
        }
    }

    fn note(title: &str) -> Document<Note> {
        Document::new(Note {
            id: None,
            title: title.to_string(),
            tag: "work".to_string(),
        })
    }

    fn master_with_stats() -> (DocumentMaster<NoteAdapter>, Arc<MasterStats>, Arc<FixedClock>) {
        let clock = Arc::new(FixedClock::at(Timestamp::from_millis(1_000)));
        let stats = Arc::new(MasterStats::new());
        let config = MasterConfig::new("Note").with_clock(Arc::clone(&clock) as Arc<dyn Clock>);
        let master = DocumentMaster::with_metrics(
            Arc::new(InMemoryStore::new()),
            NoteAdapter,
            config,
            Arc::clone(&stats) as Arc<dyn MetricSink>,
        );
        (master, stats, clock)
    }

    #[test]
    fn add_publishes_an_added_event() {
        let (master, _stats, _clock) = master_with_stats();
        let rx = master.subscribe();

        let added = master.add(note("plan")).unwrap();

        let event = rx.recv().unwrap();
        assert_eq!(event.kind, ChangeKind::Added);
        assert_eq!(Some(event.object_id), added.object_id());
        assert_eq!(event.version_from, Some(Timestamp::from_millis(1_000)));
        assert_eq!(event.version_to, None);
    }

    #[test]
    fn mutations_publish_in_commit_order() {
        let (master, _stats, clock) = master_with_stats();
        let added = master.add(note("plan")).unwrap();
        let oid = added.object_id().unwrap();
        clock.advance(100);
        master.update(added).unwrap();
        clock.advance(100);
        master.remove(oid).unwrap();

        let events = master.changes().poll(0, 10);
        let kinds: Vec<ChangeKind> = events.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![ChangeKind::Added, ChangeKind::Changed, ChangeKind::Removed]
        );
        assert!(events.windows(2).all(|w| w[0].sequence < w[1].sequence));
    }

    #[test]
    fn failed_mutations_publish_nothing() {
        let (master, _stats, _clock) = master_with_stats();
        assert!(master.remove(ObjectId::new(99)).is_err());
        assert_eq!(master.changes().latest_sequence(), 0);
    }

    #[test]
    fn operations_are_timed() {
        let (master, stats, _clock) = master_with_stats();
        let added = master.add(note("plan")).unwrap();
        master.get(added.unique_id.as_ref().unwrap()).unwrap();
        master.get(added.unique_id.as_ref().unwrap()).unwrap();
        master.sub_types().unwrap();
        master.schema_version().unwrap();

        assert_eq!(stats.count(MasterOp::Add), 1);
        assert_eq!(stats.count(MasterOp::Get), 2);
        assert_eq!(stats.count(MasterOp::ListTypes), 1);
        assert_eq!(stats.count(MasterOp::SchemaVersion), 1);
        assert!(stats.total_nanos(MasterOp::Add) > 0);
    }

    #[test]
    fn facade_delegates_search() {
        let (master, stats, _clock) = master_with_stats();
        master.add(note("plan")).unwrap();

        let mut request = SearchRequest::latest();
        request.add_attribute("tag", "work");
        let found = master.search(&request).unwrap();
        assert_eq!(found.total, 1);

        let mut request = SearchRequest::latest();
        request.add_attribute("tag", "play");
        assert_eq!(master.search(&request).unwrap().total, 0);

        assert_eq!(stats.count(MasterOp::Search), 2);
    }
}
