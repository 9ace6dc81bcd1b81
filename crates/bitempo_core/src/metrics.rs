//! Operation timing and counting.
//!
//! The master times every public operation through a [`MetricSink`]. The
//! default sink discards everything; [`MasterStats`] is an atomic sink for
//! in-process monitoring and tests.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Named master operations, used as metric labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MasterOp {
    /// Exact get by identity.
    Get,
    /// Point-in-time get by object id.
    GetAt,
    /// Add of a new object.
    Add,
    /// New version of an existing object.
    Update,
    /// Correction of the current version.
    Correct,
    /// Removal (timeline termination).
    Remove,
    /// Point-in-time search.
    Search,
    /// Bitemporal history query.
    History,
    /// Any of the replace-version operations.
    Replace,
    /// Insert of one row batch inside a mutation.
    Insert,
    /// Sub-type or actual-type listing.
    ListTypes,
    /// Schema-version lookup.
    SchemaVersion,
}

impl MasterOp {
    /// Returns the metric label.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::GetAt => "get_at",
            Self::Add => "add",
            Self::Update => "update",
            Self::Correct => "correct",
            Self::Remove => "remove",
            Self::Search => "search",
            Self::History => "history",
            Self::Replace => "replace",
            Self::Insert => "insert",
            Self::ListTypes => "list_types",
            Self::SchemaVersion => "schema_version",
        }
    }
}

impl fmt::Display for MasterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Sink for operation timings.
pub trait MetricSink: Send + Sync {
    /// Records one completed operation with its wall-clock duration.
    fn record(&self, op: MasterOp, nanos: u64);
}

/// The default sink; discards every record.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricSink for NoopMetrics {
    fn record(&self, _op: MasterOp, _nanos: u64) {}
}

/// One atomic counter pair per operation.
#[derive(Debug, Default)]
struct OpCounter {
    count: AtomicU64,
    nanos: AtomicU64,
}

impl OpCounter {
    fn record(&self, nanos: u64) {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.nanos.fetch_add(nanos, Ordering::Relaxed);
    }
}

/// Atomic in-process metric sink.
///
/// Counters can be read while operations are in progress; values are
/// monotonically increasing.
#[derive(Debug, Default)]
pub struct MasterStats {
    get: OpCounter,
    get_at: OpCounter,
    add: OpCounter,
    update: OpCounter,
    correct: OpCounter,
    remove: OpCounter,
    search: OpCounter,
    history: OpCounter,
    replace: OpCounter,
    insert: OpCounter,
    list_types: OpCounter,
    schema_version: OpCounter,
}

impl MasterStats {
    /// Creates a zeroed stats sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn counter(&self, op: MasterOp) -> &OpCounter {
        match op {
            MasterOp::Get => &self.get,
            MasterOp::GetAt => &self.get_at,
            MasterOp::Add => &self.add,
            MasterOp::Update => &self.update,
            MasterOp::Correct => &self.correct,
            MasterOp::Remove => &self.remove,
            MasterOp::Search => &self.search,
            MasterOp::History => &self.history,
            MasterOp::Replace => &self.replace,
            MasterOp::Insert => &self.insert,
            MasterOp::ListTypes => &self.list_types,
            MasterOp::SchemaVersion => &self.schema_version,
        }
    }

    /// Returns how many times an operation completed.
    pub fn count(&self, op: MasterOp) -> u64 {
        self.counter(op).count.load(Ordering::Relaxed)
    }

    /// Returns the accumulated wall-clock nanoseconds of an operation.
    pub fn total_nanos(&self, op: MasterOp) -> u64 {
        self.counter(op).nanos.load(Ordering::Relaxed)
    }
}

impl MetricSink for MasterStats {
    fn record(&self, op: MasterOp, nanos: u64) {
        self.counter(op).record(nanos);
    }
}

/// Times one operation, recording on drop.
///
/// Recording on drop covers both the success and the error return path.
pub(crate) struct OpTimer<'a> {
    sink: &'a dyn MetricSink,
    op: MasterOp,
    started: Instant,
}

impl<'a> OpTimer<'a> {
    pub(crate) fn start(sink: &'a dyn MetricSink, op: MasterOp) -> Self {
        Self {
            sink,
            op,
            started: Instant::now(),
        }
    }
}

impl Drop for OpTimer<'_> {
    fn drop(&mut self) {
        let nanos = u64::try_from(self.started.elapsed().as_nanos()).unwrap_or(u64::MAX);
        self.sink.record(self.op, nanos);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_accumulate_per_op() {
        let stats = MasterStats::new();
        stats.record(MasterOp::Add, 100);
        stats.record(MasterOp::Add, 50);
        stats.record(MasterOp::Search, 10);

        assert_eq!(stats.count(MasterOp::Add), 2);
        assert_eq!(stats.total_nanos(MasterOp::Add), 150);
        assert_eq!(stats.count(MasterOp::Search), 1);
        assert_eq!(stats.count(MasterOp::Get), 0);
    }

    #[test]
    fn timer_records_on_drop() {
        let stats = MasterStats::new();
        {
            let _timer = OpTimer::start(&stats, MasterOp::History);
        }
        assert_eq!(stats.count(MasterOp::History), 1);
    }

    #[test]
    fn labels_are_stable() {
        assert_eq!(MasterOp::GetAt.label(), "get_at");
        assert_eq!(format!("{}", MasterOp::SchemaVersion), "schema_version");
    }
}
