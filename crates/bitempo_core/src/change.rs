//! Change feed for observing committed master operations.
//!
//! The feed emits one event per successful mutation, after commit, enabling
//! cache invalidation and downstream sync. Events are best-effort: a slow or
//! dropped subscriber never fails the mutation that produced the event.

use bitempo_storage::{ObjectId, Timestamp};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};

/// Kind of change event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// A new object was added.
    Added,
    /// An existing object gained a version or correction.
    Changed,
    /// An object's timeline was terminated.
    Removed,
}

/// A single change event.
///
/// Carries the affected object and the version range the mutation touched;
/// open range ends are `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Feed-assigned sequence number, strictly increasing.
    pub sequence: u64,
    /// Kind of change.
    pub kind: ChangeKind,
    /// The affected object.
    pub object_id: ObjectId,
    /// Start of the affected version range.
    pub version_from: Option<Timestamp>,
    /// End of the affected version range, `None` while open.
    pub version_to: Option<Timestamp>,
    /// Instant the mutation committed.
    pub at: Timestamp,
}

/// A change feed that distributes committed mutations to subscribers.
///
/// Emits only committed operations, preserves commit order, supports
/// multiple subscribers, and keeps a bounded history for polling.
pub struct ChangeFeed {
    subscribers: RwLock<Vec<Sender<ChangeEvent>>>,
    history: RwLock<Vec<ChangeEvent>>,
    sequence: AtomicU64,
    max_history: usize,
}

impl ChangeFeed {
    /// Creates a feed with the default history limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_history(10_000)
    }

    /// Creates a feed with a specific history limit.
    #[must_use]
    pub fn with_max_history(max_history: usize) -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            history: RwLock::new(Vec::new()),
            sequence: AtomicU64::new(0),
            max_history,
        }
    }

    /// Subscribes to the feed.
    ///
    /// The receiver gets every future event and should be drained regularly
    /// to avoid unbounded channel growth.
    pub fn subscribe(&self) -> Receiver<ChangeEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.write().push(tx);
        rx
    }

    /// Emits an event, assigning its sequence number.
    pub fn emit(
        &self,
        kind: ChangeKind,
        object_id: ObjectId,
        version_from: Option<Timestamp>,
        version_to: Option<Timestamp>,
        at: Timestamp,
    ) -> u64 {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let event = ChangeEvent {
            sequence,
            kind,
            object_id,
            version_from,
            version_to,
            at,
        };
        {
            let mut history = self.history.write();
            history.push(event.clone());
            if history.len() > self.max_history {
                let excess = history.len() - self.max_history;
                history.drain(0..excess);
            }
        }
        let mut subscribers = self.subscribers.write();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        sequence
    }

    /// Polls events with sequence greater than `cursor`, up to `limit`.
    pub fn poll(&self, cursor: u64, limit: usize) -> Vec<ChangeEvent> {
        self.history
            .read()
            .iter()
            .filter(|e| e.sequence > cursor)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Returns the latest sequence number emitted, zero when none.
    pub fn latest_sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }

    /// Returns the number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Returns the number of events kept in history.
    pub fn history_len(&self) -> usize {
        self.history.read().len()
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn emit_n(feed: &ChangeFeed, n: u64) {
        for i in 0..n {
            feed.emit(
                ChangeKind::Added,
                ObjectId::new(i + 1),
                Some(Timestamp::from_millis(100)),
                None,
                Timestamp::from_millis(100),
            );
        }
    }

    #[test]
    fn emit_and_receive() {
        let feed = ChangeFeed::new();
        let rx = feed.subscribe();
        emit_n(&feed, 1);

        let event = rx.recv_timeout(Duration::from_millis(100)).unwrap();
        assert_eq!(event.sequence, 1);
        assert_eq!(event.kind, ChangeKind::Added);
        assert_eq!(event.object_id, ObjectId::new(1));
    }

    #[test]
    fn multiple_subscribers_get_every_event() {
        let feed = ChangeFeed::new();
        let rx1 = feed.subscribe();
        let rx2 = feed.subscribe();
        emit_n(&feed, 1);

        assert_eq!(rx1.recv().unwrap().sequence, 1);
        assert_eq!(rx2.recv().unwrap().sequence, 1);
    }

    #[test]
    fn dropped_subscribers_are_cleaned_up() {
        let feed = ChangeFeed::new();
        let rx = feed.subscribe();
        assert_eq!(feed.subscriber_count(), 1);
        drop(rx);
        emit_n(&feed, 1);
        assert_eq!(feed.subscriber_count(), 0);
    }

    #[test]
    fn poll_from_cursor() {
        let feed = ChangeFeed::new();
        emit_n(&feed, 5);

        let events = feed.poll(2, 10);
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].sequence, 3);

        assert_eq!(feed.poll(0, 2).len(), 2);
    }

    #[test]
    fn history_is_bounded() {
        let feed = ChangeFeed::with_max_history(3);
        emit_n(&feed, 10);

        assert_eq!(feed.history_len(), 3);
        assert_eq!(feed.poll(0, 100)[0].sequence, 8);
        assert_eq!(feed.latest_sequence(), 10);
    }

    #[test]
    fn threaded_subscribe() {
        let feed = Arc::new(ChangeFeed::new());
        let rx = feed.subscribe();

        let feed_clone = Arc::clone(&feed);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            emit_n(&feed_clone, 1);
        });

        let event = rx.recv_timeout(Duration::from_millis(500)).unwrap();
        assert_eq!(event.object_id, ObjectId::new(1));
        handle.join().unwrap();
    }
}
