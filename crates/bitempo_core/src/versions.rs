//! Replacement-batch validation and instant adjustment.
//!
//! Replace operations take a caller-supplied batch of documents destined for
//! one version window of the timeline. Before insertion the batch is checked
//! and normalized: version-from instants must be distinct and fall inside the
//! replaced window, gaps between consecutive documents are closed by chaining
//! each version end to the next start, and every document gets a fresh open
//! correction interval at the captured `now`.

use crate::adapter::Document;
use crate::error::{MasterError, MasterResult};
use bitempo_storage::Timestamp;

/// Checks that no two documents share a version-from instant.
///
/// At most one document may leave its version-from unset; it later inherits
/// the start of the replaced window.
pub(crate) fn check_unique_versions_from<P>(documents: &[Document<P>]) -> MasterResult<()> {
    let mut froms: Vec<Option<Timestamp>> = documents.iter().map(|d| d.version_from).collect();
    froms.sort();
    for pair in froms.windows(2) {
        if pair[0] == pair[1] {
            return Err(MasterError::validation(
                "no two replacement documents may share a version-from instant",
            ));
        }
    }
    Ok(())
}

/// Checks that every set version-from instant falls inside the replaced
/// window `[window_from, window_to)`.
///
/// With `require_equal_start` the earliest instant must equal the window
/// start exactly; otherwise it may fall anywhere inside. An unset earliest
/// instant passes either way, since adjustment fills it with the window
/// start.
pub(crate) fn check_within_window<P>(
    documents: &[Document<P>],
    window_from: Timestamp,
    window_to: Timestamp,
    require_equal_start: bool,
) -> MasterResult<()> {
    let mut froms: Vec<Timestamp> = documents.iter().filter_map(|d| d.version_from).collect();
    if froms.len() + 1 < documents.len() {
        return Err(MasterError::validation(
            "at most one replacement document may omit its version-from instant",
        ));
    }
    froms.sort();
    if let (Some(earliest), true) = (froms.first(), froms.len() == documents.len()) {
        if require_equal_start && *earliest != window_from {
            return Err(MasterError::validation(format!(
                "earliest replacement instant {earliest} must equal the window start {window_from}"
            )));
        }
    }
    for from in &froms {
        if *from < window_from || *from >= window_to {
            return Err(MasterError::validation(format!(
                "replacement instant {from} falls outside the replaced window \
                 [{window_from}, {window_to})"
            )));
        }
    }
    Ok(())
}

/// Orders a replacement batch and normalizes its instants.
///
/// Documents are sorted by version-from (an unset instant sorts first and
/// inherits `window_from`), each version end is chained to the next start,
/// the last end becomes `window_to`, and every correction interval is reset
/// to open at `now`.
pub(crate) fn adjust_version_instants<P>(
    mut documents: Vec<Document<P>>,
    now: Timestamp,
    window_from: Timestamp,
    window_to: Timestamp,
) -> Vec<Document<P>> {
    for document in &mut documents {
        document.correction_from = Some(now);
        document.correction_to = None;
    }
    documents.sort_by_key(|d| d.version_from);
    if let Some(first) = documents.first_mut() {
        if first.version_from.is_none() {
            first.version_from = Some(window_from);
        }
    }
    let starts: Vec<Option<Timestamp>> = documents.iter().map(|d| d.version_from).collect();
    let count = documents.len();
    for (i, document) in documents.iter_mut().enumerate() {
        document.version_to = if i + 1 < count {
            starts[i + 1]
        } else if window_to.is_max() {
            None
        } else {
            Some(window_to)
        };
    }
    documents
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(version_from: Option<i64>) -> Document<u8> {
        let mut d = Document::new(0u8);
        d.version_from = version_from.map(Timestamp::from_millis);
        d
    }

    #[test]
    fn duplicate_version_from_is_rejected() {
        let batch = vec![doc(Some(100)), doc(Some(100))];
        assert!(check_unique_versions_from(&batch).is_err());
        let batch = vec![doc(Some(100)), doc(Some(200))];
        assert!(check_unique_versions_from(&batch).is_ok());
    }

    #[test]
    fn two_unset_version_froms_are_rejected() {
        let batch = vec![doc(None), doc(None), doc(Some(100))];
        assert!(check_unique_versions_from(&batch).is_err());
        let t = Timestamp::from_millis;
        assert!(check_within_window(&batch, t(100), t(500), false).is_err());
    }

    #[test]
    fn window_bounds_are_half_open() {
        let t = Timestamp::from_millis;
        let inside = vec![doc(Some(100)), doc(Some(499))];
        assert!(check_within_window(&inside, t(100), t(500), false).is_ok());

        let at_end = vec![doc(Some(500))];
        assert!(check_within_window(&at_end, t(100), t(500), false).is_err());

        let before = vec![doc(Some(99))];
        assert!(check_within_window(&before, t(100), t(500), false).is_err());
    }

    #[test]
    fn equal_start_is_enforced_when_required() {
        let t = Timestamp::from_millis;
        let batch = vec![doc(Some(150)), doc(Some(200))];
        assert!(check_within_window(&batch, t(100), t(500), true).is_err());
        assert!(check_within_window(&batch, t(100), t(500), false).is_ok());

        let exact = vec![doc(Some(100)), doc(Some(200))];
        assert!(check_within_window(&exact, t(100), t(500), true).is_ok());
    }

    #[test]
    fn adjustment_chains_intervals() {
        let t = Timestamp::from_millis;
        let batch = vec![doc(Some(300)), doc(None), doc(Some(200))];
        let adjusted = adjust_version_instants(batch, t(999), t(100), t(500));

        assert_eq!(adjusted[0].version_from, Some(t(100)));
        assert_eq!(adjusted[0].version_to, Some(t(200)));
        assert_eq!(adjusted[1].version_from, Some(t(200)));
        assert_eq!(adjusted[1].version_to, Some(t(300)));
        assert_eq!(adjusted[2].version_from, Some(t(300)));
        assert_eq!(adjusted[2].version_to, Some(t(500)));
        for d in &adjusted {
            assert_eq!(d.correction_from, Some(t(999)));
            assert_eq!(d.correction_to, None);
        }
    }

    #[test]
    fn open_window_leaves_last_end_open() {
        let t = Timestamp::from_millis;
        let batch = vec![doc(Some(200))];
        let adjusted = adjust_version_instants(batch, t(999), t(100), Timestamp::MAX_INSTANT);
        assert_eq!(adjusted[0].version_to, None);
    }

    proptest::proptest! {
        /// Any batch of distinct in-window instants is chained into a
        /// gapless partition of the window.
        #[test]
        fn adjustment_partitions_the_window(
            mut froms in proptest::collection::btree_set(150i64..500, 1..8)
        ) {
            let t = Timestamp::from_millis;
            let batch: Vec<Document<u8>> =
                froms.iter().map(|f| doc(Some(*f))).collect();
            let adjusted = adjust_version_instants(batch, t(999), t(100), t(500));

            froms.insert(500);
            let mut expected_start = Some(*froms.iter().next().unwrap());
            let mut bounds = froms.iter();
            bounds.next();
            for d in &adjusted {
                proptest::prop_assert_eq!(d.version_from.map(Timestamp::as_millis), expected_start);
                let end = bounds.next().copied();
                proptest::prop_assert_eq!(d.version_to.map(Timestamp::as_millis), end);
                expected_start = end;
            }
        }
    }
}
