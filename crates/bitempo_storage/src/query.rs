//! Typed query and predicate model.
//!
//! The master engine never splices query text. Every search predicate is a
//! typed value in this module, composed into a [`DocQuery`] or
//! [`HistoryQuery`] and evaluated by the store against parameterized state.
//! The only unbounded-arity fragments - object-id membership lists and
//! wildcard matchers - are built by the engine as plain values.

use crate::row::{DocumentRow, ExternalId, ObjectId, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A compiled wildcard pattern.
///
/// `*` matches any run of characters (including none), `?` matches exactly
/// one character, everything else is literal. Patterns are matched directly
/// against values, never expanded into query text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WildcardPattern {
    raw: String,
}

impl WildcardPattern {
    /// Compiles a pattern.
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            raw: pattern.into(),
        }
    }

    /// Returns true if the text contains wildcard metacharacters.
    #[must_use]
    pub fn is_wildcard(text: &str) -> bool {
        text.contains('*') || text.contains('?')
    }

    /// Returns the raw pattern text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Matches the pattern against a value.
    #[must_use]
    pub fn matches(&self, value: &str) -> bool {
        let pattern: Vec<char> = self.raw.chars().collect();
        let text: Vec<char> = value.chars().collect();

        // Two-pointer match with backtracking to the last `*`.
        let (mut p, mut t) = (0usize, 0usize);
        let mut star: Option<(usize, usize)> = None;
        while t < text.len() {
            if p < pattern.len() && (pattern[p] == '?' || pattern[p] == text[t]) {
                p += 1;
                t += 1;
            } else if p < pattern.len() && pattern[p] == '*' {
                star = Some((p, t));
                p += 1;
            } else if let Some((sp, st)) = star {
                p = sp + 1;
                t = st + 1;
                star = Some((sp, st + 1));
            } else {
                return false;
            }
        }
        while p < pattern.len() && pattern[p] == '*' {
            p += 1;
        }
        p == pattern.len()
    }
}

impl fmt::Display for WildcardPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

/// A match against a single string value, exact or wildcard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueMatch {
    /// The value must equal the given string.
    Exact(String),
    /// The value must match the wildcard pattern.
    Wildcard(WildcardPattern),
}

impl ValueMatch {
    /// Builds a match for user-supplied text: wildcard when the text
    /// contains `*` or `?`, exact otherwise.
    pub fn for_value(text: impl Into<String>) -> Self {
        let text = text.into();
        if WildcardPattern::is_wildcard(&text) {
            Self::Wildcard(WildcardPattern::new(text))
        } else {
            Self::Exact(text)
        }
    }

    /// Matches against a value.
    #[must_use]
    pub fn matches(&self, value: &str) -> bool {
        match self {
            Self::Exact(expected) => expected == value,
            Self::Wildcard(pattern) => pattern.matches(value),
        }
    }
}

/// How a set of external identifiers must match a document's identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdMatchMode {
    /// The document must have at least one of the identifiers.
    Any,
    /// The document must have all of the identifiers.
    All,
    /// The document's identifiers must equal the set exactly.
    Exact,
    /// The document must have none of the identifiers.
    None,
}

/// An external-identifier predicate: a set of scheme/value pairs plus a
/// match mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifierSearch {
    /// The identifiers to match.
    pub ids: Vec<ExternalId>,
    /// The match mode.
    pub mode: IdMatchMode,
}

impl IdentifierSearch {
    /// Creates an identifier search with the given mode.
    pub fn new(ids: Vec<ExternalId>, mode: IdMatchMode) -> Self {
        Self { ids, mode }
    }

    /// Evaluates the predicate against a document's identifier set.
    #[must_use]
    pub fn matches(&self, doc_ids: &[ExternalId]) -> bool {
        match self.mode {
            IdMatchMode::Any => self.ids.iter().any(|id| doc_ids.contains(id)),
            IdMatchMode::All => self.ids.iter().all(|id| doc_ids.contains(id)),
            IdMatchMode::Exact => {
                self.ids.iter().all(|id| doc_ids.contains(id))
                    && doc_ids.iter().all(|id| self.ids.contains(id))
            }
            IdMatchMode::None => !self.ids.iter().any(|id| doc_ids.contains(id)),
        }
    }
}

/// Result ordering for a search.
///
/// A closed set of orderings replaces free-form sort fragments; every
/// ordering falls back to ascending object id, then version id, so results
/// are stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SortOrder {
    /// Ascending object id (the default).
    #[default]
    ObjectIdAsc,
    /// Descending object id.
    ObjectIdDesc,
    /// Ascending name.
    NameAsc,
    /// Descending name.
    NameDesc,
    /// Ascending version-from instant.
    VersionFromAsc,
    /// Descending version-from instant.
    VersionFromDesc,
}

/// Offset/size paging for a query.
///
/// A zero-size page instructs the store to compute the total count while
/// skipping the row fetch entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// Index of the first row to return.
    pub offset: usize,
    /// Maximum number of rows to return.
    pub size: usize,
}

impl Page {
    /// A count-only page: zero rows fetched.
    pub const NONE: Page = Page { offset: 0, size: 0 };

    /// A page covering all rows.
    pub const ALL: Page = Page {
        offset: 0,
        size: usize::MAX,
    };

    /// Creates a page.
    #[must_use]
    pub const fn new(offset: usize, size: usize) -> Self {
        Self { offset, size }
    }
}

/// A point-in-time document search.
///
/// All populated predicates are conjunctive. Bitemporal visibility at the
/// fixed `(version_as_of, corrected_to)` pair is always part of the query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocQuery {
    /// Version (valid-time) instant, already resolved from "latest".
    pub version_as_of: Timestamp,
    /// Correction (system-time) instant, already resolved from "latest".
    pub corrected_to: Timestamp,
    /// Object-id membership list. `None` means unrestricted; an empty list
    /// matches nothing.
    pub object_ids: Option<Vec<ObjectId>>,
    /// External-identifier predicate.
    pub identifier_search: Option<IdentifierSearch>,
    /// Wildcard over identifier values only, any scheme.
    pub identifier_value: Option<ValueMatch>,
    /// Wildcard over identifier schemes only, any value.
    pub identifier_scheme: Option<ValueMatch>,
    /// Attribute predicates; every entry must match.
    pub attributes: Vec<(String, ValueMatch)>,
    /// Indexed-property predicates; every entry must match.
    pub properties: Vec<(String, ValueMatch)>,
    /// Name predicate.
    pub name: Option<ValueMatch>,
    /// Exact main-type discriminator.
    pub main_type: Option<char>,
    /// Exact sub-type.
    pub sub_type: Option<String>,
    /// Exact actual-type.
    pub actual_type: Option<String>,
    /// Result ordering.
    pub sort: SortOrder,
    /// Paging.
    pub page: Page,
}

impl DocQuery {
    /// Creates a query matching everything visible at the instant pair.
    pub fn at(version_as_of: Timestamp, corrected_to: Timestamp) -> Self {
        Self {
            version_as_of,
            corrected_to,
            object_ids: None,
            identifier_search: None,
            identifier_value: None,
            identifier_scheme: None,
            attributes: Vec::new(),
            properties: Vec::new(),
            name: None,
            main_type: None,
            sub_type: None,
            actual_type: None,
            sort: SortOrder::default(),
            page: Page::ALL,
        }
    }
}

/// A bitemporal history query for one object.
///
/// Bounds are ranges over each axis; `None` leaves a side unbounded. When
/// both bounds of an axis are equal the axis collapses to a point query at
/// that instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryQuery {
    /// The object whose audit trail is requested.
    pub object_id: ObjectId,
    /// Lower bound of the version range.
    pub versions_from: Option<Timestamp>,
    /// Upper bound of the version range.
    pub versions_to: Option<Timestamp>,
    /// Lower bound of the correction range.
    pub corrections_from: Option<Timestamp>,
    /// Upper bound of the correction range.
    pub corrections_to: Option<Timestamp>,
    /// Paging.
    pub page: Page,
}

impl HistoryQuery {
    /// Creates an unbounded history query for an object.
    pub fn all_of(object_id: ObjectId) -> Self {
        Self {
            object_id,
            versions_from: None,
            versions_to: None,
            corrections_from: None,
            corrections_to: None,
            page: Page::ALL,
        }
    }

    /// Returns true if the row falls inside both axis windows.
    #[must_use]
    pub fn covers(&self, row: &DocumentRow) -> bool {
        axis_covers(
            self.versions_from,
            self.versions_to,
            row.ver_from,
            row.ver_to,
        ) && axis_covers(
            self.corrections_from,
            self.corrections_to,
            row.corr_from,
            row.corr_to,
        )
    }
}

/// Range/point window test for one time axis.
///
/// Equal bounds collapse to a point: the row's interval must contain the
/// instant. Otherwise the row's interval must overlap the (half-open,
/// possibly unbounded) range.
fn axis_covers(
    from: Option<Timestamp>,
    to: Option<Timestamp>,
    row_from: Timestamp,
    row_to: Timestamp,
) -> bool {
    match (from, to) {
        (Some(f), Some(t)) if f == t => row_from <= f && f < row_to,
        (f, t) => {
            t.map_or(true, |t| row_from < t) && f.map_or(true, |f| f < row_to)
        }
    }
}

/// Rows plus the total count matching a query before paging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryResult {
    /// Total matching rows, ignoring paging.
    pub total: usize,
    /// The fetched page of rows, in query order. Empty for count-only pages.
    pub rows: Vec<DocumentRow>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::VersionId;
    use proptest::prelude::*;

    #[test]
    fn wildcard_star() {
        let p = WildcardPattern::new("EUR*");
        assert!(p.matches("EUR"));
        assert!(p.matches("EUR Cash"));
        assert!(!p.matches("USD Cash"));
    }

    #[test]
    fn wildcard_question_mark() {
        let p = WildcardPattern::new("A?C");
        assert!(p.matches("ABC"));
        assert!(p.matches("AxC"));
        assert!(!p.matches("AC"));
        assert!(!p.matches("ABBC"));
    }

    #[test]
    fn wildcard_interior_star() {
        let p = WildcardPattern::new("a*b*c");
        assert!(p.matches("abc"));
        assert!(p.matches("axxbxxc"));
        assert!(!p.matches("ab"));
    }

    #[test]
    fn wildcard_literal_only() {
        let p = WildcardPattern::new("plain");
        assert!(p.matches("plain"));
        assert!(!p.matches("plainer"));
    }

    #[test]
    fn value_match_auto_detects_wildcards() {
        assert!(matches!(ValueMatch::for_value("EUR"), ValueMatch::Exact(_)));
        assert!(matches!(
            ValueMatch::for_value("EUR*"),
            ValueMatch::Wildcard(_)
        ));
        assert!(matches!(
            ValueMatch::for_value("E?R"),
            ValueMatch::Wildcard(_)
        ));
    }

    #[test]
    fn identifier_match_modes() {
        let a = ExternalId::new("TICKER", "AAPL");
        let b = ExternalId::new("ISIN", "US0378331005");
        let c = ExternalId::new("CUSIP", "037833100");
        let doc = vec![a.clone(), b.clone()];

        let any = IdentifierSearch::new(vec![a.clone(), c.clone()], IdMatchMode::Any);
        assert!(any.matches(&doc));

        let all = IdentifierSearch::new(vec![a.clone(), c.clone()], IdMatchMode::All);
        assert!(!all.matches(&doc));
        let all = IdentifierSearch::new(vec![a.clone(), b.clone()], IdMatchMode::All);
        assert!(all.matches(&doc));

        let exact = IdentifierSearch::new(vec![a.clone(), b.clone()], IdMatchMode::Exact);
        assert!(exact.matches(&doc));
        let exact = IdentifierSearch::new(vec![a.clone()], IdMatchMode::Exact);
        assert!(!exact.matches(&doc));

        let none = IdentifierSearch::new(vec![c], IdMatchMode::None);
        assert!(none.matches(&doc));
        let none = IdentifierSearch::new(vec![a], IdMatchMode::None);
        assert!(!none.matches(&doc));
    }

    #[test]
    fn history_axis_point_and_range() {
        let row = DocumentRow {
            version_id: VersionId::new(1),
            object_id: ObjectId::new(1),
            ver_from: Timestamp::from_millis(100),
            ver_to: Timestamp::from_millis(200),
            corr_from: Timestamp::from_millis(100),
            corr_to: Timestamp::MAX_INSTANT,
            name: String::new(),
            main_type: 'T',
            sub_type: String::new(),
            actual_type: String::new(),
            payload: Vec::new(),
        };
        let t = Timestamp::from_millis;

        // Point on the version axis.
        let mut q = HistoryQuery::all_of(ObjectId::new(1));
        q.versions_from = Some(t(150));
        q.versions_to = Some(t(150));
        assert!(q.covers(&row));
        q.versions_from = Some(t(200));
        q.versions_to = Some(t(200));
        assert!(!q.covers(&row));

        // Range overlap.
        q.versions_from = Some(t(150));
        q.versions_to = Some(t(500));
        assert!(q.covers(&row));
        q.versions_from = Some(t(200));
        q.versions_to = Some(t(500));
        assert!(!q.covers(&row));

        // Unbounded matches everything.
        assert!(HistoryQuery::all_of(ObjectId::new(1)).covers(&row));
    }

    proptest! {
        #[test]
        fn exact_patterns_only_match_themselves(s in "[a-z]{0,8}", other in "[a-z]{0,8}") {
            let p = WildcardPattern::new(s.clone());
            prop_assert!(p.matches(&s));
            prop_assert_eq!(p.matches(&other), s == other);
        }

        #[test]
        fn star_prefix_matches_any_suffix(prefix in "[a-z]{1,5}", suffix in "[a-z]{0,8}") {
            let p = WildcardPattern::new(format!("{prefix}*"));
            let candidate = format!("{prefix}{suffix}");
            prop_assert!(p.matches(&candidate));
        }

        #[test]
        fn lone_star_matches_everything(s in "\\PC{0,16}") {
            prop_assert!(WildcardPattern::new("*").matches(&s));
        }
    }
}
