//! Search and history requests.
//!
//! Requests are the typed, injection-safe face of the query model: callers
//! fill in values and modes, never query text. The engine compiles a request
//! into a [`DocQuery`] or [`HistoryQuery`] after resolving "latest" instants.

use crate::adapter::Document;
use crate::error::{MasterError, MasterResult};
use crate::types::VersionCorrection;
use bitempo_storage::{
    DocQuery, HistoryQuery, IdentifierSearch, ObjectId, Page, SortOrder, Timestamp, ValueMatch,
};

/// A point-in-time document search.
///
/// The bitemporal locator and the paging are mandatory and set at
/// construction; every other filter is optional and conjunctive.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    /// The bitemporal locator.
    pub version_correction: VersionCorrection,
    /// Paging. A zero-size page requests the count only.
    pub paging: Page,
    /// Object-id filter. `None` is unrestricted; `Some(empty)` matches
    /// nothing and short-circuits without a storage round trip.
    pub object_ids: Option<Vec<ObjectId>>,
    /// External-identifier predicate.
    pub identifier_search: Option<IdentifierSearch>,
    /// Wildcard over identifier values, any scheme.
    pub identifier_value: Option<String>,
    /// Wildcard over identifier schemes, any value.
    pub identifier_scheme: Option<String>,
    /// Attribute filters; every entry must match. Values may hold wildcards.
    pub attributes: Vec<(String, String)>,
    /// Indexed-property filters; every entry must match.
    pub properties: Vec<(String, String)>,
    /// Name filter, wildcard-aware.
    pub name: Option<String>,
    /// Exact sub-type filter.
    pub sub_type: Option<String>,
    /// Exact actual-type filter.
    pub actual_type: Option<String>,
    /// Result ordering.
    pub sort: SortOrder,
}

impl SearchRequest {
    /// Creates a request with the mandatory fields, all filters clear.
    #[must_use]
    pub fn new(version_correction: VersionCorrection, paging: Page) -> Self {
        Self {
            version_correction,
            paging,
            object_ids: None,
            identifier_search: None,
            identifier_value: None,
            identifier_scheme: None,
            attributes: Vec::new(),
            properties: Vec::new(),
            name: None,
            sub_type: None,
            actual_type: None,
            sort: SortOrder::default(),
        }
    }

    /// Creates an unpaged latest/latest request.
    #[must_use]
    pub fn latest() -> Self {
        Self::new(VersionCorrection::LATEST, Page::ALL)
    }

    /// Restricts the search to the given object, keeping prior restrictions.
    pub fn add_object_id(&mut self, object_id: ObjectId) {
        self.object_ids.get_or_insert_with(Vec::new).push(object_id);
    }

    /// Adds an attribute filter.
    pub fn add_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attributes.push((key.into(), value.into()));
    }

    /// Adds an indexed-property filter.
    pub fn add_property(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.properties.push((key.into(), value.into()));
    }

    /// Compiles the request into a store query at the fixed instant pair.
    ///
    /// Fails with a validation error if any attribute or property filter
    /// carries an empty key or value.
    pub(crate) fn compile(
        &self,
        version_as_of: Timestamp,
        corrected_to: Timestamp,
        main_type: char,
    ) -> MasterResult<DocQuery> {
        let mut query = DocQuery::at(version_as_of, corrected_to);
        query.main_type = Some(main_type);
        query.object_ids = self.object_ids.clone();
        query.identifier_search = self.identifier_search.clone();
        query.identifier_value = self.identifier_value.as_deref().map(ValueMatch::for_value);
        query.identifier_scheme = self.identifier_scheme.as_deref().map(ValueMatch::for_value);
        query.attributes = compile_pairs("attribute", &self.attributes)?;
        query.properties = compile_pairs("property", &self.properties)?;
        query.name = self.name.as_deref().map(ValueMatch::for_value);
        query.sub_type = self.sub_type.clone();
        query.actual_type = self.actual_type.clone();
        query.sort = self.sort;
        query.page = self.paging;
        Ok(query)
    }
}

fn compile_pairs(
    kind: &str,
    pairs: &[(String, String)],
) -> MasterResult<Vec<(String, ValueMatch)>> {
    pairs
        .iter()
        .map(|(key, value)| {
            if key.is_empty() || value.is_empty() {
                return Err(MasterError::validation(format!(
                    "{kind} filters must not have empty keys or values"
                )));
            }
            Ok((key.clone(), ValueMatch::for_value(value.as_str())))
        })
        .collect()
}

/// A bitemporal history request for one object.
///
/// `None` bounds leave an axis side unbounded; equal bounds collapse that
/// axis to a point query.
#[derive(Debug, Clone, Copy)]
pub struct HistoryRequest {
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
    pub paging: Page,
}

impl HistoryRequest {
    /// Creates an unbounded history request.
    #[must_use]
    pub fn all_of(object_id: ObjectId) -> Self {
        Self {
            object_id,
            versions_from: None,
            versions_to: None,
            corrections_from: None,
            corrections_to: None,
            paging: Page::ALL,
        }
    }

    pub(crate) fn compile(&self) -> HistoryQuery {
        let mut query = HistoryQuery::all_of(self.object_id);
        query.versions_from = self.versions_from;
        query.versions_to = self.versions_to;
        query.corrections_from = self.corrections_from;
        query.corrections_to = self.corrections_to;
        query.page = self.paging;
        query
    }
}

/// A page of documents plus the total match count before paging.
#[derive(Debug, Clone)]
pub struct SearchResult<P> {
    /// Total matches, ignoring paging.
    pub total: usize,
    /// The fetched page, in request order.
    pub documents: Vec<Document<P>>,
}

impl<P> SearchResult<P> {
    /// An empty result.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            total: 0,
            documents: Vec::new(),
        }
    }

    /// The first document of the page, if any.
    #[must_use]
    pub fn first(&self) -> Option<&Document<P>> {
        self.documents.first()
    }
}
