//! # Bitempo Storage
//!
//! Storage boundary for the bitempo bitemporal document master.
//!
//! This crate defines the data model shared between the master engine and
//! its backing store, and the [`DocStore`] trait that a store implements.
//! Stores are **table engines**: they hold versioned document rows plus the
//! deduplicated side tables for external identifiers, attributes and indexed
//! properties, and they execute typed, parameterized queries.
//!
//! ## Design Principles
//!
//! - The engine never builds query text; it builds typed predicate values
//!   ([`DocQuery`], [`HistoryQuery`]) that the store evaluates
//! - Every multi-row write happens inside a [`StoreTxn`] and is atomic
//! - Shared pair tables carry a uniqueness constraint; violating it is a
//!   retryable [`StoreError::Conflict`]
//! - Stores must be `Send + Sync` for concurrent access
//!
//! ## Available Stores
//!
//! - [`InMemoryStore`] - reference implementation, suitable for tests and
//!   ephemeral masters

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod memory;
mod query;
mod row;
mod store;

pub use error::{StoreError, StoreResult};
pub use memory::InMemoryStore;
pub use query::{
    DocQuery, HistoryQuery, IdMatchMode, IdentifierSearch, Page, QueryResult, SortOrder,
    ValueMatch, WildcardPattern,
};
pub use row::{DocumentRow, ExternalId, KeyId, ObjectId, Timestamp, VersionId};
pub use store::{DocStore, StoreTxn};
