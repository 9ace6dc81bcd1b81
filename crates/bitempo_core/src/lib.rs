//! # Bitempo Core
//!
//! A generic **bitemporal document master**: stores arbitrary domain
//! payloads with complete, queryable audit history along two independent
//! time axes.
//!
//! - The **version** (valid-time) axis records when each state of an object
//!   applied in the real world
//! - The **correction** (system-time) axis records when the database learned
//!   of each state, so mistakes are fixed without erasing what was believed
//!   before
//!
//! Every mutation closes intervals on current rows and inserts fresh rows;
//! history is never rewritten. For any object and any fixed instant pair at
//! most one row is visible.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use bitempo_core::{Document, DocumentMaster, MasterConfig, VersionCorrection};
//! use bitempo_storage::InMemoryStore;
//! use std::sync::Arc;
//!
//! let master = DocumentMaster::new(
//!     Arc::new(InMemoryStore::new()),
//!     MyAdapter,
//!     MasterConfig::new("MySec"),
//! );
//!
//! let added = master.add(Document::new(my_payload))?;
//! let latest = master.get_at(added.object_id().unwrap(), VersionCorrection::LATEST)?;
//! ```
//!
//! ## Extension points
//!
//! - [`DocumentAdapter`] - the one trait a document type implements:
//!   metadata extraction plus payload encode/decode
//! - [`bitempo_storage::DocStore`] - the storage collaborator;
//!   [`bitempo_storage::InMemoryStore`] is the reference implementation
//! - [`MetricSink`] - operation timing; [`NoopMetrics`] by default
//! - [`Clock`] - the time source; [`FixedClock`] for tests

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod adapter;
mod change;
mod engine;
mod error;
mod extract;
mod master;
mod metrics;
mod search;
mod time;
mod types;
mod versions;

pub use adapter::{Document, DocumentAdapter, ExternalIdBundle};
pub use change::{ChangeEvent, ChangeFeed, ChangeKind};
pub use engine::DocumentEngine;
pub use error::{MasterError, MasterResult};
pub use master::{DocumentMaster, MasterConfig};
pub use metrics::{MasterOp, MasterStats, MetricSink, NoopMetrics};
pub use search::{HistoryRequest, SearchRequest, SearchResult};
pub use time::{Clock, FixedClock, SystemClock};
pub use types::{Instant, UniqueId, VersionCorrection};

pub use bitempo_storage::{
    ExternalId, IdMatchMode, IdentifierSearch, ObjectId, Page, SortOrder, Timestamp, VersionId,
};
