//! Keeps per-entity-type full-text indexes synchronized with a transactional
//! record store, and answers ranked queries as ordered views of canonical
//! records.
//!
//! Three components, leaves first:
//!
//! - [`IndexRegistry`]: entity-type name → physical tantivy index, created
//!   lazily under a configured root from the type's declared searchable
//!   fields.
//! - [`Searcher`]: upsert, remove, and ranked query against a single entity
//!   type's index.
//! - [`Synchronizer`]: observes a transaction's pre-commit and post-commit
//!   boundaries, captures the change set while the store's tracking state is
//!   still reliable, applies it to the index once the commit succeeds, and
//!   maps ranked identifiers back onto the record store in rank order.
//!
//! Consistency model: capture failures abort the commit; apply failures after
//! a successful commit are reported and recovered by [`Synchronizer::reindex`].
//! Index updates for different entity types in one commit are applied
//! independently; there is no cross-index atomicity.

pub mod config;
pub mod entity;
pub mod error;
pub mod registry;
pub mod searcher;
pub mod store;
pub mod sync;

mod schema;

pub use config::{ConfigError, SyncConfig, SyncConfigBuilder};
pub use entity::{Document, EntityType, FieldKind, FieldValue, RecordId, RecordSnapshot};
pub use error::{SyncError, SyncResult};
pub use registry::{IndexHandle, IndexRegistry};
pub use searcher::{RankedHit, ResultWindow, SearchHits, Searcher};
pub use store::{RecordStore, SqliteRecordStore, StoreTransaction};
pub use sync::{ChangeSet, ChangeTracking, CommitOutcome, SyncReport, SyncSession, Synchronizer};
