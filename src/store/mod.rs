//! Record store collaborator contract.
//!
//! The core never owns record persistence; it needs exactly three things from
//! a store: a match-nothing selection, a selection of specific identifiers
//! ordered by an explicit identifier→rank mapping, and a full scan for
//! reindexing. [`sqlite`] provides the reference implementation.

pub mod sqlite;

use crate::entity::{EntityType, RecordId, RecordSnapshot};
use crate::error::SyncResult;

pub use sqlite::{SqliteRecordStore, StoreTransaction};

/// A queryable collection of records with stable identifiers.
#[allow(async_fn_in_trait)]
pub trait RecordStore {
    /// An ordered, filtered view of records produced for search results.
    type Selection;

    /// A selection guaranteed to match no records. Always valid, never fails.
    fn select_none(&self, entity: &EntityType) -> Self::Selection;

    /// Select exactly `ranked_ids`, ordered by their position in the slice
    /// (the rank order), not by the store's native ordering.
    async fn select_ranked(
        &self,
        entity: &EntityType,
        ranked_ids: &[RecordId],
    ) -> SyncResult<Self::Selection>;

    /// Every currently stored record of the entity type, for reindexing.
    async fn scan(&self, entity: &EntityType) -> SyncResult<Vec<RecordSnapshot>>;
}
