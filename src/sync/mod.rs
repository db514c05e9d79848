//! Commit synchronizer: keeps registered entity types' indexes consistent
//! with the record store's committed state.
//!
//! The store drives two ordered events per transaction: a before-commit event
//! that captures the [`ChangeSet`], and an after-commit event carrying the
//! commit outcome. Capture failures abort the commit (fail closed); apply
//! failures after a successful commit are reported, never propagated (fail
//! open), because the store transaction cannot be undone at that point.
//!
//! Index updates for different entity types in one commit are applied
//! independently; there is no cross-index atomicity. A failure in between
//! leaves one index stale until `reindex`.

pub mod changes;

use std::sync::Arc;

use dashmap::DashMap;

use crate::entity::{EntityType, RecordSnapshot};
use crate::error::{SyncError, SyncResult};
use crate::searcher::{ResultWindow, Searcher};
use crate::store::RecordStore;

pub use changes::{ChangeSet, ChangeTracking, CommitOutcome, SyncReport, SyncSession};

/// Drives index maintenance from transaction lifecycle events and exposes
/// reindex and record-returning search.
pub struct Synchronizer {
    searcher: Searcher,
    registrations: DashMap<String, Arc<EntityType>>,
}

impl Synchronizer {
    #[must_use]
    pub fn new(searcher: Searcher) -> Self {
        Synchronizer {
            searcher,
            registrations: DashMap::new(),
        }
    }

    #[must_use]
    pub fn searcher(&self) -> &Searcher {
        &self.searcher
    }

    /// Register an entity type for indexing. Only registered types are touched
    /// by the post-commit apply; records of other types in the same
    /// transaction are ignored.
    pub fn register(&self, entity: EntityType) -> Arc<EntityType> {
        let entity = Arc::new(entity);
        self.registrations
            .insert(entity.name().to_string(), entity.clone());
        tracing::info!(entity = %entity.name(), "Entity type registered for indexing");
        entity
    }

    /// Look up a registered entity type by name.
    #[must_use]
    pub fn registration(&self, name: &str) -> Option<Arc<EntityType>> {
        self.registrations.get(name).map(|entry| entry.value().clone())
    }

    /// Before-commit hook: capture the transaction's change set while the
    /// store's tracking state is still reliable, and stash it on the session.
    ///
    /// An error here must abort the enclosing commit.
    pub fn before_commit(
        &self,
        session: &mut SyncSession,
        tracker: &dyn ChangeTracking,
    ) -> SyncResult<()> {
        let changes = ChangeSet::capture(tracker)?;
        tracing::debug!(
            added = changes.added.len(),
            updated = changes.updated.len(),
            deleted = changes.deleted.len(),
            "Change set captured before commit"
        );
        session.stash(changes);
        Ok(())
    }

    /// After-commit hook: apply the stashed change set if the commit
    /// succeeded, and clear it regardless of outcome.
    pub async fn after_commit(
        &self,
        session: &mut SyncSession,
        outcome: CommitOutcome,
    ) -> SyncReport {
        let mut report = SyncReport::default();
        let Some(changes) = session.take() else {
            return report;
        };

        if outcome == CommitOutcome::RolledBack {
            tracing::debug!(
                discarded = changes.len(),
                "Commit rolled back, change set discarded"
            );
            return report;
        }

        for snapshot in changes.added.iter().chain(changes.updated.iter()) {
            self.apply_upsert(snapshot, &mut report).await;
        }
        for snapshot in &changes.deleted {
            self.apply_remove(snapshot, &mut report).await;
        }

        if !report.is_clean() {
            tracing::warn!(
                failures = report.failures.len(),
                "Post-commit index sync left the index partially stale; reindex to recover"
            );
        }
        report
    }

    async fn apply_upsert(&self, snapshot: &RecordSnapshot, report: &mut SyncReport) {
        let Some(entity) = self.registration(&snapshot.entity) else {
            report.skipped += 1;
            return;
        };
        let doc = entity.project(snapshot);
        match self.searcher.upsert(&entity, doc).await {
            Ok(()) => report.upserted += 1,
            Err(e) => {
                tracing::warn!(entity = %snapshot.entity, id = %snapshot.id, error = %e, "Upsert failed after commit");
                report.failures.push(SyncError::PartialSync {
                    entity: snapshot.entity.clone(),
                    id: snapshot.id.to_string(),
                    message: e.to_string(),
                });
            }
        }
    }

    async fn apply_remove(&self, snapshot: &RecordSnapshot, report: &mut SyncReport) {
        let Some(entity) = self.registration(&snapshot.entity) else {
            report.skipped += 1;
            return;
        };
        match self.searcher.remove(&entity, &snapshot.id).await {
            Ok(()) => report.removed += 1,
            Err(e) => {
                tracing::warn!(entity = %snapshot.entity, id = %snapshot.id, error = %e, "Remove failed after commit");
                report.failures.push(SyncError::PartialSync {
                    entity: snapshot.entity.clone(),
                    id: snapshot.id.to_string(),
                    message: e.to_string(),
                });
            }
        }
    }

    /// Full rebuild: reset the physical index from the current declared field
    /// set, then upsert every record the store currently holds. Not
    /// incremental, no resumability. Returns the number of records indexed.
    pub async fn reindex<S: RecordStore>(
        &self,
        store: &S,
        entity: &EntityType,
    ) -> SyncResult<usize> {
        self.searcher.registry().reset_index(entity)?;

        let snapshots = store.scan(entity).await?;
        let total = snapshots.len();
        for snapshot in snapshots {
            let doc = entity.project(&snapshot);
            self.searcher.upsert(entity, doc).await?;
        }

        tracing::info!(entity = %entity.name(), records = total, "Reindex complete");
        Ok(total)
    }

    /// Ranked search returning an ordered view of canonical records.
    ///
    /// Zero matches yield the store's match-nothing selection paired with
    /// `0`, never an error. Otherwise the store selects exactly the returned
    /// identifiers ordered by rank, not by its native ordering, and the total
    /// match count (which may exceed the page) rides alongside.
    pub async fn search<S: RecordStore>(
        &self,
        store: &S,
        entity: &EntityType,
        field: &str,
        term: &str,
        window: ResultWindow,
    ) -> SyncResult<(S::Selection, usize)> {
        let hits = self.searcher.query(entity, field, term, window).await?;
        if hits.total == 0 {
            return Ok((store.select_none(entity), 0));
        }

        let selection = store.select_ranked(entity, &hits.ids()).await?;
        Ok((selection, hits.total))
    }
}
