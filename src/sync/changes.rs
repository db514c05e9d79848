//! Transaction-scoped change capture.
//!
//! The record store's change-tracking state is only trustworthy before its
//! commit boundary, so the synchronizer snapshots it into a [`ChangeSet`] at
//! pre-commit and stashes it on the caller-owned [`SyncSession`]. Post-commit
//! drains the session on every path, so no change set ever survives into the
//! next transaction.

use crate::entity::RecordSnapshot;
use crate::error::{SyncError, SyncResult};

/// Per-transaction visibility into newly created, modified, and deleted
/// records, implemented by the record store's session or transaction object.
pub trait ChangeTracking {
    fn added(&self) -> SyncResult<Vec<RecordSnapshot>>;
    fn modified(&self) -> SyncResult<Vec<RecordSnapshot>>;
    fn deleted(&self) -> SyncResult<Vec<RecordSnapshot>>;
}

/// Ephemeral snapshot of one transaction's record mutations, captured at the
/// pre-commit boundary. Never persisted, never shared across transactions.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    pub added: Vec<RecordSnapshot>,
    pub updated: Vec<RecordSnapshot>,
    pub deleted: Vec<RecordSnapshot>,
}

impl ChangeSet {
    /// Capture the three collections from the store's change tracking. Any
    /// tracking failure becomes [`SyncError::CaptureFailed`], which aborts the
    /// enclosing commit.
    pub fn capture(tracker: &dyn ChangeTracking) -> SyncResult<Self> {
        let capture_err = |e: SyncError| SyncError::CaptureFailed(e.to_string());
        Ok(ChangeSet {
            added: tracker.added().map_err(capture_err)?,
            updated: tracker.modified().map_err(capture_err)?,
            deleted: tracker.deleted().map_err(capture_err)?,
        })
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.added.len() + self.updated.len() + self.deleted.len()
    }
}

/// Outcome of the store's own commit, reported to the post-commit handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed,
    RolledBack,
}

/// Caller-owned state for one transaction's hook sequence.
///
/// State machine: `idle → captured (before-commit) → idle (after-commit,
/// applied or discarded)`. The session holds nothing outside that window.
#[derive(Debug, Default)]
pub struct SyncSession {
    pending: Option<ChangeSet>,
}

impl SyncSession {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn stash(&mut self, changes: ChangeSet) {
        self.pending = Some(changes);
    }

    pub(crate) fn take(&mut self) -> Option<ChangeSet> {
        self.pending.take()
    }

    /// True between before-commit and after-commit.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }
}

/// What the post-commit apply actually did. Failures here are fail-open: the
/// store transaction is already committed, so they are reported rather than
/// propagated, and `reindex` is the recovery path.
#[derive(Debug, Default)]
pub struct SyncReport {
    pub upserted: usize,
    pub removed: usize,
    /// Records of types not registered for indexing, ignored by design.
    pub skipped: usize,
    pub failures: Vec<SyncError>,
}

impl SyncReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}
