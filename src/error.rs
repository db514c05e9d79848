//! Error types for index synchronization and search.
//!
//! One error enum covers the whole crate so the commit-hook paths can report
//! mixed failures in a single [`SyncReport`](crate::sync::SyncReport).

use thiserror::Error;

/// Result type alias for synchronization and search operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Error types for synchronization and search operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Index storage could not be created or opened. Fatal, no retry.
    #[error("Search index unavailable: {0}")]
    IndexUnavailable(String),

    /// The on-disk index schema no longer matches the declared field set.
    #[error("Index schema for '{entity}' no longer matches its declared field set; reindex required")]
    SchemaDrift { entity: String },

    /// Query text failed to parse against the requested field.
    #[error("Invalid query '{query}' against field '{field}': {message}")]
    QuerySyntax {
        field: String,
        query: String,
        message: String,
    },

    /// Field not present in the entity's index schema.
    #[error("Field '{0}' not found in index schema")]
    FieldNotFound(String),

    /// An after-commit index update failed once the store transaction had
    /// already committed. The store and the index now disagree for this
    /// record until a reindex.
    #[error("Index update for {entity}/{id} failed after commit: {message}")]
    PartialSync {
        entity: String,
        id: String,
        message: String,
    },

    /// Change-set capture failed before commit. Aborts the enclosing commit.
    #[error("Change capture failed before commit: {0}")]
    CaptureFailed(String),

    /// Record store collaborator error.
    #[error("Record store error: {0}")]
    Store(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Tantivy error wrapper
    #[error("Tantivy error: {0}")]
    Tantivy(#[from] tantivy::TantivyError),

    /// Blocking-pool task failed to run to completion.
    #[error("Index task failed: {0}")]
    Task(String),
}

impl From<sqlx::Error> for SyncError {
    fn from(error: sqlx::Error) -> Self {
        SyncError::Store(error.to_string())
    }
}

impl SyncError {
    /// Check if a full reindex is the documented recovery path.
    #[must_use]
    pub fn needs_reindex(&self) -> bool {
        matches!(
            self,
            SyncError::SchemaDrift { .. } | SyncError::PartialSync { .. }
        )
    }

    /// Check if this error must abort the enclosing store commit
    /// (fail-closed capture) rather than being reported after the fact.
    #[must_use]
    pub fn aborts_commit(&self) -> bool {
        matches!(self, SyncError::CaptureFailed(_))
    }
}
