//! SQLite reference implementation of the record store contract.
//!
//! Uses SQLite with WAL mode for concurrent reads during writes and ACID
//! transactions. One table per entity type, TEXT primary key, one TEXT column
//! per declared searchable field. [`StoreTransaction`] buffers record writes
//! and drives the synchronizer's commit protocol: capture before commit (fail
//! closed), apply SQL and commit, then report the real outcome after commit.
//!
//! Rank-preserving selection renders `ORDER BY CASE` over the identifier so
//! the relevance order survives the store's native key ordering.

use std::path::Path;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};

use crate::entity::{EntityType, FieldKind, FieldValue, RecordId, RecordSnapshot};
use crate::error::{SyncError, SyncResult};
use crate::store::RecordStore;
use crate::sync::{ChangeTracking, CommitOutcome, SyncReport, SyncSession, Synchronizer};

/// Identifiers per ranked-select statement. Each identifier binds twice (IN
/// list plus CASE arm) and SQLite caps bound parameters per statement, so
/// larger selections are split; chunks are visited in rank order, which keeps
/// the concatenated result ranked.
const RANKED_SELECT_CHUNK: usize = 500;

/// Record store over a WAL-mode SQLite database.
#[derive(Clone)]
pub struct SqliteRecordStore {
    pool: SqlitePool,
}

impl SqliteRecordStore {
    /// Open the database at `db_path`, creating it if missing.
    pub async fn open(db_path: &Path) -> SyncResult<Self> {
        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                SyncError::Store(format!("Failed to create database directory: {e}"))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| SyncError::Store(format!("Failed to open SQLite database: {e}")))?;

        Ok(SqliteRecordStore { pool })
    }

    /// Create the entity's table if it does not exist. Idempotent.
    pub async fn ensure_table(&self, entity: &EntityType) -> SyncResult<()> {
        let mut columns = vec![format!("{} TEXT PRIMARY KEY", quote_ident(entity.id_field()))];
        for (name, _) in entity.searchable_fields() {
            if name == entity.id_field() {
                continue;
            }
            columns.push(format!("{} TEXT", quote_ident(name)));
        }
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            quote_ident(entity.name()),
            columns.join(", ")
        );
        sqlx::query(&sql).execute(&self.pool).await?;
        Ok(())
    }

    /// Begin a buffered transaction carrying its own sync session.
    #[must_use]
    pub fn begin(&self) -> StoreTransaction<'_> {
        StoreTransaction {
            store: self,
            staged: Vec::new(),
            session: SyncSession::new(),
        }
    }
}

impl RecordStore for SqliteRecordStore {
    type Selection = Vec<RecordSnapshot>;

    fn select_none(&self, _entity: &EntityType) -> Self::Selection {
        Vec::new()
    }

    async fn select_ranked(
        &self,
        entity: &EntityType,
        ranked_ids: &[RecordId],
    ) -> SyncResult<Self::Selection> {
        let mut selection = Vec::with_capacity(ranked_ids.len());
        let id_col = quote_ident(entity.id_field());

        for chunk in ranked_ids.chunks(RANKED_SELECT_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(", ");

            // The store's native order is by primary key; relevance order has
            // to be spelled out as an explicit identifier-to-rank mapping.
            let mut rank_case = format!("CASE {id_col}");
            for rank in 0..chunk.len() {
                rank_case.push_str(&format!(" WHEN ? THEN {rank}"));
            }
            rank_case.push_str(" END");

            let sql = format!(
                "SELECT {} FROM {} WHERE {id_col} IN ({placeholders}) ORDER BY {rank_case}",
                select_columns(entity),
                quote_ident(entity.name()),
            );

            let mut query = sqlx::query(&sql);
            for id in chunk {
                query = query.bind(id.as_str());
            }
            for id in chunk {
                query = query.bind(id.as_str());
            }

            let rows = query.fetch_all(&self.pool).await?;
            for row in &rows {
                selection.push(snapshot_from_row(entity, row)?);
            }
        }

        Ok(selection)
    }

    async fn scan(&self, entity: &EntityType) -> SyncResult<Vec<RecordSnapshot>> {
        let sql = format!(
            "SELECT {} FROM {}",
            select_columns(entity),
            quote_ident(entity.name())
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| snapshot_from_row(entity, row))
            .collect()
    }
}

#[derive(Debug, Clone)]
enum StagedOp {
    Insert {
        entity: EntityType,
        snapshot: RecordSnapshot,
    },
    Update {
        entity: EntityType,
        snapshot: RecordSnapshot,
    },
    Delete {
        entity: EntityType,
        snapshot: RecordSnapshot,
    },
}

/// Change-tracking view over the staged operations, handed to the
/// synchronizer at the pre-commit boundary.
struct StagedChanges<'a>(&'a [StagedOp]);

impl ChangeTracking for StagedChanges<'_> {
    fn added(&self) -> SyncResult<Vec<RecordSnapshot>> {
        Ok(self
            .0
            .iter()
            .filter_map(|op| match op {
                StagedOp::Insert { snapshot, .. } => Some(snapshot.clone()),
                _ => None,
            })
            .collect())
    }

    fn modified(&self) -> SyncResult<Vec<RecordSnapshot>> {
        Ok(self
            .0
            .iter()
            .filter_map(|op| match op {
                StagedOp::Update { snapshot, .. } => Some(snapshot.clone()),
                _ => None,
            })
            .collect())
    }

    fn deleted(&self) -> SyncResult<Vec<RecordSnapshot>> {
        Ok(self
            .0
            .iter()
            .filter_map(|op| match op {
                StagedOp::Delete { snapshot, .. } => Some(snapshot.clone()),
                _ => None,
            })
            .collect())
    }
}

/// A buffered unit of work against the SQLite store.
///
/// Record writes accumulate until [`commit`](StoreTransaction::commit), which
/// runs the full hook sequence: before-commit capture, SQL apply in one
/// database transaction, then after-commit with the real outcome. Dropping
/// the transaction without committing indexes nothing.
pub struct StoreTransaction<'a> {
    store: &'a SqliteRecordStore,
    staged: Vec<StagedOp>,
    session: SyncSession,
}

impl StoreTransaction<'_> {
    /// Stage a new record.
    pub fn insert(&mut self, entity: &EntityType, snapshot: RecordSnapshot) {
        self.staged.push(StagedOp::Insert {
            entity: entity.clone(),
            snapshot,
        });
    }

    /// Stage a modification to an existing record.
    pub fn update(&mut self, entity: &EntityType, snapshot: RecordSnapshot) {
        self.staged.push(StagedOp::Update {
            entity: entity.clone(),
            snapshot,
        });
    }

    /// Stage a deletion. Only the snapshot's identifier matters.
    pub fn delete(&mut self, entity: &EntityType, snapshot: RecordSnapshot) {
        self.staged.push(StagedOp::Delete {
            entity: entity.clone(),
            snapshot,
        });
    }

    /// Commit the staged writes, driving the synchronizer's hook sequence.
    ///
    /// A capture failure aborts before anything is written (fail closed). A
    /// SQL failure rolls the database back and reports a rolled-back outcome,
    /// so nothing reaches the index. On success the returned [`SyncReport`]
    /// records what the index apply did, including any partial-sync failures.
    pub async fn commit(mut self, sync: &Synchronizer) -> SyncResult<SyncReport> {
        {
            let changes = StagedChanges(&self.staged);
            sync.before_commit(&mut self.session, &changes)?;
        }

        match self.apply_sql().await {
            Ok(()) => {
                Ok(sync
                    .after_commit(&mut self.session, CommitOutcome::Committed)
                    .await)
            }
            Err(e) => {
                let _ = sync
                    .after_commit(&mut self.session, CommitOutcome::RolledBack)
                    .await;
                Err(e)
            }
        }
    }

    /// Abandon the staged writes. Nothing reaches the database or the index.
    pub fn rollback(self) {
        tracing::debug!(staged = self.staged.len(), "Store transaction rolled back");
    }

    async fn apply_sql(&self) -> SyncResult<()> {
        let mut tx = self.store.pool.begin().await?;
        for op in &self.staged {
            match op {
                StagedOp::Insert { entity, snapshot } | StagedOp::Update { entity, snapshot } => {
                    let sql = upsert_sql(entity, snapshot);
                    let mut query = sqlx::query(&sql).bind(snapshot.id.as_str());
                    for (_, value) in &snapshot.fields {
                        query = query.bind(value.to_text());
                    }
                    query.execute(&mut *tx).await?;
                }
                StagedOp::Delete { entity, snapshot } => {
                    let sql = format!(
                        "DELETE FROM {} WHERE {} = ?",
                        quote_ident(entity.name()),
                        quote_ident(entity.id_field())
                    );
                    sqlx::query(&sql)
                        .bind(snapshot.id.as_str())
                        .execute(&mut *tx)
                        .await?;
                }
            }
        }
        tx.commit().await?;
        Ok(())
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn select_columns(entity: &EntityType) -> String {
    let mut columns = vec![quote_ident(entity.id_field())];
    for (name, _) in entity.searchable_fields() {
        if name == entity.id_field() {
            continue;
        }
        columns.push(quote_ident(name));
    }
    columns.join(", ")
}

fn upsert_sql(entity: &EntityType, snapshot: &RecordSnapshot) -> String {
    let table = quote_ident(entity.name());
    let id_col = quote_ident(entity.id_field());

    let mut columns = vec![id_col.clone()];
    for (name, _) in &snapshot.fields {
        columns.push(quote_ident(name));
    }
    let placeholders = vec!["?"; columns.len()].join(", ");

    let updates: Vec<String> = snapshot
        .fields
        .iter()
        .map(|(name, _)| {
            let col = quote_ident(name);
            format!("{col} = excluded.{col}")
        })
        .collect();
    let conflict = if updates.is_empty() {
        format!("ON CONFLICT({id_col}) DO NOTHING")
    } else {
        format!("ON CONFLICT({id_col}) DO UPDATE SET {}", updates.join(", "))
    };

    format!(
        "INSERT INTO {table} ({}) VALUES ({placeholders}) {conflict}",
        columns.join(", ")
    )
}

fn snapshot_from_row(entity: &EntityType, row: &SqliteRow) -> SyncResult<RecordSnapshot> {
    let id: String = row.try_get(entity.id_field())?;
    let mut snapshot = RecordSnapshot::new(entity.name(), RecordId::from(id));

    for (name, kind) in entity.searchable_fields() {
        if name == entity.id_field() {
            continue;
        }
        let value: Option<String> = row.try_get(name.as_str())?;
        if let Some(value) = value {
            let field_value = match kind {
                FieldKind::Keywords => {
                    FieldValue::Keywords(value.split_whitespace().map(str::to_string).collect())
                }
                FieldKind::Text | FieldKind::Identifier => FieldValue::Text(value),
            };
            snapshot = snapshot.with_field(name, field_value);
        }
    }

    Ok(snapshot)
}
