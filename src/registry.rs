//! Index registry: entity-type name → physical tantivy index.
//!
//! One index per entity type, created lazily under the configured root on
//! first use and cached as an open handle afterwards. The handle cache doubles
//! as the creation guard: a first use that races another first use for the
//! same type resolves to a single physical creation.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use tantivy::directory::MmapDirectory;
use tantivy::{Index, IndexReader, IndexSettings, IndexWriter, TantivyDocument, Term};

use crate::config::SyncConfig;
use crate::entity::{Document, EntityType, RecordId};
use crate::error::{SyncError, SyncResult};
use crate::schema::{self, EntitySchema};

/// An open index for one entity type.
///
/// Owns the single [`IndexWriter`] the index permits; all mutation funnels
/// through the writer mutex, while queries read from [`IndexReader`] snapshots
/// without blocking writers.
pub struct IndexHandle {
    entity_name: String,
    index: Index,
    reader: IndexReader,
    entity_schema: EntitySchema,
    writer: Mutex<IndexWriter>,
}

impl IndexHandle {
    pub(crate) fn index(&self) -> &Index {
        &self.index
    }

    pub(crate) fn reader(&self) -> &IndexReader {
        &self.reader
    }

    pub(crate) fn entity_schema(&self) -> &EntitySchema {
        &self.entity_schema
    }

    /// Number of documents visible to the current reader snapshot.
    #[must_use]
    pub fn num_docs(&self) -> u64 {
        self.reader.searcher().num_docs()
    }

    /// Replace-by-identifier write: delete any existing document with the same
    /// identifier, add the new one, and commit durably before returning.
    ///
    /// Blocking; callers dispatch this on the blocking pool.
    pub(crate) fn upsert_blocking(&self, doc: &Document) -> SyncResult<()> {
        let id_term = Term::from_field_text(self.entity_schema.id, doc.id.as_str());

        let mut tantivy_doc = TantivyDocument::new();
        tantivy_doc.add_text(self.entity_schema.id, doc.id.as_str());
        for (name, value) in &doc.fields {
            if let Some(field) = self.entity_schema.fields.get(name) {
                tantivy_doc.add_text(*field, value.to_text());
            }
        }

        let mut writer = self.writer.lock();
        writer.delete_term(id_term);
        writer.add_document(tantivy_doc)?;
        writer.commit()?;
        drop(writer);

        self.reader.reload()?;
        tracing::debug!(entity = %self.entity_name, id = %doc.id, "Document upserted");
        Ok(())
    }

    /// Delete every document carrying the identifier. No-op when absent.
    pub(crate) fn remove_blocking(&self, id: &RecordId) -> SyncResult<()> {
        let id_term = Term::from_field_text(self.entity_schema.id, id.as_str());

        let mut writer = self.writer.lock();
        writer.delete_term(id_term);
        writer.commit()?;
        drop(writer);

        self.reader.reload()?;
        tracing::debug!(entity = %self.entity_name, id = %id, "Document removed");
        Ok(())
    }
}

/// Registry mapping entity-type names to open index handles.
pub struct IndexRegistry {
    config: SyncConfig,
    handles: DashMap<String, Arc<IndexHandle>>,
}

impl IndexRegistry {
    #[must_use]
    pub fn new(config: SyncConfig) -> Self {
        IndexRegistry {
            config,
            handles: DashMap::new(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Resolve an entity type to its index, opening the existing index or
    /// creating a new one from the declared field set.
    ///
    /// Creation runs inside the cache entry, so two concurrent first-uses for
    /// the same type cannot both create.
    pub fn get_index(&self, entity: &EntityType) -> SyncResult<Arc<IndexHandle>> {
        match self.handles.entry(entity.name().to_string()) {
            Entry::Occupied(occupied) => Ok(occupied.get().clone()),
            Entry::Vacant(vacant) => {
                let handle = Arc::new(self.open_or_create(entity)?);
                vacant.insert(handle.clone());
                Ok(handle)
            }
        }
    }

    /// Drop the cached handle and the on-disk index, then create a fresh index
    /// from the current field set. The rebuild path for schema drift and
    /// corruption recovery.
    pub fn reset_index(&self, entity: &EntityType) -> SyncResult<Arc<IndexHandle>> {
        self.handles.remove(entity.name());

        let index_dir = self.config.index_dir(entity.name());
        if index_dir.exists() {
            std::fs::remove_dir_all(&index_dir).map_err(|e| {
                SyncError::IndexUnavailable(format!(
                    "Failed to remove old index at {index_dir:?}: {e}"
                ))
            })?;
        }
        tracing::info!(entity = %entity.name(), "Index reset, recreating from declared fields");

        self.get_index(entity)
    }

    fn open_or_create(&self, entity: &EntityType) -> SyncResult<IndexHandle> {
        let index_dir = self.config.index_dir(entity.name());
        std::fs::create_dir_all(&index_dir).map_err(|e| {
            SyncError::IndexUnavailable(format!(
                "Failed to create index directory {index_dir:?}: {e}"
            ))
        })?;

        let (index, entity_schema) = if index_dir.join("meta.json").exists() {
            let existing = Index::open_in_dir(&index_dir).map_err(|e| {
                SyncError::IndexUnavailable(format!(
                    "Failed to open existing index at {index_dir:?}: {e}"
                ))
            })?;

            // Drift check: the on-disk schema must carry exactly the declared
            // fields. Drift is never migrated in place; reindex rebuilds.
            let existing_field_count = existing.schema().num_fields();
            let expected_field_count = EntitySchema::expected_field_count(entity);
            if existing_field_count != expected_field_count {
                tracing::warn!(
                    entity = %entity.name(),
                    existing_fields = existing_field_count,
                    expected_fields = expected_field_count,
                    "Schema drift detected on open"
                );
                return Err(SyncError::SchemaDrift {
                    entity: entity.name().to_string(),
                });
            }

            let entity_schema = schema::resolve_entity_schema(entity, &existing.schema())?;
            (existing, entity_schema)
        } else {
            let entity_schema = schema::build_entity_schema(entity);
            let mmap_directory = MmapDirectory::open(&index_dir).map_err(|e| {
                SyncError::IndexUnavailable(format!(
                    "Failed to open index directory {index_dir:?}: {e}"
                ))
            })?;
            let index = Index::create(
                mmap_directory,
                entity_schema.schema.clone(),
                IndexSettings::default(),
            )
            .map_err(|e| {
                SyncError::IndexUnavailable(format!("Failed to create index: {e}"))
            })?;
            tracing::info!(entity = %entity.name(), path = ?index_dir, "Created new index");
            (index, entity_schema)
        };

        // Tokenizers are runtime state: register on every open, not just create.
        schema::register_tokenizers(index.tokenizers());

        let mut writer: IndexWriter = index
            .writer(self.config.writer_memory_bytes())
            .map_err(|e| {
                SyncError::IndexUnavailable(format!("Failed to acquire index writer: {e}"))
            })?;
        writer
            .commit()
            .map_err(|e| SyncError::IndexUnavailable(format!("Initial commit failed: {e}")))?;

        let reader = index
            .reader()
            .map_err(|e| SyncError::IndexUnavailable(format!("Failed to create reader: {e}")))?;

        Ok(IndexHandle {
            entity_name: entity.name().to_string(),
            index,
            reader,
            entity_schema,
            writer: Mutex::new(writer),
        })
    }
}
