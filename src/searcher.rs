//! Writer/query facade over one entity type's index.
//!
//! Mutation is replace-by-identifier and durable on return; queries run
//! against the most recent committed reader snapshot and return ranked
//! identifiers together with the total match count across the whole index.

use std::sync::Arc;

use tantivy::TantivyDocument;
use tantivy::collector::{Count, TopDocs};
use tantivy::query::QueryParser;
use tantivy::schema::Value;

use crate::config::SyncConfig;
use crate::entity::{Document, EntityType, RecordId};
use crate::error::{SyncError, SyncResult};
use crate::registry::IndexRegistry;

/// How much of the ranked result to materialize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultWindow {
    /// Fixed-size page, 1-indexed. `per_page == 0` falls back to the
    /// configured default page size.
    Page { page: usize, per_page: usize },
    /// At most `n` top-ranked hits.
    Limit(usize),
    /// Every match, in rank order.
    All,
}

impl ResultWindow {
    /// Convenience constructor for a page with the default page size.
    #[must_use]
    pub fn page(page: usize) -> Self {
        ResultWindow::Page { page, per_page: 0 }
    }

    /// Resolve to `(offset, limit)` against a known total.
    pub(crate) fn slice(self, total: usize, default_per_page: usize) -> (usize, usize) {
        match self {
            ResultWindow::Page { page, per_page } => {
                let per_page = if per_page == 0 {
                    default_per_page
                } else {
                    per_page
                };
                let page = page.max(1);
                ((page - 1) * per_page, per_page)
            }
            ResultWindow::Limit(limit) => (0, limit),
            ResultWindow::All => (0, total),
        }
    }
}

/// One ranked hit: an identifier and its relevance score. Rank is the
/// position within [`SearchHits::hits`].
#[derive(Debug, Clone, PartialEq)]
pub struct RankedHit {
    pub id: RecordId,
    pub score: f32,
}

/// Ranked identifiers for one window of a query, plus the total number of
/// matches across the whole index (not just this window).
#[derive(Debug, Clone, Default)]
pub struct SearchHits {
    pub hits: Vec<RankedHit>,
    pub total: usize,
}

impl SearchHits {
    /// Identifiers in rank order.
    #[must_use]
    pub fn ids(&self) -> Vec<RecordId> {
        self.hits.iter().map(|hit| hit.id.clone()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}

/// Facade performing document-level mutation and ranked queries against
/// per-entity-type indexes resolved through the [`IndexRegistry`].
#[derive(Clone)]
pub struct Searcher {
    registry: Arc<IndexRegistry>,
    default_per_page: usize,
}

impl Searcher {
    #[must_use]
    pub fn new(config: SyncConfig) -> Self {
        let default_per_page = config.default_per_page();
        Searcher {
            registry: Arc::new(IndexRegistry::new(config)),
            default_per_page,
        }
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<IndexRegistry> {
        &self.registry
    }

    /// Write a record's document under replace-by-identifier semantics. The
    /// index commit is durable before this returns.
    pub async fn upsert(&self, entity: &EntityType, doc: Document) -> SyncResult<()> {
        let handle = self.registry.get_index(entity)?;
        tokio::task::spawn_blocking(move || handle.upsert_blocking(&doc))
            .await
            .map_err(|e| SyncError::Task(format!("Upsert task panicked: {e}")))?
    }

    /// Delete every document with the given identifier. No-op, not an error,
    /// when no such document exists.
    pub async fn remove(&self, entity: &EntityType, id: &RecordId) -> SyncResult<()> {
        let handle = self.registry.get_index(entity)?;
        let id = id.clone();
        tokio::task::spawn_blocking(move || handle.remove_blocking(&id))
            .await
            .map_err(|e| SyncError::Task(format!("Remove task panicked: {e}")))?
    }

    /// Run a ranked query of `query_text` against one declared field and
    /// return the requested window of identifiers plus the total match count.
    pub async fn query(
        &self,
        entity: &EntityType,
        field: &str,
        query_text: &str,
        window: ResultWindow,
    ) -> SyncResult<SearchHits> {
        let handle = self.registry.get_index(entity)?;
        let target = handle.entity_schema().field(entity, field)?;

        let query_parser = QueryParser::for_index(handle.index(), vec![target]);
        let query = query_parser
            .parse_query(query_text)
            .map_err(|e| SyncError::QuerySyntax {
                field: field.to_string(),
                query: query_text.to_string(),
                message: e.to_string(),
            })?;

        let searcher = handle.reader().searcher();
        let total = searcher
            .search(&*query, &Count)
            .map_err(SyncError::Tantivy)?;

        let (offset, limit) = window.slice(total, self.default_per_page);
        if total == 0 || limit == 0 || offset >= total {
            tracing::debug!(entity = %entity.name(), field, query = query_text, total, "Query matched nothing in window");
            return Ok(SearchHits {
                hits: Vec::new(),
                total,
            });
        }

        let top_docs = searcher
            .search(&*query, &TopDocs::with_limit(limit).and_offset(offset))
            .map_err(SyncError::Tantivy)?;

        let id_field = handle.entity_schema().id;
        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, doc_address) in top_docs {
            let doc: TantivyDocument = searcher.doc(doc_address).map_err(SyncError::Tantivy)?;
            let id = doc
                .get_first(id_field)
                .and_then(|value| value.as_str())
                .ok_or_else(|| {
                    SyncError::FieldNotFound(format!(
                        "stored identifier missing from document in '{}'",
                        entity.name()
                    ))
                })?;
            hits.push(RankedHit {
                id: RecordId::from(id),
                score,
            });
        }

        tracing::debug!(
            entity = %entity.name(),
            field,
            query = query_text,
            total,
            returned = hits.len(),
            "Query executed"
        );

        Ok(SearchHits { hits, total })
    }
}
