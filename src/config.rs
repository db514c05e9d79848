//! Configuration for index storage and query defaults.
//!
//! One setting is required: the root directory under which every entity type
//! gets its own index subdirectory. Everything else has production defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default tantivy writer heap per index.
const DEFAULT_WRITER_MEMORY_BYTES: usize = 50_000_000;

/// Default page size for paged queries.
const DEFAULT_PER_PAGE: usize = 20;

/// Configuration for the index registry and search facade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Root directory for per-entity-type indexes.
    ///
    /// **INVARIANT:** Always an absolute path (normalized in the builder), so
    /// index resolution is independent of the process working directory.
    pub(crate) index_root: PathBuf,
    pub(crate) writer_memory_bytes: usize,
    pub(crate) default_per_page: usize,
}

impl SyncConfig {
    /// Create a configuration builder.
    #[must_use]
    pub fn builder() -> SyncConfigBuilder {
        SyncConfigBuilder::new()
    }

    #[must_use]
    pub fn index_root(&self) -> &Path {
        &self.index_root
    }

    /// Directory holding the physical index for one entity type.
    #[must_use]
    pub fn index_dir(&self, entity_name: &str) -> PathBuf {
        self.index_root.join(entity_name)
    }

    #[must_use]
    pub fn writer_memory_bytes(&self) -> usize {
        self.writer_memory_bytes
    }

    #[must_use]
    pub fn default_per_page(&self) -> usize {
        self.default_per_page
    }
}

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("index_root is required")]
    MissingIndexRoot,

    #[error("Failed to resolve index_root to an absolute path: {0}")]
    Normalize(#[from] std::io::Error),

    #[error("{field} must be greater than zero")]
    ZeroValue { field: &'static str },
}

/// Builder for [`SyncConfig`].
#[derive(Debug, Default)]
pub struct SyncConfigBuilder {
    index_root: Option<PathBuf>,
    writer_memory_bytes: Option<usize>,
    default_per_page: Option<usize>,
}

impl SyncConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the root directory under which per-entity indexes live.
    #[must_use]
    pub fn index_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.index_root = Some(path.into());
        self
    }

    /// Set the tantivy writer heap budget per index (default 50 MB).
    #[must_use]
    pub fn writer_memory_bytes(mut self, bytes: usize) -> Self {
        self.writer_memory_bytes = Some(bytes);
        self
    }

    /// Set the page size used when a paged query does not specify one
    /// (default 20).
    #[must_use]
    pub fn default_per_page(mut self, per_page: usize) -> Self {
        self.default_per_page = Some(per_page);
        self
    }

    /// Validate and build the configuration, normalizing `index_root` to an
    /// absolute path.
    pub fn build(self) -> Result<SyncConfig, ConfigError> {
        let index_root = self.index_root.ok_or(ConfigError::MissingIndexRoot)?;
        let index_root = if index_root.is_absolute() {
            index_root
        } else {
            std::env::current_dir()?.join(index_root)
        };

        let writer_memory_bytes = self
            .writer_memory_bytes
            .unwrap_or(DEFAULT_WRITER_MEMORY_BYTES);
        if writer_memory_bytes == 0 {
            return Err(ConfigError::ZeroValue {
                field: "writer_memory_bytes",
            });
        }

        let default_per_page = self.default_per_page.unwrap_or(DEFAULT_PER_PAGE);
        if default_per_page == 0 {
            return Err(ConfigError::ZeroValue {
                field: "default_per_page",
            });
        }

        Ok(SyncConfig {
            index_root,
            writer_memory_bytes,
            default_per_page,
        })
    }
}
