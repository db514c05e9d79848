//! Entity-type declarations and record projections.
//!
//! An [`EntityType`] names a class of records and declares which of their fields
//! are searchable. Records themselves are owned by the record store; this crate
//! only sees them as [`RecordSnapshot`]s produced by the store's change tracking
//! or by a reindex scan, and projects each snapshot into the [`Document`] that
//! goes into the index.

use std::fmt;

/// Kind of a declared searchable field, used both to pick the tantivy field
/// configuration and to interpret the stored value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Natural-language text, tokenized and stemmed for relevance search.
    Text,
    /// Opaque identifier matched exactly as a single term.
    Identifier,
    /// Whitespace-separated keyword list, each keyword matched as a term.
    Keywords,
}

/// A value extracted from a record for one searchable field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Keywords(Vec<String>),
}

impl FieldValue {
    pub fn text(value: impl Into<String>) -> Self {
        FieldValue::Text(value.into())
    }

    pub fn keywords<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FieldValue::Keywords(values.into_iter().map(Into::into).collect())
    }

    /// Render the value as the single text string handed to the index
    /// (and to the TEXT columns of the SQLite reference store).
    #[must_use]
    pub fn to_text(&self) -> String {
        match self {
            FieldValue::Text(text) => text.clone(),
            FieldValue::Keywords(words) => words.join(" "),
        }
    }
}

/// Stable unique identifier of a record, uniform across the index and the
/// record store regardless of the store's native key type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        RecordId(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for RecordId {
    fn from(id: String) -> Self {
        RecordId(id)
    }
}

impl From<&str> for RecordId {
    fn from(id: &str) -> Self {
        RecordId(id.to_string())
    }
}

impl From<i64> for RecordId {
    fn from(id: i64) -> Self {
        RecordId(id.to_string())
    }
}

impl From<u64> for RecordId {
    fn from(id: u64) -> Self {
        RecordId(id.to_string())
    }
}

/// A class of records sharing a name (the index namespace) and an ordered
/// declaration of searchable fields.
///
/// The declaration is static: it is the only way field values ever reach the
/// index, so a field missing here is invisible to search even if the store
/// persists it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityType {
    name: String,
    id_field: String,
    searchable_fields: Vec<(String, FieldKind)>,
}

impl EntityType {
    /// Declare a new entity type. The identifier field defaults to `"id"`.
    pub fn new(name: impl Into<String>) -> Self {
        EntityType {
            name: name.into(),
            id_field: "id".to_string(),
            searchable_fields: Vec::new(),
        }
    }

    /// Override the identifier field name.
    #[must_use]
    pub fn with_id_field(mut self, name: impl Into<String>) -> Self {
        self.id_field = name.into();
        self
    }

    /// Declare a searchable field. Order is preserved and becomes the index
    /// schema order.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.searchable_fields.push((name.into(), kind));
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn id_field(&self) -> &str {
        &self.id_field
    }

    #[must_use]
    pub fn searchable_fields(&self) -> &[(String, FieldKind)] {
        &self.searchable_fields
    }

    #[must_use]
    pub fn field_kind(&self, name: &str) -> Option<FieldKind> {
        self.searchable_fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, kind)| *kind)
    }

    /// Project a record snapshot into the document that represents it in the
    /// index: exactly the declared searchable fields, identifier always
    /// included. Declared fields absent from the snapshot are skipped and
    /// simply index nothing.
    #[must_use]
    pub fn project(&self, snapshot: &RecordSnapshot) -> Document {
        let fields = self
            .searchable_fields
            .iter()
            .filter(|(name, _)| name != &self.id_field)
            .filter_map(|(name, _)| {
                snapshot
                    .field(name)
                    .map(|value| (name.clone(), value.clone()))
            })
            .collect();

        Document {
            id: snapshot.id.clone(),
            fields,
        }
    }
}

/// The per-record projection written to the index: the unit of upsert/delete.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: RecordId,
    pub fields: Vec<(String, FieldValue)>,
}

impl Document {
    pub fn new(id: impl Into<RecordId>) -> Self {
        Document {
            id: id.into(),
            fields: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: FieldValue) -> Self {
        self.fields.push((name.into(), value));
        self
    }
}

/// A point-in-time view of one record, captured by the store's change tracking
/// before the transaction boundary invalidates it, or read back during a
/// reindex scan.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordSnapshot {
    pub entity: String,
    pub id: RecordId,
    pub fields: Vec<(String, FieldValue)>,
}

impl RecordSnapshot {
    pub fn new(entity: impl Into<String>, id: impl Into<RecordId>) -> Self {
        RecordSnapshot {
            entity: entity.into(),
            id: id.into(),
            fields: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: FieldValue) -> Self {
        self.fields.push((name.into(), value));
        self
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }
}
