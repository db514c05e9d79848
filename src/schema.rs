//! Tantivy schema construction from a declared Searchable Field Set.
//!
//! Each [`FieldKind`](crate::entity::FieldKind) maps to a fixed tantivy field
//! configuration: identifiers index the whole value as one raw term, text
//! fields get lowercasing plus English stemming for relevance search, and
//! keyword lists split on whitespace with lowercasing only. The schema is
//! fixed at index creation time and never migrated in place.

use std::collections::HashMap;

use tantivy::{
    schema::{Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions},
    tokenizer::{
        AlphaNumOnlyFilter, Language, LowerCaser, SimpleTokenizer, Stemmer, TextAnalyzer,
        TokenizerManager, WhitespaceTokenizer,
    },
};

use crate::entity::{EntityType, FieldKind};
use crate::error::{SyncError, SyncResult};

/// Tokenizer name constants shared between schema build and registration.
pub(crate) const TEXT_TOKENIZER: &str = "entity_text";
pub(crate) const KEYWORD_TOKENIZER: &str = "keyword_list";

/// Raw built-in tokenizer: the whole value becomes a single term, which is
/// what identifier deletion (`delete_term`) relies on.
const IDENTIFIER_TOKENIZER: &str = "raw";

/// Resolved schema for one entity type's index: the tantivy schema plus the
/// field handles needed for writes and queries.
#[derive(Debug, Clone)]
pub(crate) struct EntitySchema {
    pub schema: Schema,
    pub id: Field,
    /// Declared searchable fields, identifier excluded.
    pub fields: HashMap<String, Field>,
}

impl EntitySchema {
    /// Number of fields this entity declares in its physical schema. Used for
    /// the drift check when opening an existing index.
    #[must_use]
    pub fn expected_field_count(entity: &EntityType) -> usize {
        1 + entity
            .searchable_fields()
            .iter()
            .filter(|(name, _)| name != entity.id_field())
            .count()
    }

    /// Look up a declared field handle, including the identifier field.
    pub fn field(&self, entity: &EntityType, name: &str) -> SyncResult<Field> {
        if name == entity.id_field() {
            return Ok(self.id);
        }
        self.fields
            .get(name)
            .copied()
            .ok_or_else(|| SyncError::FieldNotFound(name.to_string()))
    }
}

/// Register the analyzers the entity schemas reference. Tokenizers are runtime
/// state, so this runs on every open as well as on creation.
pub(crate) fn register_tokenizers(manager: &TokenizerManager) {
    let text_tokenizer = TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(LowerCaser)
        .filter(AlphaNumOnlyFilter)
        .filter(Stemmer::new(Language::English))
        .build();
    manager.register(TEXT_TOKENIZER, text_tokenizer);

    let keyword_tokenizer = TextAnalyzer::builder(WhitespaceTokenizer::default())
        .filter(LowerCaser)
        .build();
    manager.register(KEYWORD_TOKENIZER, keyword_tokenizer);
}

/// Build the physical schema for an entity type from its declared field set.
///
/// The identifier field is always present, stored, and indexed raw; it is the
/// only stored field, since query results carry identifiers back to the record
/// store rather than reconstructing records from the index.
pub(crate) fn build_entity_schema(entity: &EntityType) -> EntitySchema {
    let mut builder = Schema::builder();

    let id_options = TextOptions::default().set_stored().set_indexing_options(
        TextFieldIndexing::default()
            .set_tokenizer(IDENTIFIER_TOKENIZER)
            .set_index_option(IndexRecordOption::Basic),
    );
    let id = builder.add_text_field(entity.id_field(), id_options);

    let mut fields = HashMap::new();
    for (name, kind) in entity.searchable_fields() {
        if name == entity.id_field() {
            continue;
        }
        let options = match kind {
            FieldKind::Text => TextOptions::default().set_indexing_options(
                TextFieldIndexing::default()
                    .set_tokenizer(TEXT_TOKENIZER)
                    .set_index_option(IndexRecordOption::WithFreqsAndPositions),
            ),
            FieldKind::Identifier => TextOptions::default().set_indexing_options(
                TextFieldIndexing::default()
                    .set_tokenizer(IDENTIFIER_TOKENIZER)
                    .set_index_option(IndexRecordOption::Basic),
            ),
            FieldKind::Keywords => TextOptions::default().set_indexing_options(
                TextFieldIndexing::default()
                    .set_tokenizer(KEYWORD_TOKENIZER)
                    .set_index_option(IndexRecordOption::WithFreqs),
            ),
        };
        let field = builder.add_text_field(name, options);
        fields.insert(name.clone(), field);
    }

    EntitySchema {
        schema: builder.build(),
        id,
        fields,
    }
}

/// Resolve field handles against an already-opened index schema. Fails with
/// [`SyncError::SchemaDrift`] when a declared field is missing on disk.
pub(crate) fn resolve_entity_schema(
    entity: &EntityType,
    schema: &Schema,
) -> SyncResult<EntitySchema> {
    let drift = || SyncError::SchemaDrift {
        entity: entity.name().to_string(),
    };

    let id = schema.get_field(entity.id_field()).map_err(|_| drift())?;

    let mut fields = HashMap::new();
    for (name, _) in entity.searchable_fields() {
        if name == entity.id_field() {
            continue;
        }
        let field = schema.get_field(name).map_err(|_| drift())?;
        fields.insert(name.clone(), field);
    }

    Ok(EntitySchema {
        schema: schema.clone(),
        id,
        fields,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{EntityType, FieldKind};

    fn post_type() -> EntityType {
        EntityType::new("post")
            .with_field("title", FieldKind::Text)
            .with_field("tags", FieldKind::Keywords)
    }

    #[test]
    fn schema_always_includes_the_identifier() {
        let built = build_entity_schema(&post_type());
        assert!(built.schema.get_field("id").is_ok());
        assert_eq!(EntitySchema::expected_field_count(&post_type()), 3);
    }

    #[test]
    fn declared_id_does_not_double_count() {
        let entity = EntityType::new("user")
            .with_field("id", FieldKind::Identifier)
            .with_field("name", FieldKind::Text);
        assert_eq!(EntitySchema::expected_field_count(&entity), 2);
        let built = build_entity_schema(&entity);
        assert_eq!(built.fields.len(), 1);
    }

    #[test]
    fn resolve_detects_missing_fields_as_drift() {
        let built = build_entity_schema(&post_type());
        let wider = post_type().with_field("summary", FieldKind::Text);
        let result = resolve_entity_schema(&wider, &built.schema);
        assert!(matches!(result, Err(SyncError::SchemaDrift { .. })));
    }
}
