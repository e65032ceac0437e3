//! Fixed field mapping of the search index and document conversion.

use once_cell::sync::Lazy;
use tantivy::TantivyDocument;
use tantivy::schema::{FAST, Field, INDEXED, STORED, STRING, Schema, TEXT, Value};

use crate::error::{IndexError, Result};
use crate::types::{Document, DocumentKey, EntityType};

/// Mapping used when creating a new index directory.
pub(crate) static SCHEMA: Lazy<Schema> = Lazy::new(build_schema);

fn build_schema() -> Schema {
    let mut builder = Schema::builder();
    builder.add_text_field(IndexField::Key.name(), STRING | STORED);
    builder.add_text_field(IndexField::EntityType.name(), STRING | STORED);
    builder.add_u64_field(IndexField::EntityId.name(), INDEXED | STORED | FAST);
    builder.add_text_field(IndexField::Name.name(), TEXT | STORED);
    builder.add_text_field(IndexField::Details.name(), TEXT);
    builder.add_text_field(IndexField::Aliases.name(), TEXT);
    builder.add_text_field(IndexField::Date.name(), STRING | STORED);
    builder.add_i64_field(IndexField::Year.name(), INDEXED | STORED | FAST);
    builder.add_u64_field(IndexField::StudioId.name(), INDEXED);
    builder.add_u64_field(IndexField::PerformerId.name(), INDEXED);
    builder.add_u64_field(IndexField::TagId.name(), INDEXED);
    builder.add_text_field(IndexField::StudioName.name(), TEXT);
    builder.add_text_field(IndexField::PerformerName.name(), TEXT);
    builder.add_text_field(IndexField::TagName.name(), TEXT);
    builder.add_text_field(IndexField::Source.name(), STORED);
    builder.build()
}

/// Named fields of the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexField {
    Key,
    EntityType,
    EntityId,
    Name,
    Details,
    Aliases,
    Date,
    Year,
    StudioId,
    PerformerId,
    TagId,
    StudioName,
    PerformerName,
    TagName,
    /// Stored JSON of the whole document.
    Source,
}

impl IndexField {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Key => "key",
            Self::EntityType => "entity_type",
            Self::EntityId => "entity_id",
            Self::Name => "name",
            Self::Details => "details",
            Self::Aliases => "aliases",
            Self::Date => "date",
            Self::Year => "year",
            Self::StudioId => "studio_id",
            Self::PerformerId => "performer_id",
            Self::TagId => "tag_id",
            Self::StudioName => "studio_name",
            Self::PerformerName => "performer_name",
            Self::TagName => "tag_name",
            Self::Source => "source",
        }
    }

    /// Foreign-key field that scene documents use to reference `ty`.
    #[must_use]
    pub fn foreign_key(ty: EntityType) -> Option<Self> {
        match ty {
            EntityType::Tag => Some(Self::TagId),
            EntityType::Performer => Some(Self::PerformerId),
            EntityType::Studio => Some(Self::StudioId),
            _ => None,
        }
    }
}

/// Field handles resolved against an opened index's schema.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Fields {
    pub key: Field,
    pub entity_type: Field,
    pub entity_id: Field,
    pub name: Field,
    pub details: Field,
    pub aliases: Field,
    pub date: Field,
    pub year: Field,
    pub studio_id: Field,
    pub performer_id: Field,
    pub tag_id: Field,
    pub studio_name: Field,
    pub performer_name: Field,
    pub tag_name: Field,
    pub source: Field,
}

impl Fields {
    pub fn resolve(schema: &Schema) -> Result<Self> {
        let field = |f: IndexField| {
            schema
                .get_field(f.name())
                .map_err(|_| IndexError::SchemaMismatch {
                    reason: format!("index has no `{}` field", f.name()),
                })
        };
        Ok(Self {
            key: field(IndexField::Key)?,
            entity_type: field(IndexField::EntityType)?,
            entity_id: field(IndexField::EntityId)?,
            name: field(IndexField::Name)?,
            details: field(IndexField::Details)?,
            aliases: field(IndexField::Aliases)?,
            date: field(IndexField::Date)?,
            year: field(IndexField::Year)?,
            studio_id: field(IndexField::StudioId)?,
            performer_id: field(IndexField::PerformerId)?,
            tag_id: field(IndexField::TagId)?,
            studio_name: field(IndexField::StudioName)?,
            performer_name: field(IndexField::PerformerName)?,
            tag_name: field(IndexField::TagName)?,
            source: field(IndexField::Source)?,
        })
    }

    pub fn get(&self, f: IndexField) -> Field {
        match f {
            IndexField::Key => self.key,
            IndexField::EntityType => self.entity_type,
            IndexField::EntityId => self.entity_id,
            IndexField::Name => self.name,
            IndexField::Details => self.details,
            IndexField::Aliases => self.aliases,
            IndexField::Date => self.date,
            IndexField::Year => self.year,
            IndexField::StudioId => self.studio_id,
            IndexField::PerformerId => self.performer_id,
            IndexField::TagId => self.tag_id,
            IndexField::StudioName => self.studio_name,
            IndexField::PerformerName => self.performer_name,
            IndexField::TagName => self.tag_name,
            IndexField::Source => self.source,
        }
    }

    /// Fields searched by free-text queries.
    pub fn default_search_fields(&self) -> Vec<Field> {
        vec![
            self.name,
            self.details,
            self.aliases,
            self.studio_name,
            self.performer_name,
            self.tag_name,
        ]
    }

    /// Flatten a document into index fields. Fails only if the source JSON cannot be built.
    pub fn build_document(&self, doc: &Document) -> Result<TantivyDocument> {
        let key = doc.key();
        let mut out = TantivyDocument::default();
        out.add_text(self.key, key.to_string());
        out.add_text(self.entity_type, key.entity_type.as_str());
        out.add_u64(self.entity_id, key.id);

        match doc {
            Document::Scene(scene) => {
                if let Some(title) = &scene.title {
                    out.add_text(self.name, title);
                }
                if let Some(details) = &scene.details {
                    out.add_text(self.details, details);
                }
                if let Some(code) = &scene.code {
                    out.add_text(self.aliases, code);
                }
                if let Some(date) = &scene.date {
                    out.add_text(self.date, date);
                }
                if let Some(year) = scene.year {
                    out.add_i64(self.year, i64::from(year));
                }
                if let Some(studio) = &scene.studio {
                    out.add_u64(self.studio_id, studio.id);
                    out.add_text(self.studio_name, &studio.name);
                }
                for performer in &scene.performers {
                    out.add_u64(self.performer_id, performer.id);
                    out.add_text(self.performer_name, &performer.name);
                }
                for tag in &scene.tags {
                    out.add_u64(self.tag_id, tag.id);
                    out.add_text(self.tag_name, &tag.name);
                }
            }
            Document::Performer(performer) => {
                out.add_text(self.name, &performer.name);
                if let Some(disambiguation) = &performer.disambiguation {
                    out.add_text(self.details, disambiguation);
                }
                for alias in &performer.aliases {
                    out.add_text(self.aliases, alias);
                }
            }
            Document::Tag(tag) => {
                out.add_text(self.name, &tag.name);
                if let Some(description) = &tag.description {
                    out.add_text(self.details, description);
                }
                for alias in &tag.aliases {
                    out.add_text(self.aliases, alias);
                }
            }
            Document::Studio(studio) => {
                out.add_text(self.name, &studio.name);
                if let Some(url) = &studio.url {
                    out.add_text(self.details, url);
                }
            }
        }

        out.add_text(self.source, serde_json::to_string(doc)?);
        Ok(out)
    }

    pub fn key_of(&self, doc: &TantivyDocument) -> Option<DocumentKey> {
        doc.get_first(self.key)
            .and_then(|value| value.as_str())
            .and_then(|key| key.parse().ok())
    }

    pub fn source_of(&self, doc: &TantivyDocument) -> Option<Document> {
        let raw = doc.get_first(self.source).and_then(|value| value.as_str())?;
        match serde_json::from_str(raw) {
            Ok(parsed) => Some(parsed),
            Err(err) => {
                tracing::warn!(error = %err, "stored document source is not valid JSON");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EmbeddedRef, SceneDocument};

    #[test]
    fn default_schema_resolves() {
        let fields = Fields::resolve(&SCHEMA).unwrap();
        assert_eq!(fields.get(IndexField::TagId), fields.tag_id);
    }

    #[test]
    fn foreign_keys_exist_only_for_members() {
        assert_eq!(IndexField::foreign_key(EntityType::Tag), Some(IndexField::TagId));
        assert_eq!(IndexField::foreign_key(EntityType::Scene), None);
    }

    #[test]
    fn scene_document_carries_foreign_keys() {
        let fields = Fields::resolve(&SCHEMA).unwrap();
        let scene = SceneDocument {
            id: 4,
            title: Some("Harbour".into()),
            details: None,
            code: None,
            date: Some("2020-01-02".into()),
            year: Some(2020),
            rating: None,
            organized: false,
            studio: Some(EmbeddedRef::new(8, "Bay")),
            performers: vec![EmbeddedRef::new(1, "A"), EmbeddedRef::new(2, "B")],
            tags: vec![EmbeddedRef::new(3, "C")],
        };
        let doc = fields.build_document(&Document::Scene(scene.clone())).unwrap();

        let performer_ids: Vec<u64> = doc
            .get_all(fields.performer_id)
            .filter_map(|v| v.as_u64())
            .collect();
        assert_eq!(performer_ids, vec![1, 2]);
        assert_eq!(
            doc.get_first(fields.studio_id).and_then(|v| v.as_u64()),
            Some(8)
        );
        assert_eq!(fields.key_of(&doc), Some(DocumentKey::new(EntityType::Scene, 4)));
        assert_eq!(fields.source_of(&doc), Some(Document::Scene(scene)));
    }
}
