//! Denormalized projections written into the full-text index.
//!
//! Documents are derived data: they are rebuilt from the relational store on
//! every (re)index and never persisted anywhere else. Scene documents embed the
//! names of their tags, performers and studio, so they go stale whenever one of
//! those members changes.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use super::common::{DocumentKey, EntityId, EntityType};
use super::entity::{Performer, Scene, Studio, Tag};

/// Name-only reference to a member entity embedded in a scene document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddedRef {
    pub id: EntityId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagDocument {
    pub id: EntityId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerformerDocument {
    pub id: EntityId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disambiguation: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudioDocument {
    pub id: EntityId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneDocument {
    pub id: EntityId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    /// Derived from `date`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<u8>,
    #[serde(default)]
    pub organized: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub studio: Option<EmbeddedRef>,
    #[serde(default)]
    pub performers: Vec<EmbeddedRef>,
    #[serde(default)]
    pub tags: Vec<EmbeddedRef>,
}

/// Any document the engine writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Document {
    Scene(SceneDocument),
    Performer(PerformerDocument),
    Tag(TagDocument),
    Studio(StudioDocument),
}

impl Document {
    #[must_use]
    pub fn entity_type(&self) -> EntityType {
        match self {
            Self::Scene(_) => EntityType::Scene,
            Self::Performer(_) => EntityType::Performer,
            Self::Tag(_) => EntityType::Tag,
            Self::Studio(_) => EntityType::Studio,
        }
    }

    #[must_use]
    pub fn id(&self) -> EntityId {
        match self {
            Self::Scene(doc) => doc.id,
            Self::Performer(doc) => doc.id,
            Self::Tag(doc) => doc.id,
            Self::Studio(doc) => doc.id,
        }
    }

    #[must_use]
    pub fn key(&self) -> DocumentKey {
        DocumentKey::new(self.entity_type(), self.id())
    }
}

impl From<&Tag> for TagDocument {
    fn from(tag: &Tag) -> Self {
        Self {
            id: tag.id,
            name: tag.name.clone(),
            aliases: tag.aliases.clone(),
            description: tag.description.clone(),
        }
    }
}

impl From<&Performer> for PerformerDocument {
    fn from(performer: &Performer) -> Self {
        Self {
            id: performer.id,
            name: performer.name.clone(),
            disambiguation: performer.disambiguation.clone(),
            aliases: performer.aliases.clone(),
            gender: performer.gender.clone(),
        }
    }
}

impl From<&Studio> for StudioDocument {
    fn from(studio: &Studio) -> Self {
        Self {
            id: studio.id,
            name: studio.name.clone(),
            url: studio.url.clone(),
        }
    }
}

impl EmbeddedRef {
    #[must_use]
    pub fn new(id: EntityId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

impl SceneDocument {
    /// Build a scene document from the row and its already-resolved members.
    #[must_use]
    pub fn new(
        scene: &Scene,
        studio: Option<&Studio>,
        performers: &[&Performer],
        tags: &[&Tag],
    ) -> Self {
        Self {
            id: scene.id,
            title: scene.title.clone(),
            details: scene.details.clone(),
            code: scene.code.clone(),
            date: scene.date.clone(),
            year: scene.date.as_deref().and_then(year_of),
            rating: scene.rating,
            organized: scene.organized,
            studio: studio.map(|s| EmbeddedRef::new(s.id, s.name.clone())),
            performers: performers
                .iter()
                .map(|p| EmbeddedRef::new(p.id, p.name.clone()))
                .collect(),
            tags: tags
                .iter()
                .map(|t| EmbeddedRef::new(t.id, t.name.clone()))
                .collect(),
        }
    }
}

/// Year of a `YYYY-MM-DD` date. Partial dates (`YYYY` or `YYYY-MM`) still yield a year.
pub(crate) fn year_of(date: &str) -> Option<i32> {
    let date = date.trim();
    if let Ok(parsed) = NaiveDate::parse_from_str(date, "%Y-%m-%d") {
        return Some(parsed.year());
    }
    let head = date.split('-').next()?;
    if head.len() == 4 {
        head.parse().ok()
    } else {
        None
    }
}
