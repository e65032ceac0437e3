//! Relational entities read from the store, and the table binding each one to
//! its entity type and batched fetch.

use serde::{Deserialize, Serialize};

use super::common::{EntityId, EntityType};
use crate::error::Result;
use crate::repository::ReaderRepository;

/// An entity the engine can load and cache.
///
/// Implementations resolve once, at compile time, which repository call serves
/// them, so the loaders and indexers never switch on `EntityType`.
pub trait Entity: Clone + Send + Sync + 'static {
    const TYPE: EntityType;

    /// Fetch every id in one repository call. The result is aligned with `ids`.
    fn fetch_many(repo: &dyn ReaderRepository, ids: &[EntityId]) -> Result<Vec<Option<Self>>>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: EntityId,
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Performer {
    pub id: EntityId,
    pub name: String,
    #[serde(default)]
    pub disambiguation: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub gender: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Studio {
    pub id: EntityId,
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub parent_id: Option<EntityId>,
}

/// A scene row. Performers and tags hang off junction tables and are looked up
/// separately; the studio is a plain foreign key.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Scene {
    pub id: EntityId,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    /// Release date as stored, normally `YYYY-MM-DD`.
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub rating: Option<u8>,
    #[serde(default)]
    pub organized: bool,
    #[serde(default)]
    pub studio_id: Option<EntityId>,
}

impl Tag {
    #[must_use]
    pub fn new(id: EntityId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            aliases: Vec::new(),
            description: None,
        }
    }
}

impl Performer {
    #[must_use]
    pub fn new(id: EntityId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            disambiguation: None,
            aliases: Vec::new(),
            gender: None,
        }
    }
}

impl Studio {
    #[must_use]
    pub fn new(id: EntityId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            url: None,
            parent_id: None,
        }
    }
}

impl Scene {
    #[must_use]
    pub fn new(id: EntityId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: Some(title.into()),
            ..Self::default()
        }
    }
}

impl Entity for Tag {
    const TYPE: EntityType = EntityType::Tag;

    fn fetch_many(repo: &dyn ReaderRepository, ids: &[EntityId]) -> Result<Vec<Option<Self>>> {
        repo.find_tags(ids)
    }
}

impl Entity for Performer {
    const TYPE: EntityType = EntityType::Performer;

    fn fetch_many(repo: &dyn ReaderRepository, ids: &[EntityId]) -> Result<Vec<Option<Self>>> {
        repo.find_performers(ids)
    }
}

impl Entity for Studio {
    const TYPE: EntityType = EntityType::Studio;

    fn fetch_many(repo: &dyn ReaderRepository, ids: &[EntityId]) -> Result<Vec<Option<Self>>> {
        repo.find_studios(ids)
    }
}

impl Entity for Scene {
    const TYPE: EntityType = EntityType::Scene;

    fn fetch_many(repo: &dyn ReaderRepository, ids: &[EntityId]) -> Result<Vec<Option<Self>>> {
        repo.find_scenes(ids)
    }
}
