//! Identifiers and change notifications shared by every stage.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Row id of an entity in the relational store.
pub type EntityId = u64;

/// Kinds of entity that publish change notifications.
///
/// Only [`EntityType::Scene`], [`EntityType::Performer`], [`EntityType::Tag`] and
/// [`EntityType::Studio`] are indexed; the rest are accepted and ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Scene,
    Performer,
    Tag,
    Studio,
    Image,
    Gallery,
    Movie,
    SceneMarker,
}

impl EntityType {
    /// Indexed types in processing order. Members come before the scenes that embed them.
    pub const INDEXED: [EntityType; 4] = [
        EntityType::Tag,
        EntityType::Performer,
        EntityType::Studio,
        EntityType::Scene,
    ];

    #[must_use]
    pub fn is_indexed(self) -> bool {
        Self::INDEXED.contains(&self)
    }

    /// Name used in document keys and the `entity_type` index field.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scene => "Scene",
            Self::Performer => "Performer",
            Self::Tag => "Tag",
            Self::Studio => "Studio",
            Self::Image => "Image",
            Self::Gallery => "Gallery",
            Self::Movie => "Movie",
            Self::SceneMarker => "SceneMarker",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Scene" => Ok(Self::Scene),
            "Performer" => Ok(Self::Performer),
            "Tag" => Ok(Self::Tag),
            "Studio" => Ok(Self::Studio),
            "Image" => Ok(Self::Image),
            "Gallery" => Ok(Self::Gallery),
            "Movie" => Ok(Self::Movie),
            "SceneMarker" => Ok(Self::SceneMarker),
            other => Err(format!("unknown entity type `{other}`")),
        }
    }
}

/// Notification that one entity was created, updated, merged or deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub entity_type: EntityType,
    pub id: EntityId,
}

impl ChangeEvent {
    #[must_use]
    pub fn new(entity_type: EntityType, id: EntityId) -> Self {
        Self { entity_type, id }
    }

    #[must_use]
    pub fn scene(id: EntityId) -> Self {
        Self::new(EntityType::Scene, id)
    }

    #[must_use]
    pub fn performer(id: EntityId) -> Self {
        Self::new(EntityType::Performer, id)
    }

    #[must_use]
    pub fn tag(id: EntityId) -> Self {
        Self::new(EntityType::Tag, id)
    }

    #[must_use]
    pub fn studio(id: EntityId) -> Self {
        Self::new(EntityType::Studio, id)
    }
}

/// Stable composite key of an indexed document, rendered as `"<Type>:<ID>"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentKey {
    pub entity_type: EntityType,
    pub id: EntityId,
}

impl DocumentKey {
    #[must_use]
    pub fn new(entity_type: EntityType, id: EntityId) -> Self {
        Self { entity_type, id }
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.entity_type, self.id)
    }
}

impl FromStr for DocumentKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (ty, id) = s
            .split_once(':')
            .ok_or_else(|| format!("document key `{s}` has no `:` separator"))?;
        let entity_type = ty.parse()?;
        let id = id
            .parse()
            .map_err(|err| format!("document key `{s}` has a bad id: {err}"))?;
        Ok(Self { entity_type, id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_key_renders_type_and_id() {
        let key = DocumentKey::new(EntityType::Scene, 42);
        assert_eq!(key.to_string(), "Scene:42");
        assert_eq!("Scene:42".parse::<DocumentKey>().unwrap(), key);
    }

    #[test]
    fn document_key_rejects_garbage() {
        assert!("Scene".parse::<DocumentKey>().is_err());
        assert!("Blob:1".parse::<DocumentKey>().is_err());
        assert!("Tag:x".parse::<DocumentKey>().is_err());
    }

    #[test]
    fn only_four_types_are_indexed() {
        assert!(EntityType::Tag.is_indexed());
        assert!(EntityType::Scene.is_indexed());
        assert!(!EntityType::Gallery.is_indexed());
        assert!(!EntityType::SceneMarker.is_indexed());
    }
}
