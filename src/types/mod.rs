//! Public types exposed by the `media-index-core` crate.

pub mod common;
pub mod document;
pub mod entity;
pub mod options;
pub mod report;

pub use common::{ChangeEvent, DocumentKey, EntityId, EntityType};
pub use document::{
    Document, EmbeddedRef, PerformerDocument, SceneDocument, StudioDocument, TagDocument,
};
pub use entity::{Entity, Performer, Scene, Studio, Tag};
pub use options::{EngineConfig, EngineConfigBuilder};
pub use report::Report;
