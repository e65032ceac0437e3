#![deny(clippy::all, clippy::pedantic)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
#![cfg_attr(
    test,
    allow(
        clippy::useless_vec,
        clippy::uninlined_format_args,
        clippy::cast_possible_truncation
    )
)]
#![allow(clippy::module_name_repetitions)]
//
// Documentation lints: internal plumbing is self-describing, public entry points carry docs.
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
//
// Page sizes and counters are bounded by table sizes; plain casts are fine here.
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]
//
// Processing loops read better as one function per stage.
#![allow(clippy::too_many_lines)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::similar_names)]
// e.g., scene_ids, studio_ids, performer_ids are intentionally similar
#![allow(clippy::implicit_hasher)]
#![allow(clippy::len_without_is_empty)]

//! Incremental maintenance of a full-text index over a media library.
//!
//! Domain mutations publish [`ChangeEvent`]s on an [`EventBus`]. A [`Collector`]
//! rolls them up into a [`ChangeSet`]; the [`Engine`] loop periodically takes
//! that set, expands it through the preprocessor so containing scene documents
//! are rebuilt, and writes the result into a tantivy index in bounded chunks.

/// The media-index-core crate version (matches `Cargo.toml`).
pub const MEDIA_INDEX_CORE_VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod bus;
pub mod cancel;
pub mod changeset;
pub mod collector;
pub mod constants;
pub mod engine;
pub mod error;
pub mod index;
pub mod indexer;
pub mod loader;
pub mod preprocess;
pub mod reindex;
pub mod repository;
pub mod types;

pub use bus::EventBus;
pub use cancel::CancellationToken;
pub use changeset::ChangeSet;
pub use collector::Collector;
pub use constants::*;
pub use engine::{Engine, EngineHandle};
pub use error::{IndexError, Result};
pub use index::{
    Batch, CommitStats, IndexField, ReferencePage, SearchHit, SearchIndex, SearchPage,
    SharedIndex,
};
pub use indexer::BatchIndexer;
pub use loader::{Loader, LoaderSet};
pub use preprocess::Preprocessor;
pub use reindex::FullReindexer;
pub use repository::{MemoryRepository, Page, ReaderRepository, TransactionManager};
pub use types::{
    ChangeEvent, Document, DocumentKey, EngineConfig, EngineConfigBuilder, Entity, EntityId,
    EntityType, Performer, PerformerDocument, Report, Scene, SceneDocument, Studio,
    StudioDocument, Tag, TagDocument,
};
