//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use std::sync::Mutex;

use media_index_core::{
    EntityId, EntityType, MemoryRepository, Page, Performer, ReaderRepository, Result, Scene,
    SearchIndex, SharedIndex, Studio, Tag, TransactionManager,
};
use tempfile::TempDir;

pub const HEAP: usize = 20_000_000;

pub fn shared_index(dir: &TempDir) -> SharedIndex {
    SearchIndex::open_or_create(dir.path(), HEAP)
        .unwrap()
        .0
        .into_shared()
}

/// Store wrapper that records every page the engine asks for.
#[derive(Debug, Default)]
pub struct CountingStore {
    pub inner: MemoryRepository,
    pages: Mutex<Vec<(EntityType, usize)>>,
}

impl CountingStore {
    pub fn new(inner: MemoryRepository) -> Self {
        Self {
            inner,
            pages: Mutex::new(Vec::new()),
        }
    }

    /// Row counts of every page returned for `ty`, in request order.
    pub fn pages_of(&self, ty: EntityType) -> Vec<usize> {
        self.pages
            .lock()
            .unwrap()
            .iter()
            .filter(|(kind, _)| *kind == ty)
            .map(|(_, rows)| *rows)
            .collect()
    }
}

impl TransactionManager for CountingStore {
    fn with_read_txn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&dyn ReaderRepository) -> Result<T>,
    {
        self.inner.with_read_txn(|repo| {
            let reader = CountingReader {
                inner: repo,
                pages: &self.pages,
            };
            f(&reader)
        })
    }
}

struct CountingReader<'a> {
    inner: &'a dyn ReaderRepository,
    pages: &'a Mutex<Vec<(EntityType, usize)>>,
}

impl ReaderRepository for CountingReader<'_> {
    fn find_scenes(&self, ids: &[EntityId]) -> Result<Vec<Option<Scene>>> {
        self.inner.find_scenes(ids)
    }

    fn find_performers(&self, ids: &[EntityId]) -> Result<Vec<Option<Performer>>> {
        self.inner.find_performers(ids)
    }

    fn find_tags(&self, ids: &[EntityId]) -> Result<Vec<Option<Tag>>> {
        self.inner.find_tags(ids)
    }

    fn find_studios(&self, ids: &[EntityId]) -> Result<Vec<Option<Studio>>> {
        self.inner.find_studios(ids)
    }

    fn query_ids(&self, ty: EntityType, page: Page) -> Result<Vec<EntityId>> {
        let ids = self.inner.query_ids(ty, page)?;
        self.pages.lock().unwrap().push((ty, ids.len()));
        Ok(ids)
    }

    fn find_scene_ids_by_performer(&self, performer_id: EntityId) -> Result<Vec<EntityId>> {
        self.inner.find_scene_ids_by_performer(performer_id)
    }

    fn find_scene_ids_by_tag(&self, tag_id: EntityId) -> Result<Vec<EntityId>> {
        self.inner.find_scene_ids_by_tag(tag_id)
    }

    fn find_scene_ids_by_studio(&self, studio_id: EntityId) -> Result<Vec<EntityId>> {
        self.inner.find_scene_ids_by_studio(studio_id)
    }

    fn find_performers_by_scene(&self, scene_id: EntityId) -> Result<Vec<Performer>> {
        self.inner.find_performers_by_scene(scene_id)
    }

    fn find_tags_by_scene(&self, scene_id: EntityId) -> Result<Vec<Tag>> {
        self.inner.find_tags_by_scene(scene_id)
    }
}

/// Five scenes; performer 100 appears only on scene 1, tag 200 on scenes 2 and 5,
/// studio 300 owns scenes 3 and 4.
pub fn small_library() -> MemoryRepository {
    let repo = MemoryRepository::new();
    repo.upsert_performer(Performer::new(100, "Marisol Vega"));
    repo.upsert_performer(Performer::new(101, "Tomas Berg"));
    repo.upsert_tag(Tag::new(200, "rooftop"));
    repo.upsert_tag(Tag::new(201, "interview"));
    repo.upsert_studio(Studio::new(300, "Lantern Pictures"));

    for id in 1..=5 {
        let mut scene = Scene::new(id, format!("Scene {id}"));
        if id == 3 || id == 4 {
            scene.studio_id = Some(300);
        }
        scene.date = Some(format!("2021-0{id}-01"));
        repo.upsert_scene(scene);
    }
    repo.set_scene_performers(1, &[100, 101]);
    repo.set_scene_performers(2, &[101]);
    repo.set_scene_tags(2, &[200, 201]);
    repo.set_scene_tags(5, &[200]);
    repo
}
