//! Read-only boundary to the relational store.
//!
//! The engine never writes to the store. Every read goes through
//! [`TransactionManager::with_read_txn`] so a group of lookups sees one
//! consistent snapshot. [`MemoryRepository`] is a complete in-process
//! implementation used by embedders without a database and by the tests.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{IndexError, Result};
use crate::types::{EntityId, EntityType, Performer, Scene, Studio, Tag};

/// Zero-based page cursor over an id-ordered table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: usize,
    pub per_page: usize,
}

impl Page {
    #[must_use]
    pub fn new(page: usize, per_page: usize) -> Self {
        Self { page, per_page }
    }

    #[must_use]
    pub fn offset(&self) -> usize {
        self.page.saturating_mul(self.per_page)
    }
}

/// Queries the engine issues against the store inside a read transaction.
pub trait ReaderRepository {
    /// Batched lookups. Each result is aligned with `ids`; missing rows are `None`.
    fn find_scenes(&self, ids: &[EntityId]) -> Result<Vec<Option<Scene>>>;
    fn find_performers(&self, ids: &[EntityId]) -> Result<Vec<Option<Performer>>>;
    fn find_tags(&self, ids: &[EntityId]) -> Result<Vec<Option<Tag>>>;
    fn find_studios(&self, ids: &[EntityId]) -> Result<Vec<Option<Studio>>>;

    /// One page of ids of `ty`, ascending.
    fn query_ids(&self, ty: EntityType, page: Page) -> Result<Vec<EntityId>>;

    fn find_scene_ids_by_performer(&self, performer_id: EntityId) -> Result<Vec<EntityId>>;
    fn find_scene_ids_by_tag(&self, tag_id: EntityId) -> Result<Vec<EntityId>>;
    fn find_scene_ids_by_studio(&self, studio_id: EntityId) -> Result<Vec<EntityId>>;

    fn find_performers_by_scene(&self, scene_id: EntityId) -> Result<Vec<Performer>>;
    fn find_tags_by_scene(&self, scene_id: EntityId) -> Result<Vec<Tag>>;
}

/// Scopes reads to a transaction.
pub trait TransactionManager: Send + Sync {
    fn with_read_txn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&dyn ReaderRepository) -> Result<T>;
}

/// Scenes referencing a member entity, resolved through its foreign key.
pub fn scenes_referencing(
    repo: &dyn ReaderRepository,
    ty: EntityType,
    id: EntityId,
) -> Result<Vec<EntityId>> {
    match ty {
        EntityType::Tag => repo.find_scene_ids_by_tag(id),
        EntityType::Performer => repo.find_scene_ids_by_performer(id),
        EntityType::Studio => repo.find_scene_ids_by_studio(id),
        other => Err(IndexError::repository(format!(
            "{other} is not embedded in scenes"
        ))),
    }
}

#[derive(Debug, Default)]
struct Store {
    scenes: BTreeMap<EntityId, Scene>,
    performers: BTreeMap<EntityId, Performer>,
    tags: BTreeMap<EntityId, Tag>,
    studios: BTreeMap<EntityId, Studio>,
    scene_performers: BTreeMap<EntityId, BTreeSet<EntityId>>,
    scene_tags: BTreeMap<EntityId, BTreeSet<EntityId>>,
}

/// Thread-safe in-memory store with junction tables and cascading deletes.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    store: RwLock<Store>,
    offline: AtomicBool,
}

impl MemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn write(&self) -> RwLockWriteGuard<'_, Store> {
        match self.store.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Store>> {
        self.store
            .read()
            .map_err(|_| IndexError::poisoned("memory repository"))
    }

    /// Make every read fail, as if the database were unreachable.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn upsert_scene(&self, scene: Scene) {
        self.write().scenes.insert(scene.id, scene);
    }

    pub fn upsert_performer(&self, performer: Performer) {
        self.write().performers.insert(performer.id, performer);
    }

    pub fn upsert_tag(&self, tag: Tag) {
        self.write().tags.insert(tag.id, tag);
    }

    pub fn upsert_studio(&self, studio: Studio) {
        self.write().studios.insert(studio.id, studio);
    }

    pub fn set_scene_performers(&self, scene_id: EntityId, performer_ids: &[EntityId]) {
        self.write()
            .scene_performers
            .insert(scene_id, performer_ids.iter().copied().collect());
    }

    pub fn set_scene_tags(&self, scene_id: EntityId, tag_ids: &[EntityId]) {
        self.write()
            .scene_tags
            .insert(scene_id, tag_ids.iter().copied().collect());
    }

    pub fn delete_scene(&self, id: EntityId) -> bool {
        let mut store = self.write();
        store.scene_performers.remove(&id);
        store.scene_tags.remove(&id);
        store.scenes.remove(&id).is_some()
    }

    /// Removes the performer and its junction rows.
    pub fn delete_performer(&self, id: EntityId) -> bool {
        let mut store = self.write();
        for members in store.scene_performers.values_mut() {
            members.remove(&id);
        }
        store.performers.remove(&id).is_some()
    }

    /// Removes the tag and its junction rows.
    pub fn delete_tag(&self, id: EntityId) -> bool {
        let mut store = self.write();
        for members in store.scene_tags.values_mut() {
            members.remove(&id);
        }
        store.tags.remove(&id).is_some()
    }

    /// Removes the studio and clears it from its scenes.
    pub fn delete_studio(&self, id: EntityId) -> bool {
        let mut store = self.write();
        for scene in store.scenes.values_mut() {
            if scene.studio_id == Some(id) {
                scene.studio_id = None;
            }
        }
        store.studios.remove(&id).is_some()
    }

    #[must_use]
    pub fn count(&self, ty: EntityType) -> usize {
        let Ok(store) = self.read() else {
            return 0;
        };
        match ty {
            EntityType::Scene => store.scenes.len(),
            EntityType::Performer => store.performers.len(),
            EntityType::Tag => store.tags.len(),
            EntityType::Studio => store.studios.len(),
            _ => 0,
        }
    }
}

impl TransactionManager for MemoryRepository {
    fn with_read_txn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&dyn ReaderRepository) -> Result<T>,
    {
        let store = self.read()?;
        let reader = StoreReader {
            store: &store,
            offline: self.offline.load(Ordering::SeqCst),
        };
        f(&reader)
    }
}

struct StoreReader<'a> {
    store: &'a Store,
    offline: bool,
}

impl StoreReader<'_> {
    fn online(&self) -> Result<()> {
        if self.offline {
            Err(IndexError::repository("store is offline"))
        } else {
            Ok(())
        }
    }

    fn lookup<T: Clone>(
        &self,
        table: &BTreeMap<EntityId, T>,
        ids: &[EntityId],
    ) -> Result<Vec<Option<T>>> {
        self.online()?;
        Ok(ids.iter().map(|id| table.get(id).cloned()).collect())
    }
}

fn page_of<'a>(ids: impl Iterator<Item = &'a EntityId>, page: Page) -> Vec<EntityId> {
    ids.skip(page.offset()).take(page.per_page).copied().collect()
}

impl ReaderRepository for StoreReader<'_> {
    fn find_scenes(&self, ids: &[EntityId]) -> Result<Vec<Option<Scene>>> {
        self.lookup(&self.store.scenes, ids)
    }

    fn find_performers(&self, ids: &[EntityId]) -> Result<Vec<Option<Performer>>> {
        self.lookup(&self.store.performers, ids)
    }

    fn find_tags(&self, ids: &[EntityId]) -> Result<Vec<Option<Tag>>> {
        self.lookup(&self.store.tags, ids)
    }

    fn find_studios(&self, ids: &[EntityId]) -> Result<Vec<Option<Studio>>> {
        self.lookup(&self.store.studios, ids)
    }

    fn query_ids(&self, ty: EntityType, page: Page) -> Result<Vec<EntityId>> {
        self.online()?;
        let ids = match ty {
            EntityType::Scene => page_of(self.store.scenes.keys(), page),
            EntityType::Performer => page_of(self.store.performers.keys(), page),
            EntityType::Tag => page_of(self.store.tags.keys(), page),
            EntityType::Studio => page_of(self.store.studios.keys(), page),
            other => {
                return Err(IndexError::repository(format!("{other} is not queryable")));
            }
        };
        Ok(ids)
    }

    fn find_scene_ids_by_performer(&self, performer_id: EntityId) -> Result<Vec<EntityId>> {
        self.online()?;
        Ok(self
            .store
            .scene_performers
            .iter()
            .filter(|(_, members)| members.contains(&performer_id))
            .map(|(scene_id, _)| *scene_id)
            .collect())
    }

    fn find_scene_ids_by_tag(&self, tag_id: EntityId) -> Result<Vec<EntityId>> {
        self.online()?;
        Ok(self
            .store
            .scene_tags
            .iter()
            .filter(|(_, members)| members.contains(&tag_id))
            .map(|(scene_id, _)| *scene_id)
            .collect())
    }

    fn find_scene_ids_by_studio(&self, studio_id: EntityId) -> Result<Vec<EntityId>> {
        self.online()?;
        Ok(self
            .store
            .scenes
            .values()
            .filter(|scene| scene.studio_id == Some(studio_id))
            .map(|scene| scene.id)
            .collect())
    }

    fn find_performers_by_scene(&self, scene_id: EntityId) -> Result<Vec<Performer>> {
        self.online()?;
        Ok(self
            .store
            .scene_performers
            .get(&scene_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.store.performers.get(id).cloned())
            .collect())
    }

    fn find_tags_by_scene(&self, scene_id: EntityId) -> Result<Vec<Tag>> {
        self.online()?;
        Ok(self
            .store
            .scene_tags
            .get(&scene_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.store.tags.get(id).cloned())
            .collect())
    }
}
