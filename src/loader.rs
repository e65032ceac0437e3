//! Per-run entity caches with batched fetch and explicit priming.
//!
//! A [`LoaderSet`] belongs to exactly one processing run (an incremental batch or
//! a full reindex) and is never shared between runs. Misses are fetched with one
//! repository call per `load_all`, duplicate ids inside a call are fetched once,
//! and entities obtained incidentally (a scene's performers, say) can be primed
//! so the indexer does not read them again.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::repository::ReaderRepository;
use crate::types::{Entity, EntityId, Performer, Scene, Studio, Tag};

/// Counters describing how a loader served its callers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoaderStats {
    /// Ids answered from the cache, primed or fetched earlier.
    pub hits: usize,
    /// Repository round trips.
    pub fetch_calls: usize,
    /// Distinct ids requested from the repository.
    pub fetched: usize,
    pub primed: usize,
}

/// Cache of one entity type. `None` entries remember that an id is absent.
#[derive(Debug)]
pub struct Loader<T: Entity> {
    cache: HashMap<EntityId, Option<Arc<T>>>,
    stats: LoaderStats,
}

impl<T: Entity> Default for Loader<T> {
    fn default() -> Self {
        Self {
            cache: HashMap::new(),
            stats: LoaderStats::default(),
        }
    }
}

impl<T: Entity> Loader<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a known value without fetching. Replaces whatever was cached for `id`.
    pub fn prime(&mut self, id: EntityId, entity: T) {
        self.stats.primed += 1;
        self.cache.insert(id, Some(Arc::new(entity)));
    }

    pub fn load(&mut self, repo: &dyn ReaderRepository, id: EntityId) -> Option<Arc<T>> {
        self.load_all(repo, &[id]).pop().flatten()
    }

    /// Resolve every id, fetching all misses in a single repository call.
    ///
    /// The result is aligned with `ids`. A failed fetch is logged and its ids are
    /// cached as absent for the rest of the run.
    pub fn load_all(
        &mut self,
        repo: &dyn ReaderRepository,
        ids: &[EntityId],
    ) -> Vec<Option<Arc<T>>> {
        let mut seen = HashSet::new();
        let missing: Vec<EntityId> = ids
            .iter()
            .copied()
            .filter(|id| !self.cache.contains_key(id) && seen.insert(*id))
            .collect();
        self.stats.hits += ids.len() - missing.len();

        if !missing.is_empty() {
            self.fetch(repo, &missing);
        }

        ids.iter()
            .map(|id| self.cache.get(id).cloned().flatten())
            .collect()
    }

    fn fetch(&mut self, repo: &dyn ReaderRepository, ids: &[EntityId]) {
        self.stats.fetch_calls += 1;
        self.stats.fetched += ids.len();

        match T::fetch_many(repo, ids) {
            Ok(found) if found.len() == ids.len() => {
                for (id, entity) in ids.iter().zip(found) {
                    self.cache.insert(*id, entity.map(Arc::new));
                }
            }
            Ok(found) => {
                tracing::warn!(
                    entity = %T::TYPE,
                    requested = ids.len(),
                    returned = found.len(),
                    "repository returned a misaligned batch; treating ids as missing"
                );
                self.forget_as_missing(ids);
            }
            Err(err) => {
                tracing::warn!(
                    entity = %T::TYPE,
                    count = ids.len(),
                    error = %err,
                    "loading entities failed; treating ids as missing"
                );
                self.forget_as_missing(ids);
            }
        }
    }

    fn forget_as_missing(&mut self, ids: &[EntityId]) {
        for id in ids {
            self.cache.insert(*id, None);
        }
    }

    /// Cached value for `id`, if the loader has seen it. Never fetches.
    #[must_use]
    pub fn peek(&self, id: EntityId) -> Option<Option<Arc<T>>> {
        self.cache.get(&id).cloned()
    }

    /// Drop every cached entry.
    pub fn reset(&mut self) {
        self.cache.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    #[must_use]
    pub fn stats(&self) -> LoaderStats {
        self.stats
    }
}

/// One loader per indexed entity type.
#[derive(Debug, Default)]
pub struct LoaderSet {
    pub scene: Loader<Scene>,
    pub performer: Loader<Performer>,
    pub tag: Loader<Tag>,
    pub studio: Loader<Studio>,
}

impl LoaderSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Discard caches of large tables that are unlikely to be revisited.
    /// Small reference tables keep their entries for the whole run.
    pub fn reset(&mut self) {
        self.scene.reset();
    }

    #[must_use]
    pub fn loader<T: Cached>(&self) -> &Loader<T> {
        T::loader(self)
    }

    pub fn loader_mut<T: Cached>(&mut self) -> &mut Loader<T> {
        T::loader_mut(self)
    }
}

/// Binds an entity type to its slot in a [`LoaderSet`].
pub trait Cached: Entity {
    fn loader(set: &LoaderSet) -> &Loader<Self>;
    fn loader_mut(set: &mut LoaderSet) -> &mut Loader<Self>;
}

macro_rules! cached {
    ($ty:ty, $field:ident) => {
        impl Cached for $ty {
            fn loader(set: &LoaderSet) -> &Loader<Self> {
                &set.$field
            }

            fn loader_mut(set: &mut LoaderSet) -> &mut Loader<Self> {
                &mut set.$field
            }
        }
    };
}

cached!(Scene, scene);
cached!(Performer, performer);
cached!(Tag, tag);
cached!(Studio, studio);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{MemoryRepository, TransactionManager};

    fn repo() -> MemoryRepository {
        let repo = MemoryRepository::new();
        repo.upsert_performer(Performer::new(5, "Five"));
        repo.upsert_performer(Performer::new(7, "Seven"));
        repo
    }

    #[test]
    fn duplicate_ids_are_fetched_once() {
        let repo = repo();
        let mut loader: Loader<Performer> = Loader::new();

        let loaded = repo
            .with_read_txn(|r| Ok(loader.load_all(r, &[5, 5, 7])))
            .unwrap();

        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded[0].as_deref().map(|p| p.id), Some(5));
        assert_eq!(loaded[1].as_deref().map(|p| p.id), Some(5));
        assert_eq!(loaded[2].as_deref().map(|p| p.id), Some(7));
        let stats = loader.stats();
        assert_eq!(stats.fetch_calls, 1);
        assert_eq!(stats.fetched, 2);
    }

    #[test]
    fn cached_ids_skip_the_repository() {
        let repo = repo();
        let mut loader: Loader<Performer> = Loader::new();
        repo.with_read_txn(|r| {
            loader.load_all(r, &[5]);
            loader.load_all(r, &[5, 7]);
            Ok(())
        })
        .unwrap();

        let stats = loader.stats();
        assert_eq!(stats.fetch_calls, 2);
        assert_eq!(stats.fetched, 2);
        assert_eq!(stats.hits, 1);
    }

    #[test]
    fn primed_values_are_served_without_fetch() {
        let repo = MemoryRepository::new();
        let mut loader: Loader<Tag> = Loader::new();
        loader.prime(9, Tag::new(9, "Primed"));

        let tag = repo.with_read_txn(|r| Ok(loader.load(r, 9))).unwrap();

        assert_eq!(tag.as_deref().map(|t| t.name.as_str()), Some("Primed"));
        assert_eq!(loader.stats().fetch_calls, 0);
        assert_eq!(loader.stats().primed, 1);
    }

    #[test]
    fn missing_and_failed_ids_load_as_absent() {
        let repo = repo();
        let mut loader: Loader<Performer> = Loader::new();
        let missing = repo.with_read_txn(|r| Ok(loader.load(r, 404))).unwrap();
        assert!(missing.is_none());
        assert_eq!(loader.peek(404), Some(None));

        repo.set_offline(true);
        let failed = repo.with_read_txn(|r| Ok(loader.load(r, 7))).unwrap();
        assert!(failed.is_none());
        assert_eq!(loader.peek(7), Some(None));
    }

    #[test]
    fn reset_only_drops_large_tables() {
        let mut loaders = LoaderSet::new();
        loaders.scene.prime(1, Scene::new(1, "one"));
        loaders.loader_mut::<Tag>().prime(2, Tag::new(2, "two"));

        loaders.reset();

        assert_eq!(loaders.scene.len(), 0);
        assert_eq!(loaders.loader::<Tag>().len(), 1);
    }
}
