//! Chunked translation of a change set into index writes.

use std::collections::BTreeSet;

use tracing::instrument;

use crate::changeset::ChangeSet;
use crate::error::Result;
use crate::index::{self, Batch, CommitStats, SharedIndex};
use crate::loader::{Cached, LoaderSet};
use crate::repository::{ReaderRepository, TransactionManager};
use crate::types::{
    Document, DocumentKey, EntityId, EntityType, Performer, PerformerDocument, Report, Scene,
    SceneDocument, Studio, StudioDocument, Tag, TagDocument,
};

/// Builds the standalone document of a member entity.
pub trait MemberDocument: Cached {
    fn document(&self) -> Document;
}

impl MemberDocument for Tag {
    fn document(&self) -> Document {
        Document::Tag(TagDocument::from(self))
    }
}

impl MemberDocument for Performer {
    fn document(&self) -> Document {
        Document::Performer(PerformerDocument::from(self))
    }
}

impl MemberDocument for Studio {
    fn document(&self) -> Document {
        Document::Studio(StudioDocument::from(self))
    }
}

/// Drains a change set into the index, Tag, Performer, Studio, then scenes in chunks.
#[derive(Debug)]
pub struct BatchIndexer<'a, M> {
    txn: &'a M,
    index: &'a SharedIndex,
    scene_chunk_size: usize,
}

impl<'a, M: TransactionManager> BatchIndexer<'a, M> {
    #[must_use]
    pub fn new(txn: &'a M, index: &'a SharedIndex, scene_chunk_size: usize) -> Self {
        Self {
            txn,
            index,
            scene_chunk_size: scene_chunk_size.max(1),
        }
    }

    /// Index or delete every pending id, leaving `changes` empty.
    ///
    /// Member types are staged whole; scenes are staged one chunk at a time and
    /// the batch is committed after every chunk. A failed commit is logged and
    /// its chunk dropped; later chunks are still written. At least one commit
    /// happens even without scenes.
    #[instrument(target = "media_index::indexer", skip_all, fields(pending = changes.len()))]
    pub fn process(&self, changes: &mut ChangeSet, loaders: &mut LoaderSet) -> Report {
        let mut report = Report::default();
        let mut batch = Batch::new();

        self.stage_members::<Tag>(changes, loaders, &mut batch);
        self.stage_members::<Performer>(changes, loaders, &mut batch);
        self.stage_members::<Studio>(changes, loaders, &mut batch);

        loop {
            let (ids, more) = changes.extract_bounded(EntityType::Scene, Some(self.scene_chunk_size));
            self.stage_scenes(&ids, loaders, &mut batch);
            let staged = batch.len();
            match self.commit(&mut batch) {
                Ok(stats) => {
                    report += Report {
                        updated: stats.indexed,
                        deleted: stats.deleted,
                    };
                }
                Err(err) => tracing::warn!(staged, error = %err, "batch index error"),
            }
            if !more {
                break;
            }
        }

        tracing::debug!(%report, "change set indexed");
        report
    }

    /// Commit under the write lock. The batch is empty afterwards either way.
    fn commit(&self, batch: &mut Batch) -> Result<CommitStats> {
        let stats = index::write(self.index).and_then(|mut index| index.commit(batch));
        batch.reset();
        stats
    }

    fn stage_members<T: MemberDocument>(
        &self,
        changes: &mut ChangeSet,
        loaders: &mut LoaderSet,
        batch: &mut Batch,
    ) {
        let (ids, _) = changes.extract_bounded(T::TYPE, None);
        if ids.is_empty() {
            return;
        }
        let loader = loaders.loader_mut::<T>();
        let loaded = self
            .txn
            .with_read_txn(|repo| Ok(loader.load_all(repo, &ids)));
        let loaded = match loaded {
            Ok(loaded) => loaded,
            Err(err) => {
                tracing::warn!(entity = %T::TYPE, error = %err, "read transaction failed");
                return;
            }
        };

        for (id, entity) in ids.into_iter().zip(loaded) {
            match entity {
                Some(entity) => batch.index(entity.document()),
                None => batch.delete(DocumentKey::new(T::TYPE, id)),
            }
        }
    }

    fn stage_scenes(&self, ids: &[EntityId], loaders: &mut LoaderSet, batch: &mut Batch) {
        if ids.is_empty() {
            return;
        }
        let staged = self.txn.with_read_txn(|repo| {
            let scenes = loaders.scene.load_all(repo, ids);
            let studio_ids: Vec<EntityId> = scenes
                .iter()
                .flatten()
                .filter_map(|scene| scene.studio_id)
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            if !studio_ids.is_empty() {
                loaders.studio.load_all(repo, &studio_ids);
            }
            for (id, scene) in ids.iter().copied().zip(scenes) {
                match scene {
                    Some(scene) => {
                        if let Some(doc) = scene_document(repo, &scene, loaders) {
                            batch.index(Document::Scene(doc));
                        }
                    }
                    None => batch.delete(DocumentKey::new(EntityType::Scene, id)),
                }
            }
            Ok(())
        });
        if let Err(err) = staged {
            tracing::warn!(count = ids.len(), error = %err, "read transaction failed");
        }
    }
}

/// Resolve a scene's members and build its document. `None` if the members
/// cannot be read; the scene keeps its previous document until the next run.
fn scene_document(
    repo: &dyn ReaderRepository,
    scene: &Scene,
    loaders: &mut LoaderSet,
) -> Option<SceneDocument> {
    let performers = match repo.find_performers_by_scene(scene.id) {
        Ok(performers) => performers,
        Err(err) => {
            tracing::warn!(id = scene.id, error = %err, "failed to load scene performers");
            return None;
        }
    };
    let tags = match repo.find_tags_by_scene(scene.id) {
        Ok(tags) => tags,
        Err(err) => {
            tracing::warn!(id = scene.id, error = %err, "failed to load scene tags");
            return None;
        }
    };
    // Cached by the chunk's batched studio fetch.
    let studio = scene
        .studio_id
        .and_then(|studio_id| loaders.studio.load(repo, studio_id));

    let doc = SceneDocument::new(
        scene,
        studio.as_deref(),
        &performers.iter().collect::<Vec<_>>(),
        &tags.iter().collect::<Vec<_>>(),
    );

    for performer in performers {
        loaders.performer.prime(performer.id, performer);
    }
    for tag in tags {
        loaders.tag.prime(tag.id, tag);
    }
    Some(doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::SearchIndex;
    use crate::repository::MemoryRepository;
    use crate::types::ChangeEvent;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use tempfile::TempDir;

    fn shared_index(dir: &TempDir) -> SharedIndex {
        SearchIndex::open_or_create(dir.path(), 20_000_000)
            .unwrap()
            .0
            .into_shared()
    }

    fn library() -> MemoryRepository {
        let repo = MemoryRepository::new();
        repo.upsert_studio(Studio::new(1, "Harbor Films"));
        repo.upsert_performer(Performer::new(2, "Ada"));
        repo.upsert_tag(Tag::new(3, "night"));
        let mut scene = Scene::new(4, "Docks");
        scene.studio_id = Some(1);
        scene.date = Some("2019-06-30".into());
        repo.upsert_scene(scene);
        repo.set_scene_performers(4, &[2]);
        repo.set_scene_tags(4, &[3]);
        repo
    }

    #[test]
    fn scene_documents_embed_members_and_prime_loaders() {
        let dir = TempDir::new().unwrap();
        let index = shared_index(&dir);
        let repo = library();

        let mut changes: ChangeSet = [ChangeEvent::scene(4)].into_iter().collect();
        let mut loaders = LoaderSet::new();
        let report = BatchIndexer::new(&repo, &index, 10)
            .process(&mut changes, &mut loaders);

        assert_eq!(report, Report { updated: 1, deleted: 0 });
        assert!(changes.is_empty());
        assert!(loaders.performer.peek(2).flatten().is_some());
        assert!(loaders.tag.peek(3).flatten().is_some());

        let guard = index.read().unwrap();
        let Some(Document::Scene(doc)) = guard.get(&DocumentKey::new(EntityType::Scene, 4)).unwrap()
        else {
            panic!("scene 4 was not indexed");
        };
        assert_eq!(doc.year, Some(2019));
        assert_eq!(doc.studio.map(|s| s.name), Some("Harbor Films".to_string()));
        assert_eq!(doc.performers[0].name, "Ada");
        assert_eq!(doc.tags[0].name, "night");
    }

    #[test]
    fn absent_entities_become_deletes() {
        let dir = TempDir::new().unwrap();
        let index = shared_index(&dir);
        let repo = library();
        let mut changes: ChangeSet = [ChangeEvent::scene(4), ChangeEvent::tag(3)]
            .into_iter()
            .collect();
        BatchIndexer::new(&repo, &index, 10)
            .process(&mut changes, &mut LoaderSet::new());
        assert_eq!(index.read().unwrap().num_docs(), 2);

        repo.delete_scene(4);
        repo.delete_tag(3);
        let mut changes: ChangeSet = [ChangeEvent::scene(4), ChangeEvent::tag(3)]
            .into_iter()
            .collect();
        let report = BatchIndexer::new(&repo, &index, 10)
            .process(&mut changes, &mut LoaderSet::new());

        assert_eq!(report, Report { updated: 0, deleted: 2 });
        assert_eq!(index.read().unwrap().num_docs(), 0);
    }

    #[test]
    fn scenes_are_committed_per_chunk() {
        let dir = TempDir::new().unwrap();
        let index = shared_index(&dir);
        let repo = MemoryRepository::new();
        for id in 1..=25 {
            repo.upsert_scene(Scene::new(id, format!("scene {id}")));
        }

        let mut changes: ChangeSet = (1..=25).map(ChangeEvent::scene).collect();
        let mut loaders = LoaderSet::new();
        let report = BatchIndexer::new(&repo, &index, 10)
            .process(&mut changes, &mut loaders);

        assert_eq!(report.updated, 25);
        assert_eq!(index.read().unwrap().num_docs(), 25);
        assert_eq!(loaders.scene.stats().fetch_calls, 3);
    }

    /// Clears the index lock's poison from the second read transaction on.
    struct RecoveringStore<'a> {
        repo: MemoryRepository,
        index: &'a SharedIndex,
        reads: AtomicUsize,
    }

    impl TransactionManager for RecoveringStore<'_> {
        fn with_read_txn<T, F>(&self, f: F) -> Result<T>
        where
            F: FnOnce(&dyn ReaderRepository) -> Result<T>,
        {
            if self.reads.fetch_add(1, Ordering::SeqCst) >= 1 {
                self.index.clear_poison();
            }
            self.repo.with_read_txn(f)
        }
    }

    fn poison(index: &SharedIndex) {
        let index = Arc::clone(index);
        let _ = thread::spawn(move || {
            let _guard = index.write().unwrap();
            panic!("writer died while holding the index lock");
        })
        .join();
    }

    #[test]
    fn failed_commit_keeps_later_chunks() {
        let dir = TempDir::new().unwrap();
        let index = shared_index(&dir);
        let repo = MemoryRepository::new();
        for id in 1..=5 {
            repo.upsert_scene(Scene::new(id, format!("scene {id}")));
        }
        let store = RecoveringStore {
            repo,
            index: &index,
            reads: AtomicUsize::new(0),
        };
        poison(&index);

        let mut changes: ChangeSet = (1..=5).map(ChangeEvent::scene).collect();
        let mut loaders = LoaderSet::new();
        let report = BatchIndexer::new(&store, &index, 1).process(&mut changes, &mut loaders);

        assert!(changes.is_empty());
        assert_eq!(loaders.scene.stats().fetch_calls, 5);
        assert_eq!(report, Report { updated: 4, deleted: 0 });

        let guard = index.read().unwrap();
        assert_eq!(guard.num_docs(), 4);
        assert!(guard.get(&DocumentKey::new(EntityType::Scene, 1)).unwrap().is_none());
        assert!(guard.get(&DocumentKey::new(EntityType::Scene, 5)).unwrap().is_some());
    }

    #[test]
    fn studios_are_fetched_once_per_chunk() {
        let dir = TempDir::new().unwrap();
        let index = shared_index(&dir);
        let repo = MemoryRepository::new();
        repo.upsert_studio(Studio::new(1, "North"));
        repo.upsert_studio(Studio::new(2, "South"));
        for (id, studio) in [(10, 1), (11, 2), (12, 1), (13, 2)] {
            let mut scene = Scene::new(id, "s");
            scene.studio_id = Some(studio);
            repo.upsert_scene(scene);
        }

        let mut changes: ChangeSet = (10..=13).map(ChangeEvent::scene).collect();
        let mut loaders = LoaderSet::new();
        let report = BatchIndexer::new(&repo, &index, 10).process(&mut changes, &mut loaders);

        assert_eq!(report.updated, 4);
        assert_eq!(loaders.studio.stats().fetch_calls, 1);
        assert_eq!(loaders.studio.stats().fetched, 2);
    }

    #[test]
    fn empty_change_set_still_commits_cleanly() {
        let dir = TempDir::new().unwrap();
        let index = shared_index(&dir);
        let repo = MemoryRepository::new();
        let report = BatchIndexer::new(&repo, &index, 10)
            .process(&mut ChangeSet::new(), &mut LoaderSet::new());
        assert!(report.is_empty());
    }
}
