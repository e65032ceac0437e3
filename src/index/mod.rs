//! Full-text index boundary.
//!
//! [`SearchIndex`] owns a tantivy index directory, its single writer and a
//! manually reloaded reader. Writes are staged in a [`Batch`] and applied by
//! [`SearchIndex::commit`]; readers only observe a batch once it is committed.
//! The engine shares the index as a [`SharedIndex`] and takes the write lock
//! only around commits, so searches and reverse lookups never wait on document
//! construction.

mod schema;

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use tantivy::collector::{Count, TopDocs};
use tantivy::directory::MmapDirectory;
use tantivy::query::{QueryParser, TermQuery};
use tantivy::schema::IndexRecordOption;
use tantivy::{
    DocAddress, Index, IndexReader, IndexSettings, IndexWriter, ReloadPolicy, Score,
    TantivyDocument, TantivyError, Term,
};

use crate::error::{IndexError, Result};
use crate::types::{Document, DocumentKey, EntityId};

pub use schema::IndexField;
use schema::{Fields, SCHEMA};

/// Index guarded for concurrent searches and a single writer.
pub type SharedIndex = Arc<RwLock<SearchIndex>>;

/// Tantivy refuses writer budgets below this per indexing thread.
const MIN_WRITER_HEAP_BYTES: usize = 15_000_000;

/// Pending writes, applied in insertion order on commit.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    ops: Vec<BatchOp>,
}

#[derive(Debug, Clone)]
enum BatchOp {
    Index(Document),
    Delete(DocumentKey),
}

impl Batch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage an upsert. Any document already stored under the same key is replaced.
    pub fn index(&mut self, doc: Document) {
        self.ops.push(BatchOp::Index(doc));
    }

    pub fn delete(&mut self, key: DocumentKey) {
        self.ops.push(BatchOp::Delete(key));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn reset(&mut self) {
        self.ops.clear();
    }
}

/// Outcome of one commit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitStats {
    pub indexed: usize,
    pub deleted: usize,
    /// Documents skipped because they could not be converted or added.
    pub failed: usize,
}

/// One page of documents referencing an entity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferencePage {
    /// Documents matched on this page, including any whose key could not be read.
    pub matched: usize,
    pub keys: Vec<DocumentKey>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub key: DocumentKey,
    pub score: Score,
    pub document: Document,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchPage {
    /// Matching documents across all pages.
    pub total: usize,
    pub hits: Vec<SearchHit>,
}

pub struct SearchIndex {
    index: Index,
    writer: IndexWriter,
    reader: IndexReader,
    fields: Fields,
    path: PathBuf,
}

impl fmt::Debug for SearchIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchIndex")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SearchIndex {
    /// Open the index stored in `dir`, creating the directory and an empty index
    /// if needed. The flag is `true` when a new index was created.
    pub fn open_or_create(dir: &Path, writer_heap_bytes: usize) -> Result<(Self, bool)> {
        fs::create_dir_all(dir)?;
        let directory = MmapDirectory::open(dir)?;
        let exists = Index::exists(&directory).map_err(TantivyError::from)?;

        let index = if exists {
            Index::open(directory)?
        } else {
            Index::create(directory, SCHEMA.clone(), IndexSettings::default())?
        };
        let fields = Fields::resolve(&index.schema())?;

        let heap = writer_heap_bytes.max(MIN_WRITER_HEAP_BYTES);
        let writer = index.writer_with_num_threads(1, heap)?;
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;

        tracing::info!(
            path = %dir.display(),
            created = !exists,
            docs = reader.searcher().num_docs(),
            "search index opened"
        );

        Ok((
            Self {
                index,
                writer,
                reader,
                fields,
                path: dir.to_path_buf(),
            },
            !exists,
        ))
    }

    /// Wrap the index for sharing between the engine loop and searchers.
    #[must_use]
    pub fn into_shared(self) -> SharedIndex {
        Arc::new(RwLock::new(self))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn new_batch(&self) -> Batch {
        Batch::new()
    }

    fn key_term(&self, key: &DocumentKey) -> Term {
        Term::from_field_text(self.fields.key, &key.to_string())
    }

    /// Apply and commit every staged write, leaving `batch` empty.
    ///
    /// A document that cannot be converted or added is logged and counted as
    /// failed; the rest of the batch still commits. If the commit itself fails,
    /// pending writes are rolled back and the error is returned.
    pub fn commit(&mut self, batch: &mut Batch) -> Result<CommitStats> {
        let mut stats = CommitStats::default();

        for op in batch.ops.drain(..) {
            match op {
                BatchOp::Delete(key) => {
                    self.writer.delete_term(self.key_term(&key));
                    stats.deleted += 1;
                }
                BatchOp::Index(doc) => {
                    let key = doc.key();
                    let converted = match self.fields.build_document(&doc) {
                        Ok(converted) => converted,
                        Err(err) => {
                            tracing::warn!(%key, error = %err, "failed to build index document");
                            stats.failed += 1;
                            continue;
                        }
                    };
                    self.writer.delete_term(self.key_term(&key));
                    match self.writer.add_document(converted) {
                        Ok(_) => stats.indexed += 1,
                        Err(err) => {
                            tracing::warn!(%key, error = %err, "failed to add index document");
                            stats.failed += 1;
                        }
                    }
                }
            }
        }

        if let Err(err) = self.writer.commit() {
            if let Err(rollback) = self.writer.rollback() {
                tracing::error!(error = %rollback, "rollback after failed commit failed");
            }
            return Err(err.into());
        }
        self.reader.reload()?;

        tracing::debug!(
            indexed = stats.indexed,
            deleted = stats.deleted,
            failed = stats.failed,
            "search index committed"
        );
        Ok(stats)
    }

    /// Committed document count.
    #[must_use]
    pub fn num_docs(&self) -> u64 {
        self.reader.searcher().num_docs()
    }

    pub fn get(&self, key: &DocumentKey) -> Result<Option<Document>> {
        let searcher = self.reader.searcher();
        let query = TermQuery::new(self.key_term(key), IndexRecordOption::Basic);
        let top = searcher.search(&query, &TopDocs::with_limit(1))?;
        match top.first() {
            Some((_, address)) => {
                let doc: TantivyDocument = searcher.doc(*address)?;
                Ok(self.fields.source_of(&doc))
            }
            None => Ok(None),
        }
    }

    /// Keys of documents whose `field` holds `id`, one page at a time.
    ///
    /// Used to find the scenes embedding a member entity that no longer exists in
    /// the store. Pages are stable as long as no commit happens between calls;
    /// callers advance by `matched`, not by the number of keys.
    pub fn find_referencing(
        &self,
        field: IndexField,
        id: EntityId,
        limit: usize,
        offset: usize,
    ) -> Result<ReferencePage> {
        if limit == 0 {
            return Ok(ReferencePage::default());
        }
        let searcher = self.reader.searcher();
        let term = Term::from_field_u64(self.fields.get(field), id);
        let query = TermQuery::new(term, IndexRecordOption::Basic);
        let top = searcher.search(&query, &TopDocs::with_limit(limit).and_offset(offset))?;

        let matched = top.len();
        let mut keys = Vec::with_capacity(matched);
        for (_, address) in top {
            if let Some(key) = self.key_at(&searcher, address)? {
                keys.push(key);
            }
        }
        Ok(ReferencePage { matched, keys })
    }

    fn key_at(&self, searcher: &tantivy::Searcher, address: DocAddress) -> Result<Option<DocumentKey>> {
        let doc: TantivyDocument = searcher.doc(address)?;
        Ok(self.fields.key_of(&doc))
    }

    /// Free-text search over names, details, aliases and embedded member names.
    pub fn search(&self, query: &str, limit: usize, offset: usize) -> Result<SearchPage> {
        let searcher = self.reader.searcher();
        let parser = QueryParser::for_index(&self.index, self.fields.default_search_fields());
        let query = parser.parse_query(query)?;

        if limit == 0 {
            let total = searcher.search(&*query, &Count)?;
            return Ok(SearchPage {
                total,
                hits: Vec::new(),
            });
        }

        let (top, total) = searcher.search(
            &*query,
            &(TopDocs::with_limit(limit).and_offset(offset), Count),
        )?;

        let mut hits = Vec::with_capacity(top.len());
        for (score, address) in top {
            let doc: TantivyDocument = searcher.doc(address)?;
            let (Some(key), Some(document)) = (self.fields.key_of(&doc), self.fields.source_of(&doc))
            else {
                continue;
            };
            hits.push(SearchHit {
                key,
                score,
                document,
            });
        }
        Ok(SearchPage { total, hits })
    }
}

pub(crate) fn read(index: &SharedIndex) -> Result<RwLockReadGuard<'_, SearchIndex>> {
    index.read().map_err(|_| IndexError::poisoned("search index"))
}

pub(crate) fn write(index: &SharedIndex) -> Result<RwLockWriteGuard<'_, SearchIndex>> {
    index.write().map_err(|_| IndexError::poisoned("search index"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        EmbeddedRef, EntityType, PerformerDocument, Scene, SceneDocument, Tag, TagDocument,
    };
    use tempfile::TempDir;

    const HEAP: usize = 20_000_000;

    fn scene_doc(id: EntityId, title: &str, tags: &[(EntityId, &str)]) -> Document {
        let mut doc = SceneDocument::new(&Scene::new(id, title), None, &[], &[]);
        doc.tags = tags.iter().map(|(id, name)| EmbeddedRef::new(*id, *name)).collect();
        Document::Scene(doc)
    }

    fn open(dir: &TempDir) -> SearchIndex {
        SearchIndex::open_or_create(dir.path(), HEAP).unwrap().0
    }

    #[test]
    fn open_reports_creation_only_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("index");
        let (index, created) = SearchIndex::open_or_create(&path, HEAP).unwrap();
        assert!(created);
        drop(index);
        let (_, created) = SearchIndex::open_or_create(&path, HEAP).unwrap();
        assert!(!created);
    }

    #[test]
    fn batch_is_invisible_until_commit_and_empty_after() {
        let dir = TempDir::new().unwrap();
        let mut index = open(&dir);
        let mut batch = index.new_batch();
        batch.index(Document::Tag(TagDocument::from(&Tag::new(1, "outdoor"))));
        assert_eq!(batch.len(), 1);
        assert_eq!(index.num_docs(), 0);

        let stats = index.commit(&mut batch).unwrap();
        assert!(batch.is_empty());
        assert_eq!(stats.indexed, 1);
        assert_eq!(index.num_docs(), 1);
    }

    #[test]
    fn upsert_replaces_and_delete_removes() {
        let dir = TempDir::new().unwrap();
        let mut index = open(&dir);
        let key = DocumentKey::new(EntityType::Scene, 3);

        let mut batch = index.new_batch();
        batch.index(scene_doc(3, "first", &[]));
        index.commit(&mut batch).unwrap();
        batch.index(scene_doc(3, "second", &[]));
        index.commit(&mut batch).unwrap();

        assert_eq!(index.num_docs(), 1);
        match index.get(&key).unwrap() {
            Some(Document::Scene(scene)) => assert_eq!(scene.title.as_deref(), Some("second")),
            other => panic!("unexpected document: {other:?}"),
        }

        batch.delete(key);
        let stats = index.commit(&mut batch).unwrap();
        assert_eq!(stats.deleted, 1);
        assert_eq!(index.get(&key).unwrap(), None);
        assert_eq!(index.num_docs(), 0);
    }

    #[test]
    fn deleting_an_unknown_key_is_harmless() {
        let dir = TempDir::new().unwrap();
        let mut index = open(&dir);
        let mut batch = index.new_batch();
        batch.delete(DocumentKey::new(EntityType::Performer, 99));
        assert!(index.commit(&mut batch).is_ok());
    }

    #[test]
    fn referencing_documents_are_paged() {
        let dir = TempDir::new().unwrap();
        let mut index = open(&dir);
        let mut batch = index.new_batch();
        for id in 1..=5 {
            batch.index(scene_doc(id, "scene", &[(42, "shared")]));
        }
        batch.index(scene_doc(6, "other", &[(7, "unrelated")]));
        index.commit(&mut batch).unwrap();

        let mut seen = Vec::new();
        let mut offset = 0;
        loop {
            let page = index.find_referencing(IndexField::TagId, 42, 2, offset).unwrap();
            if page.matched == 0 {
                break;
            }
            offset += page.matched;
            seen.extend(page.keys.into_iter().map(|key| key.id));
        }
        seen.sort_unstable();
        assert_eq!(seen, vec![1, 2, 3, 4, 5]);
        let none = index.find_referencing(IndexField::TagId, 1000, 10, 0).unwrap();
        assert_eq!(none, ReferencePage::default());
    }

    #[test]
    fn unreadable_keys_still_count_as_matches() {
        let dir = TempDir::new().unwrap();
        let mut index = open(&dir);
        let mut batch = index.new_batch();
        for id in 1..=3 {
            batch.index(scene_doc(id, "scene", &[(42, "shared")]));
        }
        index.commit(&mut batch).unwrap();

        let mut raw = TantivyDocument::new();
        raw.add_text(index.fields.key, "not-a-key");
        raw.add_u64(index.fields.get(IndexField::TagId), 42);
        index.writer.add_document(raw).unwrap();
        index.writer.commit().unwrap();
        index.reader.reload().unwrap();

        let all = index.find_referencing(IndexField::TagId, 42, 10, 0).unwrap();
        assert_eq!(all.matched, 4);
        assert_eq!(all.keys.len(), 3);

        let mut seen = Vec::new();
        let mut offset = 0;
        loop {
            let page = index.find_referencing(IndexField::TagId, 42, 2, offset).unwrap();
            offset += page.matched;
            seen.extend(page.keys.into_iter().map(|key| key.id));
            if page.matched < 2 {
                break;
            }
        }
        seen.sort_unstable();
        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[test]
    fn search_matches_embedded_member_names() {
        let dir = TempDir::new().unwrap();
        let mut index = open(&dir);
        let mut batch = index.new_batch();
        batch.index(scene_doc(1, "Morning run", &[(5, "beach")]));
        batch.index(scene_doc(2, "Evening walk", &[]));
        batch.index(Document::Performer(PerformerDocument {
            id: 9,
            name: "Beach Walker".into(),
            disambiguation: None,
            aliases: vec![],
            gender: None,
        }));
        index.commit(&mut batch).unwrap();

        let page = index.search("beach", 10, 0).unwrap();
        assert_eq!(page.total, 2);
        let mut keys: Vec<String> = page.hits.iter().map(|hit| hit.key.to_string()).collect();
        keys.sort();
        assert_eq!(keys, vec!["Performer:9", "Scene:1"]);

        let counted = index.search("walk", 0, 0).unwrap();
        assert_eq!(counted.total, 1);
        assert!(counted.hits.is_empty());
    }
}
