//! Expansion of a raw change set to every scene whose document embeds a changed member.
//!
//! Members are visited Tag, Performer, Studio. A member that still exists is
//! resolved forward through the store's junction tables. A member that can no
//! longer be loaded has lost its foreign keys, so the scenes embedding it are
//! found by searching the index for documents that still reference it.

use tracing::instrument;

use crate::changeset::ChangeSet;
use crate::index::{self, IndexField, SharedIndex};
use crate::loader::{Cached, LoaderSet};
use crate::repository::{TransactionManager, scenes_referencing};
use crate::types::{EntityId, EntityType, Performer, Studio, Tag};

/// Propagates member changes to their containing scenes.
#[derive(Debug)]
pub struct Preprocessor<'a, M> {
    txn: &'a M,
    index: &'a SharedIndex,
    reverse_lookup_batch: usize,
}

impl<'a, M: TransactionManager> Preprocessor<'a, M> {
    #[must_use]
    pub fn new(txn: &'a M, index: &'a SharedIndex, reverse_lookup_batch: usize) -> Self {
        Self {
            txn,
            index,
            reverse_lookup_batch: reverse_lookup_batch.max(1),
        }
    }

    /// Track every scene affected by the pending members of `changes`, in place.
    ///
    /// Members loaded here stay cached in `loaders` for the indexer. Running this
    /// again on an expanded set adds nothing. Returns the number of scenes added.
    #[instrument(target = "media_index::preprocess", skip_all, fields(pending = changes.len()))]
    pub fn expand(&self, changes: &mut ChangeSet, loaders: &mut LoaderSet) -> usize {
        let before = changes.count(EntityType::Scene);
        self.expand_member::<Tag>(changes, loaders);
        self.expand_member::<Performer>(changes, loaders);
        self.expand_member::<Studio>(changes, loaders);
        let added = changes.count(EntityType::Scene) - before;
        tracing::debug!(added, "change set expanded");
        added
    }

    fn expand_member<T: Cached>(&self, changes: &mut ChangeSet, loaders: &mut LoaderSet) {
        let ids = changes.ids_of(T::TYPE);
        if ids.is_empty() {
            return;
        }
        let loader = loaders.loader_mut::<T>();

        let resolved = self.txn.with_read_txn(|repo| {
            let loaded = loader.load_all(repo, &ids);
            let mut scenes = Vec::new();
            let mut gone = Vec::new();
            for (id, entity) in ids.iter().copied().zip(loaded) {
                if entity.is_none() {
                    gone.push(id);
                    continue;
                }
                match scenes_referencing(repo, T::TYPE, id) {
                    Ok(found) => scenes.extend(found),
                    Err(err) => tracing::warn!(
                        entity = %T::TYPE,
                        id,
                        error = %err,
                        "failed to find scenes referencing entity"
                    ),
                }
            }
            Ok((scenes, gone))
        });

        let (scenes, gone) = match resolved {
            Ok(resolved) => resolved,
            Err(err) => {
                tracing::warn!(entity = %T::TYPE, error = %err, "read transaction failed");
                return;
            }
        };

        for scene in scenes {
            changes.track_id(EntityType::Scene, scene);
        }
        for id in gone {
            self.reverse_lookup(T::TYPE, id, changes);
        }
    }

    /// Track scenes whose indexed documents still reference a vanished member.
    fn reverse_lookup(&self, ty: EntityType, id: EntityId, changes: &mut ChangeSet) {
        let Some(field) = IndexField::foreign_key(ty) else {
            return;
        };
        let index = match index::read(self.index) {
            Ok(index) => index,
            Err(err) => {
                tracing::warn!(entity = %ty, id, error = %err, "reverse lookup skipped");
                return;
            }
        };

        let mut offset = 0;
        loop {
            let page = match index.find_referencing(field, id, self.reverse_lookup_batch, offset) {
                Ok(page) => page,
                Err(err) => {
                    tracing::warn!(entity = %ty, id, error = %err, "reverse lookup failed");
                    return;
                }
            };
            for key in page.keys {
                if key.entity_type == EntityType::Scene {
                    changes.track_id(EntityType::Scene, key.id);
                }
            }
            if page.matched < self.reverse_lookup_batch {
                return;
            }
            offset += page.matched;
        }
    }
}
