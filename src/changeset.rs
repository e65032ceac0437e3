//! Deduplicated accumulation of entity ids awaiting an index update.

use std::collections::BTreeSet;

use crate::types::{ChangeEvent, EntityId, EntityType};

/// Pending ids per indexed entity type.
///
/// Each id appears at most once per type no matter how often it is tracked.
/// Events for types the index does not cover are dropped on `track`. Ids are kept
/// ordered so chunk boundaries are deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    scenes: BTreeSet<EntityId>,
    performers: BTreeSet<EntityId>,
    tags: BTreeSet<EntityId>,
    studios: BTreeSet<EntityId>,
}

impl ChangeSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn set(&self, ty: EntityType) -> Option<&BTreeSet<EntityId>> {
        match ty {
            EntityType::Scene => Some(&self.scenes),
            EntityType::Performer => Some(&self.performers),
            EntityType::Tag => Some(&self.tags),
            EntityType::Studio => Some(&self.studios),
            _ => None,
        }
    }

    fn set_mut(&mut self, ty: EntityType) -> Option<&mut BTreeSet<EntityId>> {
        match ty {
            EntityType::Scene => Some(&mut self.scenes),
            EntityType::Performer => Some(&mut self.performers),
            EntityType::Tag => Some(&mut self.tags),
            EntityType::Studio => Some(&mut self.studios),
            _ => None,
        }
    }

    /// Record a change. Returns `true` if the id was not already pending.
    pub fn track(&mut self, event: ChangeEvent) -> bool {
        match self.set_mut(event.entity_type) {
            Some(ids) => ids.insert(event.id),
            None => false,
        }
    }

    /// Shorthand for `track(ChangeEvent::new(ty, id))`.
    pub fn track_id(&mut self, ty: EntityType, id: EntityId) -> bool {
        self.track(ChangeEvent::new(ty, id))
    }

    /// Remove and return up to `limit` ids of `ty`, lowest first, and whether more remain.
    /// `None` takes everything.
    pub fn extract_bounded(
        &mut self,
        ty: EntityType,
        limit: Option<usize>,
    ) -> (Vec<EntityId>, bool) {
        let Some(ids) = self.set_mut(ty) else {
            return (Vec::new(), false);
        };
        match limit {
            Some(limit) if limit < ids.len() => {
                let split_at = ids.iter().nth(limit).copied();
                let rest = match split_at {
                    Some(first_kept) => ids.split_off(&first_kept),
                    None => BTreeSet::new(),
                };
                let taken = std::mem::replace(ids, rest);
                (taken.into_iter().collect(), true)
            }
            _ => (std::mem::take(ids).into_iter().collect(), false),
        }
    }

    /// Pending ids of `ty`, without removing them.
    #[must_use]
    pub fn ids_of(&self, ty: EntityType) -> Vec<EntityId> {
        self.set(ty)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn contains(&self, ty: EntityType, id: EntityId) -> bool {
        self.set(ty).is_some_and(|ids| ids.contains(&id))
    }

    /// Number of pending ids of one type.
    #[must_use]
    pub fn count(&self, ty: EntityType) -> usize {
        self.set(ty).map_or(0, BTreeSet::len)
    }

    /// Total pending ids across all types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.scenes.len() + self.performers.len() + self.tags.len() + self.studios.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fold another set into this one.
    pub fn merge(&mut self, other: ChangeSet) {
        self.scenes.extend(other.scenes);
        self.performers.extend(other.performers);
        self.tags.extend(other.tags);
        self.studios.extend(other.studios);
    }
}

impl FromIterator<ChangeEvent> for ChangeSet {
    fn from_iter<I: IntoIterator<Item = ChangeEvent>>(iter: I) -> Self {
        let mut cs = Self::new();
        cs.extend(iter);
        cs
    }
}

impl Extend<ChangeEvent> for ChangeSet {
    fn extend<I: IntoIterator<Item = ChangeEvent>>(&mut self, iter: I) {
        for event in iter {
            self.track(event);
        }
    }
}
