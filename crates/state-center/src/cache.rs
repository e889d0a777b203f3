use std::collections::{HashSet, VecDeque};
use std::hash::Hash;

use dashmap::DashMap;
use parking_lot::Mutex;

use scriptflow_core_types::CachedEntity;

/// Result of [`EntityCache::upsert`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Upsert {
    /// New id placed at the front; `previous_len` is the length before insertion.
    Inserted { previous_len: usize },
    /// Existing entry merged in place.
    Updated,
}

/// Per-key ordered lists of entities, newest first, unique by id.
pub struct EntityCache<K, E>
where
    K: Eq + Hash + Clone,
    E: CachedEntity,
{
    entries: DashMap<K, Mutex<VecDeque<E>>>,
}

impl<K, E> EntityCache<K, E>
where
    K: Eq + Hash + Clone,
    E: CachedEntity,
{
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    pub fn upsert(&self, key: &K, entity: E) -> Upsert {
        let slot = self.entries.entry(key.clone()).or_default();
        let mut list = slot.lock();
        match list.iter_mut().find(|existing| existing.id() == entity.id()) {
            Some(existing) => {
                existing.merge(entity);
                Upsert::Updated
            }
            None => {
                let previous_len = list.len();
                list.push_front(entity);
                Upsert::Inserted { previous_len }
            }
        }
    }

    /// Drop trailing entries beyond `max(previous_len, capacity)`.
    ///
    /// Only meaningful right after an insert: a list the user already paged
    /// past `capacity` keeps its pre-insert length. Returns how many entries
    /// were evicted.
    fn trim_to_capacity(&self, key: &K, capacity: usize, previous_len: usize) -> usize {
        let Some(slot) = self.entries.get(key) else {
            return 0;
        };
        let mut list = slot.lock();
        let limit = capacity.max(previous_len).max(1);
        let evicted = list.len().saturating_sub(limit);
        list.truncate(limit);
        evicted
    }

    /// Push-create path: upsert, then bound growth if the id was new.
    pub fn insert_new(&self, key: &K, entity: E, capacity: usize) -> Upsert {
        let outcome = self.upsert(key, entity);
        if let Upsert::Inserted { previous_len } = outcome {
            self.trim_to_capacity(key, capacity, previous_len);
        }
        outcome
    }

    /// Push-update path: patch an already cached entry in place, never insert.
    pub fn patch_existing(&self, key: &K, id: &E::Id, patch: impl FnOnce(&mut E)) -> bool {
        let Some(slot) = self.entries.get(key) else {
            return false;
        };
        let mut list = slot.lock();
        match list.iter_mut().find(|existing| existing.id() == id) {
            Some(existing) => {
                patch(existing);
                true
            }
            None => false,
        }
    }

    pub fn replace(&self, key: &K, items: Vec<E>) {
        let fresh: VecDeque<E> = dedup(items).into();
        let slot = self.entries.entry(key.clone()).or_default();
        *slot.lock() = fresh;
    }

    /// Append items whose id is not cached yet, keeping their order. Returns
    /// the number appended.
    pub fn extend_unique(&self, key: &K, items: Vec<E>) -> usize {
        let slot = self.entries.entry(key.clone()).or_default();
        let mut list = slot.lock();
        let mut seen: HashSet<E::Id> = list.iter().map(|item| item.id().clone()).collect();
        let before = list.len();
        for item in items {
            if seen.insert(item.id().clone()) {
                list.push_back(item);
            }
        }
        list.len() - before
    }

    pub fn get(&self, key: &K) -> Vec<E> {
        self.entries
            .get(key)
            .map(|slot| slot.lock().iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Borrow a key's entries without cloning them.
    pub fn with_entries<R>(&self, key: &K, read: impl FnOnce(&VecDeque<E>) -> R) -> Option<R> {
        self.entries.get(key).map(|slot| read(&slot.lock()))
    }

    pub fn len(&self, key: &K) -> usize {
        self.entries
            .get(key)
            .map(|slot| slot.lock().len())
            .unwrap_or(0)
    }

    pub fn remove(&self, key: &K) -> Option<Vec<E>> {
        self.entries
            .remove(key)
            .map(|(_, slot)| slot.into_inner().into())
    }

    pub fn keys(&self) -> Vec<K> {
        self.entries.iter().map(|entry| entry.key().clone()).collect()
    }
}

impl<K, E> Default for EntityCache<K, E>
where
    K: Eq + Hash + Clone,
    E: CachedEntity,
{
    fn default() -> Self {
        Self::new()
    }
}

fn dedup<E: CachedEntity>(items: Vec<E>) -> Vec<E> {
    let mut seen = HashSet::with_capacity(items.len());
    items
        .into_iter()
        .filter(|item| seen.insert(item.id().clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{run, run_ids};
    use scriptflow_core_types::{Run, RunId, RunStatus, TaskId};

    fn key() -> TaskId {
        TaskId::new("t1")
    }

    #[test]
    fn upsert_inserts_new_ids_at_front() {
        let cache = EntityCache::new();
        for minute in 0..5 {
            let outcome = cache.upsert(&key(), run(&format!("r{minute}"), RunStatus::Completed, minute));
            assert_eq!(outcome, Upsert::Inserted { previous_len: minute as usize });
        }
        assert_eq!(run_ids(&cache.get(&key())), vec!["r4", "r3", "r2", "r1", "r0"]);
    }

    #[test]
    fn upsert_merges_existing_in_place() {
        let cache = EntityCache::new();
        cache.upsert(&key(), run("r1", RunStatus::Started, 1));
        cache.upsert(&key(), run("r2", RunStatus::Started, 2));
        let outcome = cache.upsert(&key(), run("r1", RunStatus::Error, 1));
        assert_eq!(outcome, Upsert::Updated);

        let runs = cache.get(&key());
        assert_eq!(run_ids(&runs), vec!["r2", "r1"]);
        assert_eq!(runs[1].status, RunStatus::Error);
    }

    #[test]
    fn insert_new_bounds_growth_to_capacity() {
        let cache = EntityCache::new();
        for minute in 0..5 {
            cache.insert_new(&key(), run(&format!("r{minute}"), RunStatus::Completed, minute), 3);
        }
        assert_eq!(run_ids(&cache.get(&key())), vec!["r4", "r3", "r2"]);
    }

    #[test]
    fn insert_new_never_shrinks_a_paged_window() {
        let cache = EntityCache::new();
        let paged: Vec<_> = (0..6)
            .rev()
            .map(|minute| run(&format!("r{minute}"), RunStatus::Completed, minute))
            .collect();
        cache.replace(&key(), paged);

        cache.insert_new(&key(), run("r6", RunStatus::Started, 6), 3);
        let runs = cache.get(&key());
        assert_eq!(runs.len(), 6);
        assert_eq!(runs[0].id.as_str(), "r6");
        assert_eq!(runs[5].id.as_str(), "r1");
    }

    #[test]
    fn patch_existing_ignores_unknown_ids_and_keys() {
        let cache = EntityCache::new();
        let complete = |run: &mut Run| run.status = RunStatus::Completed;
        assert!(!cache.patch_existing(&key(), &RunId::new("r1"), complete));
        assert_eq!(cache.len(&key()), 0);

        cache.upsert(&key(), run("r1", RunStatus::Started, 1));
        assert!(!cache.patch_existing(&key(), &RunId::new("r9"), complete));
        assert!(cache.patch_existing(&key(), &RunId::new("r1"), complete));
        let cached = &cache.get(&key())[0];
        assert_eq!(cached.status, RunStatus::Completed);
        assert_eq!(cached.host, "web-1");
    }

    #[test]
    fn extend_unique_skips_cached_ids() {
        let cache = EntityCache::new();
        cache.replace(
            &key(),
            vec![run("r3", RunStatus::Completed, 3), run("r2", RunStatus::Completed, 2)],
        );
        let appended = cache.extend_unique(
            &key(),
            vec![
                run("r2", RunStatus::Completed, 2),
                run("r1", RunStatus::Completed, 1),
                run("r1", RunStatus::Completed, 1),
            ],
        );
        assert_eq!(appended, 1);
        assert_eq!(run_ids(&cache.get(&key())), vec!["r3", "r2", "r1"]);
    }

    #[test]
    fn remove_returns_entries_in_order() {
        let cache = EntityCache::new();
        cache.upsert(&key(), run("r1", RunStatus::Completed, 1));
        cache.upsert(&key(), run("r2", RunStatus::Completed, 2));
        let removed = cache.remove(&key()).unwrap();
        assert_eq!(run_ids(&removed), vec!["r2", "r1"]);
        assert!(cache.is_empty(&key()));
    }
}
