//! Read models handed to the UI. Each cached copy carries a revision so an
//! optimistic rollback only touches the exact copy it patched.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use scriptflow_core_types::CachedEntity;

/// A patched copy: where it was and what it looked like before.
#[derive(Clone, Debug)]
pub struct Located<E> {
    pub view: &'static str,
    pub revision: u64,
    pub snapshot: E,
}

/// A cached view that may hold a copy of an entity.
pub trait EntityView<E: CachedEntity>: Send + Sync {
    fn name(&self) -> &'static str;

    fn current(&self, id: &E::Id) -> Option<E>;

    /// Apply `patch` to the copy of `id`, returning its pre-patch snapshot.
    fn locate_and_patch(&self, id: &E::Id, patch: &dyn Fn(&mut E)) -> Option<Located<E>>;

    /// Put the snapshot back, unless the copy was replaced or refreshed since.
    fn restore(&self, located: &Located<E>) -> bool;
}

#[derive(Clone, Debug)]
struct Entry<E> {
    revision: u64,
    value: E,
}

#[derive(Debug, Default)]
struct Revisions(AtomicU64);

impl Revisions {
    fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// List view, replaced wholesale by fetches and merged into by pushes.
pub struct ListView<E: CachedEntity> {
    name: &'static str,
    entries: RwLock<Vec<Entry<E>>>,
    revisions: Revisions,
}

impl<E: CachedEntity> ListView<E> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: RwLock::new(Vec::new()),
            revisions: Revisions::default(),
        }
    }

    pub fn replace(&self, items: Vec<E>) {
        let fresh = items
            .into_iter()
            .map(|value| Entry {
                revision: self.revisions.next(),
                value,
            })
            .collect();
        *self.entries.write() = fresh;
    }

    pub fn snapshot(&self) -> Vec<E> {
        self.entries
            .read()
            .iter()
            .map(|entry| entry.value.clone())
            .collect()
    }

    /// Apply a pushed change to the cached copy of `id`, if there is one.
    /// The copy gets a new revision, so a pending rollback leaves it alone.
    pub fn patch_existing(&self, id: &E::Id, patch: &dyn Fn(&mut E)) -> bool {
        let mut entries = self.entries.write();
        match entries.iter_mut().find(|entry| entry.value.id() == id) {
            Some(entry) => {
                patch(&mut entry.value);
                entry.revision = self.revisions.next();
                true
            }
            None => false,
        }
    }
}

impl<E: CachedEntity> EntityView<E> for ListView<E> {
    fn name(&self) -> &'static str {
        self.name
    }

    fn current(&self, id: &E::Id) -> Option<E> {
        self.entries
            .read()
            .iter()
            .find(|entry| entry.value.id() == id)
            .map(|entry| entry.value.clone())
    }

    fn locate_and_patch(&self, id: &E::Id, patch: &dyn Fn(&mut E)) -> Option<Located<E>> {
        let mut entries = self.entries.write();
        let entry = entries.iter_mut().find(|entry| entry.value.id() == id)?;
        let snapshot = entry.value.clone();
        patch(&mut entry.value);
        entry.revision = self.revisions.next();
        Some(Located {
            view: self.name,
            revision: entry.revision,
            snapshot,
        })
    }

    fn restore(&self, located: &Located<E>) -> bool {
        let mut entries = self.entries.write();
        match entries.iter_mut().find(|entry| {
            entry.revision == located.revision && entry.value.id() == located.snapshot.id()
        }) {
            Some(entry) => {
                entry.value = located.snapshot.clone();
                entry.revision = self.revisions.next();
                true
            }
            None => false,
        }
    }
}

/// The detail view of one entity.
pub struct SingleView<E: CachedEntity> {
    name: &'static str,
    entry: RwLock<Option<Entry<E>>>,
    revisions: Revisions,
}

impl<E: CachedEntity> SingleView<E> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entry: RwLock::new(None),
            revisions: Revisions::default(),
        }
    }

    pub fn set(&self, value: E) {
        *self.entry.write() = Some(Entry {
            revision: self.revisions.next(),
            value,
        });
    }

    pub fn get(&self) -> Option<E> {
        self.entry.read().as_ref().map(|entry| entry.value.clone())
    }

    pub fn patch_existing(&self, id: &E::Id, patch: &dyn Fn(&mut E)) -> bool {
        let mut guard = self.entry.write();
        match guard.as_mut() {
            Some(entry) if entry.value.id() == id => {
                patch(&mut entry.value);
                entry.revision = self.revisions.next();
                true
            }
            _ => false,
        }
    }
}

impl<E: CachedEntity> EntityView<E> for SingleView<E> {
    fn name(&self) -> &'static str {
        self.name
    }

    fn current(&self, id: &E::Id) -> Option<E> {
        self.entry
            .read()
            .as_ref()
            .filter(|entry| entry.value.id() == id)
            .map(|entry| entry.value.clone())
    }

    fn locate_and_patch(&self, id: &E::Id, patch: &dyn Fn(&mut E)) -> Option<Located<E>> {
        let mut guard = self.entry.write();
        let entry = guard.as_mut().filter(|entry| entry.value.id() == id)?;
        let snapshot = entry.value.clone();
        patch(&mut entry.value);
        entry.revision = self.revisions.next();
        Some(Located {
            view: self.name,
            revision: entry.revision,
            snapshot,
        })
    }

    fn restore(&self, located: &Located<E>) -> bool {
        let mut guard = self.entry.write();
        match guard.as_mut() {
            Some(entry) if entry.revision == located.revision => {
                entry.value = located.snapshot.clone();
                entry.revision = self.revisions.next();
                true
            }
            _ => false,
        }
    }
}
