use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, info, warn};

use scriptflow_core_types::{Collection, Filter, ScopeKey, SyncError};
use scriptflow_record_store::{EventSink, RecordStore, Teardown};

use crate::{errors::RegistryError, metrics};

/// Topic covering every record of a collection.
const ALL_RECORDS: &str = "*";

enum Slot {
    /// Reserved; the transport handshake has not returned yet.
    Pending { generation: u64 },
    Live { generation: u64, teardown: Teardown },
}

impl Slot {
    fn is_pending(&self, generation: u64) -> bool {
        matches!(self, Slot::Pending { generation: g } if *g == generation)
    }

    fn generation(&self) -> u64 {
        match self {
            Slot::Pending { generation } | Slot::Live { generation, .. } => *generation,
        }
    }
}

/// At most one live push subscription per scope key on one collection.
///
/// A key is reserved before the handshake is awaited, so concurrent callers
/// for the same key never open a second transport subscription. A teardown
/// that arrives for a reservation which was cancelled in the meantime is
/// invoked on arrival.
pub struct SubscriptionRegistry {
    store: Arc<dyn RecordStore>,
    collection: Collection,
    slots: DashMap<ScopeKey, Slot>,
    generations: AtomicU64,
}

impl SubscriptionRegistry {
    pub fn new(store: Arc<dyn RecordStore>, collection: Collection) -> Self {
        Self {
            store,
            collection,
            slots: DashMap::new(),
            generations: AtomicU64::new(0),
        }
    }

    /// Open a subscription for `key` unless one is live or pending.
    ///
    /// On transport failure the reservation is released so the caller may
    /// retry, and the error is returned unchanged.
    pub async fn subscribe(
        &self,
        key: ScopeKey,
        filter: Option<Filter>,
        sink: EventSink,
    ) -> Result<(), SyncError> {
        ensure_scope_id(&key)?;
        let Some(generation) = self.reserve(&key) else {
            debug!(collection = %self.collection, scope = %key, "subscription already registered");
            return Ok(());
        };

        let established = self
            .store
            .subscribe(self.collection, ALL_RECORDS, filter, sink)
            .await;

        match established {
            Ok(teardown) => {
                self.activate(key, generation, teardown);
                Ok(())
            }
            Err(err) => {
                self.slots
                    .remove_if(&key, |_, slot| slot.is_pending(generation));
                metrics::record_failed();
                warn!(collection = %self.collection, scope = %key, error = %err, "subscription failed");
                Err(err)
            }
        }
    }

    /// Close the subscription for `key`. A pending reservation is dropped and
    /// its teardown runs as soon as the handshake returns.
    pub fn unsubscribe(&self, key: &ScopeKey) {
        match self.slots.remove(key) {
            Some((_, Slot::Live { teardown, .. })) => {
                teardown.invoke();
                metrics::record_teardown();
                info!(collection = %self.collection, scope = %key, "subscription torn down");
            }
            Some((_, Slot::Pending { generation })) => {
                debug!(
                    collection = %self.collection,
                    scope = %key,
                    generation,
                    "pending subscription cancelled"
                );
            }
            None => {}
        }
    }

    pub fn unsubscribe_all(&self) {
        for key in self.keys() {
            self.unsubscribe(&key);
        }
    }

    /// Whether `key` is live or reserved.
    pub fn is_registered(&self, key: &ScopeKey) -> bool {
        self.slots.contains_key(key)
    }

    pub fn live_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| matches!(slot.value(), Slot::Live { .. }))
            .count()
    }

    pub fn keys(&self) -> Vec<ScopeKey> {
        self.slots.iter().map(|slot| slot.key().clone()).collect()
    }

    fn reserve(&self, key: &ScopeKey) -> Option<u64> {
        match self.slots.entry(key.clone()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(vacant) => {
                let generation = self.generations.fetch_add(1, Ordering::Relaxed) + 1;
                vacant.insert(Slot::Pending { generation });
                metrics::record_reserved();
                debug!(collection = %self.collection, scope = %key, generation, "subscription reserved");
                Some(generation)
            }
        }
    }

    fn activate(&self, key: ScopeKey, generation: u64, teardown: Teardown) {
        let stale = match self.slots.entry(key.clone()) {
            Entry::Occupied(mut slot) if slot.get().is_pending(generation) => {
                slot.insert(Slot::Live {
                    generation,
                    teardown,
                });
                None
            }
            Entry::Occupied(slot) => Some((teardown, Some(slot.get().generation()))),
            Entry::Vacant(_) => Some((teardown, None)),
        };

        match stale {
            None => {
                metrics::record_established();
                info!(collection = %self.collection, scope = %key, generation, "subscription established");
            }
            Some((teardown, superseded_by)) => {
                teardown.invoke();
                metrics::record_teardown();
                debug!(
                    collection = %self.collection,
                    scope = %key,
                    generation,
                    ?superseded_by,
                    "subscription cancelled while pending; torn down on arrival"
                );
            }
        }
    }
}

impl Drop for SubscriptionRegistry {
    fn drop(&mut self) {
        self.unsubscribe_all();
    }
}

fn ensure_scope_id(key: &ScopeKey) -> Result<(), RegistryError> {
    let empty = match key {
        ScopeKey::All => false,
        ScopeKey::Task(id) => id.is_empty(),
        ScopeKey::Project(id) => id.is_empty(),
        ScopeKey::Node(id) => id.is_empty(),
    };
    if empty {
        return Err(RegistryError::EmptyScopeId(key.clone()));
    }
    Ok(())
}
