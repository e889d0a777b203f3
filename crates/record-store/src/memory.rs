use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tracing::{debug, warn};
use uuid::Uuid;

use scriptflow_core_types::{
    Collection, Filter, ListQuery, RecordAction, RecordEvent, SyncError, TaskId,
};
use scriptflow_event_bus::{EventBus, InMemoryBus};

use crate::api::{EventSink, ListPage, RecordStore, Teardown};
use crate::eval::{self, Tables};

const BACKEND_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3fZ";

/// Store operations that can be made to fail on demand.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum StoreOp {
    List,
    GetOne,
    GetFirst,
    Update,
    LatestRuns,
    Subscribe,
}

#[derive(Debug, Default)]
struct Counters {
    list: AtomicU64,
    update: AtomicU64,
    subscribe: AtomicU64,
    latest_runs: AtomicU64,
}

/// Counters describing how the store has been used.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct StoreCalls {
    pub list: u64,
    pub update: u64,
    pub subscribe: u64,
    pub latest_runs: u64,
}

/// In-memory record store with realtime delivery over an [`InMemoryBus`].
///
/// Used by the CLI replay command and throughout the tests; failures and
/// slow subscription handshakes can be injected.
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
    bus: Arc<InMemoryBus<RecordEvent>>,
    faults: Mutex<HashMap<StoreOp, VecDeque<SyncError>>>,
    subscribe_gate: watch::Sender<bool>,
    live_subscriptions: Arc<AtomicUsize>,
    lagged: Arc<AtomicU64>,
    counters: Counters,
}

impl MemoryStore {
    pub fn new(bus_capacity: usize) -> Self {
        let (subscribe_gate, _) = watch::channel(true);
        Self {
            tables: Arc::new(RwLock::new(Tables::new())),
            bus: InMemoryBus::new(bus_capacity),
            faults: Mutex::new(HashMap::new()),
            subscribe_gate,
            live_subscriptions: Arc::new(AtomicUsize::new(0)),
            lagged: Arc::new(AtomicU64::new(0)),
            counters: Counters::default(),
        }
    }

    /// Load records without emitting realtime events.
    pub fn seed(&self, collection: Collection, records: impl IntoIterator<Item = Value>) {
        let mut tables = self.tables.write();
        let table = tables.entry(collection).or_default();
        for record in records {
            table.push(stamp(record));
        }
    }

    /// Insert or replace a record and broadcast the matching create/update event.
    pub async fn upsert_record(
        &self,
        collection: Collection,
        record: Value,
    ) -> Result<Value, SyncError> {
        let record = stamp(record);
        let id = record_id(&record)?;
        let action = {
            let mut tables = self.tables.write();
            let table = tables.entry(collection).or_default();
            match table
                .iter_mut()
                .find(|existing| existing.get("id").and_then(Value::as_str) == Some(id.as_str()))
            {
                Some(existing) => {
                    *existing = record.clone();
                    RecordAction::Update
                }
                None => {
                    table.push(record.clone());
                    RecordAction::Create
                }
            }
        };
        self.bus
            .publish(RecordEvent::new(action, collection, record.clone()))
            .await?;
        Ok(record)
    }

    /// Broadcast an arbitrary event, including ones the dashboard must ignore.
    pub async fn publish_raw(&self, event: RecordEvent) -> Result<usize, SyncError> {
        self.bus.publish(event).await
    }

    /// Queue `err` as the result of the next call of kind `op`.
    pub fn fail_next(&self, op: StoreOp, err: SyncError) {
        self.faults.lock().entry(op).or_default().push_back(err);
    }

    /// Park subscription handshakes until [`release_subscriptions`](Self::release_subscriptions).
    pub fn hold_subscriptions(&self) {
        self.subscribe_gate.send_replace(false);
    }

    pub fn release_subscriptions(&self) {
        self.subscribe_gate.send_replace(true);
    }

    pub fn active_subscriptions(&self) -> usize {
        self.live_subscriptions.load(Ordering::SeqCst)
    }

    /// Events dropped because a subscriber fell behind the bus capacity.
    pub fn lagged_events(&self) -> u64 {
        self.lagged.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> StoreCalls {
        StoreCalls {
            list: self.counters.list.load(Ordering::Relaxed),
            update: self.counters.update.load(Ordering::Relaxed),
            subscribe: self.counters.subscribe.load(Ordering::Relaxed),
            latest_runs: self.counters.latest_runs.load(Ordering::Relaxed),
        }
    }

    pub fn record(&self, collection: Collection, id: &str) -> Option<Value> {
        eval::find(&self.tables.read(), collection, id).cloned()
    }

    fn take_fault(&self, op: StoreOp) -> Result<(), SyncError> {
        match self.faults.lock().get_mut(&op).and_then(VecDeque::pop_front) {
            Some(err) => {
                debug!(?op, %err, "injected store failure");
                Err(err)
            }
            None => Ok(()),
        }
    }

    async fn wait_for_gate(&self) {
        let mut gate = self.subscribe_gate.subscribe();
        let _ = gate.wait_for(|open| *open).await;
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(256)
    }
}

fn record_id(record: &Value) -> Result<String, SyncError> {
    record
        .get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| SyncError::Validation("record without id".into()))
}

/// Fill `id`, `created` and `updated` the way the backend would.
fn stamp(mut record: Value) -> Value {
    let now = Utc::now().format(BACKEND_TIME_FORMAT).to_string();
    if let Some(obj) = record.as_object_mut() {
        obj.entry("id")
            .or_insert_with(|| Value::String(Uuid::new_v4().simple().to_string()[..15].to_string()));
        obj.entry("created")
            .or_insert_with(|| Value::String(now.clone()));
        obj.entry("updated").or_insert_with(|| Value::String(now));
    }
    record
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn list(&self, query: ListQuery) -> Result<ListPage, SyncError> {
        self.counters.list.fetch_add(1, Ordering::Relaxed);
        self.take_fault(StoreOp::List)?;
        let tables = self.tables.read();
        let mut matching: Vec<Value> = tables
            .get(&query.collection)
            .map(|table| {
                table
                    .iter()
                    .filter(|record| {
                        query
                            .filter
                            .as_ref()
                            .map_or(true, |filter| eval::matches(&tables, record, filter))
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        eval::sort_records(&mut matching, &query.sort);

        let total_items = matching.len() as u64;
        let per_page = query.per_page.max(1);
        let offset = (query.page.max(1) as usize - 1) * per_page as usize;
        let items = matching
            .iter()
            .skip(offset)
            .take(per_page as usize)
            .map(|record| eval::expand(&tables, record, &query.expand))
            .collect();
        Ok(ListPage {
            items,
            page: query.page.max(1),
            per_page,
            total_items,
        })
    }

    async fn get_one(
        &self,
        collection: Collection,
        id: &str,
        expand: &[String],
    ) -> Result<Value, SyncError> {
        self.take_fault(StoreOp::GetOne)?;
        let tables = self.tables.read();
        eval::find(&tables, collection, id)
            .map(|record| eval::expand(&tables, record, expand))
            .ok_or_else(|| SyncError::not_found(collection.as_str(), id))
    }

    async fn get_first(
        &self,
        collection: Collection,
        filter: Filter,
        expand: &[String],
    ) -> Result<Value, SyncError> {
        self.take_fault(StoreOp::GetFirst)?;
        let tables = self.tables.read();
        tables
            .get(&collection)
            .and_then(|table| {
                table
                    .iter()
                    .find(|record| eval::matches(&tables, record, &filter))
            })
            .map(|record| eval::expand(&tables, record, expand))
            .ok_or_else(|| SyncError::not_found(collection.as_str(), filter.to_string()))
    }

    async fn update(
        &self,
        collection: Collection,
        id: &str,
        patch: Value,
    ) -> Result<Value, SyncError> {
        self.counters.update.fetch_add(1, Ordering::Relaxed);
        self.take_fault(StoreOp::Update)?;
        let Value::Object(fields) = patch else {
            return Err(SyncError::Validation("patch must be an object".into()));
        };
        let updated = {
            let mut tables = self.tables.write();
            let record = tables
                .get_mut(&collection)
                .and_then(|table| {
                    table
                        .iter_mut()
                        .find(|record| record.get("id").and_then(Value::as_str) == Some(id))
                })
                .ok_or_else(|| SyncError::not_found(collection.as_str(), id))?;
            if let Some(obj) = record.as_object_mut() {
                for (key, value) in fields {
                    if key == "id" {
                        continue;
                    }
                    obj.insert(key, value);
                }
                obj.insert(
                    "updated".into(),
                    Value::String(Utc::now().format(BACKEND_TIME_FORMAT).to_string()),
                );
            }
            record.clone()
        };
        self.bus
            .publish(RecordEvent::new(
                RecordAction::Update,
                collection,
                updated.clone(),
            ))
            .await?;
        Ok(updated)
    }

    async fn latest_runs(&self, task_ids: &[TaskId]) -> Result<HashMap<TaskId, Value>, SyncError> {
        self.counters.latest_runs.fetch_add(1, Ordering::Relaxed);
        self.take_fault(StoreOp::LatestRuns)?;
        let tables = self.tables.read();
        let mut latest: HashMap<TaskId, Value> = HashMap::new();
        let Some(runs) = tables.get(&Collection::Runs) else {
            return Ok(latest);
        };
        for task in task_ids {
            let newest = runs
                .iter()
                .filter(|run| run.get("task").and_then(Value::as_str) == Some(task.as_str()))
                .max_by(|a, b| {
                    let a = a.get("created").and_then(Value::as_str).unwrap_or_default();
                    let b = b.get("created").and_then(Value::as_str).unwrap_or_default();
                    a.cmp(b)
                });
            if let Some(run) = newest {
                latest.insert(task.clone(), run.clone());
            }
        }
        Ok(latest)
    }

    async fn subscribe(
        &self,
        collection: Collection,
        topic: &str,
        filter: Option<Filter>,
        sink: EventSink,
    ) -> Result<Teardown, SyncError> {
        self.counters.subscribe.fetch_add(1, Ordering::Relaxed);
        self.wait_for_gate().await;
        self.take_fault(StoreOp::Subscribe)?;

        let mut rx = self.bus.subscribe();
        let tables = Arc::clone(&self.tables);
        let topic = topic.to_string();
        let lagged = Arc::clone(&self.lagged);
        let forwarder = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        if event.collection != collection.as_str() {
                            continue;
                        }
                        if topic != "*" && event.record_id() != Some(topic.as_str()) {
                            continue;
                        }
                        let visible = filter.as_ref().map_or(true, |filter| {
                            eval::matches(&tables.read(), &event.record, filter)
                        });
                        if visible {
                            sink(event);
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        lagged.fetch_add(skipped, Ordering::SeqCst);
                        warn!(%collection, skipped, "realtime subscriber lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        let live = Arc::clone(&self.live_subscriptions);
        live.fetch_add(1, Ordering::SeqCst);
        Ok(Teardown::new(move || {
            forwarder.abort();
            live.fetch_sub(1, Ordering::SeqCst);
        }))
    }
}
