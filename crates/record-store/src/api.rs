use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use scriptflow_core_types::{Collection, Filter, ListQuery, RecordEvent, SyncError, TaskId};

/// Callback receiving realtime events for one subscription, in arrival order.
pub type EventSink = Arc<dyn Fn(RecordEvent) + Send + Sync>;

/// One page of a list call.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ListPage {
    pub items: Vec<Value>,
    pub page: u32,
    pub per_page: u32,
    pub total_items: u64,
}

/// Closes a realtime subscription. Invoking it twice is impossible by
/// construction; dropping it without invoking leaves the subscription open.
pub struct Teardown {
    close: Box<dyn FnOnce() + Send + Sync>,
}

impl Teardown {
    pub fn new<F>(close: F) -> Self
    where
        F: FnOnce() + Send + Sync + 'static,
    {
        Self {
            close: Box::new(close),
        }
    }

    pub fn invoke(self) {
        (self.close)();
    }
}

impl fmt::Debug for Teardown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Teardown").finish_non_exhaustive()
    }
}

/// Backend collaborator: paged reads, single record reads, partial updates
/// and realtime subscriptions.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn list(&self, query: ListQuery) -> Result<ListPage, SyncError>;

    /// Fails with `NotFound` when the id is absent.
    async fn get_one(
        &self,
        collection: Collection,
        id: &str,
        expand: &[String],
    ) -> Result<Value, SyncError>;

    /// First record matching `filter`; `NotFound` when nothing matches.
    async fn get_first(
        &self,
        collection: Collection,
        filter: Filter,
        expand: &[String],
    ) -> Result<Value, SyncError>;

    async fn update(
        &self,
        collection: Collection,
        id: &str,
        patch: Value,
    ) -> Result<Value, SyncError>;

    /// Most recent run of each task in one round trip. Tasks without runs are absent.
    async fn latest_runs(&self, task_ids: &[TaskId]) -> Result<HashMap<TaskId, Value>, SyncError>;

    /// `topic` is `"*"` for the whole collection or a single record id.
    async fn subscribe(
        &self,
        collection: Collection,
        topic: &str,
        filter: Option<Filter>,
        sink: EventSink,
    ) -> Result<Teardown, SyncError>;
}

#[async_trait]
impl<S> RecordStore for Arc<S>
where
    S: RecordStore + ?Sized,
{
    async fn list(&self, query: ListQuery) -> Result<ListPage, SyncError> {
        (**self).list(query).await
    }

    async fn get_one(
        &self,
        collection: Collection,
        id: &str,
        expand: &[String],
    ) -> Result<Value, SyncError> {
        (**self).get_one(collection, id, expand).await
    }

    async fn get_first(
        &self,
        collection: Collection,
        filter: Filter,
        expand: &[String],
    ) -> Result<Value, SyncError> {
        (**self).get_first(collection, filter, expand).await
    }

    async fn update(
        &self,
        collection: Collection,
        id: &str,
        patch: Value,
    ) -> Result<Value, SyncError> {
        (**self).update(collection, id, patch).await
    }

    async fn latest_runs(&self, task_ids: &[TaskId]) -> Result<HashMap<TaskId, Value>, SyncError> {
        (**self).latest_runs(task_ids).await
    }

    async fn subscribe(
        &self,
        collection: Collection,
        topic: &str,
        filter: Option<Filter>,
        sink: EventSink,
    ) -> Result<Teardown, SyncError> {
        (**self).subscribe(collection, topic, filter, sink).await
    }
}
