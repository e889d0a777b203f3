use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use scriptflow_core_types::{
    AlertSubscription, AlertSubscriptionId, AlertSubscriptionPatch, Collection, Filter, ListQuery,
    SyncError, TaskId,
};
use scriptflow_record_store::RecordStore;

use crate::model::decode_items;

/// Alert subscriptions of the task being viewed.
pub struct AlertSubscriptionStore {
    store: Arc<dyn RecordStore>,
    limit: u32,
    subscriptions: RwLock<Vec<AlertSubscription>>,
}

impl AlertSubscriptionStore {
    pub fn new(store: Arc<dyn RecordStore>, limit: u32) -> Self {
        Self {
            store,
            limit: limit.max(1),
            subscriptions: RwLock::new(Vec::new()),
        }
    }

    pub async fn fetch_for_task(&self, task: &TaskId) -> Result<(), SyncError> {
        let query = ListQuery::new(Collection::Subscriptions)
            .filter(Filter::eq("task", task.as_str()))
            .sort("-active,-created")
            .expand("channel")
            .page(1, self.limit);
        let listed = self.store.list(query).await?;
        let subscriptions = decode_items(Collection::Subscriptions, listed.items)?;
        *self.subscriptions.write() = subscriptions;
        Ok(())
    }

    /// Write `patch` remotely. The cached copy follows only after the write
    /// succeeded.
    pub async fn update(
        &self,
        id: &AlertSubscriptionId,
        patch: AlertSubscriptionPatch,
    ) -> Result<(), SyncError> {
        let body = serde_json::to_value(&patch).map_err(|err| SyncError::Internal(err.to_string()))?;
        self.store
            .update(Collection::Subscriptions, id.as_str(), body)
            .await?;
        let mut cached = self.subscriptions.write();
        match cached.iter_mut().find(|subscription| &subscription.id == id) {
            Some(subscription) => patch.apply(subscription),
            None => debug!(subscription = %id, "updated alert subscription not cached"),
        }
        Ok(())
    }

    pub fn subscriptions(&self) -> Vec<AlertSubscription> {
        self.subscriptions.read().clone()
    }
}
