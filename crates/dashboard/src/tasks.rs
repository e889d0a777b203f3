use std::sync::Arc;

use tracing::{debug, warn};

use scriptflow_core_types::query::parse_expand;
use scriptflow_core_types::{
    decode_record, Collection, Filter, ListQuery, NodeId, ProjectId, RecordEvent, ScopeKey,
    SyncError, Task, TaskId, TaskPatch,
};
use scriptflow_record_store::{EventSink, RecordStore};
use scriptflow_registry::SubscriptionRegistry;
use scriptflow_state_center::{EntityView, ListView, Mutated, OptimisticMutation, SingleView};

use crate::metrics;
use crate::model::decode_items;
use crate::push::{self, Skip, TaskPush};

const TASK_RELATIONS: &str = "node,project";

struct TaskViews {
    all: ListView<Task>,
    by_node: ListView<Task>,
    by_project: ListView<Task>,
    task: SingleView<Task>,
}

impl TaskViews {
    /// Lists first, the detail view last.
    fn ordered(&self) -> [&dyn EntityView<Task>; 4] {
        [&self.all, &self.by_node, &self.by_project, &self.task]
    }

    fn apply_push(&self, event: &RecordEvent) -> Result<(), Skip> {
        push::action_on(event, Collection::Tasks)?;
        let push = TaskPush::decode(event)?;
        let apply = |task: &mut Task| push.apply(task);
        let patched = [
            self.all.patch_existing(&push.id, &apply),
            self.by_node.patch_existing(&push.id, &apply),
            self.by_project.patch_existing(&push.id, &apply),
            self.task.patch_existing(&push.id, &apply),
        ];
        if patched.contains(&true) {
            Ok(())
        } else {
            Err(Skip::NotCached)
        }
    }
}

/// Task lists and the task detail view, with optimistic edits.
pub struct TaskStore {
    store: Arc<dyn RecordStore>,
    views: Arc<TaskViews>,
    subscriptions: SubscriptionRegistry,
    list_limit: u32,
}

impl TaskStore {
    pub fn new(store: Arc<dyn RecordStore>, list_limit: u32) -> Self {
        Self {
            subscriptions: SubscriptionRegistry::new(Arc::clone(&store), Collection::Tasks),
            store,
            views: Arc::new(TaskViews {
                all: ListView::new("tasks"),
                by_node: ListView::new("tasks_by_node"),
                by_project: ListView::new("tasks_by_project"),
                task: SingleView::new("task"),
            }),
            list_limit: list_limit.max(1),
        }
    }

    pub async fn fetch_tasks(&self) -> Result<(), SyncError> {
        let query = ListQuery::new(Collection::Tasks)
            .sort("id")
            .page(1, self.list_limit);
        let tasks = self.list(query).await?;
        self.views.all.replace(tasks);
        Ok(())
    }

    pub async fn fetch_tasks_by_project(&self, project: &ProjectId) -> Result<(), SyncError> {
        let query = self.scoped_query(Filter::eq("project.id", project.as_str()));
        let tasks = self.list(query).await?;
        self.views.by_project.replace(tasks);
        Ok(())
    }

    pub async fn fetch_tasks_by_node(&self, node: &NodeId) -> Result<(), SyncError> {
        let query = self.scoped_query(Filter::eq("node.id", node.as_str()));
        let tasks = self.list(query).await?;
        self.views.by_node.replace(tasks);
        Ok(())
    }

    pub async fn fetch_task(&self, id: &TaskId) -> Result<Task, SyncError> {
        let relations = parse_expand(TASK_RELATIONS);
        let record = self
            .store
            .get_first(Collection::Tasks, Filter::eq("id", id.as_str()), &relations)
            .await?;
        let task: Task = decode_record(Collection::Tasks.as_str(), record)?;
        self.views.task.set(task.clone());
        Ok(task)
    }

    /// Apply `patch` to every cached copy, then write it. A failed write
    /// restores the copies and returns the error.
    ///
    /// An uncached task is written without local changes and `None` returned.
    pub async fn update_task(&self, id: &TaskId, patch: TaskPatch) -> Result<Option<Task>, SyncError> {
        let body = serde_json::to_value(&patch).map_err(|err| SyncError::Internal(err.to_string()))?;
        let store = Arc::clone(&self.store);
        let outcome = self
            .mutation()
            .apply(id, |task| patch.apply(task), |_| {
                let store = Arc::clone(&store);
                let body = body.clone();
                async move { store.update(Collection::Tasks, id.as_str(), body).await.map(drop) }
            })
            .await;

        match self.settle(id, outcome)? {
            Some(task) => Ok(Some(task)),
            None => {
                store.update(Collection::Tasks, id.as_str(), body).await?;
                Ok(None)
            }
        }
    }

    /// Flip `active` on every cached copy, based on the first copy found,
    /// then write the new value. An uncached task is left alone.
    pub async fn toggle_task_active(&self, id: &TaskId) -> Result<Option<Task>, SyncError> {
        let mutation = self.mutation();
        let Some(current) = mutation.current(id) else {
            debug!(task = %id, "toggle skipped: task not cached");
            return Ok(None);
        };
        let active = !current.active;
        let body = serde_json::to_value(TaskPatch::active(active))
            .map_err(|err| SyncError::Internal(err.to_string()))?;
        let store = Arc::clone(&self.store);
        let outcome = mutation
            .apply(id, |task| task.active = active, |_| async move {
                store.update(Collection::Tasks, id.as_str(), body).await.map(drop)
            })
            .await;
        self.settle(id, outcome)
    }

    /// Merge task pushes into whichever views hold the task.
    pub async fn subscribe(&self) -> Result<(), SyncError> {
        self.subscriptions
            .subscribe(ScopeKey::All, None, self.sink())
            .await
    }

    pub fn unsubscribe(&self) {
        self.subscriptions.unsubscribe(&ScopeKey::All);
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.views.all.snapshot()
    }

    pub fn tasks_by_project(&self) -> Vec<Task> {
        self.views.by_project.snapshot()
    }

    pub fn tasks_by_node(&self) -> Vec<Task> {
        self.views.by_node.snapshot()
    }

    pub fn task(&self) -> Option<Task> {
        self.views.task.get()
    }

    fn mutation(&self) -> OptimisticMutation<'_, Task> {
        OptimisticMutation::across(self.views.ordered().to_vec())
    }

    fn settle(
        &self,
        id: &TaskId,
        outcome: Result<Mutated<Task>, SyncError>,
    ) -> Result<Option<Task>, SyncError> {
        match outcome {
            Ok(Mutated::Committed { value, copies }) => {
                debug!(task = %id, copies, "task change committed");
                Ok(Some(value))
            }
            Ok(Mutated::NotCached) => Ok(None),
            Err(err) => {
                metrics::record_rollback();
                warn!(task = %id, error = %err, "task change rolled back");
                Err(err)
            }
        }
    }

    fn scoped_query(&self, filter: Filter) -> ListQuery {
        ListQuery::new(Collection::Tasks)
            .filter(filter)
            .sort("-active,-created")
            .expand(TASK_RELATIONS)
            .page(1, self.list_limit)
    }

    async fn list(&self, query: ListQuery) -> Result<Vec<Task>, SyncError> {
        let listed = self.store.list(query).await?;
        decode_items(Collection::Tasks, listed.items)
    }

    fn sink(&self) -> EventSink {
        let views = Arc::clone(&self.views);
        Arc::new(move |event: RecordEvent| {
            let outcome = views.apply_push(&event);
            push::settle(&event, outcome);
        })
    }
}
