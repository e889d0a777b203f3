use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, warn};

use scriptflow_core_types::{
    decode_record, Collection, Filter, ListQuery, RecordAction, RecordEvent, Run, RunId,
    ScopeKey, SyncError, TaskId,
};
use scriptflow_record_store::{EventSink, RecordStore};
use scriptflow_registry::SubscriptionRegistry;
use scriptflow_state_center::{consecutive_failures, Page, PageRequest, PagedCache, SingleView};

use crate::model::{decode_items, RunFetch};
use crate::push::{self, Skip};

struct RunState {
    runs: PagedCache<TaskId, Run>,
    run: SingleView<Run>,
}

impl RunState {
    fn apply_push(&self, event: &RecordEvent) -> Result<(), Skip> {
        match push::action_on(event, Collection::Runs)? {
            RecordAction::Create => {
                let (task, run) = push::decode_run(event)?;
                self.runs
                    .cache()
                    .insert_new(&task, run, self.runs.per_page());
                Ok(())
            }
            RecordAction::Update => {
                let (task, id, patch) = push::decode_run_update(event)?;
                if self
                    .runs
                    .cache()
                    .patch_existing(&task, &id, |run| patch.apply(run))
                {
                    Ok(())
                } else {
                    Err(Skip::NotCached)
                }
            }
        }
    }
}

/// Run history per task, kept current by push events.
pub struct RunStore {
    store: Arc<dyn RecordStore>,
    state: Arc<RunState>,
    subscriptions: SubscriptionRegistry,
}

impl RunStore {
    pub fn new(store: Arc<dyn RecordStore>, runs_per_page: usize) -> Self {
        Self {
            subscriptions: SubscriptionRegistry::new(Arc::clone(&store), Collection::Runs),
            store,
            state: Arc::new(RunState {
                runs: PagedCache::new(runs_per_page),
                run: SingleView::new("run"),
            }),
        }
    }

    pub fn per_page(&self) -> usize {
        self.state.runs.per_page()
    }

    /// Fetch a page of `task`'s runs, newest first.
    ///
    /// A plain fetch replaces the cached list. With `more`, the next page is
    /// derived from the cached length and only unseen runs are appended.
    pub async fn fetch_runs(&self, task: &TaskId, fetch: RunFetch) -> Result<Page<Run>, SyncError> {
        let limit = fetch.limit.unwrap_or_else(|| self.per_page());
        let request = if fetch.more {
            PageRequest::next(limit)
        } else {
            PageRequest::first(limit)
        };
        let store = Arc::clone(&self.store);
        let filter = Filter::eq("task.id", task.as_str());

        self.state
            .runs
            .fetch_page(task, request, |page, limit| async move {
                let mut query = ListQuery::new(Collection::Runs)
                    .filter(filter)
                    .sort("-created")
                    .page(page, limit);
                if fetch.expand_task {
                    query = query.expand("task");
                }
                let listed = store.list(query).await?;
                Ok(Page {
                    items: decode_items(Collection::Runs, listed.items)?,
                    total_count: listed.total_items,
                })
            })
            .await
            .map_err(|err| {
                warn!(task = %task, more = fetch.more, error = %err, "run fetch failed");
                err
            })
    }

    /// Seed each task's list with its latest run in a single round trip.
    pub async fn fetch_latest_runs(&self, tasks: &[TaskId]) -> Result<(), SyncError> {
        if tasks.is_empty() {
            return Ok(());
        }
        let latest = self.store.latest_runs(tasks).await?;
        debug!(requested = tasks.len(), found = latest.len(), "latest runs fetched");
        for (task, record) in latest {
            let run: Run = decode_record(Collection::Runs.as_str(), record)?;
            self.state.runs.replace_with(&task, vec![run]);
        }
        Ok(())
    }

    pub async fn fetch_run(&self, id: &RunId) -> Result<Run, SyncError> {
        let record = self
            .store
            .get_one(Collection::Runs, id.as_str(), &["task".to_string()])
            .await?;
        let run: Run = decode_record(Collection::Runs.as_str(), record)?;
        self.state.run.set(run.clone());
        Ok(run)
    }

    /// Follow run pushes for `scope`. Repeated calls for a live or pending
    /// scope are no-ops.
    pub async fn subscribe(&self, scope: ScopeKey) -> Result<(), SyncError> {
        let filter = scope.run_filter();
        self.subscriptions.subscribe(scope, filter, self.sink()).await
    }

    pub fn unsubscribe(&self, scope: &ScopeKey) {
        self.subscriptions.unsubscribe(scope);
    }

    pub fn unsubscribe_all(&self) {
        self.subscriptions.unsubscribe_all();
    }

    pub fn runs(&self, task: &TaskId) -> Vec<Run> {
        self.state.runs.cache().get(task)
    }

    pub fn last_runs(&self) -> BTreeMap<TaskId, Vec<Run>> {
        let cache = self.state.runs.cache();
        cache
            .keys()
            .into_iter()
            .map(|task| {
                let runs = cache.get(&task);
                (task, runs)
            })
            .collect()
    }

    pub fn total_runs(&self, task: &TaskId) -> Option<u64> {
        self.state.runs.total(task)
    }

    pub fn run(&self) -> Option<Run> {
        self.state.run.get()
    }

    pub fn has_more_runs(&self, task: &TaskId) -> bool {
        self.state.runs.has_more(task)
    }

    pub fn consecutive_failure_count(&self, task: &TaskId) -> usize {
        self.state
            .runs
            .cache()
            .with_entries(task, |runs| consecutive_failures(runs))
            .unwrap_or(0)
    }

    /// Forget a task's runs and total, e.g. when its page is left.
    pub fn clear_task(&self, task: &TaskId) {
        self.state.runs.clear(task);
    }

    fn sink(&self) -> EventSink {
        let state = Arc::clone(&self.state);
        Arc::new(move |event: RecordEvent| {
            let outcome = state.apply_push(&event);
            push::settle(&event, outcome);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{run_ids, run_json, seeded_store, wait_until};
    use scriptflow_core_types::RunStatus;
    use scriptflow_record_store::{MemoryStore, StoreOp};
    use serde_json::json;

    fn t1() -> TaskId {
        TaskId::new("t1")
    }

    fn run_store(store: &Arc<MemoryStore>, per_page: usize) -> RunStore {
        RunStore::new(store.clone(), per_page)
    }

    #[tokio::test]
    async fn fetch_runs_pages_newest_first_with_totals() {
        let store = seeded_store();
        let runs = run_store(&store, 2);

        let page = runs.fetch_runs(&t1(), RunFetch::default()).await.unwrap();
        assert_eq!(page.total_count, 5);
        assert_eq!(run_ids(&runs.runs(&t1())), vec!["r5", "r4"]);
        assert_eq!(runs.runs(&t1())[0].expand.task.as_ref().unwrap().name, "backup");
        assert!(runs.has_more_runs(&t1()));

        runs.fetch_runs(&t1(), RunFetch::more()).await.unwrap();
        runs.fetch_runs(&t1(), RunFetch::more()).await.unwrap();
        assert_eq!(
            run_ids(&runs.runs(&t1())),
            vec!["r5", "r4", "r3", "r2", "r1"]
        );
        assert!(!runs.has_more_runs(&t1()));
        assert_eq!(runs.total_runs(&t1()), Some(5));
    }

    #[tokio::test]
    async fn load_more_after_a_push_never_duplicates() {
        let store = seeded_store();
        let runs = run_store(&store, 2);
        runs.subscribe(ScopeKey::All).await.unwrap();
        runs.fetch_runs(&t1(), RunFetch::default()).await.unwrap();

        store
            .upsert_record(Collection::Runs, run_json("r7", "t1", "started", 6))
            .await
            .unwrap();
        wait_until(|| runs.runs(&t1()).first().map(|run| run.id.as_str()) == Some("r7")).await;
        // capacity 2 evicts r4; the next page starts after the cached window
        assert_eq!(run_ids(&runs.runs(&t1())), vec!["r7", "r5"]);

        runs.fetch_runs(&t1(), RunFetch::more()).await.unwrap();
        assert_eq!(
            run_ids(&runs.runs(&t1())),
            vec!["r7", "r5", "r4", "r3"]
        );
        assert_eq!(runs.total_runs(&t1()), Some(6));
    }

    #[tokio::test]
    async fn failed_fetch_keeps_the_cached_page() {
        let store = seeded_store();
        let runs = run_store(&store, 50);
        runs.fetch_runs(&t1(), RunFetch::default()).await.unwrap();
        store.fail_next(StoreOp::List, SyncError::Network("offline".into()));

        let err = runs
            .fetch_runs(&t1(), RunFetch::default())
            .await
            .unwrap_err();
        assert_eq!(err, SyncError::Network("offline".into()));
        assert_eq!(runs.runs(&t1()).len(), 5);
        assert_eq!(runs.total_runs(&t1()), Some(5));
    }

    #[tokio::test]
    async fn pushes_insert_update_and_respect_capacity() {
        let store = seeded_store();
        let runs = run_store(&store, 2);
        runs.subscribe(ScopeKey::All).await.unwrap();

        for (id, minute) in [("r7", 7), ("r8", 8), ("r9", 9)] {
            store
                .upsert_record(Collection::Runs, run_json(id, "t1", "started", minute))
                .await
                .unwrap();
        }
        wait_until(|| runs.runs(&t1()).first().map(|run| run.id.as_str()) == Some("r9")).await;
        assert_eq!(run_ids(&runs.runs(&t1())), vec!["r9", "r8"]);

        store
            .upsert_record(Collection::Runs, run_json("r8", "t1", "error", 8))
            .await
            .unwrap();
        wait_until(|| runs.runs(&t1())[1].status == RunStatus::Error).await;
        assert_eq!(runs.runs(&t1()).len(), 2);
        assert_eq!(runs.runs(&t1())[1].host, "");
    }

    #[tokio::test]
    async fn partial_update_changes_only_the_fields_it_carries() {
        let store = seeded_store();
        let runs = run_store(&store, 50);
        runs.subscribe(ScopeKey::All).await.unwrap();
        runs.fetch_runs(&t1(), RunFetch::default()).await.unwrap();
        let before = runs.runs(&t1())[0].clone();
        assert_eq!(before.status, RunStatus::Error);

        store
            .publish_raw(RecordEvent::new(
                RecordAction::Update,
                Collection::Runs,
                json!({"id": "r5", "task": "t1", "status": "completed"}),
            ))
            .await
            .unwrap();
        wait_until(|| runs.runs(&t1())[0].status == RunStatus::Completed).await;

        let after = runs.runs(&t1())[0].clone();
        assert_eq!(after.exit_code, before.exit_code);
        assert_eq!(after.command, before.command);
        assert_eq!(after.created, before.created);
        assert_eq!(after.updated, before.updated);
        assert_eq!(after.expand, before.expand);
        assert_eq!(runs.consecutive_failure_count(&t1()), 0);
    }

    #[tokio::test]
    async fn update_for_an_uncached_task_creates_nothing() {
        let store = seeded_store();
        let runs = run_store(&store, 50);
        runs.subscribe(ScopeKey::All).await.unwrap();

        // r6 already exists for t2, so this is an update push
        store
            .upsert_record(Collection::Runs, run_json("r6", "t2", "error", 3))
            .await
            .unwrap();
        store
            .upsert_record(Collection::Runs, run_json("r7", "t1", "started", 7))
            .await
            .unwrap();
        wait_until(|| !runs.runs(&t1()).is_empty()).await;
        assert!(runs.runs(&TaskId::new("t2")).is_empty());
        assert!(!runs.last_runs().contains_key(&TaskId::new("t2")));
    }

    #[tokio::test]
    async fn malformed_pushes_are_ignored() {
        let store = seeded_store();
        let runs = run_store(&store, 50);
        runs.subscribe(ScopeKey::All).await.unwrap();

        for event in [
            RecordEvent {
                action: "delete".into(),
                collection: "runs".into(),
                record: run_json("r9", "t1", "completed", 9),
            },
            RecordEvent {
                action: "create".into(),
                collection: "runs".into(),
                record: json!({"id": "r10", "status": "started"}),
            },
            RecordEvent {
                action: "create".into(),
                collection: "runs".into(),
                record: json!({"id": "r11", "task": "t1", "status": 42}),
            },
        ] {
            store.publish_raw(event).await.unwrap();
        }
        store
            .upsert_record(Collection::Runs, run_json("r12", "t1", "started", 12))
            .await
            .unwrap();

        wait_until(|| !runs.runs(&t1()).is_empty()).await;
        assert_eq!(run_ids(&runs.runs(&t1())), vec!["r12"]);
    }

    #[tokio::test]
    async fn scoped_subscription_only_sees_its_project() {
        let store = seeded_store();
        let runs = run_store(&store, 50);
        runs.subscribe(ScopeKey::Project("p2".into())).await.unwrap();

        store
            .upsert_record(Collection::Runs, run_json("r20", "t1", "started", 20))
            .await
            .unwrap();
        store
            .upsert_record(Collection::Runs, run_json("r21", "t2", "started", 21))
            .await
            .unwrap();
        wait_until(|| !runs.runs(&TaskId::new("t2")).is_empty()).await;
        assert!(runs.runs(&t1()).is_empty());
    }

    #[tokio::test]
    async fn latest_runs_seed_single_entries_and_skip_empty_input() {
        let store = seeded_store();
        let runs = run_store(&store, 50);

        runs.fetch_latest_runs(&[]).await.unwrap();
        assert_eq!(store.calls().latest_runs, 0);

        runs.fetch_latest_runs(&[t1(), TaskId::new("t2"), TaskId::new("t3")])
            .await
            .unwrap();
        assert_eq!(store.calls().latest_runs, 1);
        assert_eq!(run_ids(&runs.runs(&t1())), vec!["r5"]);
        assert_eq!(run_ids(&runs.runs(&TaskId::new("t2"))), vec!["r6"]);
        assert!(runs.runs(&TaskId::new("t3")).is_empty());
        assert_eq!(runs.total_runs(&t1()), None);
    }

    #[tokio::test]
    async fn failure_streak_follows_the_cached_head() {
        let store = seeded_store();
        let runs = run_store(&store, 50);
        runs.subscribe(ScopeKey::Task(t1())).await.unwrap();
        runs.fetch_runs(&t1(), RunFetch::default()).await.unwrap();
        // r5 error, r4 internal_error, r3 error, r2 completed
        assert_eq!(runs.consecutive_failure_count(&t1()), 3);
        assert_eq!(runs.consecutive_failure_count(&TaskId::new("t9")), 0);

        store
            .upsert_record(Collection::Runs, run_json("r7", "t1", "completed", 7))
            .await
            .unwrap();
        wait_until(|| runs.runs(&t1()).len() == 6).await;
        assert_eq!(runs.consecutive_failure_count(&t1()), 0);
    }

    #[tokio::test]
    async fn fetch_run_fills_the_detail_view() {
        let store = seeded_store();
        let runs = run_store(&store, 50);
        assert!(runs.run().is_none());

        let run = runs.fetch_run(&RunId::new("r3")).await.unwrap();
        assert_eq!(run.status, RunStatus::Error);
        assert_eq!(runs.run().unwrap().expand.task.unwrap().id, t1());

        let err = runs.fetch_run(&RunId::new("missing")).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(runs.run().unwrap().id, RunId::new("r3"));
    }

    #[tokio::test]
    async fn clear_task_forgets_runs_and_total() {
        let store = seeded_store();
        let runs = run_store(&store, 50);
        runs.fetch_runs(&t1(), RunFetch::default()).await.unwrap();
        runs.clear_task(&t1());
        assert!(runs.runs(&t1()).is_empty());
        assert_eq!(runs.total_runs(&t1()), None);
    }
}
