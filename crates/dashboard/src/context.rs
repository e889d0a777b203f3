use std::sync::Arc;

use tracing::info;

use scriptflow_core_types::{SyncError, Task, TaskId};
use scriptflow_record_store::RecordStore;
use scriptflow_timefmt::time_diff;

use crate::alerts::AlertSubscriptionStore;
use crate::model::{DashboardSnapshot, RunWindow, StoreLimits, TaskOverview};
use crate::nodes::NodeStore;
use crate::projects::ProjectStore;
use crate::runs::RunStore;
use crate::tasks::TaskStore;

/// Owns one of each store over a shared record store. Views of the same
/// dashboard session use the same context.
pub struct DashboardContext {
    runs: RunStore,
    tasks: TaskStore,
    nodes: NodeStore,
    projects: ProjectStore,
    alerts: AlertSubscriptionStore,
}

impl DashboardContext {
    pub fn new(store: Arc<dyn RecordStore>, limits: StoreLimits) -> Self {
        Self {
            runs: RunStore::new(Arc::clone(&store), limits.runs_per_page),
            tasks: TaskStore::new(Arc::clone(&store), limits.task_list_limit),
            nodes: NodeStore::new(Arc::clone(&store), limits.node_list_limit),
            projects: ProjectStore::new(Arc::clone(&store)),
            alerts: AlertSubscriptionStore::new(store, limits.alert_subscription_limit),
        }
    }

    pub fn runs(&self) -> &RunStore {
        &self.runs
    }

    pub fn tasks(&self) -> &TaskStore {
        &self.tasks
    }

    pub fn nodes(&self) -> &NodeStore {
        &self.nodes
    }

    pub fn projects(&self) -> &ProjectStore {
        &self.projects
    }

    pub fn alerts(&self) -> &AlertSubscriptionStore {
        &self.alerts
    }

    /// Tasks, nodes and projects, then the latest run of every task.
    pub async fn load_overview(&self) -> Result<(), SyncError> {
        self.tasks.fetch_tasks().await?;
        self.nodes.fetch_nodes().await?;
        self.projects.fetch_projects().await?;
        let ids: Vec<TaskId> = self.tasks.tasks().into_iter().map(|task| task.id).collect();
        self.runs.fetch_latest_runs(&ids).await?;
        info!(tasks = ids.len(), "dashboard overview loaded");
        Ok(())
    }

    /// Close every push subscription held by the stores.
    pub fn shutdown(&self) {
        self.runs.unsubscribe_all();
        self.tasks.unsubscribe();
    }

    pub fn snapshot(&self) -> DashboardSnapshot {
        let tasks = self
            .tasks
            .tasks()
            .into_iter()
            .map(|task| self.overview(task))
            .collect();
        let runs = self
            .runs
            .last_runs()
            .into_iter()
            .map(|(task, runs)| {
                let window = RunWindow {
                    total: self.runs.total_runs(&task),
                    has_more: self.runs.has_more_runs(&task),
                    runs,
                };
                (task, window)
            })
            .collect();
        DashboardSnapshot {
            tasks,
            runs,
            nodes: self.nodes.nodes(),
            projects: self.projects.projects(),
        }
    }

    fn overview(&self, task: Task) -> TaskOverview {
        let latest = self.runs.runs(&task.id).into_iter().next();
        let last_run_duration = latest.as_ref().and_then(|run| {
            run.status
                .is_terminal()
                .then_some(run.updated)
                .flatten()
                .map(|finished| time_diff(run.created, finished))
        });
        TaskOverview {
            failure_streak: self.runs.consecutive_failure_count(&task.id),
            last_run_status: latest.map(|run| run.status),
            last_run_duration,
            task,
        }
    }
}
