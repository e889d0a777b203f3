use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use scriptflow_core_types::{
    decode_record, Collection, Node, Project, Run, RunStatus, SyncError, Task, TaskId,
};

/// Page sizes and capacities of the dashboard views.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreLimits {
    /// Page size of run lists, and the capacity bounding push growth.
    pub runs_per_page: usize,
    pub task_list_limit: u32,
    pub node_list_limit: u32,
    pub alert_subscription_limit: u32,
}

impl Default for StoreLimits {
    fn default() -> Self {
        Self {
            runs_per_page: 50,
            task_list_limit: 200,
            node_list_limit: 50,
            alert_subscription_limit: 100,
        }
    }
}

/// Options of [`RunStore::fetch_runs`](crate::RunStore::fetch_runs).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RunFetch {
    /// Page size; `None` uses `runs_per_page`.
    pub limit: Option<usize>,
    pub expand_task: bool,
    /// Append the next page instead of replacing the list.
    pub more: bool,
}

impl Default for RunFetch {
    fn default() -> Self {
        Self {
            limit: None,
            expand_task: true,
            more: false,
        }
    }
}

impl RunFetch {
    pub fn more() -> Self {
        Self {
            more: true,
            ..Self::default()
        }
    }
}

/// Serializable view of everything the dashboard currently holds.
#[derive(Clone, Debug, Serialize)]
pub struct DashboardSnapshot {
    pub tasks: Vec<TaskOverview>,
    pub runs: BTreeMap<TaskId, RunWindow>,
    pub nodes: Vec<Node>,
    pub projects: Vec<Project>,
}

#[derive(Clone, Debug, Serialize)]
pub struct TaskOverview {
    #[serde(flatten)]
    pub task: Task,
    /// Failed runs at the head of the cached run list.
    pub failure_streak: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run_status: Option<RunStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run_duration: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct RunWindow {
    pub runs: Vec<Run>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    pub has_more: bool,
}

pub(crate) fn decode_items<T>(collection: Collection, items: Vec<Value>) -> Result<Vec<T>, SyncError>
where
    T: DeserializeOwned,
{
    items
        .into_iter()
        .map(|item| decode_record(collection.as_str(), item))
        .collect()
}
