use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ids::{NodeId, ProjectId, TaskId};
use crate::query::Filter;

/// Which slice of records a push subscription covers.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(tag = "scope", content = "id", rename_all = "snake_case")]
pub enum ScopeKey {
    All,
    Task(TaskId),
    Project(ProjectId),
    Node(NodeId),
}

impl ScopeKey {
    /// Filter selecting the runs that belong to this scope.
    pub fn run_filter(&self) -> Option<Filter> {
        match self {
            ScopeKey::All => None,
            ScopeKey::Task(task) => Some(Filter::eq("task.id", task.as_str())),
            ScopeKey::Project(project) => Some(Filter::eq("task.project.id", project.as_str())),
            ScopeKey::Node(node) => Some(Filter::eq("task.node.id", node.as_str())),
        }
    }
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeKey::All => f.write_str("all"),
            ScopeKey::Task(task) => write!(f, "task:{task}"),
            ScopeKey::Project(project) => write!(f, "project:{project}"),
            ScopeKey::Node(node) => write!(f, "node:{node}"),
        }
    }
}
