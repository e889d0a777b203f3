use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entity::CachedEntity;
use crate::error::SyncError;
use crate::ids::{AlertSubscriptionId, ChannelId, NodeId, ProjectId, RunId, TaskId};
use crate::serde_helpers::{
    empty_string_as_none, lenient_i32, lenient_u32, optional_timestamp, timestamp,
};

/// Lifecycle of a single command execution.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Started,
    Completed,
    Interrupted,
    Error,
    InternalError,
    Killed,
}

impl RunStatus {
    /// Statuses that extend a task's failure streak.
    pub fn is_failure(self) -> bool {
        matches!(self, RunStatus::Error | RunStatus::InternalError)
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, RunStatus::Started)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Started => "started",
            RunStatus::Completed => "completed",
            RunStatus::Interrupted => "interrupted",
            RunStatus::Error => "error",
            RunStatus::InternalError => "internal_error",
            RunStatus::Killed => "killed",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "started" => Ok(RunStatus::Started),
            "completed" => Ok(RunStatus::Completed),
            "interrupted" => Ok(RunStatus::Interrupted),
            "error" => Ok(RunStatus::Error),
            "internal_error" => Ok(RunStatus::InternalError),
            "killed" => Ok(RunStatus::Killed),
            other => Err(SyncError::Validation(format!("unknown run status {other:?}"))),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Online,
    #[default]
    Offline,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    #[serde(with = "timestamp")]
    pub created: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    #[serde(default)]
    pub host: String,
    #[serde(default, alias = "username")]
    pub user: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub status: NodeStatus,
    #[serde(with = "timestamp")]
    pub created: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskExpand {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<Project>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<Node>,
}

impl TaskExpand {
    fn is_empty(&self) -> bool {
        self.project.is_none() && self.node.is_none()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub name: String,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub command: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub schedule: Option<String>,
    #[serde(default)]
    pub project: ProjectId,
    #[serde(default)]
    pub node: NodeId,
    #[serde(default)]
    pub prepend_datetime: bool,
    /// Counter kept by the backend; views use the streak derived from cached runs.
    #[serde(default, deserialize_with = "lenient_u32")]
    pub consecutive_failure_count: u32,
    #[serde(default, skip_serializing_if = "TaskExpand::is_empty")]
    pub expand: TaskExpand,
    #[serde(default, with = "optional_timestamp")]
    pub created: Option<DateTime<Utc>>,
    #[serde(default, with = "optional_timestamp")]
    pub updated: Option<DateTime<Utc>>,
}

impl CachedEntity for Task {
    type Id = TaskId;

    fn id(&self) -> &TaskId {
        &self.id
    }

    fn merge(&mut self, newer: Self) {
        let Task {
            id: _,
            name,
            active,
            command,
            schedule,
            project,
            node,
            prepend_datetime,
            consecutive_failure_count,
            expand,
            created,
            updated,
        } = newer;
        self.name = name;
        self.active = active;
        self.command = command;
        self.schedule = schedule;
        if !project.is_empty() {
            if project != self.project {
                self.expand.project = None;
            }
            self.project = project;
        }
        if !node.is_empty() {
            if node != self.node {
                self.expand.node = None;
            }
            self.node = node;
        }
        self.prepend_datetime = prepend_datetime;
        self.consecutive_failure_count = consecutive_failure_count;
        if expand.project.is_some() {
            self.expand.project = expand.project;
        }
        if expand.node.is_some() {
            self.expand.node = expand.node;
        }
        if created.is_some() {
            self.created = created;
        }
        if updated.is_some() {
            self.updated = updated;
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RunExpand {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<Box<Task>>,
}

impl RunExpand {
    fn is_empty(&self) -> bool {
        self.task.is_none()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    #[serde(default)]
    pub task: TaskId,
    pub status: RunStatus,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub command: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub connection_error: Option<String>,
    #[serde(default, alias = "exitCode", deserialize_with = "lenient_i32")]
    pub exit_code: i32,
    #[serde(default, skip_serializing_if = "RunExpand::is_empty")]
    pub expand: RunExpand,
    #[serde(with = "timestamp")]
    pub created: DateTime<Utc>,
    #[serde(default, with = "optional_timestamp")]
    pub updated: Option<DateTime<Utc>>,
}

impl CachedEntity for Run {
    type Id = RunId;

    fn id(&self) -> &RunId {
        &self.id
    }

    fn merge(&mut self, newer: Self) {
        self.status = newer.status;
        self.command = newer.command;
        self.connection_error = newer.connection_error;
        self.exit_code = newer.exit_code;
        self.created = newer.created;
        if newer.updated.is_some() {
            self.updated = newer.updated;
        }
        if !newer.task.is_empty() {
            self.task = newer.task;
        }
        if !newer.host.is_empty() {
            self.host = newer.host;
        }
        if newer.expand.task.is_some() {
            self.expand = newer.expand;
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Email,
    Slack,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub id: ChannelId,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ChannelKind,
    #[serde(default)]
    pub config: Value,
    #[serde(default, with = "optional_timestamp")]
    pub created: Option<DateTime<Utc>>,
    #[serde(default, with = "optional_timestamp")]
    pub updated: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertSubscriptionExpand {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<Box<Task>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<Channel>,
}

/// Alerting rule: notify `channel` when a run of `task` hits one of `events`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AlertSubscription {
    pub id: AlertSubscriptionId,
    #[serde(default)]
    pub name: String,
    pub task: TaskId,
    pub channel: ChannelId,
    #[serde(default, alias = "event")]
    pub events: Vec<String>,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub threshold: u32,
    #[serde(default)]
    pub active: bool,
    #[serde(default, alias = "Notified", with = "optional_timestamp")]
    pub notified: Option<DateTime<Utc>>,
    #[serde(default)]
    pub expand: AlertSubscriptionExpand,
    #[serde(default, with = "optional_timestamp")]
    pub created: Option<DateTime<Utc>>,
    #[serde(default, with = "optional_timestamp")]
    pub updated: Option<DateTime<Utc>>,
}

/// Decode a raw backend record into one of the entity types above.
pub fn decode_record<T>(collection: &str, record: Value) -> Result<T, SyncError>
where
    T: serde::de::DeserializeOwned,
{
    serde_json::from_value(record).map_err(|err| SyncError::decode(collection, err))
}
