//! Decoding of realtime pushes into the partial records the stores merge.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use scriptflow_core_types::{
    decode_record, Collection, NodeId, ProjectId, RecordAction, RecordEvent, Run, RunId, RunPatch,
    SyncError, Task, TaskId, TaskPatch,
};
use scriptflow_timefmt::parse_timestamp;

use crate::metrics;

/// Fields of a run push that overwrite the cached run.
const RUN_PUSH_FIELDS: [&str; 7] = [
    "id",
    "created",
    "updated",
    "status",
    "command",
    "connection_error",
    "exit_code",
];

/// Why a push event left the caches untouched.
#[derive(Debug, Error)]
pub(crate) enum Skip {
    #[error("not a create or update on this collection")]
    Unsupported,
    #[error("run without owning task")]
    MissingTask,
    #[error("undecodable record: {0}")]
    Undecodable(#[from] SyncError),
    #[error("record not cached")]
    NotCached,
}

/// Count and log the outcome of one push.
pub(crate) fn settle(event: &RecordEvent, outcome: Result<(), Skip>) {
    match outcome {
        Ok(()) => metrics::record_push_applied(),
        Err(skip) => {
            metrics::record_push_ignored();
            debug!(
                collection = %event.collection,
                action = %event.action,
                id = ?event.record_id(),
                reason = %skip,
                "push event ignored"
            );
        }
    }
}

pub(crate) fn action_on(event: &RecordEvent, expected: Collection) -> Result<RecordAction, Skip> {
    match event.parse() {
        Some((collection, action)) if collection == expected => Ok(action),
        _ => Err(Skip::Unsupported),
    }
}

fn owning_task(event: &RecordEvent) -> Result<TaskId, Skip> {
    event
        .field_str("task")
        .filter(|task| !task.is_empty())
        .map(TaskId::new)
        .ok_or(Skip::MissingTask)
}

fn projected_run(event: &RecordEvent) -> Value {
    let fields: Map<String, Value> = RUN_PUSH_FIELDS
        .iter()
        .filter_map(|field| {
            event
                .record
                .get(*field)
                .map(|value| (field.to_string(), value.clone()))
        })
        .collect();
    Value::Object(fields)
}

/// Owning task and the full projected run carried by a create push.
pub(crate) fn decode_run(event: &RecordEvent) -> Result<(TaskId, Run), Skip> {
    let task = owning_task(event)?;
    let mut run: Run = decode_record(Collection::Runs.as_str(), projected_run(event))?;
    run.task = task.clone();
    Ok((task, run))
}

#[derive(Debug, Deserialize)]
struct RawRunUpdate {
    id: RunId,
    #[serde(flatten)]
    fields: RunPatch,
}

/// Update pushes may carry any subset of the projected fields.
pub(crate) fn decode_run_update(event: &RecordEvent) -> Result<(TaskId, RunId, RunPatch), Skip> {
    let task = owning_task(event)?;
    let raw: RawRunUpdate = decode_record(Collection::Runs.as_str(), projected_run(event))?;
    Ok((task, raw.id, raw.fields))
}

#[derive(Debug, Deserialize)]
struct RawTaskPush {
    id: TaskId,
    #[serde(flatten)]
    fields: TaskPatch,
    #[serde(default)]
    node: Option<NodeId>,
    #[serde(default)]
    project: Option<ProjectId>,
    #[serde(default)]
    updated: Option<String>,
}

/// Fields of a task push that overwrite cached copies. Relation expansions
/// are kept unless the relation itself changed.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct TaskPush {
    pub id: TaskId,
    fields: TaskPatch,
    node: Option<NodeId>,
    project: Option<ProjectId>,
    updated: Option<DateTime<Utc>>,
}

impl TaskPush {
    pub fn decode(event: &RecordEvent) -> Result<Self, Skip> {
        let raw: RawTaskPush = decode_record(Collection::Tasks.as_str(), event.record.clone())?;
        let updated = match raw.updated.as_deref() {
            None | Some("") => None,
            Some(stamp) => Some(parse_timestamp(stamp).map_err(SyncError::from)?),
        };
        Ok(Self {
            id: raw.id,
            fields: raw.fields,
            node: raw.node.filter(|node| !node.is_empty()),
            project: raw.project.filter(|project| !project.is_empty()),
            updated,
        })
    }

    pub fn apply(&self, task: &mut Task) {
        self.fields.apply(task);
        if let Some(project) = &self.project {
            if *project != task.project {
                task.project = project.clone();
                task.expand.project = None;
            }
        }
        if let Some(node) = &self.node {
            if *node != task.node {
                task.node = node.clone();
                task.expand.node = None;
            }
        }
        if self.updated.is_some() {
            task.updated = self.updated;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scriptflow_core_types::{Node, NodeStatus, RunStatus, TaskExpand};
    use serde_json::json;

    fn event(action: &str, collection: &str, record: Value) -> RecordEvent {
        RecordEvent {
            action: action.into(),
            collection: collection.into(),
            record,
        }
    }

    #[test]
    fn run_push_keeps_only_projected_fields() {
        let push = event(
            "create",
            "runs",
            json!({
                "id": "r9",
                "task": "t1",
                "host": "ignored-host",
                "status": "error",
                "command": "backup.sh",
                "connection_error": "",
                "exit_code": 3,
                "created": "2024-11-17 10:09:00.000Z",
                "updated": "2024-11-17 10:09:30.000Z"
            }),
        );
        let (task, run) = decode_run(&push).unwrap();
        assert_eq!(task, TaskId::new("t1"));
        assert_eq!(run.task, task);
        assert_eq!(run.status, RunStatus::Error);
        assert_eq!(run.exit_code, 3);
        assert!(run.host.is_empty());
        assert_eq!(run.connection_error, None);
    }

    #[test]
    fn run_push_without_task_is_skipped() {
        let push = event("create", "runs", json!({"id": "r9", "status": "started"}));
        assert!(matches!(decode_run(&push), Err(Skip::MissingTask)));

        let push = event(
            "create",
            "runs",
            json!({"id": "r9", "task": "t1", "status": "exploded", "created": "2024-11-17 10:09:00.000Z"}),
        );
        assert!(matches!(decode_run(&push), Err(Skip::Undecodable(_))));
    }

    #[test]
    fn run_update_decodes_only_the_fields_sent() {
        let push = event("update", "runs", json!({"id": "r5", "task": "t1", "status": "completed"}));
        let (task, id, patch) = decode_run_update(&push).unwrap();
        assert_eq!(task, TaskId::new("t1"));
        assert_eq!(id, RunId::new("r5"));
        assert_eq!(patch.status, Some(RunStatus::Completed));
        assert_eq!(patch.exit_code, None);
        assert_eq!(patch.command, None);

        let push = event("update", "runs", json!({"id": "r5", "task": "t1", "status": "exploded"}));
        assert!(matches!(decode_run_update(&push), Err(Skip::Undecodable(_))));
        let push = event("update", "runs", json!({"task": "t1", "status": "error"}));
        assert!(matches!(decode_run_update(&push), Err(Skip::Undecodable(_))));
    }

    #[test]
    fn action_on_filters_collection_and_action() {
        let update = event("update", "tasks", json!({"id": "t1"}));
        assert_eq!(action_on(&update, Collection::Tasks).unwrap(), RecordAction::Update);
        assert!(action_on(&update, Collection::Runs).is_err());
        assert!(action_on(&event("delete", "tasks", json!({})), Collection::Tasks).is_err());
    }

    #[test]
    fn task_push_drops_expansion_only_when_relation_changes() {
        let node = Node {
            id: NodeId::new("n1"),
            name: "web".into(),
            host: "10.0.0.1".into(),
            user: "deploy".into(),
            slug: "web-1".into(),
            status: NodeStatus::Online,
            created: Utc::now(),
            updated: Utc::now(),
        };
        let mut task = Task {
            id: TaskId::new("t1"),
            name: "backup".into(),
            active: true,
            command: "backup.sh".into(),
            schedule: Some("0 * * * *".into()),
            project: ProjectId::new("p1"),
            node: NodeId::new("n1"),
            prepend_datetime: false,
            consecutive_failure_count: 4,
            expand: TaskExpand {
                project: None,
                node: Some(node),
            },
            created: None,
            updated: None,
        };

        let push = TaskPush::decode(&event(
            "update",
            "tasks",
            json!({
                "id": "t1",
                "name": "nightly backup",
                "active": false,
                "schedule": "",
                "node": "n1",
                "project": "p2",
                "updated": "2024-11-17 11:00:00.000Z"
            }),
        ))
        .unwrap();
        push.apply(&mut task);

        assert_eq!(task.name, "nightly backup");
        assert!(!task.active);
        assert_eq!(task.schedule, None);
        assert_eq!(task.project, ProjectId::new("p2"));
        assert!(task.expand.node.is_some());
        assert_eq!(task.consecutive_failure_count, 4);
        assert!(task.updated.is_some());
    }

    #[test]
    fn task_push_with_bad_timestamp_is_undecodable() {
        let push = event("update", "tasks", json!({"id": "t1", "updated": "yesterday"}));
        assert!(matches!(TaskPush::decode(&push), Err(Skip::Undecodable(_))));
    }
}
