//! Typed partial updates. Only the fields a user can change are listed; a
//! `None` field is left untouched both locally and in the remote write.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{AlertSubscription, Run, RunStatus, Task};
use crate::serde_helpers::{lenient_optional_i32, optional_timestamp};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// `Some("")` clears the schedule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prepend_datetime: Option<bool>,
}

impl TaskPatch {
    pub fn active(active: bool) -> Self {
        Self {
            active: Some(active),
            ..Self::default()
        }
    }

    pub fn apply(&self, task: &mut Task) {
        if let Some(name) = &self.name {
            task.name = name.clone();
        }
        if let Some(active) = self.active {
            task.active = active;
        }
        if let Some(command) = &self.command {
            task.command = command.clone();
        }
        if let Some(schedule) = &self.schedule {
            task.schedule = (!schedule.is_empty()).then(|| schedule.clone());
        }
        if let Some(prepend) = self.prepend_datetime {
            task.prepend_datetime = prepend;
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertSubscriptionPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub events: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
}

impl AlertSubscriptionPatch {
    pub fn apply(&self, subscription: &mut AlertSubscription) {
        if let Some(name) = &self.name {
            subscription.name = name.clone();
        }
        if let Some(events) = &self.events {
            subscription.events = events.clone();
        }
        if let Some(threshold) = self.threshold {
            subscription.threshold = threshold;
        }
        if let Some(active) = self.active {
            subscription.active = active;
        }
    }
}

/// Fields a run update push may carry. Absent fields keep the cached value.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct RunPatch {
    #[serde(default)]
    pub status: Option<RunStatus>,
    #[serde(default)]
    pub command: Option<String>,
    /// `Some("")` clears the error.
    #[serde(default)]
    pub connection_error: Option<String>,
    #[serde(default, alias = "exitCode", deserialize_with = "lenient_optional_i32")]
    pub exit_code: Option<i32>,
    #[serde(default, deserialize_with = "optional_timestamp::deserialize")]
    pub created: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "optional_timestamp::deserialize")]
    pub updated: Option<DateTime<Utc>>,
}

impl RunPatch {
    pub fn apply(&self, run: &mut Run) {
        if let Some(status) = self.status {
            run.status = status;
        }
        if let Some(command) = &self.command {
            run.command = command.clone();
        }
        if let Some(error) = &self.connection_error {
            run.connection_error = (!error.is_empty()).then(|| error.clone());
        }
        if let Some(exit_code) = self.exit_code {
            run.exit_code = exit_code;
        }
        if let Some(created) = self.created {
            run.created = created;
        }
        if self.updated.is_some() {
            run.updated = self.updated;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serializes_only_present_fields() {
        let patch = TaskPatch::active(false);
        assert_eq!(serde_json::to_value(&patch).unwrap(), json!({"active": false}));
    }

    #[test]
    fn run_patch_leaves_absent_fields_alone() {
        let mut run: Run = serde_json::from_value(json!({
            "id": "r1",
            "task": "t1",
            "status": "started",
            "command": "backup.sh",
            "connection_error": "refused",
            "exit_code": 0,
            "created": "2024-11-17 10:00:00.000Z"
        }))
        .unwrap();

        let patch: RunPatch =
            serde_json::from_value(json!({"status": "error", "exit_code": 2.0, "connection_error": ""}))
                .unwrap();
        patch.apply(&mut run);

        assert_eq!(run.status, RunStatus::Error);
        assert_eq!(run.exit_code, 2);
        assert_eq!(run.connection_error, None);
        assert_eq!(run.command, "backup.sh");
        assert_eq!(run.updated, None);
    }
}
