use chrono::{Duration, TimeZone, Utc};

use scriptflow_core_types::{
    NodeId, ProjectId, Run, RunExpand, RunId, RunStatus, Task, TaskExpand, TaskId,
};

/// Run of task `t1` created `minute` minutes after a fixed origin.
pub(crate) fn run(id: &str, status: RunStatus, minute: i64) -> Run {
    let origin = Utc.with_ymd_and_hms(2024, 11, 17, 10, 0, 0).unwrap();
    Run {
        id: RunId::new(id),
        task: TaskId::new("t1"),
        status,
        host: "web-1".into(),
        command: "backup.sh".into(),
        connection_error: None,
        exit_code: 0,
        expand: RunExpand::default(),
        created: origin + Duration::minutes(minute),
        updated: None,
    }
}

pub(crate) fn run_ids(runs: &[Run]) -> Vec<&str> {
    runs.iter().map(|run| run.id.as_str()).collect()
}

pub(crate) fn task(id: &str, active: bool) -> Task {
    Task {
        id: TaskId::new(id),
        name: format!("task {id}"),
        active,
        command: "true".into(),
        schedule: Some("*/5 * * * *".into()),
        project: ProjectId::new("p1"),
        node: NodeId::new("n1"),
        prepend_datetime: false,
        consecutive_failure_count: 0,
        expand: TaskExpand::default(),
        created: None,
        updated: None,
    }
}
