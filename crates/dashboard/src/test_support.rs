use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use serde_json::{json, Value};

use scriptflow_core_types::{Collection, Run};
use scriptflow_record_store::MemoryStore;

const BACKEND_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3fZ";

fn stamp(minute: i64, second: i64) -> String {
    let origin = Utc.with_ymd_and_hms(2024, 11, 17, 10, 0, 0).unwrap();
    (origin + chrono::Duration::minutes(minute) + chrono::Duration::seconds(second))
        .format(BACKEND_TIME_FORMAT)
        .to_string()
}

/// Run record created `minute` minutes after the fixture origin, finished 30s later.
pub(crate) fn run_json(id: &str, task: &str, status: &str, minute: i64) -> Value {
    json!({
        "id": id,
        "task": task,
        "status": status,
        "host": "10.0.0.1",
        "command": "run.sh",
        "connection_error": "",
        "exit_code": if status == "completed" { 0 } else { 1 },
        "created": stamp(minute, 0),
        "updated": stamp(minute, 30),
    })
}

fn dated(mut record: Value, day: u32) -> Value {
    let at = format!("2024-11-{day:02} 09:00:00.000Z");
    record["created"] = json!(at);
    record["updated"] = json!(at);
    record
}

/// Two projects, two nodes, three tasks, run history for t1 and t2 and
/// alert subscriptions for t1.
///
/// t1 runs, oldest first: completed, completed, error, internal_error, error.
pub(crate) fn seeded_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new(64));
    store.seed(
        Collection::Projects,
        vec![
            dated(json!({"id": "p1", "name": "Backups"}), 1),
            dated(json!({"id": "p2", "name": "Reports"}), 2),
        ],
    );
    store.seed(
        Collection::Nodes,
        vec![
            dated(
                json!({"id": "n1", "name": "web", "host": "10.0.0.1", "username": "deploy", "slug": "web-1", "status": "online"}),
                1,
            ),
            dated(
                json!({"id": "n2", "name": "db", "host": "10.0.0.2", "username": "deploy", "slug": "db-1", "status": "offline"}),
                2,
            ),
        ],
    );
    store.seed(
        Collection::Tasks,
        vec![
            dated(
                json!({"id": "t1", "name": "backup", "command": "backup.sh", "schedule": "0 * * * *", "project": "p1", "node": "n1", "active": true}),
                3,
            ),
            dated(
                json!({"id": "t2", "name": "report", "command": "report.sh", "schedule": "", "project": "p2", "node": "n1", "active": false}),
                4,
            ),
            dated(
                json!({"id": "t3", "name": "vacuum", "command": "vacuum.sh", "schedule": "@daily", "project": "p1", "node": "n2", "active": true}),
                5,
            ),
        ],
    );
    store.seed(
        Collection::Runs,
        vec![
            run_json("r1", "t1", "completed", 1),
            run_json("r2", "t1", "completed", 2),
            run_json("r3", "t1", "error", 3),
            run_json("r4", "t1", "internal_error", 4),
            run_json("r5", "t1", "error", 5),
            run_json("r6", "t2", "completed", 3),
        ],
    );
    store.seed(
        Collection::Channels,
        vec![
            json!({"id": "c1", "name": "ops mail", "type": "email", "config": {"to": "ops@example.com"}}),
            json!({"id": "c2", "name": "ops slack", "type": "slack", "config": {"webhook": "https://hooks.example.com/x"}}),
        ],
    );
    store.seed(
        Collection::Subscriptions,
        vec![
            dated(
                json!({"id": "s1", "name": "mail on error", "task": "t1", "channel": "c1", "events": ["error"], "threshold": 1, "active": false}),
                6,
            ),
            dated(
                json!({"id": "s2", "name": "slack on error", "task": "t1", "channel": "c2", "events": ["error", "internal_error"], "threshold": 3, "active": true}),
                7,
            ),
            dated(
                json!({"id": "s3", "name": "report mail", "task": "t2", "channel": "c1", "events": ["error"], "threshold": 1, "active": true}),
                8,
            ),
        ],
    );
    store
}

pub(crate) fn run_ids(runs: &[Run]) -> Vec<&str> {
    runs.iter().map(|run| run.id.as_str()).collect()
}

/// Poll until pushes delivered through the store's forwarders have landed.
pub(crate) async fn wait_until(mut done: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !done() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
