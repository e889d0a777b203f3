//! Offline replay of a recorded dashboard session against the in-memory store.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use scriptflow_core_types::{Collection, RecordEvent, ScopeKey, SyncError, TaskId};
use scriptflow_dashboard::metrics::{self as dashboard_metrics, DashboardMetricsSnapshot};
use scriptflow_dashboard::{DashboardContext, DashboardSnapshot, RunFetch};
use scriptflow_record_store::{MemoryStore, StoreOp};

use crate::config::DashConfig;

const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Input of `scriptflow-dash replay`.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct ReplayBundle {
    /// Initial records keyed by collection name.
    pub records: BTreeMap<String, Vec<Value>>,
    /// Push events delivered after the initial fetch, in order.
    pub events: Vec<RecordEvent>,
    /// Tasks whose `active` flag is toggled once the events are applied.
    pub toggles: Vec<TaskId>,
    /// Make every toggle write fail, exercising rollback.
    pub fail_toggles: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct ToggleOutcome {
    pub task: TaskId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ReplayReport {
    #[serde(flatten)]
    pub snapshot: DashboardSnapshot,
    pub toggles: Vec<ToggleOutcome>,
    pub metrics: DashboardMetricsSnapshot,
}

pub async fn replay(bundle: ReplayBundle, config: &DashConfig) -> Result<ReplayReport> {
    let store = Arc::new(MemoryStore::new(config.bus_capacity.max(1)));
    for (name, records) in bundle.records {
        let collection: Collection = name
            .parse()
            .with_context(|| format!("Unknown collection in bundle: {name}"))?;
        store.seed(collection, records);
    }

    let context = DashboardContext::new(store.clone(), config.limits());
    context.tasks().fetch_tasks().await.context("Failed to fetch tasks")?;
    context.nodes().fetch_nodes().await.context("Failed to fetch nodes")?;
    context
        .projects()
        .fetch_projects()
        .await
        .context("Failed to fetch projects")?;
    for task in context.tasks().tasks() {
        context
            .runs()
            .fetch_runs(&task.id, RunFetch::default())
            .await
            .with_context(|| format!("Failed to fetch runs of task {}", task.id))?;
    }

    context.runs().subscribe(ScopeKey::All).await?;
    context.tasks().subscribe().await?;

    let routed = bundle
        .events
        .iter()
        .filter(|event| {
            event.collection == Collection::Runs.as_str()
                || event.collection == Collection::Tasks.as_str()
        })
        .count() as u64;
    let before = settled(&dashboard_metrics::snapshot());
    for event in bundle.events {
        store.publish_raw(event).await?;
    }
    drain(&store, before + routed).await?;
    info!(events = routed, "replayed push events");

    let mut toggles = Vec::with_capacity(bundle.toggles.len());
    for task in bundle.toggles {
        if bundle.fail_toggles {
            store.fail_next(
                StoreOp::Update,
                SyncError::NotAuthorized("replay: writes rejected".into()),
            );
        }
        let outcome = match context.tasks().toggle_task_active(&task).await {
            Ok(toggled) => ToggleOutcome {
                task,
                active: toggled.map(|toggled| toggled.active),
                error: None,
            },
            Err(err) => {
                warn!(%task, error = %err, "toggle rejected");
                ToggleOutcome {
                    task,
                    active: None,
                    error: Some(err.to_string()),
                }
            }
        };
        toggles.push(outcome);
    }

    let snapshot = context.snapshot();
    context.shutdown();
    Ok(ReplayReport {
        snapshot,
        toggles,
        metrics: dashboard_metrics::snapshot(),
    })
}

fn settled(metrics: &DashboardMetricsSnapshot) -> u64 {
    metrics.push_events_applied + metrics.push_events_ignored
}

/// Wait until the forwarders have handed `target` pushes to the stores.
///
/// Fails fast when a forwarder fell behind the bus, since the dropped events
/// will never settle.
async fn drain(store: &MemoryStore, target: u64) -> Result<()> {
    let reached = tokio::time::timeout(DRAIN_TIMEOUT, async {
        loop {
            if store.lagged_events() > 0 {
                return false;
            }
            if settled(&dashboard_metrics::snapshot()) >= target {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    match reached {
        Ok(true) => Ok(()),
        Ok(false) => bail!(
            "realtime delivery lagged and dropped {} events; raise bus_capacity or SCRIPTFLOW_BUS_CAPACITY",
            store.lagged_events()
        ),
        Err(_) => bail!(
            "timed out waiting for push delivery ({} of {target} settled)",
            settled(&dashboard_metrics::snapshot())
        ),
    }
}
