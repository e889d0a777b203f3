//! Client-side state of the ScriptFlow dashboard.
//!
//! Each store fetches from a [`RecordStore`](scriptflow_record_store::RecordStore),
//! keeps its views current from realtime pushes and exposes plain getters.
//! [`DashboardContext`] owns one store of each kind.

mod alerts;
mod context;
pub mod metrics;
mod model;
mod nodes;
mod projects;
mod push;
mod runs;
mod tasks;

#[cfg(test)]
mod test_support;

pub use alerts::AlertSubscriptionStore;
pub use context::DashboardContext;
pub use model::{DashboardSnapshot, RunFetch, RunWindow, StoreLimits, TaskOverview};
pub use nodes::NodeStore;
pub use projects::ProjectStore;
pub use runs::RunStore;
pub use tasks::TaskStore;
