//! Shared primitives for the ScriptFlow dashboard state crates.

pub mod entity;
pub mod error;
pub mod event;
pub mod ids;
pub mod model;
pub mod patch;
pub mod query;
pub mod scope;
mod serde_helpers;

pub use entity::CachedEntity;
pub use error::SyncError;
pub use event::{Collection, RecordAction, RecordEvent};
pub use ids::{AlertSubscriptionId, ChannelId, NodeId, ProjectId, RunId, TaskId};
pub use model::{
    decode_record, AlertSubscription, AlertSubscriptionExpand, Channel, ChannelKind, Node,
    NodeStatus, Project, Run, RunExpand, RunStatus, Task, TaskExpand,
};
pub use patch::{AlertSubscriptionPatch, RunPatch, TaskPatch};
pub use query::{Filter, ListQuery, Sort, SortKey};
pub use scope::ScopeKey;
