use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SyncError;

/// Backend collections the dashboard reads.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Tasks,
    Runs,
    Nodes,
    Projects,
    Channels,
    Subscriptions,
    Notifications,
}

impl Collection {
    pub const ALL: [Collection; 7] = [
        Collection::Tasks,
        Collection::Runs,
        Collection::Nodes,
        Collection::Projects,
        Collection::Channels,
        Collection::Subscriptions,
        Collection::Notifications,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Collection::Tasks => "tasks",
            Collection::Runs => "runs",
            Collection::Nodes => "nodes",
            Collection::Projects => "projects",
            Collection::Channels => "channels",
            Collection::Subscriptions => "subscriptions",
            Collection::Notifications => "notifications",
        }
    }

    /// Collection a relation field of this name points into.
    pub fn for_relation(field: &str) -> Option<Collection> {
        match field {
            "task" => Some(Collection::Tasks),
            "run" => Some(Collection::Runs),
            "node" => Some(Collection::Nodes),
            "project" => Some(Collection::Projects),
            "channel" => Some(Collection::Channels),
            "subscription" => Some(Collection::Subscriptions),
            _ => None,
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Collection {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Collection::ALL
            .into_iter()
            .find(|collection| collection.as_str() == s)
            .ok_or_else(|| SyncError::Validation(format!("unknown collection {s:?}")))
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum RecordAction {
    Create,
    Update,
}

impl RecordAction {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordAction::Create => "create",
            RecordAction::Update => "update",
        }
    }
}

/// Push notification as delivered by the realtime transport.
///
/// Action and collection stay raw strings so that events this layer does not
/// understand (deletes, unknown collections) can be recognised and dropped.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecordEvent {
    pub action: String,
    #[serde(rename = "collectionName", alias = "collection")]
    pub collection: String,
    pub record: Value,
}

impl RecordEvent {
    pub fn new(action: RecordAction, collection: Collection, record: Value) -> Self {
        Self {
            action: action.as_str().to_string(),
            collection: collection.as_str().to_string(),
            record,
        }
    }

    /// `None` for anything other than a create/update on a known collection.
    pub fn parse(&self) -> Option<(Collection, RecordAction)> {
        let collection = self.collection.parse::<Collection>().ok()?;
        let action = match self.action.as_str() {
            "create" => RecordAction::Create,
            "update" => RecordAction::Update,
            _ => return None,
        };
        Some((collection, action))
    }

    pub fn record_id(&self) -> Option<&str> {
        self.record.get("id").and_then(Value::as_str)
    }

    /// String value of a top level record field, e.g. the owning `task` of a run.
    pub fn field_str(&self, field: &str) -> Option<&str> {
        self.record.get(field).and_then(Value::as_str)
    }
}
