use std::sync::Arc;

use parking_lot::RwLock;

use scriptflow_core_types::{decode_record, Collection, Filter, ListQuery, Node, SyncError};
use scriptflow_record_store::RecordStore;

use crate::model::decode_items;

pub struct NodeStore {
    store: Arc<dyn RecordStore>,
    limit: u32,
    nodes: RwLock<Vec<Node>>,
    node: RwLock<Option<Node>>,
}

impl NodeStore {
    pub fn new(store: Arc<dyn RecordStore>, limit: u32) -> Self {
        Self {
            store,
            limit: limit.max(1),
            nodes: RwLock::new(Vec::new()),
            node: RwLock::new(None),
        }
    }

    /// Newest nodes first, one page of `limit`.
    pub async fn fetch_nodes(&self) -> Result<(), SyncError> {
        let query = ListQuery::new(Collection::Nodes)
            .sort("-created")
            .page(1, self.limit);
        let listed = self.store.list(query).await?;
        let nodes = decode_items(Collection::Nodes, listed.items)?;
        *self.nodes.write() = nodes;
        Ok(())
    }

    /// Nodes are addressed by slug in dashboard routes.
    pub async fn fetch_node(&self, slug: &str) -> Result<Node, SyncError> {
        let record = self
            .store
            .get_first(Collection::Nodes, Filter::eq("slug", slug), &[])
            .await?;
        let node: Node = decode_record(Collection::Nodes.as_str(), record)?;
        *self.node.write() = Some(node.clone());
        Ok(node)
    }

    pub fn nodes(&self) -> Vec<Node> {
        self.nodes.read().clone()
    }

    pub fn node(&self) -> Option<Node> {
        self.node.read().clone()
    }
}
