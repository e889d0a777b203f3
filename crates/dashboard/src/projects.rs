use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use scriptflow_core_types::{decode_record, Collection, Filter, ListQuery, Project, ProjectId, SyncError};
use scriptflow_record_store::RecordStore;

use crate::model::decode_items;

/// Page size used while walking the full project list.
const FULL_LIST_BATCH: u32 = 200;

pub struct ProjectStore {
    store: Arc<dyn RecordStore>,
    projects: RwLock<Vec<Project>>,
    project: RwLock<Option<Project>>,
}

impl ProjectStore {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            projects: RwLock::new(Vec::new()),
            project: RwLock::new(None),
        }
    }

    /// Every project, newest first. Pages are fetched until the total is
    /// reached; the cached list is replaced only once all of them arrived.
    pub async fn fetch_projects(&self) -> Result<(), SyncError> {
        let mut projects: Vec<Project> = Vec::new();
        let mut page = 1;
        loop {
            let query = ListQuery::new(Collection::Projects)
                .sort("-created")
                .page(page, FULL_LIST_BATCH);
            let listed = self.store.list(query).await?;
            let fetched = listed.items.len();
            projects.extend(decode_items::<Project>(Collection::Projects, listed.items)?);
            if fetched < FULL_LIST_BATCH as usize || projects.len() as u64 >= listed.total_items {
                break;
            }
            page += 1;
        }
        debug!(count = projects.len(), pages = page, "projects fetched");
        *self.projects.write() = projects;
        Ok(())
    }

    pub async fn fetch_project(&self, id: &ProjectId) -> Result<Project, SyncError> {
        let record = self
            .store
            .get_first(Collection::Projects, Filter::eq("id", id.as_str()), &[])
            .await?;
        let project: Project = decode_record(Collection::Projects.as_str(), record)?;
        *self.project.write() = Some(project.clone());
        Ok(project)
    }

    pub fn projects(&self) -> Vec<Project> {
        self.projects.read().clone()
    }

    pub fn project(&self) -> Option<Project> {
        self.project.read().clone()
    }
}
